//! Organize command - reorder, rotate and delete pages.

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::{debug, warn};

use pagecraft_core::{DirectorySink, Organizer, PageArrangement, PageId, RotateDirection};

use super::{BarProgress, cancel_on_ctrl_c, load_config, read_input, report_outcome};

/// Arguments for the organize command.
#[derive(Args)]
pub struct OrganizeArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// New page order as original page numbers, e.g. "3,1,2"; pages not
    /// listed follow in their current order
    #[arg(long, value_delimiter = ',')]
    order: Vec<u32>,

    /// Rotations as PAGE:DEGREES, e.g. "1:90,4:-90"
    #[arg(long, value_delimiter = ',')]
    rotate: Vec<String>,

    /// Original page numbers to delete, e.g. "2,5"
    #[arg(long, value_delimiter = ',')]
    delete: Vec<u32>,

    /// Output file (default: <stem>_organized.pdf in the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub async fn run(args: OrganizeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let (name, data) = read_input(&args.input)?;

    let mut organizer =
        Organizer::new().with_organized_suffix(config.output.organized_suffix.clone());
    let pages = organizer
        .set_file(name, data)
        .map_err(|e| anyhow::anyhow!("{}: {}", args.input.display(), e))?;
    debug!("Loaded {} pages", pages);

    let arrangement = organizer.arrangement_mut();
    if !args.order.is_empty() {
        let ids: Vec<PageId> = args
            .order
            .iter()
            .filter_map(|&page| page_id(arrangement, page))
            .collect();
        arrangement.reorder(&ids);
    }

    for arg in &args.rotate {
        let (page, turns, direction) = parse_rotation(arg)?;
        let Some(id) = page_id(arrangement, page) else {
            warn!("Ignoring rotation of missing page {}", page);
            continue;
        };
        arrangement.deselect_all();
        arrangement.toggle_selection(id);
        for _ in 0..turns {
            arrangement.rotate_selected(direction);
        }
    }

    if !args.delete.is_empty() {
        arrangement.deselect_all();
        for &page in &args.delete {
            if let Some(id) = page_id(arrangement, page) {
                arrangement.toggle_selection(id);
            }
        }
        let removed = arrangement.delete_selected();
        debug!("Deleted {} pages", removed);
    }
    arrangement.deselect_all();

    if arrangement.is_empty() {
        anyhow::bail!("All pages were deleted, nothing to save");
    }

    cancel_on_ctrl_c(organizer.cancellation_token());
    let mut sink = DirectorySink::new(".");
    if let Some(output) = args.output {
        sink = sink.with_save_location(output);
    }

    let mut progress = BarProgress::new("pages");
    let result = organizer.save(&mut sink, &mut progress).await;
    progress.finish();

    let outcome = result?;
    report_outcome(&outcome, sink.written());
    if !outcome.is_cancelled() {
        let saved = organizer.arrangement().len();
        println!("{} Saved {} of {} pages", style("✓").green(), saved, pages);
    }
    Ok(())
}

/// Entry showing 1-indexed original page `page`.
fn page_id(arrangement: &PageArrangement, page: u32) -> Option<PageId> {
    arrangement
        .entries()
        .iter()
        .find(|e| e.source_page_number() == page)
        .map(|e| e.id())
}

/// Parse `PAGE:DEGREES` into a page and a number of quarter turns.
fn parse_rotation(arg: &str) -> anyhow::Result<(u32, u32, RotateDirection)> {
    let (page, degrees) = arg
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid rotation '{}', expected PAGE:DEGREES", arg))?;
    let page: u32 = page
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid page number in rotation '{}'", arg))?;
    let degrees: i32 = degrees
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid degrees in rotation '{}'", arg))?;
    if degrees % 90 != 0 {
        anyhow::bail!("Rotation must be a multiple of 90 degrees, got {}", degrees);
    }

    let direction = if degrees < 0 {
        RotateDirection::CounterClockwise
    } else {
        RotateDirection::Clockwise
    };
    let turns = (degrees.unsigned_abs() / 90) % 4;
    Ok((page, turns, direction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rotation() {
        let (page, turns, direction) = parse_rotation("3:90").unwrap();
        assert_eq!((page, turns), (3, 1));
        assert_eq!(direction, RotateDirection::Clockwise);

        let (_, turns, direction) = parse_rotation("1:-180").unwrap();
        assert_eq!(turns, 2);
        assert_eq!(direction, RotateDirection::CounterClockwise);

        assert_eq!(parse_rotation("2:360").unwrap().1, 0);
        assert!(parse_rotation("2:45").is_err());
        assert!(parse_rotation("x:90").is_err());
        assert!(parse_rotation("90").is_err());
    }

    #[test]
    fn test_page_id_by_original_number() {
        let mut arrangement = PageArrangement::new();
        arrangement.load(3);
        let third = arrangement.entries()[2].id();
        assert_eq!(page_id(&arrangement, 3), Some(third));
        assert_eq!(page_id(&arrangement, 4), None);
    }
}
