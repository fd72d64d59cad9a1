//! Split command - one PDF into several.

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use pagecraft_core::{DirectorySink, SplitKind, Splitter};

use super::{BarProgress, cancel_on_ctrl_c, load_config, read_input, report_outcome};

/// Arguments for the split command.
#[derive(Args)]
pub struct SplitArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Split mode: ranges, burst or fixed
    #[arg(short, long)]
    mode: Option<SplitKind>,

    /// Page ranges, e.g. "1, 3-5, 10-end"
    #[arg(short, long)]
    ranges: Option<String>,

    /// Pages per file in fixed mode
    #[arg(long, default_value = "1")]
    chunk: u32,

    /// File name prefix (default: input file stem)
    #[arg(short, long)]
    prefix: Option<String>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Print the files that would be written and exit
    #[arg(long)]
    dry_run: bool,
}

pub async fn run(args: SplitArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let (name, data) = read_input(&args.input)?;

    let mut splitter = Splitter::new()
        .with_parser(config.range_parser())
        .with_default_prefix(config.split.default_prefix.clone());
    splitter
        .set_file(name, data)
        .map_err(|e| anyhow::anyhow!("{}: {}", args.input.display(), e))?;

    splitter.set_mode(args.mode.unwrap_or(config.split.default_mode));
    if let Some(ranges) = args.ranges {
        splitter.set_range_input(ranges);
    }
    splitter.set_fixed_size(args.chunk);
    if let Some(prefix) = args.prefix {
        splitter.set_prefix(prefix);
    }

    if args.dry_run {
        for spec in splitter.plan() {
            println!("{}  pages {}", spec.filename, spec.pages);
        }
        return Ok(());
    }

    info!(
        "Splitting {} in {:?} mode into {}",
        args.input.display(),
        splitter.mode(),
        args.output_dir.display()
    );
    cancel_on_ctrl_c(splitter.cancellation_token());

    let mut sink = DirectorySink::new(&args.output_dir);
    let mut progress = BarProgress::new("files");
    let result = splitter.split(&mut sink, &mut progress).await;
    progress.finish();

    let outcome = result?;
    report_outcome(&outcome, sink.written());
    if !outcome.is_cancelled() {
        println!(
            "{} Split into {} files",
            style("✓").green(),
            sink.written().len()
        );
    }
    Ok(())
}
