//! Merge command - several PDFs into one.

use std::path::PathBuf;

use clap::Args;
use console::style;

use pagecraft_core::{DirectorySink, Merger};

use super::{BarProgress, cancel_on_ctrl_c, expand_inputs, load_config, read_input, report_outcome};

/// Arguments for the merge command.
#[derive(Args)]
pub struct MergeArgs {
    /// Input files or glob patterns, in merge order
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file (default: merged.pdf in the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub async fn run(args: MergeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let files = expand_inputs(&args.inputs)?;

    let mut merger = Merger::new().with_output_name(config.output.merged_name.clone());
    for path in &files {
        let (name, data) = read_input(path)?;
        merger
            .add_file(name, data)
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    }

    println!(
        "{} Merging {} files ({} pages)",
        style("ℹ").blue(),
        merger.file_count(),
        merger.total_pages()
    );
    cancel_on_ctrl_c(merger.cancellation_token());

    let mut sink = DirectorySink::new(".");
    if let Some(output) = args.output {
        sink = sink.with_save_location(output);
    }

    let mut progress = BarProgress::new("files");
    let result = merger.merge(&mut sink, &mut progress).await;
    progress.finish();

    report_outcome(&result?, sink.written());
    Ok(())
}
