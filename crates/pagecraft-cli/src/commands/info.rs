//! Info command - page counts and sizes.

use clap::Args;
use console::style;
use serde::Serialize;

use pagecraft_core::{DocumentLibrary, LopdfLibrary};

use super::{expand_inputs, read_input};

/// Arguments for the info command.
#[derive(Args)]
pub struct InfoArgs {
    /// Input files or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct FileInfo {
    name: String,
    pages: usize,
    size: usize,
}

pub async fn run(args: InfoArgs) -> anyhow::Result<()> {
    let library = LopdfLibrary::new();
    let mut infos = Vec::new();

    for path in expand_inputs(&args.inputs)? {
        let (name, data) = read_input(&path)?;
        let doc = library
            .load(&data)
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
        infos.push(FileInfo {
            name,
            pages: library.page_count(&doc),
            size: data.len(),
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    for info in &infos {
        println!(
            "{}  {} pages  {} bytes",
            style(&info.name).bold(),
            info.pages,
            info.size
        );
    }
    if infos.len() > 1 {
        let pages: usize = infos.iter().map(|i| i.pages).sum();
        let size: usize = infos.iter().map(|i| i.size).sum();
        println!("{} files, {} pages, {} bytes", infos.len(), pages, size);
    }

    Ok(())
}
