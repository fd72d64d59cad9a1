//! Subcommands and the helpers they share.

pub mod config;
pub mod convert;
pub mod info;
pub mod merge;
pub mod organize;
pub mod split;

use std::fs;
use std::path::{Path, PathBuf};

use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use pagecraft_core::models::config::PagecraftConfig;
use pagecraft_core::{BatchOutcome, BatchProgress, CancellationToken, Delivery, ProgressSink};

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pagecraft")
        .join("config.json")
}

/// Configuration from `--config`, else the default file if present, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<PagecraftConfig> {
    if let Some(path) = config_path {
        return Ok(PagecraftConfig::from_file(Path::new(path))?);
    }

    let path = default_config_path();
    if path.exists() {
        debug!("Loading configuration from {}", path.display());
        Ok(PagecraftConfig::from_file(&path)?)
    } else {
        Ok(PagecraftConfig::default())
    }
}

/// Expand glob patterns, keeping plain paths as given. Order follows the
/// arguments; matches of one pattern are sorted.
pub fn expand_inputs(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let path = PathBuf::from(pattern);
        if path.exists() {
            files.push(path);
            continue;
        }

        let mut matched: Vec<PathBuf> = glob(pattern)?.filter_map(|r| r.ok()).collect();
        if matched.is_empty() {
            anyhow::bail!("Input file not found: {}", pattern);
        }
        matched.sort();
        files.append(&mut matched);
    }
    Ok(files)
}

/// Read a file, returning its display name and contents.
pub fn read_input(path: &Path) -> anyhow::Result<(String, Vec<u8>)> {
    let data = fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input.pdf")
        .to_string();
    Ok((name, data))
}

/// Cancel `token` when the user presses Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

/// Progress bar fed by pipeline progress.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_message(label.to_string());
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarProgress {
    fn report(&mut self, progress: BatchProgress) {
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.completed as u64);
    }
}

/// Print where the outputs of a run went.
pub fn report_outcome(outcome: &BatchOutcome<Delivery>, written: &[PathBuf]) {
    match outcome {
        BatchOutcome::Completed(_) => {
            for path in written {
                println!("{} Wrote {}", style("✓").green(), path.display());
            }
        }
        BatchOutcome::Cancelled => {
            println!("{} Cancelled, no files written", style("!").yellow());
        }
    }
}
