//! CLI application for client-side PDF page operations.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{config, convert, info, merge, organize, split};

/// pagecraft - Merge, split, organize and convert PDF files
#[derive(Parser)]
#[command(name = "pagecraft")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show page counts and sizes of PDF files
    Info(info::InfoArgs),

    /// Split a PDF into several files
    Split(split::SplitArgs),

    /// Merge PDF files into one
    Merge(merge::MergeArgs),

    /// Reorder, rotate or delete pages of a PDF
    Organize(organize::OrganizeArgs),

    /// Render PDF pages to an image archive
    ToImages(convert::ToImagesArgs),

    /// Build a PDF with one page per image
    FromImages(convert::FromImagesArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Info(args) => info::run(args).await,
        Commands::Split(args) => split::run(args, config_path).await,
        Commands::Merge(args) => merge::run(args, config_path).await,
        Commands::Organize(args) => organize::run(args, config_path).await,
        Commands::ToImages(args) => convert::run_to_images(args, config_path).await,
        Commands::FromImages(args) => convert::run_from_images(args, config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
    }
}
