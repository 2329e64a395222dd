mod cmd;
mod config;
mod error;
mod history;
mod manifest;
mod platform;
mod progress;
mod registry;
mod report;
mod shell;
mod units;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imghist")]
#[command(about = "Show the platforms and annotated layer history of a container image")]
#[command(version)]
struct Cli {
    /// Image reference (e.g. alpine:3.20, ghcr.io/owner/app@sha256:...)
    image: String,

    /// Platform whose layer history to show, in the form os/arch[/variant]
    #[arg(long, default_value = "linux/amd64")]
    platform: String,

    /// Disable color output
    #[arg(long)]
    no_color: bool,

    /// Don't try to format shell scripts in the image history
    #[arg(long)]
    no_format: bool,

    /// Log registry traffic and pipeline steps to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = std::env::var("IMGHIST_LOG").unwrap_or_else(|_| {
        if verbose { "imghist=debug".to_string() } else { "imghist=warn".to_string() }
    });
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::new(filter))
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    cmd::history::run(&cli.image, &cli.platform, cli.no_color, cli.no_format).await
}
