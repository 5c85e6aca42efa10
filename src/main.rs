// Only the Windows build drives commands from `main`
#[cfg_attr(not(windows), allow(dead_code))]
mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("procmem v{}", env!("CARGO_PKG_VERSION"));

    #[cfg(not(windows))]
    {
        anyhow::bail!("procmem only supports the Windows platform");
    }

    #[cfg(windows)]
    {
        let stdout = std::io::stdout();
        cli::run(procmem::windows::WindowsApi, &cli, &config, &mut stdout.lock())
    }
}
