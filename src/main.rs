use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use voice_engine::args::Args;
use voice_engine::cache::ResourceCache;
use voice_engine::daemon::{DaemonLoop, run_once};
use voice_engine::device::{DeviceSelector, NvidiaSmiProbe};
use voice_engine::processor::Worker;
use voice_engine::provider::CommandProviderFactory;
use voice_engine::report::Reporter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is the control channel, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let exe = std::env::current_exe().context("locating the executable")?;
    let exe_dir = exe
        .parent()
        .map(|p| p.to_path_buf())
        .context("executable has no parent directory")?;
    let cwd = std::env::current_dir()?;

    let config = args.config(&exe_dir, &cwd);
    config.prepare().with_context(|| {
        format!("preparing directories under {}", config.models_root.display())
    })?;
    info!("Models root: {}", config.models_root.display());

    let factory = CommandProviderFactory::new(config.commands.clone());
    let devices = DeviceSelector::new(Box::new(NvidiaSmiProbe), config.min_capability);
    let mut reporter = Reporter::new(tokio::io::stdout(), config.preview_chars);
    let mut worker = Worker::new(config, devices, ResourceCache::new(Box::new(factory)));

    if args.daemon {
        let mut daemon = DaemonLoop::new(BufReader::new(tokio::io::stdin()), reporter, worker);
        daemon.run().await?;
        return Ok(());
    }

    let raw = args.params.as_deref().unwrap_or_default();
    if let Err(e) = run_once(&mut worker, raw, &mut reporter).await {
        error!("Request failed: {}", e);
        eprintln!("ERROR: {e}");
        // stop provider processes before exiting
        drop(worker);
        std::process::exit(1);
    }
    Ok(())
}
