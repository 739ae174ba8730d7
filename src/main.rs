use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use fotowand::config::{CliArgs, Configuration};
use fotowand::tasks::viewer;

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{level},fotowand={level},winit=warn,reqwest=warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_tracing(args.verbose);

    if let Err(err) = try_main(args) {
        error!(error = ?err, "fotowand exited with error");
        std::process::exit(1);
    }
}

fn try_main(args: CliArgs) -> Result<()> {
    let cfg = Configuration::try_from(args).context("invalid configuration")?;
    info!(
        root = %cfg.photo_root.display(),
        display_time = ?cfg.display_time,
        fade_time = ?cfg.fade_time,
        budget = ?cfg.budget,
        "starting slideshow"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("fotowand-io")
        .build()
        .context("failed to build tokio runtime")?;
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        runtime.spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        runtime.spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sigterm.recv() => {
                            info!("SIGTERM received; initiating shutdown");
                            cancel.cancel();
                        }
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }

    // The viewer owns the main thread; the runtime only serves signals and HTTP.
    let result = viewer::run_windowed(cfg, cancel.clone(), runtime.handle().clone())
        .context("viewer failed");
    cancel.cancel();
    runtime.shutdown_timeout(Duration::from_secs(1));
    result?;
    info!("slideshow stopped");
    Ok(())
}
