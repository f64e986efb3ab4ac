//! portwatch command-line entry point.

use anyhow::Context;
use clap::Parser;
use portwatch::cli::{Cli, Commands};
use portwatch::config::Settings;
use portwatch::error::StartupResult;
use portwatch::output;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.quiet) {
        output::print_error(&format!("{:#}", e));
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> StartupResult<()> {
    let settings = Settings::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Run(cmd) => {
            let cancel = CancellationToken::new();
            install_signal_handlers(cancel.clone());
            cmd.execute(&settings, cli.quiet, cancel).await?;
            info!("goodbye");
        }
        Commands::Show(cmd) => cmd.execute(&settings, cli.quiet).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let default = if verbose {
        "portwatch=debug,info"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default).context("invalid default log filter")?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install tracing subscriber")
}

/// Cancel on the first SIGINT/SIGTERM; exit immediately on the second.
fn install_signal_handlers(cancel: CancellationToken) {
    let received = Arc::new(AtomicUsize::new(0));

    let on_signal = move |name: &'static str| {
        if received.fetch_add(1, Ordering::AcqRel) >= 1 {
            warn!(signal = name, "second signal, exiting now");
            std::process::exit(130);
        }
        info!(signal = name, "shutting down");
        cancel.cancel();
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name) in [
            (SignalKind::interrupt(), "SIGINT"),
            (SignalKind::terminate(), "SIGTERM"),
        ] {
            let on_signal = on_signal.clone();
            tokio::spawn(async move {
                match signal(kind) {
                    Ok(mut stream) => {
                        while stream.recv().await.is_some() {
                            on_signal(name);
                        }
                    }
                    Err(e) => warn!(signal = name, error = %e, "cannot listen for signal"),
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                on_signal("ctrl-c");
            }
        });
    }
}
