use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use breach_client::HttpBreachClient;
use loginguards_core::MachinePaths;
use policy_engine::PolicyEngine;

mod audit;
mod ipc;
mod logging;
mod reload;
#[cfg(windows)]
mod service;

use ipc::DecisionService;

#[derive(Parser)]
#[command(name = "loginguards-daemon", version, about = "LoginGuards password decision service")]
struct Args {
    /// Run under the Windows Service Control Manager.
    #[arg(long)]
    service: bool,
    /// Machine data directory (defaults to LOGINGUARDS_HOME or %PROGRAMDATA%\LoginGuards).
    #[arg(long, value_name = "DIR")]
    home: Option<PathBuf>,
}

fn main() -> ExitCode {
    match start(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn start(args: Args) -> Result<()> {
    let paths = match args.home {
        Some(home) => MachinePaths::under(home),
        None => MachinePaths::resolve()?,
    };
    logging::init(&paths.log_dir)?;

    if args.service {
        #[cfg(windows)]
        return service::run(paths);
        #[cfg(not(windows))]
        anyhow::bail!("--service is only available on Windows");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build async runtime")?;
    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_signal(shutdown.clone()));
        run(paths, shutdown).await
    })
}

/// Serves decisions until `shutdown` fires.
pub(crate) async fn run(paths: MachinePaths, shutdown: CancellationToken) -> Result<()> {
    let (snapshot, digest) = reload::initial_snapshot(&paths);
    // Both are bound once; changing them needs a restart.
    let endpoint = snapshot.config.pipe_endpoint.clone();
    let client = HttpBreachClient::new(&snapshot.config.api_base_url)
        .context("build breach API client")?;
    info!(
        api = client.base_url(),
        fail_mode = %snapshot.config.fail_mode,
        credential = snapshot.credential.is_some(),
        "starting decision service"
    );

    let (snapshots, receiver) = watch::channel(Arc::new(snapshot));
    let reloader = tokio::spawn(reload::watch_config(
        paths,
        snapshots,
        digest,
        shutdown.clone(),
    ));

    let service = Arc::new(DecisionService::new(
        PolicyEngine::new(Arc::new(client)),
        receiver,
    ));
    let served = ipc::serve(&endpoint, service, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(err) = reloader.await {
        warn!(error = %err, "configuration watcher ended abnormally");
    }
    info!("decision service stopped");
    served
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested");
    shutdown.cancel();
}
