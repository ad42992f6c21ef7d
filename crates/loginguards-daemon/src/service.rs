//! Entry point when started by the Service Control Manager.

use std::ffi::OsString;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::error;
use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus, ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult};
use windows_service::{define_windows_service, service_dispatcher};

use loginguards_core::MachinePaths;
use system_integration::ServiceSpec;

define_windows_service!(ffi_service_main, service_main);

// Handed from `run` to `service_main`, which the dispatcher calls on its own thread.
static SERVICE_PATHS: OnceLock<MachinePaths> = OnceLock::new();

/// Blocks until the service is stopped.
pub fn run(paths: MachinePaths) -> Result<()> {
    SERVICE_PATHS
        .set(paths)
        .map_err(|_| anyhow::anyhow!("service dispatcher already started"))?;
    service_dispatcher::start(ServiceSpec::NAME, ffi_service_main)
        .context("connect to the service control manager")
}

fn service_main(_arguments: Vec<OsString>) {
    let Some(paths) = SERVICE_PATHS.get().cloned() else {
        error!("service started without machine paths");
        return;
    };
    if let Err(err) = run_service(paths) {
        error!(error = %format!("{err:#}"), "service terminated");
    }
}

fn status(state: ServiceState, controls: ServiceControlAccept, exit_code: u32) -> ServiceStatus {
    ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state: state,
        controls_accepted: controls,
        exit_code: ServiceExitCode::Win32(exit_code),
        checkpoint: 0,
        wait_hint: Duration::default(),
        process_id: None,
    }
}

fn run_service(paths: MachinePaths) -> Result<()> {
    let shutdown = CancellationToken::new();
    let handler_shutdown = shutdown.clone();
    let status_handle = service_control_handler::register(ServiceSpec::NAME, move |control| {
        match control {
            ServiceControl::Stop | ServiceControl::Shutdown => {
                handler_shutdown.cancel();
                ServiceControlHandlerResult::NoError
            }
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            _ => ServiceControlHandlerResult::NotImplemented,
        }
    })
    .context("register service control handler")?;

    status_handle
        .set_service_status(status(
            ServiceState::Running,
            ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
            0,
        ))
        .context("report running")?;

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build async runtime")
        .and_then(|runtime| runtime.block_on(crate::run(paths, shutdown)));

    let exit_code = if result.is_ok() { 0 } else { 1 };
    status_handle
        .set_service_status(status(ServiceState::Stopped, ServiceControlAccept::empty(), exit_code))
        .context("report stopped")?;
    result
}
