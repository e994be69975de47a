// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use privileged_net_helper::{
    cfg::{cli::resolve_config_path, config::ServiceSettings, logger::init_logger},
    dispatcher::Dispatcher,
    eventlog::TracingEventLog,
    session::PermissiveOptionChecker,
};
use tracing::info;

/// Path (relative to the working directory) of the settings file, mirroring
/// the teacher's own hardcoded-then-resolved config path convention.
const SETTINGS_PATH: &str = "config/settings.yaml";

fn load_settings() -> Result<ServiceSettings> {
    resolve_config_path(SETTINGS_PATH)
        .and_then(ServiceSettings::load_from_file)
        .context("failed to resolve or load service settings")
}

/// Builds the dispatcher and drives its accept loop to completion on a
/// fresh multi-thread `tokio` runtime. Shared by both the SCM-driven and
/// console entry points so there is exactly one place that wires settings,
/// logging, and the dispatcher together.
fn run_dispatcher(settings: ServiceSettings, stop: std::sync::mpsc::Receiver<()>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("failed to build tokio runtime")?;
    rt.block_on(async move {
        let settings = Arc::new(settings);
        let dispatcher = Dispatcher::new(settings, Arc::new(TracingEventLog), Arc::new(PermissiveOptionChecker));
        let cancel = dispatcher.cancellation_token();

        let watcher = tokio::task::spawn_blocking(move || {
            let _ = stop.recv();
        });
        let cancel_on_stop = cancel.clone();
        tokio::spawn(async move {
            let _ = watcher.await;
            cancel_on_stop.cancel();
        });

        dispatcher.run().await
    })?;
    Ok(())
}

#[cfg(windows)]
mod service {
    use std::ffi::OsString;
    use std::time::Duration;

    use anyhow::Result;
    use windows_service::service::{
        ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus, ServiceType,
    };
    use windows_service::service_control_handler::{self, ServiceControlHandlerResult};
    use windows_service::{define_windows_service, service_dispatcher};

    use super::*;

    pub const SERVICE_NAME: &str = "PrivilegedNetHelper";
    const SERVICE_TYPE: ServiceType = ServiceType::OWN_PROCESS;

    define_windows_service!(ffi_service_main, service_main);

    pub fn run() -> Result<()> {
        service_dispatcher::start(SERVICE_NAME, ffi_service_main).context("failed to start service dispatcher")
    }

    fn service_main(_arguments: Vec<OsString>) {
        if let Err(e) = service_main_inner() {
            tracing::error!(error = %e, "service main exited with an error");
        }
    }

    fn service_main_inner() -> Result<()> {
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();

        let event_handler = move |control_event| -> ServiceControlHandlerResult {
            match control_event {
                ServiceControl::Stop | ServiceControl::Shutdown => {
                    let _ = stop_tx.send(());
                    ServiceControlHandlerResult::NoError
                },
                ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
                _ => ServiceControlHandlerResult::NotImplemented,
            }
        };

        let status_handle =
            service_control_handler::register(SERVICE_NAME, event_handler).context("failed to register service control handler")?;

        let report = |state, controls_accepted: ServiceControlAccept| {
            let _ = status_handle.set_service_status(ServiceStatus {
                service_type: SERVICE_TYPE,
                current_state: state,
                controls_accepted,
                exit_code: ServiceExitCode::Win32(0),
                checkpoint: 0,
                wait_hint: Duration::default(),
                process_id: None,
            });
        };

        report(ServiceState::StartPending, ServiceControlAccept::empty());

        let settings = load_settings()?;
        let _logger_guard = init_logger(&settings.logger)?;
        info!(service = SERVICE_NAME, "starting");

        reset_dns_search_domains_on_startup(&settings);

        report(ServiceState::Running, ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN);

        let result = run_dispatcher(settings, stop_rx);

        report(ServiceState::Stopped, ServiceControlAccept::empty());
        result
    }
}

/// Clears any stale per-interface DNS search-list entries this service left
/// behind before a previous shutdown, so a crashed or killed prior instance
/// cannot leave dangling search domains active after a restart. Best-effort:
/// failures here are logged, not fatal to startup.
fn reset_dns_search_domains_on_startup(_settings: &ServiceSettings) {
    if let Err(e) = privileged_net_helper::dns::apply::reset_dns_search_domains_on_startup() {
        tracing::warn!(error = %e, "failed to reset orphaned DNS search-list state at startup");
    }
}

#[cfg(windows)]
fn main() -> Result<()> {
    if std::env::args().any(|a| a == "--console") {
        return run_console();
    }
    service::run()
}

#[cfg(not(windows))]
fn main() -> Result<()> {
    run_console()
}

/// Runs the dispatcher directly on the current console session rather than
/// through the Service Control Manager; useful for local testing and the
/// only supported mode off Windows.
fn run_console() -> Result<()> {
    let settings = load_settings()?;
    let _logger_guard = init_logger(&settings.logger)?;
    info!("starting in console mode");

    reset_dns_search_domains_on_startup(&settings);

    let (stop_tx, stop_rx) = std::sync::mpsc::channel();
    ctrlc_handler(stop_tx)?;

    run_dispatcher(settings, stop_rx)
}

#[cfg(windows)]
fn ctrlc_handler(stop_tx: std::sync::mpsc::Sender<()>) -> Result<()> {
    use windows::Win32::System::Console::{SetConsoleCtrlHandler, CTRL_C_EVENT};

    // A thread-local sender is unnecessary: the handler callback is
    // process-global by construction, so a single leaked sender behind a
    // `OnceLock` matches the one-console-session-per-process assumption of
    // `run_console`.
    static STOP_TX: std::sync::OnceLock<std::sync::mpsc::Sender<()>> = std::sync::OnceLock::new();
    let _ = STOP_TX.set(stop_tx);

    unsafe extern "system" fn handler(ctrl_type: u32) -> windows::Win32::Foundation::BOOL {
        if ctrl_type == CTRL_C_EVENT.0 {
            if let Some(tx) = STOP_TX.get() {
                let _ = tx.send(());
            }
            windows::Win32::Foundation::TRUE
        } else {
            windows::Win32::Foundation::FALSE
        }
    }

    unsafe { SetConsoleCtrlHandler(Some(handler), true) }.context("failed to install Ctrl+C handler")?;
    Ok(())
}

#[cfg(not(windows))]
fn ctrlc_handler(stop_tx: std::sync::mpsc::Sender<()>) -> Result<()> {
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("failed to install Ctrl+C handler")
}
