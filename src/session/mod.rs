// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Session Worker (§4.H): the seven-step state machine that owns one
//! connected client from `READ_STARTUP` through `TEARDOWN`. Each session
//! runs as its own `tokio` task, spawned by [`crate::dispatcher`].

pub mod auth;
pub mod dispatch;
pub mod handle;
pub mod launch;
pub mod startup;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::windows::named_pipe::{NamedPipeServer, PipeMode, ServerOptions};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use zerocopy::FromBytes;

use crate::cfg::ServiceSettings;
use crate::errors::{ProtocolError, Result, ServiceError};
use crate::eventlog::{EventLog, Severity};
use crate::ledger::UndoLedger;
use crate::pipe_io;
use crate::protocol::ack::AckMessage;
use crate::protocol::codec::decode_request;
use crate::protocol::header::{RequestHeader, HEADER_LEN};
use crate::session::dispatch::{dispatch, DispatchContext};
use crate::session::launch::launch_engine;
use crate::session::startup::parse_startup_blob;

/// Upper bound on a request's declared body size; anything larger than the
/// widest wire variant is engine misbehaviour, not a parse error (§4.H
/// step 6, §7 "Child misbehaviour").
const MAX_REQUEST_BODY_LEN: usize = 1024;

/// Longest a startup blob may be before it is rejected outright; well
/// above any realistic workdir/option/stdin combination, just enough to
/// stop an unbounded read from a misbehaving client.
const MAX_STARTUP_BLOB_LEN: usize = 64 * 1024;

const ENGINE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Decides whether a session's engine option vector is acceptable. The
/// actual whitelist policy is an external collaborator this crate does not
/// define (§1); [`PermissiveOptionChecker`] is the stand-in used when
/// nothing stricter is wired in, the same pattern [`EventLog`] uses for the
/// out-of-scope event-log provider.
pub trait OptionChecker: Send + Sync {
    fn check(&self, options: &str) -> bool;
}

pub struct PermissiveOptionChecker;

impl OptionChecker for PermissiveOptionChecker {
    fn check(&self, _options: &str) -> bool {
        true
    }
}

/// Everything a session needs that outlives the connection itself.
pub struct SessionContext {
    pub settings: Arc<ServiceSettings>,
    pub register_dns_gate: Arc<Semaphore>,
    pub event_log: Arc<dyn EventLog>,
    pub option_checker: Arc<dyn OptionChecker>,
}

/// Runs one session to completion. Never returns an error: every failure
/// path is reported (event log, and where possible the client pipe itself)
/// and then falls through to teardown, matching the state machine's own
/// "on failure, report and go to TEARDOWN" rule.
pub async fn run_session(
    mut client_pipe: NamedPipeServer,
    session_id: u64,
    ctx: SessionContext,
    cancel: CancellationToken,
) {
    if let Err(e) = run(&mut client_pipe, session_id, &ctx, &cancel).await {
        ctx.event_log.report(Severity::Error, e.to_ack_error(), "run_session", &e.to_string());
    }
}

async fn run(
    client_pipe: &mut NamedPipeServer,
    session_id: u64,
    ctx: &SessionContext,
    cancel: &CancellationToken,
) -> Result<()> {
    let io_timeout = ctx.settings.io_timeout;

    // READ_STARTUP
    let blob = match read_startup_blob(client_pipe, io_timeout, cancel).await {
        Ok(None) => return Ok(()),
        Ok(Some(bytes)) => match parse_startup_blob(&bytes) {
            Ok(blob) => blob,
            Err(e) => {
                report_startup_failure(client_pipe, &e, io_timeout, cancel).await;
                return Err(e);
            },
        },
        Err(e) => {
            report_startup_failure(client_pipe, &e, io_timeout, cancel).await;
            return Err(e);
        },
    };

    // AUTHENTICATE
    let identity = match crate::session::auth::authenticate(client_pipe, &ctx.settings.admin_group_name) {
        Ok(identity) => identity,
        Err(e) => {
            report_startup_failure(client_pipe, &e, io_timeout, cancel).await;
            return Err(e);
        },
    };
    if !ctx.option_checker.check(&blob.options) && !identity.is_admin {
        let e = ServiceError::Config("engine option vector rejected".into());
        report_startup_failure(client_pipe, &e, io_timeout, cancel).await;
        return Err(e);
    }

    // LAUNCH_ENGINE
    let engine_pipe_name = engine_pipe_name(&ctx.settings.pipe_instance_suffix, session_id);
    let mut engine_pipe = ServerOptions::new()
        .pipe_mode(PipeMode::Message)
        .max_instances(1)
        .in_buffer_size(128)
        .out_buffer_size(128)
        .reject_remote_clients(true)
        .create(&engine_pipe_name)
        .map_err(ServiceError::Io)?;

    let launched = match launch_engine(&ctx.settings, &identity, &blob.workdir, &blob.options, &engine_pipe_name) {
        Ok(l) => l,
        Err(e) => {
            report_startup_failure(client_pipe, &e, io_timeout, cancel).await;
            return Err(e);
        },
    };

    tokio::time::timeout(ENGINE_CONNECT_TIMEOUT, engine_pipe.connect())
        .await
        .map_err(|_| ServiceError::Other("engine did not connect to its private pipe in time".into()))?
        .map_err(ServiceError::Io)?;

    // REPORT_PID: the pid is carried in the ack's error field rather than
    // a dedicated message type — there is no request to mirror yet, so
    // message_id is 0.
    let pid_header = RequestHeader { message_type: 0, size: 0, message_id: 0 };
    let pid_ack = AckMessage::for_header(&pid_header, launched.pid);
    pipe_io::write_all(client_pipe, &pid_ack.to_bytes(), io_timeout, cancel).await?;

    // FORWARD_STDIN (best-effort)
    forward_stdin(launched.stdin_write, blob.stdin_payload).await;

    let mut ledger = UndoLedger::new();
    {
        let mut dispatch_ctx =
            DispatchContext::new(&mut ledger, &launched.process, &ctx.register_dns_gate, &ctx.settings);
        serve(&mut engine_pipe, &mut dispatch_ctx, io_timeout, cancel, &ctx.event_log).await;
    }

    teardown(launched.process, launched.thread, ledger, ctx).await;
    Ok(())
}

/// Reads one message off the client pipe without assuming its length in
/// advance: waits for data, then reads up to [`MAX_STARTUP_BLOB_LEN`]
/// bytes. `Ok(None)` means the client disconnected before sending
/// anything, which is not itself an error.
async fn read_startup_blob(
    pipe: &mut NamedPipeServer,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Option<Vec<u8>>> {
    use tokio::io::AsyncReadExt;

    pipe_io::wait_readable(pipe, cancel).await?;
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let mut buf = vec![0u8; MAX_STARTUP_BLOB_LEN];
    let n = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(None),
        res = tokio::time::timeout(io_timeout, pipe.read(&mut buf)) => match res {
            Ok(Ok(n)) => n,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => 0,
            Ok(Err(e)) => return Err(ServiceError::Io(e)),
            Err(_) => return Err(ServiceError::Other("startup blob read timed out".into())),
        },
    };
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some(buf))
}

/// Writes the `0x%08x\n%s\n%s` UTF-16 failure report used before
/// `REPORT_PID` is ever reached (§6). Best-effort: if the client has
/// already gone away, the write failing is not itself reported.
async fn report_startup_failure(
    pipe: &mut NamedPipeServer,
    error: &ServiceError,
    io_timeout: Duration,
    cancel: &CancellationToken,
) {
    let code = error.to_ack_error();
    let message = format!("0x{code:08x}\n{error}\n{error}");
    let mut wide: Vec<u8> = Vec::with_capacity(message.len() * 2 + 2);
    for unit in message.encode_utf16() {
        wide.extend_from_slice(&unit.to_le_bytes());
    }
    wide.extend_from_slice(&0u16.to_le_bytes());
    let _ = pipe_io::write_all(pipe, &wide, io_timeout, cancel).await;
}

fn engine_pipe_name(instance_suffix: &str, session_id: u64) -> String {
    format!(r"\\.\pipe\privileged-net-helper{instance_suffix}\service_{session_id}")
}

/// Converts the startup blob's stdin payload to UTF-8 and writes it to the
/// child's stdin pipe, consuming the write-end handle so the pipe closes
/// (signalling EOF to the child) once the write completes.
async fn forward_stdin(stdin_write: crate::session::handle::OwnedHandle, payload: String) {
    let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        #[cfg(windows)]
        {
            use std::io::Write;
            use std::os::windows::io::{FromRawHandle, RawHandle};

            let raw = stdin_write.into_raw();
            let mut file = unsafe { std::fs::File::from_raw_handle(raw.0 as RawHandle) };
            file.write_all(payload.as_bytes())
        }
        #[cfg(not(windows))]
        {
            let _ = stdin_write;
            let _ = payload;
            Ok(())
        }
    })
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "forwarding stdin to engine panicked");
    }
}

/// `SERVE` (§4.H step 6): reads and dispatches requests from the
/// engine-side pipe until a clean disconnect, a cancellation, or engine
/// misbehaviour.
async fn serve(
    engine_pipe: &mut NamedPipeServer,
    ctx: &mut DispatchContext<'_>,
    io_timeout: Duration,
    cancel: &CancellationToken,
    event_log: &Arc<dyn EventLog>,
) {
    loop {
        if pipe_io::wait_readable(engine_pipe, cancel).await.is_err() || cancel.is_cancelled() {
            return;
        }

        let mut header_buf = [0u8; HEADER_LEN];
        let n = match pipe_io::read_exact(engine_pipe, &mut header_buf, io_timeout, cancel).await {
            Ok(n) => n,
            Err(e) => {
                event_log.report(Severity::Warning, e.to_ack_error(), "serve", &e.to_string());
                return;
            },
        };
        if n == 0 {
            return;
        }

        let Some(header) = RequestHeader::ref_from_bytes(&header_buf).ok().copied() else {
            return;
        };
        let body_len = (header.size as usize).saturating_sub(HEADER_LEN);
        if body_len > MAX_REQUEST_BODY_LEN {
            event_log.report(
                Severity::Error,
                ProtocolError::MessageData as u32,
                "serve",
                "engine sent a request larger than the request union; terminating session",
            );
            return;
        }

        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            match pipe_io::read_exact(engine_pipe, &mut body, io_timeout, cancel).await {
                Ok(0) => return,
                Ok(_) => {},
                Err(e) => {
                    event_log.report(Severity::Warning, e.to_ack_error(), "serve", &e.to_string());
                    return;
                },
            }
        }

        let error = match decode_request(&header, &body) {
            Ok(request) => match dispatch(request, ctx).await {
                Ok(()) => 0,
                Err(e) => {
                    event_log.report(Severity::Warning, e.to_ack_error(), "dispatch", &e.to_string());
                    e.to_ack_error()
                },
            },
            Err(proto_err) => proto_err.sentinel() as u32,
        };

        let ack = AckMessage::for_header(&header, error);
        if pipe_io::write_all(engine_pipe, &ack.to_bytes(), io_timeout, cancel).await.is_err() {
            return;
        }
    }
}

/// `TEARDOWN` (§4.H step 7): waits briefly for the child to exit on its
/// own, force-terminates it otherwise, then drains the undo ledger. Handle
/// closure happens as `process`/`thread` are dropped at the end of this
/// function.
async fn teardown(
    process: crate::session::handle::OwnedHandle,
    thread: crate::session::handle::OwnedHandle,
    mut ledger: UndoLedger,
    ctx: &SessionContext,
) {
    wait_or_kill_child(&process).await;
    drop(thread);

    for record in ledger.drain_all() {
        if let Err(e) = undo_one(record) {
            ctx.event_log.report(Severity::Warning, e.to_ack_error(), "teardown", &e.to_string());
        }
    }
}

#[cfg(windows)]
async fn wait_or_kill_child(process: &crate::session::handle::OwnedHandle) {
    use windows::Win32::System::Threading::{TerminateProcess, WaitForSingleObject};

    let raw = process.raw().0 as isize;
    let exited = tokio::task::spawn_blocking(move || unsafe {
        let handle = windows::Win32::Foundation::HANDLE(raw as *mut core::ffi::c_void);
        WaitForSingleObject(handle, CHILD_EXIT_GRACE.as_millis() as u32)
    })
    .await;

    let timed_out = match exited {
        Ok(code) => code != windows::Win32::Foundation::WAIT_OBJECT_0,
        Err(_) => true,
    };
    if timed_out {
        unsafe {
            let _ = TerminateProcess(process.raw(), 1);
        }
    }
}

#[cfg(not(windows))]
async fn wait_or_kill_child(_process: &crate::session::handle::OwnedHandle) {}

fn undo_one(record: crate::ledger::UndoRecord) -> Result<()> {
    use crate::ledger::UndoRecord;

    match record {
        UndoRecord::Address(r) => crate::net::del_address(&r),
        UndoRecord::Route(r) => crate::net::del_route(&r),
        UndoRecord::WfpBlock(r) => crate::firewall::del_wfp_block(&r),
        UndoRecord::DnsServers(r) => {
            crate::dns::servers::del_dns_cfg(&r.iface_uuid, if r.family_v6 { crate::net::Family::V6 } else { crate::net::Family::V4 }, "")
        },
        UndoRecord::DnsSearchDomains(r) => crate::dns::search_list::remove_domains(&r),
        UndoRecord::Wins(r) => crate::dns::del_wins_cfg(&crate::net::InterfaceRef::Name(r.iface_alias)),
        UndoRecord::RingBuffers(mapping) => crate::ring_buffer::unregister(mapping),
    }
}
