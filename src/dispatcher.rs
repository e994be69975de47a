// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Service Dispatcher (§4.I): accepts client pipe connections and spawns a
//! [`crate::session::run_session`] task per connection.
//!
//! The original's Win32 wait-set `{accept_event, exit_event,
//! …worker_thread_handles}` becomes, in the `tokio` rendering, a
//! `CancellationToken` shared with every session task plus a `JoinSet`
//! tracking them; `tokio::select!` plays the role of
//! `WaitForMultipleObjects`.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::windows::named_pipe::NamedPipeServer;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cfg::ServiceSettings;
use crate::errors::{Result, ServiceError};
use crate::eventlog::{EventLog, Severity};
use crate::session::{OptionChecker, SessionContext, run_session};

/// Grace period given to in-flight sessions to unwind after an accept-loop
/// failure escalates to shutdown (§4.I "on wait failure").
const ACCEPT_FAILURE_GRACE: Duration = Duration::from_millis(500);

pub struct Dispatcher {
    settings: Arc<ServiceSettings>,
    event_log: Arc<dyn EventLog>,
    option_checker: Arc<dyn OptionChecker>,
    register_dns_gate: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        settings: Arc<ServiceSettings>,
        event_log: Arc<dyn EventLog>,
        option_checker: Arc<dyn OptionChecker>,
    ) -> Self {
        Self {
            settings,
            event_log,
            option_checker,
            register_dns_gate: Arc::new(Semaphore::new(1)),
            cancel: CancellationToken::new(),
        }
    }

    /// The token workers and an external shutdown request (e.g. the SCM
    /// stop handler) both observe.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the accept loop until cancelled, then waits for every session
    /// already in flight to finish its own teardown before returning.
    pub async fn run(&self) -> Result<()> {
        let pipe_name = client_pipe_name(&self.settings.pipe_instance_suffix);
        let workers: Mutex<JoinSet<()>> = Mutex::new(JoinSet::new());
        let mut next_session_id: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let mut listener = match imp::create_client_pipe(&pipe_name) {
                Ok(l) => l,
                Err(e) => {
                    self.event_log.report(Severity::Error, e.to_ack_error(), "dispatcher", &e.to_string());
                    self.cancel.cancel();
                    break;
                },
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                res = listener.connect() => match res {
                    Ok(()) => {
                        next_session_id += 1;
                        let session_id = next_session_id;
                        self.spawn_session(&workers, listener, session_id).await;
                    },
                    Err(e) => {
                        self.event_log.report(Severity::Error, 0, "dispatcher accept", &e.to_string());
                        self.cancel.cancel();
                        tokio::time::sleep(ACCEPT_FAILURE_GRACE).await;
                        break;
                    },
                },
            }
        }

        let mut guard = workers.lock().await;
        while guard.join_next().await.is_some() {}
        Ok(())
    }

    async fn spawn_session(&self, workers: &Mutex<JoinSet<()>>, pipe: NamedPipeServer, session_id: u64) {
        let ctx = SessionContext {
            settings: self.settings.clone(),
            register_dns_gate: self.register_dns_gate.clone(),
            event_log: self.event_log.clone(),
            option_checker: self.option_checker.clone(),
        };
        let cancel = self.cancel.clone();
        let mut guard = workers.lock().await;
        guard.spawn(async move { run_session(pipe, session_id, ctx, cancel).await });
    }
}

fn client_pipe_name(instance_suffix: &str) -> String {
    format!(r"\\.\pipe\privileged-net-helper{instance_suffix}\service")
}

#[cfg(windows)]
mod imp {
    use windows::Win32::Foundation::PSID;
    use windows::Win32::Security::Authorization::{
        DENY_ACCESS, EXPLICIT_ACCESS_W, GRANT_ACCESS, NO_INHERITANCE, SET_ACCESS, SetEntriesInAclW, TRUSTEE_IS_SID,
        TRUSTEE_IS_USER, TRUSTEE_W,
    };
    use windows::Win32::Security::{
        ACL, InitializeSecurityDescriptor, SECURITY_DESCRIPTOR, SECURITY_DESCRIPTOR_REVISION, SECURITY_MAX_SID_SIZE,
        SetSecurityDescriptorDacl, WELL_KNOWN_SID_TYPE, WinAuthenticatedUserSid, WinLocalSystemSid, WinWorldSid,
    };
    use windows::Win32::Storage::FileSystem::FILE_GENERIC_READ_WRITE;

    use super::*;

    /// `FILE_CREATE_PIPE_INSTANCE` — the pipe-specific access right
    /// (shares a bit position with `FILE_APPEND_DATA`) that lets a caller
    /// create another instance of an existing named pipe. Not exposed as a
    /// named constant by `windows-rs`; denying it to Everyone is what
    /// stops an unprivileged process from shadowing the service's own pipe
    /// instance.
    const FILE_CREATE_PIPE_INSTANCE: u32 = 0x0004;

    pub(super) fn create_client_pipe(name: &str) -> Result<NamedPipeServer> {
        use tokio::net::windows::named_pipe::{PipeMode, ServerOptions};

        let sd = build_security_descriptor()?;
        let mut sa = windows::Win32::Security::SECURITY_ATTRIBUTES {
            nLength: core::mem::size_of::<windows::Win32::Security::SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: &sd as *const _ as *mut core::ffi::c_void,
            bInheritHandle: false.into(),
        };

        let mut options = ServerOptions::new();
        options
            .pipe_mode(PipeMode::Message)
            .max_instances(255)
            .in_buffer_size(1024)
            .out_buffer_size(1024)
            .reject_remote_clients(true);

        unsafe {
            options
                .create_with_security_attributes_raw(name, &mut sa as *mut _ as *mut core::ffi::c_void)
                .map_err(ServiceError::Io)
        }
    }

    fn build_security_descriptor() -> Result<SECURITY_DESCRIPTOR> {
        let system_sid = well_known_sid(WinLocalSystemSid)?;
        let world_sid = well_known_sid(WinWorldSid)?;
        let auth_users_sid = well_known_sid(WinAuthenticatedUserSid)?;

        let entries = [
            EXPLICIT_ACCESS_W {
                grfAccessPermissions: windows::Win32::Storage::FileSystem::FILE_ALL_ACCESS,
                grfAccessMode: GRANT_ACCESS,
                grfInheritance: NO_INHERITANCE,
                Trustee: trustee_for(&system_sid),
            },
            EXPLICIT_ACCESS_W {
                grfAccessPermissions: FILE_CREATE_PIPE_INSTANCE,
                grfAccessMode: DENY_ACCESS,
                grfInheritance: NO_INHERITANCE,
                Trustee: trustee_for(&world_sid),
            },
            EXPLICIT_ACCESS_W {
                grfAccessPermissions: FILE_GENERIC_READ_WRITE.0,
                grfAccessMode: SET_ACCESS,
                grfInheritance: NO_INHERITANCE,
                Trustee: trustee_for(&auth_users_sid),
            },
        ];

        let mut acl_ptr: *mut ACL = std::ptr::null_mut();
        unsafe { SetEntriesInAclW(Some(&entries), None, &mut acl_ptr) }.ok()?;

        let mut sd = SECURITY_DESCRIPTOR::default();
        unsafe { InitializeSecurityDescriptor(&mut sd as *mut _ as *mut core::ffi::c_void, SECURITY_DESCRIPTOR_REVISION) }?;
        unsafe { SetSecurityDescriptorDacl(&mut sd as *mut _ as *mut core::ffi::c_void, true, Some(acl_ptr), false) }?;
        Ok(sd)
    }

    fn trustee_for(sid: &[u8]) -> TRUSTEE_W {
        let mut trustee = TRUSTEE_W::default();
        trustee.TrusteeForm = TRUSTEE_IS_SID;
        trustee.TrusteeType = TRUSTEE_IS_USER;
        trustee.ptstrName = windows::core::PWSTR(sid.as_ptr() as *mut u16);
        trustee
    }

    /// Builds a well-known SID (local system, world/everyone, or
    /// authenticated users) into an owned byte buffer.
    fn well_known_sid(kind: WELL_KNOWN_SID_TYPE) -> Result<Vec<u8>> {
        use windows::Win32::Security::CreateWellKnownSid;

        let mut buf = vec![0u8; SECURITY_MAX_SID_SIZE as usize];
        let mut len = buf.len() as u32;
        unsafe { CreateWellKnownSid(kind, None, PSID(buf.as_mut_ptr() as *mut core::ffi::c_void), &mut len) }?;
        buf.truncate(len as usize);
        Ok(buf)
    }
}

#[cfg(not(windows))]
mod imp {
    use super::*;

    pub(super) fn create_client_pipe(_name: &str) -> Result<NamedPipeServer> {
        Err(ServiceError::Other("named pipe creation requires Windows".into()))
    }
}
