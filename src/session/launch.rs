// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `LAUNCH_ENGINE` (§4.H step 3): build a process DACL granting full access
//! to the service SID and a restricted set to the client SID, then create
//! the engine child with the client's primary token, a null-output,
//! piped-input standard handle set, and a command line that embeds the
//! service-side endpoint of a fresh private named pipe.

use crate::cfg::config::ChildProcessPriority;
use crate::cfg::ServiceSettings;
use crate::errors::Result;
use crate::session::auth::ClientIdentity;
use crate::session::handle::OwnedHandle;

/// Everything the session needs to hold onto about the spawned engine
/// process: the process and primary-thread handles (the former is also the
/// source process `ring_buffer::register` duplicates the client's shared
/// handles from — never the service's own), the PID to report back to the
/// client, and the write end of the stdin pipe for `FORWARD_STDIN`.
pub struct LaunchedEngine {
    pub process: OwnedHandle,
    pub thread: OwnedHandle,
    pub pid: u32,
    pub stdin_write: OwnedHandle,
}

/// Launches the engine with `identity`'s primary token. `workdir` and
/// `options` come from the session's startup blob; `engine_pipe_name` is the
/// service-side endpoint of the private pipe the engine connects back to
/// for request proxying.
pub fn launch_engine(
    settings: &ServiceSettings,
    identity: &ClientIdentity,
    workdir: &str,
    options: &str,
    engine_pipe_name: &str,
) -> Result<LaunchedEngine> {
    imp::launch(settings, identity, workdir, options, engine_pipe_name)
}

#[cfg(windows)]
mod imp {
    use std::os::windows::ffi::OsStrExt;

    use windows::Win32::Foundation::{GENERIC_READ, GENERIC_WRITE, HANDLE};
    use windows::Win32::Security::Authorization::{
        SET_ACCESS, SetEntriesInAclW, TRUSTEE_IS_SID, TRUSTEE_IS_USER, TRUSTEE_W,
    };
    use windows::Win32::Security::{
        ACL, InitializeSecurityDescriptor, LookupAccountNameW, PSID, PROCESS_TRUSTEE_ACCESS,
        SECURITY_ATTRIBUTES, SECURITY_DESCRIPTOR, SetSecurityDescriptorDacl,
    };
    use windows::Win32::Storage::FileSystem::{CREATE_ALWAYS, CreateFileW, FILE_ATTRIBUTE_NORMAL};
    use windows::Win32::System::Pipes::CreatePipe;
    use windows::Win32::System::Environment::{CreateEnvironmentBlock, DestroyEnvironmentBlock};
    use windows::Win32::System::Threading::{
        ABOVE_NORMAL_PRIORITY_CLASS, BELOW_NORMAL_PRIORITY_CLASS, CREATE_UNICODE_ENVIRONMENT,
        CreateProcessAsUserW, HIGH_PRIORITY_CLASS, IDLE_PRIORITY_CLASS, NORMAL_PRIORITY_CLASS,
        PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOW,
    };
    use windows::core::{PCWSTR, PWSTR};

    /// Owns the block `CreateEnvironmentBlock` allocates for the client's
    /// token, freed on every exit path via `DestroyEnvironmentBlock`.
    struct EnvironmentBlock(*mut core::ffi::c_void);

    impl EnvironmentBlock {
        fn for_token(token: HANDLE) -> Result<Self> {
            let mut block = std::ptr::null_mut();
            unsafe { CreateEnvironmentBlock(&mut block, Some(token), false) }?;
            Ok(Self(block))
        }
    }

    impl Drop for EnvironmentBlock {
        fn drop(&mut self) {
            unsafe {
                let _ = DestroyEnvironmentBlock(self.0);
            }
        }
    }

    use super::*;

    pub(super) fn launch(
        settings: &ServiceSettings,
        identity: &ClientIdentity,
        workdir: &str,
        options: &str,
        engine_pipe_name: &str,
    ) -> Result<LaunchedEngine> {
        let process_sd = build_process_security_descriptor(settings, identity)?;

        let (stdin_read, stdin_write) = create_inheritable_pipe()?;
        let null_handle = open_null_device()?;

        let mut process_sa = SECURITY_ATTRIBUTES {
            nLength: core::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: &process_sd as *const _ as *mut core::ffi::c_void,
            bInheritHandle: false.into(),
        };
        let mut thread_sa = SECURITY_ATTRIBUTES {
            nLength: core::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: std::ptr::null_mut(),
            bInheritHandle: false.into(),
        };

        let startup_info = STARTUPINFOW {
            cb: core::mem::size_of::<STARTUPINFOW>() as u32,
            dwFlags: STARTF_USESTDHANDLES,
            hStdInput: stdin_read.raw(),
            hStdOutput: null_handle.raw(),
            hStdError: null_handle.raw(),
            ..Default::default()
        };
        let mut process_information = PROCESS_INFORMATION::default();

        let mut cmdline = wide_nul(&format!(
            "\"{}\" {options} --service-pipe {engine_pipe_name}",
            settings.engine_executable_path
        ));
        let mut workdir_wide = wide_nul(workdir);

        let env_block = EnvironmentBlock::for_token(identity.primary_token.raw())?;

        unsafe {
            CreateProcessAsUserW(
                identity.primary_token.raw(),
                PCWSTR::null(),
                PWSTR(cmdline.as_mut_ptr()),
                Some(&mut process_sa),
                Some(&mut thread_sa),
                true,
                CREATE_UNICODE_ENVIRONMENT | priority_flag(settings.child_process_priority),
                Some(env_block.0 as *const core::ffi::c_void),
                PCWSTR(workdir_wide.as_mut_ptr()),
                &startup_info,
                &mut process_information,
            )
        }?;

        // The read end was only needed so the child could inherit it.
        drop(stdin_read);

        Ok(LaunchedEngine {
            process: unsafe { OwnedHandle::from_raw(process_information.hProcess) },
            thread: unsafe { OwnedHandle::from_raw(process_information.hThread) },
            pid: process_information.dwProcessId,
            stdin_write,
        })
    }

    fn priority_flag(p: ChildProcessPriority) -> windows::Win32::System::Threading::PROCESS_CREATION_FLAGS {
        match p {
            ChildProcessPriority::Idle => IDLE_PRIORITY_CLASS,
            ChildProcessPriority::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
            ChildProcessPriority::Normal => NORMAL_PRIORITY_CLASS,
            ChildProcessPriority::AboveNormal => ABOVE_NORMAL_PRIORITY_CLASS,
            ChildProcessPriority::High => HIGH_PRIORITY_CLASS,
        }
    }

    /// Builds the security descriptor attached to the engine process object
    /// itself: the service's own account gets full access, the client gets
    /// just enough to wait on, query, and read from the process it launched
    /// (§4.H step 3) — never write or terminate-adjacent control beyond
    /// what's listed.
    fn build_process_security_descriptor(
        settings: &ServiceSettings,
        identity: &ClientIdentity,
    ) -> Result<SECURITY_DESCRIPTOR> {
        let service_sid = lookup_sid(&settings.service_user_name)?;
        let client_sid = identity.sid.clone();

        let service_trustee = trustee_for_sid(&service_sid);
        let client_trustee = trustee_for_sid(&client_sid);

        let entries = [
            windows::Win32::Security::Authorization::EXPLICIT_ACCESS_W {
                grfAccessPermissions: windows::Win32::System::Threading::PROCESS_ALL_ACCESS.0,
                grfAccessMode: SET_ACCESS,
                grfInheritance: windows::Win32::Security::Authorization::NO_INHERITANCE,
                Trustee: service_trustee,
            },
            windows::Win32::Security::Authorization::EXPLICIT_ACCESS_W {
                grfAccessPermissions: client_process_rights().0,
                grfAccessMode: SET_ACCESS,
                grfInheritance: windows::Win32::Security::Authorization::NO_INHERITANCE,
                Trustee: client_trustee,
            },
        ];

        let mut acl_ptr: *mut ACL = std::ptr::null_mut();
        unsafe { SetEntriesInAclW(Some(&entries), None, &mut acl_ptr) }.ok()?;
        // `SetEntriesInAclW` returns `WIN32_ERROR`, whose own `.ok()` turns a
        // nonzero code into a `windows::core::Error` that `?` converts via
        // `ServiceError::Windows`.

        let mut sd = SECURITY_DESCRIPTOR::default();
        unsafe {
            InitializeSecurityDescriptor(
                &mut sd as *mut _ as *mut core::ffi::c_void,
                windows::Win32::Security::SECURITY_DESCRIPTOR_REVISION,
            )
        }?;
        unsafe { SetSecurityDescriptorDacl(&mut sd as *mut _ as *mut core::ffi::c_void, true, Some(acl_ptr), false) }?;

        Ok(sd)
    }

    fn client_process_rights() -> PROCESS_TRUSTEE_ACCESS {
        use windows::Win32::Foundation::{STANDARD_RIGHTS_READ, SYNCHRONIZE};
        use windows::Win32::System::Threading::{PROCESS_QUERY_INFORMATION, PROCESS_TERMINATE, PROCESS_VM_READ};
        PROCESS_TRUSTEE_ACCESS(
            STANDARD_RIGHTS_READ.0
                | SYNCHRONIZE.0
                | PROCESS_TERMINATE.0
                | PROCESS_QUERY_INFORMATION.0
                | PROCESS_VM_READ.0,
        )
    }

    fn trustee_for_sid(sid: &[u8]) -> TRUSTEE_W {
        let mut trustee = TRUSTEE_W::default();
        trustee.TrusteeForm = TRUSTEE_IS_SID;
        trustee.TrusteeType = TRUSTEE_IS_USER;
        trustee.ptstrName = PWSTR(sid.as_ptr() as *mut u16);
        trustee
    }

    fn lookup_sid(account: &str) -> Result<Vec<u8>> {
        let mut name: Vec<u16> = account.encode_utf16().collect();
        name.push(0);

        let mut sid_len = 0u32;
        let mut domain_len = 0u32;
        let mut use_kind = Default::default();
        unsafe {
            let _ = LookupAccountNameW(
                None,
                PCWSTR(name.as_ptr()),
                None,
                &mut sid_len,
                PWSTR::null(),
                &mut domain_len,
                &mut use_kind,
            );
        }
        let mut sid_buf = vec![0u8; sid_len as usize];
        let mut domain_buf = vec![0u16; domain_len as usize];
        unsafe {
            LookupAccountNameW(
                None,
                PCWSTR(name.as_ptr()),
                Some(PSID(sid_buf.as_mut_ptr() as *mut core::ffi::c_void)),
                &mut sid_len,
                PWSTR(domain_buf.as_mut_ptr()),
                &mut domain_len,
                &mut use_kind,
            )
        }?;
        Ok(sid_buf)
    }

    fn create_inheritable_pipe() -> Result<(OwnedHandle, OwnedHandle)> {
        let mut sa = SECURITY_ATTRIBUTES {
            nLength: core::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: std::ptr::null_mut(),
            bInheritHandle: true.into(),
        };
        let mut read_handle = HANDLE::default();
        let mut write_handle = HANDLE::default();
        unsafe { CreatePipe(&mut read_handle, &mut write_handle, Some(&mut sa), 0) }?;

        // The write end stays non-inheritable so only the child's inherited
        // read end can be read from by the child.
        windows::Win32::Foundation::SetHandleInformation(
            write_handle,
            windows::Win32::Foundation::HANDLE_FLAG_INHERIT.0,
            windows::Win32::Foundation::HANDLE_FLAGS(0),
        )?;

        Ok(unsafe { (OwnedHandle::from_raw(read_handle), OwnedHandle::from_raw(write_handle)) })
    }

    fn open_null_device() -> Result<OwnedHandle> {
        let mut sa = SECURITY_ATTRIBUTES {
            nLength: core::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: std::ptr::null_mut(),
            bInheritHandle: true.into(),
        };
        let path = wide_nul("NUL");
        let handle = unsafe {
            CreateFileW(
                PCWSTR(path.as_ptr()),
                (GENERIC_READ | GENERIC_WRITE).0,
                windows::Win32::Storage::FileSystem::FILE_SHARE_READ
                    | windows::Win32::Storage::FileSystem::FILE_SHARE_WRITE,
                Some(&mut sa),
                CREATE_ALWAYS,
                FILE_ATTRIBUTE_NORMAL,
                None,
            )
        }?;
        Ok(unsafe { OwnedHandle::from_raw(handle) })
    }

    fn wide_nul(s: &str) -> Vec<u16> {
        let mut v: Vec<u16> = std::ffi::OsStr::new(s).encode_wide().collect();
        v.push(0);
        v
    }

}

#[cfg(not(windows))]
mod imp {
    use super::*;

    pub(super) fn launch(
        _settings: &ServiceSettings,
        _identity: &ClientIdentity,
        _workdir: &str,
        _options: &str,
        _engine_pipe_name: &str,
    ) -> Result<LaunchedEngine> {
        Err(crate::errors::ServiceError::Other("launching the engine requires Windows".into()))
    }
}
