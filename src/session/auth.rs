// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `AUTHENTICATE` (§4.H step 2): capture the service's own token, impersonate
//! the connected pipe client long enough to capture its token, SID, and
//! admin-group membership, then revert. The captured client token is later
//! duplicated into a primary token for `CreateProcessAsUserW` (see
//! [`crate::session::launch`]).

use crate::errors::Result;
use crate::session::handle::OwnedHandle;

/// The client's identity as captured during impersonation: a primary token
/// suitable for launching the engine, the client's user SID in its
/// self-relative binary form (used for the DACL built in
/// [`crate::session::launch`] and for logging), and whether the client was a
/// member of the configured admin group at authentication time.
pub struct ClientIdentity {
    pub primary_token: OwnedHandle,
    pub sid: Vec<u8>,
    pub is_admin: bool,
}

#[cfg(windows)]
pub fn authenticate(
    pipe: &tokio::net::windows::named_pipe::NamedPipeServer,
    admin_group_name: &str,
) -> Result<ClientIdentity> {
    imp::authenticate(pipe, admin_group_name)
}

#[cfg(not(windows))]
pub fn authenticate(
    _pipe: &tokio::net::windows::named_pipe::NamedPipeServer,
    _admin_group_name: &str,
) -> Result<ClientIdentity> {
    Err(crate::errors::ServiceError::Other("authentication requires Windows".into()))
}

#[cfg(windows)]
mod imp {
    use std::os::windows::io::AsRawHandle;

    use windows::Win32::Foundation::{BOOL, HANDLE};
    use windows::Win32::Security::{
        CheckTokenMembership, DuplicateTokenEx, GetLengthSid, GetTokenInformation,
        ImpersonateNamedPipeClient, LookupAccountNameW, PSID, RevertToSelf, SecurityImpersonation,
        TOKEN_ALL_ACCESS, TOKEN_QUERY, TOKEN_USER, TokenPrimary, TokenUser,
    };
    use windows::Win32::System::Threading::{GetCurrentThread, OpenThreadToken};
    use windows::core::PWSTR;

    use super::*;

    pub(super) fn authenticate(
        pipe: &tokio::net::windows::named_pipe::NamedPipeServer,
        admin_group_name: &str,
    ) -> Result<ClientIdentity> {
        let handle = HANDLE(pipe.as_raw_handle() as *mut core::ffi::c_void);
        unsafe { ImpersonateNamedPipeClient(handle) }?;

        // Ensures `RevertToSelf` runs on every exit path below, including
        // the `?` early returns.
        struct RevertGuard;
        impl Drop for RevertGuard {
            fn drop(&mut self) {
                unsafe {
                    let _ = RevertToSelf();
                }
            }
        }
        let _revert = RevertGuard;

        let mut impersonation_token = HANDLE::default();
        unsafe {
            OpenThreadToken(
                GetCurrentThread(),
                TOKEN_QUERY | TOKEN_ALL_ACCESS,
                true,
                &mut impersonation_token,
            )
        }?;
        let impersonation_token = unsafe { OwnedHandle::from_raw(impersonation_token) };

        let sid = read_user_sid(&impersonation_token)?;
        // Membership must be checked while still impersonating: passing a
        // null token handle to `CheckTokenMembership` checks the calling
        // thread's own (impersonation) token.
        let is_admin = is_member_of_group(admin_group_name)?;

        let mut primary = HANDLE::default();
        unsafe {
            DuplicateTokenEx(
                impersonation_token.raw(),
                TOKEN_ALL_ACCESS,
                None,
                SecurityImpersonation,
                TokenPrimary,
                &mut primary,
            )
        }?;

        Ok(ClientIdentity { primary_token: unsafe { OwnedHandle::from_raw(primary) }, sid, is_admin })
    }

    /// Reads the `TOKEN_USER.Sid` from `token` and copies it into an owned
    /// buffer (the pointer `GetTokenInformation` fills points inside a
    /// short-lived local buffer, so it must not be retained past return).
    fn read_user_sid(token: &OwnedHandle) -> Result<Vec<u8>> {
        let mut needed = 0u32;
        unsafe {
            let _ = GetTokenInformation(token.raw(), TokenUser, None, 0, &mut needed);
        }
        let mut buf = vec![0u8; needed as usize];
        unsafe {
            GetTokenInformation(
                token.raw(),
                TokenUser,
                Some(buf.as_mut_ptr() as *mut core::ffi::c_void),
                needed,
                &mut needed,
            )
        }?;

        let token_user = unsafe { &*(buf.as_ptr() as *const TOKEN_USER) };
        let sid_len = unsafe { GetLengthSid(token_user.User.Sid) } as usize;
        let sid_ptr = token_user.User.Sid.0 as *const u8;
        Ok(unsafe { std::slice::from_raw_parts(sid_ptr, sid_len) }.to_vec())
    }

    /// Resolves `group_name` to a SID via `LookupAccountNameW` and checks
    /// whether the calling thread's current token (expected to be an
    /// impersonation token at the point this is called) carries it.
    fn is_member_of_group(group_name: &str) -> Result<bool> {
        let mut name: Vec<u16> = group_name.encode_utf16().collect();
        name.push(0);

        let mut sid_len = 0u32;
        let mut domain_len = 0u32;
        let mut use_kind = Default::default();
        unsafe {
            let _ = LookupAccountNameW(
                None,
                windows::core::PCWSTR(name.as_ptr()),
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
                windows::core::PCWSTR(name.as_ptr()),
                Some(PSID(sid_buf.as_mut_ptr() as *mut core::ffi::c_void)),
                &mut sid_len,
                PWSTR(domain_buf.as_mut_ptr()),
                &mut domain_len,
                &mut use_kind,
            )
        }?;

        let group_sid = PSID(sid_buf.as_mut_ptr() as *mut core::ffi::c_void);
        let mut is_member = BOOL(0);
        unsafe { CheckTokenMembership(HANDLE::default(), group_sid, &mut is_member) }?;
        Ok(is_member.as_bool())
    }
}

#[cfg(test)]
mod tests {
    // Token impersonation and SID lookup require a live Windows session and
    // an actual connected pipe client; they're exercised by the crate's
    // integration harness rather than unit tests here.
}
