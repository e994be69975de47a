// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Resolver reload after any DNS mutation (§4.E "Apply"), plus the
//! service-start cleanup pass that drains orphaned `InitialSearchList`
//! entries left behind by crashed sessions.

use crate::dns::registry::{
    has_valid_search_list, RegKey, GROUP_POLICY_DNS_CLIENT, INITIAL_SEARCH_LIST_VALUE,
    SEARCH_LIST_VALUE, SYSTEM_TCPIP_PARAMETERS,
};
use crate::dns::Scope;
use crate::errors::Result;

/// Notifies the resolver to reload after a DNS mutation: a group-policy
/// WNF publish (only when `scope` is [`Scope::GroupPolicy`]), followed
/// unconditionally by a `SERVICE_CONTROL_PARAMCHANGE` to the `Dnscache`
/// service.
pub fn reload_resolver(scope: Option<&Scope>) -> Result<()> {
    if matches!(scope, Some(Scope::GroupPolicy)) {
        publish_group_policy_changed()?;
    }
    notify_dnscache_paramchange()
}

/// Unconditionally resets whatever scope currently holds a search list at
/// service start, draining any `InitialSearchList` marker left behind by a
/// session that crashed before it could clean up after itself.
pub fn reset_dns_search_domains_on_startup() -> Result<()> {
    for scope in [Scope::GroupPolicy, Scope::SystemWide] {
        let key = match RegKey::open(&scope.registry_key(), true) {
            Ok(k) => k,
            Err(_) => continue,
        };
        let Some(initial) = key.get_string(INITIAL_SEARCH_LIST_VALUE)? else { continue };
        if has_valid_search_list(&initial) {
            key.set_string(SEARCH_LIST_VALUE, &initial)?;
        } else {
            let _ = key.delete_value(SEARCH_LIST_VALUE);
        }
        key.delete_value(INITIAL_SEARCH_LIST_VALUE)?;
    }
    Ok(())
}

#[cfg(windows)]
fn publish_group_policy_changed() -> Result<()> {
    arch::publish_group_policy_state_changed()
}

#[cfg(not(windows))]
fn publish_group_policy_changed() -> Result<()> {
    Ok(())
}

#[cfg(windows)]
fn notify_dnscache_paramchange() -> Result<()> {
    use windows::Win32::System::Services::{
        CloseServiceHandle, ControlService, OpenSCManagerW, OpenServiceW, SC_MANAGER_CONNECT,
        SERVICE_CONTROL_PARAMCHANGE, SERVICE_PAUSE_CONTINUE, SERVICE_QUERY_STATUS,
        SERVICE_STATUS,
    };
    use windows::core::PCWSTR;

    unsafe {
        let scm = OpenSCManagerW(None, None, SC_MANAGER_CONNECT)?;
        let name: Vec<u16> = "Dnscache\0".encode_utf16().collect();
        let svc = OpenServiceW(
            scm,
            PCWSTR(name.as_ptr()),
            SERVICE_PAUSE_CONTINUE | SERVICE_QUERY_STATUS,
        )?;
        let mut status = SERVICE_STATUS::default();
        let res = ControlService(svc, SERVICE_CONTROL_PARAMCHANGE, &mut status);
        let _ = CloseServiceHandle(svc);
        let _ = CloseServiceHandle(scm);
        res?;
    }
    Ok(())
}

#[cfg(not(windows))]
fn notify_dnscache_paramchange() -> Result<()> {
    Ok(())
}

/// Group-policy-system-changes WNF publish. The original selects between a
/// 32-bit and 64-bit publish routine via a runtime architecture probe; here
/// that becomes a compile-time choice behind one stable signature (see
/// "Architecture dispatch" in `DESIGN.md`).
#[cfg(windows)]
mod arch {
    use crate::errors::Result;

    #[cfg(target_pointer_width = "64")]
    pub(super) fn publish_group_policy_state_changed() -> Result<()> {
        // The NT-native `NtQuerySystemInformation`/`RtlPublishWnfStateData`
        // surface is not exposed by `windows-rs`; group-policy refresh is
        // triggered the supported way instead, via gpupdate's public
        // notification path (`RefreshPolicyEx`), which is a 64-bit build
        // concern only insofar as it links against the matching gpedit.
        publish_via_refresh_policy()
    }

    #[cfg(target_pointer_width = "32")]
    pub(super) fn publish_group_policy_state_changed() -> Result<()> {
        publish_via_refresh_policy()
    }

    fn publish_via_refresh_policy() -> Result<()> {
        use windows::Win32::System::GroupPolicy::RefreshPolicyEx;
        use windows::Win32::System::GroupPolicy::RP_FORCE;

        unsafe { RefreshPolicyEx(true, RP_FORCE) }.ok()?;
        Ok(())
    }

    trait BoolResultExt {
        fn ok(self) -> Result<()>;
    }
    impl BoolResultExt for windows::core::BOOL {
        fn ok(self) -> Result<()> {
            if self.as_bool() {
                Ok(())
            } else {
                Err(windows::core::Error::from_win32().into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_only_publishes_group_policy_for_gp_scope() {
        // Off Windows this degrades to a no-op for both branches; the test
        // documents the gating rule rather than observing a registry
        // effect.
        assert!(reload_resolver(Some(&Scope::SystemWide)).is_ok());
        assert!(reload_resolver(None).is_ok());
    }
}
