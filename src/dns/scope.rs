// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Resolution of the effective DNS search-list scope: group-policy
//! overrides system-wide overrides per-interface (§4.E).

use crate::dns::registry::{
    has_valid_search_list, interface_params_key, RegKey, GROUP_POLICY_DNS_CLIENT, SEARCH_LIST_VALUE,
    SYSTEM_TCPIP_PARAMETERS,
};
use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    GroupPolicy,
    SystemWide,
    PerInterface(String),
}

impl Scope {
    pub fn registry_key(&self) -> String {
        match self {
            Scope::GroupPolicy => GROUP_POLICY_DNS_CLIENT.to_string(),
            Scope::SystemWide => SYSTEM_TCPIP_PARAMETERS.to_string(),
            Scope::PerInterface(uuid) => interface_params_key(false, uuid),
        }
    }
}

/// Probes group-policy, then system-wide, then per-interface (in that
/// order), returning the first scope that already carries a non-empty,
/// syntactically valid `SearchList`. If none does, falls back to
/// per-interface scope — which never contributes an initial list to
/// preserve, so a fresh `InitialSearchList` marker is never needed there.
pub fn resolve_scope(iface_uuid: &str) -> Result<Scope> {
    if scope_has_valid_list(&Scope::GroupPolicy)? {
        return Ok(Scope::GroupPolicy);
    }
    if scope_has_valid_list(&Scope::SystemWide)? {
        return Ok(Scope::SystemWide);
    }
    Ok(Scope::PerInterface(iface_uuid.to_string()))
}

fn scope_has_valid_list(scope: &Scope) -> Result<bool> {
    // A key that fails to open is treated the same as one with no
    // `SearchList` value: the probe moves on to the next scope rather than
    // surfacing an error, since "this scope has not been configured" is the
    // overwhelmingly common reason `RegOpenKeyExW` fails here.
    let Ok(key) = RegKey::open(&scope.registry_key(), false) else {
        return Ok(false);
    };
    match key.get_string(SEARCH_LIST_VALUE)? {
        Some(list) => Ok(has_valid_search_list(&list)),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_interface_key_path_is_scoped_to_the_uuid() {
        let scope = Scope::PerInterface("{ABCD}".to_string());
        assert!(scope.registry_key().ends_with(r"Interfaces\{ABCD}"));
    }
}
