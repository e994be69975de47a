// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::dns::registry::{interface_params_key, RegKey, NAME_SERVER_VALUE};
use crate::dns::search_list::{append_domains, remove_domains};
use crate::dns::{resolve_scope, reload_resolver, DnsServersRecord, Scope, SearchListRecord};
use crate::errors::Result;
use crate::ledger::UndoRecord;
use crate::net::Family;

/// Result of a successful `add_dns_cfg`: always a server-assignment undo
/// record, plus a search-list undo record when `domains` was non-empty.
pub struct AddDnsCfgOutcome {
    pub servers: UndoRecord,
    pub search_list: Option<UndoRecord>,
}

/// Implements `add_dns_cfg` (§4.E "Servers"): resets name-servers for
/// `(iface, family)` unconditionally, writes the new list, optionally
/// appends to the resolved scope's search list, then triggers a resolver
/// reload.
pub fn add_dns_cfg(
    iface_uuid: &str,
    family: Family,
    addrs: &[u128],
    domains: &str,
) -> Result<AddDnsCfgOutcome> {
    write_name_servers(iface_uuid, family, addrs)?;

    let search_list = if !domains.is_empty() {
        let scope = resolve_scope(iface_uuid)?;
        let record = append_domains(&scope, domains)?;
        Some(UndoRecord::DnsSearchDomains(record))
    } else {
        None
    };

    let scope_for_reload = match &search_list {
        Some(UndoRecord::DnsSearchDomains(r)) => Some(r.scope.clone()),
        _ => None,
    };
    reload_resolver(scope_for_reload.as_ref())?;

    Ok(AddDnsCfgOutcome {
        servers: UndoRecord::DnsServers(DnsServersRecord {
            iface_uuid: iface_uuid.to_string(),
            family_v6: matches!(family, Family::V6),
        }),
        search_list,
    })
}

/// Implements `del_dns_cfg`: clears `NameServer` for `(iface, family)`, and
/// if `domains` was supplied, removes that suffix from the resolved
/// scope's search list.
pub fn del_dns_cfg(iface_uuid: &str, family: Family, domains: &str) -> Result<()> {
    write_name_servers(iface_uuid, family, &[])?;

    if !domains.is_empty() {
        let scope = resolve_scope(iface_uuid)?;
        remove_domains(&SearchListRecord { scope: scope.clone(), domains: domains.to_string() })?;
        reload_resolver(Some(&scope))?;
    } else {
        reload_resolver(None)?;
    }
    Ok(())
}

fn write_name_servers(iface_uuid: &str, family: Family, addrs: &[u128]) -> Result<()> {
    let key_path = interface_params_key(matches!(family, Family::V6), iface_uuid);
    let key = RegKey::open(&key_path, true)?;
    let joined = addrs.iter().map(|a| format_addr(family, *a)).collect::<Vec<_>>().join(",");
    key.set_string(NAME_SERVER_VALUE, &joined)
}

fn format_addr(family: Family, addr: u128) -> String {
    match family {
        Family::V4 => {
            let octets = (addr as u32).to_be_bytes();
            format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
        },
        Family::V6 => std::net::Ipv6Addr::from(addr.to_be_bytes()).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_v4_address_in_dotted_decimal() {
        assert_eq!(format_addr(Family::V4, 0x0a_08_00_01), "10.8.0.1");
    }
}
