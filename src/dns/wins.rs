// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::cfg::external::run_external;
use crate::dns::WinsRecord;
use crate::errors::Result;
use crate::net::InterfaceRef;

/// Adds WINS servers to an interface via `netsh`; undo is keyed by
/// interface alias rather than index, matching how the del path is
/// invoked.
pub fn add_wins_cfg(iface: &InterfaceRef, addrs: &[u32]) -> Result<WinsRecord> {
    let alias = alias_of(iface)?;
    for (i, addr) in addrs.iter().enumerate() {
        let octets = addr.to_be_bytes();
        let ip = format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);
        let verb = if i == 0 { "set" } else { "add" };
        run_external(
            "netsh",
            &["interface", "ip", verb, "wins", &format!("name={alias}"), "static", &ip],
            std::time::Duration::from_secs(30),
        )?;
    }
    Ok(WinsRecord { iface_alias: alias })
}

pub fn del_wins_cfg(iface: &InterfaceRef) -> Result<()> {
    let alias = alias_of(iface)?;
    run_external(
        "netsh",
        &["interface", "ip", "set", "wins", &format!("name={alias}"), "static", "none"],
        std::time::Duration::from_secs(30),
    )
}

fn alias_of(iface: &InterfaceRef) -> Result<String> {
    match iface {
        InterfaceRef::Name(name) => Ok(name.clone()),
        InterfaceRef::Index(idx) => Ok(idx.to_string()),
    }
}
