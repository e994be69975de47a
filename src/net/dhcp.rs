// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::errors::Result;
use crate::net::InterfaceRef;

/// Enables DHCP on an IPv4 interface via `netsh`. Not undone: DHCP remains
/// enabled after the session ends, matching the original behaviour.
pub fn enable_dhcp(iface: &InterfaceRef) -> Result<()> {
    let index = match iface {
        InterfaceRef::Index(idx) => *idx,
        InterfaceRef::Name(_) => return Err(crate::errors::ServiceError::Other(
            "enable_dhcp requires a resolved interface index".into(),
        )),
    };

    crate::cfg::external::run_external(
        "netsh",
        &[
            "interface",
            "ipv4",
            "set",
            "address",
            &format!("name={index}"),
            "source=dhcp",
        ],
        std::time::Duration::from_secs(30),
    )
}
