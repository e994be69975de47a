// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::errors::Result;
use crate::net::{Family, InterfaceRef};

/// Reads the current `MIB_IPINTERFACE_ROW` for `(iface, family)`, overwrites
/// `NlMtu`, and writes it back. For IPv4, `SitePrefixLength` is cleared per
/// the documented `SetIpInterfaceEntry` contract (it must be zero on IPv4
/// updates or the call fails).
pub fn set_mtu(family: Family, iface: &InterfaceRef, mtu: u32) -> Result<()> {
    imp::set_mtu(family, iface, mtu)
}

#[cfg(windows)]
mod imp {
    use windows::Win32::NetworkManagement::IpHelper::{GetIpInterfaceEntry, MIB_IPINTERFACE_ROW, SetIpInterfaceEntry};
    use windows::Win32::Networking::WinSock::{AF_INET, AF_INET6};

    use super::*;
    use crate::net::route::resolve_luid;

    pub(super) fn set_mtu(family: Family, iface: &InterfaceRef, mtu: u32) -> Result<()> {
        let luid = resolve_luid(iface)?;
        let mut row = MIB_IPINTERFACE_ROW {
            Family: match family {
                Family::V4 => AF_INET,
                Family::V6 => AF_INET6,
            },
            InterfaceLuid: luid,
            ..Default::default()
        };
        unsafe { GetIpInterfaceEntry(&mut row) }.ok()?;

        row.NlMtu = mtu;
        if matches!(family, Family::V4) {
            row.SitePrefixLength = 0;
        }

        unsafe { SetIpInterfaceEntry(&mut row) }.ok()?;
        Ok(())
    }
}

#[cfg(not(windows))]
mod imp {
    use super::*;

    pub(super) fn set_mtu(_family: Family, _iface: &InterfaceRef, _mtu: u32) -> Result<()> {
        Err(crate::errors::ServiceError::Other("set_mtu requires Windows".into()))
    }
}
