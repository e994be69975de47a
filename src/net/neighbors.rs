// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::errors::Result;
use crate::net::{Family, InterfaceRef};

/// Flushes the neighbour (ARP / NDP) cache for one interface and family.
/// Ephemeral effect — never recorded in the undo ledger.
pub fn flush_neighbors(family: Family, iface: &InterfaceRef) -> Result<()> {
    imp::flush(family, iface)
}

#[cfg(windows)]
mod imp {
    use windows::Win32::NetworkManagement::IpHelper::FlushIpNetTable2;
    use windows::Win32::Networking::WinSock::{AF_INET, AF_INET6};

    use super::*;
    use crate::net::route::resolve_luid;

    pub(super) fn flush(family: Family, iface: &InterfaceRef) -> Result<()> {
        let luid = resolve_luid(iface)?;
        let af = match family {
            Family::V4 => AF_INET,
            Family::V6 => AF_INET6,
        };
        unsafe { FlushIpNetTable2(af.0.into(), &luid) }.ok()?;
        Ok(())
    }
}

#[cfg(not(windows))]
mod imp {
    use super::*;

    pub(super) fn flush(_family: Family, _iface: &InterfaceRef) -> Result<()> {
        Err(crate::errors::ServiceError::Other("neighbor flush requires Windows".into()))
    }
}
