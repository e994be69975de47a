// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::errors::Result;
use crate::net::{Family, InterfaceRef, RouteRecord};

/// Adds a route and returns nothing; on success the caller appends a
/// [`RouteRecord`] undo entry, on failure the routing table is untouched.
pub fn add_route(record: &RouteRecord) -> Result<()> {
    imp::add(record)
}

pub fn del_route(record: &RouteRecord) -> Result<()> {
    imp::del(record)
}

#[cfg(windows)]
pub(crate) fn resolve_luid(
    iface: &InterfaceRef,
) -> Result<windows::Win32::NetworkManagement::Ndis::NET_LUID_LH> {
    use windows::Win32::NetworkManagement::IpHelper::{
        ConvertInterfaceAliasToLuid, ConvertInterfaceIndexToLuid,
    };
    use windows::core::PCWSTR;

    let mut luid = windows::Win32::NetworkManagement::Ndis::NET_LUID_LH::default();
    match iface {
        InterfaceRef::Index(idx) => unsafe {
            ConvertInterfaceIndexToLuid(*idx, &mut luid)
                .ok()
                .map_err(Into::<windows::core::Error>::into)?;
        },
        InterfaceRef::Name(name) => {
            let mut wide: Vec<u16> = name.encode_utf16().collect();
            wide.push(0);
            unsafe {
                ConvertInterfaceAliasToLuid(PCWSTR(wide.as_ptr()), &mut luid)
                    .ok()
                    .map_err(Into::<windows::core::Error>::into)?;
            }
        },
    }
    Ok(luid)
}

/// Resolves `iface` to the `{GUID}` string the registry's per-interface DNS
/// keys are named after (`ConvertInterfaceLuidToGuid`, formatted with
/// braces to match `Interfaces\{...}` subkey names).
#[cfg(windows)]
pub(crate) fn resolve_iface_uuid(iface: &InterfaceRef) -> Result<String> {
    use windows::Win32::NetworkManagement::IpHelper::ConvertInterfaceLuidToGuid;

    let luid = resolve_luid(iface)?;
    let mut guid = windows::core::GUID::default();
    unsafe { ConvertInterfaceLuidToGuid(&luid, &mut guid) }.ok()?;
    Ok(format!("{{{guid}}}"))
}

#[cfg(not(windows))]
pub(crate) fn resolve_iface_uuid(_iface: &InterfaceRef) -> Result<String> {
    Err(crate::errors::ServiceError::Other("interface GUID resolution requires Windows".into()))
}

/// Fills a `SOCKADDR_INET` from a family + 128-bit address value (the wire
/// format always carries a `u128`; IPv4 addresses use only the low 32 bits).
#[cfg(windows)]
pub(crate) fn fill_sockaddr(
    out: &mut windows::Win32::Networking::WinSock::SOCKADDR_INET,
    family: Family,
    address: u128,
) {
    use windows::Win32::Networking::WinSock::{AF_INET, AF_INET6, IN6_ADDR, IN_ADDR, SOCKADDR_IN, SOCKADDR_IN6};

    match family {
        Family::V4 => {
            let v4 = SOCKADDR_IN {
                sin_family: AF_INET,
                sin_addr: IN_ADDR {
                    S_un: windows::Win32::Networking::WinSock::IN_ADDR_0 {
                        S_addr: (address as u32).to_be(),
                    },
                },
                ..Default::default()
            };
            out.Ipv4 = v4;
        },
        Family::V6 => {
            let bytes = address.to_be_bytes();
            let v6 = SOCKADDR_IN6 {
                sin6_family: AF_INET6,
                sin6_addr: IN6_ADDR {
                    u: windows::Win32::Networking::WinSock::IN6_ADDR_0 { Byte: bytes },
                },
                ..Default::default()
            };
            out.Ipv6 = v6;
        },
    }
}

#[cfg(windows)]
mod imp {
    use windows::Win32::NetworkManagement::IpHelper::{
        CreateIpForwardEntry2, DeleteIpForwardEntry2, InitializeIpForwardEntry, MIB_IPFORWARD_ROW2,
        MIB_IPFORWARD_PROTOCOL,
    };

    use super::*;

    /// `ERROR_OBJECT_ALREADY_EXISTS`, returned when the exact route is
    /// already present; treated as success since the desired state is
    /// already reached.
    const ERROR_OBJECT_ALREADY_EXISTS: u32 = 0x80071392 & 0xFFFF;

    pub(super) fn add(record: &RouteRecord) -> Result<()> {
        let row = build_row(record)?;
        let res = unsafe { CreateIpForwardEntry2(&row) }.ok();
        match res {
            Ok(()) => Ok(()),
            Err(e) if (e.code().0 as u32 & 0xFFFF) == ERROR_OBJECT_ALREADY_EXISTS => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub(super) fn del(record: &RouteRecord) -> Result<()> {
        let row = build_row(record)?;
        unsafe { DeleteIpForwardEntry2(&row) }.ok()?;
        Ok(())
    }

    fn build_row(record: &RouteRecord) -> Result<MIB_IPFORWARD_ROW2> {
        let mut row = MIB_IPFORWARD_ROW2::default();
        unsafe { InitializeIpForwardEntry(&mut row) };
        row.InterfaceLuid = resolve_luid(&record.iface)?;
        row.DestinationPrefix.PrefixLength = record.prefix_len;
        fill_sockaddr(&mut row.DestinationPrefix.Prefix, record.family, record.prefix);
        fill_sockaddr(&mut row.NextHop, record.family, record.gateway);
        row.Metric = record.metric;
        row.Protocol = MIB_IPFORWARD_PROTOCOL(3); // MIB_IPPROTO_NETMGMT
        row.ValidLifetime = 0xFFFF_FFFF;
        row.PreferredLifetime = 0xFFFF_FFFF;
        Ok(row)
    }
}

#[cfg(not(windows))]
mod imp {
    use super::*;

    pub(super) fn add(_record: &RouteRecord) -> Result<()> {
        Err(crate::errors::ServiceError::Other("route actuation requires Windows".into()))
    }

    pub(super) fn del(_record: &RouteRecord) -> Result<()> {
        Err(crate::errors::ServiceError::Other("route actuation requires Windows".into()))
    }
}

#[cfg(not(windows))]
pub(crate) fn resolve_luid(_iface: &InterfaceRef) -> Result<()> {
    Err(crate::errors::ServiceError::Other("requires Windows".into()))
}
