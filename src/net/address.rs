// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::errors::Result;
use crate::net::{AddressRecord, Family, InterfaceRef};

/// Adds a unicast IP address to an interface and returns the undo record to
/// append to the session's ledger. On any failure, no address is left
/// behind — the underlying create call either fully succeeds or fully
/// fails, there is nothing left here to roll back by hand.
pub fn add_address(record: &AddressRecord) -> Result<()> {
    imp::add(record)
}

/// Removes a unicast IP address previously added with [`add_address`]. The
/// caller is responsible for locating and dropping the matching ledger
/// entry; this function only performs the OS-level removal.
pub fn del_address(record: &AddressRecord) -> Result<()> {
    imp::del(record)
}

#[cfg(windows)]
mod imp {
    use windows::Win32::Foundation::NO_ERROR;
    use windows::Win32::NetworkManagement::IpHelper::{
        CreateUnicastIpAddressEntry, DeleteUnicastIpAddressEntry, MIB_UNICASTIPADDRESS_ROW,
    };

    use super::*;
    use crate::net::route::resolve_luid;

    pub(super) fn add(record: &AddressRecord) -> Result<()> {
        let mut row = build_row(record)?;
        unsafe { CreateUnicastIpAddressEntry(&mut row) }.ok()?;
        Ok(())
    }

    pub(super) fn del(record: &AddressRecord) -> Result<()> {
        let row = build_row(record)?;
        unsafe { DeleteUnicastIpAddressEntry(&row) }.ok()?;
        Ok(())
    }

    fn build_row(record: &AddressRecord) -> Result<MIB_UNICASTIPADDRESS_ROW> {
        let mut row = MIB_UNICASTIPADDRESS_ROW::default();
        unsafe { windows::Win32::NetworkManagement::IpHelper::InitializeUnicastIpAddressEntry(&mut row) };
        row.InterfaceLuid = resolve_luid(&record.iface)?;
        row.OnLinkPrefixLength = record.prefix_len;
        crate::net::route::fill_sockaddr(&mut row.Address, record.family, record.address);
        Ok(row)
    }

    trait WinResultExt {
        fn ok(self) -> Result<()>;
    }
    impl WinResultExt for u32 {
        fn ok(self) -> Result<()> {
            if self == NO_ERROR.0 {
                Ok(())
            } else {
                Err(windows::core::Error::from(windows::Win32::Foundation::WIN32_ERROR(self)).into())
            }
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use super::*;

    pub(super) fn add(_record: &AddressRecord) -> Result<()> {
        Err(crate::errors::ServiceError::Other(
            "address actuation requires Windows".into(),
        ))
    }

    pub(super) fn del(_record: &AddressRecord) -> Result<()> {
        Err(crate::errors::ServiceError::Other(
            "address actuation requires Windows".into(),
        ))
    }
}
