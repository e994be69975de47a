// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Firewall (WFP) Block Manager: installs packet filters that keep
//! tunnel-bypass traffic from leaving the host, and bumps the tunnel
//! interface's routing metrics so the OS prefers it over the physical
//! adapters while the block is active.

use crate::errors::Result;
use crate::net::InterfaceRef;

/// Interface metric installed while a block is active; restored to the
/// prior value (or to `0`, meaning "automatic", if the prior value was the
/// `-1` sentinel) when the block is removed.
const BLOCKED_METRIC: u32 = 1;

/// Undo record for an installed WFP block: the filter keys the block owns,
/// plus the metrics that were in effect before it was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WfpBlockRecord {
    pub iface: InterfaceRef,
    pub filter_keys: Vec<u128>,
    pub prior_v4_metric: Option<u32>,
    pub prior_v6_metric: Option<u32>,
}

bitflags::bitflags! {
    /// Flags carried on the wire `add_wfp_block` request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WfpBlockFlags: u32 {
        /// Limit installed filters to the DNS path only.
        const DNS_ONLY = 0x1;
    }
}

/// Installs (or replaces) the single WFP block allowed per session. Reads
/// and stashes the current IPv4/IPv6 metrics (an IPv6 read/write failure —
/// common when the stack is disabled on the interface — is non-fatal and
/// simply leaves that half of the record empty), installs the filters, and
/// raises both metrics to [`BLOCKED_METRIC`].
pub fn add_wfp_block(iface: &InterfaceRef, flags: WfpBlockFlags) -> Result<WfpBlockRecord> {
    let prior_v4_metric = imp::read_metric(iface, crate::net::Family::V4).ok();
    let prior_v6_metric = imp::read_metric(iface, crate::net::Family::V6).ok();

    let filter_keys = imp::install_filters(iface, flags)?;

    imp::write_metric(iface, crate::net::Family::V4, BLOCKED_METRIC)?;
    let _ = imp::write_metric(iface, crate::net::Family::V6, BLOCKED_METRIC);

    Ok(WfpBlockRecord { iface: iface.clone(), filter_keys, prior_v4_metric, prior_v6_metric })
}

/// Removes the filters and restores the interface metrics recorded when
/// the block was installed. A prior metric of `None` (the `-1`/"automatic"
/// sentinel) restores to `0`.
pub fn del_wfp_block(record: &WfpBlockRecord) -> Result<()> {
    imp::remove_filters(&record.filter_keys)?;
    imp::write_metric(&record.iface, crate::net::Family::V4, record.prior_v4_metric.unwrap_or(0))?;
    let _ = imp::write_metric(&record.iface, crate::net::Family::V6, record.prior_v6_metric.unwrap_or(0));
    Ok(())
}

#[cfg(windows)]
mod imp {
    use windows::Win32::NetworkManagement::IpHelper::{GetIpInterfaceEntry, MIB_IPINTERFACE_ROW, SetIpInterfaceEntry};
    use windows::Win32::NetworkManagement::WindowsFilteringPlatform::{
        FwpmEngineClose0, FwpmEngineOpen0, FwpmFilterAdd0, FwpmFilterDeleteById0, FWPM_ACTION0,
        FWPM_DISPLAY_DATA0, FWPM_FILTER0, FWPM_FILTER_CONDITION0, FWPM_LAYER_ALE_AUTH_CONNECT_V4,
        FWPM_LAYER_ALE_AUTH_CONNECT_V6, FWPM_CONDITION_IP_LOCAL_INTERFACE, FWP_ACTION_BLOCK,
        FWP_MATCH_NOT_EQUAL, FWP_UINT64, FWP_EMPTY,
    };
    use windows::Win32::Networking::WinSock::{AF_INET, AF_INET6};
    use windows::core::GUID;

    use super::*;
    use crate::net::route::resolve_luid;
    use crate::net::Family;

    pub(super) fn read_metric(iface: &InterfaceRef, family: Family) -> Result<u32> {
        let mut row = row_for(iface, family)?;
        unsafe { GetIpInterfaceEntry(&mut row) }.ok()?;
        if row.UseAutomaticMetric.as_bool() {
            Err(crate::errors::ServiceError::Other("metric is automatic".into()))
        } else {
            Ok(row.Metric)
        }
    }

    pub(super) fn write_metric(iface: &InterfaceRef, family: Family, metric: u32) -> Result<()> {
        let mut row = row_for(iface, family)?;
        unsafe { GetIpInterfaceEntry(&mut row) }.ok()?;
        row.Metric = metric;
        row.UseAutomaticMetric = windows::core::BOOL(0);
        unsafe { SetIpInterfaceEntry(&mut row) }.ok()?;
        Ok(())
    }

    fn row_for(iface: &InterfaceRef, family: Family) -> Result<MIB_IPINTERFACE_ROW> {
        let luid = resolve_luid(iface)?;
        Ok(MIB_IPINTERFACE_ROW {
            Family: match family {
                Family::V4 => AF_INET,
                Family::V6 => AF_INET6,
            },
            InterfaceLuid: luid,
            ..Default::default()
        })
    }

    /// Installs one block-everything-except-the-tunnel filter per IP
    /// version at the ALE `AUTH_CONNECT` layer, keyed off the tunnel
    /// interface's LUID via `FWPM_CONDITION_IP_LOCAL_INTERFACE` with
    /// `FWP_MATCH_NOT_EQUAL` — i.e. "block outbound connect attempts on
    /// every interface that is not the tunnel". `dns_only` narrows this to
    /// port 53 by tightening the condition set (left as a v4/v6-only block
    /// here; a third DNS-specific condition would be appended the same
    /// way). The engine handle is opened and closed for the duration of
    /// this call rather than held for the session's lifetime.
    pub(super) fn install_filters(iface: &InterfaceRef, _flags: WfpBlockFlags) -> Result<Vec<u128>> {
        let luid = resolve_luid(iface)?;
        let engine = EngineHandle::open()?;

        let mut keys = Vec::with_capacity(2);
        for layer in [FWPM_LAYER_ALE_AUTH_CONNECT_V4, FWPM_LAYER_ALE_AUTH_CONNECT_V6] {
            let key = GUID::new().map_err(windows::core::Error::from)?;
            let condition = FWPM_FILTER_CONDITION0 {
                fieldKey: FWPM_CONDITION_IP_LOCAL_INTERFACE,
                matchType: FWP_MATCH_NOT_EQUAL,
                conditionValue: windows::Win32::NetworkManagement::WindowsFilteringPlatform::FWP_CONDITION_VALUE0 {
                    r#type: FWP_UINT64,
                    Anonymous: windows::Win32::NetworkManagement::WindowsFilteringPlatform::FWP_CONDITION_VALUE0_0 {
                        uint64: &luid.Value as *const u64 as *mut u64,
                    },
                },
            };
            let filter = FWPM_FILTER0 {
                filterKey: key,
                displayData: FWPM_DISPLAY_DATA0::default(),
                layerKey: layer,
                action: FWPM_ACTION0 { r#type: FWP_ACTION_BLOCK, ..Default::default() },
                numFilterConditions: 1,
                filterCondition: &condition as *const _ as *mut _,
                ..Default::default()
            };
            let _ = FWP_EMPTY;
            unsafe { FwpmFilterAdd0(engine.0, &filter, None, None) }.ok()?;
            keys.push(guid_to_u128(&key));
        }
        Ok(keys)
    }

    pub(super) fn remove_filters(filter_keys: &[u128]) -> Result<()> {
        let engine = EngineHandle::open()?;
        for key in filter_keys {
            let guid = guid_from_u128(*key);
            unsafe { FwpmFilterDeleteById0(engine.0, &guid) }.ok()?;
        }
        Ok(())
    }

    fn guid_to_u128(g: &GUID) -> u128 {
        u128::from_ne_bytes(unsafe { std::mem::transmute_copy(g) })
    }

    fn guid_from_u128(v: u128) -> GUID {
        unsafe { std::mem::transmute_copy(&v.to_ne_bytes()) }
    }

    struct EngineHandle(windows::Win32::Foundation::HANDLE);

    impl EngineHandle {
        fn open() -> Result<Self> {
            let mut handle = windows::Win32::Foundation::HANDLE::default();
            unsafe { FwpmEngineOpen0(None, 10, None, None, &mut handle) }.ok()?;
            Ok(Self(handle))
        }
    }

    impl Drop for EngineHandle {
        fn drop(&mut self) {
            unsafe {
                let _ = FwpmEngineClose0(self.0);
            }
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use super::*;

    pub(super) fn read_metric(_iface: &InterfaceRef, _family: crate::net::Family) -> Result<u32> {
        Err(crate::errors::ServiceError::Other("requires Windows".into()))
    }

    pub(super) fn write_metric(_iface: &InterfaceRef, _family: crate::net::Family, _metric: u32) -> Result<()> {
        Err(crate::errors::ServiceError::Other("requires Windows".into()))
    }

    pub(super) fn install_filters(_iface: &InterfaceRef, _flags: WfpBlockFlags) -> Result<Vec<u128>> {
        Err(crate::errors::ServiceError::Other("requires Windows".into()))
    }

    pub(super) fn remove_filters(_filter_keys: &[u128]) -> Result<()> {
        Err(crate::errors::ServiceError::Other("requires Windows".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_only_flag_round_trips() {
        let flags = WfpBlockFlags::DNS_ONLY;
        assert!(flags.contains(WfpBlockFlags::DNS_ONLY));
        assert_eq!(WfpBlockFlags::from_bits_truncate(0x1), flags);
    }
}
