// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Decodes a `(header, body)` pair into a [`Request`]. This is the single
//! place that enforces the wire-protocol invariant from §4.C: the
//! declared `size`, the bytes actually received, and the variant's fixed
//! size must all agree, or the request is rejected as `MESSAGE_DATA`
//! without touching any system state.

use zerocopy::FromBytes;

use crate::errors::ProtocolError;
use crate::net::{Family, InterfaceRef};
use crate::protocol::header::RequestHeader;
use crate::protocol::requests::*;

/// A decoded, owned request ready for dispatch. Unlike the wire structs in
/// [`crate::protocol::requests`], fields here use the crate's own types
/// (`Family`, `InterfaceRef`) so handlers never see raw wire
/// representations.
#[derive(Debug, Clone)]
pub enum Request {
    AddAddress { family: Family, prefix_len: u8, iface: InterfaceRef, address: u128 },
    DelAddress { family: Family, prefix_len: u8, iface: InterfaceRef, address: u128 },
    AddRoute { family: Family, prefix_len: u8, iface: InterfaceRef, prefix: u128, gateway: u128, metric: u32 },
    DelRoute { family: Family, prefix_len: u8, iface: InterfaceRef, prefix: u128, gateway: u128, metric: u32 },
    FlushNeighbors { family: Family, iface: InterfaceRef },
    AddWfpBlock { flags: u32, iface: InterfaceRef },
    DelWfpBlock { iface: InterfaceRef },
    RegisterDns,
    AddDnsCfg { iface: InterfaceRef, family: Family, addrs: Vec<u128>, domains: String },
    DelDnsCfg { iface: InterfaceRef, family: Family, domains: String },
    AddWinsCfg { iface: InterfaceRef, addrs: Vec<u32> },
    DelWinsCfg { iface: InterfaceRef },
    EnableDhcp { iface: InterfaceRef },
    RegisterRingBuffers { device: u64, send_ring: u64, recv_ring: u64, send_tail_event: u64, recv_tail_event: u64 },
    SetMtu { family: Family, iface: InterfaceRef, mtu: u32 },
}

/// Decodes a request from its header and body bytes.
///
/// `body.len()` must equal `header.size - HEADER_LEN` (the caller is
/// expected to have already confirmed `header.size` matches the number of
/// bytes actually read off the pipe); this function additionally confirms
/// it matches the fixed size of the variant named by `header.message_type`.
pub fn decode_request(header: &RequestHeader, body: &[u8]) -> Result<Request, ProtocolError> {
    let message_type = MessageType::from_wire(header.message_type).ok_or(ProtocolError::MessageType)?;

    macro_rules! parse {
        ($wire:ty) => {
            <$wire>::ref_from_bytes(body).map_err(|_| ProtocolError::MessageData)?
        };
    }

    Ok(match message_type {
        MessageType::AddAddress => {
            let w = parse!(AddressWire);
            Request::AddAddress {
                family: family(w.family)?,
                prefix_len: w.prefix_len,
                iface: w.iface.to_interface_ref(),
                address: w.address,
            }
        },
        MessageType::DelAddress => {
            let w = parse!(AddressWire);
            Request::DelAddress {
                family: family(w.family)?,
                prefix_len: w.prefix_len,
                iface: w.iface.to_interface_ref(),
                address: w.address,
            }
        },
        MessageType::AddRoute => {
            let w = parse!(RouteWire);
            Request::AddRoute {
                family: family(w.family)?,
                prefix_len: w.prefix_len,
                iface: w.iface.to_interface_ref(),
                prefix: w.prefix,
                gateway: w.gateway,
                metric: w.metric,
            }
        },
        MessageType::DelRoute => {
            let w = parse!(RouteWire);
            Request::DelRoute {
                family: family(w.family)?,
                prefix_len: w.prefix_len,
                iface: w.iface.to_interface_ref(),
                prefix: w.prefix,
                gateway: w.gateway,
                metric: w.metric,
            }
        },
        MessageType::FlushNeighbors => {
            let w = parse!(FlushNeighborsWire);
            Request::FlushNeighbors { family: family(w.family)?, iface: w.iface.to_interface_ref() }
        },
        MessageType::AddWfpBlock => {
            let w = parse!(WfpBlockWire);
            Request::AddWfpBlock { flags: w.flags, iface: w.iface.to_interface_ref() }
        },
        MessageType::DelWfpBlock => {
            let w = parse!(WfpBlockWire);
            Request::DelWfpBlock { iface: w.iface.to_interface_ref() }
        },
        MessageType::RegisterDns => Request::RegisterDns,
        MessageType::AddDnsCfg => {
            let w = parse!(DnsCfgWire);
            let (addrs, domains) = decode_dns_cfg(w)?;
            Request::AddDnsCfg { iface: w.iface.to_interface_ref(), family: family(w.family)?, addrs, domains }
        },
        MessageType::DelDnsCfg => {
            let w = parse!(DnsCfgWire);
            let (_, domains) = decode_dns_cfg(w)?;
            Request::DelDnsCfg { iface: w.iface.to_interface_ref(), family: family(w.family)?, domains }
        },
        MessageType::AddWinsCfg => {
            let w = parse!(WinsCfgWire);
            Request::AddWinsCfg { iface: w.iface.to_interface_ref(), addrs: decode_wins_addrs(w) }
        },
        MessageType::DelWinsCfg => {
            let w = parse!(WinsCfgWire);
            Request::DelWinsCfg { iface: w.iface.to_interface_ref() }
        },
        MessageType::EnableDhcp => {
            let w = parse!(EnableDhcpWire);
            Request::EnableDhcp { iface: w.iface.to_interface_ref() }
        },
        MessageType::RegisterRingBuffers => {
            let w = parse!(RegisterRingBuffersWire);
            Request::RegisterRingBuffers {
                device: w.device,
                send_ring: w.send_ring,
                recv_ring: w.recv_ring,
                send_tail_event: w.send_tail_event,
                recv_tail_event: w.recv_tail_event,
            }
        },
        MessageType::SetMtu => {
            let w = parse!(SetMtuWire);
            Request::SetMtu { family: family(w.family)?, iface: w.iface.to_interface_ref(), mtu: w.mtu }
        },
    })
}

fn family(wire: u16) -> Result<Family, ProtocolError> {
    Family::from_wire(wire).ok_or(ProtocolError::MessageData)
}

/// Decodes the address list and domain string shared by `add_dns_cfg` and
/// `del_dns_cfg`. `addr_len` is truncated (not rejected) to the variant's
/// fixed capacity — see the "Open Questions" decision recorded in
/// `DESIGN.md`: the original silently truncates and this crate preserves
/// that behaviour.
fn decode_dns_cfg(w: &DnsCfgWire) -> Result<(Vec<u128>, String), ProtocolError> {
    let len = (w.addr_len as usize).min(DNS_MAX_ADDRS);
    let addrs = w.addr[..len].to_vec();

    let mut domains_buf = w.domains;
    let last = domains_buf.len() - 1;
    domains_buf[last] = 0;
    let nul = domains_buf.iter().position(|&b| b == 0).unwrap_or(last);
    let domains = String::from_utf8_lossy(&domains_buf[..nul]).into_owned();

    Ok((addrs, domains))
}

fn decode_wins_addrs(w: &WinsCfgWire) -> Vec<u32> {
    let len = (w.addr_len as usize).min(DNS_MAX_ADDRS);
    w.addr[..len].to_vec()
}

#[cfg(test)]
mod tests {
    use zerocopy::IntoBytes;

    use super::*;
    use crate::protocol::header::InterfaceWire;

    fn iface(index: u32) -> InterfaceWire {
        InterfaceWire { index, name: [0u8; 256] }
    }

    #[test]
    fn decodes_add_address() {
        let wire = AddressWire {
            family: 2,
            prefix_len: 24,
            _pad: 0,
            iface: iface(3),
            address: 0x0a_08_00_01,
        };
        let header = RequestHeader {
            message_type: MessageType::AddAddress as u32,
            size: (core::mem::size_of::<RequestHeader>() + core::mem::size_of::<AddressWire>()) as u32,
            message_id: 7,
        };
        let req = decode_request(&header, wire.as_bytes()).expect("decode");
        match req {
            Request::AddAddress { family, prefix_len, iface, address } => {
                assert_eq!(family, Family::V4);
                assert_eq!(prefix_len, 24);
                assert_eq!(iface, InterfaceRef::Index(3));
                assert_eq!(address, 0x0a_08_00_01);
            },
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn rejects_undersized_body_as_message_data() {
        let header = RequestHeader { message_type: MessageType::AddAddress as u32, size: 4, message_id: 1 };
        let err = decode_request(&header, &[0u8; 4]).unwrap_err();
        assert_eq!(err, ProtocolError::MessageData);
    }

    #[test]
    fn rejects_unknown_message_type() {
        let header = RequestHeader { message_type: 0xDEAD, size: 12, message_id: 1 };
        let err = decode_request(&header, &[]).unwrap_err();
        assert_eq!(err, ProtocolError::MessageType);
    }

    #[test]
    fn truncates_oversized_dns_addr_len_instead_of_rejecting() {
        let mut wire = DnsCfgWire {
            iface: iface(1),
            family: 2,
            _pad: [0; 2],
            addr_len: 99,
            addr: [0u128; DNS_MAX_ADDRS],
            domains: [0u8; DNS_DOMAINS_LEN],
        };
        wire.addr[0] = 10;
        let (addrs, _) = decode_dns_cfg(&wire).expect("decode");
        assert_eq!(addrs.len(), DNS_MAX_ADDRS);
    }
}
