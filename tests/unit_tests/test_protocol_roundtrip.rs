// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use privileged_net_helper::net::{Family, InterfaceRef};
use privileged_net_helper::protocol::codec::{decode_request, Request};
use privileged_net_helper::protocol::header::{InterfaceWire, RequestHeader, HEADER_LEN};
use privileged_net_helper::protocol::requests::*;
use zerocopy::IntoBytes;

fn iface_by_name(name: &str) -> InterfaceWire {
    let mut buf = [0u8; 256];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    InterfaceWire { index: u32::MAX, name: buf }
}

fn header_for<T>(message_type: MessageType, message_id: u32) -> RequestHeader {
    RequestHeader {
        message_type: message_type as u32,
        size: (HEADER_LEN + core::mem::size_of::<T>()) as u32,
        message_id,
    }
}

#[test]
fn round_trips_a_route_by_interface_name() {
    let wire = RouteWire {
        family: 23,
        prefix_len: 64,
        _pad: 0,
        iface: iface_by_name("eth-tun0"),
        prefix: 0x2001_0db8_0000_0000_0000_0000_0000_0000,
        gateway: 0,
        metric: 5,
        _pad2: [0; 4],
    };
    let header = header_for::<RouteWire>(MessageType::AddRoute, 42);

    let request = decode_request(&header, wire.as_bytes()).expect("decode");
    match request {
        Request::AddRoute { family, prefix_len, iface, prefix, gateway, metric } => {
            assert_eq!(family, Family::V6);
            assert_eq!(prefix_len, 64);
            assert_eq!(iface, InterfaceRef::Name("eth-tun0".into()));
            assert_eq!(prefix, 0x2001_0db8_0000_0000_0000_0000_0000_0000);
            assert_eq!(gateway, 0);
            assert_eq!(metric, 5);
        },
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn round_trips_register_ring_buffers() {
    let wire = RegisterRingBuffersWire {
        device: 0x1000,
        send_ring: 0x2000,
        recv_ring: 0x3000,
        send_tail_event: 0x4000,
        recv_tail_event: 0x5000,
    };
    let header = header_for::<RegisterRingBuffersWire>(MessageType::RegisterRingBuffers, 1);

    let request = decode_request(&header, wire.as_bytes()).expect("decode");
    match request {
        Request::RegisterRingBuffers { device, send_ring, recv_ring, send_tail_event, recv_tail_event } => {
            assert_eq!(device, 0x1000);
            assert_eq!(send_ring, 0x2000);
            assert_eq!(recv_ring, 0x3000);
            assert_eq!(send_tail_event, 0x4000);
            assert_eq!(recv_tail_event, 0x5000);
        },
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn round_trips_set_mtu_by_interface_index() {
    let wire = SetMtuWire { family: 2, _pad: [0; 2], iface: InterfaceWire { index: 9, name: [0u8; 256] }, mtu: 1400 };
    let header = header_for::<SetMtuWire>(MessageType::SetMtu, 3);

    let request = decode_request(&header, wire.as_bytes()).expect("decode");
    match request {
        Request::SetMtu { family, iface, mtu } => {
            assert_eq!(family, Family::V4);
            assert_eq!(iface, InterfaceRef::Index(9));
            assert_eq!(mtu, 1400);
        },
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn round_trips_del_dns_cfg_with_multiple_domains() {
    let mut wire = DnsCfgWire {
        iface: iface_by_name("wan0"),
        family: 2,
        _pad: [0; 2],
        addr_len: 0,
        addr: [0u128; DNS_MAX_ADDRS],
        domains: [0u8; DNS_DOMAINS_LEN],
    };
    let domains = "corp.example.com";
    wire.domains[..domains.len()].copy_from_slice(domains.as_bytes());
    let header = header_for::<DnsCfgWire>(MessageType::DelDnsCfg, 5);

    let request = decode_request(&header, wire.as_bytes()).expect("decode");
    match request {
        Request::DelDnsCfg { iface, family, domains: got } => {
            assert_eq!(iface, InterfaceRef::Name("wan0".into()));
            assert_eq!(family, Family::V4);
            assert_eq!(got, "corp.example.com");
        },
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn rejects_a_body_shorter_than_its_declared_size() {
    let header = RequestHeader { message_type: MessageType::RegisterRingBuffers as u32, size: 9999, message_id: 1 };
    // `size` claims a much larger body than what is actually supplied.
    let short_body = [0u8; 4];
    let err = decode_request(&header, &short_body).unwrap_err();
    assert_eq!(err, privileged_net_helper::errors::ProtocolError::MessageData);
}
