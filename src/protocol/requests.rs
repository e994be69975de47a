// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Fixed-width wire structs for every request variant (§6 of the design
//! document). Each struct's `core::mem::size_of` is the authoritative
//! "variant's fixed size" that [`crate::protocol::header::RequestHeader::size`]
//! must match.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::protocol::header::InterfaceWire;

/// Request type discriminants carried in [`RequestHeader::message_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    AddAddress = 1,
    DelAddress = 2,
    AddRoute = 3,
    DelRoute = 4,
    FlushNeighbors = 5,
    AddWfpBlock = 6,
    DelWfpBlock = 7,
    RegisterDns = 8,
    AddDnsCfg = 9,
    DelDnsCfg = 10,
    AddWinsCfg = 11,
    DelWinsCfg = 12,
    EnableDhcp = 13,
    RegisterRingBuffers = 14,
    SetMtu = 15,
}

impl MessageType {
    pub fn from_wire(v: u32) -> Option<Self> {
        Some(match v {
            1 => Self::AddAddress,
            2 => Self::DelAddress,
            3 => Self::AddRoute,
            4 => Self::DelRoute,
            5 => Self::FlushNeighbors,
            6 => Self::AddWfpBlock,
            7 => Self::DelWfpBlock,
            8 => Self::RegisterDns,
            9 => Self::AddDnsCfg,
            10 => Self::DelDnsCfg,
            11 => Self::AddWinsCfg,
            12 => Self::DelWinsCfg,
            13 => Self::EnableDhcp,
            14 => Self::RegisterRingBuffers,
            15 => Self::SetMtu,
            _ => return None,
        })
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct AddressWire {
    pub family: u16,
    pub prefix_len: u8,
    pub _pad: u8,
    pub iface: InterfaceWire,
    pub address: u128,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RouteWire {
    pub family: u16,
    pub prefix_len: u8,
    pub _pad: u8,
    pub iface: InterfaceWire,
    pub prefix: u128,
    pub gateway: u128,
    pub metric: u32,
    pub _pad2: [u8; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FlushNeighborsWire {
    pub family: u16,
    pub _pad: [u8; 2],
    pub iface: InterfaceWire,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct WfpBlockWire {
    pub flags: u32,
    pub iface: InterfaceWire,
}

pub const DNS_MAX_ADDRS: usize = 4;
pub const DNS_DOMAINS_LEN: usize = 512;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DnsCfgWire {
    pub iface: InterfaceWire,
    pub family: u16,
    pub _pad: [u8; 2],
    pub addr_len: u32,
    pub addr: [u128; DNS_MAX_ADDRS],
    pub domains: [u8; DNS_DOMAINS_LEN],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct WinsCfgWire {
    pub iface: InterfaceWire,
    pub addr_len: u32,
    pub addr: [u32; DNS_MAX_ADDRS],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct EnableDhcpWire {
    pub iface: InterfaceWire,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RegisterRingBuffersWire {
    pub device: u64,
    pub send_ring: u64,
    pub recv_ring: u64,
    pub send_tail_event: u64,
    pub recv_tail_event: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SetMtuWire {
    pub family: u16,
    pub _pad: [u8; 2],
    pub iface: InterfaceWire,
    pub mtu: u32,
}
