// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Network State Actuator: addresses, routes, neighbour flush, DHCP, MTU.
//!
//! Every mutating operation here either succeeds and returns an undo
//! record for the session's [`crate::ledger::UndoLedger`], or fails and
//! leaves system state untouched — handlers never leave a half-applied
//! change behind.

pub mod address;
pub mod dhcp;
pub mod mtu;
pub mod neighbors;
pub mod route;

pub use address::{add_address, del_address};
pub use dhcp::enable_dhcp;
pub use mtu::set_mtu;
pub use neighbors::flush_neighbors;
pub use route::{add_route, del_route};

/// Address family carried on the wire as a `u16` (`AF_INET` / `AF_INET6`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn from_wire(v: u16) -> Option<Self> {
        match v {
            2 => Some(Family::V4),   // AF_INET
            23 => Some(Family::V6),  // AF_INET6
            _ => None,
        }
    }

    pub fn to_wire(self) -> u16 {
        match self {
            Family::V4 => 2,
            Family::V6 => 23,
        }
    }
}

/// An interface identified either by its LUID-friendly index or by its
/// friendly name; requests carry both fields and resolution prefers the
/// index when it is not `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceRef {
    Index(u32),
    Name(String),
}

impl InterfaceRef {
    pub fn from_wire(index: u32, name: &str) -> Self {
        if index != u32::MAX {
            InterfaceRef::Index(index)
        } else {
            InterfaceRef::Name(name.to_string())
        }
    }
}

/// Undo record for a successfully added unicast IP address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub family: Family,
    pub address: u128,
    pub prefix_len: u8,
    pub iface: InterfaceRef,
}

/// Undo record for a successfully added route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub family: Family,
    pub prefix: u128,
    pub prefix_len: u8,
    pub gateway: u128,
    pub metric: u32,
    pub iface: InterfaceRef,
}
