// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The fixed-width wire header shared by every request, plus the interface
//! reference embedded in most variants.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const INTERFACE_NAME_LEN: usize = 256;

/// Common `{type, size, message_id}` header prefixing every request.
/// `size` is authoritative: it must equal both the bytes actually received
/// and the fixed size of the variant named by `message_type`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RequestHeader {
    pub message_type: u32,
    pub size: u32,
    pub message_id: u32,
}

pub const HEADER_LEN: usize = core::mem::size_of::<RequestHeader>();

/// Raw on-wire interface reference: an index (`u32::MAX` meaning "use
/// `name` instead") plus a fixed-width, NUL-terminated C-string name.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct InterfaceWire {
    pub index: u32,
    pub name: [u8; INTERFACE_NAME_LEN],
}

impl InterfaceWire {
    /// Returns the name as a `&str`, forcing NUL-termination of the final
    /// byte first so a malicious or buggy peer can never make this read
    /// run past the fixed buffer. Invalid UTF-8 is replaced lossily.
    pub fn name_str(&self) -> String {
        let mut buf = self.name;
        let last = buf.len() - 1;
        buf[last] = 0;
        let nul = buf.iter().position(|&b| b == 0).unwrap_or(last);
        String::from_utf8_lossy(&buf[..nul]).into_owned()
    }

    pub fn to_interface_ref(&self) -> crate::net::InterfaceRef {
        crate::net::InterfaceRef::from_wire(self.index, &self.name_str())
    }
}
