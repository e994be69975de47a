// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::protocol::header::RequestHeader;

/// `type = ack` marker value; distinct from every [`crate::protocol::requests::MessageType`].
pub const ACK_MESSAGE_TYPE: u32 = 0xFFFF_FFFF;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct AckMessage {
    pub message_type: u32,
    pub size: u32,
    pub message_id: u32,
    pub error: u32,
}

pub const ACK_LEN: usize = core::mem::size_of::<AckMessage>();

impl AckMessage {
    /// Builds a success or failure ack mirroring `header.message_id`.
    pub fn for_header(header: &RequestHeader, error: u32) -> Self {
        Self {
            message_type: ACK_MESSAGE_TYPE,
            size: ACK_LEN as u32,
            message_id: header.message_id,
            error,
        }
    }

    pub fn to_bytes(&self) -> [u8; ACK_LEN] {
        let mut buf = [0u8; ACK_LEN];
        buf.copy_from_slice(zerocopy::IntoBytes::as_bytes(self));
        buf
    }
}
