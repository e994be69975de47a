// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Crate-wide error taxonomy.
//!
//! Every fallible operation in the service returns a [`ServiceError`]
//! (directly, or wrapped by `anyhow::Error` at the call sites that also
//! need `.context()`). The wire protocol only carries a `u32` error code
//! in its ack (see [`crate::protocol::ack`]), so [`ServiceError::to_ack_error`]
//! is the single place that maps a typed error down to that code.

use thiserror::Error;

/// The sentinels carried in an ack's `error` field when the failure is not a
/// bare OS error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AckSentinel {
    Success = 0,
    OpenvpnStartup = 0xE000_0001,
    StartupData = 0xE000_0002,
    MessageData = 0xE000_0003,
    MessageType = 0xE000_0004,
}

/// Violations of the request/ack wire protocol itself, as opposed to
/// failures of the underlying OS call a request asked for.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed startup blob")]
    StartupData,
    #[error("request size did not match the declared variant")]
    MessageData,
    #[error("unknown request message type")]
    MessageType,
    #[error("engine child process exited with a non-zero status")]
    OpenvpnStartup,
}

impl ProtocolError {
    pub fn sentinel(self) -> AckSentinel {
        match self {
            ProtocolError::StartupData => AckSentinel::StartupData,
            ProtocolError::MessageData => AckSentinel::MessageData,
            ProtocolError::MessageType => AckSentinel::MessageType,
            ProtocolError::OpenvpnStartup => AckSentinel::OpenvpnStartup,
        }
    }
}

/// Top-level error type shared by every component.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(windows)]
    #[error(transparent)]
    Windows(#[from] windows::core::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// Maps this error to the `u32` code that belongs in an ack.
    ///
    /// OS errors pass their native code through unchanged so the engine can
    /// report the same `0x%08x` value a user would see from any other
    /// Windows API failure; protocol violations use the fixed sentinels
    /// from [`AckSentinel`].
    pub fn to_ack_error(&self) -> u32 {
        match self {
            #[cfg(windows)]
            ServiceError::Windows(e) => e.code().0 as u32,
            ServiceError::Io(e) => e.raw_os_error().map(|c| c as u32).unwrap_or(1),
            ServiceError::Protocol(p) => p.sentinel() as u32,
            ServiceError::Config(_) | ServiceError::Other(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
