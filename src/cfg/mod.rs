//! This module handles configuration, command-line parsing, and logging.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Command-line interface parsing.
pub mod cli;
/// Configuration file parsing and management.
pub mod config;
/// Invocation of external `netsh.exe` / `ipconfig.exe` binaries.
pub mod external;
/// Logger initialization.
pub mod logger;

pub use config::ServiceSettings;
