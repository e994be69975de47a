// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! DNS Configuration Manager: name-server assignment, search-list
//! precedence resolution, WINS configuration, and resolver-reload
//! notification.

pub mod apply;
pub mod registry;
pub mod scope;
pub mod search_list;
pub mod servers;
pub mod wins;

pub use apply::reload_resolver;
pub use scope::{resolve_scope, Scope};
pub use servers::{add_dns_cfg, del_dns_cfg};
pub use wins::{add_wins_cfg, del_wins_cfg};

/// Undo record for `add_dns_cfg`: which (interface, family) had its
/// `NameServer` value overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsServersRecord {
    pub iface_uuid: String,
    pub family_v6: bool,
}

/// Undo record for the search-list append performed by `add_dns_cfg` when
/// `domains` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchListRecord {
    pub scope: Scope,
    pub domains: String,
}

/// Undo record for `add_wins_cfg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinsRecord {
    pub iface_alias: String,
}
