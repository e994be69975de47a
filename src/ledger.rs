// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-session undo ledger.
//!
//! Every privileged mutation a session performs (an added address, an
//! installed route, a WFP block, a DNS search-list edit, a registered ring
//! buffer) appends one record here. At session teardown the ledger is
//! drained kind-by-kind in reverse insertion order, undoing everything the
//! session did regardless of whether it disconnected cleanly or crashed.

use std::collections::HashMap;

use crate::net::{AddressRecord, RouteRecord};

/// One reversible side effect. The actual undo action lives with the
/// component that produced the record (the ledger itself has no notion of
/// how to reverse a record; it only orders and stores them).
#[derive(Debug)]
pub enum UndoRecord {
    Address(AddressRecord),
    Route(RouteRecord),
    WfpBlock(crate::firewall::WfpBlockRecord),
    DnsServers(crate::dns::DnsServersRecord),
    DnsSearchDomains(crate::dns::SearchListRecord),
    Wins(crate::dns::WinsRecord),
    RingBuffers(crate::ring_buffer::RingBufferMapping),
}

/// Discriminant used to key ledger entries; mirrors [`UndoRecord`] without
/// carrying the payload, so callers can look up or remove by kind without
/// constructing a full record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndoKind {
    Address,
    Route,
    WfpBlock,
    DnsServers,
    DnsSearchDomains,
    Wins,
    RingBuffers,
}

impl UndoRecord {
    pub fn kind(&self) -> UndoKind {
        match self {
            UndoRecord::Address(_) => UndoKind::Address,
            UndoRecord::Route(_) => UndoKind::Route,
            UndoRecord::WfpBlock(_) => UndoKind::WfpBlock,
            UndoRecord::DnsServers(_) => UndoKind::DnsServers,
            UndoRecord::DnsSearchDomains(_) => UndoKind::DnsSearchDomains,
            UndoRecord::Wins(_) => UndoKind::Wins,
            UndoRecord::RingBuffers(_) => UndoKind::RingBuffers,
        }
    }
}

/// LIFO-per-kind store of [`UndoRecord`]s owned by a single session.
#[derive(Debug, Default)]
pub struct UndoLedger {
    entries: HashMap<UndoKind, Vec<UndoRecord>>,
}

impl UndoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful mutation. Called once per successful `add_*`
    /// request; never called for a failed mutation.
    pub fn append(&mut self, record: UndoRecord) {
        self.entries.entry(record.kind()).or_default().push(record);
    }

    /// Removes and returns the most recently appended record of `kind`
    /// matching `predicate`, used by `del_*` handlers to drop the entry the
    /// request is explicitly reversing instead of waiting for teardown.
    pub fn remove_matching<F>(&mut self, kind: UndoKind, predicate: F) -> Option<UndoRecord>
    where F: Fn(&UndoRecord) -> bool {
        let records = self.entries.get_mut(&kind)?;
        let pos = records.iter().rposition(predicate)?;
        Some(records.remove(pos))
    }

    /// Drains every record across every kind, each kind in reverse
    /// insertion (LIFO) order. Cross-kind ordering is unspecified — the
    /// side effects are independent of one another.
    pub fn drain_all(&mut self) -> Vec<UndoRecord> {
        let mut out = Vec::new();
        for (_, mut records) in self.entries.drain() {
            records.reverse();
            out.append(&mut records);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|v| v.is_empty())
    }

    #[cfg(test)]
    pub fn len_of(&self, kind: UndoKind) -> usize {
        self.entries.get(&kind).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{AddressRecord, Family, InterfaceRef};

    fn addr_record(addr: u128) -> UndoRecord {
        UndoRecord::Address(AddressRecord {
            family: Family::V4,
            address: addr,
            prefix_len: 24,
            iface: InterfaceRef::Index(7),
        })
    }

    #[test]
    fn append_then_drain_is_lifo_within_kind() {
        let mut ledger = UndoLedger::new();
        ledger.append(addr_record(1));
        ledger.append(addr_record(2));
        ledger.append(addr_record(3));

        let drained = ledger.drain_all();
        let addrs: Vec<u128> = drained
            .into_iter()
            .map(|r| match r {
                UndoRecord::Address(a) => a.address,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(addrs, vec![3, 2, 1]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn remove_matching_drops_only_the_matched_record() {
        let mut ledger = UndoLedger::new();
        ledger.append(addr_record(1));
        ledger.append(addr_record(2));

        let removed = ledger.remove_matching(UndoKind::Address, |r| match r {
            UndoRecord::Address(a) => a.address == 1,
            _ => false,
        });
        assert!(removed.is_some());
        assert_eq!(ledger.len_of(UndoKind::Address), 1);

        let drained = ledger.drain_all();
        assert_eq!(drained.len(), 1);
    }

    #[test]
    fn drain_on_empty_ledger_yields_nothing() {
        let mut ledger = UndoLedger::new();
        assert!(ledger.drain_all().is_empty());
    }
}
