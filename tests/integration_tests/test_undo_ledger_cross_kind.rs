// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Exercises §8's "drain is exactly the reverse of append, per kind"
//! property across several undo kinds at once, the way a real session
//! would accumulate them over `add_address`/`add_route`/`add_wins_cfg`
//! calls before an abrupt teardown.

use privileged_net_helper::dns::WinsRecord;
use privileged_net_helper::ledger::{UndoKind, UndoLedger, UndoRecord};
use privileged_net_helper::net::{AddressRecord, Family, InterfaceRef, RouteRecord};

fn address(addr: u128) -> UndoRecord {
    UndoRecord::Address(AddressRecord { family: Family::V4, address: addr, prefix_len: 24, iface: InterfaceRef::Index(7) })
}

fn route(metric: u32) -> UndoRecord {
    UndoRecord::Route(RouteRecord {
        family: Family::V4,
        prefix: 0x0a_08_00_00,
        prefix_len: 16,
        gateway: 0x0a_08_00_01,
        metric,
        iface: InterfaceRef::Index(7),
    })
}

fn wins(alias: &str) -> UndoRecord {
    UndoRecord::Wins(WinsRecord { iface_alias: alias.to_string() })
}

#[test]
fn drain_reverses_each_kind_independently_of_interleaving() {
    let mut ledger = UndoLedger::new();

    // A session touching three different kinds in an interleaved order,
    // as `dispatch()` would if the engine issued add_address, add_route,
    // add_address, add_wins_cfg, add_route in sequence.
    ledger.append(address(1));
    ledger.append(route(100));
    ledger.append(address(2));
    ledger.append(wins("tun0"));
    ledger.append(route(200));

    assert_eq!(ledger.len_of(UndoKind::Address), 2);
    assert_eq!(ledger.len_of(UndoKind::Route), 2);
    assert_eq!(ledger.len_of(UndoKind::Wins), 1);

    let drained = ledger.drain_all();
    assert_eq!(drained.len(), 5);

    let addresses: Vec<u128> = drained
        .iter()
        .filter_map(|r| match r {
            UndoRecord::Address(a) => Some(a.address),
            _ => None,
        })
        .collect();
    assert_eq!(addresses, vec![2, 1]);

    let metrics: Vec<u32> = drained
        .iter()
        .filter_map(|r| match r {
            UndoRecord::Route(route) => Some(route.metric),
            _ => None,
        })
        .collect();
    assert_eq!(metrics, vec![200, 100]);

    assert!(ledger.is_empty());
}

#[test]
fn del_removes_only_the_matching_record_leaving_the_rest_for_teardown() {
    let mut ledger = UndoLedger::new();
    ledger.append(address(1));
    ledger.append(address(2));
    ledger.append(address(3));

    // `del_address` matches the full row before removing it, mirroring
    // §4.D's "full-row memcmp" rule.
    let removed = ledger.remove_matching(UndoKind::Address, |r| match r {
        UndoRecord::Address(a) => a.address == 2,
        _ => false,
    });
    assert!(matches!(removed, Some(UndoRecord::Address(a)) if a.address == 2));

    let drained = ledger.drain_all();
    let remaining: Vec<u128> = drained
        .into_iter()
        .map(|r| match r {
            UndoRecord::Address(a) => a.address,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(remaining, vec![3, 1]);
}
