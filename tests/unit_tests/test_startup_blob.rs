// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use privileged_net_helper::session::startup::parse_startup_blob;

fn encode_utf16(parts: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for p in parts {
        for unit in p.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&0u16.to_le_bytes());
    }
    out
}

#[test]
fn preserves_non_ascii_text_in_every_field() {
    let bytes = encode_utf16(&["C:\\Użytkownik\\vpn", "--server München", "café au lait"]);
    let blob = parse_startup_blob(&bytes).expect("parse");
    assert_eq!(blob.workdir, "C:\\Użytkownik\\vpn");
    assert_eq!(blob.options, "--server München");
    assert_eq!(blob.stdin_payload, "café au lait");
}

#[test]
fn rejects_an_empty_buffer() {
    assert!(parse_startup_blob(&[]).is_err());
}

#[test]
fn rejects_four_or_more_strings() {
    let bytes = encode_utf16(&["a", "b", "c", "d"]);
    assert!(parse_startup_blob(&bytes).is_err());
}
