// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Parsing of the startup blob the client sends immediately after connect
//! (§3 "Startup blob"): three consecutive NUL-terminated UTF-16LE strings —
//! working directory, engine option string, standard-input payload — with a
//! required trailing NUL.

use crate::errors::{ProtocolError, Result};

/// The three strings carried in a session's startup blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupBlob {
    pub workdir: String,
    pub options: String,
    pub stdin_payload: String,
}

/// Splits `bytes` (raw UTF-16LE, as read off the client pipe) into the three
/// NUL-terminated strings the blob is defined to contain. Rejects anything
/// that doesn't end in a NUL or that doesn't yield exactly three strings,
/// reporting [`ProtocolError::StartupData`] either way — this is the one
/// parse failure in the whole protocol that is fatal to the session rather
/// than merely nacked (see §7).
pub fn parse_startup_blob(bytes: &[u8]) -> Result<StartupBlob> {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return Err(ProtocolError::StartupData.into());
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    if *units.last().unwrap_or(&1) != 0 {
        return Err(ProtocolError::StartupData.into());
    }

    let mut strings = Vec::with_capacity(3);
    let mut start = 0usize;
    for (i, &unit) in units.iter().enumerate() {
        if unit == 0 {
            strings.push(String::from_utf16_lossy(&units[start..i]));
            start = i + 1;
        }
    }
    // A trailing NUL at the very end of the buffer leaves one empty
    // "fourth" string from the split above; that's expected and dropped.
    if start == units.len() {
        // no-op: loop already consumed every NUL
    }

    if strings.len() != 3 {
        return Err(ProtocolError::StartupData.into());
    }

    Ok(StartupBlob {
        workdir: strings[0].clone(),
        options: strings[1].clone(),
        stdin_payload: strings[2].clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(parts: &[&str]) -> Vec<u8> {
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
    fn parses_three_well_formed_strings() {
        let bytes = encode(&["C:\\work", "--opt foo", "stdin-data"]);
        let blob = parse_startup_blob(&bytes).expect("parse");
        assert_eq!(blob.workdir, "C:\\work");
        assert_eq!(blob.options, "--opt foo");
        assert_eq!(blob.stdin_payload, "stdin-data");
    }

    #[test]
    fn parses_three_empty_strings() {
        let bytes = encode(&["", "", ""]);
        let blob = parse_startup_blob(&bytes).expect("parse");
        assert_eq!(blob.workdir, "");
        assert_eq!(blob.stdin_payload, "");
    }

    #[test]
    fn rejects_missing_trailing_nul() {
        let mut bytes = encode(&["a", "b", "c"]);
        bytes.truncate(bytes.len() - 2);
        assert!(parse_startup_blob(&bytes).is_err());
    }

    #[test]
    fn rejects_wrong_string_count() {
        let bytes = encode(&["only-one"]);
        assert!(parse_startup_blob(&bytes).is_err());
    }

    #[test]
    fn rejects_odd_length_buffer() {
        assert!(parse_startup_blob(&[0u8; 3]).is_err());
    }
}
