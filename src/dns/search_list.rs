// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Append/remove of a session's domains against the resolved
//! [`crate::dns::Scope`]'s `SearchList`, with `InitialSearchList`
//! preservation across the session's lifetime.

use crate::dns::registry::{RegKey, INITIAL_SEARCH_LIST_VALUE, SEARCH_LIST_VALUE};
use crate::dns::{Scope, SearchListRecord};
use crate::errors::{Result, ServiceError};

/// Combined `SearchList` buffer is a fixed 2048-wchar field on the wire
/// side this mirrors; appends that would not fit are rejected rather than
/// silently truncated (unlike the DNS address-count truncation decision —
/// a search list is free-form text and silent truncation there would
/// corrupt unrelated domains).
const MAX_SEARCH_LIST_WCHARS: usize = 2048;

/// Appends `domains` to the `SearchList` at `scope`, preserving the prior
/// list under `InitialSearchList` the first time this session touches a
/// scope that already has one. Returns the undo record to append to the
/// ledger.
pub fn append_domains(scope: &Scope, domains: &str) -> Result<SearchListRecord> {
    let key = RegKey::open(&scope.registry_key(), true)?;
    let prior = key.get_string(SEARCH_LIST_VALUE)?.unwrap_or_default();

    if !prior.is_empty() && key.get_string(INITIAL_SEARCH_LIST_VALUE)?.is_none() {
        key.set_string(INITIAL_SEARCH_LIST_VALUE, &prior)?;
    }

    let combined = if prior.is_empty() { domains.to_string() } else { format!("{prior},{domains}") };
    if combined.encode_utf16().count() >= MAX_SEARCH_LIST_WCHARS {
        return Err(ServiceError::Other("combined SearchList exceeds 2048 wchars".into()));
    }

    key.set_string(SEARCH_LIST_VALUE, &combined)?;
    Ok(SearchListRecord { scope: scope.clone(), domains: domains.to_string() })
}

/// Reverses [`append_domains`]: splices the suffix (including its leading
/// separator comma, if any) out of the current list, and restores +
/// deletes the `InitialSearchList` marker if the spliced result exactly
/// matches it.
pub fn remove_domains(record: &SearchListRecord) -> Result<()> {
    let key = RegKey::open(&record.scope.registry_key(), true)?;
    let current = key.get_string(SEARCH_LIST_VALUE)?.unwrap_or_default();

    let spliced = splice_out(&current, &record.domains);
    key.set_string(SEARCH_LIST_VALUE, &spliced)?;

    if let Some(initial) = key.get_string(INITIAL_SEARCH_LIST_VALUE)?
        && initial == spliced
    {
        key.delete_value(INITIAL_SEARCH_LIST_VALUE)?;
    }
    Ok(())
}

/// Removes `suffix` (and its leading separator comma when present) from
/// `list`. Falls back to returning `list` unchanged if `suffix` is not
/// found, since a list mutated between add and remove should not be
/// corrupted by a blind string edit.
fn splice_out(list: &str, suffix: &str) -> String {
    if let Some(stripped) = list.strip_suffix(suffix) {
        if let Some(without_comma) = stripped.strip_suffix(',') {
            return without_comma.to_string();
        }
        if stripped.is_empty() {
            return String::new();
        }
    }
    if let Some(pos) = list.find(suffix) {
        let before = &list[..pos];
        let after = &list[pos + suffix.len()..];
        return format!("{}{}", before.trim_end_matches(','), after);
    }
    list.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splice_out_removes_trailing_suffix_and_comma() {
        assert_eq!(splice_out("corp.example,vpn.example", "vpn.example"), "corp.example");
    }

    #[test]
    fn splice_out_on_sole_entry_yields_empty_string() {
        assert_eq!(splice_out("vpn.example", "vpn.example"), "");
    }

    #[test]
    fn splice_out_leaves_unrelated_list_untouched() {
        assert_eq!(splice_out("corp.example", "vpn.example"), "corp.example");
    }
}
