// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A scoped `HKEY` wrapper and the small set of string-value helpers the
//! DNS configuration manager needs. Every key opened through [`RegKey::open`]
//! is closed on drop, following the handle-ownership convention used
//! throughout this crate (see `DESIGN.md`).

use crate::errors::Result;

pub const GROUP_POLICY_DNS_CLIENT: &str = r"SOFTWARE\Policies\Microsoft\Windows NT\DNSClient";
pub const SYSTEM_TCPIP_PARAMETERS: &str = r"System\CurrentControlSet\Services\TCPIP\Parameters";
pub const SEARCH_LIST_VALUE: &str = "SearchList";
pub const INITIAL_SEARCH_LIST_VALUE: &str = "InitialSearchList";
pub const NAME_SERVER_VALUE: &str = "NameServer";

pub fn interface_params_key(family_v6: bool, iface_uuid: &str) -> String {
    let service = if family_v6 { "Tcpip6" } else { "TCPIP" };
    format!(r"System\CurrentControlSet\Services\{service}\Parameters\Interfaces\{iface_uuid}")
}

/// A registry key name or value can never legitimately contain an embedded
/// NUL; surfacing that as `STARTUP_DATA`-style malformed input rather than
/// panicking matches this crate's no-`unwrap` convention.
#[cfg(windows)]
fn interior_nul_error() -> crate::errors::ServiceError {
    crate::errors::ServiceError::Other("registry key or value name contains an embedded NUL".into())
}

#[cfg(windows)]
pub struct RegKey(windows::Win32::System::Registry::HKEY);

#[cfg(windows)]
impl RegKey {
    pub fn open(subkey: &str, writable: bool) -> Result<Self> {
        use widestring::U16CString;
        use windows::Win32::System::Registry::{
            RegOpenKeyExW, HKEY_LOCAL_MACHINE, KEY_QUERY_VALUE, KEY_SET_VALUE,
        };
        use windows::core::PCWSTR;

        let wide = U16CString::from_str(subkey).map_err(|_| interior_nul_error())?;
        let access = if writable { KEY_QUERY_VALUE | KEY_SET_VALUE } else { KEY_QUERY_VALUE };

        let mut hkey = Default::default();
        unsafe {
            RegOpenKeyExW(HKEY_LOCAL_MACHINE, PCWSTR(wide.as_ptr()), 0, access, &mut hkey)
        }
        .ok()?;
        Ok(Self(hkey))
    }

    /// Reads a `REG_SZ` value, returning `None` if it is absent.
    pub fn get_string(&self, value: &str) -> Result<Option<String>> {
        use widestring::{U16CString, U16Str};
        use windows::Win32::System::Registry::{RegQueryValueExW, REG_SZ};
        use windows::core::PCWSTR;

        let wide_name = U16CString::from_str(value).map_err(|_| interior_nul_error())?;

        let mut kind = REG_SZ;
        let mut size: u32 = 0;
        let status = unsafe {
            RegQueryValueExW(
                self.0,
                PCWSTR(wide_name.as_ptr()),
                None,
                Some(&mut kind),
                None,
                Some(&mut size),
            )
        };
        if status.is_err() || size == 0 {
            return Ok(None);
        }

        let mut buf = vec![0u16; (size as usize).div_ceil(2)];
        unsafe {
            RegQueryValueExW(
                self.0,
                PCWSTR(wide_name.as_ptr()),
                None,
                Some(&mut kind),
                Some(buf.as_mut_ptr() as *mut u8),
                Some(&mut size),
            )
        }
        .ok()?;

        let s = U16Str::from_slice(&buf).to_string_lossy();
        Ok(Some(s.trim_end_matches('\0').to_string()))
    }

    pub fn set_string(&self, value: &str, data: &str) -> Result<()> {
        use widestring::U16CString;
        use windows::Win32::System::Registry::{RegSetValueExW, REG_SZ};
        use windows::core::PCWSTR;

        let wide_name = U16CString::from_str(value).map_err(|_| interior_nul_error())?;
        let wide_data = U16CString::from_str(data).map_err(|_| interior_nul_error())?;
        // `RegSetValueExW` wants the trailing NUL included in the byte count.
        let bytes = unsafe {
            std::slice::from_raw_parts(wide_data.as_ptr() as *const u8, (wide_data.len() + 1) * 2)
        };

        unsafe { RegSetValueExW(self.0, PCWSTR(wide_name.as_ptr()), 0, REG_SZ, Some(bytes)) }.ok()?;
        Ok(())
    }

    pub fn delete_value(&self, value: &str) -> Result<()> {
        use widestring::U16CString;
        use windows::Win32::System::Registry::RegDeleteValueW;
        use windows::core::PCWSTR;

        let wide_name = U16CString::from_str(value).map_err(|_| interior_nul_error())?;
        unsafe { RegDeleteValueW(self.0, PCWSTR(wide_name.as_ptr())) }.ok()?;
        Ok(())
    }
}

#[cfg(windows)]
impl Drop for RegKey {
    fn drop(&mut self) {
        unsafe {
            let _ = windows::Win32::System::Registry::RegCloseKey(self.0);
        }
    }
}

#[cfg(not(windows))]
pub struct RegKey;

#[cfg(not(windows))]
impl RegKey {
    pub fn open(_subkey: &str, _writable: bool) -> Result<Self> {
        Err(crate::errors::ServiceError::Other("registry access requires Windows".into()))
    }

    pub fn get_string(&self, _value: &str) -> Result<Option<String>> {
        unreachable!("RegKey::open always fails off Windows")
    }

    pub fn set_string(&self, _value: &str, _data: &str) -> Result<()> {
        unreachable!("RegKey::open always fails off Windows")
    }

    pub fn delete_value(&self, _value: &str) -> Result<()> {
        unreachable!("RegKey::open always fails off Windows")
    }
}

/// A search-list string is considered valid if it contains at least one
/// alphanumeric, `-`, or `.` byte — a loose heuristic against
/// whitespace-only lists, implemented literally as specified rather than
/// tightened (see the Open Questions decision in `DESIGN.md`).
pub fn has_valid_search_list(value: &str) -> bool {
    value.chars().any(|c| c.is_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_whitespace_only_search_list() {
        assert!(!has_valid_search_list("   "));
        assert!(!has_valid_search_list(""));
    }

    #[test]
    fn accepts_domain_like_search_list() {
        assert!(has_valid_search_list("corp.example"));
        assert!(has_valid_search_list("vpn-internal"));
    }
}
