// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A scoped kernel-handle wrapper used throughout the session worker for
//! tokens, processes, and threads — the Rust rendering of the original's
//! `CloseHandleEx(&h)` discipline (see "Handle ownership" in `DESIGN.md`):
//! every handle this module hands out is released on every exit path,
//! including early returns on error, via `Drop`.

#[cfg(windows)]
mod imp {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};

    #[derive(Debug)]
    pub struct OwnedHandle(pub(crate) HANDLE);

    impl OwnedHandle {
        /// # Safety
        /// `raw` must be a valid, uniquely-owned kernel handle.
        pub unsafe fn from_raw(raw: HANDLE) -> Self {
            Self(raw)
        }

        pub fn raw(&self) -> HANDLE {
            self.0
        }

        /// Hands the raw handle value to a caller that will take over
        /// closing it (e.g. wrapping it in a [`std::fs::File`] so an
        /// ordinary write-then-drop closes the pipe end), without running
        /// this wrapper's own `Drop`.
        pub fn into_raw(self) -> HANDLE {
            let raw = self.0;
            std::mem::forget(self);
            raw
        }
    }

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            if !self.0.is_invalid() {
                unsafe {
                    let _ = CloseHandle(self.0);
                }
            }
        }
    }

    // Safety: a Windows kernel handle value is just an opaque integer; the
    // underlying kernel object is safe to reference from any thread as long
    // as access is externally synchronized, which every caller here does by
    // construction (one session owns one of each handle at a time).
    unsafe impl Send for OwnedHandle {}
    unsafe impl Sync for OwnedHandle {}
}

#[cfg(not(windows))]
mod imp {
    #[derive(Debug)]
    pub struct OwnedHandle;
}

pub use imp::OwnedHandle;
