// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Ring Buffer Registrar (§4.G): takes the four raw handle values an engine
//! sends over the pipe — device, two section handles, two tail-moved
//! events — duplicates them out of the engine process, maps the sections
//! into this process, and hands the lot to the tun device via IOCTL so the
//! engine can do lock-free packet I/O against shared memory.

use crate::errors::{Result, ServiceError};

/// Undo record for a registered pair of ring-buffer sections. Holds the
/// mapped base addresses so teardown can unmap them, and the duplicated
/// handles so they can be closed.
#[derive(Debug)]
pub struct RingBufferMapping {
    pub device: imp::OwnedHandle,
    pub send_ring: imp::OwnedHandle,
    pub recv_ring: imp::OwnedHandle,
    pub send_tail_event: imp::OwnedHandle,
    pub recv_tail_event: imp::OwnedHandle,
    pub send_ring_view: imp::MappedView,
    pub recv_ring_view: imp::MappedView,
}

/// Duplicates all four raw handle values out of `engine_process`, maps the
/// two section handles, and issues the registration IOCTL to the open tun
/// device. `device` must itself be duplicated from the engine too — the
/// service never trusts a device handle value that did not come from the
/// same source as the others.
///
/// `engine_process` is borrowed, not owned: it is only ever used as the
/// source process for `DuplicateHandle` and is never closed here. The
/// session worker retains ownership of the process handle for the
/// lifetime of the engine.
pub fn register(
    engine_process: imp::ProcessHandleRef<'_>,
    device: u64,
    send_ring: u64,
    recv_ring: u64,
    send_tail_event: u64,
    recv_tail_event: u64,
) -> Result<RingBufferMapping> {
    let device = imp::duplicate_from(engine_process, device)?;
    let send_ring = imp::duplicate_from(engine_process, send_ring)?;
    let recv_ring = imp::duplicate_from(engine_process, recv_ring)?;
    let send_tail_event = imp::duplicate_from(engine_process, send_tail_event)?;
    let recv_tail_event = imp::duplicate_from(engine_process, recv_tail_event)?;

    let send_ring_view = imp::map_view(&send_ring)?;
    let recv_ring_view = imp::map_view(&recv_ring)?;

    imp::register_with_device(
        &device,
        &send_ring_view,
        &recv_ring_view,
        &send_tail_event,
        &recv_tail_event,
    )?;

    Ok(RingBufferMapping { device, send_ring, recv_ring, send_tail_event, recv_tail_event, send_ring_view, recv_ring_view })
}

/// Unmaps both sections and lets `RingBufferMapping`'s `Drop` impls close
/// the duplicated handles. The tun driver is expected to detect handle
/// closure and stop using the rings on its own; no explicit "unregister"
/// IOCTL is issued (mirrors the original, which relies on the same
/// handle-closure signal).
pub fn unregister(mapping: RingBufferMapping) -> Result<()> {
    imp::unmap_view(mapping.send_ring_view)?;
    imp::unmap_view(mapping.recv_ring_view)?;
    Ok(())
}

#[cfg(windows)]
pub mod imp {
    use windows::Win32::Foundation::{CloseHandle, DUPLICATE_SAME_ACCESS, HANDLE};
    use windows::Win32::System::Memory::{MapViewOfFile, UnmapViewOfFile, FILE_MAP_ALL_ACCESS, MEMORY_MAPPED_VIEW_ADDRESS};
    use windows::Win32::System::Threading::{GetCurrentProcess, DuplicateHandle as Win32DuplicateHandle};

    use super::*;

    /// A kernel handle owned by this process, closed on drop.
    #[derive(Debug)]
    pub struct OwnedHandle(pub(super) HANDLE);

    /// A process handle borrowed just long enough for a `DuplicateHandle`
    /// call; wraps whatever owns the real handle (here,
    /// `crate::session::handle::OwnedHandle`) without taking it.
    pub type ProcessHandleRef<'a> = &'a crate::session::handle::OwnedHandle;

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            if !self.0.is_invalid() {
                unsafe {
                    let _ = CloseHandle(self.0);
                }
            }
        }
    }

    #[derive(Debug)]
    pub struct MappedView(MEMORY_MAPPED_VIEW_ADDRESS);

    pub(super) fn duplicate_from(engine_process: ProcessHandleRef<'_>, raw: u64) -> Result<OwnedHandle> {
        let mut target = HANDLE::default();
        unsafe {
            Win32DuplicateHandle(
                engine_process.raw(),
                HANDLE(raw as *mut core::ffi::c_void),
                GetCurrentProcess(),
                &mut target,
                0,
                false,
                DUPLICATE_SAME_ACCESS,
            )
        }?;
        Ok(OwnedHandle(target))
    }

    pub(super) fn map_view(section: &OwnedHandle) -> Result<MappedView> {
        let view = unsafe { MapViewOfFile(section.0, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
        if view.Value.is_null() {
            return Err(windows::core::Error::from_win32().into());
        }
        Ok(MappedView(view))
    }

    pub(super) fn unmap_view(view: MappedView) -> Result<()> {
        unsafe { UnmapViewOfFile(view.0) }?;
        Ok(())
    }

    /// Issues the registration IOCTL against the duplicated device handle.
    /// The IOCTL code and input buffer layout are owned by the tun driver,
    /// not by this crate; only the four handle values and the mapped base
    /// addresses are meaningful here.
    pub(super) fn register_with_device(
        device: &OwnedHandle,
        send_ring_view: &MappedView,
        recv_ring_view: &MappedView,
        send_tail_event: &OwnedHandle,
        recv_tail_event: &OwnedHandle,
    ) -> Result<()> {
        use windows::Win32::System::IO::DeviceIoControl;

        const IOCTL_REGISTER_RING_BUFFERS: u32 = 0x8000_2000;

        #[repr(C)]
        struct RegisterRingsRequest {
            send_ring: *mut core::ffi::c_void,
            recv_ring: *mut core::ffi::c_void,
            send_tail_event: isize,
            recv_tail_event: isize,
        }

        let request = RegisterRingsRequest {
            send_ring: send_ring_view.0.Value,
            recv_ring: recv_ring_view.0.Value,
            send_tail_event: send_tail_event.0.0 as isize,
            recv_tail_event: recv_tail_event.0.0 as isize,
        };

        let mut bytes_returned = 0u32;
        unsafe {
            DeviceIoControl(
                device.0,
                IOCTL_REGISTER_RING_BUFFERS,
                Some(&request as *const _ as *const core::ffi::c_void),
                core::mem::size_of::<RegisterRingsRequest>() as u32,
                None,
                0,
                Some(&mut bytes_returned),
                None,
            )
        }?;
        Ok(())
    }
}

#[cfg(not(windows))]
pub mod imp {
    use super::*;

    #[derive(Debug)]
    pub struct OwnedHandle;
    #[derive(Debug)]
    pub struct MappedView;

    pub type ProcessHandleRef<'a> = &'a crate::session::handle::OwnedHandle;

    pub(super) fn duplicate_from(_engine_process: ProcessHandleRef<'_>, _raw: u64) -> Result<OwnedHandle> {
        Err(ServiceError::Other("requires Windows".into()))
    }

    pub(super) fn map_view(_section: &OwnedHandle) -> Result<MappedView> {
        Err(ServiceError::Other("requires Windows".into()))
    }

    pub(super) fn unmap_view(_view: MappedView) -> Result<()> {
        Err(ServiceError::Other("requires Windows".into()))
    }

    pub(super) fn register_with_device(
        _device: &OwnedHandle,
        _send_ring_view: &MappedView,
        _recv_ring_view: &MappedView,
        _send_tail_event: &OwnedHandle,
        _recv_tail_event: &OwnedHandle,
    ) -> Result<()> {
        Err(ServiceError::Other("requires Windows".into()))
    }
}
