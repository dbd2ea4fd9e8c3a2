//! Read/write request validation
//!
//! Caller buffers, access checks and privileges. The functions here turn a raw
//! request into either a validated destination slice (read) or a control
//! request (write); the driver applies the result under the store lock.

use bitflags::bitflags;

use crate::error::{status, LaxError, LaxResult};
use crate::store::Averages;

/// Smallest accepted read: one longword
pub const READ_MIN: usize = core::mem::size_of::<u32>();

/// Smallest accepted write: the control byte
pub const WRITE_MIN: usize = 1;

/// Failed access check on a caller buffer
///
/// The status is whatever the checker reported; the driver hands it back
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessFault {
    pub status: u32,
}

impl AccessFault {
    /// Access violation
    pub const ACCVIO: Self = Self::new(status::ACCVIO);

    pub const fn new(status: u32) -> Self {
        Self { status }
    }
}

/// A caller-supplied transfer buffer
pub trait IoBuffer {
    /// Length named in the request
    fn requested_len(&self) -> usize;

    /// Check that the first `len` bytes may be written by the driver (read path).
    fn check_writable(&mut self, len: usize) -> Result<&mut [u8], AccessFault>;

    /// Check that the first `len` bytes may be read by the driver (write path).
    fn check_readable(&self, len: usize) -> Result<&[u8], AccessFault>;
}

impl IoBuffer for [u8] {
    fn requested_len(&self) -> usize {
        self.len()
    }

    fn check_writable(&mut self, len: usize) -> Result<&mut [u8], AccessFault> {
        self.get_mut(..len).ok_or(AccessFault::ACCVIO)
    }

    fn check_readable(&self, len: usize) -> Result<&[u8], AccessFault> {
        self.get(..len).ok_or(AccessFault::ACCVIO)
    }
}

bitflags! {
    /// Page protection of a caller buffer
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Protection: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

/// Caller buffer whose length and protection need not match its backing memory
#[derive(Debug)]
pub struct UserBuffer<'a> {
    data: &'a mut [u8],
    requested: usize,
    protection: Protection,
}

impl<'a> UserBuffer<'a> {
    /// Read/write buffer requesting exactly its own length.
    pub fn new(data: &'a mut [u8]) -> Self {
        let requested = data.len();
        Self {
            data,
            requested,
            protection: Protection::READ | Protection::WRITE,
        }
    }

    /// Claim a different transfer length; bytes past the backing memory fault.
    pub fn with_len(mut self, requested: usize) -> Self {
        self.requested = requested;
        self
    }

    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data
    }
}

impl IoBuffer for UserBuffer<'_> {
    fn requested_len(&self) -> usize {
        self.requested
    }

    fn check_writable(&mut self, len: usize) -> Result<&mut [u8], AccessFault> {
        if !self.protection.contains(Protection::WRITE) {
            return Err(AccessFault::ACCVIO);
        }
        self.data.get_mut(..len).ok_or(AccessFault::ACCVIO)
    }

    fn check_readable(&self, len: usize) -> Result<&[u8], AccessFault> {
        if !self.protection.contains(Protection::READ) {
            return Err(AccessFault::ACCVIO);
        }
        self.data.get(..len).ok_or(AccessFault::ACCVIO)
    }
}

bitflags! {
    /// Process privileges
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Privileges: u32 {
        /// Change mode to kernel
        const CMKRNL = 1 << 0;
        /// Change mode to executive
        const CMEXEC = 1 << 1;
        const SYSNAM = 1 << 2;
        const GRPNAM = 1 << 3;
        const SYSPRV = 1 << 4;
        const WORLD = 1 << 5;
    }
}

/// Privileges of the requesting process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Credentials {
    pub privileges: Privileges,
}

impl Credentials {
    pub const fn new(privileges: Privileges) -> Self {
        Self { privileges }
    }

    pub const fn unprivileged() -> Self {
        Self::new(Privileges::empty())
    }

    pub const fn kernel() -> Self {
        Self::new(Privileges::CMKRNL)
    }

    pub fn has(&self, privilege: Privileges) -> bool {
        self.privileges.contains(privilege)
    }
}

/// Decoded control write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Stop,
    Resume,
}

impl ControlRequest {
    /// Nonzero stops sampling, zero resumes it.
    pub fn from_byte(byte: u8) -> Self {
        if byte != 0 {
            ControlRequest::Stop
        } else {
            ControlRequest::Resume
        }
    }
}

/// Validate a read and return the destination, clamped to the vector size.
pub fn prepare_read<B: IoBuffer + ?Sized>(buf: &mut B) -> LaxResult<&mut [u8]> {
    let requested = buf.requested_len();
    if requested < READ_MIN {
        log::debug!("lax read: length {} below {}", requested, READ_MIN);
        return Err(LaxError::InvalidArgument {
            requested,
            minimum: READ_MIN,
        });
    }
    let len = requested.min(Averages::BYTES);
    buf.check_writable(len).map_err(|fault| {
        log::debug!("lax read: buffer check failed, status {}", fault.status);
        LaxError::Validation(fault)
    })
}

/// Validate a write and decode its control byte.
///
/// Privilege is checked before anything about the buffer.
pub fn prepare_write<B: IoBuffer + ?Sized>(
    caller: &Credentials,
    buf: &B,
) -> LaxResult<ControlRequest> {
    if !caller.has(Privileges::CMKRNL) {
        log::warn!("lax write rejected: CMKRNL required");
        return Err(LaxError::PermissionDenied);
    }
    let requested = buf.requested_len();
    if requested < WRITE_MIN {
        log::debug!("lax write: empty buffer");
        return Err(LaxError::InvalidArgument {
            requested,
            minimum: WRITE_MIN,
        });
    }
    let bytes = buf.check_readable(requested).map_err(|fault| {
        log::debug!("lax write: buffer check failed, status {}", fault.status);
        LaxError::Validation(fault)
    })?;
    Ok(bytes
        .first()
        .copied()
        .map_or(ControlRequest::Resume, ControlRequest::from_byte))
}
