//! eventfd creation plus the 8-byte counter codec.
//!
//! An eventfd is a kernel-side u64 counter behind a file descriptor. Reads
//! and writes on it move whole counters, not byte streams, so the helpers
//! here insist on exactly 8 bytes per transfer and decode the native-endian
//! value for you.
use nix::errno::Errno;
use nix::unistd;
use std::os::fd::{AsFd, AsRawFd};

pub use nix::sys::eventfd::{EfdFlags, EventFd};

/// Create a new eventfd with an initial counter value.
///
/// `EFD_NONBLOCK`, `EFD_CLOEXEC` and `EFD_SEMAPHORE` are the flags the
/// kernel accepts. See `man 2 eventfd`.
pub fn eventfd(initval: u32, flags: EfdFlags) -> nix::Result<EventFd> {
    EventFd::from_value_and_flags(initval, flags)
}

/// Read the counter out of an eventfd.
///
/// Blocks while the counter is zero (unless the fd is `EFD_NONBLOCK`, in
/// which case the kernel reports `EAGAIN`). With `EFD_SEMAPHORE` the kernel
/// hands back 1 per read instead of draining the whole counter.
pub fn read_eventfd<F: AsFd>(fd: F) -> nix::Result<u64> {
    let mut buf = [0u8; 8];
    let n = unistd::read(fd.as_fd().as_raw_fd(), &mut buf)?;
    if n != buf.len() {
        return Err(Errno::EIO);
    }
    Ok(u64::from_ne_bytes(buf))
}

/// Add a value onto an eventfd's counter.
pub fn write_eventfd<F: AsFd>(fd: F, value: u64) -> nix::Result<()> {
    let n = unistd::write(fd, &value.to_ne_bytes())?;
    if n != 8 {
        return Err(Errno::EIO);
    }
    Ok(())
}
