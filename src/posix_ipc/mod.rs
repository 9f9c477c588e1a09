//! POSIX IPC: message queues, named/unnamed semaphores, shared memory.
//!
//! Unlike their SysV cousins these live in a slash-prefixed name space
//! (`/somename`) and hand back descriptors or pointers instead of integer
//! ids. The mqueue and semaphore bindings go through `nix::libc` because
//! the timed variants and `mq_notify` need the raw descriptor that nix's
//! wrappers keep to themselves; shared memory comes straight from
//! `nix::sys::mman`.
use nix::errno::Errno;
use std::ffi::CString;

pub mod mq;
pub mod sem;
pub mod shm;

pub(crate) fn name_cstr(name: &str) -> nix::Result<CString> {
    CString::new(name).map_err(|_| Errno::EINVAL)
}
