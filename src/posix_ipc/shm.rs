//! POSIX shared memory objects.
//!
//! A shared memory object is just a file descriptor on a tmpfs-backed
//! inode: size it with `ftruncate`, map it with `mmap`, exactly as the
//! `shm_open(3)` contract reads. nix already models this faithfully, so
//! these are thin name-handling wrappers.
use std::os::fd::OwnedFd;

use nix::sys::mman;

pub use nix::fcntl::OFlag;
pub use nix::sys::stat::Mode;

/// Open (and with `O_CREAT`, create) the shared memory object `name`.
///
/// New objects have size zero; grow them with `ftruncate` before mapping.
pub fn shm_open(name: &str, oflag: OFlag, mode: Mode) -> nix::Result<OwnedFd> {
    mman::shm_open(name, oflag, mode)
}

/// Remove a shared memory object name; the memory dies with its last
/// descriptor and mapping.
pub fn shm_unlink(name: &str) -> nix::Result<()> {
    mman::shm_unlink(name)
}
