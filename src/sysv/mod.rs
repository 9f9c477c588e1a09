//! SysV IPC: message queues, semaphore sets, shared memory segments.
//!
//! These objects live in kernel tables keyed by `key_t`, not in the file
//! namespace, and outlive the processes that made them. Each submodule
//! binds one object family; the control commands of `msgctl`/`semctl`/
//! `shmctl` are split into typed functions instead of a cmd integer.
use nix::errno::Errno;
use nix::libc;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

pub mod msq;
pub mod sem;
pub mod shm;

pub use nix::libc::{key_t, IPC_CREAT, IPC_EXCL, IPC_NOWAIT, IPC_PRIVATE};

/// Ownership and permission header shared by all three object families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcPerm {
    pub key: i32,
    pub uid: u32,
    pub gid: u32,
    pub cuid: u32,
    pub cgid: u32,
    pub mode: u32,
    pub seq: u32,
}

impl IpcPerm {
    pub(crate) fn decode(perm: &libc::ipc_perm) -> IpcPerm {
        IpcPerm {
            key: perm.__key as i32,
            uid: perm.uid as u32,
            gid: perm.gid as u32,
            cuid: perm.cuid as u32,
            cgid: perm.cgid as u32,
            mode: perm.mode as u32,
            seq: perm.__seq as u32,
        }
    }
}

/// Derive an IPC key from a file path and a project id.
///
/// The same path and id always map to the same key, which is how unrelated
/// processes agree on an object without passing identifiers around.
pub fn ftok<P: AsRef<Path>>(path: P, proj_id: i32) -> nix::Result<key_t> {
    let cpath = std::ffi::CString::new(path.as_ref().as_os_str().as_bytes())
        .map_err(|_| Errno::EINVAL)?;
    let key = unsafe { libc::ftok(cpath.as_ptr(), proj_id) };
    if key == -1 {
        return Err(Errno::last());
    }
    Ok(key)
}
