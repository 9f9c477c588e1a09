//! SysV shared memory segments.
//!
//! [`shmat`] hands back a [`ShmSegment`] that owns the attachment: the
//! mapping stays valid while the value lives and is detached on drop.
//! Detaching does not destroy the segment; that takes [`remove`].
use nix::errno::Errno;
use nix::libc;
use std::ptr::NonNull;

use super::IpcPerm;

pub use nix::libc::{SHM_RDONLY, SHM_RND};

/// Decoded `struct shmid_ds` as reported by [`stat`].
#[derive(Debug, Clone, Copy)]
pub struct ShmStat {
    pub perm: IpcPerm,
    /// Segment size in bytes.
    pub segsz: usize,
    /// Last attach / detach / change times, seconds since the epoch.
    pub atime: i64,
    pub dtime: i64,
    pub ctime: i64,
    /// Creator and last-operator pids.
    pub cpid: i32,
    pub lpid: i32,
    /// Current number of attachments.
    pub nattch: u64,
}

/// Fields a [`set`] call can change.
#[derive(Debug, Clone, Copy)]
pub struct ShmSet {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

/// Get or create a shared memory segment of `size` bytes for `key`.
pub fn shmget(key: libc::key_t, size: usize, flags: libc::c_int) -> nix::Result<libc::c_int> {
    Errno::result(unsafe { libc::shmget(key, size, flags) })
}

/// An attached segment. Detaches (but does not destroy) on drop.
#[derive(Debug)]
pub struct ShmSegment {
    ptr: NonNull<libc::c_void>,
    len: usize,
    readonly: bool,
}

// The mapping is valid for the whole process, not just the attaching thread.
unsafe impl Send for ShmSegment {}

/// Attach the segment `id` into our address space.
///
/// Without a `sizehint` the segment is stat'ed for its real size, so the
/// returned slice always covers the whole mapping. `SHM_RDONLY` attaches
/// read-only.
pub fn shmat(id: libc::c_int, flags: libc::c_int, sizehint: Option<usize>) -> nix::Result<ShmSegment> {
    let len = match sizehint {
        Some(n) => n,
        None => stat(id)?.segsz,
    };

    let ptr = unsafe { libc::shmat(id, std::ptr::null(), flags) };
    if ptr as isize == -1 {
        return Err(Errno::last());
    }

    Ok(ShmSegment {
        // shmat returning null would mean the kernel mapped at address 0
        ptr: NonNull::new(ptr).ok_or(Errno::EINVAL)?,
        len,
        readonly: flags & SHM_RDONLY != 0,
    })
}

impl ShmSegment {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// The mapped bytes.
    ///
    /// Other processes can write the segment concurrently; nothing here
    /// synchronizes them.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const u8, self.len) }
    }

    /// Mutable view of the mapped bytes; `EACCES` for read-only attaches.
    pub fn as_mut_slice(&mut self) -> nix::Result<&mut [u8]> {
        if self.readonly {
            return Err(Errno::EACCES);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u8, self.len) })
    }

    /// Detach now, surfacing the kernel's verdict instead of dropping it.
    pub fn detach(self) -> nix::Result<()> {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        Errno::result(unsafe { libc::shmdt(ptr) }).map(drop)
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        unsafe { libc::shmdt(self.ptr.as_ptr()) };
    }
}

/// `shmctl(IPC_STAT)`: the segment's metadata.
pub fn stat(id: libc::c_int) -> nix::Result<ShmStat> {
    let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
    Errno::result(unsafe { libc::shmctl(id, libc::IPC_STAT, &mut ds) })?;
    Ok(ShmStat {
        perm: IpcPerm::decode(&ds.shm_perm),
        segsz: ds.shm_segsz as usize,
        atime: ds.shm_atime as i64,
        dtime: ds.shm_dtime as i64,
        ctime: ds.shm_ctime as i64,
        cpid: ds.shm_cpid as i32,
        lpid: ds.shm_lpid as i32,
        nattch: ds.shm_nattch as u64,
    })
}

/// `shmctl(IPC_SET)`: change ownership and permissions.
pub fn set(id: libc::c_int, info: &ShmSet) -> nix::Result<()> {
    let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
    ds.shm_perm.uid = info.uid as _;
    ds.shm_perm.gid = info.gid as _;
    ds.shm_perm.mode = info.mode as _;
    Errno::result(unsafe { libc::shmctl(id, libc::IPC_SET, &mut ds) }).map(drop)
}

/// `shmctl(IPC_RMID)`: mark the segment for destruction once the last
/// attachment goes away.
pub fn remove(id: libc::c_int) -> nix::Result<()> {
    Errno::result(unsafe { libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut()) }).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysv::{IPC_CREAT, IPC_PRIVATE};

    #[test]
    fn attach_write_read_detach() {
        let id = shmget(IPC_PRIVATE, 4096, IPC_CREAT | 0o600).unwrap();

        {
            let mut seg = shmat(id, 0, None).unwrap();
            assert_eq!(seg.len(), 4096);
            seg.as_mut_slice().unwrap()[..5].copy_from_slice(b"hello");

            // a second attachment of the same segment sees the write
            let other = shmat(id, 0, None).unwrap();
            assert_eq!(&other.as_slice()[..5], b"hello");
            assert_eq!(stat(id).unwrap().nattch, 2);
        }

        assert_eq!(stat(id).unwrap().nattch, 0);
        remove(id).unwrap();
    }

    #[test]
    fn readonly_attach_refuses_mutation() {
        let id = shmget(IPC_PRIVATE, 1024, IPC_CREAT | 0o600).unwrap();
        let mut seg = shmat(id, SHM_RDONLY, None).unwrap();
        assert!(seg.readonly());
        assert_eq!(seg.as_mut_slice().err(), Some(Errno::EACCES));
        drop(seg);
        remove(id).unwrap();
    }

    #[test]
    fn stat_reports_size_and_creator() {
        let id = shmget(IPC_PRIVATE, 2048, IPC_CREAT | 0o600).unwrap();
        let st = stat(id).unwrap();
        assert_eq!(st.segsz, 2048);
        assert_eq!(st.cpid, std::process::id() as i32);
        remove(id).unwrap();
    }
}
