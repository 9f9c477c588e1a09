//! SysV semaphore sets.
//!
//! A set is an array of counting semaphores operated on atomically: every
//! [`SemOp`] in one [`semop`] call either applies or none does. The `semun`
//! argument of `semctl` is a union the size of one integer register, so it
//! is passed here as its raw bits.
use nix::errno::Errno;
use nix::libc;
use std::time::Duration;

use super::IpcPerm;

// glibc exposes `semtimedop(2)`, but the `libc` crate does not declare it, so
// bind it here directly. Signature per `man 2 semtimedop`.
mod sys {
    use nix::libc;
    extern "C" {
        pub fn semtimedop(
            semid: libc::c_int,
            sops: *mut libc::sembuf,
            nsops: libc::size_t,
            timeout: *const libc::timespec,
        ) -> libc::c_int;
    }
}

/// `sem_flg` bits, sized for the `sembuf` field.
pub const SEM_UNDO: i16 = libc::SEM_UNDO as i16;
pub const IPC_NOWAIT: i16 = libc::IPC_NOWAIT as i16;

/// One step of an atomic semaphore operation.
///
/// A negative `op` waits for and subtracts resources, a positive one
/// releases them, zero waits for the semaphore to hit zero.
#[derive(Debug, Clone, Copy)]
pub struct SemOp {
    pub num: u16,
    pub op: i16,
    pub flags: i16,
}

impl SemOp {
    fn sembuf(&self) -> libc::sembuf {
        libc::sembuf {
            sem_num: self.num,
            sem_op: self.op,
            sem_flg: self.flags,
        }
    }
}

/// Decoded `struct semid_ds` as reported by [`stat`].
#[derive(Debug, Clone, Copy)]
pub struct SemStat {
    pub perm: IpcPerm,
    /// Last semop / last change times, seconds since the epoch.
    pub otime: i64,
    pub ctime: i64,
    /// Semaphores in the set.
    pub nsems: u64,
}

/// Fields a [`set`] call can change.
#[derive(Debug, Clone, Copy)]
pub struct SemSet {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

fn semctl_raw(
    id: libc::c_int,
    num: libc::c_int,
    cmd: libc::c_int,
    arg: usize,
) -> nix::Result<libc::c_int> {
    Errno::result(unsafe { libc::semctl(id, num, cmd, arg) })
}

/// Get or create a semaphore set of `nsems` semaphores for `key`.
pub fn semget(key: libc::key_t, nsems: libc::c_int, flags: libc::c_int) -> nix::Result<libc::c_int> {
    Errno::result(unsafe { libc::semget(key, nsems, flags) })
}

/// Apply `ops` atomically, blocking until they can all proceed.
pub fn semop(id: libc::c_int, ops: &[SemOp]) -> nix::Result<()> {
    semtimedop(id, ops, None)
}

/// [`semop`] with an optional relative timeout (`EAGAIN` on expiry).
pub fn semtimedop(id: libc::c_int, ops: &[SemOp], timeout: Option<Duration>) -> nix::Result<()> {
    let mut bufs: Vec<libc::sembuf> = ops.iter().map(SemOp::sembuf).collect();
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let tsp = match ts.as_ref() {
        Some(t) => t as *const libc::timespec,
        None => std::ptr::null(),
    };
    Errno::result(unsafe { sys::semtimedop(id, bufs.as_mut_ptr(), bufs.len(), tsp) }).map(drop)
}

/// `semctl(GETVAL)`: the current value of one semaphore.
pub fn getvalue(id: libc::c_int, num: libc::c_int) -> nix::Result<libc::c_int> {
    semctl_raw(id, num, libc::GETVAL, 0)
}

/// `semctl(SETVAL)`: overwrite the value of one semaphore.
pub fn setvalue(id: libc::c_int, num: libc::c_int, value: libc::c_int) -> nix::Result<()> {
    semctl_raw(id, num, libc::SETVAL, value as usize).map(drop)
}

/// `semctl(GETALL)`: every value in the set at once.
pub fn getall(id: libc::c_int) -> nix::Result<Vec<u16>> {
    let nsems = stat(id)?.nsems as usize;
    let mut values = vec![0 as libc::c_ushort; nsems];
    semctl_raw(id, 0, libc::GETALL, values.as_mut_ptr() as usize)?;
    Ok(values)
}

/// `semctl(SETALL)`: overwrite every value in the set at once.
///
/// `values` must cover the whole set.
pub fn setall(id: libc::c_int, values: &[u16]) -> nix::Result<()> {
    let nsems = stat(id)?.nsems as usize;
    if values.len() != nsems {
        return Err(Errno::EINVAL);
    }
    semctl_raw(id, 0, libc::SETALL, values.as_ptr() as usize).map(drop)
}

/// `semctl(GETPID)`: pid of the last process to operate on the semaphore.
pub fn getpid(id: libc::c_int, num: libc::c_int) -> nix::Result<libc::pid_t> {
    semctl_raw(id, num, libc::GETPID, 0)
}

/// `semctl(GETNCNT)`: processes waiting for the value to increase.
pub fn getncnt(id: libc::c_int, num: libc::c_int) -> nix::Result<libc::c_int> {
    semctl_raw(id, num, libc::GETNCNT, 0)
}

/// `semctl(GETZCNT)`: processes waiting for the value to reach zero.
pub fn getzcnt(id: libc::c_int, num: libc::c_int) -> nix::Result<libc::c_int> {
    semctl_raw(id, num, libc::GETZCNT, 0)
}

/// `semctl(IPC_STAT)`: the set's metadata.
pub fn stat(id: libc::c_int) -> nix::Result<SemStat> {
    let mut ds: libc::semid_ds = unsafe { std::mem::zeroed() };
    semctl_raw(id, 0, libc::IPC_STAT, &mut ds as *mut libc::semid_ds as usize)?;
    Ok(SemStat {
        perm: IpcPerm::decode(&ds.sem_perm),
        otime: ds.sem_otime as i64,
        ctime: ds.sem_ctime as i64,
        nsems: ds.sem_nsems as u64,
    })
}

/// `semctl(IPC_SET)`: change ownership and permissions.
pub fn set(id: libc::c_int, info: &SemSet) -> nix::Result<()> {
    let mut ds: libc::semid_ds = unsafe { std::mem::zeroed() };
    ds.sem_perm.uid = info.uid as _;
    ds.sem_perm.gid = info.gid as _;
    ds.sem_perm.mode = info.mode as _;
    semctl_raw(id, 0, libc::IPC_SET, &mut ds as *mut libc::semid_ds as usize).map(drop)
}

/// `semctl(IPC_RMID)`: destroy the set and wake all waiters with `EIDRM`.
pub fn remove(id: libc::c_int) -> nix::Result<()> {
    semctl_raw(id, 0, libc::IPC_RMID, 0).map(drop)
}
