//! SysV message queues.
//!
//! A message is a positive `mtype` tag plus a byte payload; `msgrcv` can
//! filter on the tag. The wire format puts the tag in a leading `c_long`,
//! so the transfer buffers here are allocated as `c_long` words to keep the
//! header aligned.
use nix::errno::Errno;
use nix::libc;
use std::mem::size_of;

use super::IpcPerm;

pub use nix::libc::MSG_NOERROR;

/// Decoded `struct msqid_ds` as reported by [`stat`].
#[derive(Debug, Clone, Copy)]
pub struct MsqStat {
    pub perm: IpcPerm,
    /// Last send / receive / change times, seconds since the epoch.
    pub stime: i64,
    pub rtime: i64,
    pub ctime: i64,
    /// Bytes currently queued.
    pub cbytes: u64,
    /// Messages currently queued.
    pub qnum: u64,
    /// Capacity in bytes.
    pub qbytes: u64,
    /// Pids of the last sender and receiver.
    pub lspid: i32,
    pub lrpid: i32,
}

/// Fields an [`set`] call can change.
#[derive(Debug, Clone, Copy)]
pub struct MsqSet {
    pub qbytes: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

/// Get or create a message queue for `key`.
///
/// `flags` combines `IPC_CREAT`/`IPC_EXCL` with the permission bits; use
/// `IPC_PRIVATE` as the key for a queue only your processes can inherit.
pub fn msgget(key: libc::key_t, flags: libc::c_int) -> nix::Result<libc::c_int> {
    Errno::result(unsafe { libc::msgget(key, flags) })
}

/// Append a message to the queue.
///
/// `mtype` must be positive. Blocks while the queue is full unless
/// `IPC_NOWAIT` is set (then `EAGAIN`).
pub fn msgsnd(
    id: libc::c_int,
    mtype: libc::c_long,
    data: &[u8],
    flags: libc::c_int,
) -> nix::Result<()> {
    let words = 1 + data.len().div_ceil(size_of::<libc::c_long>());
    let mut buf = vec![0 as libc::c_long; words];
    buf[0] = mtype;
    unsafe {
        std::ptr::copy_nonoverlapping(
            data.as_ptr(),
            (buf.as_mut_ptr() as *mut u8).add(size_of::<libc::c_long>()),
            data.len(),
        );
    }
    Errno::result(unsafe {
        libc::msgsnd(id, buf.as_ptr() as *const libc::c_void, data.len(), flags)
    })
    .map(drop)
}

/// Take a message off the queue.
///
/// `mtype` selects which: 0 for the oldest, a positive value for the oldest
/// with that tag, a negative value for the oldest whose tag is at most its
/// magnitude. A message longer than `maxsize` fails with `E2BIG` unless
/// `MSG_NOERROR` asks for truncation. Returns the tag and payload.
pub fn msgrcv(
    id: libc::c_int,
    mtype: libc::c_long,
    maxsize: usize,
    flags: libc::c_int,
) -> nix::Result<(libc::c_long, Vec<u8>)> {
    let words = 1 + maxsize.div_ceil(size_of::<libc::c_long>());
    let mut buf = vec![0 as libc::c_long; words];
    let recvd = Errno::result(unsafe {
        libc::msgrcv(
            id,
            buf.as_mut_ptr() as *mut libc::c_void,
            maxsize,
            mtype,
            flags,
        )
    })? as usize;

    let data = unsafe {
        std::slice::from_raw_parts(
            (buf.as_ptr() as *const u8).add(size_of::<libc::c_long>()),
            recvd,
        )
    }
    .to_vec();
    Ok((buf[0], data))
}

/// `msgctl(IPC_STAT)`: the queue's metadata.
pub fn stat(id: libc::c_int) -> nix::Result<MsqStat> {
    let mut ds: libc::msqid_ds = unsafe { std::mem::zeroed() };
    Errno::result(unsafe { libc::msgctl(id, libc::IPC_STAT, &mut ds) })?;
    Ok(MsqStat {
        perm: IpcPerm::decode(&ds.msg_perm),
        stime: ds.msg_stime as i64,
        rtime: ds.msg_rtime as i64,
        ctime: ds.msg_ctime as i64,
        cbytes: ds.__msg_cbytes as u64,
        qnum: ds.msg_qnum as u64,
        qbytes: ds.msg_qbytes as u64,
        lspid: ds.msg_lspid as i32,
        lrpid: ds.msg_lrpid as i32,
    })
}

/// `msgctl(IPC_SET)`: change capacity and ownership.
pub fn set(id: libc::c_int, info: &MsqSet) -> nix::Result<()> {
    let mut ds: libc::msqid_ds = unsafe { std::mem::zeroed() };
    ds.msg_qbytes = info.qbytes as _;
    ds.msg_perm.uid = info.uid as _;
    ds.msg_perm.gid = info.gid as _;
    ds.msg_perm.mode = info.mode as _;
    Errno::result(unsafe { libc::msgctl(id, libc::IPC_SET, &mut ds) }).map(drop)
}

/// `msgctl(IPC_RMID)`: destroy the queue and wake all waiters with `EIDRM`.
pub fn remove(id: libc::c_int) -> nix::Result<()> {
    Errno::result(unsafe { libc::msgctl(id, libc::IPC_RMID, std::ptr::null_mut()) }).map(drop)
}
