//! POSIX AIO (the librt `aio_*` family).
//!
//! The kernel side holds a pointer to both the control block and the
//! transfer buffer for as long as an operation is queued, so [`Aiocb`] owns
//! both on the heap and refuses to free them while the operation is still
//! in flight. Dropping a queued `Aiocb` attempts a cancel; if the kernel
//! keeps the operation anyway, the allocations are leaked rather than
//! handed back while still being written to.
use nix::errno::Errno;
use nix::libc;
use std::mem::ManuallyDrop;
use std::os::fd::RawFd;

pub use nix::sys::signal::Signal;

/// How the kernel should announce completion of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    /// No asynchronous notification; poll with [`Aiocb::error`].
    None,
    /// Deliver this signal to the process on completion.
    Signal(Signal),
}

impl Notify {
    fn sigevent(self) -> libc::sigevent {
        let mut sev: libc::sigevent = unsafe { std::mem::zeroed() };
        match self {
            Notify::None => sev.sigev_notify = libc::SIGEV_NONE,
            Notify::Signal(sig) => {
                sev.sigev_notify = libc::SIGEV_SIGNAL;
                sev.sigev_signo = sig as libc::c_int;
            }
        }
        sev
    }
}

/// Which flavor of sync an [`aio_fsync`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AioFsyncMode {
    /// Like `fsync(2)`: data and metadata.
    Sync = libc::O_SYNC,
    /// Like `fdatasync(2)`: data only.
    DataSync = libc::O_DSYNC,
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AioCancelStat {
    /// Everything asked about was canceled.
    Canceled,
    /// At least one operation was already running and could not be.
    NotCanceled,
    /// All operations had already finished.
    AllDone,
}

fn cancel_stat(rc: libc::c_int) -> nix::Result<AioCancelStat> {
    match rc {
        libc::AIO_CANCELED => Ok(AioCancelStat::Canceled),
        libc::AIO_NOTCANCELED => Ok(AioCancelStat::NotCanceled),
        libc::AIO_ALLDONE => Ok(AioCancelStat::AllDone),
        _ => Err(Errno::last()),
    }
}

/// Progress report for a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AioStatus {
    /// Finished; [`Aiocb::aio_return`] will yield the transfer count.
    Complete,
    /// Still queued or running.
    InProgress,
    /// Finished with this error.
    Error(Errno),
}

enum State {
    InFlight,
    Done,
}

/// An asynchronous operation: owned control block plus owned buffer.
pub struct Aiocb {
    cb: ManuallyDrop<Box<libc::aiocb>>,
    buf: ManuallyDrop<Box<[u8]>>,
    state: State,
}

fn build_cb(fd: RawFd, buf: &mut [u8], offset: i64, notify: Notify) -> Box<libc::aiocb> {
    let mut cb: Box<libc::aiocb> = Box::new(unsafe { std::mem::zeroed() });
    cb.aio_fildes = fd;
    cb.aio_buf = buf.as_mut_ptr() as *mut libc::c_void;
    cb.aio_nbytes = buf.len();
    cb.aio_offset = offset as libc::off_t;
    cb.aio_sigevent = notify.sigevent();
    cb
}

/// Queue an asynchronous read of up to `nbytes` from `fd` at `offset`.
///
/// The destination buffer is allocated and owned by the returned [`Aiocb`];
/// fetch the data with [`Aiocb::buffer`] once the operation completes.
pub fn aio_read(fd: RawFd, nbytes: usize, offset: i64, notify: Notify) -> nix::Result<Aiocb> {
    let mut buf = vec![0u8; nbytes].into_boxed_slice();
    let mut cb = build_cb(fd, &mut buf, offset, notify);
    Errno::result(unsafe { libc::aio_read(&mut *cb) })?;
    Ok(Aiocb {
        cb: ManuallyDrop::new(cb),
        buf: ManuallyDrop::new(buf),
        state: State::InFlight,
    })
}

/// Queue an asynchronous write of `data` to `fd` at `offset`.
///
/// `data` is copied into a buffer owned by the returned [`Aiocb`], so the
/// caller's slice does not need to outlive the operation.
pub fn aio_write(fd: RawFd, data: &[u8], offset: i64, notify: Notify) -> nix::Result<Aiocb> {
    let mut buf: Box<[u8]> = data.into();
    let mut cb = build_cb(fd, &mut buf, offset, notify);
    Errno::result(unsafe { libc::aio_write(&mut *cb) })?;
    Ok(Aiocb {
        cb: ManuallyDrop::new(cb),
        buf: ManuallyDrop::new(buf),
        state: State::InFlight,
    })
}

/// Queue a sync of all completed operations on `fd`.
///
/// Returns the control block so completion can be observed the same way as
/// for reads and writes.
pub fn aio_fsync(fd: RawFd, mode: AioFsyncMode, notify: Notify) -> nix::Result<Aiocb> {
    let mut buf: Box<[u8]> = Vec::new().into_boxed_slice();
    let mut cb = build_cb(fd, &mut buf, 0, notify);
    cb.aio_buf = std::ptr::null_mut();
    Errno::result(unsafe { libc::aio_fsync(mode as libc::c_int, &mut *cb) })?;
    Ok(Aiocb {
        cb: ManuallyDrop::new(cb),
        buf: ManuallyDrop::new(buf),
        state: State::InFlight,
    })
}

/// Attempt to cancel everything outstanding on `fd`.
pub fn aio_cancel_all(fd: RawFd) -> nix::Result<AioCancelStat> {
    cancel_stat(unsafe { libc::aio_cancel(fd, std::ptr::null_mut()) })
}

impl Aiocb {
    fn cb_ptr(&mut self) -> *mut libc::aiocb {
        &mut **self.cb
    }

    /// The error status of the operation: the live counterpart of
    /// `aio_error(3)`.
    pub fn error(&mut self) -> AioStatus {
        match unsafe { libc::aio_error(self.cb_ptr()) } {
            0 => AioStatus::Complete,
            libc::EINPROGRESS => AioStatus::InProgress,
            e => AioStatus::Error(Errno::from_raw(e)),
        }
    }

    /// Collect the final return value, what the synchronous call would have
    /// returned.
    ///
    /// Fails with `EINPROGRESS` while the operation is still queued, or
    /// with the operation's own error once it has finished. May be called
    /// once per operation; afterwards the status is consumed.
    pub fn aio_return(&mut self) -> nix::Result<usize> {
        match unsafe { libc::aio_error(self.cb_ptr()) } {
            0 => {
                let res = Errno::result(unsafe { libc::aio_return(self.cb_ptr()) })?;
                self.state = State::Done;
                Ok(res as usize)
            }
            libc::EINPROGRESS => Err(Errno::EINPROGRESS),
            e => {
                // consume the completion so librt can release its slot
                unsafe { libc::aio_return(self.cb_ptr()) };
                self.state = State::Done;
                Err(Errno::from_raw(e))
            }
        }
    }

    /// Ask the kernel to cancel this operation.
    pub fn cancel(&mut self) -> nix::Result<AioCancelStat> {
        let fd = self.cb.aio_fildes;
        cancel_stat(unsafe { libc::aio_cancel(fd, self.cb_ptr()) })
    }

    /// The operation's owned buffer, up to `nbytes` (defaults to the full
    /// transfer size requested at submission).
    pub fn buffer(&self, nbytes: Option<usize>) -> &[u8] {
        let n = nbytes.unwrap_or(self.cb.aio_nbytes);
        &self.buf[..n.min(self.buf.len())]
    }

    /// The file descriptor the operation targets.
    pub fn fd(&self) -> RawFd {
        self.cb.aio_fildes
    }
}

impl Drop for Aiocb {
    fn drop(&mut self) {
        if let State::InFlight = self.state {
            if unsafe { libc::aio_error(self.cb_ptr()) } == libc::EINPROGRESS {
                let fd = self.cb.aio_fildes;
                unsafe { libc::aio_cancel(fd, self.cb_ptr()) };
            }
            if unsafe { libc::aio_error(self.cb_ptr()) } == libc::EINPROGRESS {
                // The kernel still owns these allocations. Leaking them is
                // the only sound option left.
                return;
            }
            unsafe { libc::aio_return(self.cb_ptr()) };
        }
        unsafe {
            ManuallyDrop::drop(&mut self.buf);
            ManuallyDrop::drop(&mut self.cb);
        }
    }
}
