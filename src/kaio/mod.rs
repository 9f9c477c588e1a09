//! The Linux kernel AIO ring interface (`io_setup` family).
//!
//! Unlike POSIX AIO there is no per-operation status poll here: the kernel
//! copies each `iocb` at submit time and from then on only the transfer
//! buffer is shared. Completions come back through [`Context::getevents`]
//! carrying the userspace address of the submitted block, which is how an
//! [`IoEvent`] is matched to its [`Iocb`].
use nix::errno::Errno;
use nix::libc;
use std::mem::ManuallyDrop;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::time::Duration;

pub mod abi;

/// A kernel AIO submission ring.
///
/// Dropping the context destroys the ring; [`Context::destroy`] does the
/// same but surfaces the kernel's verdict.
pub struct Context {
    ctx: abi::aio_context_t,
    alive: bool,
}

/// One completion pulled out of the ring.
#[derive(Debug, Clone, Copy)]
pub struct IoEvent {
    /// The cookie from [`Iocb::set_data`].
    pub data: u64,
    /// Userspace address of the submitted `iocb`.
    pub obj: u64,
    /// Bytes transferred, or a negated errno.
    pub res: i64,
    pub res2: i64,
}

/// A prepared operation: the kernel control block plus its owned buffer.
pub struct Iocb {
    cb: Box<abi::iocb>,
    buf: ManuallyDrop<Box<[u8]>>,
    in_flight: bool,
}

impl Context {
    /// `io_setup(2)`: create a ring with capacity for `maxevents`
    /// concurrent operations.
    pub fn setup(maxevents: u32) -> nix::Result<Context> {
        let mut ctx: abi::aio_context_t = 0;
        Errno::result(unsafe { abi::io_setup(maxevents as libc::c_long, &mut ctx) })?;
        Ok(Context { ctx, alive: true })
    }

    /// `io_destroy(2)`: tear the ring down, reporting any kernel error.
    pub fn destroy(mut self) -> nix::Result<()> {
        self.alive = false;
        Errno::result(unsafe { abi::io_destroy(self.ctx) }).map(drop)
    }

    /// `io_submit(2)`: queue the given operations.
    ///
    /// Returns how many were accepted; on a partial submit only that prefix
    /// is in flight. Buffers of submitted operations are pinned until their
    /// completion event is consumed.
    pub fn submit(&self, iocbs: &mut [Iocb]) -> nix::Result<usize> {
        let mut ptrs: Vec<*mut abi::iocb> = iocbs
            .iter_mut()
            .map(|op| &mut *op.cb as *mut abi::iocb)
            .collect();
        let n = Errno::result(unsafe {
            abi::io_submit(self.ctx, ptrs.len() as libc::c_long, ptrs.as_mut_ptr())
        })? as usize;
        for op in iocbs[..n].iter_mut() {
            op.in_flight = true;
        }
        Ok(n)
    }

    /// `io_getevents(2)`: wait for between `min_nr` and `nr` completions.
    ///
    /// `None` blocks indefinitely; a zero timeout polls.
    pub fn getevents(
        &self,
        min_nr: usize,
        nr: usize,
        timeout: Option<Duration>,
    ) -> nix::Result<Vec<IoEvent>> {
        let mut events = vec![abi::io_event::zeroed(); nr];
        let mut ts = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let tsp = match ts.as_mut() {
            Some(t) => t as *mut libc::timespec,
            None => std::ptr::null_mut(),
        };

        let n = Errno::result(unsafe {
            abi::io_getevents(
                self.ctx,
                min_nr as libc::c_long,
                nr as libc::c_long,
                events.as_mut_ptr(),
                tsp,
            )
        })? as usize;

        Ok(events[..n]
            .iter()
            .map(|ev| IoEvent {
                data: ev.data,
                obj: ev.obj,
                res: ev.res,
                res2: ev.res2,
            })
            .collect())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.alive {
            // nothing useful to do with an error here
            unsafe { abi::io_destroy(self.ctx) };
        }
    }
}

impl Iocb {
    fn new(opcode: u16, fd: RawFd, buf: Box<[u8]>, offset: i64) -> Iocb {
        let mut cb = Box::new(abi::iocb::zeroed());
        cb.aio_lio_opcode = opcode;
        cb.aio_fildes = fd as u32;
        if !buf.is_empty() {
            cb.aio_buf = buf.as_ptr() as u64;
            cb.aio_nbytes = buf.len() as u64;
        }
        cb.aio_offset = offset;
        Iocb {
            cb,
            buf: ManuallyDrop::new(buf),
            in_flight: false,
        }
    }

    /// Prepare a read of `count` bytes from `fd` at `offset` into an owned
    /// buffer.
    pub fn pread(fd: RawFd, count: usize, offset: i64) -> Iocb {
        Iocb::new(abi::IOCB_CMD_PREAD, fd, vec![0u8; count].into_boxed_slice(), offset)
    }

    /// Prepare a write of `data` (copied into an owned buffer) to `fd` at
    /// `offset`.
    pub fn pwrite(fd: RawFd, data: &[u8], offset: i64) -> Iocb {
        Iocb::new(abi::IOCB_CMD_PWRITE, fd, data.into(), offset)
    }

    /// Prepare an fsync of `fd`.
    pub fn fsync(fd: RawFd) -> Iocb {
        Iocb::new(abi::IOCB_CMD_FSYNC, fd, Vec::new().into_boxed_slice(), 0)
    }

    /// Prepare an fdatasync of `fd`.
    pub fn fdsync(fd: RawFd) -> Iocb {
        Iocb::new(abi::IOCB_CMD_FDSYNC, fd, Vec::new().into_boxed_slice(), 0)
    }

    /// Have the completion also increment `eventfd`, so the ring can be
    /// multiplexed alongside other descriptors.
    pub fn set_eventfd<F: AsFd>(&mut self, eventfd: &F) {
        self.cb.aio_flags |= abi::IOCB_FLAG_RESFD;
        self.cb.aio_resfd = eventfd.as_fd().as_raw_fd() as u32;
    }

    /// Attach an opaque cookie, echoed back in [`IoEvent::data`].
    pub fn set_data(&mut self, data: u64) {
        self.cb.aio_data = data;
    }

    pub fn data(&self) -> u64 {
        self.cb.aio_data
    }

    /// The operation's owned buffer, up to `nbytes` (defaults to the full
    /// size handed to the kernel).
    pub fn buffer(&self, nbytes: Option<usize>) -> &[u8] {
        let n = nbytes.unwrap_or(self.buf.len());
        &self.buf[..n.min(self.buf.len())]
    }

    /// Whether `ev` reports completion of this operation; if so the buffer
    /// is unpinned.
    pub fn complete(&mut self, ev: &IoEvent) -> bool {
        if ev.obj == &*self.cb as *const abi::iocb as u64 {
            self.in_flight = false;
            true
        } else {
            false
        }
    }

    /// The slice this completion produced: the first `res` bytes of the
    /// owned buffer, or `None` if `ev` belongs to another operation or
    /// reports an error.
    pub fn event_buffer(&mut self, ev: &IoEvent) -> Option<&[u8]> {
        if !self.complete(ev) || ev.res < 0 {
            return None;
        }
        let n = (ev.res as usize).min(self.buf.len());
        Some(&self.buf[..n])
    }
}

impl Drop for Iocb {
    fn drop(&mut self) {
        if self.in_flight {
            // the kernel may still write into the buffer; leak it
            return;
        }
        unsafe { ManuallyDrop::drop(&mut self.buf) };
    }
}
