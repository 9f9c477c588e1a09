//! The `linux/aio_abi.h` layout and the four ring syscalls.
//!
//! glibc does not wrap these, so the structs are laid out here field for
//! field. `aio_key`/`aio_rw_flags` swap places on big-endian targets; the
//! rest of the block is fixed-width and endian-stable.
#![allow(non_camel_case_types)]

use nix::libc;

pub type aio_context_t = libc::c_ulong;

pub const IOCB_CMD_PREAD: u16 = 0;
pub const IOCB_CMD_PWRITE: u16 = 1;
pub const IOCB_CMD_FSYNC: u16 = 2;
pub const IOCB_CMD_FDSYNC: u16 = 3;
pub const IOCB_CMD_NOOP: u16 = 6;

/// Signal completion by incrementing the eventfd in `aio_resfd`.
pub const IOCB_FLAG_RESFD: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct iocb {
    pub aio_data: u64,
    #[cfg(target_endian = "little")]
    pub aio_key: u32,
    #[cfg(target_endian = "little")]
    pub aio_rw_flags: u32,
    #[cfg(target_endian = "big")]
    pub aio_rw_flags: u32,
    #[cfg(target_endian = "big")]
    pub aio_key: u32,
    pub aio_lio_opcode: u16,
    pub aio_reqprio: i16,
    pub aio_fildes: u32,
    pub aio_buf: u64,
    pub aio_nbytes: u64,
    pub aio_offset: i64,
    pub aio_reserved2: u64,
    pub aio_flags: u32,
    pub aio_resfd: u32,
}

impl iocb {
    pub fn zeroed() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct io_event {
    pub data: u64,
    pub obj: u64,
    pub res: i64,
    pub res2: i64,
}

impl io_event {
    pub fn zeroed() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

pub unsafe fn io_setup(nr: libc::c_long, ctxp: *mut aio_context_t) -> libc::c_long {
    libc::syscall(libc::SYS_io_setup, nr, ctxp)
}

pub unsafe fn io_destroy(ctx: aio_context_t) -> libc::c_long {
    libc::syscall(libc::SYS_io_destroy, ctx)
}

pub unsafe fn io_submit(
    ctx: aio_context_t,
    nr: libc::c_long,
    iocbpp: *mut *mut iocb,
) -> libc::c_long {
    libc::syscall(libc::SYS_io_submit, ctx, nr, iocbpp)
}

pub unsafe fn io_getevents(
    ctx: aio_context_t,
    min_nr: libc::c_long,
    nr: libc::c_long,
    events: *mut io_event,
    timeout: *mut libc::timespec,
) -> libc::c_long {
    libc::syscall(libc::SYS_io_getevents, ctx, min_nr, nr, events, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abi_struct_sizes() {
        // fixed by the kernel ABI on every architecture
        assert_eq!(std::mem::size_of::<iocb>(), 64);
        assert_eq!(std::mem::size_of::<io_event>(), 32);
    }
}
