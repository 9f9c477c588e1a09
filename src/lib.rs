//! Bindings to linux notification, async I/O, and IPC primitives.
//!
//! The kernel already provides the event machinery; what this crate adds is
//! the marshaling: laying out the binary structures each call expects,
//! mapping errno back out, and tying the lifetime of kernel-side resources
//! (descriptors, AIO control blocks, IPC identifiers, attachments) to owned
//! Rust values.
//!
//! - [`event`] — eventfd and its 8-byte counter codec
//! - [`signals`] — sigprocmask and signalfd
//! - [`timer`] — timerfd create/arm/read
//! - [`posix_aio`] — the librt `aio_*` family
//! - [`kaio`] — the kernel AIO ring (`io_setup`/`io_submit`/`io_getevents`)
//! - [`sysv`] — SysV message queues, semaphore sets, shared memory
//! - [`posix_ipc`] — POSIX message queues, semaphores, shared memory
//!
//! Everything returns `nix::Result`, so kernel errors arrive as
//! [`nix::errno::Errno`] values rather than flattened strings.

pub mod event;
pub mod kaio;
pub mod posix_aio;
pub mod posix_ipc;
pub mod signals;
pub mod sysv;
pub mod timer;

pub use event::{eventfd, read_eventfd, write_eventfd};
pub use signals::{read_signalfd, sigprocmask, signalfd, SigInfo};
pub use timer::{read_timerfd, TimerSpec};
