//! POSIX semaphores, named and unnamed.
//!
//! Named semaphores come from `sem_open` and are closed on drop. Unnamed
//! ones live wherever the caller puts them (usually a shared mapping), so
//! initialization and teardown work on raw `sem_t` pointers and are
//! `unsafe`: the pointed-to memory must stay valid and shared for as long
//! as any process touches the semaphore.
use nix::errno::Errno;
use nix::libc;
use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, ClockId};
use std::ptr::NonNull;
use std::time::Duration;

use super::name_cstr;

pub use nix::fcntl::OFlag;
pub use nix::sys::stat::Mode;

/// A handle on a semaphore, either opened by name or wrapped from a raw
/// placement.
#[derive(Debug)]
pub struct SemRef {
    sem: NonNull<libc::sem_t>,
    named: bool,
}

// sem_t operations are async-signal-safe and process-shared.
unsafe impl Send for SemRef {}
unsafe impl Sync for SemRef {}

impl SemRef {
    /// Open (and with `O_CREAT`, create with `value`) the named semaphore.
    pub fn open(name: &str, oflag: OFlag, mode: Mode, value: u32) -> nix::Result<SemRef> {
        let cname = name_cstr(name)?;
        let sem = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                oflag.bits(),
                mode.bits() as libc::c_uint,
                value,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(Errno::last());
        }
        Ok(SemRef {
            sem: NonNull::new(sem).ok_or(Errno::EINVAL)?,
            named: true,
        })
    }

    /// Wrap an already-initialized unnamed semaphore for the operation
    /// methods.
    ///
    /// # Safety
    ///
    /// `sem` must point to a `sem_t` initialized with [`sem_init_at`] (or
    /// the C equivalent) that outlives the returned handle.
    pub unsafe fn from_raw(sem: *mut libc::sem_t) -> nix::Result<SemRef> {
        Ok(SemRef {
            sem: NonNull::new(sem).ok_or(Errno::EINVAL)?,
            named: false,
        })
    }

    /// Increment the semaphore, waking one waiter.
    pub fn post(&self) -> nix::Result<()> {
        Errno::result(unsafe { libc::sem_post(self.sem.as_ptr()) }).map(drop)
    }

    /// Decrement the semaphore, blocking while it is zero.
    pub fn wait(&self) -> nix::Result<()> {
        Errno::result(unsafe { libc::sem_wait(self.sem.as_ptr()) }).map(drop)
    }

    /// Decrement if possible, `EAGAIN` otherwise.
    pub fn try_wait(&self) -> nix::Result<()> {
        Errno::result(unsafe { libc::sem_trywait(self.sem.as_ptr()) }).map(drop)
    }

    /// [`SemRef::wait`] bounded by a relative timeout (`ETIMEDOUT` on
    /// expiry).
    pub fn timedwait(&self, timeout: Duration) -> nix::Result<()> {
        let now = clock_gettime(ClockId::CLOCK_REALTIME)?;
        let deadline = now + TimeSpec::from_duration(timeout);
        let ts = libc::timespec {
            tv_sec: deadline.tv_sec(),
            tv_nsec: deadline.tv_nsec(),
        };
        Errno::result(unsafe { libc::sem_timedwait(self.sem.as_ptr(), &ts) }).map(drop)
    }

    /// The current counter value.
    pub fn value(&self) -> nix::Result<i32> {
        let mut val: libc::c_int = 0;
        Errno::result(unsafe { libc::sem_getvalue(self.sem.as_ptr(), &mut val) })?;
        Ok(val)
    }
}

impl Drop for SemRef {
    fn drop(&mut self) {
        if self.named {
            unsafe { libc::sem_close(self.sem.as_ptr()) };
        }
    }
}

/// Remove a semaphore name; the semaphore dies with its last handle.
pub fn sem_unlink(name: &str) -> nix::Result<()> {
    let cname = name_cstr(name)?;
    Errno::result(unsafe { libc::sem_unlink(cname.as_ptr()) }).map(drop)
}

/// Initialize an unnamed semaphore in caller-provided memory.
///
/// With `pshared` the memory must be in a mapping shared between the
/// processes that will use it.
///
/// # Safety
///
/// `sem` must point to properly aligned memory of at least
/// `size_of::<sem_t>()` bytes that is not already an initialized semaphore.
pub unsafe fn sem_init_at(sem: *mut libc::sem_t, pshared: bool, value: u32) -> nix::Result<()> {
    Errno::result(libc::sem_init(sem, pshared as libc::c_int, value)).map(drop)
}

/// Tear down an unnamed semaphore.
///
/// # Safety
///
/// `sem` must have been initialized by [`sem_init_at`] and have no waiters.
pub unsafe fn sem_destroy_at(sem: *mut libc::sem_t) -> nix::Result<()> {
    Errno::result(libc::sem_destroy(sem)).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    fn unique_name(tag: &str) -> String {
        format!("/adelie-sem-{}-{}", tag, std::process::id())
    }

    #[test]
    fn named_semaphore_counts() {
        let name = unique_name("count");
        let sem = SemRef::open(
            &name,
            OFlag::O_CREAT | OFlag::O_EXCL,
            Mode::from_bits_truncate(0o600),
            2,
        )
        .unwrap();

        assert_eq!(sem.value().unwrap(), 2);
        sem.wait().unwrap();
        sem.try_wait().unwrap();
        assert_eq!(sem.try_wait(), Err(Errno::EAGAIN));

        sem.post().unwrap();
        assert_eq!(sem.value().unwrap(), 1);

        sem_unlink(&name).unwrap();
    }

    #[test]
    fn timedwait_expires_on_empty_semaphore() {
        let name = unique_name("timeo");
        let sem = SemRef::open(
            &name,
            OFlag::O_CREAT | OFlag::O_EXCL,
            Mode::from_bits_truncate(0o600),
            0,
        )
        .unwrap();

        assert_eq!(
            sem.timedwait(Duration::from_millis(20)),
            Err(Errno::ETIMEDOUT)
        );

        sem_unlink(&name).unwrap();
    }

    #[test]
    fn unnamed_semaphore_in_local_memory() {
        let mut slot = MaybeUninit::<libc::sem_t>::uninit();
        unsafe {
            sem_init_at(slot.as_mut_ptr(), false, 1).unwrap();
            let sem = SemRef::from_raw(slot.as_mut_ptr()).unwrap();

            sem.wait().unwrap();
            assert_eq!(sem.try_wait(), Err(Errno::EAGAIN));
            sem.post().unwrap();
            assert_eq!(sem.value().unwrap(), 1);

            drop(sem);
            sem_destroy_at(slot.as_mut_ptr()).unwrap();
        }
    }
}
