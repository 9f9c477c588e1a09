//! POSIX message queues.
//!
//! Timeouts here are relative; the kernel wants absolute CLOCK_REALTIME
//! deadlines, so each timed call converts at the moment it is made.
use nix::errno::Errno;
use nix::libc;
use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, ClockId};
use std::sync::OnceLock;
use std::time::Duration;

use super::name_cstr;

pub use nix::fcntl::OFlag;
pub use nix::sys::signal::Signal;
pub use nix::sys::stat::Mode;

/// An open queue descriptor. Closed on drop; [`mq_close`] reports errors.
#[derive(Debug)]
pub struct Mqd(libc::mqd_t);

impl Mqd {
    pub fn as_raw(&self) -> libc::mqd_t {
        self.0
    }
}

impl Drop for Mqd {
    fn drop(&mut self) {
        unsafe { libc::mq_close(self.0) };
    }
}

/// Queue attributes, as `mq_getattr`/`mq_setattr` see them.
///
/// Only the `O_NONBLOCK` bit of `flags` is mutable on an open queue;
/// `maxmsg` and `msgsize` are fixed at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MqAttr {
    pub flags: i64,
    pub maxmsg: i64,
    pub msgsize: i64,
    pub curmsgs: i64,
}

impl MqAttr {
    fn raw(&self) -> libc::mq_attr {
        let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
        attr.mq_flags = self.flags as libc::c_long;
        attr.mq_maxmsg = self.maxmsg as libc::c_long;
        attr.mq_msgsize = self.msgsize as libc::c_long;
        attr.mq_curmsgs = self.curmsgs as libc::c_long;
        attr
    }

    fn decode(attr: &libc::mq_attr) -> MqAttr {
        MqAttr {
            flags: attr.mq_flags as i64,
            maxmsg: attr.mq_maxmsg as i64,
            msgsize: attr.mq_msgsize as i64,
            curmsgs: attr.mq_curmsgs as i64,
        }
    }
}

fn abs_deadline(timeout: Duration) -> nix::Result<libc::timespec> {
    let now = clock_gettime(ClockId::CLOCK_REALTIME)?;
    let deadline = now + TimeSpec::from_duration(timeout);
    Ok(libc::timespec {
        tv_sec: deadline.tv_sec(),
        tv_nsec: deadline.tv_nsec(),
    })
}

/// The system-wide message size ceiling, which is also the safe default
/// receive buffer size.
fn default_sizehint() -> usize {
    static MSGSIZE_MAX: OnceLock<usize> = OnceLock::new();
    *MSGSIZE_MAX.get_or_init(|| {
        std::fs::read_to_string("/proc/sys/fs/mqueue/msgsize_max")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(8192)
    })
}

/// Open (and with `O_CREAT`, create) the queue `name`.
///
/// `name` must start with `/`. `attr` bounds the queue at creation; `None`
/// takes the system defaults.
pub fn mq_open(name: &str, oflag: OFlag, mode: Mode, attr: Option<&MqAttr>) -> nix::Result<Mqd> {
    let cname = name_cstr(name)?;
    let raw_attr = attr.map(|a| a.raw());
    let attrp = match raw_attr.as_ref() {
        Some(a) => a as *const libc::mq_attr,
        None => std::ptr::null(),
    };

    let mqd = unsafe {
        libc::mq_open(
            cname.as_ptr(),
            oflag.bits(),
            mode.bits() as libc::c_uint,
            attrp,
        )
    };
    if mqd == -1 as libc::mqd_t {
        return Err(Errno::last());
    }
    Ok(Mqd(mqd))
}

/// Close the queue descriptor, surfacing any error.
pub fn mq_close(mqd: Mqd) -> nix::Result<()> {
    let raw = mqd.0;
    std::mem::forget(mqd);
    Errno::result(unsafe { libc::mq_close(raw) }).map(drop)
}

/// Remove the queue name; the queue itself dies with its last descriptor.
pub fn mq_unlink(name: &str) -> nix::Result<()> {
    let cname = name_cstr(name)?;
    Errno::result(unsafe { libc::mq_unlink(cname.as_ptr()) }).map(drop)
}

/// Queue a message at the given priority.
///
/// Blocks while the queue is full; a timeout turns that into
/// `ETIMEDOUT` after the relative delay expires.
pub fn mq_send(mqd: &Mqd, msg: &[u8], prio: u32, timeout: Option<Duration>) -> nix::Result<()> {
    let res = match timeout {
        None => unsafe {
            libc::mq_send(mqd.0, msg.as_ptr() as *const libc::c_char, msg.len(), prio)
        },
        Some(t) => {
            let ts = abs_deadline(t)?;
            unsafe {
                libc::mq_timedsend(
                    mqd.0,
                    msg.as_ptr() as *const libc::c_char,
                    msg.len(),
                    prio,
                    &ts,
                )
            }
        }
    };
    Errno::result(res).map(drop)
}

/// Take the oldest highest-priority message off the queue.
///
/// `sizehint` must be at least the queue's `msgsize`; the default is the
/// system-wide ceiling. Returns the priority and payload.
pub fn mq_receive(
    mqd: &Mqd,
    timeout: Option<Duration>,
    sizehint: Option<usize>,
) -> nix::Result<(u32, Vec<u8>)> {
    let size = sizehint.unwrap_or_else(default_sizehint);
    let mut buf = vec![0u8; size];
    let mut prio: libc::c_uint = 0;

    let res = match timeout {
        None => unsafe {
            libc::mq_receive(
                mqd.0,
                buf.as_mut_ptr() as *mut libc::c_char,
                buf.len(),
                &mut prio,
            )
        },
        Some(t) => {
            let ts = abs_deadline(t)?;
            unsafe {
                libc::mq_timedreceive(
                    mqd.0,
                    buf.as_mut_ptr() as *mut libc::c_char,
                    buf.len(),
                    &mut prio,
                    &ts,
                )
            }
        }
    };
    let received = Errno::result(res)? as usize;
    buf.truncate(received);
    Ok((prio, buf))
}

/// The queue's current attributes.
pub fn mq_getattr(mqd: &Mqd) -> nix::Result<MqAttr> {
    let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
    Errno::result(unsafe { libc::mq_getattr(mqd.0, &mut attr) })?;
    Ok(MqAttr::decode(&attr))
}

/// Change the queue's `O_NONBLOCK` flag, returning the attributes that were
/// displaced.
pub fn mq_setattr(mqd: &Mqd, newattr: &MqAttr) -> nix::Result<MqAttr> {
    let new = newattr.raw();
    let mut old: libc::mq_attr = unsafe { std::mem::zeroed() };
    Errno::result(unsafe { libc::mq_setattr(mqd.0, &new, &mut old) })?;
    Ok(MqAttr::decode(&old))
}

/// Register (or with `None`, retract) delivery of a signal when a message
/// arrives on the empty queue.
///
/// Only one process may be registered per queue at a time; the kernel
/// answers `EBUSY` otherwise.
pub fn mq_notify(mqd: &Mqd, signal: Option<Signal>) -> nix::Result<()> {
    let res = match signal {
        Some(sig) => {
            let mut sev: libc::sigevent = unsafe { std::mem::zeroed() };
            sev.sigev_notify = libc::SIGEV_SIGNAL;
            sev.sigev_signo = sig as libc::c_int;
            unsafe { libc::mq_notify(mqd.0, &sev) }
        }
        None => unsafe { libc::mq_notify(mqd.0, std::ptr::null()) },
    };
    Errno::result(res).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/adelie-mq-{}-{}", tag, std::process::id())
    }

    fn create_flags() -> OFlag {
        OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR
    }

    #[test]
    fn send_receive_by_priority() {
        let name = unique_name("prio");
        let attr = MqAttr {
            flags: 0,
            maxmsg: 8,
            msgsize: 64,
            curmsgs: 0,
        };
        let mqd = mq_open(&name, create_flags(), Mode::from_bits_truncate(0o600), Some(&attr))
            .unwrap();

        mq_send(&mqd, b"low", 1, None).unwrap();
        mq_send(&mqd, b"high", 9, None).unwrap();

        let (prio, data) = mq_receive(&mqd, None, None).unwrap();
        assert_eq!((prio, data.as_slice()), (9, b"high".as_slice()));
        let (prio, data) = mq_receive(&mqd, None, None).unwrap();
        assert_eq!((prio, data.as_slice()), (1, b"low".as_slice()));

        mq_unlink(&name).unwrap();
        mq_close(mqd).unwrap();
    }

    #[test]
    fn timed_receive_expires() {
        let name = unique_name("timeo");
        let mqd = mq_open(&name, create_flags(), Mode::from_bits_truncate(0o600), None).unwrap();

        let res = mq_receive(&mqd, Some(Duration::from_millis(20)), None);
        assert_eq!(res.err(), Some(Errno::ETIMEDOUT));

        mq_unlink(&name).unwrap();
        mq_close(mqd).unwrap();
    }

    #[test]
    fn attrs_report_queue_state() {
        let name = unique_name("attr");
        let attr = MqAttr {
            flags: 0,
            maxmsg: 4,
            msgsize: 32,
            curmsgs: 0,
        };
        let mqd = mq_open(&name, create_flags(), Mode::from_bits_truncate(0o600), Some(&attr))
            .unwrap();

        mq_send(&mqd, b"x", 0, None).unwrap();
        let got = mq_getattr(&mqd).unwrap();
        assert_eq!(got.maxmsg, 4);
        assert_eq!(got.msgsize, 32);
        assert_eq!(got.curmsgs, 1);

        // flip on O_NONBLOCK and get the old attrs back
        let old = mq_setattr(
            &mqd,
            &MqAttr {
                flags: libc::O_NONBLOCK as i64,
                ..got
            },
        )
        .unwrap();
        assert_eq!(old.flags & libc::O_NONBLOCK as i64, 0);
        assert_ne!(mq_getattr(&mqd).unwrap().flags & libc::O_NONBLOCK as i64, 0);

        // nonblocking receive drains the one message then reports empty
        assert!(mq_receive(&mqd, None, None).is_ok());
        assert_eq!(mq_receive(&mqd, None, None).err(), Some(Errno::EAGAIN));

        mq_unlink(&name).unwrap();
        mq_close(mqd).unwrap();
    }

    #[test]
    fn notify_registration_is_exclusive() {
        let name = unique_name("notify");
        let mqd = mq_open(&name, create_flags(), Mode::from_bits_truncate(0o600), None).unwrap();

        mq_notify(&mqd, Some(Signal::SIGUSR2)).unwrap();
        assert_eq!(mq_notify(&mqd, Some(Signal::SIGUSR2)).err(), Some(Errno::EBUSY));

        mq_notify(&mqd, None).unwrap();
        mq_notify(&mqd, Some(Signal::SIGUSR2)).unwrap();
        mq_notify(&mqd, None).unwrap();

        mq_unlink(&name).unwrap();
        mq_close(mqd).unwrap();
    }
}
