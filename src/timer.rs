//! timerfd: timers delivered as file-descriptor reads.
//!
//! Creation goes through `nix`; arming does not, because `timerfd_settime`
//! reports the setting it displaced and nix's `TimerFd::set` throws that
//! away. We marshal the `itimerspec` ourselves so callers get it back.
use nix::errno::Errno;
use nix::libc;
use std::os::fd::{AsFd, AsRawFd};
use std::time::Duration;

use crate::event::read_eventfd;

pub use nix::sys::timerfd::{ClockId, TimerFd, TimerFlags};

/// An armed (or disarmed) timer setting.
///
/// A zero `value` means the timer is disarmed; a zero `interval` means it
/// fires once and stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSpec {
    /// Time until the first expiration.
    pub value: Duration,
    /// Re-arm period after the first expiration.
    pub interval: Duration,
}

impl TimerSpec {
    /// A one-shot timer firing after `value`.
    pub fn once(value: Duration) -> Self {
        TimerSpec {
            value,
            interval: Duration::ZERO,
        }
    }

    /// A periodic timer with the same initial delay and period.
    pub fn periodic(period: Duration) -> Self {
        TimerSpec {
            value: period,
            interval: period,
        }
    }

    /// The all-zero spec, which disarms the timer.
    pub fn disarm() -> Self {
        TimerSpec::default()
    }
}

fn duration_to_timespec(d: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    }
}

fn timespec_to_duration(ts: libc::timespec) -> Duration {
    Duration::new(ts.tv_sec.max(0) as u64, ts.tv_nsec.max(0) as u32)
}

impl From<libc::itimerspec> for TimerSpec {
    fn from(its: libc::itimerspec) -> Self {
        TimerSpec {
            value: timespec_to_duration(its.it_value),
            interval: timespec_to_duration(its.it_interval),
        }
    }
}

impl From<TimerSpec> for libc::itimerspec {
    fn from(spec: TimerSpec) -> Self {
        libc::itimerspec {
            it_interval: duration_to_timespec(spec.interval),
            it_value: duration_to_timespec(spec.value),
        }
    }
}

/// Create a new timer descriptor. See `man 2 timerfd_create`.
pub fn create(clock: ClockId, flags: TimerFlags) -> nix::Result<TimerFd> {
    TimerFd::new(clock, flags)
}

/// Arm or disarm the timer behind `fd`, returning the displaced setting.
///
/// With `absolute` the `value` field is interpreted against the timer's
/// clock rather than as a relative delay.
pub fn settime<F: AsFd>(fd: &F, spec: TimerSpec, absolute: bool) -> nix::Result<TimerSpec> {
    let new: libc::itimerspec = spec.into();
    let mut old: libc::itimerspec = unsafe { std::mem::zeroed() };
    let flags = if absolute { libc::TFD_TIMER_ABSTIME } else { 0 };

    let res = unsafe { libc::timerfd_settime(fd.as_fd().as_raw_fd(), flags, &new, &mut old) };
    Errno::result(res)?;
    Ok(old.into())
}

/// Report the current setting of the timer behind `fd`.
///
/// `value` is always the remaining time until the next expiration, even if
/// the timer was armed with an absolute deadline.
pub fn gettime<F: AsFd>(fd: &F) -> nix::Result<TimerSpec> {
    let mut cur: libc::itimerspec = unsafe { std::mem::zeroed() };
    let res = unsafe { libc::timerfd_gettime(fd.as_fd().as_raw_fd(), &mut cur) };
    Errno::result(res)?;
    Ok(cur.into())
}

/// Read the expiration count off a timer descriptor.
///
/// Like eventfd, a timerfd read moves one native-endian u64: the number of
/// expirations since the previous read.
pub fn read_timerfd<F: AsFd>(fd: F) -> nix::Result<u64> {
    read_eventfd(fd)
}
