//! Signal masks and signalfd.
//!
//! signalfd is useless on its own: a signal only reaches the descriptor if
//! normal delivery can't grab it first, so the mask has to be blocked in
//! every thread that might otherwise receive it. [`sigprocmask`] is bundled
//! here for exactly that reason.
use nix::sys::signal;

pub use nix::sys::signal::{SigSet, SigmaskHow, Signal};
pub use nix::sys::signalfd::{SfdFlags, SignalFd};

/// Examine and change the calling thread's blocked-signal mask.
///
/// `how` is `SIG_BLOCK`, `SIG_UNBLOCK`, or `SIG_SETMASK`; returns the mask
/// that was in effect before the call.
pub fn sigprocmask(how: SigmaskHow, set: &SigSet) -> nix::Result<SigSet> {
    let mut old = SigSet::empty();
    signal::sigprocmask(how, Some(set), Some(&mut old))?;
    Ok(old)
}

/// Create a descriptor that accepts the signals in `mask`.
///
/// To change the mask of an existing descriptor, use
/// [`SignalFd::set_mask`] rather than opening a second one.
pub fn signalfd(mask: &SigSet, flags: SfdFlags) -> nix::Result<SignalFd> {
    SignalFd::with_flags(mask, flags)
}

/// The interesting fields of a `signalfd_siginfo`, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigInfo {
    pub signo: Signal,
    /// Origin code: `SI_USER`, `SI_KERNEL`, `SI_TIMER`, `SI_ASYNCIO`, ...
    pub code: i32,
    /// Sending process, when the signal has one.
    pub pid: u32,
    /// Real uid of the sender.
    pub uid: u32,
}

/// Read one queued signal off a signalfd.
///
/// Returns `Ok(None)` when the descriptor is non-blocking and no signal is
/// pending.
pub fn read_signalfd(fd: &mut SignalFd) -> nix::Result<Option<SigInfo>> {
    match fd.read_signal()? {
        Some(si) => Ok(Some(SigInfo {
            signo: Signal::try_from(si.ssi_signo as i32)?,
            code: si.ssi_code,
            pid: si.ssi_pid,
            uid: si.ssi_uid,
        })),
        None => Ok(None),
    }
}
