//! The Serializable configuration data structures used for setup.
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use adelie::timer::{ClockId, TimerSpec};

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ClockConf {
    Realtime,
    Monotonic,
    Boottime,
}

impl ClockConf {
    pub fn clock_id(self) -> ClockId {
        match self {
            ClockConf::Realtime => ClockId::CLOCK_REALTIME,
            ClockConf::Monotonic => ClockId::CLOCK_MONOTONIC,
            ClockConf::Boottime => ClockId::CLOCK_BOOTTIME,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimerConf {
    pub name: String,

    /// Seconds until the first expiration.
    pub initial: f64,

    /// Re-arm period in seconds; 0 means one-shot.
    #[serde(default)]
    pub interval: f64,

    #[serde(default = "default_clock")]
    pub clock: ClockConf,

    #[serde(default)]
    pub absolute: bool,
}

impl TimerConf {
    pub fn spec(&self) -> TimerSpec {
        TimerSpec {
            value: Duration::from_secs_f64(self.initial),
            interval: Duration::from_secs_f64(self.interval),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SignalConf {
    /// Signal name, e.g. "SIGUSR1".
    pub signal: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EventfdConf {
    pub name: String,

    #[serde(default)]
    pub initval: u32,

    #[serde(default)]
    pub semaphore: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub timer: Vec<TimerConf>,

    #[serde(default)]
    pub signal: Vec<SignalConf>,

    #[serde(default)]
    pub eventfd: Vec<EventfdConf>,

    /// Log file; stdout when absent.
    pub log: Option<PathBuf>,
}

fn default_clock() -> ClockConf {
    ClockConf::Monotonic
}
