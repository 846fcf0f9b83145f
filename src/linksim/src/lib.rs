//! Interval-bucketed simulation of a shared link that carries on-demand (OD) and best-effort
//! (BE) data transfers under a pluggable admission policy.

pub mod transfer;
pub use transfer::{Transfer, TransferClass, TransferId, TransferRef, TransferStatus};

pub mod interval;
pub use interval::Interval;

pub mod sequence;
pub use sequence::IntervalSeq;

pub mod series;
pub use series::{LoadPoint, LoadSeries};

pub mod heuristic;
pub use heuristic::{Baseline, FcfsThrottle, Heuristic, HeuristicKind};

pub mod simulator;
pub use simulator::{Simulator, SimulatorBuilder};

pub mod stats;
pub use stats::Statistics;

pub mod xferlog;

pub mod plot;

pub mod config;

pub mod argument;

pub mod experiment;

/// Wall-clock time inside the simulation.
pub type Timestamp = chrono::NaiveDateTime;
pub type Duration = chrono::Duration;

/// Fraction of the capacity above which best-effort traffic is held back.
pub const LOAD_THRESHOLD: f64 = 0.95;

pub const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("transfer {0} has already been started")]
    AlreadyStarted(TransferId),
    #[error("transfer {0} has not been started yet")]
    NotStarted(TransferId),
    #[error("invalid rate for transfer {0}: {1} bytes/s")]
    InvalidRate(TransferId, f64),
    #[error("simulation stalled at {at}: link idle with {queued_od} OD and {queued_be} BE transfers queued")]
    Stalled {
        at: Timestamp,
        queued_od: usize,
        queued_be: usize,
    },
    #[error("simulator is missing setting: {0}")]
    Incomplete(&'static str),
    #[error("transfer log does not exist: {0:?}")]
    NoSuchFile(std::path::PathBuf),
    #[error("transfer log {path:?} does not contain column '{column}'")]
    MissingColumn {
        path: std::path::PathBuf,
        column: &'static str,
    },
    #[error("transfer log {0:?} has no header row")]
    EmptyLog(std::path::PathBuf),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The ceiling that heuristics arbitrate against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Capacity {
    Unconstrained,
    /// bytes/s
    Limited(f64),
}

impl Default for Capacity {
    fn default() -> Self {
        Capacity::Unconstrained
    }
}

impl Capacity {
    /// A non-positive value means the link is unconstrained.
    pub fn from_bytes_per_sec(val: f64) -> Self {
        if val > 0.0 {
            Capacity::Limited(val)
        } else {
            Capacity::Unconstrained
        }
    }

    #[inline]
    pub fn threshold(&self) -> Option<f64> {
        match *self {
            Capacity::Unconstrained => None,
            Capacity::Limited(c) => Some(c * LOAD_THRESHOLD),
        }
    }

    /// Whether a load (bytes/s) still leaves room below the threshold.
    #[inline]
    pub fn has_headroom(&self, load: f64) -> bool {
        self.threshold().map_or(true, |t| load < t)
    }

    #[inline]
    pub fn exceeded_by(&self, load: f64) -> bool {
        self.threshold().map_or(false, |t| load > t)
    }

    /// Spare bandwidth below the threshold, may be negative.
    #[inline]
    pub fn headroom(&self, load: f64) -> f64 {
        self.threshold().map_or(f64::INFINITY, |t| t - load)
    }
}

impl std::fmt::Display for Capacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capacity::Unconstrained => write!(f, "unconstrained"),
            Capacity::Limited(c) => write!(f, "{:.3} MiB/s", c / BYTES_PER_MIB),
        }
    }
}

pub(crate) trait ToSecs {
    fn to_secs(self) -> f64;
}

impl ToSecs for Duration {
    #[inline]
    fn to_secs(self) -> f64 {
        match self.num_microseconds() {
            Some(us) => us as f64 / 1e6,
            None => self.num_milliseconds() as f64 / 1e3,
        }
    }
}

/// `None` when `secs` is not finite or does not fit in microseconds.
#[inline]
pub(crate) fn duration_from_secs(secs: f64) -> Option<Duration> {
    let us = (secs * 1e6).round();
    if us.is_finite() && us.abs() < i64::MAX as f64 {
        Some(Duration::microseconds(us as i64))
    } else {
        None
    }
}
