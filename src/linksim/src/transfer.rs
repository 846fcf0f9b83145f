use std::cell::RefCell;
use std::convert::TryFrom;
use std::rc::Rc;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::{duration_from_secs, Duration, Error, Result, Timestamp, ToSecs};

/// Bytes a transfer may still owe when it is considered finished. Projected end times are kept
/// with microsecond precision, so the residue is bounded by one microsecond of traffic.
const COMPLETION_EPSILON: f64 = 1e-6;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransferId(pub u64);

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for TransferId {
    fn from(val: u64) -> TransferId {
        TransferId(val)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferClass {
    /// On-demand, admitted unconditionally.
    OnDemand,
    /// Best-effort, admitted on spare capacity and subject to throttling.
    BestEffort,
}

impl TryFrom<u64> for TransferClass {
    type Error = u64;
    fn try_from(code: u64) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(TransferClass::OnDemand),
            1 => Ok(TransferClass::BestEffort),
            x => Err(x),
        }
    }
}

impl std::fmt::Display for TransferClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferClass::OnDemand => write!(f, "OD"),
            TransferClass::BestEffort => write!(f, "BE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    NotStarted,
    Running,
    Complete,
}

pub type TransferRef = Rc<RefCell<Transfer>>;

/// One requested data movement and its simulated progress.
#[derive(Debug, Clone)]
pub struct Transfer {
    id: TransferId,
    /// where the request came from, e.g. an ip address
    source: String,
    class: TransferClass,

    /// request facts, read only
    requested_start: Timestamp,
    requested_duration: Duration,
    total_bytes: u64,
    requested_rate: f64,

    /// states, mutated by the simulator
    status: TransferStatus,
    bytes_remaining: f64,
    current_rate: f64,
    start: Option<Timestamp>,
    /// projection, recomputed on every rate change
    end: Option<Timestamp>,
    completed_at: Option<Timestamp>,
}

impl Transfer {
    pub fn new(
        id: TransferId,
        source: &str,
        class: TransferClass,
        requested_start: Timestamp,
        requested_duration: Duration,
        total_bytes: u64,
    ) -> Self {
        assert!(
            requested_duration > Duration::zero(),
            "transfer {} requests a non-positive duration",
            id
        );
        let requested_rate = total_bytes as f64 / requested_duration.to_secs();
        Transfer {
            id,
            source: source.to_owned(),
            class,
            requested_start,
            requested_duration,
            total_bytes,
            requested_rate,
            status: TransferStatus::NotStarted,
            bytes_remaining: total_bytes as f64,
            current_rate: requested_rate,
            start: None,
            end: None,
            completed_at: None,
        }
    }

    #[inline]
    pub fn into_ref(self) -> TransferRef {
        Rc::new(RefCell::new(self))
    }

    #[inline]
    pub fn id(&self) -> TransferId {
        self.id
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn class(&self) -> TransferClass {
        self.class
    }

    /// Reclassify a transfer. Only meaningful before it is handed to a simulation run.
    pub fn set_class(&mut self, class: TransferClass) {
        assert_eq!(
            self.status,
            TransferStatus::NotStarted,
            "cannot reclassify a transfer that has been simulated"
        );
        self.class = class;
    }

    #[inline]
    pub fn requested_start(&self) -> Timestamp {
        self.requested_start
    }

    #[inline]
    pub fn requested_duration(&self) -> Duration {
        self.requested_duration
    }

    #[inline]
    pub fn requested_end(&self) -> Timestamp {
        self.requested_start + self.requested_duration
    }

    #[inline]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// bytes/s
    #[inline]
    pub fn requested_rate(&self) -> f64 {
        self.requested_rate
    }

    #[inline]
    pub fn status(&self) -> TransferStatus {
        self.status
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.status != TransferStatus::NotStarted
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.status == TransferStatus::Complete
    }

    #[inline]
    pub fn bytes_remaining(&self) -> f64 {
        self.bytes_remaining
    }

    /// bytes/s, `None` until started
    #[inline]
    pub fn current_rate(&self) -> Option<f64> {
        if self.is_started() {
            Some(self.current_rate)
        } else {
            None
        }
    }

    #[inline]
    pub fn start_time(&self) -> Option<Timestamp> {
        self.start
    }

    /// Projected end of the transfer at its current rate.
    #[inline]
    pub fn end_time(&self) -> Option<Timestamp> {
        self.end
    }

    #[inline]
    pub fn completed_at(&self) -> Option<Timestamp> {
        self.completed_at
    }

    fn check_rate(&self, rate: f64) -> Result<()> {
        if rate.is_finite() && rate > 0.0 {
            Ok(())
        } else {
            Err(Error::InvalidRate(self.id, rate))
        }
    }

    /// When the bytes still owed are done at `rate`, starting from `now`.
    fn project_end(&self, now: Timestamp, rate: f64) -> Result<Timestamp> {
        duration_from_secs(self.bytes_remaining / rate)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or(Error::InvalidRate(self.id, rate))
    }

    /// Admit the transfer at `now`, at `rate` or, if none is given, at its requested rate.
    ///
    /// A transfer is started at most once; a second call is rejected with
    /// [`Error::AlreadyStarted`] and leaves the transfer untouched.
    pub fn start(&mut self, now: Timestamp, rate: Option<f64>) -> Result<()> {
        if self.is_started() {
            return Err(Error::AlreadyStarted(self.id));
        }
        match rate {
            Some(rate) => {
                self.check_rate(rate)?;
                let end = self.project_end(now, rate)?;
                self.current_rate = rate;
                self.end = Some(end);
            }
            None => {
                self.current_rate = self.requested_rate;
                self.end = Some(now + self.requested_duration);
            }
        }
        self.start = Some(now);
        self.status = TransferStatus::Running;
        trace!("start transfer: {:?}", self);
        Ok(())
    }

    /// Change the rate at `now` and reproject the end from the bytes still owed.
    pub fn update_rate(&mut self, rate: f64, now: Timestamp) -> Result<()> {
        if !self.is_started() {
            return Err(Error::NotStarted(self.id));
        }
        self.check_rate(rate)?;
        let end = self.project_end(now, rate)?;
        self.current_rate = rate;
        self.end = Some(end);
        trace!(
            "transfer {} rate -> {} bytes/s, projected end {:?}",
            self.id,
            rate,
            self.end
        );
        Ok(())
    }

    /// Bytes moved inside `interval` at the current rate. Zero when the transfer has not started
    /// or does not overlap the interval.
    pub fn bytes_during(&self, interval: &Interval) -> f64 {
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                let from = start.max(interval.start());
                let to = end.min(interval.end());
                let overlap = (to - from).to_secs().max(0.0);
                overlap * self.current_rate
            }
            _ => 0.0,
        }
    }

    /// Account for the bytes moved during `interval`; returns them.
    pub fn consume(&mut self, interval: &Interval) -> f64 {
        let bytes = self.bytes_during(interval);
        self.bytes_remaining -= bytes;
        if self.bytes_remaining <= self.residue_tolerance() {
            self.bytes_remaining = self.bytes_remaining.max(0.0);
            self.finish();
        }
        bytes
    }

    /// Mark the transfer complete at its projected end. Called once it stops being carried into
    /// later intervals.
    pub fn finish(&mut self) {
        if self.status == TransferStatus::Running {
            if self.bytes_remaining > self.residue_tolerance() {
                log::debug!(
                    "transfer {} finished with {} bytes unaccounted",
                    self.id,
                    self.bytes_remaining
                );
            }
            self.status = TransferStatus::Complete;
            self.completed_at = self.end;
        }
    }

    #[inline]
    fn residue_tolerance(&self) -> f64 {
        COMPLETION_EPSILON.max(self.current_rate * COMPLETION_EPSILON)
    }
}

impl std::fmt::Display for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.start, self.end) {
            (Some(start), Some(end)) => write!(
                f,
                "({} {} | Requested Time {} - {} | Actual Time {} - {} | {} Total Bytes | {:.1} Bytes Remaining)",
                self.id,
                self.class,
                self.requested_start,
                self.requested_end(),
                start,
                end,
                self.total_bytes,
                self.bytes_remaining
            ),
            _ => write!(
                f,
                "({} {} | Requested Time {} - {} | {} Total Bytes | {:.1} Bytes Remaining)",
                self.id,
                self.class,
                self.requested_start,
                self.requested_end(),
                self.total_bytes,
                self.bytes_remaining
            ),
        }
    }
}
