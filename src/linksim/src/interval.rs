use std::rc::Rc;

use crate::transfer::{TransferClass, TransferRef};
use crate::{Duration, Timestamp, ToSecs};

/// A fixed-length time bucket and the transfers active in it.
///
/// The per-class byte totals are a cache over the active collections. They are refreshed on
/// every insertion and by the `update_*` methods whenever a heuristic changes a rate.
#[derive(Debug, Clone)]
pub struct Interval {
    start: Timestamp,
    length: Duration,
    od_transfers: Vec<TransferRef>,
    be_transfers: Vec<TransferRef>,
    od_bytes: f64,
    be_bytes: f64,
}

impl Interval {
    pub fn new(start: Timestamp, length: Duration) -> Self {
        Interval {
            start,
            length,
            od_transfers: Vec::new(),
            be_transfers: Vec::new(),
            od_bytes: 0.0,
            be_bytes: 0.0,
        }
    }

    #[inline]
    pub fn start(&self) -> Timestamp {
        self.start
    }

    #[inline]
    pub fn length(&self) -> Duration {
        self.length
    }

    #[inline]
    pub fn end(&self) -> Timestamp {
        self.start + self.length
    }

    #[inline]
    pub fn od_transfers(&self) -> &[TransferRef] {
        &self.od_transfers
    }

    #[inline]
    pub fn be_transfers(&self) -> &[TransferRef] {
        &self.be_transfers
    }

    /// All active transfers, OD first.
    pub fn transfers(&self) -> impl Iterator<Item = &TransferRef> {
        self.od_transfers.iter().chain(self.be_transfers.iter())
    }

    #[inline]
    pub fn od_bytes(&self) -> f64 {
        self.od_bytes
    }

    #[inline]
    pub fn be_bytes(&self) -> f64 {
        self.be_bytes
    }

    #[inline]
    pub fn bytes(&self) -> f64 {
        self.od_bytes + self.be_bytes
    }

    /// No transfer is active in this interval.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.od_transfers.is_empty() && self.be_transfers.is_empty()
    }

    pub fn contains(&self, transfer: &TransferRef) -> bool {
        self.transfers().any(|t| Rc::ptr_eq(t, transfer))
    }

    /// Add an active transfer to the collection of its class and account for its bytes.
    pub fn add_transfer(&mut self, transfer: TransferRef) {
        let (class, bytes) = {
            let t = transfer.borrow();
            (t.class(), t.bytes_during(self))
        };
        match class {
            TransferClass::OnDemand => {
                self.od_transfers.push(transfer);
                self.od_bytes += bytes;
            }
            TransferClass::BestEffort => {
                self.be_transfers.push(transfer);
                self.be_bytes += bytes;
            }
        }
    }

    fn sum_bytes(&self, transfers: &[TransferRef]) -> f64 {
        transfers.iter().map(|t| t.borrow().bytes_during(self)).sum()
    }

    /// Recompute the BE total after some BE rates changed.
    pub fn update_be_load(&mut self) {
        self.be_bytes = self.sum_bytes(&self.be_transfers);
    }

    /// Recompute the OD total after some OD rates changed.
    pub fn update_od_load(&mut self) {
        self.od_bytes = self.sum_bytes(&self.od_transfers);
    }

    pub fn recompute(&mut self) {
        self.update_od_load();
        self.update_be_load();
    }

    /// Average rate over the bucket, bytes/s.
    #[inline]
    pub fn network_load(&self) -> f64 {
        self.bytes() / self.length.to_secs()
    }

    pub fn log_header() -> &'static str {
        "start_time, end_time, length_secs, bytes, od_transfers, be_transfers"
    }

    pub fn to_log_line(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}",
            self.start,
            self.end(),
            self.length.to_secs(),
            self.bytes(),
            self.od_transfers.len(),
            self.be_transfers.len()
        )
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(start: {}, end: {}, bytes: {:.1})",
            self.start,
            self.end(),
            self.bytes()
        )
    }
}
