use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::transfer::TransferRef;
use crate::{Capacity, Result, ToSecs};

/// The admission policy invoked once per interval.
///
/// An implementation may pop transfers from the front of either queue (never skipping ahead
/// within a class), must start every transfer it pops, and must add it to `interval`. It may
/// also change the rate of transfers already active in `interval`, as long as it refreshes the
/// interval's byte totals afterwards.
pub trait Heuristic: std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn schedule(
        &mut self,
        interval: &mut Interval,
        queued_od: &mut VecDeque<TransferRef>,
        queued_be: &mut VecDeque<TransferRef>,
        capacity: Capacity,
    ) -> Result<()>;
}

/// Which heuristic to run, as written in the experiment configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args")]
pub enum HeuristicKind {
    Baseline,
    FcfsThrottle {
        /// the rate BE transfers are clamped to under contention, bytes/s
        #[serde(default = "default_floor")]
        floor: f64,
    },
}

fn default_floor() -> f64 {
    FcfsThrottle::DEFAULT_FLOOR
}

impl Default for HeuristicKind {
    fn default() -> Self {
        HeuristicKind::Baseline
    }
}

impl HeuristicKind {
    pub fn build(&self) -> Box<dyn Heuristic> {
        match *self {
            HeuristicKind::Baseline => Box::new(Baseline),
            HeuristicKind::FcfsThrottle { floor } => Box::new(FcfsThrottle::new(floor)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HeuristicKind::Baseline => Baseline::NAME,
            HeuristicKind::FcfsThrottle { .. } => FcfsThrottle::NAME,
        }
    }
}

/// Start `transfer` at the beginning of `interval` at its requested rate and make it active.
fn admit(interval: &mut Interval, transfer: TransferRef) -> Result<()> {
    transfer.borrow_mut().start(interval.start(), None)?;
    debug!(
        "{}: admit {} {}",
        interval.start(),
        transfer.borrow().class(),
        transfer.borrow().id()
    );
    interval.add_transfer(transfer);
    Ok(())
}

/// Admit BE transfers in arrival order while the link stays below the threshold.
fn admit_best_effort(
    interval: &mut Interval,
    queued_be: &mut VecDeque<TransferRef>,
    capacity: Capacity,
) -> Result<()> {
    while !queued_be.is_empty() && capacity.has_headroom(interval.network_load()) {
        if let Some(t) = queued_be.pop_front() {
            admit(interval, t)?;
        }
    }
    Ok(())
}

/// OD transfers are admitted unconditionally, BE transfers only on spare capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Baseline;

impl Baseline {
    pub const NAME: &'static str = "baseline";
}

impl Heuristic for Baseline {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schedule(
        &mut self,
        interval: &mut Interval,
        queued_od: &mut VecDeque<TransferRef>,
        queued_be: &mut VecDeque<TransferRef>,
        capacity: Capacity,
    ) -> Result<()> {
        while let Some(t) = queued_od.pop_front() {
            admit(interval, t)?;
        }
        admit_best_effort(interval, queued_be, capacity)
    }
}

/// First-come-first-served with BE throttling.
///
/// When admitting an OD transfer would push the link over the threshold, every active BE
/// transfer drops to `floor`. Throttled BE transfers get back whatever headroom is left, up to
/// their requested rate, before new BE transfers are considered.
#[derive(Debug, Clone, Copy)]
pub struct FcfsThrottle {
    floor: f64,
}

impl Default for FcfsThrottle {
    fn default() -> Self {
        FcfsThrottle::new(Self::DEFAULT_FLOOR)
    }
}

impl FcfsThrottle {
    pub const NAME: &'static str = "fcfs";
    pub const DEFAULT_FLOOR: f64 = 100.0;

    pub fn new(floor: f64) -> Self {
        assert!(floor > 0.0, "throttling floor must be positive: {}", floor);
        FcfsThrottle { floor }
    }

    #[inline]
    pub fn floor(&self) -> f64 {
        self.floor
    }

    fn throttle(&self, interval: &mut Interval) -> Result<()> {
        let now = interval.start();
        for t in interval.be_transfers() {
            let mut t = t.borrow_mut();
            // transfers already at or below the floor keep their rate
            if t.current_rate().map_or(false, |r| r > self.floor) {
                t.update_rate(self.floor, now)?;
            }
        }
        interval.update_be_load();
        debug!(
            "{}: throttled {} BE transfers to {} bytes/s",
            now,
            interval.be_transfers().len(),
            self.floor
        );
        Ok(())
    }

    fn restore(&self, interval: &mut Interval, capacity: Capacity) -> Result<()> {
        let now = interval.start();
        let running: Vec<TransferRef> = interval.be_transfers().to_vec();
        for t in running {
            let headroom = capacity.headroom(interval.network_load());
            let (current, requested) = {
                let t = t.borrow();
                (t.current_rate().unwrap_or(0.0), t.requested_rate())
            };
            if headroom > 0.0 && current < requested {
                let rate = (current + headroom).min(requested);
                t.borrow_mut().update_rate(rate, now)?;
                interval.update_be_load();
            }
        }
        Ok(())
    }
}

impl Heuristic for FcfsThrottle {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schedule(
        &mut self,
        interval: &mut Interval,
        queued_od: &mut VecDeque<TransferRef>,
        queued_be: &mut VecDeque<TransferRef>,
        capacity: Capacity,
    ) -> Result<()> {
        let mut throttled = false;
        while let Some(t) = queued_od.pop_front() {
            if !throttled {
                // average rate this transfer adds to the interval once started at its beginning
                let added = {
                    let t = t.borrow();
                    let active = t.requested_duration().min(interval.length());
                    t.requested_rate() * active.to_secs() / interval.length().to_secs()
                };
                if capacity.exceeded_by(interval.network_load() + added) {
                    throttled = true;
                    self.throttle(interval)?;
                }
            }
            admit(interval, t)?;
        }

        self.restore(interval, capacity)?;
        admit_best_effort(interval, queued_be, capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{Transfer, TransferClass, TransferId};
    use crate::{Duration, Timestamp};
    use chrono::NaiveDate;
    use std::rc::Rc;

    fn t0() -> Timestamp {
        NaiveDate::from_ymd(2013, 5, 3).and_hms(8, 0, 0)
    }

    fn transfer(id: u64, class: TransferClass, rate: u64, secs: i64) -> TransferRef {
        Transfer::new(
            TransferId(id),
            "10.0.0.1",
            class,
            t0() - Duration::seconds(1),
            Duration::seconds(secs),
            rate * secs as u64,
        )
        .into_ref()
    }

    fn queue(ts: &[TransferRef]) -> VecDeque<TransferRef> {
        ts.iter().cloned().collect()
    }

    #[test]
    fn baseline_admits_all_od_regardless_of_capacity() {
        let mut interval = Interval::new(t0(), Duration::seconds(60));
        let od: Vec<_> = (0..3)
            .map(|i| transfer(i, TransferClass::OnDemand, 10, 60))
            .collect();
        let mut queued_od = queue(&od);
        let mut queued_be = VecDeque::new();
        Baseline
            .schedule(
                &mut interval,
                &mut queued_od,
                &mut queued_be,
                Capacity::Limited(5.0),
            )
            .unwrap();
        assert!(queued_od.is_empty());
        assert_eq!(interval.od_transfers().len(), 3);
        assert_eq!(interval.network_load(), 30.0);
    }

    #[test]
    fn baseline_stops_at_first_be_over_threshold() {
        let mut interval = Interval::new(t0(), Duration::seconds(60));
        let be: Vec<_> = (0..3)
            .map(|i| transfer(i, TransferClass::BestEffort, 4, 60))
            .collect();
        let mut queued_od = VecDeque::new();
        let mut queued_be = queue(&be);
        Baseline
            .schedule(
                &mut interval,
                &mut queued_od,
                &mut queued_be,
                Capacity::Limited(10.0),
            )
            .unwrap();
        // 0 < 9.5 admit, 4 < 9.5 admit, 8 < 9.5 admit; all three fit the check
        assert_eq!(interval.be_transfers().len(), 3);

        let mut interval = Interval::new(t0(), Duration::seconds(60));
        let be: Vec<_> = (10..13)
            .map(|i| transfer(i, TransferClass::BestEffort, 5, 60))
            .collect();
        let mut queued_be = queue(&be);
        Baseline
            .schedule(
                &mut interval,
                &mut VecDeque::new(),
                &mut queued_be,
                Capacity::Limited(10.0),
            )
            .unwrap();
        // 0 < 9.5 admit, 5 < 9.5 admit, 10 >= 9.5 stop
        assert_eq!(interval.be_transfers().len(), 2);
        assert_eq!(queued_be.len(), 1);
        assert!(Rc::ptr_eq(&queued_be[0], &be[2]));
        assert!(!be[2].borrow().is_started());
    }

    #[test]
    fn fcfs_throttles_then_restores() {
        let mut interval = Interval::new(t0(), Duration::seconds(60));
        let be: Vec<_> = (0..2)
            .map(|i| transfer(i, TransferClass::BestEffort, 5, 600))
            .collect();
        for t in &be {
            admit(&mut interval, Rc::clone(t)).unwrap();
        }
        assert_eq!(interval.network_load(), 10.0);

        let od = transfer(9, TransferClass::OnDemand, 8, 60);
        let mut fcfs = FcfsThrottle::new(1.0);
        fcfs.schedule(
            &mut interval,
            &mut queue(&[Rc::clone(&od)]),
            &mut VecDeque::new(),
            Capacity::Limited(10.0),
        )
        .unwrap();
        // 8 + 1 + 1 = 10 > 9.5, no headroom to give back
        for t in &be {
            assert_eq!(t.borrow().current_rate(), Some(1.0));
        }
        assert_eq!(interval.network_load(), 10.0);

        // the OD transfer is gone in the next interval
        let mut next = Interval::new(t0() + Duration::seconds(60), Duration::seconds(60));
        for t in &be {
            t.borrow_mut().consume(&interval);
            next.add_transfer(Rc::clone(t));
        }
        fcfs.schedule(
            &mut next,
            &mut VecDeque::new(),
            &mut VecDeque::new(),
            Capacity::Limited(10.0),
        )
        .unwrap();
        let first = be[0].borrow().current_rate().unwrap();
        let second = be[1].borrow().current_rate().unwrap();
        assert!((first - 5.0).abs() < 1e-9);
        assert!((second - 4.5).abs() < 1e-9);
        assert!(second < be[1].borrow().requested_rate());
    }

    #[test]
    fn fcfs_leaves_rates_at_or_below_floor_alone() {
        let mut interval = Interval::new(t0(), Duration::seconds(60));
        let empty = transfer(0, TransferClass::BestEffort, 0, 600);
        let slow = Transfer::new(
            TransferId(1),
            "10.0.0.1",
            TransferClass::BestEffort,
            t0() - Duration::seconds(1),
            Duration::seconds(120),
            60,
        )
        .into_ref();
        let fast = transfer(2, TransferClass::BestEffort, 5, 600);
        for t in &[&empty, &slow, &fast] {
            admit(&mut interval, Rc::clone(t)).unwrap();
        }

        let od = transfer(9, TransferClass::OnDemand, 8, 60);
        FcfsThrottle::new(1.0)
            .schedule(
                &mut interval,
                &mut queue(&[od]),
                &mut VecDeque::new(),
                Capacity::Limited(10.0),
            )
            .unwrap();
        assert_eq!(empty.borrow().current_rate(), Some(0.0));
        assert_eq!(slow.borrow().current_rate(), Some(0.5));
        let fast = fast.borrow();
        assert!(fast.current_rate().unwrap() < fast.requested_rate());
        assert_eq!(interval.od_transfers().len(), 1);
    }

    #[test]
    fn fcfs_without_contention_behaves_like_baseline() {
        let mut interval = Interval::new(t0(), Duration::seconds(60));
        let be = transfer(0, TransferClass::BestEffort, 2, 600);
        admit(&mut interval, Rc::clone(&be)).unwrap();
        let od = transfer(1, TransferClass::OnDemand, 3, 60);
        FcfsThrottle::default()
            .schedule(
                &mut interval,
                &mut queue(&[od]),
                &mut VecDeque::new(),
                Capacity::Limited(100.0),
            )
            .unwrap();
        assert_eq!(be.borrow().current_rate(), Some(2.0));
        assert_eq!(interval.network_load(), 5.0);
    }

    #[test]
    fn kind_builds_named_heuristics() {
        assert_eq!(HeuristicKind::Baseline.build().name(), "baseline");
        let kind: HeuristicKind =
            toml::from_str::<std::collections::HashMap<String, HeuristicKind>>(
                "h = { type = \"FcfsThrottle\", args = { floor = 1.0 } }",
            )
            .unwrap()
            .remove("h")
            .unwrap();
        assert_eq!(kind, HeuristicKind::FcfsThrottle { floor: 1.0 });
        assert_eq!(kind.build().name(), "fcfs");
    }
}
