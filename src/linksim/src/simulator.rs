use std::collections::VecDeque;
use std::rc::Rc;

use chrono::NaiveDate;
use log::{debug, info, trace};

use crate::heuristic::{Baseline, Heuristic};
use crate::sequence::IntervalSeq;
use crate::transfer::{Transfer, TransferClass, TransferRef};
use crate::{Capacity, Duration, Error, Result, Timestamp};

/// The interval-stepping driver.
///
/// A simulator takes exclusive ownership of the transfers it is given; running the same logical
/// transfer set again requires a fresh copy.
#[derive(Debug)]
pub struct Simulator {
    interval_length: Duration,
    day: NaiveDate,
    capacity: Capacity,
    heuristic: Box<dyn Heuristic>,
    /// every transfer of the last run, OD before BE, each in arrival order
    transfers: Vec<TransferRef>,
}

#[derive(Debug, Default)]
pub struct SimulatorBuilder {
    interval_length: Option<Duration>,
    day: Option<NaiveDate>,
    capacity: Capacity,
    heuristic: Option<Box<dyn Heuristic>>,
}

impl SimulatorBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn interval_length(&mut self, length: Duration) -> &mut Self {
        self.interval_length = Some(length);
        self
    }

    /// The calendar day whose intervals are reported.
    pub fn day(&mut self, day: NaiveDate) -> &mut Self {
        self.day = Some(day);
        self
    }

    pub fn capacity(&mut self, capacity: Capacity) -> &mut Self {
        self.capacity = capacity;
        self
    }

    pub fn heuristic(&mut self, heuristic: Box<dyn Heuristic>) -> &mut Self {
        self.heuristic = Some(heuristic);
        self
    }

    pub fn build(&mut self) -> Result<Simulator> {
        let interval_length = self
            .interval_length
            .ok_or(Error::Incomplete("interval_length"))?;
        if interval_length <= Duration::zero() {
            return Err(Error::Incomplete("interval_length must be positive"));
        }
        let day = self.day.ok_or(Error::Incomplete("day"))?;
        let heuristic = self
            .heuristic
            .take()
            .unwrap_or_else(|| Box::new(Baseline));
        Ok(Simulator {
            interval_length,
            day,
            capacity: self.capacity,
            heuristic,
            transfers: Vec::new(),
        })
    }
}

/// Transfers not yet arrived, sorted by requested start; ties keep input order.
fn arrival_queue(transfers: Vec<Transfer>) -> VecDeque<TransferRef> {
    let mut transfers = transfers;
    transfers.sort_by_key(|t| t.requested_start());
    transfers.into_iter().map(Transfer::into_ref).collect()
}

/// Move every transfer that arrived before `now` to the ready queue.
fn dequeue_arrived(
    unqueued: &mut VecDeque<TransferRef>,
    queued: &mut VecDeque<TransferRef>,
    now: Timestamp,
) {
    while let Some(t) = unqueued.front() {
        if t.borrow().requested_start() >= now {
            break;
        }
        if let Some(t) = unqueued.pop_front() {
            queued.push_back(t);
        }
    }
}

impl Simulator {
    #[inline]
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    #[inline]
    pub fn heuristic_name(&self) -> &'static str {
        self.heuristic.name()
    }

    /// The transfers of the last run with their final simulated state.
    #[inline]
    pub fn transfers(&self) -> &[TransferRef] {
        &self.transfers
    }

    /// Simulate `transfers` until every one of them has finished and return the intervals of the
    /// configured day.
    pub fn run(&mut self, transfers: Vec<Transfer>) -> Result<IntervalSeq> {
        let start = std::time::Instant::now();
        let (od, be): (Vec<Transfer>, Vec<Transfer>) = transfers
            .into_iter()
            .partition(|t| t.class() == TransferClass::OnDemand);
        let (num_od, num_be) = (od.len(), be.len());

        let mut intervals = IntervalSeq::build_for(&od, &be, self.day, self.interval_length);

        let mut unqueued_od = arrival_queue(od);
        let mut unqueued_be = arrival_queue(be);
        self.transfers = unqueued_od
            .iter()
            .chain(unqueued_be.iter())
            .map(Rc::clone)
            .collect();
        let mut queued_od = VecDeque::new();
        let mut queued_be = VecDeque::new();

        let mut current: Option<usize> = None;
        let mut carried = Vec::new();

        // iterate until all of the transfers have been completely simulated
        while !unqueued_od.is_empty()
            || !unqueued_be.is_empty()
            || !queued_od.is_empty()
            || !queued_be.is_empty()
            || current.map_or(false, |i| !intervals[i].is_idle())
        {
            let idx = current.map_or(0, |i| i + 1);
            if idx >= intervals.len() {
                intervals.extend();
            }
            let now = intervals[idx].start();

            // carry forward the transfers still running
            if let Some(prev) = current {
                carried.clear();
                for t in intervals[prev].transfers() {
                    let running = t.borrow().end_time().map_or(false, |end| end > now);
                    if running {
                        carried.push(Rc::clone(t));
                    } else {
                        t.borrow_mut().finish();
                    }
                }
                for t in carried.drain(..) {
                    intervals[idx].add_transfer(t);
                }
            }

            dequeue_arrived(&mut unqueued_od, &mut queued_od, now);
            dequeue_arrived(&mut unqueued_be, &mut queued_be, now);

            let interval = &mut intervals[idx];
            self.heuristic
                .schedule(interval, &mut queued_od, &mut queued_be, self.capacity)?;

            if interval.is_idle() && !(queued_od.is_empty() && queued_be.is_empty()) {
                return Err(Error::Stalled {
                    at: now,
                    queued_od: queued_od.len(),
                    queued_be: queued_be.len(),
                });
            }

            for t in interval.transfers() {
                t.borrow_mut().consume(interval);
            }

            interval.recompute();
            trace!(
                "{}: load {:.3} bytes/s, {} OD, {} BE active, {} OD {} BE queued",
                now,
                interval.network_load(),
                interval.od_transfers().len(),
                interval.be_transfers().len(),
                queued_od.len(),
                queued_be.len()
            );

            current = Some(idx);
        }

        debug!(
            "simulated {} intervals in {:?}",
            current.map_or(0, |i| i + 1),
            start.elapsed()
        );

        intervals.trim_to_day(self.day);

        info!(
            "{} heuristic, capacity {}: {} OD + {} BE transfers over {} intervals on {}",
            self.heuristic.name(),
            self.capacity,
            num_od,
            num_be,
            intervals.len(),
            self.day
        );

        Ok(intervals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;
    use crate::transfer::{TransferId, TransferStatus};

    /// never admits anything
    #[derive(Debug)]
    struct Idle;

    impl Heuristic for Idle {
        fn name(&self) -> &'static str {
            "idle"
        }

        fn schedule(
            &mut self,
            _interval: &mut Interval,
            _queued_od: &mut VecDeque<TransferRef>,
            _queued_be: &mut VecDeque<TransferRef>,
            _capacity: Capacity,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd(2013, 5, 3)
    }

    fn transfer(id: u64, class: TransferClass, start: Timestamp, secs: i64) -> Transfer {
        Transfer::new(
            TransferId(id),
            "10.0.0.1",
            class,
            start,
            Duration::seconds(secs),
            secs as u64 * 10,
        )
    }

    #[test]
    fn build_requires_settings() {
        assert!(matches!(
            SimulatorBuilder::new().day(day()).build(),
            Err(Error::Incomplete(_))
        ));
        assert!(matches!(
            SimulatorBuilder::new()
                .interval_length(Duration::seconds(60))
                .build(),
            Err(Error::Incomplete(_))
        ));
    }

    #[test]
    fn empty_run_yields_the_day() {
        let mut sim = SimulatorBuilder::new()
            .interval_length(Duration::minutes(10))
            .day(day())
            .build()
            .unwrap();
        let intervals = sim.run(Vec::new()).unwrap();
        assert_eq!(intervals.len(), 144);
        assert!(intervals.iter().all(|i| i.bytes() == 0.0));
    }

    #[test]
    fn stalled_heuristic_fails_loudly() {
        let mut sim = SimulatorBuilder::new()
            .interval_length(Duration::minutes(1))
            .day(day())
            .heuristic(Box::new(Idle))
            .build()
            .unwrap();
        let t = transfer(0, TransferClass::OnDemand, day().and_hms(1, 0, 0), 60);
        match sim.run(vec![t]) {
            Err(Error::Stalled { queued_od, .. }) => assert_eq!(queued_od, 1),
            other => panic!("expected a stall, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn arrival_order_is_stable() {
        let at = day().and_hms(1, 0, 0);
        let q = arrival_queue(vec![
            transfer(2, TransferClass::OnDemand, at, 60),
            transfer(0, TransferClass::OnDemand, at - Duration::seconds(5), 60),
            transfer(1, TransferClass::OnDemand, at, 60),
        ]);
        let ids: Vec<u64> = q.iter().map(|t| t.borrow().id().0).collect();
        assert_eq!(ids, vec![0, 2, 1]);
    }

    #[test]
    fn transfers_complete_explicitly() {
        let mut sim = SimulatorBuilder::new()
            .interval_length(Duration::minutes(1))
            .day(day())
            .build()
            .unwrap();
        let ts = vec![
            transfer(0, TransferClass::OnDemand, day().and_hms(3, 0, 30), 90),
            transfer(1, TransferClass::BestEffort, day().and_hms(3, 0, 0), 45),
        ];
        sim.run(ts).unwrap();
        for t in sim.transfers() {
            let t = t.borrow();
            assert_eq!(t.status(), TransferStatus::Complete);
            assert!(t.bytes_remaining().abs() < 1e-6);
            assert_eq!(t.completed_at(), t.end_time());
        }
    }
}
