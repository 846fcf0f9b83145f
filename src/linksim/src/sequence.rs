use chrono::NaiveDate;
use log::debug;

use crate::interval::Interval;
use crate::series::{LoadPoint, LoadSeries};
use crate::transfer::Transfer;
use crate::{Duration, Timestamp};

#[inline]
fn midnight(day: NaiveDate) -> Timestamp {
    day.and_hms(0, 0, 0)
}

/// Contiguous, same-length intervals over a span that grows forward on demand.
#[derive(Debug, Clone)]
pub struct IntervalSeq {
    intervals: Vec<Interval>,
    length: Duration,
}

impl IntervalSeq {
    /// Intervals covering `[start, end)`, the last one may reach past `end`.
    pub fn new(start: Timestamp, end: Timestamp, length: Duration) -> Self {
        assert!(length > Duration::zero(), "interval length must be positive");
        let mut intervals = Vec::new();
        let mut cur = start;
        while cur < end {
            intervals.push(Interval::new(cur, length));
            cur = cur + length;
        }
        IntervalSeq { intervals, length }
    }

    /// The smallest span, aligned on `day`'s midnight in steps of `length`, that covers the
    /// calendar day and the requested window of every given transfer.
    pub fn build_for(od: &[Transfer], be: &[Transfer], day: NaiveDate, length: Duration) -> Self {
        assert!(length > Duration::zero(), "interval length must be positive");
        let mut start = midnight(day);
        let mut end = start + Duration::days(1);

        let all = || od.iter().chain(be.iter());
        if let Some(first) = all().map(|t| t.requested_start()).min() {
            while first < start {
                start = start - length;
            }
        }
        if let Some(last) = all().map(|t| t.requested_end()).max() {
            while last > end {
                end = end + length;
            }
        }

        debug!("building intervals over {} - {}", start, end);
        Self::new(start, end, length)
    }

    /// Append one interval right after the last one.
    pub fn extend(&mut self) {
        let start = match self.intervals.last() {
            Some(last) => last.end(),
            None => panic!("cannot extend an empty interval sequence"),
        };
        self.intervals.push(Interval::new(start, self.length));
    }

    /// Keep only the intervals that start within `[day, day + 24h)`.
    pub fn trim_to_day(&mut self, day: NaiveDate) {
        let from = midnight(day);
        let to = from + Duration::days(1);
        self.intervals
            .retain(|interval| interval.start() >= from && interval.start() < to);
    }

    #[inline]
    pub fn interval_length(&self) -> Duration {
        self.length
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Interval> {
        self.intervals.get(index)
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    #[inline]
    pub fn first(&self) -> Option<&Interval> {
        self.intervals.first()
    }

    #[inline]
    pub fn last(&self) -> Option<&Interval> {
        self.intervals.last()
    }

    /// Per-interval loads, bytes/s.
    pub fn loads(&self) -> Vec<f64> {
        self.intervals.iter().map(|i| i.network_load()).collect()
    }

    /// Detach the numbers from the transfers so they can leave the simulating thread.
    pub fn to_series(&self) -> LoadSeries {
        LoadSeries::new(
            self.length,
            self.intervals.iter().map(LoadPoint::from).collect(),
        )
    }
}

impl std::ops::Index<usize> for IntervalSeq {
    type Output = Interval;
    fn index(&self, index: usize) -> &Self::Output {
        &self.intervals[index]
    }
}

impl std::ops::IndexMut<usize> for IntervalSeq {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.intervals[index]
    }
}

impl<'a> IntoIterator for &'a IntervalSeq {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
