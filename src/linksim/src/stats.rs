use crate::sequence::IntervalSeq;
use crate::series::LoadSeries;
use crate::BYTES_PER_MIB;

/// Summary of per-interval loads, all in bytes/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub mean: f64,
    /// population standard deviation
    pub std: f64,
    pub median: f64,
}

impl Statistics {
    /// `None` for an empty input.
    pub fn from_loads(loads: &[f64]) -> Option<Self> {
        if loads.is_empty() {
            return None;
        }
        let n = loads.len() as f64;
        let mean = loads.iter().sum::<f64>() / n;
        let var = loads.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;

        let mut sorted = loads.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Statistics {
            mean,
            std: var.sqrt(),
            median,
        })
    }

    pub fn from_intervals(intervals: &IntervalSeq) -> Option<Self> {
        Self::from_loads(&intervals.loads())
    }

    pub fn from_series(series: &LoadSeries) -> Option<Self> {
        Self::from_loads(&series.loads())
    }
}

impl std::fmt::Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mean: {:.6} MiB/s, median: {:.6} MiB/s, std: {:.6} MiB/s",
            self.mean / BYTES_PER_MIB,
            self.median / BYTES_PER_MIB,
            self.std / BYTES_PER_MIB
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_statistics() {
        assert_eq!(Statistics::from_loads(&[]), None);
    }

    #[test]
    fn odd_and_even_counts() {
        let s = Statistics::from_loads(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.mean, 5.0);
        assert_eq!(s.std, 2.0);
        assert_eq!(s.median, 4.5);

        let s = Statistics::from_loads(&[3.0, 1.0, 2.0]).unwrap();
        assert_eq!(s.median, 2.0);
        assert_eq!(s.mean, 2.0);
    }
}
