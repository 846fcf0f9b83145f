use std::io::Write;

use anyhow::{Context, Result};

use crate::interval::Interval;
use crate::{Duration, Timestamp, ToSecs};

/// The numbers of one finished interval.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPoint {
    pub start: Timestamp,
    pub od_bytes: f64,
    pub be_bytes: f64,
    pub num_od: usize,
    pub num_be: usize,
    /// bytes/s
    pub load: f64,
}

impl From<&Interval> for LoadPoint {
    fn from(interval: &Interval) -> Self {
        LoadPoint {
            start: interval.start(),
            od_bytes: interval.od_bytes(),
            be_bytes: interval.be_bytes(),
            num_od: interval.od_transfers().len(),
            num_be: interval.be_transfers().len(),
            load: interval.network_load(),
        }
    }
}

/// A finished interval sequence reduced to plain numbers.
#[derive(Debug, Clone)]
pub struct LoadSeries {
    length: Duration,
    points: Vec<LoadPoint>,
}

impl LoadSeries {
    pub fn new(length: Duration, points: Vec<LoadPoint>) -> Self {
        LoadSeries { length, points }
    }

    #[inline]
    pub fn interval_length(&self) -> Duration {
        self.length
    }

    #[inline]
    pub fn points(&self) -> &[LoadPoint] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn loads(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.load).collect()
    }

    pub fn write_csv<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        utils::fs::ensure_parent_dir(path)?;
        let f = std::fs::File::create(path)
            .with_context(|| format!("fail to create {:?}", path))?;
        let mut f = std::io::BufWriter::new(f);
        writeln!(f, "{}", Interval::log_header())?;
        for p in &self.points {
            writeln!(
                f,
                "{}, {}, {}, {}, {}, {}",
                p.start,
                p.start + self.length,
                self.length.to_secs(),
                p.od_bytes + p.be_bytes,
                p.num_od,
                p.num_be
            )?;
        }
        f.flush()?;
        Ok(())
    }
}
