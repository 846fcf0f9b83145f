use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::heuristic::HeuristicKind;
use crate::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExperimentConfig {
    /// Length of a simulation interval in seconds
    pub interval_secs: u64,

    /// Fractions of the transfers that are turned into OD transfers, one run each
    pub od_percentages: Vec<f64>,

    /// Admission heuristic
    pub heuristic: HeuristicKind,

    /// Link capacity as a multiple of the mean load of the all-OD run
    pub capacity_factor: f64,

    /// Seed of the random OD/BE split
    pub seed: u64,

    /// Output path of the figures and the result file
    pub directory: std::path::PathBuf,

    /// Whether to render figures
    pub plot: bool,

    /// Whether to dump the interval table of every run as csv
    pub csv: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            interval_secs: 60,
            od_percentages: vec![0.1, 0.3, 0.5, 0.7, 0.9],
            heuristic: HeuristicKind::default(),
            capacity_factor: 2.0,
            seed: 0,
            directory: "plots-xfer_data_logs".into(),
            plot: true,
            csv: false,
        }
    }
}

impl ExperimentConfig {
    #[inline]
    pub fn interval_length(&self) -> Duration {
        Duration::seconds(self.interval_secs as i64)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.interval_secs > 0, "interval_secs must be positive");
        anyhow::ensure!(
            self.capacity_factor > 0.0,
            "capacity_factor must be positive"
        );
        for &p in &self.od_percentages {
            anyhow::ensure!(
                (0.0..=1.0).contains(&p),
                "OD percentage {} is not within [0, 1]",
                p
            );
        }
        if let HeuristicKind::FcfsThrottle { floor } = self.heuristic {
            anyhow::ensure!(floor > 0.0, "throttling floor must be positive");
        }
        Ok(())
    }
}

pub fn read_config<P: AsRef<std::path::Path>>(path: P) -> Result<ExperimentConfig> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).with_context(|| format!("fail to open {:?}", path))?;
    let config: ExperimentConfig =
        toml::from_str(&content).with_context(|| format!("fail to parse {:?}", path))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: ExperimentConfig = toml::from_str("seed = 7\nod_percentages = [0.5]").unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.od_percentages, vec![0.5]);
        assert_eq!(config.interval_length(), Duration::minutes(1));
        assert_eq!(config.heuristic, HeuristicKind::Baseline);
        config.validate().unwrap();
    }

    #[test]
    fn heuristic_table() {
        let config: ExperimentConfig = toml::from_str(
            "[heuristic]\ntype = \"FcfsThrottle\"\nargs = { floor = 50.0 }\n",
        )
        .unwrap();
        assert_eq!(config.heuristic, HeuristicKind::FcfsThrottle { floor: 50.0 });
    }

    #[test]
    fn rejects_bad_values() {
        assert!(toml::from_str::<ExperimentConfig>("unknown = 1").is_err());
        let config: ExperimentConfig = toml::from_str("od_percentages = [1.5]").unwrap();
        assert!(config.validate().is_err());
    }
}
