//! The OD-percentage sweep: one all-OD reference run, then one run per OD/BE split with the link
//! capacity derived from the reference load.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;

use crate::config::ExperimentConfig;
use crate::series::LoadSeries;
use crate::simulator::SimulatorBuilder;
use crate::stats::Statistics;
use crate::transfer::{Transfer, TransferClass};
use crate::{plot, Capacity};

/// The result of one simulation run of the sweep.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub label: String,
    /// `None` for the all-OD reference run
    pub od_fraction: Option<f64>,
    pub num_od: usize,
    pub num_be: usize,
    pub capacity: Capacity,
    pub stats: Option<Statistics>,
    pub series: LoadSeries,
}

/// An owned copy of `transfers` with every transfer reclassified as `class`.
pub fn snapshot_as(transfers: &[Transfer], class: TransferClass) -> Vec<Transfer> {
    let mut snapshot = transfers.to_vec();
    snapshot.iter_mut().for_each(|t| t.set_class(class));
    snapshot
}

/// An owned copy of `transfers`, randomly split so that round(n * od_fraction) of them are OD
/// and the rest BE.
pub fn snapshot_split(transfers: &[Transfer], od_fraction: f64, seed: u64) -> Vec<Transfer> {
    let mut snapshot = transfers.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    snapshot.shuffle(&mut rng);

    let num_od = (snapshot.len() as f64 * od_fraction).round() as usize;
    for (i, t) in snapshot.iter_mut().enumerate() {
        t.set_class(if i < num_od {
            TransferClass::OnDemand
        } else {
            TransferClass::BestEffort
        });
    }
    snapshot
}

fn simulate(
    label: String,
    od_fraction: Option<f64>,
    transfers: Vec<Transfer>,
    day: NaiveDate,
    capacity: Capacity,
    config: &ExperimentConfig,
) -> Result<SweepOutcome> {
    let num_od = transfers
        .iter()
        .filter(|t| t.class() == TransferClass::OnDemand)
        .count();
    let num_be = transfers.len() - num_od;

    let mut simulator = SimulatorBuilder::new()
        .interval_length(config.interval_length())
        .day(day)
        .capacity(capacity)
        .heuristic(config.heuristic.build())
        .build()?;
    let intervals = simulator
        .run(transfers)
        .with_context(|| format!("simulation '{}' failed", label))?;

    Ok(SweepOutcome {
        label,
        od_fraction,
        num_od,
        num_be,
        capacity,
        stats: Statistics::from_intervals(&intervals),
        series: intervals.to_series(),
    })
}

/// Every transfer as OD on an unconstrained link.
pub fn run_reference(
    transfers: &[Transfer],
    day: NaiveDate,
    config: &ExperimentConfig,
) -> Result<SweepOutcome> {
    let snapshot = snapshot_as(transfers, TransferClass::OnDemand);
    simulate(
        "Original".to_owned(),
        None,
        snapshot,
        day,
        Capacity::Unconstrained,
        config,
    )
}

/// One run per configured OD percentage, in parallel. Outcomes keep the configured order.
pub fn run_sweep(
    transfers: &[Transfer],
    day: NaiveDate,
    config: &ExperimentConfig,
    capacity: Capacity,
) -> Result<Vec<SweepOutcome>> {
    config
        .od_percentages
        .par_iter()
        .enumerate()
        .map(|(i, &od_fraction)| {
            let snapshot = snapshot_split(transfers, od_fraction, config.seed + i as u64);
            simulate(
                format!("{}% OD", od_fraction * 100.),
                Some(od_fraction),
                snapshot,
                day,
                capacity,
                config,
            )
        })
        .collect()
}

fn report(name: &str, day: NaiveDate, config: &ExperimentConfig, outcome: &SweepOutcome) -> Result<()> {
    let header = match outcome.od_fraction {
        Some(p) => format!("OD percentage: {} - ", p),
        None => "Original ".to_owned(),
    };
    let summary = match &outcome.stats {
        Some(stats) => format!("{}", stats),
        None => "no intervals".to_owned(),
    };
    println!(
        "\n{}Interval Statistics for {} - {} OD + {} BE Transfers on {}, capacity {}\n{}",
        header, name, outcome.num_od, outcome.num_be, day, outcome.capacity, summary
    );

    let line = format!(
        "{} {} {} {:?} od={} be={} capacity={} {}",
        name,
        day,
        config.heuristic.name(),
        outcome.label,
        outcome.num_od,
        outcome.num_be,
        outcome.capacity,
        summary
    );
    utils::fs::append_to_file(config.directory.join("result.txt"), &line)
}

fn output_path(
    name: &str,
    day: NaiveDate,
    num_transfers: usize,
    config: &ExperimentConfig,
    outcome: &SweepOutcome,
    ext: &str,
) -> PathBuf {
    let heuristic = config.heuristic.name();
    match outcome.od_fraction {
        Some(p) => config.directory.join(heuristic).join(format!(
            "{}_{}_{}-transfers_{:.2}-OD_{}.{}",
            name, day, num_transfers, p, heuristic, ext
        )),
        None => config.directory.join(format!(
            "{}_{}_{}-transfers_original_{}.{}",
            name, day, num_transfers, heuristic, ext
        )),
    }
}

/// Run the reference and the sweep over `transfers`, report every run, and write figures and
/// tables under the configured directory.
pub fn run_experiment(
    transfers: &[Transfer],
    day: NaiveDate,
    name: &str,
    config: &ExperimentConfig,
) -> Result<Vec<SweepOutcome>> {
    info!(
        "{}: simulating {} transfers on {} with the {} heuristic",
        name,
        transfers.len(),
        day,
        config.heuristic.name()
    );

    let reference = run_reference(transfers, day, config)?;
    let mean = reference.stats.map_or(0.0, |s| s.mean);
    let capacity = Capacity::from_bytes_per_sec(mean * config.capacity_factor);
    info!("link capacity for the sweep: {}", capacity);

    let sweep = run_sweep(transfers, day, config, capacity)?;

    let title = format!(
        "{} - {} Heuristic on {} - {} Transfers",
        name,
        config.heuristic.name(),
        day,
        transfers.len()
    );
    let mut outcomes = Vec::with_capacity(sweep.len() + 1);
    outcomes.push(reference);
    outcomes.extend(sweep);

    for outcome in &outcomes {
        report(name, day, config, outcome)?;

        if config.csv {
            let path = output_path(name, day, transfers.len(), config, outcome, "csv");
            outcome.series.write_csv(&path)?;
        }

        if config.plot {
            let mut series = vec![(outcomes[0].label.clone(), outcomes[0].series.clone())];
            if outcome.od_fraction.is_some() {
                series.push((outcome.label.clone(), outcome.series.clone()));
            }
            let path = output_path(name, day, transfers.len(), config, outcome, "png");
            if let Err(e) = plot::plot_intervals(&path, &title, &series) {
                warn!("{}", e);
            }
        }
    }

    Ok(outcomes)
}
