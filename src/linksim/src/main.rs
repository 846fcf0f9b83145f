use anyhow::{Context, Result};
use structopt::StructOpt;

use linksim::argument::Opt;
use linksim::config::{read_config, ExperimentConfig};
use linksim::experiment::run_experiment;
use linksim::xferlog::{self, XferLog};

fn main() -> Result<()> {
    logging::init_log();

    let opt = Opt::from_args();
    log::info!("Opts: {:#?}", opt);

    let mut config = if let Some(path) = &opt.config {
        log::info!("parsing experiment configuration from file: {:?}", path);
        read_config(path)?
    } else {
        ExperimentConfig::default()
    };
    if opt.no_plot {
        config.plot = false;
    }
    log::info!("config: {:#?}", config);

    if let Some(nthreads) = opt.parallel {
        log::info!("using {} threads", nthreads);
        rayon::ThreadPoolBuilder::new()
            .num_threads(nthreads)
            .build_global()
            .context("fail to build the thread pool")?;
    }

    let log = XferLog::from_path(&opt.log)?;
    let transfers = xferlog::transfers_on_day(&log.transfers, opt.date);
    log::info!(
        "{} of {} transfers touch {}",
        transfers.len(),
        log.transfers.len(),
        opt.date
    );

    // create the output directory and start a fresh result file
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("fail to create directory {:?}", config.directory))?;
    let file = config.directory.join("result.txt");
    if file.exists() {
        std::fs::remove_file(&file)?;
    }
    std::fs::write(&file, format!("{:#?}\n", config))?;

    let outcomes = run_experiment(&transfers, opt.date, &opt.log_name(), &config)?;
    log::info!("finished {} runs", outcomes.len());

    Ok(())
}
