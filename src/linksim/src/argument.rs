use chrono::NaiveDate;
use structopt::StructOpt;

fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
}

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "linksim",
    about = "Simulate OD/BE transfer scheduling on a shared link",
    after_help = "Example: linksim xfer_data_logs/128.142.18.166.xfer 2013-05-03"
)]
pub struct Opt {
    /// The transfer log file
    #[structopt(parse(from_os_str))]
    pub log: std::path::PathBuf,

    /// The day to simulate, YYYY-MM-DD
    #[structopt(parse(try_from_str = parse_date))]
    pub date: NaiveDate,

    /// The configure file
    #[structopt(short = "c", long = "config")]
    pub config: Option<std::path::PathBuf>,

    /// Run the sweep in parallel, default using the hardware concurrency
    #[structopt(short = "P", long = "parallel", name = "nthreads")]
    pub parallel: Option<usize>,

    /// Do not render figures
    #[structopt(long = "no-plot")]
    pub no_plot: bool,
}

impl Opt {
    /// The log file name without its directories, used to name outputs.
    pub fn log_name(&self) -> String {
        self.log
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.log.to_string_lossy().into_owned())
    }
}
