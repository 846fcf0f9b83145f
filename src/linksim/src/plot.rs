use anyhow::{anyhow, Result};
use gnuplot::{AutoOption::Fix, AxesCommon, Caption, Color, Figure, LineWidth};

use crate::series::LoadSeries;
use crate::{ToSecs, BYTES_PER_MIB};

const COLORS: &[&str] = &["cornflowerblue", "red", "forest-green", "orange", "purple"];

/// x: hours since midnight of the first interval's day, y: load in MiB/s.
fn to_xy(series: &LoadSeries) -> (Vec<f64>, Vec<f64>) {
    let origin = match series.points().first() {
        Some(p) => p.start.date().and_hms(0, 0, 0),
        None => return (Vec::new(), Vec::new()),
    };
    series
        .points()
        .iter()
        .map(|p| {
            (
                (p.start - origin).to_secs() / 3600.,
                p.load / BYTES_PER_MIB,
            )
        })
        .unzip()
}

pub fn figure(title: &str, series: &[(String, LoadSeries)]) -> Figure {
    let mut fg = Figure::new();
    {
        let ax = fg.axes2d();
        ax.set_title(title, &[])
            .set_x_label("Time of Day (hours)", &[])
            .set_y_label("Network Demand (MiB/s)", &[])
            .set_x_range(Fix(-1.), Fix(25.));

        for (i, (label, s)) in series.iter().enumerate() {
            let (x, y) = to_xy(s);
            let caption = if series.len() > 1 { label.as_str() } else { "" };
            ax.lines(
                &x,
                &y,
                &[
                    Caption(caption),
                    Color(COLORS[i % COLORS.len()]),
                    LineWidth(0.5),
                ],
            );
        }
    }
    fg
}

/// Render every series as one line and save a PNG at `path`, creating its directory.
pub fn plot_intervals<P: AsRef<std::path::Path>>(
    path: P,
    title: &str,
    series: &[(String, LoadSeries)],
) -> Result<()> {
    let path = path.as_ref();
    utils::fs::ensure_parent_dir(path)?;
    log::info!("Saving plot to {:?}", path);
    let mut fg = figure(title, series);
    fg.save_to_png(path, 2000, 1500)
        .map_err(|e| anyhow!("fail to save plot {:?}: {:?}", path, e))
}
