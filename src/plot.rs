//! PNG rendering of the binned series in a [`Summary`].

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::TimeZone;
use plotters::prelude::*;

use crate::stats::{self, DailyHistory, Punchcard, Summary, DAY_NAMES, MONTH_NAMES};

pub const HISTORY_FILE: &str = "history.png";
pub const HOURLY_FILE: &str = "hourly.png";
pub const WEEKDAY_FILE: &str = "daily.png";
pub const BY_DATE_FILE: &str = "by-date.png";
pub const WEEKLY_FILE: &str = "weekly.png";
pub const MONTHLY_FILE: &str = "monthly.png";
pub const PUNCHCARD_FILE: &str = "punchcard.png";

const HISTORY_SIZE: (u32, u32) = (2000, 400);
const CHART_SIZE: (u32, u32) = (800, 600);

const BAR_FILL: RGBColor = RGBColor(160, 160, 160);
const LABEL_FONT: (&str, f64) = ("sans-serif", 15.0);

/// Pixels per typographic point at the 100 dpi the sizes above assume.
const PX_PER_PT: f64 = 100.0 / 72.0;

/// Draw every chart into `out_dir` and return the files written.
///
/// Nothing is drawn for an empty summary.
pub fn render_all<Tz>(summary: &Summary, tz: &Tz, out_dir: &Path) -> Result<Vec<PathBuf>>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let Some(history) = summary.history.as_ref() else {
        log::warn!("No messages, no charts drawn");
        return Ok(Vec::new());
    };

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

    let mut written = Vec::new();
    let mut target = |name: &str| {
        let path = out_dir.join(name);
        written.push(path.clone());
        path
    };

    draw_history(history, tz, &target(HISTORY_FILE))?;

    let hour_label = |i: usize| i.to_string();
    draw_bars(
        &Bars {
            values: &summary.hourly,
            x_desc: "Hour",
            y_desc: "Emails / day / hour",
            bar_width: 0.8,
            x_labels: 24,
            label: &hour_label,
            markers: &[],
        },
        &target(HOURLY_FILE),
    )?;

    let day_label = |i: usize| DAY_NAMES.get(i).copied().unwrap_or_default().to_string();
    draw_bars(
        &Bars {
            values: &summary.weekday,
            x_desc: "",
            y_desc: "Emails / day",
            bar_width: 0.8,
            x_labels: 7,
            label: &day_label,
            markers: &[],
        },
        &target(WEEKDAY_FILE),
    )?;

    let date_label = |i: usize| (i + 1).to_string();
    draw_bars(
        &Bars {
            values: &summary.by_date,
            x_desc: "Date of Month",
            y_desc: "Emails / day",
            bar_width: 0.8,
            x_labels: 31,
            label: &date_label,
            markers: &[],
        },
        &target(BY_DATE_FILE),
    )?;

    let month_markers: Vec<(f64, &str)> = stats::month_start_weeks()
        .iter()
        .copied()
        .zip(MONTH_NAMES)
        .collect();
    let week_label = |i: usize| i.to_string();
    draw_bars(
        &Bars {
            values: &summary.weekly,
            x_desc: "Week of the year",
            y_desc: "Emails / day",
            bar_width: 0.7,
            x_labels: 11,
            label: &week_label,
            markers: &month_markers,
        },
        &target(WEEKLY_FILE),
    )?;

    let month_label = |i: usize| MONTH_NAMES.get(i).copied().unwrap_or_default().to_string();
    draw_bars(
        &Bars {
            values: &summary.monthly,
            x_desc: "Month",
            y_desc: "Emails / day",
            bar_width: 0.8,
            x_labels: 12,
            label: &month_label,
            markers: &[],
        },
        &target(MONTHLY_FILE),
    )?;

    draw_punchcard(&summary.punchcard, &target(PUNCHCARD_FILE))?;

    for path in &written {
        log::info!("Wrote {}", path.display());
    }
    Ok(written)
}

fn format_day<Tz>(secs: f64, tz: &Tz, long_span: bool) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let format = if long_span { "%b %Y" } else { "%d %b" };
    tz.timestamp_opt(secs as i64, 0)
        .single()
        .map(|dt| dt.format(format).to_string())
        .unwrap_or_default()
}

fn draw_history<Tz>(history: &DailyHistory, tz: &Tz, path: &Path) -> Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let root = BitMapBackend::new(path, HISTORY_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let peak = history.counts.iter().copied().max().unwrap_or(0).max(1) as f64;
    let long_span = history.ndays() > 90;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(history.start as f64..history.end as f64, 0f64..peak * 1.05)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(12)
        .x_label_formatter(&|x| format_day(*x, tz, long_span))
        .x_desc("Time")
        .y_desc("Emails / day")
        .label_style(LABEL_FONT)
        .draw()?;

    let daily = history
        .centers()
        .into_iter()
        .zip(history.counts.iter().map(|&c| c as f64));
    chart
        .draw_series(LineSeries::new(daily, BLACK.stroke_width(1)))?
        .label("daily")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));

    for (window, color, name) in [(7, BLUE, "7-day"), (30, RED, "30-day")] {
        if let Some(points) = history.running_average(window) {
            chart
                .draw_series(LineSeries::new(points, color.stroke_width(3)))?
                .label(name)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(3)));
        }
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(LABEL_FONT)
        .draw()?;

    root.present()?;
    Ok(())
}

/// One histogram drawn as bars centred on integer positions.
struct Bars<'a> {
    values: &'a [f64],
    x_desc: &'a str,
    y_desc: &'a str,
    bar_width: f64,
    x_labels: usize,
    label: &'a dyn Fn(usize) -> String,
    /// `(bin position, text)` annotations along the top edge.
    markers: &'a [(f64, &'a str)],
}

impl Bars<'_> {
    fn tick_label(&self, x: f64) -> String {
        bin_index(x, self.values.len())
            .map(|i| (self.label)(i))
            .unwrap_or_default()
    }
}

/// The bin a tick at `x` sits on, if it sits exactly on one of `len` bins.
fn bin_index(x: f64, len: usize) -> Option<usize> {
    let nearest = x.round();
    if (x - nearest).abs() > 1e-6 || nearest < 0.0 || nearest as usize >= len {
        return None;
    }
    Some(nearest as usize)
}

fn hour_tick(x: f64) -> String {
    bin_index(x, 24).map(|h| h.to_string()).unwrap_or_default()
}

fn draw_bars(bars: &Bars, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let n = bars.values.len() as f64;
    let peak = bars.values.iter().copied().fold(0.0, f64::max);
    let top = if peak > 0.0 { peak * 1.1 } else { 1.0 };

    let mut chart = ChartBuilder::on(&root)
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..n - 0.5, 0f64..top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(bars.x_labels)
        .x_label_formatter(&|x| bars.tick_label(*x))
        .x_desc(bars.x_desc)
        .y_desc(bars.y_desc)
        .label_style(LABEL_FONT)
        .draw()?;

    let half = bars.bar_width / 2.0;
    let rect = |i: usize, v: f64| [(i as f64 - half, 0.0), (i as f64 + half, v)];

    chart.draw_series(
        bars.values
            .iter()
            .enumerate()
            .map(|(i, &v)| Rectangle::new(rect(i, v), BAR_FILL.filled())),
    )?;
    chart.draw_series(
        bars.values
            .iter()
            .enumerate()
            .map(|(i, &v)| Rectangle::new(rect(i, v), BLACK.stroke_width(1))),
    )?;

    // bin i spans [i - 0.5, i + 0.5) on this axis
    chart.draw_series(bars.markers.iter().map(|&(pos, _)| {
        PathElement::new(vec![(pos - 0.5, 0.0), (pos - 0.5, top)], BLACK.mix(0.2))
    }))?;
    chart.draw_series(
        bars.markers
            .iter()
            .map(|&(pos, text)| Text::new(text.to_string(), (pos - 0.3, top * 0.98), LABEL_FONT)),
    )?;

    root.present()?;
    Ok(())
}

/// Pixel radius of a punchcard marker whose area is `count * scale` square points.
pub fn marker_radius(count: u32, scale: f64) -> i32 {
    let area = count as f64 * scale;
    if area <= 0.0 {
        return 0;
    }
    ((area / std::f64::consts::PI).sqrt() * PX_PER_PT).round().max(1.0) as i32
}

fn draw_punchcard(punchcard: &Punchcard, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    // Sunday on the top row
    let row = |day: usize| 6.0 - day as f64;

    let mut chart = ChartBuilder::on(&root)
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..23.5, -0.5f64..6.5)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(24)
        .y_labels(7)
        .x_label_formatter(&|x| hour_tick(*x))
        .y_label_formatter(&|y| {
            let day = 6.0 - y.round();
            if (0.0..7.0).contains(&day) {
                DAY_NAMES[day as usize].to_string()
            } else {
                String::new()
            }
        })
        .x_desc("Hour")
        .label_style(LABEL_FONT)
        .draw()?;

    // typical working day, Monday to Friday 09:00-17:00
    chart.draw_series(std::iter::once(Rectangle::new(
        [(8.5, row(5) - 0.5), (17.5, row(1) + 0.5)],
        CYAN.mix(0.3).filled(),
    )))?;

    let scale = punchcard.scale();
    chart.draw_series(
        punchcard
            .cells()
            .filter(|&(_, _, count)| count > 0)
            .map(|(hour, day, count)| {
                Circle::new((hour as f64, row(day)), marker_radius(count, scale), BLACK.filled())
            }),
    )?;

    root.present()?;
    Ok(())
}
