//! Binning of message timestamps into the calendar histograms behind each chart.
//!
//! Everything here is a pure function of a [`TimeTable`]. Rates are messages
//! per day, normalized by the number of calendar days the history spans;
//! with no messages that span is zero and every rate is reported as 0.0.

use chrono::{TimeZone, Timelike};

use crate::timestamps::TimeTable;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Offset from local midnight that closes the last day of the history.
const LAST_DAY_CLOSE: i64 = 86_359;

pub const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Message counts per calendar day, from the first message's day to the last.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyHistory {
    pub start: i64,
    pub end: i64,
    pub counts: Vec<u32>,
}

impl DailyHistory {
    /// Returns `None` when there are no timestamps.
    pub fn from_times<Tz: TimeZone>(times: &[i64], tz: &Tz) -> Option<Self> {
        let first = *times.iter().min()?;
        let last = *times.iter().max()?;

        let start = local_midnight(first, tz);
        let end = local_midnight(last, tz) + LAST_DAY_CLOSE;
        let ndays = ((end - start) as f64 / SECONDS_PER_DAY as f64).ceil().max(1.0) as usize;
        let width = (end - start) as f64 / ndays as f64;

        let mut counts = vec![0u32; ndays];
        for &t in times {
            // the closing edge is inclusive, and the final seconds of the last day clamp into it
            let idx = ((t - start) as f64 / width).floor() as usize;
            counts[idx.min(ndays - 1)] += 1;
        }

        Some(Self { start, end, counts })
    }

    pub fn ndays(&self) -> usize {
        self.counts.len()
    }

    fn bin_width(&self) -> f64 {
        (self.end - self.start) as f64 / self.ndays() as f64
    }

    /// Unix time at the middle of each bin.
    pub fn centers(&self) -> Vec<f64> {
        let width = self.bin_width();
        (0..self.ndays())
            .map(|i| self.start as f64 + (i as f64 + 0.5) * width)
            .collect()
    }

    /// `(center, mean)` points of a `window`-day running mean, or `None` when
    /// the history is not longer than the window.
    pub fn running_average(&self, window: usize) -> Option<Vec<(f64, f64)>> {
        if window == 0 || self.ndays() <= window {
            return None;
        }
        let means = running_mean(&self.counts, window);
        let centers = self.centers();
        Some(centers[window - 1..].iter().copied().zip(means).collect())
    }
}

/// Mean over each full window of `n` consecutive values; `len - n + 1` results.
pub fn running_mean(values: &[u32], n: usize) -> Vec<f64> {
    if n == 0 || n > values.len() {
        return Vec::new();
    }
    let mut cumulative = Vec::with_capacity(values.len() + 1);
    cumulative.push(0u64);
    for &v in values {
        let last = cumulative[cumulative.len() - 1];
        cumulative.push(last + v as u64);
    }
    (n..cumulative.len())
        .map(|i| (cumulative[i] - cumulative[i - n]) as f64 / n as f64)
        .collect()
}

fn local_midnight<Tz: TimeZone>(t: i64, tz: &Tz) -> i64 {
    let Some(local) = tz.timestamp_opt(t, 0).single() else {
        return t - t.rem_euclid(SECONDS_PER_DAY);
    };
    local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
        .map(|midnight| midnight.timestamp())
        // midnight skipped by a DST change
        .unwrap_or_else(|| t - local.num_seconds_from_midnight() as i64)
}

/// Scale counts to messages per day. `period` is how many bins one pass over
/// the cycle covers (7 for weekdays, 52 for weeks, ...).
pub fn per_day(counts: &[u32], ndays: usize, period: f64) -> Vec<f64> {
    if ndays == 0 || period <= 0.0 {
        return vec![0.0; counts.len()];
    }
    let days_per_bin = ndays as f64 / period;
    counts.iter().map(|&c| c as f64 / days_per_bin).collect()
}

/// Move Sunday from the end of a Monday-first week to the front.
pub fn rotate_sunday_first<T: Copy>(bins: [T; 7]) -> [T; 7] {
    let mut rotated = bins;
    rotated.rotate_right(1);
    rotated
}

pub fn hour_histogram(table: &TimeTable) -> [u32; 24] {
    let mut bins = [0u32; 24];
    for &h in &table.hour {
        if let Some(bin) = bins.get_mut(h as usize) {
            *bin += 1;
        }
    }
    bins
}

/// Counts per weekday, Sunday first.
pub fn weekday_histogram(table: &TimeTable) -> [u32; 7] {
    let mut bins = [0u32; 7];
    for &d in &table.day {
        if let Some(bin) = bins.get_mut(d as usize) {
            *bin += 1;
        }
    }
    rotate_sunday_first(bins)
}

pub fn date_histogram(table: &TimeTable) -> [u32; 31] {
    let mut bins = [0u32; 31];
    for &d in &table.date {
        if let Some(bin) = d.checked_sub(1).and_then(|i| bins.get_mut(i as usize)) {
            *bin += 1;
        }
    }
    bins
}

/// 52 weeks of `doy / 7`; days past the 52nd week land in the last bin.
pub fn week_histogram(table: &TimeTable) -> [u32; 52] {
    let mut bins = [0u32; 52];
    for &doy in &table.doy {
        let week = (doy as f64 / 7.0).min(52.0);
        let idx = (week.floor() as usize).min(51);
        bins[idx] += 1;
    }
    bins
}

pub fn month_histogram(table: &TimeTable) -> [u32; 12] {
    let mut bins = [0u32; 12];
    for &m in &table.month {
        if let Some(bin) = m.checked_sub(1).and_then(|i| bins.get_mut(i as usize)) {
            *bin += 1;
        }
    }
    bins
}

/// Approximate week at which each month starts, for labelling the week chart.
pub fn month_start_weeks() -> [f64; 12] {
    let mut weeks = [0.0; 12];
    let mut day = 0u32;
    for (i, days) in DAYS_IN_MONTH.iter().enumerate() {
        weeks[i] = day as f64 / 7.0;
        day += days;
    }
    weeks
}

/// Message counts per (hour, weekday) cell, weekdays Sunday first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Punchcard {
    pub counts: [[u32; 7]; 24],
}

/// Marker area given to the busiest cell.
pub const PUNCHCARD_MAX_AREA: f64 = 200.0;

impl Punchcard {
    pub fn from_table(table: &TimeTable) -> Self {
        let mut counts = [[0u32; 7]; 24];
        for (&h, &d) in table.hour.iter().zip(&table.day) {
            if let Some(cell) = counts
                .get_mut(h as usize)
                .and_then(|row| row.get_mut(d as usize))
            {
                *cell += 1;
            }
        }
        for row in counts.iter_mut() {
            *row = rotate_sunday_first(*row);
        }
        Self { counts }
    }

    pub fn max(&self) -> u32 {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }

    /// Area per message, so the busiest cell gets [`PUNCHCARD_MAX_AREA`].
    pub fn scale(&self) -> f64 {
        match self.max() {
            0 => 0.0,
            max => PUNCHCARD_MAX_AREA / max as f64,
        }
    }

    /// `(hour, weekday, count)` for every cell, weekday 0 = Sunday.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, u32)> + '_ {
        self.counts.iter().enumerate().flat_map(|(hour, row)| {
            row.iter().enumerate().map(move |(day, &count)| (hour, day, count))
        })
    }
}

/// All the binned series the charts need.
#[derive(Debug, Clone)]
pub struct Summary {
    pub history: Option<DailyHistory>,
    pub ndays: usize,
    pub hourly: Vec<f64>,
    pub weekday: Vec<f64>,
    pub by_date: Vec<f64>,
    pub weekly: Vec<f64>,
    pub monthly: Vec<f64>,
    pub punchcard: Punchcard,
}

impl Summary {
    pub fn new<Tz: TimeZone>(table: &TimeTable, tz: &Tz) -> Self {
        let history = DailyHistory::from_times(&table.unix_time, tz);
        let ndays = history.as_ref().map_or(0, DailyHistory::ndays);

        Self {
            hourly: per_day(&hour_histogram(table), ndays, 1.0),
            weekday: per_day(&weekday_histogram(table), ndays, 7.0),
            by_date: per_day(&date_histogram(table), ndays, 30.0),
            weekly: per_day(&week_histogram(table), ndays, 52.0),
            monthly: per_day(&month_histogram(table), ndays, 12.0),
            punchcard: Punchcard::from_table(table),
            history,
            ndays,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ndays == 0
    }
}
