use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// Message timestamps with their calendar fields precomputed.
///
/// The columns are parallel: index `i` in every vector describes the same
/// message. `day` counts from Monday = 0, `doy` from 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeTable {
    pub unix_time: Vec<i64>,
    pub hour: Vec<u32>,
    pub day: Vec<u32>,
    pub date: Vec<u32>,
    pub month: Vec<u32>,
    pub doy: Vec<u32>,
}

impl TimeTable {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            unix_time: Vec::with_capacity(n),
            hour: Vec::with_capacity(n),
            day: Vec::with_capacity(n),
            date: Vec::with_capacity(n),
            month: Vec::with_capacity(n),
            doy: Vec::with_capacity(n),
        }
    }

    /// Decompose each instant into calendar fields as seen in `tz`.
    pub fn from_instants<Tz: TimeZone>(times: &[i64], tz: &Tz) -> Self {
        let mut table = Self::with_capacity(times.len());
        for &t in times {
            match tz.timestamp_opt(t, 0).single() {
                Some(local) => table.push(t, &local),
                None => log::warn!("Timestamp {} is out of range, skipping", t),
            }
        }
        table
    }

    /// Parse raw `Date` header values. Values that cannot be parsed are logged
    /// and left out.
    pub fn from_date_strings<S: AsRef<str>, Tz: TimeZone>(dates: &[S], tz: &Tz) -> Self {
        let mut times = Vec::with_capacity(dates.len());
        let mut skipped = 0usize;
        for raw in dates {
            match parse_date(raw.as_ref()) {
                Some(t) => times.push(t),
                None => {
                    skipped += 1;
                    log::warn!("Could not parse date header: {:?}", raw.as_ref());
                }
            }
        }
        if skipped > 0 {
            log::info!("Skipped {} of {} unparseable dates", skipped, dates.len());
        }
        Self::from_instants(&times, tz)
    }

    fn push<Tz: TimeZone>(&mut self, unix_time: i64, local: &DateTime<Tz>) {
        self.unix_time.push(unix_time);
        self.hour.push(local.hour());
        self.day.push(local.weekday().num_days_from_monday());
        self.date.push(local.day());
        self.month.push(local.month());
        self.doy.push(local.ordinal());
    }

    pub fn len(&self) -> usize {
        self.unix_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unix_time.is_empty()
    }

    /// True when every column has the same length.
    pub fn is_consistent(&self) -> bool {
        let n = self.unix_time.len();
        [&self.hour, &self.day, &self.date, &self.month, &self.doy]
            .iter()
            .all(|column| column.len() == n)
    }
}

/// Parse an RFC 2822 date into a unix timestamp.
///
/// Tries chrono first, then again with a trailing `(comment)` removed, then
/// mail-parser's more forgiving parser. The fallback only counts when its
/// fields form a real calendar date and clock time no earlier than 1970.
pub fn parse_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.timestamp());
    }

    let stripped = strip_trailing_comment(raw);
    if stripped != raw {
        if let Ok(dt) = DateTime::parse_from_rfc2822(stripped) {
            return Some(dt.timestamp());
        }
    }

    let header = format!("Date: {}\r\n\r\n", raw);
    let parsed = mail_parser::Message::parse(header.as_bytes())?;
    let date = parsed.date()?;
    if !is_plausible(date) {
        log::debug!("Rejecting lenient parse of {:?}: {:?}", raw, date);
        return None;
    }
    Some(date.to_timestamp())
}

fn is_plausible(date: &mail_parser::DateTime) -> bool {
    date.year >= 1970
        && NaiveDate::from_ymd_opt(date.year as i32, date.month as u32, date.day as u32).is_some()
        && NaiveTime::from_hms_opt(date.hour as u32, date.minute as u32, date.second as u32).is_some()
        && date.tz_hour <= 14
        && date.tz_minute < 60
}

fn strip_trailing_comment(raw: &str) -> &str {
    if raw.ends_with(')') {
        if let Some(open) = raw.rfind('(') {
            return raw[..open].trim_end();
        }
    }
    raw
}

/// Pull the `Date` field out of a fetched header block.
///
/// Field names match case-insensitively and folded continuation lines are
/// joined with a single space.
pub fn date_from_header(header: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(header);
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("date") {
            continue;
        }

        let mut value = value.trim().to_string();
        while let Some(next) = lines.peek() {
            if next.starts_with(' ') || next.starts_with('\t') {
                value.push(' ');
                value.push_str(next.trim());
                lines.next();
            } else {
                break;
            }
        }
        return if value.is_empty() { None } else { Some(value) };
    }

    None
}
