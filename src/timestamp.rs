//! Heuristic timestamp resolution.
//!
//! Instrument schemas rarely declare a proper time column; instead the units
//! strings of time-looking variables double as miniature date-format
//! templates ("epoch seconds", "MM/dd/yyyy", "yyyyDDD", ...). The resolver
//! scans a decoded record for such variables and accumulates calendar fields
//! until it can produce an absolute instant.
//!
//! The letter-scanning step is deliberately literal: for each format code
//! present in the units string, the value substring at the same character
//! offsets is parsed as that field. Units with repeated disjoint runs of one
//! letter are ambiguous by construction and resolve by first/last index.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use regex::Regex;
use tracing::debug;

use crate::record::{DecodedRecord, Value};
use crate::schema::Variable;

// Units that are a whole date or time template get parsed in one shot. The
// pattern alternatives allow any repeat count so "M/d/yy" and "MM/dd/yyyy"
// both qualify even when the value's fields are not zero-padded.
static DATE_MDY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^M+[/|-]d+[/|-]y+$").expect("static pattern"));
static DATE_DMY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^d+[/|-]M+[/|-]y+$").expect("static pattern"));
static TIME_HMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(hh|KK|HH):mm:ss$").expect("static pattern"));

const LONG_MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];
const SHORT_MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const LONG_WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];
const SHORT_WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Resolves record timestamps from time-indicating variables.
///
/// Construction fixes the base instant used for calendar fields the record
/// does not supply; [TimeResolver::new] uses the wall clock, matching the
/// historical behavior, and [TimeResolver::with_base] pins it for tests.
#[derive(Debug, Clone)]
pub struct TimeResolver {
    base: DateTime<Utc>,
}

impl TimeResolver {
    #[must_use]
    pub fn new() -> Self {
        TimeResolver { base: Utc::now() }
    }

    #[must_use]
    pub fn with_base(base: DateTime<Utc>) -> Self {
        TimeResolver { base }
    }

    /// Resolve an absolute timestamp from the record, if it carries one.
    ///
    /// Candidate variables have format `"datetime"` (case-insensitive) or a
    /// name containing `time` or `Time`. An absolute epoch value returns
    /// immediately; otherwise calendar fields accumulate across candidates
    /// and a timestamp is built only when at least one strong signal was
    /// captured: an absolute epoch, or a day-of-month, day-of-week,
    /// day-of-year, or day-of-week-in-month. Hours and minutes alone never
    /// resolve; callers fall back to synthetic ordering.
    #[must_use]
    pub fn resolve(&self, record: &DecodedRecord) -> Option<DateTime<Utc>> {
        let mut fields = Fields::default();

        for (variable, value) in record.iter() {
            if !is_candidate(variable) {
                continue;
            }
            let Some(value) = value else { continue };
            if let Some(instant) = scan_variable(variable, value, &mut fields) {
                return Some(instant);
            }
        }

        if fields.found && fields.has_strong_signal() {
            fields.build(self.base)
        } else {
            None
        }
    }
}

impl Default for TimeResolver {
    fn default() -> Self {
        TimeResolver::new()
    }
}

fn is_candidate(variable: &Variable) -> bool {
    variable.format.eq_ignore_ascii_case("datetime")
        || variable.name.contains("Time")
        || variable.name.contains("time")
}

/// An hour field, carried unresolved because the am/pm marker may arrive
/// from a different variable.
#[derive(Debug, Clone, Copy)]
enum Hour {
    /// 0-23 clock (possibly above 23 from minute-of-day conversion).
    Day(i64),
    /// 1-12 clock, combined with the am/pm marker when building.
    HalfDay(i64),
}

/// Calendar accumulator.
///
/// The `raw_*` fields keep the parsed value even when it failed the range
/// guard, because the resolution gate checks the raw value; the guarded
/// fields are what actually enters the built date.
#[derive(Debug, Default)]
struct Fields {
    found: bool,
    epoch_millis: Option<i64>,
    era_bc: Option<bool>,
    year: Option<i32>,
    month: Option<u32>,
    week_in_year: Option<u32>,
    week_in_month: Option<u32>,
    day_in_year: Option<u32>,
    day_in_month: Option<u32>,
    day_of_week_in_month: Option<u32>,
    /// 1 = Sunday .. 7 = Saturday.
    day_in_week: Option<u32>,
    pm: Option<bool>,
    hour: Option<Hour>,
    minute: Option<u32>,
    second: Option<u32>,
    millisecond: Option<u32>,
    tz_offset_minutes: Option<i32>,
    raw_day_in_year: Option<i64>,
    raw_day_in_month: Option<i64>,
    raw_day_of_week_in_month: Option<i64>,
}

impl Fields {
    fn has_strong_signal(&self) -> bool {
        self.epoch_millis.is_some_and(|v| v >= 0)
            || self.raw_day_in_month.is_some_and(|v| v >= 0)
            || self.day_in_week.is_some()
            || self.raw_day_in_year.is_some_and(|v| v > 0)
            || self.raw_day_of_week_in_month.is_some_and(|v| v > 0)
    }

    /// Combine the accumulated fields over a base instant.
    ///
    /// Fields the record did not supply come from the base; a calendar
    /// combination that does not exist (e.g. February 30th) yields `None`
    /// rather than rolling over.
    fn build(&self, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let base = match self.epoch_millis {
            Some(ms) => Utc.timestamp_millis_opt(ms).single()?,
            None => base,
        };

        let mut year = self.year.unwrap_or_else(|| base.year());
        if self.era_bc == Some(true) && year > 0 {
            year = 1 - year;
        }
        let month = self.month.map(|m| m + 1);

        let date = if let Some(day) = self.day_in_month {
            NaiveDate::from_ymd_opt(year, month.unwrap_or_else(|| base.month()), day)?
        } else if let Some(ordinal) = self.day_in_year {
            NaiveDate::from_yo_opt(year, ordinal)?
        } else if let (Some(nth), Some(dow)) = (self.day_of_week_in_month, self.day_in_week) {
            nth_weekday_of_month(year, month.unwrap_or_else(|| base.month()), nth, dow)?
        } else if let Some(dow) = self.day_in_week {
            let anchor = if let Some(week) = self.week_in_year {
                NaiveDate::from_ymd_opt(year, 1, 1)? + Duration::weeks(i64::from(week) - 1)
            } else if let (Some(week), Some(m)) = (self.week_in_month, month) {
                NaiveDate::from_ymd_opt(year, m, 1)? + Duration::weeks(i64::from(week) - 1)
            } else {
                base.date_naive().with_year(year)?
            };
            // move within the Sunday-started week holding the anchor
            let back = i64::from(anchor.weekday().num_days_from_sunday());
            anchor - Duration::days(back) + Duration::days(i64::from(dow) - 1)
        } else {
            NaiveDate::from_ymd_opt(year, month.unwrap_or_else(|| base.month()), base.day())?
        };

        let (hour, carry_days) = match self.hour {
            Some(Hour::Day(h)) => (u32::try_from(h % 24).ok()?, h / 24),
            Some(Hour::HalfDay(h)) => {
                let pm = self.pm.unwrap_or(base.hour() >= 12);
                let h = u32::try_from(h % 12).ok()?;
                (if pm { h + 12 } else { h }, 0)
            }
            None => (base.hour(), 0),
        };
        let time = NaiveTime::from_hms_milli_opt(
            hour,
            self.minute.unwrap_or_else(|| base.minute()),
            self.second.unwrap_or_else(|| base.second()),
            self.millisecond
                .unwrap_or_else(|| base.timestamp_subsec_millis()),
        )?;

        let naive = date.and_time(time) + Duration::days(carry_days)
            - Duration::minutes(i64::from(self.tz_offset_minutes.unwrap_or(0)));
        Some(Utc.from_utc_datetime(&naive))
    }
}

fn nth_weekday_of_month(year: i32, month: u32, nth: u32, dow: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = (7 + dow - 1 - first.weekday().num_days_from_sunday()) % 7;
    let date = first + Duration::days(i64::from(offset) + 7 * (i64::from(nth) - 1));
    (date.month() == month).then_some(date)
}

/// Inspect one candidate variable and fold its fields into the accumulator.
/// Returns `Some` only for the absolute-epoch units, which short-circuit.
fn scan_variable(
    variable: &Variable,
    value: &Value,
    fields: &mut Fields,
) -> Option<DateTime<Utc>> {
    let units = variable.units.as_str();
    let text = value.as_text();

    if units.eq_ignore_ascii_case("epoch seconds")
        || units.eq_ignore_ascii_case("seconds since 1970-01-01 00:00:00")
    {
        let millis = match (value.as_f64(), text) {
            (Some(v), _) if value.is_number() => Some((v * 1000.0) as i64),
            (_, Some(t)) => t.trim().parse::<i64>().ok().map(|s| s * 1000),
            _ => None,
        };
        match millis {
            Some(ms) if ms >= 0 => return Utc.timestamp_millis_opt(ms).single(),
            _ => debug!(variable = %variable.name, %value, "unparsable epoch seconds"),
        }
    } else if units.eq_ignore_ascii_case("epoch milliseconds") {
        let millis = match (value.as_f64(), text) {
            (Some(v), _) if value.is_number() => Some(v as i64),
            (_, Some(t)) => t.trim().parse::<i64>().ok(),
            _ => None,
        };
        match millis {
            Some(ms) if ms >= 0 => return Utc.timestamp_millis_opt(ms).single(),
            _ => debug!(variable = %variable.name, %value, "unparsable epoch milliseconds"),
        }
    } else if !value.is_number()
        && (DATE_MDY.is_match(units) || DATE_DMY.is_match(units) || TIME_HMS.is_match(units))
    {
        if let Some(t) = text {
            let fmt = template_to_strftime(units);
            let parsed = if units.contains('y') {
                NaiveDate::parse_from_str(t.trim(), &fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            } else {
                NaiveTime::parse_from_str(t.trim(), &fmt)
                    .ok()
                    .and_then(|tm| Some(NaiveDate::from_ymd_opt(1970, 1, 1)?.and_time(tm)))
            };
            if let Some(dt) = parsed {
                fields.epoch_millis = Some(dt.and_utc().timestamp_millis());
                fields.found = true;
            } else {
                debug!(variable = %variable.name, units, %value, "value does not match units template");
            }
        }
    } else if units.eq_ignore_ascii_case("minuteOfDay") {
        let minute_of_day = match (value.as_f64(), text) {
            (Some(v), _) if value.is_number() => Some(v as i64),
            (_, Some(t)) => t.trim().parse::<i64>().ok(),
            _ => None,
        };
        if let Some(v) = minute_of_day {
            if v >= 0 {
                fields.hour = Some(Hour::Day(v / 60));
                fields.minute = u32::try_from(v % 60).ok();
                fields.found = true;
            }
        }
    } else if !value.is_number() {
        if let Some(data) = text {
            scan_letters(units, data, fields);
        }
    }
    None
}

/// Step through the format codes of the units string, slicing the value at
/// each code's first/last character offsets.
fn scan_letters(units: &str, data: &str, fields: &mut Fields) {
    if let Some(era) = slice_field(units, data, 'G') {
        if era.eq_ignore_ascii_case("bc") {
            fields.era_bc = Some(true);
            fields.found = true;
        } else if era.eq_ignore_ascii_case("ad") {
            fields.era_bc = Some(false);
            fields.found = true;
        }
    }

    if let Some(year) = slice_num(units, data, 'y') {
        if year >= 0 {
            let year = if year < 70 {
                year + 2000
            } else if year < 1970 {
                year + 1900
            } else {
                year
            };
            fields.year = i32::try_from(year).ok();
            fields.found = true;
        }
    }

    if let Some(token) = slice_field(units, data, 'M') {
        let month0 = if token.len() > 2 {
            month_from_name(token)
        } else {
            token.parse::<i64>().ok().and_then(|m| u32::try_from(m - 1).ok())
        };
        if let Some(m) = month0 {
            fields.month = Some(m);
            fields.found = true;
        }
    }

    if let Some(week) = slice_num(units, data, 'w') {
        if (1..=53).contains(&week) {
            fields.week_in_year = u32::try_from(week).ok();
            fields.found = true;
        }
    }
    if let Some(week) = slice_num(units, data, 'W') {
        if (1..=5).contains(&week) {
            fields.week_in_month = u32::try_from(week).ok();
            fields.found = true;
        }
    }

    if let Some(day) = slice_num(units, data, 'D') {
        fields.raw_day_in_year = Some(day);
        if (1..=366).contains(&day) {
            fields.day_in_year = u32::try_from(day).ok();
            fields.found = true;
        }
    }
    if let Some(day) = slice_num(units, data, 'd') {
        fields.raw_day_in_month = Some(day);
        if day > 0 && day < 35 {
            fields.day_in_month = u32::try_from(day).ok();
            fields.found = true;
        }
    }
    if let Some(nth) = slice_num(units, data, 'F') {
        fields.raw_day_of_week_in_month = Some(nth);
        if nth > 0 {
            fields.day_of_week_in_month = u32::try_from(nth).ok();
            fields.found = true;
        }
    }
    if let Some(name) = slice_field(units, data, 'E') {
        if let Some(dow) = weekday_from_name(name) {
            fields.day_in_week = Some(dow);
            fields.found = true;
        }
    }

    if let Some(marker) = slice_field(units, data, 'a') {
        if marker.eq_ignore_ascii_case("am") {
            fields.pm = Some(false);
            fields.found = true;
        } else if marker.eq_ignore_ascii_case("pm") {
            fields.pm = Some(true);
            fields.found = true;
        }
    }

    // later hour codes win when a units string carries more than one
    if let Some(hour) = slice_num(units, data, 'H') {
        if (0..=23).contains(&hour) {
            fields.hour = Some(Hour::Day(hour));
            fields.found = true;
        }
    }
    if let Some(hour) = slice_num(units, data, 'k') {
        if (1..=24).contains(&hour) {
            fields.hour = Some(Hour::Day(hour - 1));
            fields.found = true;
        }
    }
    if let Some(hour) = slice_num(units, data, 'K') {
        if (0..=11).contains(&hour) {
            fields.hour = Some(Hour::HalfDay(hour + 1));
            fields.found = true;
        }
    }
    if let Some(hour) = slice_num(units, data, 'h') {
        if (1..=12).contains(&hour) {
            fields.hour = Some(Hour::HalfDay(hour));
            fields.found = true;
        }
    }

    if let Some(minute) = slice_num(units, data, 'm') {
        if (0..=59).contains(&minute) {
            fields.minute = u32::try_from(minute).ok();
            fields.found = true;
        }
    }
    if let Some(second) = slice_num(units, data, 's') {
        if (0..=59).contains(&second) {
            fields.second = u32::try_from(second).ok();
            fields.found = true;
        }
    }
    if let Some(millis) = slice_num(units, data, 'S') {
        if (0..=999).contains(&millis) {
            fields.millisecond = u32::try_from(millis).ok();
            fields.found = true;
        }
    }

    for letter in ['z', 'Z'] {
        if let Some(name) = slice_field(units, data, letter) {
            if let Some(offset) = parse_timezone(name) {
                fields.tz_offset_minutes = Some(offset);
            }
        }
    }
}

/// Slice the value at the character span the letter occupies in the units
/// string. A span running past the value is treated as no match.
fn slice_field<'a>(units: &str, data: &'a str, letter: char) -> Option<&'a str> {
    let first = units.find(letter)?;
    let last = units.rfind(letter)?;
    data.get(first..=last)
}

fn slice_num(units: &str, data: &str, letter: char) -> Option<i64> {
    slice_field(units, data, letter)?.parse::<i64>().ok()
}

fn month_from_name(name: &str) -> Option<u32> {
    LONG_MONTHS
        .iter()
        .chain(SHORT_MONTHS.iter())
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|i| (i % 12) as u32)
}

/// 1 = Sunday .. 7 = Saturday.
fn weekday_from_name(name: &str) -> Option<u32> {
    LONG_WEEKDAYS
        .iter()
        .chain(SHORT_WEEKDAYS.iter())
        .position(|d| d.eq_ignore_ascii_case(name))
        .map(|i| (i % 7) as u32 + 1)
}

/// Best-effort timezone lookup: UTC aliases and fixed offsets only.
fn parse_timezone(name: &str) -> Option<i32> {
    let name = name.trim();
    for alias in ["utc", "gmt", "ut", "z"] {
        if name.eq_ignore_ascii_case(alias) {
            return Some(0);
        }
    }
    let rest = name.strip_prefix("GMT").unwrap_or(name);
    let (sign, digits) = match rest.as_bytes().first()? {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return None,
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if digits.len() == 4 => (
            digits[..2].parse::<i32>().ok()?,
            digits[2..].parse::<i32>().ok()?,
        ),
        None => (digits.parse::<i32>().ok()?, 0),
    };
    (hours <= 14 && minutes < 60).then_some(sign * (hours * 60 + minutes))
}

/// Translate a units template into a chrono format string. Only the codes
/// the composite patterns admit are mapped; everything else passes literal.
fn template_to_strftime(units: &str) -> String {
    let mut out = String::new();
    let mut chars = units.chars().peekable();
    while let Some(c) = chars.next() {
        let mut run = 1;
        while chars.peek() == Some(&c) {
            chars.next();
            run += 1;
        }
        match c {
            'y' => out.push_str(if run <= 2 { "%y" } else { "%Y" }),
            'M' => out.push_str("%m"),
            'd' => out.push_str("%d"),
            'H' | 'h' | 'K' | 'k' => out.push_str("%H"),
            'm' => out.push_str("%M"),
            's' => out.push_str("%S"),
            other => {
                for _ in 0..run {
                    out.push(other);
                }
            }
        }
    }
    out
}
