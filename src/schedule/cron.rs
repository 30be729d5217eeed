// src/schedule/cron.rs

//! Minimal five-field cron expressions, evaluated in UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, TimeDelta, TimeZone, Timelike, Utc};
use thiserror::Error;

/// Upper bound on how far `next_after` searches before giving up
/// (e.g. `0 0 30 2 *` never matches).
const SEARCH_HORIZON_DAYS: i64 = 366 * 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CronParseError {
    #[error("expected 5 fields (minute hour day-of-month month day-of-week), got {0}")]
    FieldCount(usize),

    #[error("unknown schedule preset '{0}'")]
    UnknownPreset(String),

    #[error("invalid value '{value}' in {field} field")]
    InvalidValue { field: CronField, value: String },

    #[error("value {value} out of range {min}-{max} in {field} field")]
    OutOfRange {
        field: CronField,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("invalid step '{value}' in {field} field")]
    InvalidStep { field: CronField, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl CronField {
    fn bounds(self) -> (u32, u32) {
        match self {
            CronField::Minute => (0, 59),
            CronField::Hour => (0, 23),
            CronField::DayOfMonth => (1, 31),
            CronField::Month => (1, 12),
            // 7 is accepted as an alias for Sunday and folded to 0.
            CronField::DayOfWeek => (0, 7),
        }
    }

    fn names(self) -> &'static [&'static str] {
        match self {
            CronField::Month => &[
                "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
            ],
            CronField::DayOfWeek => &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
            _ => &[],
        }
    }

    /// Numeric value of the first entry in `names()`.
    fn names_offset(self) -> u32 {
        match self {
            CronField::Month => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CronField::Minute => "minute",
            CronField::Hour => "hour",
            CronField::DayOfMonth => "day-of-month",
            CronField::Month => "month",
            CronField::DayOfWeek => "day-of-week",
        };
        f.write_str(s)
    }
}

/// Set of allowed values for one field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1u64 << value) != 0
    }

    fn insert(&mut self, value: u32) {
        self.0 |= 1u64 << value;
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let trimmed = expr.trim();
        let expanded = match trimmed.to_lowercase().as_str() {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other if other.starts_with('@') => {
                return Err(CronParseError::UnknownPreset(trimmed.to_string()));
            }
            _ => trimmed,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount(fields.len()));
        }

        let mut days_of_week = parse_field(fields[4], CronField::DayOfWeek)?;
        if days_of_week.contains(7) {
            days_of_week.0 &= !(1u64 << 7);
            days_of_week.insert(0);
        }

        Ok(Self {
            source: trimmed.to_string(),
            minutes: parse_field(fields[0], CronField::Minute)?,
            hours: parse_field(fields[1], CronField::Hour)?,
            days_of_month: parse_field(fields[2], CronField::DayOfMonth)?,
            months: parse_field(fields[3], CronField::Month)?,
            days_of_week,
            dom_restricted: !is_unrestricted(fields[2]),
            dow_restricted: !is_unrestricted(fields[4]),
        })
    }

    /// The expression as written in the config.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `t` (truncated to the minute) is a boundary of this schedule.
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        self.months.contains(t.month())
            && self.day_matches(t)
            && self.hours.contains(t.hour())
            && self.minutes.contains(t.minute())
    }

    /// First boundary strictly after `after`, or `None` if nothing matches
    /// within the search horizon.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = truncate_to_minute(after)? + TimeDelta::minutes(1);
        let limit = after + TimeDelta::days(SEARCH_HORIZON_DAYS);

        while t <= limit {
            if !self.months.contains(t.month()) {
                t = start_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t) {
                t = start_of_next_day(t)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.with_minute(0)? + TimeDelta::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t += TimeDelta::minutes(1);
                continue;
            }
            return Some(t);
        }

        None
    }

    /// Standard cron rule: when both day fields are restricted a day matches
    /// if either does, otherwise it must match both.
    fn day_matches(&self, t: DateTime<Utc>) -> bool {
        let dom = self.days_of_month.contains(t.day());
        let dow = self
            .days_of_week
            .contains(t.weekday().num_days_from_sunday());

        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronExpr {
    type Err = CronParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CronExpr::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_wildcard(field: &str) -> bool {
    field == "*" || field == "?"
}

/// A day field starting with `*` (including `*/n`) does not trigger the
/// day-of-month OR day-of-week rule.
fn is_unrestricted(field: &str) -> bool {
    field.starts_with('*') || field == "?"
}

fn parse_field(spec: &str, field: CronField) -> Result<FieldSet, CronParseError> {
    let (min, max) = field.bounds();
    let mut set = FieldSet(0);

    for item in spec.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| CronParseError::InvalidStep {
                    field,
                    value: item.to_string(),
                })?;
                if step == 0 || step > max - min {
                    return Err(CronParseError::InvalidStep {
                        field,
                        value: item.to_string(),
                    });
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (start, end) = if is_wildcard(range) {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (parse_value(lo, field)?, parse_value(hi, field)?)
        } else {
            let v = parse_value(range, field)?;
            // `5/15` means "from 5 to the end of the range, every 15".
            if step > 1 { (v, max) } else { (v, v) }
        };

        if start > end {
            return Err(CronParseError::InvalidValue {
                field,
                value: item.to_string(),
            });
        }

        let mut v = start;
        while v <= end {
            set.insert(v);
            match v.checked_add(step) {
                Some(next) => v = next,
                None => break,
            }
        }
    }

    Ok(set)
}

fn parse_value(raw: &str, field: CronField) -> Result<u32, CronParseError> {
    let (min, max) = field.bounds();
    let lower = raw.to_lowercase();

    let value = match field.names().iter().position(|n| *n == lower) {
        Some(idx) => idx as u32 + field.names_offset(),
        None => raw.parse::<u32>().map_err(|_| CronParseError::InvalidValue {
            field,
            value: raw.to_string(),
        })?,
    };

    if value < min || value > max {
        return Err(CronParseError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }

    Ok(value)
}

pub(crate) fn truncate_to_minute(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    t.with_second(0)?.with_nanosecond(0)
}

fn start_of_next_day(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let date = t.date_naive().checked_add_days(Days::new(1))?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn start_of_next_month(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn hourly_expression_advances_to_next_top_of_hour() {
        let cron = CronExpr::parse("0 * * * *").unwrap();
        assert_eq!(
            cron.next_after(at("2018-05-01T10:15:30Z")),
            Some(at("2018-05-01T11:00:00Z"))
        );
        assert_eq!(
            cron.next_after(at("2018-05-01T11:00:00Z")),
            Some(at("2018-05-01T12:00:00Z"))
        );
    }

    #[test]
    fn presets_expand() {
        assert_eq!(
            CronExpr::parse("@hourly").unwrap().next_after(at("2018-05-01T10:59:00Z")),
            Some(at("2018-05-01T11:00:00Z"))
        );
        assert_eq!(
            CronExpr::parse("@daily").unwrap().next_after(at("2018-12-31T10:00:00Z")),
            Some(at("2019-01-01T00:00:00Z"))
        );
        assert_eq!(
            CronExpr::parse("@monthly").unwrap().next_after(at("2018-05-01T00:00:00Z")),
            Some(at("2018-06-01T00:00:00Z"))
        );
        assert!(matches!(
            CronExpr::parse("@fortnightly"),
            Err(CronParseError::UnknownPreset(_))
        ));
    }

    #[test]
    fn steps_ranges_and_lists() {
        let cron = CronExpr::parse("*/15 9-10 * * *").unwrap();
        assert_eq!(
            cron.next_after(at("2018-05-01T08:50:00Z")),
            Some(at("2018-05-01T09:00:00Z"))
        );
        assert_eq!(
            cron.next_after(at("2018-05-01T10:45:00Z")),
            Some(at("2018-05-02T09:00:00Z"))
        );

        let cron = CronExpr::parse("5,35 0 * * *").unwrap();
        assert_eq!(
            cron.next_after(at("2018-05-01T00:05:00Z")),
            Some(at("2018-05-01T00:35:00Z"))
        );
    }

    #[test]
    fn weekday_names_and_sunday_alias() {
        // 2018-05-06 is a Sunday.
        let cron = CronExpr::parse("0 0 * * 7").unwrap();
        assert_eq!(
            cron.next_after(at("2018-05-01T00:00:00Z")),
            Some(at("2018-05-06T00:00:00Z"))
        );
        let cron = CronExpr::parse("0 0 * * MON-FRI").unwrap();
        assert_eq!(
            cron.next_after(at("2018-05-04T12:00:00Z")),
            Some(at("2018-05-07T00:00:00Z"))
        );
    }

    #[test]
    fn day_of_month_or_day_of_week_when_both_restricted() {
        // 1st of the month OR any Sunday.
        let cron = CronExpr::parse("0 0 1 * sun").unwrap();
        assert_eq!(
            cron.next_after(at("2018-05-01T00:00:00Z")),
            Some(at("2018-05-06T00:00:00Z"))
        );
        assert_eq!(
            cron.next_after(at("2018-05-27T00:00:00Z")),
            Some(at("2018-06-01T00:00:00Z"))
        );
    }

    #[test]
    fn stepped_wildcard_day_field_is_not_an_or() {
        // Odd days of the month that are also Tuesdays; 2018-05-01 is one.
        let cron = CronExpr::parse("0 0 */2 * tue").unwrap();
        assert_eq!(
            cron.next_after(at("2018-05-01T00:00:00Z")),
            Some(at("2018-05-15T00:00:00Z"))
        );
    }

    #[test]
    fn impossible_dates_yield_none() {
        let cron = CronExpr::parse("0 0 30 2 *").unwrap();
        assert_eq!(cron.next_after(at("2018-01-01T00:00:00Z")), None);
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert_eq!(
            CronExpr::parse("* * *"),
            Err(CronParseError::FieldCount(3))
        );
        assert!(matches!(
            CronExpr::parse("60 * * * *"),
            Err(CronParseError::OutOfRange { value: 60, .. })
        ));
        assert!(matches!(
            CronExpr::parse("*/0 * * * *"),
            Err(CronParseError::InvalidStep { .. })
        ));
        assert!(matches!(
            CronExpr::parse("5/4294967295 * * * *"),
            Err(CronParseError::InvalidStep { .. })
        ));
        assert!(matches!(
            CronExpr::parse("0 0 * * */8"),
            Err(CronParseError::InvalidStep { .. })
        ));
        assert!(matches!(
            CronExpr::parse("a * * * *"),
            Err(CronParseError::InvalidValue { .. })
        ));
    }
}
