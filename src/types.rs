//! Core data types used throughout the engine
//!
//! # Key Types
//!
//! - **`Value`**: A single cell of a table (null, bool, integer, float, string or timestamp)
//! - **`Delta`**: A lookback window length such as `12h`, `2d` or `all`
//! - **`TimeWindow`**: A half-open `[start, end)` interval ending at a reference date
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use spacetime_features::types::{Delta, TimeWindow, Value};
//!
//! let delta: Delta = "2d".parse().unwrap();
//! let end = NaiveDate::from_ymd_opt(2015, 12, 31).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let window = TimeWindow::ending_at(end, &delta);
//!
//! let inside = NaiveDate::from_ymd_opt(2015, 12, 29).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! assert!(window.contains(inside));
//! assert!(!window.contains(end));
//!
//! assert_eq!(Value::from("THEFT").to_string(), "THEFT");
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::digit1,
    combinator::{all_consuming, map_res, value},
    IResult, Parser,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Value
// ============================================================================

/// A single table cell
///
/// Values carry a total order so they can key grouped aggregations and
/// joins. Floats are ordered with `f64::total_cmp`; values of different
/// kinds order by kind.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Missing value
    #[default]
    Null,
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Naive (zone-less) timestamp
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Whether the value is missing
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by row counts: nulls, `false`, zero and empty strings are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Timestamp(_) => true,
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    /// Timestamp view of the value, if it is one
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// String view of the value, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Str(_) => 4,
            Value::Timestamp(_) => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            // total_cmp equality is bitwise equality
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Timestamp(ts) => ts.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", format_timestamp(ts)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Timestamp(midnight(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Midnight at the start of `date`
pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Milliseconds since the Unix epoch, reading `ts` as UTC
pub fn timestamp_millis(ts: &NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

/// Render a timestamp as a bare date when it falls on midnight
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.time() == NaiveTime::MIN {
        ts.format("%Y-%m-%d").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

// ============================================================================
// Delta
// ============================================================================

/// Calendar unit of a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeltaUnit {
    /// Hours
    Hours,
    /// Days
    Days,
    /// Weeks
    Weeks,
    /// Calendar months
    Months,
    /// Calendar years
    Years,
}

impl DeltaUnit {
    fn suffix(&self) -> char {
        match self {
            DeltaUnit::Hours => 'h',
            DeltaUnit::Days => 'd',
            DeltaUnit::Weeks => 'w',
            DeltaUnit::Months => 'm',
            DeltaUnit::Years => 'y',
        }
    }
}

/// Lookback window length
///
/// Parsed from `"<count><unit>"` (`12h`, `1d`, `3w`, `6m`, `1y`) or the
/// literal `all`, which has no lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Delta {
    /// A bounded window of `count` units
    Span {
        /// Number of units
        count: u32,
        /// Unit of the window
        unit: DeltaUnit,
    },
    /// Unbounded lookback
    All,
}

impl Delta {
    /// Create a bounded delta
    pub fn new(count: u32, unit: DeltaUnit) -> Self {
        Delta::Span { count, unit }
    }

    /// Start of the window ending at `date`, or `None` for an unbounded window
    pub fn start_before(&self, date: NaiveDateTime) -> Option<NaiveDateTime> {
        match *self {
            Delta::All => None,
            Delta::Span { count, unit } => match unit {
                DeltaUnit::Hours => date.checked_sub_signed(Duration::hours(count as i64)),
                DeltaUnit::Days => date.checked_sub_signed(Duration::days(count as i64)),
                DeltaUnit::Weeks => date.checked_sub_signed(Duration::weeks(count as i64)),
                DeltaUnit::Months => date.checked_sub_months(Months::new(count)),
                DeltaUnit::Years => date.checked_sub_months(Months::new(count.saturating_mul(12))),
            },
        }
    }
}

/// `all` (any case) or `<digits><unit>`
fn parse_delta(input: &str) -> IResult<&str, Delta> {
    alt((value(Delta::All, tag_no_case("all")), parse_span)).parse(input)
}

/// Parse a bounded span like: 12h, 2d, 3w, 6m, 1y
fn parse_span(input: &str) -> IResult<&str, Delta> {
    let (input, count) = map_res(digit1, str::parse::<u32>).parse(input)?;
    let (input, unit) = alt((
        value(DeltaUnit::Hours, tag_no_case("h")),
        value(DeltaUnit::Days, tag_no_case("d")),
        value(DeltaUnit::Weeks, tag_no_case("w")),
        value(DeltaUnit::Months, tag_no_case("m")),
        value(DeltaUnit::Years, tag_no_case("y")),
    ))
    .parse(input)?;

    Ok((input, Delta::new(count, unit)))
}

impl FromStr for Delta {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match all_consuming(parse_delta).parse(s) {
            Ok((_, Delta::Span { count: 0, .. })) | Err(_) => {
                Err(Error::InvalidDelta(s.to_string()))
            }
            Ok((_, delta)) => Ok(delta),
        }
    }
}

impl TryFrom<String> for Delta {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Delta> for String {
    fn from(d: Delta) -> Self {
        d.to_string()
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delta::All => write!(f, "all"),
            Delta::Span { count, unit } => write!(f, "{}{}", count, unit.suffix()),
        }
    }
}

// ============================================================================
// TimeWindow
// ============================================================================

/// Half-open interval `[start, end)` used to select source rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive start, `None` when unbounded
    pub start: Option<NaiveDateTime>,

    /// Exclusive end
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Window of length `delta` ending at `end`
    pub fn ending_at(end: NaiveDateTime, delta: &Delta) -> Self {
        Self {
            start: delta.start_before(end),
            end,
        }
    }

    /// Check whether a timestamp falls inside the window
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts < self.end && self.start.map_or(true, |start| ts >= start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        midnight(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_delta_parse_and_display() {
        for s in ["12h", "24h", "1d", "2d", "3w", "6m", "1y", "all"] {
            let delta: Delta = s.parse().unwrap();
            assert_eq!(delta.to_string(), s);
        }

        assert!("".parse::<Delta>().is_err());
        assert!("0d".parse::<Delta>().is_err());
        assert!("5x".parse::<Delta>().is_err());
        assert!("d".parse::<Delta>().is_err());
    }

    #[test]
    fn test_delta_parse_edges() {
        assert_eq!(" 2D ".parse::<Delta>().unwrap(), Delta::new(2, DeltaUnit::Days));
        assert_eq!("ALL".parse::<Delta>().unwrap(), Delta::All);

        for bad in ["12hx", "2d2d", "all1", "-1d", "1.5d", "99999999999d", "h12"] {
            assert!(
                matches!(bad.parse::<Delta>(), Err(Error::InvalidDelta(_))),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_delta_start() {
        let end = day(2016, 3, 31);
        assert_eq!(
            "12h".parse::<Delta>().unwrap().start_before(end),
            Some(day(2016, 3, 30) + Duration::hours(12))
        );
        assert_eq!(
            "1m".parse::<Delta>().unwrap().start_before(end),
            Some(day(2016, 2, 29))
        );
        assert_eq!(
            "1y".parse::<Delta>().unwrap().start_before(end),
            Some(day(2015, 3, 31))
        );
        assert_eq!(Delta::All.start_before(end), None);
    }

    #[test]
    fn test_time_window_half_open() {
        let window = TimeWindow::ending_at(day(2015, 12, 31), &"1d".parse().unwrap());
        assert!(window.contains(day(2015, 12, 30)));
        assert!(!window.contains(day(2015, 12, 31)));
        assert!(!window.contains(day(2015, 12, 29)));

        let unbounded = TimeWindow::ending_at(day(2015, 12, 31), &Delta::All);
        assert!(unbounded.contains(day(1990, 1, 1)));
    }

    #[test]
    fn test_value_ordering_and_equality() {
        assert!(Value::Null < Value::Int(0));
        assert!(Value::Int(2) < Value::Int(3));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_eq!(
            Value::from(NaiveDate::from_ymd_opt(2015, 12, 30).unwrap()).to_string(),
            "2015-12-30"
        );
    }

    #[test]
    fn test_value_truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert_eq!(Value::Bool(true).as_f64(), Some(1.0));
        assert_eq!(Value::Str("x".into()).as_f64(), None);
    }
}
