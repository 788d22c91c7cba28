//! Event keys
//!
//! Every event is identified by a key. Keys order by their timestamp and
//! render to a stable string; collections index events by that string, so
//! two keys that render identically are the same key as far as lookup and
//! dedup are concerned, even if their types differ.
//!
//! - [`Time`]: a point in time, rendered as epoch milliseconds
//! - [`TimeRange`]: a begin/end pair, rendered as `[begin,end]`
//! - [`IndexKey`]: a fixed-duration bucket such as `5m-1234`

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of key an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Time,
    TimeRange,
    Index,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Time => write!(f, "time"),
            KeyType::TimeRange => write!(f, "timerange"),
            KeyType::Index => write!(f, "index"),
        }
    }
}

/// Behaviour required of anything used as an event key.
///
/// `Display` is the key's identity for indexing purposes.
pub trait Key: Clone + fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn key_type(&self) -> KeyType;

    /// The instant used to order events by key.
    fn timestamp(&self) -> DateTime<Utc>;

    fn begin(&self) -> DateTime<Utc>;

    fn end(&self) -> DateTime<Utc>;
}

pub(crate) fn datetime_from_millis(ms: i64) -> CoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(CoreError::TimestampOutOfRange(ms))
}

// =============================================================================
// Time
// =============================================================================

/// A single point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Time(pub DateTime<Utc>);

impl Time {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn from_millis(ms: i64) -> CoreResult<Self> {
        datetime_from_millis(ms).map(Self)
    }

    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl Key for Time {
    fn key_type(&self) -> KeyType {
        KeyType::Time
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    fn begin(&self) -> DateTime<Utc> {
        self.0
    }

    fn end(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_millis())
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

// =============================================================================
// TimeRange
// =============================================================================

/// A closed span of time. `begin <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawTimeRange")]
pub struct TimeRange {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Wire form of a [`TimeRange`], normalized on the way in.
#[derive(Deserialize)]
struct RawTimeRange {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl From<RawTimeRange> for TimeRange {
    fn from(raw: RawTimeRange) -> Self {
        Self::new(raw.begin, raw.end)
    }
}

impl TimeRange {
    /// Endpoints given in either order are normalized.
    pub fn new(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        if a <= b {
            Self { begin: a, end: b }
        } else {
            Self { begin: b, end: a }
        }
    }

    pub fn from_millis(begin_ms: i64, end_ms: i64) -> CoreResult<Self> {
        Ok(Self::new(
            datetime_from_millis(begin_ms)?,
            datetime_from_millis(end_ms)?,
        ))
    }

    pub fn duration(&self) -> Duration {
        self.end - self.begin
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.begin <= at && at <= self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.begin <= other.end && other.begin <= self.end
    }

    /// Smallest range covering both.
    pub fn extend(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }
}

impl Key for TimeRange {
    fn key_type(&self) -> KeyType {
        KeyType::TimeRange
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.begin
    }

    fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}]",
            self.begin.timestamp_millis(),
            self.end.timestamp_millis()
        )
    }
}

// =============================================================================
// IndexKey
// =============================================================================

/// Parse a window such as `30s` or `5m` into milliseconds.
pub fn parse_window(window: &str) -> CoreResult<i64> {
    let invalid = || CoreError::InvalidWindow(window.to_string());
    let split = window
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (count, unit) = window.split_at(split);
    let count: i64 = count.parse().map_err(|_| invalid())?;
    if count <= 0 {
        return Err(invalid());
    }
    let unit_ms = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return Err(invalid()),
    };
    count.checked_mul(unit_ms).ok_or_else(invalid)
}

/// A fixed-duration bucket identified by `<window>-<number>`.
///
/// `5m-1234` covers the 1234th five-minute span since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IndexKey {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    text: String,
}

impl IndexKey {
    pub fn parse(text: &str) -> CoreResult<Self> {
        let (window, number) = text
            .split_once('-')
            .ok_or_else(|| CoreError::InvalidIndexKey(text.to_string()))?;
        let window_ms = parse_window(window)?;
        let number: i64 = number
            .parse()
            .map_err(|_| CoreError::InvalidIndexKey(text.to_string()))?;
        let begin_ms = number
            .checked_mul(window_ms)
            .ok_or_else(|| CoreError::InvalidIndexKey(text.to_string()))?;
        let end_ms = begin_ms
            .checked_add(window_ms)
            .ok_or(CoreError::TimestampOutOfRange(begin_ms))?;
        Ok(Self {
            begin: datetime_from_millis(begin_ms)?,
            end: datetime_from_millis(end_ms)?,
            text: text.to_string(),
        })
    }

    /// The bucket of width `window` that contains `at`.
    pub fn containing(window: &str, at: DateTime<Utc>) -> CoreResult<Self> {
        let window_ms = parse_window(window)?;
        let number = at.timestamp_millis().div_euclid(window_ms);
        Self::parse(&format!("{window}-{number}"))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_range(&self) -> TimeRange {
        TimeRange::new(self.begin, self.end)
    }
}

impl Key for IndexKey {
    fn key_type(&self) -> KeyType {
        KeyType::Index
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.begin
    }

    fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl TryFrom<String> for IndexKey {
    type Error = CoreError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text)
    }
}

impl From<IndexKey> for String {
    fn from(key: IndexKey) -> Self {
        key.text
    }
}
