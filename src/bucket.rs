//! Time bucketing for partitioned series.
//!
//! A bucket is a derived partition key component that bounds the size of an
//! otherwise unbounded time-ordered partition.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{CassaError, CassaResult};

/// Upper bound on buckets a single range listing may touch.
pub const MAX_BUCKETS_PER_LIST: usize = 10_000;

/// Maps timestamps onto ordered bucket identifiers.
///
/// Implementations must be deterministic and monotonic:
/// `t1 <= t2` implies `bucket(t1) <= bucket(t2)`.
pub trait Bucketer: fmt::Debug + Send + Sync {
    /// Bucket containing `t`.
    fn bucket(&self, t: DateTime<Utc>) -> DateTime<Utc>;

    /// Bucket immediately after the one containing `t`.
    fn next(&self, t: DateTime<Utc>) -> DateTime<Utc>;

    /// Bucket immediately before the one containing `t`.
    fn prev(&self, t: DateTime<Utc>) -> DateTime<Utc>;

    /// Short, identifier-safe name, used in physical table names.
    fn name(&self) -> String;
}

/// Fixed-duration buckets aligned to the Unix epoch:
/// `floor(t / size) * size`, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBucketer {
    size_ms: i64,
}

impl FixedBucketer {
    pub fn new(size: Duration) -> CassaResult<Self> {
        let size_ms = i64::try_from(size.as_millis()).unwrap_or(0);
        if size_ms <= 0 {
            return Err(CassaError::validation(format!(
                "bucket size must be at least one millisecond, got {:?}",
                size
            )));
        }
        Ok(Self { size_ms })
    }

    pub fn size(&self) -> Duration {
        Duration::from_millis(self.size_ms as u64)
    }

    fn shift(&self, t: DateTime<Utc>, steps: i64) -> DateTime<Utc> {
        let base = self.bucket(t);
        base.checked_add_signed(TimeDelta::milliseconds(self.size_ms * steps))
            .unwrap_or(base)
    }
}

impl Bucketer for FixedBucketer {
    fn bucket(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let ms = t.timestamp_millis();
        let floor = ms.div_euclid(self.size_ms) * self.size_ms;
        DateTime::<Utc>::from_timestamp_millis(floor).unwrap_or(t)
    }

    fn next(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.shift(t, 1)
    }

    fn prev(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.shift(t, -1)
    }

    fn name(&self) -> String {
        format_size(self.size_ms)
    }
}

impl FromStr for FixedBucketer {
    type Err = CassaError;

    fn from_str(s: &str) -> CassaResult<Self> {
        FixedBucketer::new(crate::parser::parse_duration(s)?)
    }
}

fn format_size(ms: i64) -> String {
    const UNITS: [(i64, &str); 5] = [
        (86_400_000, "d"),
        (3_600_000, "h"),
        (60_000, "m"),
        (1_000, "s"),
        (1, "ms"),
    ];
    for (unit, suffix) in UNITS {
        if ms % unit == 0 {
            return format!("{}{}", ms / unit, suffix);
        }
    }
    format!("{}ms", ms)
}

/// Every bucket overlapping `[start, end)`, ascending.
///
/// Always yields at least the bucket of `start`, so an empty range still
/// produces one (empty) read.
pub fn buckets_between(
    bucketer: &dyn Bucketer,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> CassaResult<Vec<DateTime<Utc>>> {
    if start > end {
        return Err(CassaError::validation(format!(
            "malformed bucket range: start {} is after end {}",
            start.to_rfc3339(),
            end.to_rfc3339()
        )));
    }
    let mut buckets = vec![bucketer.bucket(start)];
    loop {
        let last = buckets[buckets.len() - 1];
        let next = bucketer.next(last);
        if next >= end {
            break;
        }
        if next <= last {
            return Err(CassaError::validation(format!(
                "bucketer '{}' does not advance past {}",
                bucketer.name(),
                last.to_rfc3339()
            )));
        }
        if buckets.len() >= MAX_BUCKETS_PER_LIST {
            return Err(CassaError::validation(format!(
                "range spans more than {} buckets",
                MAX_BUCKETS_PER_LIST
            )));
        }
        buckets.push(next);
    }
    Ok(buckets)
}
