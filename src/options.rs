//! Call-level statement options and their merge rules.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read/write consistency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
    Serial,
    LocalSerial,
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Consistency::Any => "ANY",
            Consistency::One => "ONE",
            Consistency::Two => "TWO",
            Consistency::Three => "THREE",
            Consistency::Quorum => "QUORUM",
            Consistency::All => "ALL",
            Consistency::LocalQuorum => "LOCAL_QUORUM",
            Consistency::EachQuorum => "EACH_QUORUM",
            Consistency::LocalOne => "LOCAL_ONE",
            Consistency::Serial => "SERIAL",
            Consistency::LocalSerial => "LOCAL_SERIAL",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Clustering order of one column, applied at table creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringOrderColumn {
    pub column: String,
    pub direction: SortOrder,
}

impl ClusteringOrderColumn {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortOrder::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortOrder::Desc,
        }
    }
}

/// Statement modifiers. `None` means unset; `Some(0)` is an explicit zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    /// Maximum number of rows per read statement.
    pub limit: Option<usize>,
    pub consistency: Option<Consistency>,
    /// Time-to-live of written cells.
    pub ttl: Option<Duration>,
    /// Write timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    pub allow_filtering: Option<bool>,
    /// Column projection for reads.
    pub select: Option<Vec<String>>,
    pub clustering_order: Option<Vec<ClusteringOrderColumn>>,
    pub compact_storage: Option<bool>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn consistency(mut self, c: Consistency) -> Self {
        self.consistency = Some(c);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn timestamp(mut self, t: DateTime<Utc>) -> Self {
        self.timestamp = Some(t);
        self
    }

    pub fn allow_filtering(mut self, allow: bool) -> Self {
        self.allow_filtering = Some(allow);
        self
    }

    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn clustering_order(mut self, order: Vec<ClusteringOrderColumn>) -> Self {
        self.clustering_order = Some(order);
        self
    }

    pub fn compact_storage(mut self, compact: bool) -> Self {
        self.compact_storage = Some(compact);
        self
    }

    /// Field-by-field merge; every field set in `other` wins.
    pub fn merge(&self, other: &Options) -> Options {
        Options {
            limit: other.limit.or(self.limit),
            consistency: other.consistency.or(self.consistency),
            ttl: other.ttl.or(self.ttl),
            timestamp: other.timestamp.or(self.timestamp),
            allow_filtering: other.allow_filtering.or(self.allow_filtering),
            select: other.select.clone().or_else(|| self.select.clone()),
            clustering_order: other
                .clustering_order
                .clone()
                .or_else(|| self.clustering_order.clone()),
            compact_storage: other.compact_storage.or(self.compact_storage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_override_wins() {
        let base = Options::new().limit(10).consistency(Consistency::One);
        let merged = base.merge(&Options::new().limit(3));
        assert_eq!(merged.limit, Some(3));
        assert_eq!(merged.consistency, Some(Consistency::One));
        // the receiver is untouched
        assert_eq!(base.limit, Some(10));
    }

    #[test]
    fn test_explicit_zero_is_not_unset() {
        let base = Options::new().ttl(Duration::from_secs(60));
        let merged = base.merge(&Options::new().ttl(Duration::ZERO));
        assert_eq!(merged.ttl, Some(Duration::ZERO));

        let untouched = base.merge(&Options::new());
        assert_eq!(untouched.ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_consistency_display() {
        assert_eq!(Consistency::LocalQuorum.to_string(), "LOCAL_QUORUM");
    }
}
