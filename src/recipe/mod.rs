//! Denormalization recipes.
//!
//! Each recipe compiles one logical operation into the statements needed
//! across its physical tables and hands them back as an [`Op`](crate::op::Op).
//! Writes that touch several tables run sequentially unless the caller picks
//! [`Op::run_atomically`](crate::op::Op::run_atomically).
//!
//! | Recipe | Physical tables |
//! |--------|-----------------|
//! | [`MapTable`] | `{name}_map_{id}` |
//! | [`MultimapTable`] | main by id, index by `(field, id)` |
//! | [`MultimapMkTable`] | main by ids, index by `(fields..., ids...)` |
//! | [`TimeSeriesTable`] | `(bucket)`, clustered by `(time, id)` |
//! | [`MultiTimeSeriesTable`] | `(index, bucket)`, clustered by `(time, id)` |
//! | [`FlexMultiTimeSeriesTable`] | one `(field, bucket)` table per index field |

mod flex;
mod map;
mod multi_timeseries;
mod multimap;
mod multimap_mk;
mod timeseries;

pub use flex::FlexMultiTimeSeriesTable;
pub use map::MapTable;
pub use multi_timeseries::MultiTimeSeriesTable;
pub use multimap::MultimapTable;
pub use multimap_mk::MultimapMkTable;
pub use timeseries::TimeSeriesTable;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ast::{Column, CqlType, Relation, Row, TableDef, Value};
use crate::bucket::{Bucketer, buckets_between};
use crate::error::{CassaError, CassaResult};
use crate::keyspace::Session;
use crate::op::Op;

/// Derived partition column of the time-series recipes.
pub const BUCKET_FIELD: &str = "bucket";

/// The non-null value of a key field, or a validation error naming it.
pub(crate) fn require(row: &Row, field: &str, table: &str) -> CassaResult<Value> {
    match row.get(field) {
        Some(v) if !v.is_null() => Ok(v.clone()),
        _ => Err(CassaError::validation(format!(
            "write to '{}' is missing key field '{}'",
            table, field
        ))),
    }
}

pub(crate) fn require_time(row: &Row, field: &str, table: &str) -> CassaResult<DateTime<Utc>> {
    require(row, field, table)?.as_timestamp().ok_or_else(|| {
        CassaError::validation(format!(
            "time field '{}' of '{}' does not hold a timestamp",
            field, table
        ))
    })
}

/// Equality relations for `fields`, valued from `values`.
pub(crate) fn pin(values: &Row, fields: &[String], table: &str) -> CassaResult<Vec<Relation>> {
    fields
        .iter()
        .map(|f| Ok(Relation::eq(f.as_str(), require(values, f, table)?)))
        .collect()
}

pub(crate) fn check_declared(columns: &[Column], fields: &[&str], recipe: &str) -> CassaResult<()> {
    for field in fields {
        if !columns.iter().any(|c| c.name == *field) {
            return Err(CassaError::validation(format!(
                "{} field '{}' is not a declared column",
                recipe, field
            )));
        }
    }
    Ok(())
}

/// Columns of a bucketed table: the bucket first, then the declared ones.
pub(crate) fn bucketed_columns(columns: &[Column]) -> CassaResult<Vec<Column>> {
    if columns.iter().any(|c| c.name == BUCKET_FIELD) {
        return Err(CassaError::validation(format!(
            "'{}' is reserved for the derived bucket column",
            BUCKET_FIELD
        )));
    }
    let mut out = vec![Column::new(BUCKET_FIELD, CqlType::Timestamp)];
    out.extend(columns.iter().cloned());
    Ok(out)
}

/// One read per bucket overlapping `[start, end)`, merged by `time_field`.
pub(crate) fn bucketed_list(
    session: &Session,
    table: &Arc<TableDef>,
    bucketer: &dyn Bucketer,
    pinned: Vec<Relation>,
    time_field: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Op {
    let buckets = match buckets_between(bucketer, start, end) {
        Ok(b) => b,
        Err(e) => return session.failed(e),
    };
    buckets
        .into_iter()
        .fold(session.op(), |op, bucket| {
            let mut relations = pinned.clone();
            relations.push(Relation::eq(BUCKET_FIELD, bucket));
            relations.push(Relation::gte(time_field, start));
            relations.push(Relation::lt(time_field, end));
            op.push(session.query(table, crate::ast::Action::Select, relations))
        })
        .merge_by(time_field)
}
