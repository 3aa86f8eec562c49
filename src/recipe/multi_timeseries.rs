use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ast::{Action, Changes, Column, Keys, Relation, Row, TableDef, Value};
use crate::bucket::Bucketer;
use crate::codec::Record;
use crate::error::CassaResult;
use crate::keyspace::{Session, TableChanger};
use crate::op::Op;
use crate::options::Options;

use super::{BUCKET_FIELD, bucketed_columns, bucketed_list, check_declared, require, require_time};

/// A time series per value of an index field: partitioned by
/// `(index, bucket)`, clustered by `(time, id)`.
#[derive(Debug, Clone)]
pub struct MultiTimeSeriesTable {
    def: Arc<TableDef>,
    index_field: String,
    time_field: String,
    id_field: String,
    bucketer: Arc<dyn Bucketer>,
    session: Session,
}

impl MultiTimeSeriesTable {
    pub(crate) fn new(
        session: &Session,
        name: &str,
        index_field: &str,
        time_field: &str,
        id_field: &str,
        bucketer: Arc<dyn Bucketer>,
        columns: Vec<Column>,
    ) -> CassaResult<Self> {
        check_declared(&columns, &[index_field, time_field, id_field], "time series")?;
        let def = session.table_def(
            &format!(
                "{}_multitimeseries_{}_{}_{}_{}",
                name,
                index_field,
                time_field,
                id_field,
                bucketer.name()
            ),
            bucketed_columns(&columns)?,
            Keys::new(&[index_field, BUCKET_FIELD], &[time_field, id_field]),
        )?;
        Ok(Self {
            def,
            index_field: index_field.to_string(),
            time_field: time_field.to_string(),
            id_field: id_field.to_string(),
            bucketer,
            session: session.clone(),
        })
    }

    pub fn with_options(&self, options: &Options) -> Self {
        Self {
            session: self.session.with_options(options),
            ..self.clone()
        }
    }

    fn query(&self, action: Action, relations: Vec<Relation>) -> Op {
        self.session
            .op()
            .push(self.session.query(&self.def, action, relations))
    }

    fn key(&self, value: Value, t: DateTime<Utc>, id: Value) -> Vec<Relation> {
        vec![
            Relation::eq(self.index_field.as_str(), value),
            Relation::eq(BUCKET_FIELD, self.bucketer.bucket(t)),
            Relation::eq(self.time_field.as_str(), t),
            Relation::eq(self.id_field.as_str(), id),
        ]
    }

    pub fn set<T: Record>(&self, value: &T) -> Op {
        match value.to_row() {
            Ok(row) => self.set_row(row),
            Err(e) => self.session.failed(e),
        }
    }

    pub fn set_row(&self, mut row: Row) -> Op {
        let t = require(&row, &self.index_field, &self.def.name)
            .and_then(|_| require_time(&row, &self.time_field, &self.def.name));
        match t {
            Ok(t) => {
                row.insert(BUCKET_FIELD.to_string(), Value::Timestamp(self.bucketer.bucket(t)));
                self.query(Action::Insert(row), Vec::new())
            }
            Err(e) => self.session.failed(e),
        }
    }

    pub fn update(&self, value: impl Into<Value>, t: DateTime<Utc>, id: impl Into<Value>, changes: Changes) -> Op {
        self.query(Action::Update(changes), self.key(value.into(), t, id.into()))
    }

    pub fn delete(&self, value: impl Into<Value>, t: DateTime<Utc>, id: impl Into<Value>) -> Op {
        self.query(Action::Delete, self.key(value.into(), t, id.into()))
    }

    pub fn read(&self, value: impl Into<Value>, t: DateTime<Utc>, id: impl Into<Value>) -> Op {
        self.query(Action::Select, self.key(value.into(), t, id.into()))
    }

    /// Rows under `value` with `start <= time < end`, in time order.
    pub fn list(&self, value: impl Into<Value>, start: DateTime<Utc>, end: DateTime<Utc>) -> Op {
        bucketed_list(
            &self.session,
            &self.def,
            self.bucketer.as_ref(),
            vec![Relation::eq(self.index_field.as_str(), value)],
            &self.time_field,
            start,
            end,
        )
    }
}

impl TableChanger for MultiTimeSeriesTable {
    fn name(&self) -> String {
        self.def.name.clone()
    }

    fn physical_tables(&self) -> Vec<Arc<TableDef>> {
        vec![self.def.clone()]
    }

    fn session(&self) -> &Session {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CqlType;
    use crate::keyspace::KeySpace;
    use crate::memory::MemoryStore;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn table() -> MultiTimeSeriesTable {
        KeySpace::new("app", Arc::new(MemoryStore::new()))
            .multi_timeseries_table(
                "sales",
                "seller",
                "at",
                "id",
                Duration::from_secs(86_400),
                vec![
                    Column::new("seller", CqlType::Text),
                    Column::new("at", CqlType::Timestamp),
                    Column::new("id", CqlType::Uuid),
                ],
            )
            .unwrap()
    }

    #[test]
    fn test_partition_includes_index_and_bucket() {
        assert!(
            table()
                .create_statement()
                .unwrap()
                .ends_with("PRIMARY KEY ((seller, bucket), at, id))")
        );
    }

    #[test]
    fn test_list_pins_index_value() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stmts = table()
            .list("s1", start, start + chrono::TimeDelta::days(2))
            .generate_statements()
            .unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(
            stmts[1].cql,
            "SELECT bucket, seller, at, id FROM app.sales_multitimeseries_seller_at_id_1d WHERE seller = ? AND bucket = ? AND at >= ? AND at < ?"
        );
        assert_eq!(stmts[1].params[0], Value::from("s1"));
    }
}
