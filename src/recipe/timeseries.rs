use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ast::{Action, Changes, Column, Keys, Relation, Row, TableDef, Value};
use crate::bucket::Bucketer;
use crate::codec::Record;
use crate::error::CassaResult;
use crate::keyspace::{Session, TableChanger};
use crate::op::Op;
use crate::options::Options;

use super::{BUCKET_FIELD, bucketed_columns, bucketed_list, check_declared, require_time};

/// Time-ordered rows, partitioned by bucket and clustered by `(time, id)`.
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    def: Arc<TableDef>,
    time_field: String,
    id_field: String,
    bucketer: Arc<dyn Bucketer>,
    session: Session,
}

impl TimeSeriesTable {
    pub(crate) fn new(
        session: &Session,
        name: &str,
        time_field: &str,
        id_field: &str,
        bucketer: Arc<dyn Bucketer>,
        columns: Vec<Column>,
    ) -> CassaResult<Self> {
        check_declared(&columns, &[time_field, id_field], "time series")?;
        let def = session.table_def(
            &format!("{}_timeseries_{}_{}_{}", name, time_field, id_field, bucketer.name()),
            bucketed_columns(&columns)?,
            Keys::new(&[BUCKET_FIELD], &[time_field, id_field]),
        )?;
        Ok(Self {
            def,
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

    fn key(&self, t: DateTime<Utc>, id: Value) -> Vec<Relation> {
        vec![
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

    /// Upsert a row into the bucket of its time field.
    pub fn set_row(&self, mut row: Row) -> Op {
        match require_time(&row, &self.time_field, &self.def.name) {
            Ok(t) => {
                row.insert(BUCKET_FIELD.to_string(), Value::Timestamp(self.bucketer.bucket(t)));
                self.query(Action::Insert(row), Vec::new())
            }
            Err(e) => self.session.failed(e),
        }
    }

    pub fn update(&self, t: DateTime<Utc>, id: impl Into<Value>, changes: Changes) -> Op {
        self.query(Action::Update(changes), self.key(t, id.into()))
    }

    pub fn delete(&self, t: DateTime<Utc>, id: impl Into<Value>) -> Op {
        self.query(Action::Delete, self.key(t, id.into()))
    }

    pub fn read(&self, t: DateTime<Utc>, id: impl Into<Value>) -> Op {
        self.query(Action::Select, self.key(t, id.into()))
    }

    /// Rows with `start <= time < end`, merged across buckets in time order.
    pub fn list(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Op {
        bucketed_list(
            &self.session,
            &self.def,
            self.bucketer.as_ref(),
            Vec::new(),
            &self.time_field,
            start,
            end,
        )
    }
}

impl TableChanger for TimeSeriesTable {
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
