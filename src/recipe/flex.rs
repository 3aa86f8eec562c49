use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ast::{Action, Changes, Column, Keys, Relation, Row, TableDef, Value};
use crate::bucket::Bucketer;
use crate::codec::Record;
use crate::error::{CassaError, CassaResult};
use crate::keyspace::{Session, TableChanger};
use crate::op::Op;
use crate::options::Options;

use super::{BUCKET_FIELD, bucketed_columns, bucketed_list, check_declared, require, require_time};

/// A multi time series indexed by several fields at once, with a pluggable
/// [`Bucketer`].
///
/// Every index field gets its own physical table partitioned by
/// `(field, bucket)`. Writes fan out to all of them; reads pick one with a
/// `(field, value)` selector.
#[derive(Debug, Clone)]
pub struct FlexMultiTimeSeriesTable {
    tables: Vec<(String, Arc<TableDef>)>,
    time_field: String,
    id_field: String,
    bucketer: Arc<dyn Bucketer>,
    session: Session,
}

impl FlexMultiTimeSeriesTable {
    pub(crate) fn new(
        session: &Session,
        name: &str,
        index_fields: &[&str],
        time_field: &str,
        id_field: &str,
        bucketer: Arc<dyn Bucketer>,
        columns: Vec<Column>,
    ) -> CassaResult<Self> {
        if index_fields.is_empty() {
            return Err(CassaError::validation(format!(
                "flex time series '{}' declares no index fields",
                name
            )));
        }
        check_declared(&columns, index_fields, "flex index")?;
        check_declared(&columns, &[time_field, id_field], "time series")?;
        let stored = bucketed_columns(&columns)?;
        let tables = index_fields
            .iter()
            .map(|field| {
                let def = session.table_def(
                    &format!(
                        "{}_flextimeseries_{}_{}_{}_{}",
                        name,
                        field,
                        time_field,
                        id_field,
                        bucketer.name()
                    ),
                    stored.clone(),
                    Keys::new(&[*field, BUCKET_FIELD], &[time_field, id_field]),
                )?;
                Ok((field.to_string(), def))
            })
            .collect::<CassaResult<Vec<_>>>()?;
        Ok(Self {
            tables,
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

    pub fn index_fields(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(f, _)| f.as_str())
    }

    fn table_for(&self, field: &str) -> CassaResult<&Arc<TableDef>> {
        self.tables
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, t)| t)
            .ok_or_else(|| {
                CassaError::validation(format!("'{}' is not an index field of this series", field))
            })
    }

    fn key(&self, field: &str, value: Value, t: DateTime<Utc>, id: Value) -> Vec<Relation> {
        vec![
            Relation::eq(field, value),
            Relation::eq(BUCKET_FIELD, self.bucketer.bucket(t)),
            Relation::eq(self.time_field.as_str(), t),
            Relation::eq(self.id_field.as_str(), id),
        ]
    }

    /// One statement per index table, each keyed by that table's field.
    fn fan_out(&self, values: &Row, t: DateTime<Utc>, id: &Value, action: &Action) -> Op {
        let mut op = self.session.op();
        for (field, table) in &self.tables {
            let value = match require(values, field, &table.name) {
                Ok(v) => v,
                Err(e) => return self.session.failed(e),
            };
            let relations = self.key(field, value, t, id.clone());
            op = op.push(self.session.query(table, action.clone(), relations));
        }
        op
    }

    pub fn set<T: Record>(&self, value: &T) -> Op {
        match value.to_row() {
            Ok(row) => self.set_row(row),
            Err(e) => self.session.failed(e),
        }
    }

    /// Write the row into every index table.
    pub fn set_row(&self, mut row: Row) -> Op {
        let t = match require_time(&row, &self.time_field, &self.tables[0].1.name) {
            Ok(t) => t,
            Err(e) => return self.session.failed(e),
        };
        row.insert(BUCKET_FIELD.to_string(), Value::Timestamp(self.bucketer.bucket(t)));
        self.tables.iter().fold(self.session.op(), |op, (_, table)| {
            op.push(self.session.query(table, Action::Insert(row.clone()), Vec::new()))
        })
    }

    /// `values` must name every index field.
    pub fn update(&self, values: &Row, t: DateTime<Utc>, id: impl Into<Value>, changes: Changes) -> Op {
        self.fan_out(values, t, &id.into(), &Action::Update(changes))
    }

    pub fn delete(&self, values: &Row, t: DateTime<Utc>, id: impl Into<Value>) -> Op {
        self.fan_out(values, t, &id.into(), &Action::Delete)
    }

    pub fn read(&self, field: &str, value: impl Into<Value>, t: DateTime<Utc>, id: impl Into<Value>) -> Op {
        match self.table_for(field) {
            Ok(table) => self.session.op().push(self.session.query(
                table,
                Action::Select,
                self.key(field, value.into(), t, id.into()),
            )),
            Err(e) => self.session.failed(e),
        }
    }

    pub fn list(&self, field: &str, value: impl Into<Value>, start: DateTime<Utc>, end: DateTime<Utc>) -> Op {
        match self.table_for(field) {
            Ok(table) => bucketed_list(
                &self.session,
                table,
                self.bucketer.as_ref(),
                vec![Relation::eq(field, value)],
                &self.time_field,
                start,
                end,
            ),
            Err(e) => self.session.failed(e),
        }
    }
}

impl TableChanger for FlexMultiTimeSeriesTable {
    fn name(&self) -> String {
        self.tables[0].1.name.clone()
    }

    fn physical_tables(&self) -> Vec<Arc<TableDef>> {
        self.tables.iter().map(|(_, t)| t.clone()).collect()
    }

    fn session(&self) -> &Session {
        &self.session
    }
}
