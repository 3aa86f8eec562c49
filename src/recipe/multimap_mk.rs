use std::sync::Arc;

use crate::ast::{Action, Changes, Column, Keys, Operator, Relation, Row, TableDef, Value};
use crate::codec::Record;
use crate::error::CassaResult;
use crate::keyspace::{Session, TableChanger};
use crate::op::Op;
use crate::options::Options;

use super::{check_declared, pin, require};

/// Secondary index over several fields at once.
///
/// The index partition key is every index field, in declaration order; the
/// id fields cluster within it. The main table is keyed by the id fields as
/// one compound partition key.
#[derive(Debug, Clone)]
pub struct MultimapMkTable {
    main: Arc<TableDef>,
    index: Arc<TableDef>,
    fields: Vec<String>,
    id_fields: Vec<String>,
    session: Session,
}

impl MultimapMkTable {
    pub(crate) fn new(
        session: &Session,
        name: &str,
        fields: &[&str],
        id_fields: &[&str],
        columns: Vec<Column>,
    ) -> CassaResult<Self> {
        check_declared(&columns, fields, "multimap index")?;
        check_declared(&columns, id_fields, "multimap id")?;
        let main = session.table_def(
            &format!("{}_map_{}", name, id_fields.join("_")),
            columns.clone(),
            Keys::new(id_fields, &[]).compound(),
        )?;
        let index = session.table_def(
            &format!("{}_multimapmk_{}_{}", name, fields.join("_"), id_fields.join("_")),
            columns,
            Keys::new(fields, id_fields),
        )?;
        Ok(Self {
            main,
            index,
            fields: fields.iter().map(|s| s.to_string()).collect(),
            id_fields: id_fields.iter().map(|s| s.to_string()).collect(),
            session: session.clone(),
        })
    }

    pub fn with_options(&self, options: &Options) -> Self {
        Self {
            session: self.session.with_options(options),
            ..self.clone()
        }
    }

    fn query(&self, table: &Arc<TableDef>, action: Action, relations: Vec<Relation>) -> Op {
        self.session
            .op()
            .push(self.session.query(table, action, relations))
    }

    fn main_key(&self, ids: &Row) -> CassaResult<Vec<Relation>> {
        pin(ids, &self.id_fields, &self.main.name)
    }

    fn index_key(&self, values: &Row, ids: &Row) -> CassaResult<Vec<Relation>> {
        let mut relations = pin(values, &self.fields, &self.index.name)?;
        relations.extend(pin(ids, &self.id_fields, &self.index.name)?);
        Ok(relations)
    }

    pub fn set<T: Record>(&self, value: &T) -> Op {
        match value.to_row() {
            Ok(row) => self.set_row(row),
            Err(e) => self.session.failed(e),
        }
    }

    pub fn set_row(&self, row: Row) -> Op {
        self.query(&self.main, Action::Insert(row.clone()), Vec::new())
            .add(self.query(&self.index, Action::Insert(row), Vec::new()))
    }

    /// `values` names every index field, `ids` every id field.
    pub fn update(&self, values: &Row, ids: &Row, changes: Changes) -> Op {
        let keys = self
            .main_key(ids)
            .and_then(|main| Ok((main, self.index_key(values, ids)?)));
        match keys {
            Ok((main, index)) => self
                .query(&self.main, Action::Update(changes.clone()), main)
                .add(self.query(&self.index, Action::Update(changes), index)),
            Err(e) => self.session.failed(e),
        }
    }

    pub fn delete(&self, values: &Row, ids: &Row) -> Op {
        let keys = self
            .main_key(ids)
            .and_then(|main| Ok((main, self.index_key(values, ids)?)));
        match keys {
            Ok((main, index)) => self
                .query(&self.main, Action::Delete, main)
                .add(self.query(&self.index, Action::Delete, index)),
            Err(e) => self.session.failed(e),
        }
    }

    /// Remove every index entry under `values`. Main rows are kept.
    pub fn delete_all(&self, values: &Row) -> Op {
        match pin(values, &self.fields, &self.index.name) {
            Ok(relations) => self.query(&self.index, Action::Delete, relations),
            Err(e) => self.session.failed(e),
        }
    }

    /// Rows under `values`, strictly after the id tuple named by `after`.
    ///
    /// `after` must carry every id field. The ids are compared as one tuple in
    /// declaration order, so rows sharing a leading id are not skipped.
    pub fn list(&self, values: &Row, after: Option<&Row>, limit: Option<usize>) -> Op {
        let relations = pin(values, &self.fields, &self.index.name).and_then(|mut relations| {
            if let Some(after) = after {
                relations.push(self.after_ids(after)?);
            }
            Ok(relations)
        });
        let op = match relations {
            Ok(relations) => self.query(&self.index, Action::Select, relations),
            Err(e) => return self.session.failed(e),
        };
        match limit {
            Some(n) => op.with_options(&Options::new().limit(n)),
            None => op,
        }
    }

    fn after_ids(&self, after: &Row) -> CassaResult<Relation> {
        let mut values = self
            .id_fields
            .iter()
            .map(|f| require(after, f, &self.index.name))
            .collect::<CassaResult<Vec<Value>>>()?;
        if values.len() == 1 {
            return Ok(Relation::gt(self.id_fields[0].as_str(), values.remove(0)));
        }
        Ok(Relation::tuple(&self.id_fields, Operator::Gt, values))
    }

    pub fn read(&self, values: &Row, ids: &Row) -> Op {
        match self.index_key(values, ids) {
            Ok(relations) => self.query(&self.index, Action::Select, relations),
            Err(e) => self.session.failed(e),
        }
    }

    /// One read per id row, results in the order given.
    pub fn multi_read(&self, values: &Row, ids: &[Row]) -> Op {
        ids.iter()
            .map(|id| self.read(values, id))
            .reduce(Op::add)
            .unwrap_or_else(|| self.session.op())
    }
}

impl TableChanger for MultimapMkTable {
    fn name(&self) -> String {
        self.index.name.clone()
    }

    fn physical_tables(&self) -> Vec<Arc<TableDef>> {
        vec![self.main.clone(), self.index.clone()]
    }

    fn session(&self) -> &Session {
        &self.session
    }
}
