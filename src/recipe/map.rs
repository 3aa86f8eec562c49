use std::sync::Arc;

use crate::ast::{Action, Changes, Column, Keys, Relation, Row, TableDef, Value};
use crate::codec::Record;
use crate::error::CassaResult;
use crate::keyspace::{Session, TableChanger};
use crate::op::Op;
use crate::options::Options;

/// Single-key lookup: one table, one row per id.
#[derive(Debug, Clone)]
pub struct MapTable {
    def: Arc<TableDef>,
    id_field: String,
    session: Session,
}

impl MapTable {
    pub(crate) fn new(session: &Session, name: &str, id_field: &str, columns: Vec<Column>) -> CassaResult<Self> {
        let def = session.table_def(&Self::table_name(name, id_field), columns, Keys::new(&[id_field], &[]))?;
        Ok(Self {
            def,
            id_field: id_field.to_string(),
            session: session.clone(),
        })
    }

    pub fn table_name(name: &str, id_field: &str) -> String {
        format!("{}_map_{}", name, id_field)
    }

    pub fn with_options(&self, options: &Options) -> Self {
        Self {
            session: self.session.with_options(options),
            ..self.clone()
        }
    }

    fn op(&self, action: Action, relations: Vec<Relation>) -> Op {
        self.session
            .op()
            .push(self.session.query(&self.def, action, relations))
    }

    fn by_id(&self, id: impl Into<Value>) -> Vec<Relation> {
        vec![Relation::eq(self.id_field.as_str(), id)]
    }

    pub fn set<T: Record>(&self, value: &T) -> Op {
        match value.to_row() {
            Ok(row) => self.set_row(row),
            Err(e) => self.session.failed(e),
        }
    }

    pub fn set_row(&self, row: Row) -> Op {
        self.op(Action::Insert(row), Vec::new())
    }

    pub fn update(&self, id: impl Into<Value>, changes: Changes) -> Op {
        self.op(Action::Update(changes), self.by_id(id))
    }

    pub fn delete(&self, id: impl Into<Value>) -> Op {
        self.op(Action::Delete, self.by_id(id))
    }

    pub fn read(&self, id: impl Into<Value>) -> Op {
        self.op(Action::Select, self.by_id(id))
    }

    pub fn multi_read<V: Into<Value>>(&self, ids: impl IntoIterator<Item = V>) -> Op {
        self.op(Action::Select, vec![Relation::in_(self.id_field.as_str(), ids)])
    }
}

impl TableChanger for MapTable {
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
    use crate::error::CassaError;
    use crate::keyspace::KeySpace;
    use crate::memory::MemoryStore;

    fn table() -> MapTable {
        KeySpace::new("app", Arc::new(MemoryStore::new()))
            .map_table(
                "users",
                "id",
                vec![Column::new("id", CqlType::Text), Column::new("name", CqlType::Text)],
            )
            .unwrap()
    }

    #[test]
    fn test_statements() {
        let t = table();
        assert_eq!(t.name(), "users_map_id");
        assert_eq!(
            t.read("u1").generate_statement().unwrap().cql,
            "SELECT id, name FROM app.users_map_id WHERE id = ?"
        );
        assert_eq!(
            t.multi_read(["u1", "u2"]).generate_statement().unwrap().cql,
            "SELECT id, name FROM app.users_map_id WHERE id IN (?, ?)"
        );
    }

    #[test]
    fn test_set_without_id_fails_preflight() {
        let row = Row::from([("name".to_string(), Value::from("ann"))]);
        let err = table().set_row(row).preflight().unwrap_err();
        assert!(matches!(err, CassaError::Validation(_)));
    }

    #[test]
    fn test_multi_read_with_no_ids_is_rejected() {
        let err = table().multi_read(Vec::<String>::new()).preflight().unwrap_err();
        assert!(matches!(err, CassaError::Validation(_)));
    }
}
