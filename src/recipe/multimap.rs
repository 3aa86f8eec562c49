use std::sync::Arc;

use crate::ast::{Action, Changes, Column, Keys, Relation, Row, TableDef, Value};
use crate::codec::Record;
use crate::error::CassaResult;
use crate::keyspace::{Session, TableChanger};
use crate::op::Op;
use crate::options::Options;

use super::check_declared;

/// Secondary index on one field.
///
/// Rows live in a main table keyed by id and are copied into an index table
/// partitioned by the indexed field and clustered by id. Writes touch both
/// tables; lists scan one index partition.
#[derive(Debug, Clone)]
pub struct MultimapTable {
    main: Arc<TableDef>,
    index: Arc<TableDef>,
    field: String,
    id_field: String,
    session: Session,
}

impl MultimapTable {
    pub(crate) fn new(
        session: &Session,
        name: &str,
        field: &str,
        id_field: &str,
        columns: Vec<Column>,
    ) -> CassaResult<Self> {
        check_declared(&columns, &[field, id_field], "multimap")?;
        let main = session.table_def(
            &format!("{}_map_{}", name, id_field),
            columns.clone(),
            Keys::new(&[id_field], &[]),
        )?;
        let index = session.table_def(
            &format!("{}_multimap_{}_{}", name, field, id_field),
            columns,
            Keys::new(&[field], &[id_field]),
        )?;
        Ok(Self {
            main,
            index,
            field: field.to_string(),
            id_field: id_field.to_string(),
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

    fn main_key(&self, id: &Value) -> Vec<Relation> {
        vec![Relation::eq(self.id_field.as_str(), id.clone())]
    }

    fn index_key(&self, value: &Value, id: &Value) -> Vec<Relation> {
        vec![
            Relation::eq(self.field.as_str(), value.clone()),
            Relation::eq(self.id_field.as_str(), id.clone()),
        ]
    }

    pub fn set<T: Record>(&self, value: &T) -> Op {
        match value.to_row() {
            Ok(row) => self.set_row(row),
            Err(e) => self.session.failed(e),
        }
    }

    /// Upsert the main row and its index copy.
    pub fn set_row(&self, row: Row) -> Op {
        self.query(&self.main, Action::Insert(row.clone()), Vec::new())
            .add(self.query(&self.index, Action::Insert(row), Vec::new()))
    }

    /// Apply `changes` to both copies. The indexed field itself cannot
    /// change here; write the row again under its new value instead.
    pub fn update(&self, value: impl Into<Value>, id: impl Into<Value>, changes: Changes) -> Op {
        let (value, id) = (value.into(), id.into());
        self.query(&self.main, Action::Update(changes.clone()), self.main_key(&id))
            .add(self.query(&self.index, Action::Update(changes), self.index_key(&value, &id)))
    }

    /// Remove the main row and its index entry.
    pub fn delete(&self, value: impl Into<Value>, id: impl Into<Value>) -> Op {
        let (value, id) = (value.into(), id.into());
        self.query(&self.main, Action::Delete, self.main_key(&id))
            .add(self.query(&self.index, Action::Delete, self.index_key(&value, &id)))
    }

    /// Remove every index entry under `value`. Main rows are kept.
    pub fn delete_all(&self, value: impl Into<Value>) -> Op {
        self.query(
            &self.index,
            Action::Delete,
            vec![Relation::eq(self.field.as_str(), value)],
        )
    }

    /// Rows under `value` in id order, strictly after `after` when given.
    pub fn list(&self, value: impl Into<Value>, after: Option<Value>, limit: Option<usize>) -> Op {
        let mut relations = vec![Relation::eq(self.field.as_str(), value)];
        if let Some(after) = after {
            relations.push(Relation::gt(self.id_field.as_str(), after));
        }
        let op = self.query(&self.index, Action::Select, relations);
        match limit {
            Some(n) => op.with_options(&Options::new().limit(n)),
            None => op,
        }
    }

    pub fn read(&self, value: impl Into<Value>, id: impl Into<Value>) -> Op {
        self.query(&self.index, Action::Select, self.index_key(&value.into(), &id.into()))
    }

    pub fn multi_read<V: Into<Value>>(&self, value: impl Into<Value>, ids: impl IntoIterator<Item = V>) -> Op {
        self.query(
            &self.index,
            Action::Select,
            vec![
                Relation::eq(self.field.as_str(), value),
                Relation::in_(self.id_field.as_str(), ids),
            ],
        )
    }
}

impl TableChanger for MultimapTable {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CqlType;
    use crate::error::CassaError;
    use crate::keyspace::KeySpace;
    use crate::memory::MemoryStore;
    use pretty_assertions::assert_eq;

    fn table() -> MultimapTable {
        KeySpace::new("app", Arc::new(MemoryStore::new()))
            .multimap_table(
                "posts",
                "author",
                "id",
                vec![
                    Column::new("id", CqlType::Text),
                    Column::new("author", CqlType::Text),
                    Column::new("title", CqlType::Text),
                ],
            )
            .unwrap()
    }

    #[test]
    fn test_write_plan_touches_both_tables() {
        let row = Row::from([
            ("id".to_string(), Value::from("p1")),
            ("author".to_string(), Value::from("ann")),
        ]);
        let stmts = table().set_row(row).generate_statements().unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].cql.starts_with("INSERT INTO app.posts_map_id "));
        assert!(stmts[1].cql.starts_with("INSERT INTO app.posts_multimap_author_id "));
    }

    #[test]
    fn test_list_continuation_is_exclusive() {
        let stmt = table()
            .list("ann", Some("p1".into()), Some(10))
            .generate_statement()
            .unwrap();
        assert_eq!(
            stmt.cql,
            "SELECT id, author, title FROM app.posts_multimap_author_id WHERE author = ? AND id > ? LIMIT 10"
        );
    }

    #[test]
    fn test_missing_index_field_fails_before_generation() {
        let row = Row::from([("id".to_string(), Value::from("p1"))]);
        let err = table().set_row(row).generate_statements().unwrap_err();
        assert!(matches!(err, CassaError::Validation(_)));
        assert!(err.to_string().contains("author"));
    }

    #[test]
    fn test_updating_indexed_field_rejected() {
        let err = table()
            .update("ann", "p1", Changes::new().set("author", "bob"))
            .preflight()
            .unwrap_err();
        assert!(matches!(err, CassaError::Generation(_)));
    }

    #[test]
    fn test_undeclared_index_field() {
        let err = KeySpace::new("app", Arc::new(MemoryStore::new()))
            .multimap_table("posts", "tag", "id", vec![Column::new("id", CqlType::Text)])
            .unwrap_err();
        assert!(matches!(err, CassaError::Validation(_)));
    }
}
