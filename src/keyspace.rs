//! Keyspace handle, raw tables and schema changes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::ast::{Action, Changes, Column, CqlType, Keys, Query, Relation, Row, TableDef, Value};
use crate::bucket::{Bucketer, FixedBucketer};
use crate::config::Config;
use crate::engine::QueryExecutor;
use crate::error::{CassaError, CassaResult};
use crate::op::Op;
use crate::options::Options;
use crate::recipe::{
    FlexMultiTimeSeriesTable, MapTable, MultiTimeSeriesTable, MultimapMkTable, MultimapTable,
    TimeSeriesTable,
};

/// What every table handle shares: where statements go and how they are
/// decorated.
#[derive(Clone)]
pub struct Session {
    pub(crate) keyspace: String,
    pub(crate) executor: Arc<dyn QueryExecutor>,
    pub(crate) debug: bool,
    pub(crate) options: Options,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("keyspace", &self.keyspace)
            .field("debug", &self.debug)
            .field("options", &self.options)
            .finish()
    }
}

impl Session {
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn op(&self) -> Op {
        Op::new(self.executor.clone()).debug(self.debug)
    }

    pub(crate) fn failed(&self, err: CassaError) -> Op {
        Op::failed(self.executor.clone(), err).debug(self.debug)
    }

    pub(crate) fn query(&self, table: &Arc<TableDef>, action: Action, relations: Vec<Relation>) -> Query {
        Query::new(table.clone(), action)
            .filter(relations)
            .with_options(&self.options)
    }

    pub(crate) fn with_options(&self, options: &Options) -> Session {
        Session {
            options: self.options.merge(options),
            ..self.clone()
        }
    }

    pub(crate) fn table_def(&self, name: &str, columns: Vec<Column>, keys: Keys) -> CassaResult<Arc<TableDef>> {
        Ok(Arc::new(TableDef::new(self.keyspace.clone(), name, columns, keys)?))
    }
}

/// Schema operations shared by raw tables and every recipe.
#[async_trait]
pub trait TableChanger: Send + Sync {
    /// Name of the primary physical table.
    fn name(&self) -> String;

    /// Every physical table behind this handle.
    fn physical_tables(&self) -> Vec<Arc<TableDef>>;

    fn session(&self) -> &Session;

    fn create_op(&self, if_not_exists: bool) -> Op {
        let session = self.session();
        self.physical_tables().iter().fold(session.op(), |op, t| {
            op.push(session.query(t, Action::Create { if_not_exists }, Vec::new()))
        })
    }

    fn drop_op(&self, if_exists: bool) -> Op {
        let session = self.session();
        self.physical_tables().iter().fold(session.op(), |op, t| {
            op.push(session.query(t, Action::Drop { if_exists }, Vec::new()))
        })
    }

    /// CREATE TABLE text, one line per physical table.
    fn create_statement(&self) -> CassaResult<String> {
        Ok(self.create_op(false).generate_statement()?.cql)
    }

    fn create_if_not_exist_statement(&self) -> CassaResult<String> {
        Ok(self.create_op(true).generate_statement()?.cql)
    }

    async fn create(&self) -> CassaResult<()> {
        self.create_op(false).run().await.map(drop)
    }

    async fn create_if_not_exist(&self) -> CassaResult<()> {
        self.create_op(true).run().await.map(drop)
    }

    /// Drop every physical table if present, then create them again.
    async fn recreate(&self) -> CassaResult<()> {
        self.drop_op(true).add(self.create_op(false)).run().await.map(drop)
    }
}

/// A handle on one keyspace.
#[derive(Debug, Clone)]
pub struct KeySpace {
    session: Session,
}

impl KeySpace {
    pub fn new(name: impl Into<String>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            session: Session {
                keyspace: name.into(),
                executor,
                debug: false,
                options: Options::default(),
            },
        }
    }

    /// Keyspace name, debug flag and default options from a loaded config.
    pub fn from_config(config: &Config, executor: Arc<dyn QueryExecutor>) -> Self {
        Self::new(config.keyspace.clone(), executor)
            .debug(config.debug)
            .with_defaults(config.defaults.to_options())
    }

    /// Log every dispatched statement at info level under `cassa::cql`.
    pub fn debug(mut self, debug: bool) -> Self {
        self.session.debug = debug;
        self
    }

    /// Defaults applied beneath every table's and op's own options.
    pub fn with_defaults(mut self, options: Options) -> Self {
        self.session.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.session.keyspace
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// A raw table with an explicit key layout.
    pub fn table(&self, name: &str, columns: Vec<Column>, keys: Keys) -> CassaResult<Table> {
        Ok(Table {
            def: self.session.table_def(name, columns, keys)?,
            session: self.session.clone(),
        })
    }

    pub fn map_table(&self, name: &str, id_field: &str, columns: Vec<Column>) -> CassaResult<MapTable> {
        MapTable::new(&self.session, name, id_field, columns)
    }

    pub fn multimap_table(
        &self,
        name: &str,
        index_field: &str,
        id_field: &str,
        columns: Vec<Column>,
    ) -> CassaResult<MultimapTable> {
        MultimapTable::new(&self.session, name, index_field, id_field, columns)
    }

    pub fn multimap_multikey_table(
        &self,
        name: &str,
        index_fields: &[&str],
        id_fields: &[&str],
        columns: Vec<Column>,
    ) -> CassaResult<MultimapMkTable> {
        MultimapMkTable::new(&self.session, name, index_fields, id_fields, columns)
    }

    pub fn timeseries_table(
        &self,
        name: &str,
        time_field: &str,
        id_field: &str,
        bucket_size: Duration,
        columns: Vec<Column>,
    ) -> CassaResult<TimeSeriesTable> {
        let bucketer = Arc::new(FixedBucketer::new(bucket_size)?);
        TimeSeriesTable::new(&self.session, name, time_field, id_field, bucketer, columns)
    }

    pub fn multi_timeseries_table(
        &self,
        name: &str,
        index_field: &str,
        time_field: &str,
        id_field: &str,
        bucket_size: Duration,
        columns: Vec<Column>,
    ) -> CassaResult<MultiTimeSeriesTable> {
        let bucketer = Arc::new(FixedBucketer::new(bucket_size)?);
        MultiTimeSeriesTable::new(&self.session, name, index_field, time_field, id_field, bucketer, columns)
    }

    pub fn flex_multi_timeseries_table(
        &self,
        name: &str,
        index_fields: &[&str],
        time_field: &str,
        id_field: &str,
        bucketer: Arc<dyn Bucketer>,
        columns: Vec<Column>,
    ) -> CassaResult<FlexMultiTimeSeriesTable> {
        FlexMultiTimeSeriesTable::new(&self.session, name, index_fields, time_field, id_field, bucketer, columns)
    }

    fn system_tables(&self) -> CassaResult<Arc<TableDef>> {
        Ok(Arc::new(TableDef::new(
            "system_schema",
            "tables",
            vec![
                Column::new("keyspace_name", CqlType::Text),
                Column::new("table_name", CqlType::Text),
            ],
            Keys::new(&["keyspace_name"], &["table_name"]),
        )?))
    }

    /// Names of every table in this keyspace.
    pub async fn tables(&self) -> CassaResult<Vec<String>> {
        let query = Query::new(self.system_tables()?, Action::Select)
            .filter(vec![Relation::eq("keyspace_name", self.name())])
            .with_options(&Options::new().select(["table_name"]));
        let outcome = self.session.op().push(query).run().await?;
        Ok(outcome
            .rows()
            .iter()
            .filter_map(|r| r.get("table_name").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    pub async fn exists(&self, table: &str) -> CassaResult<bool> {
        Ok(self.tables().await?.iter().any(|t| t == table))
    }
}

/// A table with a hand-written key layout and no recipe behind it.
#[derive(Debug, Clone)]
pub struct Table {
    def: Arc<TableDef>,
    session: Session,
}

impl Table {
    pub fn def(&self) -> &Arc<TableDef> {
        &self.def
    }

    pub fn with_options(&self, options: &Options) -> Table {
        Table {
            def: self.def.clone(),
            session: self.session.with_options(options),
        }
    }

    /// Upsert a whole row. Declared fields missing from `row` are cleared.
    pub fn set(&self, row: Row) -> Op {
        self.session
            .op()
            .push(self.session.query(&self.def, Action::Insert(row), Vec::new()))
    }

    pub fn filter(&self, relations: Vec<Relation>) -> Filter {
        Filter {
            table: self.clone(),
            relations,
        }
    }
}

impl TableChanger for Table {
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

/// A table plus relations. Partial partition keys are accepted for reads
/// only when `allow_filtering` is set.
#[derive(Debug, Clone)]
pub struct Filter {
    table: Table,
    relations: Vec<Relation>,
}

impl Filter {
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    fn op(&self, action: Action) -> Op {
        let session = &self.table.session;
        session
            .op()
            .push(session.query(&self.table.def, action, self.relations.clone()))
    }

    pub fn update(&self, changes: Changes) -> Op {
        self.op(Action::Update(changes))
    }

    pub fn delete(&self) -> Op {
        self.op(Action::Delete)
    }

    pub fn read(&self) -> Op {
        self.op(Action::Select)
    }

    /// Read at most one row.
    pub fn read_one(&self) -> Op {
        self.read().with_options(&Options::new().limit(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use pretty_assertions::assert_eq;

    fn keyspace() -> KeySpace {
        KeySpace::new("app", Arc::new(MemoryStore::new()))
    }

    fn people(ks: &KeySpace) -> Table {
        ks.table(
            "people",
            vec![
                Column::new("team", CqlType::Text),
                Column::new("id", CqlType::Text),
                Column::new("age", CqlType::Int),
            ],
            Keys::new(&["team"], &["id"]),
        )
        .unwrap()
    }

    fn person(team: &str, id: &str, age: i64) -> Row {
        Row::from([
            ("team".to_string(), Value::from(team)),
            ("id".to_string(), Value::from(id)),
            ("age".to_string(), Value::from(age)),
        ])
    }

    #[tokio::test]
    async fn test_raw_table_lifecycle() {
        let ks = keyspace();
        let t = people(&ks);
        t.create().await.unwrap();
        assert!(ks.exists("people").await.unwrap());

        t.set(person("red", "a", 30)).add(t.set(person("red", "b", 40))).run().await.unwrap();
        let rows = t.filter(vec![Relation::eq("team", "red")]).read().run().await.unwrap().rows();
        assert_eq!(rows.len(), 2);

        let one = t.filter(vec![Relation::eq("team", "red")]).read_one().run().await.unwrap();
        assert_eq!(one.len(), 1);

        t.filter(vec![Relation::eq("team", "red"), Relation::eq("id", "a")])
            .update(Changes::new().set("age", 31))
            .run()
            .await
            .unwrap();
        let rows = t
            .filter(vec![Relation::eq("team", "red"), Relation::eq("id", "a")])
            .read()
            .run()
            .await
            .unwrap()
            .rows();
        assert_eq!(rows[0]["age"], Value::Int(31));

        t.recreate().await.unwrap();
        let rows = t.filter(vec![Relation::eq("team", "red")]).read().run().await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_partial_partition_read_needs_filtering() {
        let ks = keyspace();
        let t = people(&ks);
        t.create().await.unwrap();
        t.set(person("red", "a", 30)).run().await.unwrap();

        let err = t.filter(vec![Relation::eq("id", "a")]).read().preflight().unwrap_err();
        assert!(matches!(err, CassaError::Generation(_)));

        let rows = t
            .with_options(&Options::new().allow_filtering(true))
            .filter(vec![Relation::eq("age", 30)])
            .read()
            .run()
            .await
            .unwrap()
            .rows();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_create_statement() {
        let ks = keyspace();
        assert_eq!(
            people(&ks).create_if_not_exist_statement().unwrap(),
            "CREATE TABLE IF NOT EXISTS app.people (team text, id text, age int, PRIMARY KEY ((team), id))"
        );
    }

    #[test]
    fn test_defaults_sit_beneath_table_options() {
        let ks = keyspace().with_defaults(Options::new().ttl(Duration::from_secs(60)));
        let t = people(&ks).with_options(&Options::new().ttl(Duration::from_secs(5)));
        let stmt = t.set(person("red", "a", 1)).generate_statement().unwrap();
        assert!(stmt.cql.ends_with("USING TTL 5"));
    }
}
