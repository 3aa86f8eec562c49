//! In-memory executor.
//!
//! `MemoryStore` parses the statements cassa generates and applies them to
//! partitions held in ordered maps, so recipes can be exercised end to end
//! without a cluster. TTL and write timestamps are parsed but not enforced.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::ast::{Column, CqlType, Operator, Relation, Row, Value};
use crate::engine::QueryExecutor;
use crate::error::{BoxError, CassaError};
use crate::options::{Options, SortOrder};
use crate::parser::{self, Cond, Cql, SetExpr, Target, Term};
use crate::transpiler::Statement;

type Key = Vec<Value>;

/// Failures raised by the in-memory store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Parse(#[from] CassaError),

    #[error("table {0} does not exist")]
    UnknownTable(String),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("undefined column '{column}' on {table}")]
    UnknownColumn { table: String, column: String },

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("injected failure on statement #{0}")]
    Injected(usize),
}

#[derive(Debug, Clone)]
struct MemTable {
    name: String,
    columns: Vec<Column>,
    partition: Vec<String>,
    clustering: Vec<String>,
    descending: bool,
    partitions: BTreeMap<Key, BTreeMap<Key, Row>>,
}

impl MemTable {
    fn column(&self, field: &str) -> Result<&Column, StoreError> {
        self.columns
            .iter()
            .find(|c| c.name == field)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: self.name.clone(),
                column: field.to_string(),
            })
    }

    fn is_key(&self, field: &str) -> bool {
        self.partition.iter().chain(&self.clustering).any(|k| k == field)
    }

    fn empty_row(&self) -> Row {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), Value::Null))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: BTreeMap<(String, String), MemTable>,
}

/// Binds positional parameters in textual order.
struct Binder<'a> {
    params: &'a [Value],
    next: usize,
}

impl<'a> Binder<'a> {
    fn new(params: &'a [Value]) -> Self {
        Self { params, next: 0 }
    }

    fn bind(&mut self, term: &Term) -> Result<Value, StoreError> {
        match term {
            Term::Literal(v) => Ok(v.clone()),
            Term::Param => {
                let v = self.params.get(self.next).cloned().ok_or_else(|| {
                    StoreError::Invalid(format!("missing bind value #{}", self.next + 1))
                })?;
                self.next += 1;
                Ok(v)
            }
        }
    }

    fn relations(&mut self, conds: &[Cond]) -> Result<Vec<Relation>, StoreError> {
        conds
            .iter()
            .map(|c| {
                Ok(Relation {
                    field: c.field.clone(),
                    op: c.op,
                    values: c.terms.iter().map(|t| self.bind(t)).collect::<Result<_, _>>()?,
                    rest: c.rest.clone(),
                })
            })
            .collect()
    }

    fn finish(&self) -> Result<(), StoreError> {
        if self.next == self.params.len() {
            Ok(())
        } else {
            Err(StoreError::Invalid(format!(
                "{} bind values supplied, {} used",
                self.params.len(),
                self.next
            )))
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Every key tuple pinned by equality or IN relations, or `None` when some
/// key column is unpinned.
fn pinned(keys: &[String], rels: &[Relation]) -> Result<Option<Vec<Key>>, StoreError> {
    let mut out: Vec<Key> = vec![Vec::new()];
    for k in keys {
        let rel = match rels
            .iter()
            .find(|r| &r.field == k && !r.is_tuple() && matches!(r.op, Operator::Eq | Operator::In))
        {
            Some(r) => r,
            None => return Ok(None),
        };
        if rel.values.iter().any(Value::is_null) {
            return Err(StoreError::Invalid(format!("null value for key column '{}'", k)));
        }
        out = out
            .into_iter()
            .flat_map(|prefix| {
                rel.values.iter().map(move |v| {
                    let mut key = prefix.clone();
                    key.push(v.clone());
                    key
                })
            })
            .collect();
    }
    Ok(Some(out))
}

fn matches_all(row: &Row, rels: &[Relation]) -> bool {
    rels.iter().all(|r| r.matches(row))
}

fn project(row: &Row, columns: &Option<Vec<String>>) -> Row {
    match columns {
        None => row.clone(),
        Some(cols) => cols
            .iter()
            .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
            .collect(),
    }
}

fn qualified(target: &Target) -> String {
    match &target.keyspace {
        Some(ks) => format!("{}.{}", ks, target.table),
        None => target.table.clone(),
    }
}

fn table_key(target: &Target) -> (String, String) {
    (target.keyspace.clone().unwrap_or_default(), target.table.clone())
}

impl State {
    fn table(&self, target: &Target) -> Result<&MemTable, StoreError> {
        self.tables
            .get(&table_key(target))
            .ok_or_else(|| StoreError::UnknownTable(qualified(target)))
    }

    fn table_mut(&mut self, target: &Target) -> Result<&mut MemTable, StoreError> {
        self.tables
            .get_mut(&table_key(target))
            .ok_or_else(|| StoreError::UnknownTable(qualified(target)))
    }

    fn apply(&mut self, stmt: &Statement) -> Result<Vec<Row>, StoreError> {
        let cql = parser::parse_statement(&stmt.cql)?;
        let mut binder = Binder::new(&stmt.params);
        let rows = match cql {
            Cql::CreateTable {
                if_not_exists,
                target,
                columns,
                partition,
                clustering,
                order,
                ..
            } => {
                let key = table_key(&target);
                if self.tables.contains_key(&key) {
                    if !if_not_exists {
                        return Err(StoreError::TableExists(qualified(&target)));
                    }
                } else {
                    let descending = matches!(
                        (clustering.first(), order.first()),
                        (Some(first), Some((col, SortOrder::Desc))) if first == col
                    );
                    self.tables.insert(
                        key,
                        MemTable {
                            name: qualified(&target),
                            columns,
                            partition,
                            clustering,
                            descending,
                            partitions: BTreeMap::new(),
                        },
                    );
                }
                Vec::new()
            }
            Cql::DropTable { if_exists, target } => {
                if self.tables.remove(&table_key(&target)).is_none() && !if_exists {
                    return Err(StoreError::UnknownTable(qualified(&target)));
                }
                Vec::new()
            }
            Cql::Insert {
                target,
                columns,
                values,
                ..
            } => {
                if columns.len() != values.len() {
                    return Err(StoreError::Invalid(format!(
                        "{} columns but {} values",
                        columns.len(),
                        values.len()
                    )));
                }
                let table = self.table_mut(&target)?;
                let mut row = table.empty_row();
                for (col, term) in columns.iter().zip(&values) {
                    table.column(col)?;
                    row.insert(col.clone(), binder.bind(term)?);
                }
                let pk = key_of(&row, &table.partition)?;
                let ck = key_of(&row, &table.clustering)?;
                table.partitions.entry(pk).or_default().insert(ck, row);
                Vec::new()
            }
            Cql::Update {
                target,
                assignments,
                conditions,
                ..
            } => {
                let mut bound = Vec::with_capacity(assignments.len());
                for (field, expr) in &assignments {
                    let expr = match expr {
                        SetExpr::Assign(t) => Change::Assign(binder.bind(t)?),
                        SetExpr::Add(t) => Change::Add(binder.bind(t)?),
                        SetExpr::Prepend(t) => Change::Prepend(binder.bind(t)?),
                        SetExpr::Subtract(t) => Change::Subtract(binder.bind(t)?),
                        SetExpr::MapEntry(k, v) => Change::MapEntry(binder.bind(k)?, binder.bind(v)?),
                    };
                    bound.push((field.clone(), expr));
                }
                let rels = binder.relations(&conditions)?;
                let table = self.table_mut(&target)?;
                let keys = full_keys(table, &rels)?;
                for (pk, ck) in keys {
                    let base = table.empty_row();
                    let partition = table.partitions.entry(pk.clone()).or_default();
                    let row = partition.entry(ck.clone()).or_insert_with(|| {
                        let mut row = base;
                        for (name, v) in table.partition.iter().zip(&pk) {
                            row.insert(name.clone(), v.clone());
                        }
                        for (name, v) in table.clustering.iter().zip(&ck) {
                            row.insert(name.clone(), v.clone());
                        }
                        row
                    });
                    for (field, change) in &bound {
                        let col = table
                            .columns
                            .iter()
                            .find(|c| &c.name == field)
                            .ok_or_else(|| StoreError::UnknownColumn {
                                table: table.name.clone(),
                                column: field.clone(),
                            })?;
                        let old = row.get(field).cloned().unwrap_or(Value::Null);
                        row.insert(field.clone(), change.apply(&col.ty, old)?);
                    }
                }
                Vec::new()
            }
            Cql::Delete {
                target, conditions, ..
            } => {
                let rels = binder.relations(&conditions)?;
                let table = self.table_mut(&target)?;
                let pks = pinned(&table.partition, &rels)?.ok_or_else(|| {
                    StoreError::Invalid(format!("delete on {} needs the full partition key", table.name))
                })?;
                let row_rels: Vec<Relation> = rels
                    .into_iter()
                    .filter(|r| !table.partition.contains(&r.field))
                    .collect();
                for pk in pks {
                    if row_rels.is_empty() {
                        table.partitions.remove(&pk);
                    } else if let Some(part) = table.partitions.get_mut(&pk) {
                        part.retain(|_, row| !matches_all(row, &row_rels));
                        if part.is_empty() {
                            table.partitions.remove(&pk);
                        }
                    }
                }
                Vec::new()
            }
            Cql::Select {
                columns,
                target,
                conditions,
                limit,
                allow_filtering,
            } => {
                let rels = binder.relations(&conditions)?;
                if target.keyspace.as_deref() == Some("system_schema") && target.table == "tables" {
                    self.system_tables(&rels, &columns, limit)
                } else {
                    self.select(&target, &rels, &columns, limit, allow_filtering)?
                }
            }
        };
        binder.finish()?;
        Ok(rows)
    }

    fn select(
        &self,
        target: &Target,
        rels: &[Relation],
        columns: &Option<Vec<String>>,
        limit: Option<usize>,
        allow_filtering: bool,
    ) -> Result<Vec<Row>, StoreError> {
        let table = self.table(target)?;
        for col in rels.iter().flat_map(Relation::columns) {
            table.column(col)?;
            if !allow_filtering && !table.is_key(col) {
                return Err(StoreError::Invalid(format!(
                    "predicate on non-key column '{}' requires ALLOW FILTERING",
                    col
                )));
            }
        }
        if let Some(cols) = columns {
            for c in cols {
                table.column(c)?;
            }
        }
        let parts: Vec<&BTreeMap<Key, Row>> = match pinned(&table.partition, rels)? {
            Some(pks) => pks.iter().filter_map(|pk| table.partitions.get(pk)).collect(),
            None if allow_filtering => table.partitions.values().collect(),
            None => {
                return Err(StoreError::Invalid(format!(
                    "read on {} needs the full partition key",
                    table.name
                )));
            }
        };
        let mut out = Vec::new();
        for part in parts {
            let rows: Box<dyn Iterator<Item = &Row>> = if table.descending {
                Box::new(part.values().rev())
            } else {
                Box::new(part.values())
            };
            out.extend(rows.filter(|row| matches_all(row, rels)).map(|row| project(row, columns)));
        }
        if let Some(n) = limit {
            out.truncate(n);
        }
        Ok(out)
    }

    fn system_tables(&self, rels: &[Relation], columns: &Option<Vec<String>>, limit: Option<usize>) -> Vec<Row> {
        let mut out: Vec<Row> = self
            .tables
            .keys()
            .map(|(ks, name)| {
                Row::from([
                    ("keyspace_name".to_string(), Value::from(ks)),
                    ("table_name".to_string(), Value::from(name)),
                ])
            })
            .filter(|row| matches_all(row, rels))
            .map(|row| project(&row, columns))
            .collect();
        if let Some(n) = limit {
            out.truncate(n);
        }
        out
    }
}

fn key_of(row: &Row, keys: &[String]) -> Result<Key, StoreError> {
    keys.iter()
        .map(|k| match row.get(k) {
            Some(v) if !v.is_null() => Ok(v.clone()),
            _ => Err(StoreError::Invalid(format!("missing value for key column '{}'", k))),
        })
        .collect()
}

fn full_keys(table: &MemTable, rels: &[Relation]) -> Result<Vec<(Key, Key)>, StoreError> {
    let incomplete = || StoreError::Invalid(format!("update on {} must pin the whole primary key", table.name));
    let pks = pinned(&table.partition, rels)?.ok_or_else(incomplete)?;
    let cks = pinned(&table.clustering, rels)?.ok_or_else(incomplete)?;
    Ok(pks
        .iter()
        .flat_map(|pk| cks.iter().map(move |ck| (pk.clone(), ck.clone())))
        .collect())
}

enum Change {
    Assign(Value),
    Add(Value),
    Prepend(Value),
    Subtract(Value),
    MapEntry(Value, Value),
}

impl Change {
    fn apply(&self, ty: &CqlType, old: Value) -> Result<Value, StoreError> {
        let mismatch = || StoreError::Invalid(format!("operation does not apply to column type {}", ty));
        match (self, ty, old) {
            (Change::Assign(v), _, _) => Ok(v.clone()),
            (Change::Add(Value::Int(n)), CqlType::Counter, old) => Ok(Value::Int(old.as_i64().unwrap_or(0) + n)),
            (Change::Subtract(Value::Int(n)), CqlType::Counter, old) => Ok(Value::Int(old.as_i64().unwrap_or(0) - n)),
            (Change::Add(Value::List(items)), CqlType::List(_), old) => {
                let mut list = into_list(old);
                list.extend(items.iter().cloned());
                Ok(Value::List(list))
            }
            (Change::Prepend(Value::List(items)), CqlType::List(_), old) => {
                let mut list = items.clone();
                list.extend(into_list(old));
                Ok(Value::List(list))
            }
            (Change::Subtract(Value::List(items)), CqlType::List(_), old) => {
                let mut list = into_list(old);
                list.retain(|v| !items.contains(v));
                Ok(Value::List(list))
            }
            (Change::MapEntry(Value::Text(k), v), CqlType::Map(_), old) => {
                let mut map = match old {
                    Value::Map(m) => m,
                    _ => BTreeMap::new(),
                };
                map.insert(k.clone(), v.clone());
                Ok(Value::Map(map))
            }
            _ => Err(mismatch()),
        }
    }
}

fn into_list(v: Value) -> Vec<Value> {
    match v {
        Value::List(items) => items,
        _ => Vec::new(),
    }
}

/// A process-local store for tests and tooling.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    log: Mutex<Vec<Statement>>,
    dispatched: AtomicUsize,
    fail_at: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th statement dispatched from now on (1-based).
    pub fn fail_on(&self, n: usize) {
        let base = self.dispatched.load(Ordering::SeqCst);
        self.fail_at.store(base + n, Ordering::SeqCst);
    }

    /// Every statement handed to this store so far, failed ones included.
    pub fn statements(&self) -> Vec<Statement> {
        lock(&self.log).clone()
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Stored rows of one table in partition then clustering order.
    pub fn rows(&self, keyspace: &str, table: &str) -> Vec<Row> {
        let state = lock(&self.state);
        state
            .tables
            .get(&(keyspace.to_string(), table.to_string()))
            .map(|t| t.partitions.values().flat_map(|p| p.values().cloned()).collect())
            .unwrap_or_default()
    }

    fn dispatch(&self, stmt: &Statement) -> Result<(), StoreError> {
        lock(&self.log).push(stmt.clone());
        let n = self.dispatched.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at.load(Ordering::SeqCst) == n {
            return Err(StoreError::Injected(n));
        }
        Ok(())
    }
}

#[async_trait]
impl QueryExecutor for MemoryStore {
    async fn query_with_options(&self, _options: &Options, stmt: &Statement) -> Result<Vec<Row>, BoxError> {
        self.dispatch(stmt)?;
        Ok(lock(&self.state).apply(stmt)?)
    }

    async fn execute_with_options(&self, _options: &Options, stmt: &Statement) -> Result<(), BoxError> {
        self.dispatch(stmt)?;
        lock(&self.state).apply(stmt)?;
        Ok(())
    }

    async fn execute_atomically_with_options(
        &self,
        _options: &Options,
        stmts: &[Statement],
    ) -> Result<(), BoxError> {
        for stmt in stmts {
            self.dispatch(stmt)?;
        }
        let mut state = lock(&self.state);
        let mut staged = state.clone();
        for stmt in stmts {
            staged.apply(stmt)?;
        }
        *state = staged;
        Ok(())
    }
}
