//! The Op engine: composable units of work over one executor.
//!
//! An [`Op`] is an ordered list of structured queries. Nothing is rendered
//! until [`Op::preflight`], [`Op::generate_statements`] or one of the run
//! methods asks for it, and nothing is dispatched until every query in the
//! op has rendered successfully.

use std::fmt;
use std::sync::Arc;

use tracing::{info, trace, warn};

use crate::ast::{Query, Row};
use crate::codec::Record;
use crate::engine::{ExecContext, QueryExecutor};
use crate::error::{CassaError, CassaResult};
use crate::options::Options;
use crate::transpiler::{Statement, ToCql};

#[derive(Debug)]
enum Step {
    Query(Query),
    /// A recipe input that could not become a query. Reported at preflight.
    Invalid(CassaError),
}

impl Clone for Step {
    fn clone(&self) -> Self {
        match self {
            Step::Query(q) => Step::Query(q.clone()),
            Step::Invalid(e) => Step::Invalid(replay(e)),
        }
    }
}

fn replay(err: &CassaError) -> CassaError {
    match err {
        CassaError::Validation(m) => CassaError::Validation(m.clone()),
        CassaError::Generation(m) => CassaError::Generation(m.clone()),
        CassaError::Codec(m) => CassaError::Codec(m.clone()),
        other => CassaError::Validation(other.to_string()),
    }
}

/// A transient unit of work: one or more statements, run once or many times.
#[derive(Clone)]
pub struct Op {
    steps: Vec<Step>,
    executor: Arc<dyn QueryExecutor>,
    debug: bool,
    merge_by: Option<String>,
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Op")
            .field("steps", &self.steps)
            .field("debug", &self.debug)
            .field("merge_by", &self.merge_by)
            .finish()
    }
}

impl Op {
    /// An empty op. Running it fails preflight until a query is pushed.
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            steps: Vec::new(),
            executor,
            debug: false,
            merge_by: None,
        }
    }

    pub fn push(mut self, query: Query) -> Self {
        self.steps.push(Step::Query(query));
        self
    }

    /// An op that fails preflight with `err`.
    pub(crate) fn failed(executor: Arc<dyn QueryExecutor>, err: CassaError) -> Self {
        let mut op = Self::new(executor);
        op.steps.push(Step::Invalid(err));
        op
    }

    pub(crate) fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Merge read results across statements by this field, ascending.
    pub(crate) fn merge_by(mut self, field: impl Into<String>) -> Self {
        self.merge_by = Some(field.into());
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn has_reads(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s, Step::Query(q) if q.action.is_read()))
    }

    /// Concatenate `other`'s statements after this op's, keeping each
    /// statement's own options.
    pub fn add(mut self, other: Op) -> Op {
        self.merge_by = match (self.merge_by.take(), other.merge_by.clone()) {
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(a), None) if !other.has_reads() => Some(a),
            (None, Some(b)) if !self.has_reads() => Some(b),
            _ => None,
        };
        self.debug |= other.debug;
        self.steps.extend(other.steps);
        self
    }

    pub fn add_all(self, others: impl IntoIterator<Item = Op>) -> Op {
        others.into_iter().fold(self, Op::add)
    }

    /// A derived op whose every statement carries `options` on top of its own.
    pub fn with_options(&self, options: &Options) -> Op {
        let mut op = self.clone();
        for step in &mut op.steps {
            if let Step::Query(q) = step {
                q.options = q.options.merge(options);
            }
        }
        op
    }

    /// Validate every statement without rendering or dispatching anything.
    pub fn preflight(&self) -> CassaResult<()> {
        if self.steps.is_empty() {
            return Err(CassaError::validation("op has no statements"));
        }
        for step in &self.steps {
            match step {
                Step::Query(q) => q.validate()?,
                Step::Invalid(e) => return Err(replay(e)),
            }
        }
        Ok(())
    }

    fn queries(&self) -> CassaResult<Vec<&Query>> {
        self.preflight()?;
        Ok(self
            .steps
            .iter()
            .filter_map(|s| match s {
                Step::Query(q) => Some(q),
                Step::Invalid(_) => None,
            })
            .collect())
    }

    /// Render every statement, in order.
    pub fn generate_statements(&self) -> CassaResult<Vec<Statement>> {
        self.queries()?.into_iter().map(|q| q.to_cql()).collect()
    }

    /// Render the whole op as one statement: text joined by newlines,
    /// parameters concatenated.
    pub fn generate_statement(&self) -> CassaResult<Statement> {
        let stmts = self.generate_statements()?;
        let cql = stmts.iter().map(|s| s.cql.as_str()).collect::<Vec<_>>().join("\n");
        let params = stmts.into_iter().flat_map(|s| s.params).collect();
        Ok(Statement { cql, params })
    }

    fn log(&self, stmt: &Statement) {
        trace!(cql = %stmt.cql, params = stmt.params.len(), "dispatching statement");
        if self.debug {
            info!(target: "cassa::cql", "{}", stmt.cql);
        }
    }

    pub async fn run(&self) -> CassaResult<Outcome> {
        self.run_with(&ExecContext::new()).await
    }

    /// Run statements one at a time, in order.
    ///
    /// A failure part-way leaves the earlier statements applied; the error
    /// reports how many.
    pub async fn run_with(&self, ctx: &ExecContext) -> CassaResult<Outcome> {
        let queries = self.queries()?;
        let stmts = queries
            .iter()
            .map(|q| q.to_cql())
            .collect::<CassaResult<Vec<_>>>()?;

        let mut outcome = Outcome {
            results: Vec::new(),
            merge_by: self.merge_by.clone(),
            limit: self.merge_by.as_ref().and_then(|_| merged_limit(&queries)),
            table: queries
                .iter()
                .find(|q| q.action.is_read())
                .map(|q| q.table.name.clone())
                .unwrap_or_default(),
        };

        for (applied, (query, stmt)) in queries.iter().zip(&stmts).enumerate() {
            if ctx.is_done() {
                if applied > 0 {
                    warn!(applied, "execution cancelled after partial application");
                }
                return Err(CassaError::Cancelled { applied });
            }
            self.log(stmt);
            let result = if query.action.is_read() {
                self.executor
                    .query_with_options(&query.options, stmt)
                    .await
                    .map(|rows| outcome.results.push(rows))
            } else {
                self.executor.execute_with_options(&query.options, stmt).await
            };
            if let Err(source) = result {
                if applied > 0 {
                    warn!(applied, statement = %stmt.cql, error = %source, "statement failed after partial application");
                }
                return Err(CassaError::Execution {
                    applied,
                    statement: stmt.cql.clone(),
                    source,
                });
            }
        }
        Ok(outcome)
    }

    pub async fn run_atomically(&self) -> CassaResult<()> {
        self.run_atomically_with(&ExecContext::new()).await
    }

    /// Submit every statement as one logged batch.
    pub async fn run_atomically_with(&self, ctx: &ExecContext) -> CassaResult<()> {
        let queries = self.queries()?;
        if let Some(q) = queries.iter().find(|q| q.action.is_read()) {
            return Err(CassaError::generation(format!(
                "read on '{}' cannot run inside an atomic batch",
                q.table.name
            )));
        }
        let stmts = queries
            .iter()
            .map(|q| q.to_cql())
            .collect::<CassaResult<Vec<_>>>()?;
        let options = queries
            .iter()
            .fold(Options::default(), |acc, q| acc.merge(&q.options));

        if ctx.is_done() {
            return Err(CassaError::Cancelled { applied: 0 });
        }
        for stmt in &stmts {
            self.log(stmt);
        }
        self.executor
            .execute_atomically_with_options(&options, &stmts)
            .await
            .map_err(|source| CassaError::Batch {
                statements: stmts.len(),
                source,
            })
    }
}

/// Cap for a merged read: each statement returns its first `n` rows in merge
/// order, so the first `n` of the union are the answer. Unbounded if any read is.
fn merged_limit(queries: &[&Query]) -> Option<usize> {
    queries
        .iter()
        .filter(|q| q.action.is_read())
        .map(|q| q.options.limit)
        .try_fold(0, |cap, limit| Some(cap.max(limit?)))
}

/// Rows returned by the reads of one run, one result set per read statement.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    results: Vec<Vec<Row>>,
    merge_by: Option<String>,
    limit: Option<usize>,
    table: String,
}

impl Outcome {
    pub fn results(&self) -> &[Vec<Row>] {
        &self.results
    }

    /// Every row, flattened. Time-ordered ops come back merged in
    /// non-decreasing order of their time column, cut to the read limit.
    pub fn rows(&self) -> Vec<Row> {
        let mut rows: Vec<Row> = self.results.iter().flatten().cloned().collect();
        if let Some(field) = &self.merge_by {
            rows.sort_by(|a, b| a.get(field).cmp(&b.get(field)));
        }
        if let Some(n) = self.limit {
            rows.truncate(n);
        }
        rows
    }

    pub fn len(&self) -> usize {
        let total = self.results.iter().map(Vec::len).sum();
        self.limit.map_or(total, |n| total.min(n))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode the first row.
    pub fn one<T: Record>(&self) -> CassaResult<T> {
        match self.rows().first() {
            Some(row) => T::from_row(row),
            None => Err(CassaError::RowNotFound {
                table: self.table.clone(),
            }),
        }
    }

    pub fn all<T: Record>(&self) -> CassaResult<Vec<T>> {
        self.rows().iter().map(T::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Action, Column, CqlType, Keys, Relation, TableDef, Value};
    use crate::memory::MemoryStore;
    use pretty_assertions::assert_eq;

    fn table() -> Arc<TableDef> {
        Arc::new(
            TableDef::new(
                "ks",
                "kv",
                vec![Column::new("k", CqlType::Text), Column::new("v", CqlType::Int)],
                Keys::new(&["k"], &[]),
            )
            .unwrap(),
        )
    }

    fn put(k: &str, v: i64) -> Query {
        let mut row = Row::new();
        row.insert("k".into(), k.into());
        row.insert("v".into(), v.into());
        Query::new(table(), Action::Insert(row))
    }

    fn store() -> Arc<dyn QueryExecutor> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_add_keeps_order() {
        let exec = store();
        let a = Op::new(exec.clone()).push(put("a", 1));
        let b = Op::new(exec).push(put("b", 2));
        let stmts = a.add(b).generate_statements().unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].params[0], Value::from("a"));
        assert_eq!(stmts[1].params[0], Value::from("b"));
    }

    #[test]
    fn test_with_options_leaves_original_alone() {
        let op = Op::new(store()).push(put("a", 1));
        let derived = op.with_options(&Options::new().ttl(std::time::Duration::from_secs(5)));
        assert!(derived.generate_statement().unwrap().cql.ends_with("USING TTL 5"));
        assert!(!op.generate_statement().unwrap().cql.contains("USING"));
    }

    #[test]
    fn test_empty_op_fails_preflight() {
        let err = Op::new(store()).preflight().unwrap_err();
        assert!(matches!(err, CassaError::Validation(_)));
    }

    #[test]
    fn test_deferred_error_survives_clone() {
        let op = Op::failed(store(), CassaError::generation("bad"));
        let copy = op.clone();
        assert!(matches!(copy.preflight(), Err(CassaError::Generation(_))));
    }

    #[tokio::test]
    async fn test_atomic_rejects_reads() {
        let exec = store();
        let read = Query::new(table(), Action::Select).filter(vec![Relation::eq("k", "a")]);
        let err = Op::new(exec.clone())
            .push(put("a", 1))
            .push(read)
            .run_atomically()
            .await
            .unwrap_err();
        assert!(matches!(err, CassaError::Generation(_)));
    }
}
