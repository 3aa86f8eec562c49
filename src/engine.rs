//! Executor boundary for cassa.
//!
//! The engine never talks to a store itself. It hands rendered statements to
//! a [`QueryExecutor`] and takes back rows. A driver adapter implements the
//! trait; [`MemoryStore`](crate::memory::MemoryStore) implements it for tests
//! and local tooling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::ast::Row;
use crate::error::BoxError;
use crate::options::Options;
use crate::transpiler::Statement;

/// Something that can run statements against a store.
///
/// Errors are opaque to cassa and are passed through unchanged.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a read and return its rows in store order.
    async fn query_with_options(&self, options: &Options, stmt: &Statement) -> Result<Vec<Row>, BoxError>;

    /// Run a single write.
    async fn execute_with_options(&self, options: &Options, stmt: &Statement) -> Result<(), BoxError>;

    /// Run every statement as one logged batch: all of them apply or none do.
    async fn execute_atomically_with_options(
        &self,
        options: &Options,
        stmts: &[Statement],
    ) -> Result<(), BoxError>;

    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>, BoxError> {
        self.query_with_options(&Options::default(), stmt).await
    }

    async fn execute(&self, stmt: &Statement) -> Result<(), BoxError> {
        self.execute_with_options(&Options::default(), stmt).await
    }

    async fn execute_atomically(&self, stmts: &[Statement]) -> Result<(), BoxError> {
        self.execute_atomically_with_options(&Options::default(), stmts).await
    }
}

#[async_trait]
impl<E: QueryExecutor + ?Sized> QueryExecutor for Arc<E> {
    async fn query_with_options(&self, options: &Options, stmt: &Statement) -> Result<Vec<Row>, BoxError> {
        (**self).query_with_options(options, stmt).await
    }

    async fn execute_with_options(&self, options: &Options, stmt: &Statement) -> Result<(), BoxError> {
        (**self).execute_with_options(options, stmt).await
    }

    async fn execute_atomically_with_options(
        &self,
        options: &Options,
        stmts: &[Statement],
    ) -> Result<(), BoxError> {
        (**self).execute_atomically_with_options(options, stmts).await
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancellation and deadline for one execution call.
///
/// Checked before the first dispatch and between statements. A statement
/// already handed to the executor is never recalled.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    cancel: CancelToken,
    deadline: Option<Instant>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Whether execution must stop before the next dispatch.
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
