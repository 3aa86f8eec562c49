//! # cassa
//!
//! Denormalization recipes for wide-column stores.
//!
//! A logical table (a map, a multimap, a time series) is laid out over one
//! or more physical tables. Every operation compiles into an [`Op`](op::Op):
//! an ordered list of CQL statements that can be inspected, merged with other
//! ops, and then run against any [`QueryExecutor`](engine::QueryExecutor).
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use cassa::prelude::*;
//!
//! let ks = KeySpace::new("shop", Arc::new(MemoryStore::new()));
//! let users = ks
//!     .map_table(
//!         "users",
//!         "id",
//!         vec![Column::new("id", CqlType::Text), Column::new("email", CqlType::Text)],
//!     )
//!     .unwrap();
//!
//! let row = Row::from([
//!     ("id".to_string(), Value::from("u1")),
//!     ("email".to_string(), Value::from("u1@example.com")),
//! ]);
//! let stmts = users.set_row(row).generate_statements().unwrap();
//! assert_eq!(stmts.len(), 1);
//! assert!(stmts[0].cql.starts_with("INSERT INTO shop.users_map_id"));
//! ```
//!
//! ## Recipes
//!
//! | Recipe | Read by |
//! |--------|---------|
//! | map | id |
//! | multimap | field value, then id |
//! | multimap multikey | several field values, then ids |
//! | time series | time range |
//! | multi time series | field value and time range |
//! | flex multi time series | any one of several fields and time range |

pub mod ast;
pub mod bucket;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod keyspace;
pub mod memory;
pub mod op;
pub mod options;
pub mod parser;
pub mod recipe;
pub mod schema;
pub mod transpiler;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::bucket::{Bucketer, FixedBucketer, MAX_BUCKETS_PER_LIST, buckets_between};
    pub use crate::codec::Record;
    pub use crate::config::Config;
    pub use crate::engine::{CancelToken, ExecContext, QueryExecutor};
    pub use crate::error::*;
    pub use crate::keyspace::{Filter, KeySpace, Session, Table, TableChanger};
    pub use crate::memory::MemoryStore;
    pub use crate::op::{Op, Outcome};
    pub use crate::options::*;
    pub use crate::recipe::*;
    pub use crate::schema::SchemaFile;
    pub use crate::transpiler::{Statement, ToCql};
}
