//! CQL transpiler for cassa queries.
//!
//! Converts structured [`Query`] values into statement text plus positional
//! parameters. Validation happens here too, so nothing reaches an executor
//! unless it renders.

use crate::ast::*;
use crate::error::{CassaError, CassaResult};
use crate::options::{Options, SortOrder};

/// CQL reserved words that must be quoted when used as identifiers.
pub const RESERVED_WORDS: &[&str] = &[
    "add", "allow", "alter", "and", "apply", "asc", "authorize", "batch", "begin", "by",
    "columnfamily", "create", "delete", "desc", "describe", "drop", "entries", "execute",
    "from", "full", "grant", "if", "in", "index", "infinity", "insert", "into", "keyspace",
    "limit", "modify", "nan", "norecursive", "not", "null", "of", "on", "or", "order",
    "primary", "rename", "replace", "revoke", "schema", "select", "set", "table", "to",
    "token", "truncate", "unlogged", "update", "use", "using", "view", "where", "with",
];

/// Quote an identifier if CQL would otherwise reject or case-fold it.
pub fn escape_identifier(name: &str) -> String {
    let lower = name.to_lowercase();
    let needs_quoting = RESERVED_WORDS.contains(&lower.as_str())
        || lower != name
        || name.is_empty()
        || name.chars().any(|c| !c.is_alphanumeric() && c != '_')
        || name.chars().next().map(|c| c.is_numeric()).unwrap_or(false);

    if needs_quoting {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

/// A rendered statement and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cql: String,
    pub params: Vec<Value>,
}

/// Trait for converting AST nodes to CQL.
pub trait ToCql {
    /// Validate and render this node.
    fn to_cql(&self) -> CassaResult<Statement>;
}

impl ToCql for Query {
    fn to_cql(&self) -> CassaResult<Statement> {
        self.validate()?;
        let mut params = Vec::new();
        let cql = match &self.action {
            Action::Select => self.to_select_cql(&mut params),
            Action::Insert(row) => self.to_insert_cql(row, &mut params),
            Action::Update(changes) => self.to_update_cql(changes, &mut params),
            Action::Delete => self.to_delete_cql(&mut params),
            Action::Create { if_not_exists } => create_table_cql(&self.table, &self.options, *if_not_exists)?,
            Action::Drop { if_exists } => format!(
                "DROP TABLE {}{}",
                if *if_exists { "IF EXISTS " } else { "" },
                self.table.qualified_name()
            ),
        };
        Ok(Statement { cql, params })
    }
}

impl Query {
    /// Run every structural check for this query without rendering it.
    pub fn validate(&self) -> CassaResult<()> {
        self.check_relations()?;
        match &self.action {
            Action::Select => {
                if self.options.allow_filtering != Some(true) {
                    self.check_partition(true)?;
                }
                if let Some(cols) = &self.options.select {
                    for col in cols {
                        self.known(col)?;
                    }
                }
                Ok(())
            }
            Action::Insert(row) => self.check_insert(row),
            Action::Update(changes) => {
                self.check_partition(true)?;
                self.check_clustering_complete()?;
                self.check_changes(changes)
            }
            Action::Delete => self.check_partition(true),
            Action::Create { .. } | Action::Drop { .. } => Ok(()),
        }
    }

    fn known(&self, field: &str) -> CassaResult<&Column> {
        self.table.column(field).ok_or_else(|| {
            CassaError::generation(format!(
                "field '{}' is not declared on table '{}'",
                field, self.table.name
            ))
        })
    }

    fn check_relations(&self) -> CassaResult<()> {
        for rel in &self.relations {
            for col in rel.columns() {
                self.known(col)?;
            }
            if rel.is_tuple() {
                self.check_tuple(rel)?;
                continue;
            }
            if rel.values.is_empty() {
                return Err(CassaError::validation(format!(
                    "relation on '{}' has no values",
                    rel.field
                )));
            }
            if rel.op.is_range() && self.table.is_partition_key(&rel.field) {
                return Err(CassaError::generation(format!(
                    "range predicate on partition key '{}'",
                    rel.field
                )));
            }
        }
        Ok(())
    }

    fn check_tuple(&self, rel: &Relation) -> CassaResult<()> {
        let columns: Vec<&str> = rel.columns().collect();
        if rel.op == Operator::In {
            return Err(CassaError::generation(format!(
                "IN is not supported on column tuple ({})",
                columns.join(", ")
            )));
        }
        if rel.values.len() != columns.len() {
            return Err(CassaError::validation(format!(
                "tuple ({}) has {} column(s) but {} value(s)",
                columns.join(", "),
                columns.len(),
                rel.values.len()
            )));
        }
        if let Some(col) = columns.iter().find(|c| !self.table.is_clustering_column(c)) {
            return Err(CassaError::generation(format!(
                "tuple predicate on '{}', which is not a clustering column",
                col
            )));
        }
        Ok(())
    }

    fn pins(&self, field: &str) -> bool {
        self.relations
            .iter()
            .any(|r| r.field == field && !r.is_tuple() && matches!(r.op, Operator::Eq | Operator::In))
    }

    fn check_partition(&self, require: bool) -> CassaResult<()> {
        let table = &self.table;
        let any_partition = self.relations.iter().any(|r| table.is_partition_key(&r.field));
        if !any_partition {
            if let Some(rel) = self.relations.iter().find(|r| table.is_clustering_column(&r.field)) {
                return Err(CassaError::generation(format!(
                    "clustering predicate on '{}' without a partition predicate",
                    rel.field
                )));
            }
        }
        let missing: Vec<&str> = table
            .partition()
            .iter()
            .filter(|k| !self.pins(k))
            .map(|k| k.as_str())
            .collect();
        if require && !missing.is_empty() {
            return Err(CassaError::validation(format!(
                "{} on '{}' does not resolve a full partition key (missing: {})",
                self.action.name(),
                table.name,
                missing.join(", ")
            )));
        }
        Ok(())
    }

    fn check_clustering_complete(&self) -> CassaResult<()> {
        let missing: Vec<&str> = self
            .table
            .clustering()
            .iter()
            .filter(|k| !self.pins(k))
            .map(|k| k.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CassaError::validation(format!(
                "update on '{}' must pin every clustering column (missing: {})",
                self.table.name,
                missing.join(", ")
            )))
        }
    }

    fn check_insert(&self, row: &Row) -> CassaResult<()> {
        for (field, value) in row {
            let col = self.known(field)?;
            if col.ty == CqlType::Counter && !value.is_null() {
                return Err(CassaError::generation(format!(
                    "counter column '{}' can only be changed by an update",
                    field
                )));
            }
        }
        let table = &self.table;
        for key in table.partition().iter().chain(table.clustering()) {
            match row.get(key) {
                Some(v) if !v.is_null() => {}
                _ => {
                    return Err(CassaError::validation(format!(
                        "write to '{}' is missing key field '{}'",
                        table.name, key
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_changes(&self, changes: &Changes) -> CassaResult<()> {
        if changes.is_empty() {
            return Err(CassaError::validation(format!(
                "update on '{}' has no changes",
                self.table.name
            )));
        }
        for (field, assign) in changes.iter() {
            let col = self.known(field)?;
            if self.table.is_key(field) {
                return Err(CassaError::generation(format!(
                    "key column '{}' cannot be updated; write the row again instead",
                    field
                )));
            }
            let fits = match (assign, &col.ty) {
                (Assign::Value(_), CqlType::Counter) => false,
                (Assign::Value(_), _) => true,
                (Assign::Modify(Modifier::CounterIncrement(_)), CqlType::Counter) => true,
                (
                    Assign::Modify(
                        Modifier::ListAppend(_) | Modifier::ListPrepend(_) | Modifier::ListRemove(_),
                    ),
                    CqlType::List(_),
                ) => true,
                (Assign::Modify(Modifier::MapSetField(..)), CqlType::Map(_)) => true,
                _ => false,
            };
            if !fits {
                return Err(CassaError::generation(format!(
                    "assignment to '{}' does not fit column type {}",
                    field, col.ty
                )));
            }
        }
        Ok(())
    }

    /// Generate SELECT CQL.
    fn to_select_cql(&self, params: &mut Vec<Value>) -> String {
        let columns: Vec<String> = match &self.options.select {
            Some(cols) => cols.iter().map(|c| escape_identifier(c)).collect(),
            None => self.table.columns.iter().map(|c| escape_identifier(&c.name)).collect(),
        };
        let mut cql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            self.table.qualified_name()
        );
        push_where(&mut cql, &self.relations, params);
        if let Some(n) = self.options.limit {
            cql.push_str(&format!(" LIMIT {}", n));
        }
        if self.options.allow_filtering == Some(true) {
            cql.push_str(" ALLOW FILTERING");
        }
        cql
    }

    /// Generate INSERT CQL covering every declared column.
    fn to_insert_cql(&self, row: &Row, params: &mut Vec<Value>) -> String {
        let mut names = Vec::new();
        for col in &self.table.columns {
            if col.ty == CqlType::Counter {
                continue;
            }
            names.push(escape_identifier(&col.name));
            params.push(row.get(&col.name).cloned().unwrap_or(Value::Null));
        }
        let marks = vec!["?"; names.len()];
        format!(
            "INSERT INTO {} ({}) VALUES ({}){}",
            self.table.qualified_name(),
            names.join(", "),
            marks.join(", "),
            using_clause(&self.options, true)
        )
    }

    /// Generate UPDATE CQL.
    fn to_update_cql(&self, changes: &Changes, params: &mut Vec<Value>) -> String {
        let mut assignments = Vec::new();
        for (field, assign) in changes.iter() {
            let col = escape_identifier(field);
            let clause = match assign {
                Assign::Value(v) => {
                    params.push(v.clone());
                    format!("{} = ?", col)
                }
                Assign::Modify(Modifier::CounterIncrement(n)) => {
                    params.push(Value::Int(*n));
                    format!("{} = {} + ?", col, col)
                }
                Assign::Modify(Modifier::ListAppend(items)) => {
                    params.push(Value::List(items.clone()));
                    format!("{} = {} + ?", col, col)
                }
                Assign::Modify(Modifier::ListPrepend(items)) => {
                    params.push(Value::List(items.clone()));
                    format!("{} = ? + {}", col, col)
                }
                Assign::Modify(Modifier::ListRemove(items)) => {
                    params.push(Value::List(items.clone()));
                    format!("{} = {} - ?", col, col)
                }
                Assign::Modify(Modifier::MapSetField(key, v)) => {
                    params.push(Value::Text(key.clone()));
                    params.push(v.clone());
                    format!("{}[?] = ?", col)
                }
            };
            assignments.push(clause);
        }
        let mut cql = format!(
            "UPDATE {}{} SET {}",
            self.table.qualified_name(),
            using_clause(&self.options, true),
            assignments.join(", ")
        );
        push_where(&mut cql, &self.relations, params);
        cql
    }

    /// Generate DELETE CQL.
    fn to_delete_cql(&self, params: &mut Vec<Value>) -> String {
        let mut cql = format!(
            "DELETE FROM {}{}",
            self.table.qualified_name(),
            using_clause(&self.options, false)
        );
        push_where(&mut cql, &self.relations, params);
        cql
    }
}

fn push_where(cql: &mut String, relations: &[Relation], params: &mut Vec<Value>) {
    if relations.is_empty() {
        return;
    }
    let clauses: Vec<String> = relations
        .iter()
        .map(|rel| {
            let field = escape_identifier(&rel.field);
            params.extend(rel.values.iter().cloned());
            if rel.is_tuple() {
                let cols: Vec<String> = rel.columns().map(escape_identifier).collect();
                let marks = vec!["?"; rel.values.len()];
                return format!("({}) {} ({})", cols.join(", "), rel.op.symbol(), marks.join(", "));
            }
            match rel.op {
                Operator::In => {
                    let marks = vec!["?"; rel.values.len()];
                    format!("{} IN ({})", field, marks.join(", "))
                }
                op => format!("{} {} ?", field, op.symbol()),
            }
        })
        .collect();
    cql.push_str(" WHERE ");
    cql.push_str(&clauses.join(" AND "));
}

fn using_clause(options: &Options, with_ttl: bool) -> String {
    let mut parts = Vec::new();
    if with_ttl {
        if let Some(ttl) = options.ttl {
            parts.push(format!("TTL {}", ttl.as_secs()));
        }
    }
    if let Some(ts) = options.timestamp {
        parts.push(format!("TIMESTAMP {}", ts.timestamp_micros()));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" USING {}", parts.join(" AND "))
    }
}

/// Generate CREATE TABLE CQL from the table's key layout.
pub fn create_table_cql(table: &TableDef, options: &Options, if_not_exists: bool) -> CassaResult<String> {
    let defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("{} {}", escape_identifier(&c.name), c.ty))
        .collect();

    let keys = &table.keys;
    let partition: Vec<String> = keys.partition_keys.iter().map(|k| escape_identifier(k)).collect();
    let primary = if keys.clustering_columns.is_empty() && !keys.compound {
        partition.join(", ")
    } else {
        let mut parts = vec![format!("({})", partition.join(", "))];
        parts.extend(keys.clustering_columns.iter().map(|k| escape_identifier(k)));
        parts.join(", ")
    };

    let mut with = Vec::new();
    if let Some(order) = &options.clustering_order {
        let mut cols = Vec::new();
        for o in order {
            if !table.is_clustering_column(&o.column) {
                return Err(CassaError::generation(format!(
                    "clustering order names '{}', which is not a clustering column of '{}'",
                    o.column, table.name
                )));
            }
            let dir = match o.direction {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            cols.push(format!("{} {}", escape_identifier(&o.column), dir));
        }
        if !cols.is_empty() {
            with.push(format!("CLUSTERING ORDER BY ({})", cols.join(", ")));
        }
    }
    if options.compact_storage == Some(true) {
        with.push("COMPACT STORAGE".to_string());
    }

    let mut cql = format!(
        "CREATE TABLE {}{} ({}, PRIMARY KEY ({}))",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        table.qualified_name(),
        defs.join(", "),
        primary
    );
    if !with.is_empty() {
        cql.push_str(" WITH ");
        cql.push_str(&with.join(" AND "));
    }
    Ok(cql)
}
