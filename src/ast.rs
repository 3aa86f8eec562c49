//! Abstract syntax for cassa statements.
//!
//! A [`Query`] is the structured form of one statement against one table. It
//! stays structured until the transpiler renders it, so an [`Op`](crate::op::Op)
//! can be validated without generating any text.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CassaError, CassaResult};
use crate::options::Options;

/// A field-name-to-value mapping, ordered by field name.
pub type Row = BTreeMap<String, Value>;

/// A typed statement parameter or row cell.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Blob(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Double(_) => 2,
            Value::Text(_) => 3,
            Value::Uuid(_) => 4,
            Value::Timestamp(_) => 5,
            Value::Blob(_) => 6,
            Value::List(_) => 7,
            Value::Map(_) => 8,
        }
    }
}

// Total order so values can serve as partition and clustering keys.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Double(a), Double(b)) => a.total_cmp(b),
            (Int(a), Double(b)) => (*a as f64).total_cmp(b),
            (Double(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Text(a), Text(b)) => a.cmp(b),
            (Uuid(a), Uuid(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Blob(a), Blob(b)) => a.cmp(b),
            (List(a), List(b)) => a.cmp(b),
            (Map(a), Map(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Timestamp(t) => write!(f, "'{}'", t.to_rfc3339()),
            Value::Blob(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(m) => {
                let parts: Vec<String> = m
                    .iter()
                    .map(|(k, v)| format!("'{}': {}", k.replace('\'', "''"), v))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Column types understood by the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CqlType {
    Text,
    Int,
    BigInt,
    Double,
    Boolean,
    Uuid,
    Timestamp,
    Blob,
    Counter,
    List(Box<CqlType>),
    /// `map<text, V>`
    Map(Box<CqlType>),
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlType::Text => write!(f, "text"),
            CqlType::Int => write!(f, "int"),
            CqlType::BigInt => write!(f, "bigint"),
            CqlType::Double => write!(f, "double"),
            CqlType::Boolean => write!(f, "boolean"),
            CqlType::Uuid => write!(f, "uuid"),
            CqlType::Timestamp => write!(f, "timestamp"),
            CqlType::Blob => write!(f, "blob"),
            CqlType::Counter => write!(f, "counter"),
            CqlType::List(inner) => write!(f, "list<{}>", inner),
            CqlType::Map(inner) => write!(f, "map<text, {}>", inner),
        }
    }
}

impl FromStr for CqlType {
    type Err = CassaError;

    fn from_str(s: &str) -> CassaResult<Self> {
        crate::parser::parse_type(s)
    }
}

/// A declared table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: CqlType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: CqlType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Partition and clustering key layout of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keys {
    pub partition_keys: Vec<String>,
    pub clustering_columns: Vec<String>,
    /// With no clustering columns, treat every partition key field as one
    /// compound partition key instead of `(first, rest...)`.
    pub compound: bool,
}

impl Keys {
    pub fn new(partition_keys: &[&str], clustering_columns: &[&str]) -> Self {
        Self {
            partition_keys: partition_keys.iter().map(|s| s.to_string()).collect(),
            clustering_columns: clustering_columns.iter().map(|s| s.to_string()).collect(),
            compound: false,
        }
    }

    pub fn compound(mut self) -> Self {
        self.compound = true;
        self
    }

    /// Resolve the physical layout as `(partition, clustering)`.
    ///
    /// `PRIMARY KEY (a, b)` partitions by `a` and clusters by `b`, so without
    /// the compound flag only the first declared field partitions.
    pub fn effective(&self) -> (Vec<String>, Vec<String>) {
        if self.clustering_columns.is_empty() && !self.compound {
            let mut iter = self.partition_keys.iter().cloned();
            let partition: Vec<String> = iter.next().into_iter().collect();
            (partition, iter.collect())
        } else {
            (self.partition_keys.clone(), self.clustering_columns.clone())
        }
    }
}

/// Immutable table descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub keyspace: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub keys: Keys,
    partition: Vec<String>,
    clustering: Vec<String>,
}

impl TableDef {
    pub fn new(
        keyspace: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<Column>,
        keys: Keys,
    ) -> CassaResult<Self> {
        let name = name.into();
        if keys.partition_keys.is_empty() {
            return Err(CassaError::validation(format!(
                "table '{}' declares no partition key",
                name
            )));
        }
        for list in [&keys.partition_keys, &keys.clustering_columns] {
            for (i, key) in list.iter().enumerate() {
                if list[..i].contains(key) {
                    return Err(CassaError::validation(format!(
                        "table '{}': key field '{}' is listed twice",
                        name, key
                    )));
                }
            }
        }
        for ck in &keys.clustering_columns {
            if keys.partition_keys.contains(ck) {
                return Err(CassaError::validation(format!(
                    "table '{}': '{}' is both a partition key and a clustering column",
                    name, ck
                )));
            }
        }
        for key in keys.partition_keys.iter().chain(&keys.clustering_columns) {
            if !columns.iter().any(|c| &c.name == key) {
                return Err(CassaError::validation(format!(
                    "table '{}': key field '{}' is not a declared column",
                    name, key
                )));
            }
        }
        let (partition, clustering) = keys.effective();
        Ok(Self {
            keyspace: keyspace.into(),
            name,
            columns,
            keys,
            partition,
            clustering,
        })
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Effective partition key columns.
    pub fn partition(&self) -> &[String] {
        &self.partition
    }

    /// Effective clustering columns.
    pub fn clustering(&self) -> &[String] {
        &self.clustering
    }

    pub fn is_partition_key(&self, field: &str) -> bool {
        self.partition.iter().any(|k| k == field)
    }

    pub fn is_clustering_column(&self, field: &str) -> bool {
        self.clustering.iter().any(|k| k == field)
    }

    pub fn is_key(&self, field: &str) -> bool {
        self.is_partition_key(field) || self.is_clustering_column(field)
    }

    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}",
            crate::transpiler::escape_identifier(&self.keyspace),
            crate::transpiler::escape_identifier(&self.name)
        )
    }
}

/// Relation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub fn is_range(&self) -> bool {
        matches!(self, Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::In => "IN",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
        }
    }
}

/// One predicate over a field, or over a column tuple
/// `(field, rest...) op (values...)` compared lexicographically.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub field: String,
    pub op: Operator,
    pub values: Vec<Value>,
    /// Trailing columns of a tuple relation. Empty for a plain one.
    pub rest: Vec<String>,
}

impl Relation {
    fn single(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            values: vec![value.into()],
            rest: Vec::new(),
        }
    }

    /// `(c1, c2, ...) op (v1, v2, ...)`. With one column this is a plain relation.
    pub fn tuple<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        op: Operator,
        values: Vec<Value>,
    ) -> Self {
        let mut columns = columns.into_iter().map(Into::into);
        Self {
            field: columns.next().unwrap_or_default(),
            op,
            values,
            rest: columns.collect(),
        }
    }

    pub fn is_tuple(&self) -> bool {
        !self.rest.is_empty()
    }

    /// Every column this relation reads, in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.field.as_str()).chain(self.rest.iter().map(String::as_str))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Eq, value)
    }

    pub fn in_<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            field: field.into(),
            op: Operator::In,
            values: values.into_iter().map(Into::into).collect(),
            rest: Vec::new(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Lte, value)
    }

    /// Whether a cell value satisfies this relation.
    pub fn accepts(&self, cell: &Value) -> bool {
        let first = match self.values.first() {
            Some(v) => v,
            None => return false,
        };
        match self.op {
            Operator::Eq => cell == first,
            Operator::In => self.values.iter().any(|v| v == cell),
            Operator::Gt => cell > first,
            Operator::Gte => cell >= first,
            Operator::Lt => cell < first,
            Operator::Lte => cell <= first,
        }
    }

    /// Whether a row satisfies this relation. Missing cells count as null.
    pub fn matches(&self, row: &Row) -> bool {
        let cell = |c: &str| row.get(c).unwrap_or(&Value::Null);
        if !self.is_tuple() {
            return self.accepts(cell(&self.field));
        }
        let cells: Vec<&Value> = self.columns().map(cell).collect();
        if cells.len() != self.values.len() {
            return false;
        }
        let ord = cells.into_iter().cmp(self.values.iter());
        match self.op {
            Operator::Eq => ord == Ordering::Equal,
            Operator::In => false,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Gte => ord != Ordering::Less,
            Operator::Lt => ord == Ordering::Less,
            Operator::Lte => ord != Ordering::Greater,
        }
    }
}

/// In-place collection and counter updates.
#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    CounterIncrement(i64),
    ListAppend(Vec<Value>),
    ListPrepend(Vec<Value>),
    ListRemove(Vec<Value>),
    MapSetField(String, Value),
}

/// Right-hand side of one assignment in an update.
#[derive(Debug, Clone, PartialEq)]
pub enum Assign {
    Value(Value),
    Modify(Modifier),
}

/// Ordered field assignments for a partial update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    fields: Vec<(String, Assign)>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a plain value. A later assignment to the same field replaces it.
    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field.into(), Assign::Value(value.into()))
    }

    pub fn modify(self, field: impl Into<String>, modifier: Modifier) -> Self {
        self.push(field.into(), Assign::Modify(modifier))
    }

    fn push(mut self, field: String, assign: Assign) -> Self {
        self.fields.retain(|(f, _)| f != &field);
        self.fields.push((field, assign));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Assign)> {
        self.fields.iter().map(|(f, a)| (f.as_str(), a))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl FromIterator<(String, Value)> for Changes {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Changes::new(), |changes, (f, v)| changes.set(f, v))
    }
}

/// Statement kind, with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Select,
    Insert(Row),
    Update(Changes),
    Delete,
    Create { if_not_exists: bool },
    Drop { if_exists: bool },
}

impl Action {
    pub fn is_read(&self) -> bool {
        matches!(self, Action::Select)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Insert(_) => "insert",
            Action::Update(_) => "update",
            Action::Delete => "delete",
            Action::Create { .. } => "create",
            Action::Drop { .. } => "drop",
        }
    }
}

/// One statement against one table, before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Arc<TableDef>,
    pub action: Action,
    pub relations: Vec<Relation>,
    pub options: Options,
}

impl Query {
    pub fn new(table: Arc<TableDef>, action: Action) -> Self {
        Self {
            table,
            action,
            relations: Vec::new(),
            options: Options::default(),
        }
    }

    pub fn filter(mut self, relations: Vec<Relation>) -> Self {
        self.relations = relations;
        self
    }

    pub fn with_options(mut self, options: &Options) -> Self {
        self.options = self.options.merge(options);
        self
    }
}
