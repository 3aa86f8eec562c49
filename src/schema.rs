//! Schema files
//!
//! Describes recipe tables in TOML so their physical layout can be printed
//! or created without writing code.
//!
//! ```toml
//! keyspace = "app"
//!
//! [[table]]
//! name = "sales"
//! recipe = "multi_timeseries"
//! index = ["seller"]
//! time = "at"
//! id = ["id"]
//! bucket = "1d"
//! columns = [
//!     { name = "id", type = "uuid" },
//!     { name = "seller", type = "text" },
//!     { name = "at", type = "timestamp" },
//! ]
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::ast::{Column, Keys};
use crate::bucket::FixedBucketer;
use crate::error::{CassaError, CassaResult};
use crate::keyspace::{KeySpace, TableChanger};

/// Column definition in schema
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeKind {
    Table,
    Map,
    Multimap,
    MultimapMultikey,
    Timeseries,
    MultiTimeseries,
    FlexMultiTimeseries,
}

/// One logical table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSchema {
    pub name: String,
    pub recipe: RecipeKind,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub id: Vec<String>,
    #[serde(default)]
    pub index: Vec<String>,
    pub time: Option<String>,
    /// Bucket size such as `1h` or `1d`
    pub bucket: Option<String>,
    /// Raw tables only
    #[serde(default)]
    pub partition: Vec<String>,
    #[serde(default)]
    pub clustering: Vec<String>,
}

/// A schema file: an optional keyspace and a list of tables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    pub keyspace: Option<String>,
    #[serde(rename = "table", default)]
    pub tables: Vec<TableSchema>,
}

impl SchemaFile {
    pub fn from_toml_str(input: &str) -> CassaResult<Self> {
        toml::from_str(input).map_err(|e| CassaError::Config(format!("Failed to parse schema: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> CassaResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let schema = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded {} table schemas from {}", schema.tables.len(), path.as_ref().display());
        Ok(schema)
    }

    /// Table handles for every entry, in file order.
    pub fn build(&self, ks: &KeySpace) -> CassaResult<Vec<Box<dyn TableChanger>>> {
        self.tables.iter().map(|t| t.build(ks)).collect()
    }
}

fn refs(fields: &[String]) -> Vec<&str> {
    fields.iter().map(String::as_str).collect()
}

impl TableSchema {
    pub fn columns(&self) -> CassaResult<Vec<Column>> {
        self.columns
            .iter()
            .map(|c| {
                let ty = c.col_type.parse().map_err(|e| {
                    CassaError::Config(format!("table '{}', column '{}': {}", self.name, c.name, e))
                })?;
                Ok(Column::new(c.name.clone(), ty))
            })
            .collect()
    }

    fn invalid(&self, message: &str) -> CassaError {
        CassaError::Config(format!("table '{}': {}", self.name, message))
    }

    fn one<'a>(&self, fields: &'a [String], what: &str) -> CassaResult<&'a str> {
        match fields {
            [only] => Ok(only),
            _ => Err(self.invalid(&format!("recipe needs exactly one {} field", what))),
        }
    }

    fn time(&self) -> CassaResult<&str> {
        self.time.as_deref().ok_or_else(|| self.invalid("recipe needs a time field"))
    }

    fn bucketer(&self) -> CassaResult<FixedBucketer> {
        self.bucket
            .as_deref()
            .ok_or_else(|| self.invalid("recipe needs a bucket size"))?
            .parse()
    }

    pub fn build(&self, ks: &KeySpace) -> CassaResult<Box<dyn TableChanger>> {
        let columns = self.columns()?;
        let name = self.name.as_str();
        let table: Box<dyn TableChanger> = match self.recipe {
            RecipeKind::Table => Box::new(ks.table(
                name,
                columns,
                Keys::new(&refs(&self.partition), &refs(&self.clustering)),
            )?),
            RecipeKind::Map => Box::new(ks.map_table(name, self.one(&self.id, "id")?, columns)?),
            RecipeKind::Multimap => Box::new(ks.multimap_table(
                name,
                self.one(&self.index, "index")?,
                self.one(&self.id, "id")?,
                columns,
            )?),
            RecipeKind::MultimapMultikey => Box::new(ks.multimap_multikey_table(
                name,
                &refs(&self.index),
                &refs(&self.id),
                columns,
            )?),
            RecipeKind::Timeseries => Box::new(ks.timeseries_table(
                name,
                self.time()?,
                self.one(&self.id, "id")?,
                self.bucketer()?.size(),
                columns,
            )?),
            RecipeKind::MultiTimeseries => Box::new(ks.multi_timeseries_table(
                name,
                self.one(&self.index, "index")?,
                self.time()?,
                self.one(&self.id, "id")?,
                self.bucketer()?.size(),
                columns,
            )?),
            RecipeKind::FlexMultiTimeseries => Box::new(ks.flex_multi_timeseries_table(
                name,
                &refs(&self.index),
                self.time()?,
                self.one(&self.id, "id")?,
                Arc::new(self.bucketer()?),
                columns,
            )?),
        };
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    const SCHEMA: &str = r#"
        keyspace = "shop"

        [[table]]
        name = "users"
        recipe = "map"
        id = ["id"]
        columns = [{ name = "id", type = "text" }, { name = "email", type = "text" }]

        [[table]]
        name = "sales"
        recipe = "multi_timeseries"
        index = ["seller"]
        time = "at"
        id = ["id"]
        bucket = "1d"
        columns = [
            { name = "id", type = "uuid" },
            { name = "seller", type = "text" },
            { name = "at", type = "timestamp" },
            { name = "tags", type = "list<text>" },
        ]
    "#;

    #[test]
    fn test_build_tables() {
        let schema = SchemaFile::from_toml_str(SCHEMA).unwrap();
        assert_eq!(schema.keyspace.as_deref(), Some("shop"));
        let ks = KeySpace::new("shop", Arc::new(MemoryStore::new()));
        let tables = schema.build(&ks).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name(), "users_map_id");
        assert_eq!(tables[1].name(), "sales_multitimeseries_seller_at_id_1d");
        assert!(tables[1].create_statement().unwrap().contains("tags list<text>"));
    }

    #[test]
    fn test_missing_time_field() {
        let schema = SchemaFile::from_toml_str(
            r#"
            [[table]]
            name = "events"
            recipe = "timeseries"
            id = ["id"]
            bucket = "1h"
            columns = [{ name = "id", type = "text" }]
            "#,
        )
        .unwrap();
        let ks = KeySpace::new("app", Arc::new(MemoryStore::new()));
        let err = schema.build(&ks).err().unwrap();
        assert!(err.to_string().contains("time field"));
    }

    #[test]
    fn test_bad_column_type() {
        let schema = SchemaFile::from_toml_str(
            r#"
            [[table]]
            name = "t"
            recipe = "map"
            id = ["id"]
            columns = [{ name = "id", type = "varchar(10)" }]
            "#,
        )
        .unwrap();
        let err = schema.tables[0].columns().unwrap_err();
        assert!(matches!(err, CassaError::Config(_)));
    }
}
