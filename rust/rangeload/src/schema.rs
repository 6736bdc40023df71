//! Table schema and the import targets derived from it.
//!
//! A [`Target`] is one shard-able destination of the import: the primary table
//! or one of its secondary indexes. Targets are derived once per job from the
//! [`TableSchema`] and do not change afterwards.

use ahash::AHashSet;
use rangeload_common::{Result, error::Error};
use serde::{Deserialize, Serialize};

/// Stable numeric identifier of a table or index in the store.
pub type TargetId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Int64,
    Utf8,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> ColumnDef {
        self.nullable = false;
        self
    }
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub id: TargetId,
    pub name: String,
    pub columns: Vec<IndexColumn>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    pub fn new(id: TargetId, name: impl Into<String>, columns: &[&str]) -> IndexDef {
        IndexDef {
            id,
            name: name.into(),
            columns: columns
                .iter()
                .map(|&name| IndexColumn {
                    name: name.to_string(),
                    descending: false,
                })
                .collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> IndexDef {
        self.unique = true;
        self
    }

    /// Marks the named index column as descending.
    pub fn descending(mut self, column: &str) -> IndexDef {
        for c in self.columns.iter_mut().filter(|c| c.name == column) {
            c.descending = true;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_id: TargetId,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Primary key column names; empty when rows get a surrogate key.
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl TableSchema {
    pub fn new(table_id: TargetId, name: impl Into<String>, columns: Vec<ColumnDef>) -> TableSchema {
        TableSchema {
            table_id,
            name: name.into(),
            columns,
            primary_key: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> TableSchema {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_index(mut self, index: IndexDef) -> TableSchema {
        self.indexes.push(index);
        self
    }

    pub fn from_json(json: &str) -> Result<TableSchema> {
        let schema: TableSchema =
            serde_json::from_str(json).map_err(|e| Error::serialization("table schema", e))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::invalid_arg("schema", "table has no columns"));
        }
        let mut names = AHashSet::new();
        for column in &self.columns {
            if !names.insert(column.name.as_str()) {
                return Err(Error::invalid_arg(
                    "schema",
                    format!("duplicate column '{}'", column.name),
                ));
            }
        }
        self.resolve_columns("primary key", self.primary_key.iter().map(String::as_str))?;

        let mut target_ids = AHashSet::new();
        target_ids.insert(self.table_id);
        let mut index_names = AHashSet::new();
        for index in &self.indexes {
            if index.columns.is_empty() {
                return Err(Error::invalid_arg(
                    "schema",
                    format!("index '{}' has no columns", index.name),
                ));
            }
            if !target_ids.insert(index.id) {
                return Err(Error::invalid_arg(
                    "schema",
                    format!("index '{}' reuses target id {}", index.name, index.id),
                ));
            }
            if !index_names.insert(index.name.as_str()) {
                return Err(Error::invalid_arg(
                    "schema",
                    format!("duplicate index '{}'", index.name),
                ));
            }
            self.resolve_columns(&index.name, index.columns.iter().map(|c| c.name.as_str()))?;
        }
        Ok(())
    }

    /// Derives the import targets: the primary table first, then every index
    /// in declaration order.
    pub fn targets(&self) -> Result<Vec<Target>> {
        self.validate()?;
        let mut targets = Vec::with_capacity(1 + self.indexes.len());
        let key_columns = self
            .resolve_columns("primary key", self.primary_key.iter().map(String::as_str))?
            .into_iter()
            .map(|column| KeyColumn {
                column,
                descending: false,
            })
            .collect();
        targets.push(Target {
            id: self.table_id,
            name: self.name.clone(),
            kind: TargetKind::Table,
            unique: true,
            key_columns,
        });
        for index in &self.indexes {
            let columns = self.resolve_columns(&index.name, index.columns.iter().map(|c| c.name.as_str()))?;
            targets.push(Target {
                id: index.id,
                name: index.name.clone(),
                kind: TargetKind::Index,
                unique: index.unique,
                key_columns: columns
                    .into_iter()
                    .zip(&index.columns)
                    .map(|(column, def)| KeyColumn {
                        column,
                        descending: def.descending,
                    })
                    .collect(),
            });
        }
        Ok(targets)
    }

    fn resolve_columns<'a>(
        &self,
        owner: &str,
        names: impl Iterator<Item = &'a str>,
    ) -> Result<Vec<usize>> {
        let mut resolved = Vec::new();
        for name in names {
            let index = self.column_index(name).ok_or_else(|| {
                Error::invalid_arg("schema", format!("{owner}: unknown column '{name}'"))
            })?;
            if resolved.contains(&index) {
                return Err(Error::invalid_arg(
                    "schema",
                    format!("{owner}: column '{name}' listed twice"),
                ));
            }
            resolved.push(index);
        }
        Ok(resolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Table,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyColumn {
    /// Position of the column in the table schema.
    pub column: usize,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub kind: TargetKind,
    pub unique: bool,
    /// Columns forming the key. Empty for a table without a primary key.
    pub key_columns: Vec<KeyColumn>,
}

impl Target {
    pub fn is_index(&self) -> bool {
        self.kind == TargetKind::Index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableSchema {
        TableSchema::new(
            100,
            "orders",
            vec![
                ColumnDef::new("id", ColumnType::Int64).not_null(),
                ColumnDef::new("customer", ColumnType::Utf8),
                ColumnDef::new("amount", ColumnType::Int64),
            ],
        )
        .with_primary_key(&["id"])
        .with_index(IndexDef::new(101, "by_customer", &["customer", "amount"]).descending("amount"))
        .with_index(IndexDef::new(102, "by_amount", &["amount"]).unique())
    }

    #[test]
    fn test_targets() {
        let targets = orders().targets().unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].id, 100);
        assert_eq!(targets[0].kind, TargetKind::Table);
        assert_eq!(targets[0].key_columns, vec![KeyColumn { column: 0, descending: false }]);
        assert!(targets[1].is_index());
        assert!(!targets[1].unique);
        assert_eq!(
            targets[1].key_columns,
            vec![
                KeyColumn { column: 1, descending: false },
                KeyColumn { column: 2, descending: true },
            ]
        );
        assert!(targets[2].unique);
    }

    #[test]
    fn test_invalid_schemas() {
        let unknown = orders().with_index(IndexDef::new(103, "bad", &["missing"]));
        assert!(unknown.targets().is_err());

        let reused_id = orders().with_index(IndexDef::new(100, "dup_id", &["amount"]));
        assert!(reused_id.validate().is_err());

        let dup_name = orders().with_index(IndexDef::new(104, "by_amount", &["customer"]));
        assert!(dup_name.validate().is_err());

        let bad_pk = orders().with_primary_key(&["id", "id"]);
        assert!(bad_pk.validate().is_err());
    }

    #[test]
    fn test_schema_json() {
        let json = r#"{
            "table_id": 7,
            "name": "events",
            "columns": [
                {"name": "ts", "data_type": "int64", "nullable": false},
                {"name": "payload", "data_type": "binary"}
            ],
            "indexes": [{"id": 8, "name": "by_ts", "columns": [{"name": "ts", "descending": true}]}]
        }"#;
        let schema = TableSchema::from_json(json).unwrap();
        assert!(!schema.has_primary_key());
        assert!(schema.columns[1].nullable);
        let targets = schema.targets().unwrap();
        assert!(targets[0].key_columns.is_empty());
        assert!(targets[1].key_columns[0].descending);
    }
}
