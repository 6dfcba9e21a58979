//! Catalog types (tables, columns, indexes, distribution)
//!
//! The catalog is an immutable snapshot during planning. Tables carry their
//! distribution scheme (replicated or partitioned on a single column) and the
//! set of indexes the access-path generator considers.

use super::expression::Expression;
use super::value::Value;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

/// Column data type. The planner cares about types only for index eligibility
/// (geography columns take the containment path, everything else orders).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    Text,
    Timestamp,
    Geography,
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Geography => write!(f, "GEOGRAPHY"),
        }
    }
}

/// How a table's rows are spread across partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    /// Full copy on every partition. Readable anywhere.
    Replicated,
    /// Rows hashed on one column. A query confined to one value of that
    /// column runs on a single partition.
    Partitioned { column: String },
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Column {
            name: name.into(),
            datatype,
            nullable: true,
            default: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Physical index structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    /// Ordered tree index. Serves equality, ranges and ordered scans.
    Tree,
    /// Hash index. Serves only full-key equality lookups.
    Hash,
}

/// An index over one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub table: String,
    /// Key columns in order.
    pub columns: Vec<String>,
    pub index_type: IndexType,
    pub unique: bool,
    /// Partial index predicate. The index only covers rows satisfying this.
    pub predicate: Option<Expression>,
}

impl Index {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<&str>,
    ) -> Self {
        Index {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(String::from).collect(),
            index_type: IndexType::Tree,
            unique: false,
            predicate: None,
        }
    }

    pub fn hash(mut self) -> Self {
        self.index_type = IndexType::Hash;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn partial(mut self, predicate: Expression) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Whether the index supports ordered iteration without a search key.
    pub fn is_scannable(&self) -> bool {
        self.index_type == IndexType::Tree
    }
}

/// A table in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub distribution: Distribution,
    /// Name of the unique index acting as the primary key, if any.
    pub primary_key: Option<String>,
    /// Streams are insert-only export targets. Reads and mutations other
    /// than INSERT are illegal.
    pub is_stream: bool,
    /// Set when this table is a materialized view over another. Direct
    /// writes are illegal.
    pub materialized_view_of: Option<String>,
    /// Estimated row count used by the cost model.
    pub row_estimate: u64,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Table {
            name: name.into(),
            columns,
            indexes: Vec::new(),
            distribution: Distribution::Replicated,
            primary_key: None,
            is_stream: false,
            materialized_view_of: None,
            row_estimate: 1000,
        }
    }

    pub fn partitioned_on(mut self, column: impl Into<String>) -> Self {
        self.distribution = Distribution::Partitioned {
            column: column.into(),
        };
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_primary_key(mut self, index: Index) -> Self {
        self.primary_key = Some(index.name.clone());
        self.indexes.push(Index {
            unique: true,
            ..index
        });
        self
    }

    pub fn stream(mut self) -> Self {
        self.is_stream = true;
        self
    }

    pub fn materialized_view_of(mut self, source: impl Into<String>) -> Self {
        self.materialized_view_of = Some(source.into());
        self
    }

    pub fn rows(mut self, estimate: u64) -> Self {
        self.row_estimate = estimate;
        self
    }

    pub fn is_replicated(&self) -> bool {
        matches!(self.distribution, Distribution::Replicated)
    }

    /// The partitioning column name, or None for replicated tables.
    pub fn partition_column(&self) -> Option<&str> {
        match &self.distribution {
            Distribution::Partitioned { column } => Some(column),
            Distribution::Replicated => None,
        }
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// The primary key index, if the table declares one.
    pub fn primary_key_index(&self) -> Option<&Index> {
        self.primary_key.as_deref().and_then(|n| self.get_index(n))
    }
}

/// An immutable catalog snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    tables: HashMap<String, Table>,
    /// Bumped on every schema change. Cached plans keyed on an older
    /// generation are stale.
    pub generation: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
        self.generation += 1;
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}
