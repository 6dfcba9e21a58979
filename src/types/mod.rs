//! Core types shared by the statement model and the planner

pub mod expression;
pub mod query;
pub mod schema;
pub mod value;

pub use expression::{ColumnRef, CompareOp, Expression};
pub use query::{Direction, IndexLookup, JoinType, SortDirection};
pub use schema::{Catalog, Column, DataType, Distribution, Index, IndexType, Table};
pub use value::Value;
