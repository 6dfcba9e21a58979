//! Error types for the planner
//!
//! Planning failures come in two tiers. Per-candidate problems (a join order
//! with an illegal partitioning, an access-path combination that cannot be
//! built) are not errors at all: the enumerator reports them as skips and
//! moves on to the next candidate. The variants below are the second tier,
//! statement-level failures that abort planning and carry the SQL text so the
//! rule violation is diagnosable without planner internals.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Catalog errors
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    // Fatal statement-level planning errors
    #[error("Illegal to write to a stream table in \"{sql}\"")]
    StreamTableWrite { sql: String },

    #[error("Illegal to modify a materialized view in \"{sql}\"")]
    MaterializedViewWrite { sql: String },

    #[error("UPSERT on table '{table}' without a primary key in \"{sql}\"")]
    UpsertWithoutPrimaryKey { table: String, sql: String },

    #[error("Column '{column}' has no default and no value was supplied in \"{sql}\"")]
    MissingColumnValue { column: String, sql: String },

    #[error("At most one window function is supported per statement in \"{sql}\"")]
    MultipleWindowFunctions { sql: String },

    #[error("A window function may not be combined with GROUP BY in \"{sql}\"")]
    WindowFunctionWithGroupBy { sql: String },

    #[error("ORDER BY aggregate '{column}' does not appear in the SELECT list in \"{sql}\"")]
    AggregateNotInSelect { column: String, sql: String },

    #[error("Statement may produce a non-deterministic result set: {reason} in \"{sql}\"")]
    NonDeterministicDml { reason: String, sql: String },

    #[error("Join of multi-partitioned tables is too complex for a two-fragment plan in \"{sql}\"")]
    JoinTooComplex { sql: String },

    #[error("Bad join order hint: {reason} in \"{sql}\"")]
    InvalidJoinOrderHint { reason: String, sql: String },

    #[error("DELETE with ORDER BY and LIMIT requires single-partition execution in \"{sql}\"")]
    OrderedDeleteNotSinglePartition { sql: String },

    #[error("Set operation children do not share a common partitioning scheme in \"{sql}\"")]
    SetOpPartitioningMismatch { sql: String },

    #[error("Tables cannot be swapped: {reason} in \"{sql}\"")]
    SwapTablesMismatch { reason: String, sql: String },

    #[error("Unable to plan statement: {diagnostic} in \"{sql}\"")]
    NoPlan { diagnostic: String, sql: String },

    // System errors
    #[error("Internal planner error: {0}")]
    Internal(String),
}
