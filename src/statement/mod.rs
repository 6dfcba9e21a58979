//! Parsed statement model
//!
//! The planner consumes statements in an already-parsed, already-resolved
//! form: table references are bound to catalog names, expressions are trees
//! over alias-qualified columns, and the FROM clause is a binary join tree.
//! Parsing and name resolution happen upstream; everything here is input to
//! plan assembly.

pub mod join_tree;

pub use join_tree::{JoinTree, PERMUTATION_LIMIT};

use crate::types::{Direction, Expression};

/// One base-table reference in a FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub struct TableScan {
    pub id: usize,
    /// Catalog table name.
    pub table: String,
    /// Alias used in expressions. Equal to the table name when no alias was
    /// written.
    pub alias: String,
}

impl TableScan {
    pub fn new(id: usize, table: impl Into<String>, alias: impl Into<String>) -> Self {
        TableScan {
            id,
            table: table.into(),
            alias: alias.into(),
        }
    }
}

/// Aggregate functions the planner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    CountStar,
    Sum,
    Min,
    Max,
    Avg,
    ApproxCountDistinct,
    /// Partition-side half of a split APPROX_COUNT_DISTINCT: accumulates a
    /// cardinality sketch. Never appears in parsed statements.
    SketchAccumulate,
    /// Coordinator-side half: merges partition sketches into the final
    /// estimate. Never appears in parsed statements.
    SketchMerge,
}

/// One aggregate call in the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    /// None for COUNT(*).
    pub argument: Option<Expression>,
    pub distinct: bool,
}

impl AggregateCall {
    pub fn new(function: AggregateFunction, argument: Option<Expression>) -> Self {
        AggregateCall {
            function,
            argument,
            distinct: false,
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

/// One output column of a SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expression: Expression,
    /// Output column label.
    pub alias: String,
    /// Set when the item is (or wraps) an aggregate call.
    pub aggregate: Option<AggregateCall>,
}

impl SelectItem {
    pub fn column(expr: Expression, alias: impl Into<String>) -> Self {
        SelectItem {
            expression: expr,
            alias: alias.into(),
            aggregate: None,
        }
    }

    pub fn aggregate(call: AggregateCall, alias: impl Into<String>) -> Self {
        SelectItem {
            expression: Expression::Constant(crate::types::Value::Null),
            alias: alias.into(),
            aggregate: Some(call),
        }
    }
}

/// One ORDER BY element.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByElement {
    pub expression: Expression,
    pub direction: Direction,
}

impl OrderByElement {
    pub fn asc(expression: Expression) -> Self {
        OrderByElement {
            expression,
            direction: Direction::Ascending,
        }
    }

    pub fn desc(expression: Expression) -> Self {
        OrderByElement {
            expression,
            direction: Direction::Descending,
        }
    }
}

/// A window function call. At most one per statement.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFunctionCall {
    pub function: String,
    pub partition_by: Vec<Expression>,
    pub order_by: Vec<OrderByElement>,
}

/// LIMIT and OFFSET. An absent LIMIT with a present OFFSET is legal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LimitOffset {
    pub limit: Option<i64>,
    pub offset: i64,
}

impl LimitOffset {
    pub fn limit(n: i64) -> Self {
        LimitOffset {
            limit: Some(n),
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn is_present(&self) -> bool {
        self.limit.is_some() || self.offset > 0
    }
}

/// A parsed SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSelect {
    pub sql: String,
    pub scans: Vec<TableScan>,
    pub join_tree: JoinTree,
    /// WHERE clause conjuncts.
    pub where_exprs: Vec<Expression>,
    pub items: Vec<SelectItem>,
    pub group_by: Vec<Expression>,
    pub order_by: Vec<OrderByElement>,
    pub window_functions: Vec<WindowFunctionCall>,
    pub distinct: bool,
    pub limit_offset: LimitOffset,
    /// Forced join order from a planner hint: aliases, outermost first.
    pub join_order_hint: Option<Vec<String>>,
}

impl ParsedSelect {
    /// A single-table SELECT * skeleton; tests and builders fill in the rest.
    pub fn scan(sql: impl Into<String>, table: &str, alias: &str) -> Self {
        ParsedSelect {
            sql: sql.into(),
            scans: vec![TableScan::new(0, table, alias)],
            join_tree: JoinTree::leaf(0, 0),
            where_exprs: Vec::new(),
            items: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            window_functions: Vec::new(),
            distinct: false,
            limit_offset: LimitOffset::default(),
            join_order_hint: None,
        }
    }

    pub fn scan_aliases(&self) -> Vec<String> {
        self.scans.iter().map(|s| s.alias.clone()).collect()
    }

    pub fn scan_by_alias(&self, alias: &str) -> Option<&TableScan> {
        self.scans.iter().find(|s| s.alias == alias)
    }

    pub fn has_aggregates(&self) -> bool {
        self.items.iter().any(|i| i.aggregate.is_some())
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || self.has_aggregates()
    }
}

/// Source of INSERT rows.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expression>>),
    Select(Box<ParsedSelect>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInsert {
    pub sql: String,
    pub table: String,
    /// Target columns in statement order. Empty means all columns.
    pub columns: Vec<String>,
    pub source: InsertSource,
    pub upsert: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUpdate {
    pub sql: String,
    pub table: String,
    pub alias: String,
    pub assignments: Vec<(String, Expression)>,
    pub where_exprs: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDelete {
    pub sql: String,
    pub table: String,
    pub alias: String,
    pub where_exprs: Vec<Expression>,
    pub order_by: Vec<OrderByElement>,
    pub limit_offset: LimitOffset,
}

/// Set operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    UnionAll,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUnion {
    pub sql: String,
    pub op: SetOp,
    pub children: Vec<ParsedSelect>,
    pub order_by: Vec<OrderByElement>,
    pub limit_offset: LimitOffset,
}

/// Atomic swap of two identically-shaped tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSwap {
    pub sql: String,
    pub table_a: String,
    pub table_b: String,
}

/// Migration of matching rows out of a table to its export target.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMigrate {
    pub sql: String,
    pub table: String,
    pub alias: String,
    pub where_exprs: Vec<Expression>,
}

/// A resolved statement, ready for planning.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedStatement {
    Select(ParsedSelect),
    Insert(ParsedInsert),
    Update(ParsedUpdate),
    Delete(ParsedDelete),
    Union(ParsedUnion),
    Swap(ParsedSwap),
    Migrate(ParsedMigrate),
}

impl ParsedStatement {
    pub fn sql(&self) -> &str {
        match self {
            ParsedStatement::Select(s) => &s.sql,
            ParsedStatement::Insert(s) => &s.sql,
            ParsedStatement::Update(s) => &s.sql,
            ParsedStatement::Delete(s) => &s.sql,
            ParsedStatement::Union(s) => &s.sql,
            ParsedStatement::Swap(s) => &s.sql,
            ParsedStatement::Migrate(s) => &s.sql,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            ParsedStatement::Select(_) | ParsedStatement::Union(_)
        )
    }
}
