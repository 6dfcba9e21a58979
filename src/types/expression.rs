//! Predicate expression tree
//!
//! The planner treats expressions as opaque values with clone/equality plus
//! the handful of structural queries it needs: column extraction, conjunct
//! splitting, null-rejection analysis and comparison decomposition. No
//! evaluation happens here.

use super::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A column reference: table alias plus column name. This is the planner's
/// equivalent of a tuple-value expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Comparison operator in a binary predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    /// IS NOT DISTINCT FROM. Treated as equality for index matching.
    NotDistinct,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    /// The operator as seen from the other side of the comparison
    /// (`a < b` is `b > a`).
    pub fn reversed(self) -> Self {
        match self {
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Gte => CompareOp::Lte,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Lte => CompareOp::Gte,
            other => other,
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::NotDistinct)
    }

    pub fn is_lower_bound(self) -> bool {
        matches!(self, CompareOp::Gt | CompareOp::Gte)
    }

    pub fn is_upper_bound(self) -> bool {
        matches!(self, CompareOp::Lt | CompareOp::Lte)
    }
}

/// A predicate expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Column(ColumnRef),
    Constant(Value),
    /// Positional statement parameter.
    Parameter(usize),
    Compare(CompareOp, Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    IsNull(Box<Expression>),
    IsNotNull(Box<Expression>),
    Like(Box<Expression>, Box<Expression>),
    InList(Box<Expression>, Vec<Expression>),
    /// Scalar function call, e.g. CONTAINS(region, ?) for geography probes.
    Function(String, Vec<Expression>),
    /// Opaque correlated subquery marker. Indexes never accept a
    /// subquery-valued comparand.
    Subquery(u32),
}

impl Expression {
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expression::Column(ColumnRef::new(table, name))
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare(op, Box::new(left), Box::new(right))
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Expression::compare(CompareOp::Eq, left, right)
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And(Box::new(left), Box::new(right))
    }

    /// Splits an expression into its top-level AND conjuncts.
    pub fn conjuncts(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        fn walk<'a>(expr: &'a Expression, out: &mut Vec<&'a Expression>) {
            match expr {
                Expression::And(l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                other => out.push(other),
            }
        }
        walk(self, &mut out);
        out
    }

    /// Combines a list of expressions into one AND chain. Returns None for an
    /// empty list.
    pub fn and_combine<I>(exprs: I) -> Option<Expression>
    where
        I: IntoIterator<Item = Expression>,
    {
        exprs.into_iter().reduce(Expression::and)
    }

    /// Collects every column reference in the expression.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.visit(&mut |e| {
            if let Expression::Column(c) = e {
                out.push(c);
            }
        });
        out
    }

    /// The distinct table aliases referenced by this expression.
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for col in self.columns() {
            if !out.contains(&col.table.as_str()) {
                out.push(&col.table);
            }
        }
        out
    }

    pub fn references_table(&self, alias: &str) -> bool {
        self.columns().iter().any(|c| c.table == alias)
    }

    pub fn has_parameter(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(e, Expression::Parameter(_)) {
                found = true;
            }
        });
        found
    }

    pub fn contains_subquery(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(e, Expression::Subquery(_)) {
                found = true;
            }
        });
        found
    }

    /// True if the expression references no columns and no subqueries, i.e.
    /// it can be evaluated to a single value at bind time.
    pub fn is_constant_or_parameter(&self) -> bool {
        self.columns().is_empty() && !self.contains_subquery()
    }

    /// Decomposes a binary comparison whose column side belongs to `alias`
    /// into (op-as-seen-from-the-column, column, comparand). The comparand
    /// must not reference `alias` itself, otherwise this is a self-comparison
    /// an index cannot serve.
    pub fn as_column_comparison(&self, alias: &str) -> Option<(CompareOp, &ColumnRef, &Expression)> {
        let Expression::Compare(op, left, right) = self else {
            return None;
        };
        if let Expression::Column(col) = left.as_ref() {
            if col.table == alias && !right.references_table(alias) {
                return Some((*op, col, right));
            }
        }
        if let Expression::Column(col) = right.as_ref() {
            if col.table == alias && !left.references_table(alias) {
                return Some((op.reversed(), col, left));
            }
        }
        None
    }

    /// Null-rejection test: does this filter guarantee that a row with NULLs
    /// in every column of `aliases` cannot pass? Comparisons, LIKE, IN and
    /// IS NOT NULL on a referenced column all reject NULL; OR rejects only if
    /// both branches do; IS NULL and NOT never reject.
    pub fn is_null_rejecting_for(&self, aliases: &[&str]) -> bool {
        match self {
            Expression::Compare(_, l, r) => {
                touches(l, aliases) || touches(r, aliases)
            }
            Expression::Like(l, r) => touches(l, aliases) || touches(r, aliases),
            Expression::InList(e, _) => touches(e, aliases),
            Expression::IsNotNull(e) => touches(e, aliases),
            Expression::And(l, r) => {
                l.is_null_rejecting_for(aliases) || r.is_null_rejecting_for(aliases)
            }
            Expression::Or(l, r) => {
                l.is_null_rejecting_for(aliases) && r.is_null_rejecting_for(aliases)
            }
            _ => false,
        }
    }

    fn visit<'a, F: FnMut(&'a Expression)>(&'a self, f: &mut F) {
        f(self);
        match self {
            Expression::Compare(_, l, r)
            | Expression::And(l, r)
            | Expression::Or(l, r)
            | Expression::Like(l, r) => {
                l.visit(f);
                r.visit(f);
            }
            Expression::Not(e) | Expression::IsNull(e) | Expression::IsNotNull(e) => e.visit(f),
            Expression::InList(e, list) => {
                e.visit(f);
                for item in list {
                    item.visit(f);
                }
            }
            Expression::Function(_, args) => {
                for arg in args {
                    arg.visit(f);
                }
            }
            Expression::Column(_)
            | Expression::Constant(_)
            | Expression::Parameter(_)
            | Expression::Subquery(_) => {}
        }
    }
}

fn touches(expr: &Expression, aliases: &[&str]) -> bool {
    expr.columns().iter().any(|c| aliases.contains(&c.table.as_str()))
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Column(c) => write!(f, "{}", c),
            Expression::Constant(v) => write!(f, "{}", v),
            Expression::Parameter(i) => write!(f, "?{}", i),
            Expression::Compare(op, l, r) => {
                let sym = match op {
                    CompareOp::Eq => "=",
                    CompareOp::NotDistinct => "IS NOT DISTINCT FROM",
                    CompareOp::NotEq => "<>",
                    CompareOp::Gt => ">",
                    CompareOp::Gte => ">=",
                    CompareOp::Lt => "<",
                    CompareOp::Lte => "<=",
                };
                write!(f, "{} {} {}", l, sym, r)
            }
            Expression::And(l, r) => write!(f, "({} AND {})", l, r),
            Expression::Or(l, r) => write!(f, "({} OR {})", l, r),
            Expression::Not(e) => write!(f, "NOT {}", e),
            Expression::IsNull(e) => write!(f, "{} IS NULL", e),
            Expression::IsNotNull(e) => write!(f, "{} IS NOT NULL", e),
            Expression::Like(l, r) => write!(f, "{} LIKE {}", l, r),
            Expression::InList(e, list) => {
                write!(f, "{} IN (", e)?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Expression::Function(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Subquery(id) => write!(f, "(subquery #{})", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(t: &str, c: &str) -> Expression {
        Expression::column(t, c)
    }

    #[test]
    fn test_conjunct_split_and_combine() {
        let a = Expression::eq(col("t", "a"), Expression::Parameter(0));
        let b = Expression::eq(col("t", "b"), Expression::Parameter(1));
        let combined = Expression::and_combine(vec![a.clone(), b.clone()]).unwrap();
        let parts = combined.conjuncts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], &a);
        assert_eq!(parts[1], &b);
    }

    #[test]
    fn test_column_comparison_normalizes_sides() {
        // ?0 < t.a should decompose as t.a > ?0
        let expr = Expression::compare(CompareOp::Lt, Expression::Parameter(0), col("t", "a"));
        let (op, c, comparand) = expr.as_column_comparison("t").unwrap();
        assert_eq!(op, CompareOp::Gt);
        assert_eq!(c.column, "a");
        assert_eq!(comparand, &Expression::Parameter(0));
    }

    #[test]
    fn test_self_comparison_not_indexable() {
        let expr = Expression::eq(col("t", "a"), col("t", "b"));
        assert!(expr.as_column_comparison("t").is_none());
    }

    #[test]
    fn test_null_rejection() {
        let cmp = Expression::compare(
            CompareOp::Gt,
            col("inner", "x"),
            Expression::Constant(Value::integer(5)),
        );
        assert!(cmp.is_null_rejecting_for(&["inner"]));
        assert!(!cmp.is_null_rejecting_for(&["outer"]));

        let is_null = Expression::IsNull(Box::new(col("inner", "x")));
        assert!(!is_null.is_null_rejecting_for(&["inner"]));

        // OR rejects only when both branches reject
        let or_mixed = Expression::Or(Box::new(cmp.clone()), Box::new(is_null));
        assert!(!or_mixed.is_null_rejecting_for(&["inner"]));
        let or_both = Expression::Or(Box::new(cmp.clone()), Box::new(cmp.clone()));
        assert!(or_both.is_null_rejecting_for(&["inner"]));
    }
}
