//! Access path selection
//!
//! For one table scan and its applicable filter conjuncts, enumerate the ways
//! the executor could produce that table's rows: always a sequential scan,
//! plus one candidate per index that matches at least one conjunct, provides
//! a requested ordering, or covers its key with equalities. Every input
//! conjunct lands in exactly one of the path's buckets (consumed as a search
//! key, consumed as a scan-end condition, eliminated as redundant, or kept as
//! a residual filter), so no filter is ever lost or applied twice.

use super::plan::PlanNode;
use crate::statement::{OrderByElement, TableScan};
use crate::types::{
    ColumnRef, CompareOp, DataType, Direction, Expression, Index, IndexLookup, IndexType,
    SortDirection, Table, Value,
};
use std::collections::HashSet;

/// One way to produce a table's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPath {
    /// None for a sequential scan.
    pub index: Option<String>,
    pub lookup: IndexLookup,
    /// Conjuncts consumed to form the search-key prefix.
    pub index_exprs: Vec<Expression>,
    /// Comparand per used key column, in key order.
    pub search_keys: Vec<Expression>,
    /// Conjuncts ending the scan: upper bounds, plus the consumed equalities
    /// when the prefix does not cover every key column.
    pub end_exprs: Vec<Expression>,
    /// Residual conjuncts evaluated per row.
    pub other_exprs: Vec<Expression>,
    /// Conjuncts the index itself guarantees (partial-index predicate
    /// matches); dropped from the plan entirely.
    pub eliminated_exprs: Vec<Expression>,
    pub sort_direction: SortDirection,
    /// Every key column is equality-bound.
    pub covering_equality: bool,
}

impl AccessPath {
    /// The sequential-scan path: everything is a residual filter.
    pub fn sequential(filters: Vec<Expression>) -> Self {
        AccessPath {
            index: None,
            lookup: IndexLookup::Eq,
            index_exprs: Vec::new(),
            search_keys: Vec::new(),
            end_exprs: Vec::new(),
            other_exprs: filters,
            eliminated_exprs: Vec::new(),
            sort_direction: SortDirection::Invalid,
            covering_equality: false,
        }
    }

    /// Aliases other than `own` whose columns appear in the search keys or
    /// end condition. Non-empty means the scan must run as the inner side of
    /// an index join below those tables.
    pub fn outer_aliases(&self, own: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for expr in self.search_keys.iter().chain(self.end_exprs.iter()) {
            for col in expr.columns() {
                if col.table != own && !out.iter().any(|a| a == &col.table) {
                    out.push(col.table.clone());
                }
            }
        }
        out
    }

    /// All conjuncts the path accounts for, in any bucket. Used to verify
    /// filter conservation in tests.
    #[cfg(test)]
    pub fn accounted_conjuncts(&self) -> usize {
        self.index_exprs.len()
            + self.end_exprs.len()
            + self.other_exprs.len()
            + self.eliminated_exprs.len()
    }
}

/// Access-path generation for one table scan.
pub struct IndexSelector;

impl IndexSelector {
    /// All candidate paths for `scan` given the conjuncts that mention only
    /// this table (or this table plus already-available outer tables) and
    /// the ordering the statement would like this scan to provide.
    pub fn relevant_access_paths(
        table: &Table,
        scan: &TableScan,
        conjuncts: &[Expression],
        order_intent: &[OrderByElement],
    ) -> Vec<AccessPath> {
        let mut paths = vec![AccessPath::sequential(conjuncts.to_vec())];
        for index in &table.indexes {
            if let Some(path) =
                Self::path_for_index(table, index, &scan.alias, conjuncts, order_intent)
            {
                paths.push(path);
            }
        }
        paths
    }

    /// Tries to build a path over one index. Returns None when the index
    /// cannot help this scan.
    fn path_for_index(
        table: &Table,
        index: &Index,
        alias: &str,
        conjuncts: &[Expression],
        order_intent: &[OrderByElement],
    ) -> Option<AccessPath> {
        // Geography indexes only answer containment probes.
        if Self::is_geography_index(table, index) {
            return Self::geography_path(index, alias, conjuncts);
        }

        let mut remaining: Vec<Expression> = conjuncts.to_vec();
        let mut eliminated = Vec::new();

        // A partial index is usable only when the filters imply its
        // predicate. Conjuncts that match the predicate become redundant.
        if let Some(predicate) = &index.predicate {
            if !Self::consume_partial_predicate(
                predicate,
                &index.table,
                alias,
                &mut remaining,
                &mut eliminated,
            ) {
                return None;
            }
        }

        let mut index_exprs = Vec::new();
        let mut search_keys = Vec::new();
        let mut end_exprs = Vec::new();
        let mut equality_cols: HashSet<String> = HashSet::new();
        let mut used_in_list = false;

        // Greedy equality prefix over the key columns.
        let mut next_key = 0;
        while next_key < index.columns.len() {
            let key_col = &index.columns[next_key];
            let Some((pos, comparand, is_in)) =
                Self::find_equality(&remaining, alias, key_col, used_in_list, &search_keys)
            else {
                break;
            };
            used_in_list |= is_in;
            index_exprs.push(remaining.remove(pos));
            search_keys.push(comparand);
            equality_cols.insert(key_col.clone());
            next_key += 1;
        }
        let covering_equality = next_key == index.columns.len();

        // Hash indexes serve nothing short of full-key equality.
        if index.index_type == IndexType::Hash && !covering_equality {
            return None;
        }

        let mut lookup = IndexLookup::Eq;
        if !covering_equality && index.index_type == IndexType::Tree {
            let prefix = index_exprs.clone();
            Self::consume_range(
                index,
                alias,
                next_key,
                &mut remaining,
                &mut index_exprs,
                &mut search_keys,
                &mut end_exprs,
                &mut lookup,
            );
            // Unbound trailing key components are padded in the probe, so a
            // partial prefix can never be an exact match: the scan starts at
            // the prefix and the consumed equalities double as its
            // termination condition.
            if lookup == IndexLookup::Eq {
                lookup = IndexLookup::Gte;
            }
            end_exprs.extend(prefix);
        }

        // Residual equalities pin later key columns to one value each, so an
        // order spoiled only by them is still recoverable.
        for key_col in &index.columns[next_key..] {
            let pinned = remaining.iter().any(|conjunct| {
                conjunct
                    .as_column_comparison(alias)
                    .is_some_and(|(op, col, comparand)| {
                        op.is_equality()
                            && col.column == *key_col
                            && !comparand.contains_subquery()
                    })
            });
            if pinned {
                equality_cols.insert(key_col.clone());
            }
        }

        let mut sort_direction =
            Self::order_direction(index, alias, &equality_cols, order_intent);

        let mut other_exprs = remaining;

        // Reverse scans: a descending order over a tree index works when the
        // scan has no end condition. The executor starts from the high end
        // and stops at the start key, so rows whose bounded column is NULL
        // are encountered before termination and need an explicit post
        // filter. With both bounds present we give up on the reversal and
        // let a sort node handle the order.
        if sort_direction == SortDirection::Desc {
            if covering_equality {
                // EQ probes cannot iterate backwards; degrade to GTE from
                // the same keys.
                lookup = IndexLookup::Gte;
            } else if !end_exprs.is_empty() {
                sort_direction = SortDirection::Invalid;
            } else if lookup == IndexLookup::Gt || lookup == IndexLookup::Gte {
                let bounded = &index.columns[next_key.min(index.columns.len() - 1)];
                let col = Expression::column(alias, bounded.clone());
                let already_not_null = other_exprs
                    .iter()
                    .any(|e| matches!(e, Expression::IsNotNull(inner) if **inner == col));
                if !already_not_null {
                    other_exprs.push(Expression::IsNotNull(Box::new(col)));
                }
            }
        }

        let useful = !index_exprs.is_empty()
            || !end_exprs.is_empty()
            || covering_equality
            || sort_direction.is_valid();
        if !useful {
            return None;
        }

        Some(AccessPath {
            index: Some(index.name.clone()),
            lookup,
            index_exprs,
            search_keys,
            end_exprs,
            other_exprs,
            eliminated_exprs: eliminated,
            sort_direction,
            covering_equality,
        })
    }

    /// Finds an equality (or, failing that, an IN-list) conjunct binding
    /// `key_col`. Returns its position, the comparand to use as a search key,
    /// and whether it was an IN-list. A point equality is always cheaper than
    /// an IN-list probe on the same column, so equalities are matched first.
    fn find_equality(
        remaining: &[Expression],
        alias: &str,
        key_col: &str,
        used_in_list: bool,
        prior_keys: &[Expression],
    ) -> Option<(usize, Expression, bool)> {
        for (pos, conjunct) in remaining.iter().enumerate() {
            if let Some((op, col, comparand)) = conjunct.as_column_comparison(alias) {
                if op.is_equality() && col.column == key_col && !comparand.contains_subquery() {
                    return Some((pos, comparand.clone(), false));
                }
            }
        }
        // At most one IN-list per path, and only when every earlier key is a
        // constant or parameter so the iteration stays well-formed.
        if used_in_list {
            return None;
        }
        for (pos, conjunct) in remaining.iter().enumerate() {
            if let Expression::InList(probe, list) = conjunct {
                let is_key = matches!(
                    probe.as_ref(),
                    Expression::Column(c) if c.table == alias && c.column == key_col
                );
                let list_ok = list.iter().all(|e| e.is_constant_or_parameter());
                let prefix_ok = prior_keys.iter().all(|k| k.is_constant_or_parameter());
                if is_key && list_ok && prefix_ok {
                    return Some((pos, conjunct.clone(), true));
                }
            }
        }
        None
    }

    /// Consumes range bounds on the first non-equality key column. A lower
    /// bound becomes the probe key, an upper bound becomes the end condition.
    /// A constant-prefix LIKE contributes both.
    #[allow(clippy::too_many_arguments)]
    fn consume_range(
        index: &Index,
        alias: &str,
        key_pos: usize,
        remaining: &mut Vec<Expression>,
        index_exprs: &mut Vec<Expression>,
        search_keys: &mut Vec<Expression>,
        end_exprs: &mut Vec<Expression>,
        lookup: &mut IndexLookup,
    ) {
        let Some(key_col) = index.columns.get(key_pos) else {
            return;
        };

        // LIKE 'prefix%' rewrites into a [prefix, successor) range that is
        // exact, so the original conjunct is fully consumed.
        if let Some(pos) = remaining.iter().position(|c| {
            Self::like_prefix(c, alias, key_col).is_some()
        }) {
            let conjunct = remaining.remove(pos);
            let (low, high) = Self::like_prefix(&conjunct, alias, key_col)
                .unwrap_or((String::new(), String::new()));
            *lookup = IndexLookup::Gte;
            search_keys.push(Expression::Constant(Value::string(low)));
            index_exprs.push(conjunct);
            end_exprs.push(Expression::compare(
                CompareOp::Lt,
                Expression::column(alias, key_col.clone()),
                Expression::Constant(Value::string(high)),
            ));
            return;
        }

        let mut lower: Option<usize> = None;
        let mut upper: Option<usize> = None;
        for (pos, conjunct) in remaining.iter().enumerate() {
            let Some((op, col, comparand)) = conjunct.as_column_comparison(alias) else {
                continue;
            };
            if col.column != *key_col || comparand.contains_subquery() {
                continue;
            }
            if op.is_lower_bound() && lower.is_none() {
                lower = Some(pos);
            } else if op.is_upper_bound() && upper.is_none() {
                upper = Some(pos);
            }
        }

        // Remove the higher position first so the lower index stays valid.
        match (lower, upper) {
            (Some(l), Some(u)) => {
                let (first, second) = if l > u { (l, u) } else { (u, l) };
                let first_expr = remaining.remove(first);
                let second_expr = remaining.remove(second);
                let (low_expr, up_expr) = if l > u {
                    (first_expr, second_expr)
                } else {
                    (second_expr, first_expr)
                };
                Self::apply_lower(low_expr, alias, lookup, index_exprs, search_keys);
                end_exprs.push(up_expr);
            }
            (Some(l), None) => {
                let low_expr = remaining.remove(l);
                Self::apply_lower(low_expr, alias, lookup, index_exprs, search_keys);
            }
            (None, Some(u)) => {
                // Scan from the start of the (prefix-bounded) range, stop at
                // the upper bound.
                *lookup = IndexLookup::Gte;
                end_exprs.push(remaining.remove(u));
            }
            (None, None) => {}
        }
    }

    fn apply_lower(
        conjunct: Expression,
        alias: &str,
        lookup: &mut IndexLookup,
        index_exprs: &mut Vec<Expression>,
        search_keys: &mut Vec<Expression>,
    ) {
        if let Some((op, _, comparand)) = conjunct.as_column_comparison(alias) {
            *lookup = match op {
                CompareOp::Gt => IndexLookup::Gt,
                _ => IndexLookup::Gte,
            };
            search_keys.push(comparand.clone());
        }
        index_exprs.push(conjunct);
    }

    /// Matches LIKE over the key column against a constant pattern with a
    /// single trailing wildcard. Returns the inclusive lower and exclusive
    /// upper string bounds.
    fn like_prefix(conjunct: &Expression, alias: &str, key_col: &str) -> Option<(String, String)> {
        let Expression::Like(probe, pattern) = conjunct else {
            return None;
        };
        let Expression::Column(col) = probe.as_ref() else {
            return None;
        };
        if col.table != alias || col.column != key_col {
            return None;
        }
        let Expression::Constant(Value::Str(pattern)) = pattern.as_ref() else {
            return None;
        };
        let prefix = pattern.strip_suffix('%')?;
        if prefix.is_empty() || prefix.contains(['%', '_']) {
            return None;
        }
        let successor = string_successor(prefix)?;
        Some((prefix.to_string(), successor))
    }

    /// Sort direction the index can provide for the requested ordering.
    /// Equality-bound key columns are transparent: an order spoiled only by
    /// them is still recoverable.
    fn order_direction(
        index: &Index,
        alias: &str,
        equality_cols: &HashSet<String>,
        order_intent: &[OrderByElement],
    ) -> SortDirection {
        if order_intent.is_empty() || !index.is_scannable() {
            return SortDirection::Invalid;
        }
        let mut direction: Option<Direction> = None;
        let mut keys = index.columns.iter();
        for elem in order_intent {
            let Expression::Column(ColumnRef { table, column }) = &elem.expression else {
                return SortDirection::Invalid;
            };
            if table != alias {
                return SortDirection::Invalid;
            }
            match direction {
                None => direction = Some(elem.direction),
                Some(d) if d != elem.direction => return SortDirection::Invalid,
                Some(_) => {}
            }
            // Advance through key columns, skipping equality-bound spoilers.
            loop {
                let Some(key) = keys.next() else {
                    return SortDirection::Invalid;
                };
                if key == column {
                    break;
                }
                if !equality_cols.contains(key) {
                    return SortDirection::Invalid;
                }
            }
        }
        match direction {
            Some(d) => SortDirection::from_direction(d),
            None => SortDirection::Invalid,
        }
    }

    fn is_geography_index(table: &Table, index: &Index) -> bool {
        index.columns.len() == 1
            && table
                .get_column(&index.columns[0])
                .is_some_and(|c| c.datatype == DataType::Geography)
    }

    /// A geography index answers CONTAINS(geo_column, probe) and nothing
    /// else; no ordering, no ranges.
    fn geography_path(
        index: &Index,
        alias: &str,
        conjuncts: &[Expression],
    ) -> Option<AccessPath> {
        let key_col = &index.columns[0];
        let pos = conjuncts.iter().position(|c| {
            let Expression::Function(name, args) = c else {
                return false;
            };
            if !name.eq_ignore_ascii_case("contains") || args.len() != 2 {
                return false;
            }
            matches!(
                &args[0],
                Expression::Column(col) if col.table == alias && col.column == *key_col
            ) && !args[1].references_table(alias)
        })?;
        let mut remaining = conjuncts.to_vec();
        let consumed = remaining.remove(pos);
        let Expression::Function(_, args) = &consumed else {
            return None;
        };
        let probe = args[1].clone();
        Some(AccessPath {
            index: Some(index.name.clone()),
            lookup: IndexLookup::GeoContains,
            index_exprs: vec![consumed.clone()],
            search_keys: vec![probe],
            end_exprs: Vec::new(),
            other_exprs: remaining,
            eliminated_exprs: Vec::new(),
            sort_direction: SortDirection::Invalid,
            covering_equality: false,
        })
    }

    /// Checks that the filters imply the partial-index predicate and moves
    /// the implied conjuncts into the eliminated bucket.
    fn consume_partial_predicate(
        predicate: &Expression,
        table_name: &str,
        alias: &str,
        remaining: &mut Vec<Expression>,
        eliminated: &mut Vec<Expression>,
    ) -> bool {
        for pred_conjunct in predicate.conjuncts() {
            let normalized = rewrite_alias(pred_conjunct, table_name, alias);
            let Some(pos) = remaining.iter().position(|c| *c == normalized) else {
                return false;
            };
            eliminated.push(remaining.remove(pos));
        }
        true
    }

    /// Serial (streaming) aggregation is possible when the index emits rows
    /// already grouped: the group-by columns must cover a prefix of the key
    /// columns.
    pub fn can_serialize_grouping(
        index: &Index,
        alias: &str,
        group_by: &[Expression],
    ) -> bool {
        if group_by.is_empty() || group_by.len() > index.columns.len() {
            return false;
        }
        let mut group_cols: HashSet<&str> = HashSet::new();
        for expr in group_by {
            let Expression::Column(ColumnRef { table, column }) = expr else {
                return false;
            };
            if table != alias {
                return false;
            }
            group_cols.insert(column);
        }
        index.columns[..group_cols.len()]
            .iter()
            .all(|key| group_cols.contains(key.as_str()))
    }
}

/// Builds the scan node for a chosen path.
pub fn scan_node(scan: &TableScan, path: &AccessPath) -> PlanNode {
    let predicate = Expression::and_combine(path.other_exprs.iter().cloned());
    match &path.index {
        None => PlanNode::SeqScan {
            table: scan.table.clone(),
            alias: scan.alias.clone(),
            predicate,
        },
        Some(index) => PlanNode::IndexScan {
            table: scan.table.clone(),
            alias: scan.alias.clone(),
            index: index.clone(),
            lookup: path.lookup,
            search_keys: path.search_keys.clone(),
            end_expr: Expression::and_combine(path.end_exprs.iter().cloned()),
            predicate,
            sort_direction: path.sort_direction,
        },
    }
}

/// Wraps a partition-fragment subtree in its Send/Receive boundary.
pub fn add_send_receive_pair(node: PlanNode) -> PlanNode {
    PlanNode::Receive {
        source: Box::new(PlanNode::Send {
            source: Box::new(node),
        }),
    }
}

/// Rewrites column references on `from` to alias `to`. Catalog-resident
/// partial-index predicates name the table; statement conjuncts name the
/// alias.
fn rewrite_alias(expr: &Expression, from: &str, to: &str) -> Expression {
    if from == to {
        return expr.clone();
    }
    match expr {
        Expression::Column(col) if col.table == from => {
            Expression::column(to, col.column.clone())
        }
        Expression::Column(_)
        | Expression::Constant(_)
        | Expression::Parameter(_)
        | Expression::Subquery(_) => expr.clone(),
        Expression::Compare(op, l, r) => Expression::Compare(
            *op,
            Box::new(rewrite_alias(l, from, to)),
            Box::new(rewrite_alias(r, from, to)),
        ),
        Expression::And(l, r) => Expression::And(
            Box::new(rewrite_alias(l, from, to)),
            Box::new(rewrite_alias(r, from, to)),
        ),
        Expression::Or(l, r) => Expression::Or(
            Box::new(rewrite_alias(l, from, to)),
            Box::new(rewrite_alias(r, from, to)),
        ),
        Expression::Not(e) => Expression::Not(Box::new(rewrite_alias(e, from, to))),
        Expression::IsNull(e) => Expression::IsNull(Box::new(rewrite_alias(e, from, to))),
        Expression::IsNotNull(e) => {
            Expression::IsNotNull(Box::new(rewrite_alias(e, from, to)))
        }
        Expression::Like(l, r) => Expression::Like(
            Box::new(rewrite_alias(l, from, to)),
            Box::new(rewrite_alias(r, from, to)),
        ),
        Expression::InList(e, list) => Expression::InList(
            Box::new(rewrite_alias(e, from, to)),
            list.iter().map(|i| rewrite_alias(i, from, to)).collect(),
        ),
        Expression::Function(name, args) => Expression::Function(
            name.clone(),
            args.iter().map(|a| rewrite_alias(a, from, to)).collect(),
        ),
    }
}

/// The exclusive upper bound for strings starting with `prefix`: the prefix
/// with its final character incremented. Returns None when the final
/// character has no direct successor; the rewrite is then skipped rather
/// than risk a loose bound.
fn string_successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    let last = chars.pop()?;
    let next = char::from_u32(last as u32 + 1)?;
    chars.push(next);
    Some(chars.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;

    fn table() -> Table {
        Table::new(
            "items",
            vec![
                Column::new("a", DataType::Integer),
                Column::new("b", DataType::Integer),
                Column::new("c", DataType::Integer),
                Column::new("name", DataType::Text),
                Column::new("region", DataType::Geography),
            ],
        )
        .with_index(Index::new("idx_abc", "items", vec!["a", "b", "c"]))
        .with_index(Index::new("idx_name", "items", vec!["name"]))
    }

    fn scan() -> TableScan {
        TableScan::new(0, "items", "i")
    }

    fn col(c: &str) -> Expression {
        Expression::column("i", c)
    }

    fn param_eq(c: &str, p: usize) -> Expression {
        Expression::eq(col(c), Expression::Parameter(p))
    }

    fn paths_for(conjuncts: Vec<Expression>, order: Vec<OrderByElement>) -> Vec<AccessPath> {
        IndexSelector::relevant_access_paths(&table(), &scan(), &conjuncts, &order)
    }

    fn index_path(paths: &[AccessPath], name: &str) -> AccessPath {
        paths
            .iter()
            .find(|p| p.index.as_deref() == Some(name))
            .cloned()
            .unwrap_or_else(|| panic!("no path over {}", name))
    }

    #[test]
    fn test_sequential_path_always_present() {
        let paths = paths_for(vec![], vec![]);
        assert_eq!(paths.len(), 1);
        assert!(paths[0].index.is_none());
    }

    #[test]
    fn test_equality_prefix_consumed_in_key_order() {
        let conjuncts = vec![param_eq("b", 1), param_eq("a", 0)];
        let paths = paths_for(conjuncts, vec![]);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.search_keys.len(), 2);
        // key order a then b, regardless of conjunct order
        assert_eq!(path.search_keys[0], Expression::Parameter(0));
        assert_eq!(path.search_keys[1], Expression::Parameter(1));
        // c stays unbound, so the probe degrades to a range start and the
        // equalities terminate the scan
        assert_eq!(path.lookup, IndexLookup::Gte);
        assert!(!path.covering_equality);
        assert_eq!(path.end_exprs.len(), 2);
        assert!(path.other_exprs.is_empty());
    }

    #[test]
    fn test_partial_equality_prefix_scans_as_range() {
        let conjuncts = vec![param_eq("a", 0)];
        let paths = paths_for(conjuncts, vec![]);
        let path = index_path(&paths, "idx_abc");
        assert!(!path.covering_equality);
        assert_eq!(path.lookup, IndexLookup::Gte);
        assert_eq!(path.search_keys, vec![Expression::Parameter(0)]);
        assert_eq!(path.end_exprs, vec![param_eq("a", 0)]);
    }

    #[test]
    fn test_gap_in_prefix_stops_matching() {
        // a = ?0 and c = ?1: c cannot be used without b
        let conjuncts = vec![param_eq("a", 0), param_eq("c", 1)];
        let paths = paths_for(conjuncts, vec![]);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.search_keys, vec![Expression::Parameter(0)]);
        assert_eq!(path.other_exprs.len(), 1);
        assert_eq!(path.accounted_conjuncts(), 3);
    }

    #[test]
    fn test_range_after_equality_prefix() {
        let conjuncts = vec![
            param_eq("a", 0),
            Expression::compare(CompareOp::Gt, col("b"), Expression::Parameter(1)),
            Expression::compare(CompareOp::Lte, col("b"), Expression::Parameter(2)),
        ];
        let paths = paths_for(conjuncts, vec![]);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.lookup, IndexLookup::Gt);
        assert_eq!(path.search_keys.len(), 2);
        // the upper bound plus the prefix equality end the scan
        assert_eq!(path.end_exprs.len(), 2);
        assert!(path.other_exprs.is_empty());
    }

    #[test]
    fn test_not_distinct_counts_as_equality() {
        let conjuncts = vec![Expression::compare(
            CompareOp::NotDistinct,
            col("a"),
            Expression::Parameter(0),
        )];
        let paths = paths_for(conjuncts, vec![]);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.search_keys, vec![Expression::Parameter(0)]);
        assert_eq!(path.lookup, IndexLookup::Gte);
        assert_eq!(path.end_exprs.len(), 1);
    }

    #[test]
    fn test_in_list_requires_constant_prefix() {
        let in_list = Expression::InList(
            Box::new(col("b")),
            vec![Expression::Parameter(1), Expression::Parameter(2)],
        );
        // constant prefix: usable
        let paths = paths_for(vec![param_eq("a", 0), in_list.clone()], vec![]);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.search_keys.len(), 2);
        assert_eq!(path.search_keys[1], in_list);

        // column-valued prefix comparand: IN stays a residual filter
        let join_eq = Expression::eq(col("a"), Expression::column("other", "x"));
        let paths = paths_for(vec![join_eq, in_list.clone()], vec![]);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.search_keys.len(), 1);
        assert!(path.other_exprs.contains(&in_list));
    }

    #[test]
    fn test_plain_equality_preferred_over_in_list() {
        let in_list = Expression::InList(
            Box::new(col("a")),
            vec![Expression::Parameter(1), Expression::Parameter(2)],
        );
        // the point equality on a wins even though the IN-list comes first
        let paths = paths_for(vec![in_list.clone(), param_eq("a", 0)], vec![]);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.search_keys, vec![Expression::Parameter(0)]);
        assert!(path.other_exprs.contains(&in_list));
    }

    #[test]
    fn test_like_prefix_rewrite() {
        let like = Expression::Like(
            Box::new(col("name")),
            Box::new(Expression::Constant(Value::string("abc%"))),
        );
        let paths = paths_for(vec![like], vec![]);
        let path = index_path(&paths, "idx_name");
        assert_eq!(path.lookup, IndexLookup::Gte);
        assert_eq!(
            path.search_keys,
            vec![Expression::Constant(Value::string("abc"))]
        );
        assert_eq!(path.end_exprs.len(), 1);
        assert_eq!(
            path.end_exprs[0],
            Expression::compare(
                CompareOp::Lt,
                col("name"),
                Expression::Constant(Value::string("abd"))
            )
        );
        assert!(path.other_exprs.is_empty());
    }

    #[test]
    fn test_like_with_inner_wildcard_not_rewritten() {
        let like = Expression::Like(
            Box::new(col("name")),
            Box::new(Expression::Constant(Value::string("a_c%"))),
        );
        let paths = paths_for(vec![like], vec![]);
        // idx_name gains nothing, so only the sequential path remains
        assert!(paths.iter().all(|p| p.index.as_deref() != Some("idx_name")));
    }

    #[test]
    fn test_order_alignment_with_equality_spoiler() {
        // ORDER BY a, c with b pinned by equality
        let conjuncts = vec![param_eq("b", 0)];
        let order = vec![
            OrderByElement::asc(col("a")),
            OrderByElement::asc(col("c")),
        ];
        let paths = paths_for(conjuncts, order);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.sort_direction, SortDirection::Asc);

        // without the equality the spoiler stands
        let order = vec![
            OrderByElement::asc(col("a")),
            OrderByElement::asc(col("c")),
        ];
        let paths = paths_for(vec![], order);
        assert!(paths.iter().all(|p| p.index.as_deref() != Some("idx_abc")));
    }

    #[test]
    fn test_mixed_directions_spoil_order() {
        let order = vec![
            OrderByElement::asc(col("a")),
            OrderByElement::desc(col("b")),
        ];
        let paths = paths_for(vec![param_eq("a", 0)], order);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.sort_direction, SortDirection::Invalid);
    }

    #[test]
    fn test_reverse_scan_adds_not_null_filter() {
        let conjuncts = vec![Expression::compare(
            CompareOp::Gte,
            col("a"),
            Expression::Parameter(0),
        )];
        let order = vec![OrderByElement::desc(col("a"))];
        let paths = paths_for(conjuncts, order);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.sort_direction, SortDirection::Desc);
        assert!(path
            .other_exprs
            .iter()
            .any(|e| matches!(e, Expression::IsNotNull(_))));
    }

    #[test]
    fn test_reverse_scan_with_both_bounds_falls_back() {
        let conjuncts = vec![
            Expression::compare(CompareOp::Gte, col("a"), Expression::Parameter(0)),
            Expression::compare(CompareOp::Lt, col("a"), Expression::Parameter(1)),
        ];
        let order = vec![OrderByElement::desc(col("a"))];
        let paths = paths_for(conjuncts, order);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.sort_direction, SortDirection::Invalid);
        assert!(!path
            .other_exprs
            .iter()
            .any(|e| matches!(e, Expression::IsNotNull(_))));
    }

    #[test]
    fn test_covering_equality_reverse_degrades_to_gte() {
        let tbl = Table::new("t", vec![Column::new("a", DataType::Integer)])
            .with_index(Index::new("idx_a", "t", vec!["a"]));
        let scan = TableScan::new(0, "t", "t");
        let conjuncts = vec![Expression::eq(
            Expression::column("t", "a"),
            Expression::Parameter(0),
        )];
        let order = vec![OrderByElement::desc(Expression::column("t", "a"))];
        let paths = IndexSelector::relevant_access_paths(&tbl, &scan, &conjuncts, &order);
        let path = index_path(&paths, "idx_a");
        assert!(path.covering_equality);
        assert_eq!(path.lookup, IndexLookup::Gte);
    }

    #[test]
    fn test_hash_index_needs_full_equality() {
        let tbl = Table::new(
            "t",
            vec![
                Column::new("a", DataType::Integer),
                Column::new("b", DataType::Integer),
            ],
        )
        .with_index(Index::new("h_ab", "t", vec!["a", "b"]).hash());
        let scan = TableScan::new(0, "t", "t");

        let partial = vec![Expression::eq(
            Expression::column("t", "a"),
            Expression::Parameter(0),
        )];
        let paths = IndexSelector::relevant_access_paths(&tbl, &scan, &partial, &[]);
        assert!(paths.iter().all(|p| p.index.is_none()));

        let full = vec![
            Expression::eq(Expression::column("t", "a"), Expression::Parameter(0)),
            Expression::eq(Expression::column("t", "b"), Expression::Parameter(1)),
        ];
        let paths = IndexSelector::relevant_access_paths(&tbl, &scan, &full, &[]);
        let path = index_path(&paths, "h_ab");
        assert!(path.covering_equality);
        assert_eq!(path.lookup, IndexLookup::Eq);
    }

    #[test]
    fn test_partial_index_coverage() {
        let predicate = Expression::IsNotNull(Box::new(Expression::column("t", "b")));
        let tbl = Table::new(
            "t",
            vec![
                Column::new("a", DataType::Integer),
                Column::new("b", DataType::Integer),
            ],
        )
        .with_index(Index::new("p_a", "t", vec!["a"]).partial(predicate));
        let scan = TableScan::new(0, "t", "x");

        // filter implies the predicate (alias-normalized) and is eliminated
        let conjuncts = vec![
            Expression::IsNotNull(Box::new(Expression::column("x", "b"))),
            Expression::eq(Expression::column("x", "a"), Expression::Parameter(0)),
        ];
        let paths = IndexSelector::relevant_access_paths(&tbl, &scan, &conjuncts, &[]);
        let path = index_path(&paths, "p_a");
        assert_eq!(path.eliminated_exprs.len(), 1);
        assert_eq!(path.search_keys, vec![Expression::Parameter(0)]);
        assert!(path.other_exprs.is_empty());

        // without coverage the index is unusable
        let conjuncts = vec![Expression::eq(
            Expression::column("x", "a"),
            Expression::Parameter(0),
        )];
        let paths = IndexSelector::relevant_access_paths(&tbl, &scan, &conjuncts, &[]);
        assert!(paths.iter().all(|p| p.index.is_none()));
    }

    #[test]
    fn test_geography_containment_path() {
        let tbl = table().with_index(Index::new("geo_region", "items", vec!["region"]));
        let probe = Expression::Function(
            "CONTAINS".into(),
            vec![col("region"), Expression::Parameter(0)],
        );
        let paths =
            IndexSelector::relevant_access_paths(&tbl, &scan(), &[probe.clone()], &[]);
        let path = index_path(&paths, "geo_region");
        assert_eq!(path.lookup, IndexLookup::GeoContains);
        assert_eq!(path.search_keys, vec![Expression::Parameter(0)]);

        // no containment conjunct, no geography path
        let paths = IndexSelector::relevant_access_paths(&tbl, &scan(), &[], &[]);
        assert!(paths.iter().all(|p| p.index.as_deref() != Some("geo_region")));
    }

    #[test]
    fn test_join_comparand_marks_outer_alias() {
        let conjuncts = vec![Expression::eq(col("a"), Expression::column("o", "id"))];
        let paths = paths_for(conjuncts, vec![]);
        let path = index_path(&paths, "idx_abc");
        assert_eq!(path.outer_aliases("i"), vec!["o".to_string()]);
    }

    #[test]
    fn test_serial_grouping_prefix() {
        let idx = Index::new("idx_abc", "items", vec!["a", "b", "c"]);
        assert!(IndexSelector::can_serialize_grouping(
            &idx,
            "i",
            &[col("a"), col("b")]
        ));
        // order inside the prefix does not matter
        assert!(IndexSelector::can_serialize_grouping(
            &idx,
            "i",
            &[col("b"), col("a")]
        ));
        // non-prefix grouping cannot stream
        assert!(!IndexSelector::can_serialize_grouping(&idx, "i", &[col("b")]));
    }

    #[test]
    fn test_string_successor() {
        assert_eq!(string_successor("abc"), Some("abd".to_string()));
        assert_eq!(string_successor("ab\u{10FFFF}"), None);
    }
}
