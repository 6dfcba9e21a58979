//! Join order enumeration
//!
//! Drives the candidate-plan stream for a SELECT's FROM clause. For each
//! candidate join order the enumerator assigns the statement's conjuncts to
//! the lowest node that can evaluate them, generates access paths per scan,
//! and emits every bounded combination as a joined subplan. Candidates that
//! violate the partitioning rules are skipped, not errors; the planner
//! reports failure only when every candidate is gone.

use super::access_path::{scan_node, AccessPath, IndexSelector};
use super::partitioning::{PartitioningHint, StatementPartitioning, ValueEquivalence};
use super::plan::PlanNode;
use crate::error::{Error, Result};
use crate::statement::{JoinTree, OrderByElement, ParsedSelect, TableScan, PERMUTATION_LIMIT};
use crate::types::{Catalog, Expression, JoinType};
use std::collections::VecDeque;

/// Hard cap on candidate plans per statement. The enumerator stops producing
/// once reached; whatever the selector has seen by then wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerationBudget {
    pub max_candidates: usize,
}

impl Default for EnumerationBudget {
    fn default() -> Self {
        EnumerationBudget {
            max_candidates: 2000,
        }
    }
}

/// Streams joined subplans for one SELECT, one candidate at a time.
pub struct JoinOrderEnumerator<'a> {
    catalog: &'a Catalog,
    select: &'a ParsedSelect,
    partitioning: StatementPartitioning,
    orders: VecDeque<JoinTree>,
    buffer: VecDeque<PlanNode>,
    budget: EnumerationBudget,
    produced: usize,
}

impl<'a> JoinOrderEnumerator<'a> {
    pub fn new(
        catalog: &'a Catalog,
        select: &'a ParsedSelect,
        hint: PartitioningHint,
        budget: EnumerationBudget,
    ) -> Result<Self> {
        let aliases = select.scan_aliases();
        let tree = select
            .join_tree
            .clone()
            .simplify_outer_joins(&select.where_exprs, &aliases);

        let equivalence = ValueEquivalence::build(equivalence_conjuncts(&tree, select));
        let mut partitioning = StatementPartitioning::new(hint);
        partitioning.analyze(&select.scans, &equivalence, catalog)?;

        let orders = match &select.join_order_hint {
            Some(hint_aliases) => {
                VecDeque::from([forced_order(select, &tree, hint_aliases)?])
            }
            None => tree.generate_orders(PERMUTATION_LIMIT).into(),
        };

        Ok(JoinOrderEnumerator {
            catalog,
            select,
            partitioning,
            orders,
            buffer: VecDeque::new(),
            budget,
            produced: 0,
        })
    }

    pub fn partitioning(&self) -> &StatementPartitioning {
        &self.partitioning
    }

    /// The next candidate subplan, or None once orders or budget run out.
    /// The returned tree has no Send/Receive boundary yet; statement shaping
    /// adds it.
    pub fn next_plan(&mut self) -> Result<Option<(PlanNode, StatementPartitioning)>> {
        loop {
            if let Some(plan) = self.buffer.pop_front() {
                return Ok(Some((plan, self.partitioning.clone())));
            }
            if self.produced >= self.budget.max_candidates {
                return Ok(None);
            }
            let Some(order) = self.orders.pop_front() else {
                return Ok(None);
            };
            // Joins of independently partitioned tables cannot run in two
            // fragments: skip the candidate.
            if !self.partitioning.is_join_valid() {
                continue;
            }
            let pool: Vec<Expression> = self
                .select
                .where_exprs
                .iter()
                .flat_map(|e| e.conjuncts().into_iter().cloned().collect::<Vec<_>>())
                .collect();
            for plan in self.subplans(&order, pool, true)? {
                if self.produced >= self.budget.max_candidates {
                    break;
                }
                self.produced += 1;
                self.buffer.push_back(plan);
            }
        }
    }

    /// All access-path combinations for one ordered (sub)tree. `pool` holds
    /// the unassigned conjuncts relevant to this subtree; `leftmost` is true
    /// on the spine that ends at the order's first scan, which is the only
    /// scan whose index ordering can serve the statement's ORDER BY.
    fn subplans(
        &self,
        tree: &JoinTree,
        pool: Vec<Expression>,
        leftmost: bool,
    ) -> Result<Vec<PlanNode>> {
        match tree {
            JoinTree::Leaf { scan, .. } => {
                let scan = &self.select.scans[*scan];
                let paths = self.leaf_paths(scan, &pool, leftmost)?;
                Ok(paths.iter().map(|p| scan_node(scan, p)).collect())
            }
            JoinTree::Branch {
                join_type,
                left,
                right,
                join_exprs,
                where_exprs,
                ..
            } => self.branch_subplans(
                *join_type, left, right, join_exprs, where_exprs, pool, leftmost,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn branch_subplans(
        &self,
        join_type: JoinType,
        left: &JoinTree,
        right: &JoinTree,
        join_exprs: &[Expression],
        where_exprs: &[Expression],
        mut pool: Vec<Expression>,
        leftmost: bool,
    ) -> Result<Vec<PlanNode>> {
        if self.outer_join_breaks_partitions(join_type, left, right)? {
            return Ok(Vec::new());
        }

        for expr in where_exprs {
            pool.extend(expr.conjuncts().into_iter().cloned());
        }
        let join_conjuncts: Vec<Expression> = join_exprs
            .iter()
            .flat_map(|e| e.conjuncts().into_iter().cloned().collect::<Vec<_>>())
            .collect();

        let aliases = self.select.scan_aliases();
        let left_aliases = left.alias_list(&aliases);
        let right_aliases = right.alias_list(&aliases);
        let within = |expr: &Expression, side: &[&str]| {
            expr.referenced_tables().iter().all(|t| side.contains(t))
        };

        // WHERE conjuncts: push to the side that covers them. Below an outer
        // join only the outer side may filter early; anything touching the
        // inner side must run after padding.
        let mut to_left = Vec::new();
        let mut to_right = Vec::new();
        let mut post_filters = Vec::new();
        for conjunct in pool {
            match join_type {
                JoinType::Inner => {
                    if within(&conjunct, &left_aliases) {
                        to_left.push(conjunct);
                    } else if within(&conjunct, &right_aliases) {
                        to_right.push(conjunct);
                    } else {
                        post_filters.push(conjunct);
                    }
                }
                JoinType::Left => {
                    if within(&conjunct, &left_aliases) {
                        to_left.push(conjunct);
                    } else {
                        post_filters.push(conjunct);
                    }
                }
                JoinType::Full | JoinType::Right => post_filters.push(conjunct),
            }
        }

        // ON conjuncts: for inner joins they behave like filters. For a LEFT
        // join only inner-side-only conjuncts may move (they narrow the
        // match set, not the outer rows). FULL joins keep everything in the
        // match condition.
        let mut cross = Vec::new();
        for conjunct in join_conjuncts {
            match join_type {
                JoinType::Inner => {
                    if within(&conjunct, &left_aliases) {
                        to_left.push(conjunct);
                    } else if within(&conjunct, &right_aliases) {
                        to_right.push(conjunct);
                    } else {
                        cross.push(conjunct);
                    }
                }
                JoinType::Left => {
                    if within(&conjunct, &right_aliases) {
                        to_right.push(conjunct);
                    } else {
                        cross.push(conjunct);
                    }
                }
                JoinType::Full | JoinType::Right => cross.push(conjunct),
            }
        }

        // For inner joins the cross conjuncts fold into the post-filter-free
        // match condition; a residual WHERE conjunct spanning both sides of
        // an inner join is also just a match condition.
        if join_type == JoinType::Inner {
            cross.append(&mut post_filters);
        }

        let left_plans = self.subplans(left, to_left, leftmost)?;
        let post_predicate = Expression::and_combine(post_filters);

        let mut out = Vec::new();
        if let JoinTree::Leaf { scan, .. } = right {
            let scan = &self.select.scans[*scan];
            // The inner leaf sees its own conjuncts plus the cross ones; a
            // path may consume cross conjuncts as index probe keys, turning
            // the join into an index join.
            let mut leaf_conjuncts = to_right.clone();
            leaf_conjuncts.extend(cross.iter().cloned());
            let table = self.catalog.get_table(&scan.table)?;
            let paths =
                IndexSelector::relevant_access_paths(table, scan, &leaf_conjuncts, &[]);
            for path in &paths {
                let Some(node) = self.inner_leaf_join(
                    join_type,
                    scan,
                    path,
                    &left_aliases,
                    post_predicate.clone(),
                ) else {
                    continue;
                };
                for left_plan in &left_plans {
                    out.push(node.clone().with_outer(left_plan.clone()));
                }
            }
        } else {
            let right_plans = self.subplans(right, to_right, false)?;
            let predicate = Expression::and_combine(cross);
            for left_plan in &left_plans {
                for right_plan in &right_plans {
                    out.push(PlanNode::NestLoopJoin {
                        join_type,
                        left: Box::new(left_plan.clone()),
                        right: Box::new(right_plan.clone()),
                        predicate: predicate.clone(),
                        post_predicate: post_predicate.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Builds the join node skeleton for an inner-side leaf path, with a
    /// placeholder outer child. Returns None when the path depends on tables
    /// outside the outer subtree.
    fn inner_leaf_join(
        &self,
        join_type: JoinType,
        scan: &TableScan,
        path: &AccessPath,
        left_aliases: &[&str],
        post_predicate: Option<Expression>,
    ) -> Option<JoinSkeleton> {
        let outer_refs = path.outer_aliases(&scan.alias);
        if !outer_refs.iter().all(|a| left_aliases.contains(&a.as_str())) {
            return None;
        }

        // Residual conjuncts that reference the outer side become the join
        // condition; the rest stays on the scan.
        let mut scan_path = path.clone();
        let mut join_filters = Vec::new();
        scan_path.other_exprs.retain(|conjunct| {
            let crosses = conjunct
                .referenced_tables()
                .iter()
                .any(|t| *t != scan.alias);
            if crosses {
                join_filters.push(conjunct.clone());
            }
            !crosses
        });
        let predicate = Expression::and_combine(join_filters);
        let inner = scan_node(scan, &scan_path);

        Some(JoinSkeleton {
            join_type,
            indexed: !outer_refs.is_empty(),
            inner,
            predicate,
            post_predicate,
        })
    }

    fn leaf_paths(
        &self,
        scan: &TableScan,
        conjuncts: &[Expression],
        leftmost: bool,
    ) -> Result<Vec<AccessPath>> {
        let table = self.catalog.get_table(&scan.table)?;
        let order_intent = if leftmost {
            statement_order_intent(self.select)
        } else {
            Vec::new()
        };
        Ok(IndexSelector::relevant_access_paths(
            table,
            scan,
            conjuncts,
            &order_intent,
        ))
    }

    /// Outer joins whose padding would be computed independently on every
    /// partition produce wrong answers in a two-fragment plan. A LEFT join
    /// needs its outer side partitioned whenever the inner side is; a FULL
    /// join needs both sides partitioned (one co-partitioned group) or
    /// neither.
    fn outer_join_breaks_partitions(
        &self,
        join_type: JoinType,
        left: &JoinTree,
        right: &JoinTree,
    ) -> Result<bool> {
        if !self.partitioning.requires_two_fragments() {
            return Ok(false);
        }
        let left_partitioned = self.has_partitioned_table(left)?;
        let right_partitioned = self.has_partitioned_table(right)?;
        Ok(match join_type {
            JoinType::Left | JoinType::Right => right_partitioned && !left_partitioned,
            JoinType::Full => left_partitioned != right_partitioned,
            JoinType::Inner => false,
        })
    }

    fn has_partitioned_table(&self, tree: &JoinTree) -> Result<bool> {
        for scan_idx in tree.leaf_scans() {
            let scan = &self.select.scans[scan_idx];
            if self
                .catalog
                .get_table(&scan.table)?
                .partition_column()
                .is_some()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// A join node waiting for its outer child.
#[derive(Clone)]
struct JoinSkeleton {
    join_type: JoinType,
    indexed: bool,
    inner: PlanNode,
    predicate: Option<Expression>,
    post_predicate: Option<Expression>,
}

impl JoinSkeleton {
    fn with_outer(self, outer: PlanNode) -> PlanNode {
        if self.indexed {
            PlanNode::NestLoopIndexJoin {
                join_type: self.join_type,
                outer: Box::new(outer),
                inner: Box::new(self.inner),
                predicate: self.predicate,
                post_predicate: self.post_predicate,
            }
        } else {
            PlanNode::NestLoopJoin {
                join_type: self.join_type,
                left: Box::new(outer),
                right: Box::new(self.inner),
                predicate: self.predicate,
                post_predicate: self.post_predicate,
            }
        }
    }
}

/// The ordering the statement would like its outer scan to produce: the
/// ORDER BY clause, or failing that the sort a window function needs
/// (PARTITION BY columns then the window's ORDER BY).
pub(crate) fn statement_order_intent(select: &ParsedSelect) -> Vec<OrderByElement> {
    if !select.order_by.is_empty() {
        return select.order_by.clone();
    }
    let Some(window) = select.window_functions.first() else {
        return Vec::new();
    };
    let mut elements: Vec<OrderByElement> = window
        .partition_by
        .iter()
        .cloned()
        .map(OrderByElement::asc)
        .collect();
    elements.extend(window.order_by.iter().cloned());
    elements
}

/// Conjuncts that constrain values for partitioning purposes: the WHERE
/// clause plus ON clauses of inner joins. Outer-join ON clauses do not
/// constrain the padded output and are excluded.
fn equivalence_conjuncts<'a>(
    tree: &'a JoinTree,
    select: &'a ParsedSelect,
) -> Vec<&'a Expression> {
    let mut out = Vec::new();
    for expr in &select.where_exprs {
        out.extend(expr.conjuncts());
    }
    collect_inner_on(tree, &mut out);
    out
}

fn collect_inner_on<'a>(tree: &'a JoinTree, out: &mut Vec<&'a Expression>) {
    if let JoinTree::Branch {
        join_type,
        left,
        right,
        join_exprs,
        where_exprs,
        ..
    } = tree
    {
        for expr in where_exprs {
            out.extend(expr.conjuncts());
        }
        if *join_type == JoinType::Inner {
            for expr in join_exprs {
                out.extend(expr.conjuncts());
            }
        }
        collect_inner_on(left, out);
        collect_inner_on(right, out);
    }
}

/// Validates a join-order hint and rebuilds the tree in that order. Hints
/// apply to inner-join-only statements; each alias must name exactly one
/// scan.
fn forced_order(
    select: &ParsedSelect,
    tree: &JoinTree,
    hint_aliases: &[String],
) -> Result<JoinTree> {
    let invalid = |reason: &str| Error::InvalidJoinOrderHint {
        reason: reason.to_string(),
        sql: select.sql.clone(),
    };
    if hint_aliases.len() != select.scans.len() {
        return Err(invalid("hint must list every table exactly once"));
    }
    let mut order = Vec::with_capacity(hint_aliases.len());
    for alias in hint_aliases {
        let scan = select
            .scan_by_alias(alias)
            .ok_or_else(|| invalid(&format!("unknown table alias '{}'", alias)))?;
        if order.contains(&scan.id) {
            return Err(invalid(&format!("table alias '{}' listed twice", alias)));
        }
        order.push(scan.id);
    }
    // scan ids equal scan positions
    tree.with_leaf_order(&order)
        .ok_or_else(|| invalid("outer joins do not permit a forced join order"))
}
