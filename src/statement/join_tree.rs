//! Join tree and join-order generation
//!
//! The FROM clause parses into a binary join tree whose leaves index into the
//! statement's scan list. The enumerator asks the tree for candidate orders:
//! maximal runs of INNER joins permute freely (up to a leaf limit), a LEFT
//! join fixes its operand order, and a FULL join contributes the parsed order
//! plus its swap. RIGHT joins are normalized to LEFT at construction and
//! never appear below here.

use crate::types::{Expression, JoinType};

/// The maximum number of elements in an inner-join region that still gets
/// full factorial permutation. Larger regions fall back to the parsed order.
pub const PERMUTATION_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum JoinTree {
    /// A base table scan. `scan` indexes into the statement's scan list.
    Leaf { id: usize, scan: usize },
    Branch {
        id: usize,
        join_type: JoinType,
        left: Box<JoinTree>,
        right: Box<JoinTree>,
        /// Conjuncts from the ON clause.
        join_exprs: Vec<Expression>,
        /// WHERE conjuncts the parser associated with this subtree.
        where_exprs: Vec<Expression>,
    },
}

impl JoinTree {
    pub fn leaf(id: usize, scan: usize) -> Self {
        JoinTree::Leaf { id, scan }
    }

    /// Builds a branch, normalizing RIGHT to LEFT by swapping operands.
    pub fn branch(
        id: usize,
        join_type: JoinType,
        left: JoinTree,
        right: JoinTree,
        join_exprs: Vec<Expression>,
        where_exprs: Vec<Expression>,
    ) -> Self {
        let (join_type, left, right) = match join_type {
            JoinType::Right => (JoinType::Left, right, left),
            other => (other, left, right),
        };
        JoinTree::Branch {
            id,
            join_type,
            left: Box::new(left),
            right: Box::new(right),
            join_exprs,
            where_exprs,
        }
    }

    pub fn id(&self) -> usize {
        match self {
            JoinTree::Leaf { id, .. } => *id,
            JoinTree::Branch { id, .. } => *id,
        }
    }

    /// Scan indices of every leaf, left to right.
    pub fn leaf_scans(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_leaf_scans(&mut out);
        out
    }

    fn collect_leaf_scans(&self, out: &mut Vec<usize>) {
        match self {
            JoinTree::Leaf { scan, .. } => out.push(*scan),
            JoinTree::Branch { left, right, .. } => {
                left.collect_leaf_scans(out);
                right.collect_leaf_scans(out);
            }
        }
    }

    /// Aliases of the tables under this subtree. `scan_aliases` is indexed by
    /// scan position.
    pub fn alias_list<'a>(&self, scan_aliases: &'a [String]) -> Vec<&'a str> {
        self.leaf_scans()
            .into_iter()
            .map(|s| scan_aliases[s].as_str())
            .collect()
    }

    /// All join and where conjuncts stored anywhere in the tree.
    pub fn all_exprs(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        self.collect_exprs(&mut out);
        out
    }

    fn collect_exprs<'a>(&'a self, out: &mut Vec<&'a Expression>) {
        if let JoinTree::Branch {
            left,
            right,
            join_exprs,
            where_exprs,
            ..
        } = self
        {
            left.collect_exprs(out);
            right.collect_exprs(out);
            out.extend(join_exprs.iter());
            out.extend(where_exprs.iter());
        }
    }

    pub fn is_all_inner(&self) -> bool {
        match self {
            JoinTree::Leaf { .. } => true,
            JoinTree::Branch {
                join_type,
                left,
                right,
                ..
            } => *join_type == JoinType::Inner && left.is_all_inner() && right.is_all_inner(),
        }
    }

    /// Converts outer joins to simpler forms where a null-rejecting filter
    /// above them makes the padding unobservable. A LEFT join whose inner
    /// side is null-rejected becomes INNER. A FULL join degrades per side:
    /// both sides rejected gives INNER, one side rejected gives LEFT (with a
    /// swap when the rejected side was the outer one). The rewrite is
    /// idempotent.
    pub fn simplify_outer_joins(
        self,
        where_exprs: &[Expression],
        scan_aliases: &[String],
    ) -> JoinTree {
        let pool: Vec<Expression> = where_exprs
            .iter()
            .flat_map(|e| e.conjuncts().into_iter().cloned().collect::<Vec<_>>())
            .collect();
        self.simplify_with(&pool, scan_aliases)
    }

    fn simplify_with(self, pool: &[Expression], scan_aliases: &[String]) -> JoinTree {
        let JoinTree::Branch {
            id,
            mut join_type,
            mut left,
            mut right,
            join_exprs,
            where_exprs,
        } = self
        else {
            return self;
        };

        let left_aliases = left.alias_list(scan_aliases);
        let right_aliases = right.alias_list(scan_aliases);
        match join_type {
            JoinType::Left => {
                if pool.iter().any(|e| e.is_null_rejecting_for(&right_aliases)) {
                    join_type = JoinType::Inner;
                }
            }
            JoinType::Full => {
                let outer_rejected =
                    pool.iter().any(|e| e.is_null_rejecting_for(&left_aliases));
                let inner_rejected =
                    pool.iter().any(|e| e.is_null_rejecting_for(&right_aliases));
                match (outer_rejected, inner_rejected) {
                    (true, true) => join_type = JoinType::Inner,
                    (false, true) => join_type = JoinType::Left,
                    (true, false) => {
                        join_type = JoinType::Left;
                        std::mem::swap(&mut left, &mut right);
                    }
                    (false, false) => {}
                }
            }
            JoinType::Inner | JoinType::Right => {}
        }

        // Children additionally see this branch's WHERE conjuncts, and its
        // ON conjuncts once the join is inner (they filter rather than pad).
        let mut child_pool = pool.to_vec();
        for e in &where_exprs {
            child_pool.extend(e.conjuncts().into_iter().cloned());
        }
        if join_type == JoinType::Inner {
            for e in &join_exprs {
                child_pool.extend(e.conjuncts().into_iter().cloned());
            }
        }

        let left = Box::new(left.simplify_with(&child_pool, scan_aliases));
        let right = Box::new(right.simplify_with(&child_pool, scan_aliases));
        JoinTree::Branch {
            id,
            join_type,
            left,
            right,
            join_exprs,
            where_exprs,
        }
    }

    /// Generates the candidate join orders for this tree, best order first is
    /// not guaranteed; the caller costs each resulting plan.
    pub fn generate_orders(&self, permutation_limit: usize) -> Vec<JoinTree> {
        match self {
            JoinTree::Leaf { .. } => vec![self.clone()],
            JoinTree::Branch {
                id,
                join_type,
                left,
                right,
                join_exprs,
                where_exprs,
            } => match join_type {
                JoinType::Inner => self.inner_region_orders(permutation_limit),
                JoinType::Left | JoinType::Right => {
                    let mut out = Vec::new();
                    for l in left.generate_orders(permutation_limit) {
                        for r in right.generate_orders(permutation_limit) {
                            out.push(JoinTree::Branch {
                                id: *id,
                                join_type: JoinType::Left,
                                left: Box::new(l.clone()),
                                right: Box::new(r),
                                join_exprs: join_exprs.clone(),
                                where_exprs: where_exprs.clone(),
                            });
                        }
                    }
                    out
                }
                JoinType::Full => {
                    let mut out = Vec::new();
                    for l in left.generate_orders(permutation_limit) {
                        for r in right.generate_orders(permutation_limit) {
                            out.push(JoinTree::Branch {
                                id: *id,
                                join_type: JoinType::Full,
                                left: Box::new(l.clone()),
                                right: Box::new(r.clone()),
                                join_exprs: join_exprs.clone(),
                                where_exprs: where_exprs.clone(),
                            });
                            out.push(JoinTree::Branch {
                                id: *id,
                                join_type: JoinType::Full,
                                left: Box::new(r),
                                right: Box::new(l.clone()),
                                join_exprs: join_exprs.clone(),
                                where_exprs: where_exprs.clone(),
                            });
                        }
                    }
                    out
                }
            },
        }
    }

    /// Rebuilds the tree in an externally forced leaf order. Only legal when
    /// every join in the tree is INNER; `order` lists scan indices.
    pub fn with_leaf_order(&self, order: &[usize]) -> Option<JoinTree> {
        if !self.is_all_inner() {
            return None;
        }
        let mut elements = Vec::new();
        let mut ids = Vec::new();
        let mut join_exprs = Vec::new();
        let mut where_exprs = Vec::new();
        self.collect_inner_region(&mut elements, &mut ids, &mut join_exprs, &mut where_exprs);
        // All-inner tree: every element is a leaf.
        let mut ordered = Vec::with_capacity(order.len());
        for scan in order {
            let leaf = elements
                .iter()
                .find(|e| matches!(e, JoinTree::Leaf { scan: s, .. } if s == scan))?;
            ordered.push((*leaf).clone());
        }
        if ordered.len() != elements.len() {
            return None;
        }
        build_left_deep(ordered, &ids, join_exprs, where_exprs)
    }

    fn inner_region_orders(&self, permutation_limit: usize) -> Vec<JoinTree> {
        let mut elements = Vec::new();
        let mut ids = Vec::new();
        let mut join_exprs = Vec::new();
        let mut where_exprs = Vec::new();
        self.collect_inner_region(&mut elements, &mut ids, &mut join_exprs, &mut where_exprs);

        let variant_lists: Vec<Vec<JoinTree>> = elements
            .iter()
            .map(|e| e.generate_orders(permutation_limit))
            .collect();

        let mut out = Vec::new();
        for combo in cross_product(&variant_lists) {
            if combo.len() > permutation_limit {
                // Too many elements to permute: keep the parsed order.
                out.extend(build_left_deep(
                    combo,
                    &ids,
                    join_exprs.clone(),
                    where_exprs.clone(),
                ));
                continue;
            }
            for perm in permutations(combo.len()) {
                let ordered: Vec<JoinTree> =
                    perm.iter().map(|&i| combo[i].clone()).collect();
                out.extend(build_left_deep(
                    ordered,
                    &ids,
                    join_exprs.clone(),
                    where_exprs.clone(),
                ));
            }
        }
        out
    }

    /// Collects the maximal region of INNER branches rooted here: the
    /// non-inner subtree elements joined by the region, the branch ids it
    /// consumed and the pooled conjuncts of the region's branches.
    fn collect_inner_region<'a>(
        &'a self,
        elements: &mut Vec<&'a JoinTree>,
        ids: &mut Vec<usize>,
        join_exprs: &mut Vec<Expression>,
        where_exprs: &mut Vec<Expression>,
    ) {
        match self {
            JoinTree::Branch {
                id,
                join_type: JoinType::Inner,
                left,
                right,
                join_exprs: je,
                where_exprs: we,
            } => {
                ids.push(*id);
                join_exprs.extend(je.iter().cloned());
                where_exprs.extend(we.iter().cloned());
                left.collect_inner_region(elements, ids, join_exprs, where_exprs);
                right.collect_inner_region(elements, ids, join_exprs, where_exprs);
            }
            other => elements.push(other),
        }
    }
}

/// Folds elements into a left-deep chain of INNER branches reusing the
/// region's branch ids. The pooled conjuncts land on the topmost branch; the
/// per-order conjunct assignment pushes them back down.
fn build_left_deep(
    elements: Vec<JoinTree>,
    ids: &[usize],
    join_exprs: Vec<Expression>,
    where_exprs: Vec<Expression>,
) -> Option<JoinTree> {
    let mut iter = elements.into_iter();
    let mut tree = iter.next()?;
    let mut remaining = iter.peekable();
    let mut id_iter = ids.iter();
    while let Some(next) = remaining.next() {
        let id = *id_iter.next()?;
        let is_last = remaining.peek().is_none();
        tree = JoinTree::Branch {
            id,
            join_type: JoinType::Inner,
            left: Box::new(tree),
            right: Box::new(next),
            join_exprs: if is_last { join_exprs.clone() } else { Vec::new() },
            where_exprs: if is_last { where_exprs.clone() } else { Vec::new() },
        };
    }
    Some(tree)
}

fn cross_product(lists: &[Vec<JoinTree>]) -> Vec<Vec<JoinTree>> {
    let mut combos: Vec<Vec<JoinTree>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(combos.len() * list.len());
        for combo in &combos {
            for item in list {
                let mut extended = combo.clone();
                extended.push(item.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn recurse(prefix: &mut Vec<usize>, used: &mut Vec<bool>, out: &mut Vec<Vec<usize>>) {
        if prefix.len() == used.len() {
            out.push(prefix.clone());
            return;
        }
        for i in 0..used.len() {
            if !used[i] {
                used[i] = true;
                prefix.push(i);
                recurse(prefix, used, out);
                prefix.pop();
                used[i] = false;
            }
        }
    }
    let mut out = Vec::new();
    recurse(&mut Vec::new(), &mut vec![false; n], &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompareOp, Value};

    fn aliases(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn eq_join(a: &str, b: &str) -> Expression {
        Expression::eq(Expression::column(a, "id"), Expression::column(b, "id"))
    }

    #[test]
    fn test_inner_joins_permute_factorially() {
        // (A JOIN B) JOIN C: three tables, six orders
        let tree = JoinTree::branch(
            4,
            JoinType::Inner,
            JoinTree::branch(
                3,
                JoinType::Inner,
                JoinTree::leaf(0, 0),
                JoinTree::leaf(1, 1),
                vec![eq_join("a", "b")],
                vec![],
            ),
            JoinTree::leaf(2, 2),
            vec![eq_join("b", "c")],
            vec![],
        );
        let orders = tree.generate_orders(PERMUTATION_LIMIT);
        assert_eq!(orders.len(), 6);
        // every order covers the same scans
        for order in &orders {
            let mut scans = order.leaf_scans();
            scans.sort();
            assert_eq!(scans, vec![0, 1, 2]);
        }
        // branch ids are preserved
        for order in &orders {
            if let JoinTree::Branch { id, .. } = order {
                assert!(*id == 3 || *id == 4);
            }
        }
    }

    #[test]
    fn test_large_inner_region_keeps_parsed_order() {
        let mut tree = JoinTree::leaf(0, 0);
        for i in 1..7 {
            tree = JoinTree::branch(
                100 + i,
                JoinType::Inner,
                tree,
                JoinTree::leaf(i, i),
                vec![],
                vec![],
            );
        }
        let orders = tree.generate_orders(PERMUTATION_LIMIT);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].leaf_scans(), vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_left_join_single_order() {
        let tree = JoinTree::branch(
            2,
            JoinType::Left,
            JoinTree::leaf(0, 0),
            JoinTree::leaf(1, 1),
            vec![eq_join("a", "b")],
            vec![],
        );
        let orders = tree.generate_orders(PERMUTATION_LIMIT);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].leaf_scans(), vec![0, 1]);
    }

    #[test]
    fn test_full_join_two_orders() {
        let tree = JoinTree::branch(
            2,
            JoinType::Full,
            JoinTree::leaf(0, 0),
            JoinTree::leaf(1, 1),
            vec![eq_join("a", "b")],
            vec![],
        );
        let orders = tree.generate_orders(PERMUTATION_LIMIT);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].leaf_scans(), vec![0, 1]);
        assert_eq!(orders[1].leaf_scans(), vec![1, 0]);
    }

    #[test]
    fn test_right_join_normalized_at_construction() {
        let tree = JoinTree::branch(
            2,
            JoinType::Right,
            JoinTree::leaf(0, 0),
            JoinTree::leaf(1, 1),
            vec![],
            vec![],
        );
        let JoinTree::Branch {
            join_type, left, ..
        } = &tree
        else {
            panic!("expected branch");
        };
        assert_eq!(*join_type, JoinType::Left);
        assert_eq!(left.leaf_scans(), vec![1]);
    }

    #[test]
    fn test_null_rejecting_filter_simplifies_left_join() {
        let tree = JoinTree::branch(
            2,
            JoinType::Left,
            JoinTree::leaf(0, 0),
            JoinTree::leaf(1, 1),
            vec![eq_join("a", "b")],
            vec![],
        );
        let names = aliases(&["a", "b"]);
        // b.x > 5 rejects null-padded b rows
        let filter = Expression::compare(
            CompareOp::Gt,
            Expression::column("b", "x"),
            Expression::Constant(Value::integer(5)),
        );
        let simplified = tree.clone().simplify_outer_joins(&[filter.clone()], &names);
        let JoinTree::Branch { join_type, .. } = &simplified else {
            panic!("expected branch");
        };
        assert_eq!(*join_type, JoinType::Inner);

        // idempotent: simplifying again changes nothing
        let again = simplified.clone().simplify_outer_joins(&[filter], &names);
        assert_eq!(simplified, again);

        // IS NULL does not reject, join stays LEFT
        let is_null = Expression::IsNull(Box::new(Expression::column("b", "x")));
        let kept = tree.simplify_outer_joins(&[is_null], &names);
        let JoinTree::Branch { join_type, .. } = &kept else {
            panic!("expected branch");
        };
        assert_eq!(*join_type, JoinType::Left);
    }

    #[test]
    fn test_full_join_degrades_per_side() {
        let base = || {
            JoinTree::branch(
                2,
                JoinType::Full,
                JoinTree::leaf(0, 0),
                JoinTree::leaf(1, 1),
                vec![eq_join("a", "b")],
                vec![],
            )
        };
        let names = aliases(&["a", "b"]);
        let reject = |alias: &str| {
            Expression::compare(
                CompareOp::Gt,
                Expression::column(alias, "x"),
                Expression::Constant(Value::integer(0)),
            )
        };

        // inner side rejected: FULL -> LEFT, order kept
        let s = base().simplify_outer_joins(&[reject("b")], &names);
        let JoinTree::Branch { join_type, left, .. } = &s else {
            panic!("expected branch");
        };
        assert_eq!(*join_type, JoinType::Left);
        assert_eq!(left.leaf_scans(), vec![0]);

        // outer side rejected: FULL -> LEFT with swap
        let s = base().simplify_outer_joins(&[reject("a")], &names);
        let JoinTree::Branch { join_type, left, .. } = &s else {
            panic!("expected branch");
        };
        assert_eq!(*join_type, JoinType::Left);
        assert_eq!(left.leaf_scans(), vec![1]);

        // both sides rejected: FULL -> INNER
        let s = base().simplify_outer_joins(&[reject("a"), reject("b")], &names);
        let JoinTree::Branch { join_type, .. } = &s else {
            panic!("expected branch");
        };
        assert_eq!(*join_type, JoinType::Inner);
    }

    #[test]
    fn test_forced_leaf_order() {
        let tree = JoinTree::branch(
            3,
            JoinType::Inner,
            JoinTree::branch(
                2,
                JoinType::Inner,
                JoinTree::leaf(0, 0),
                JoinTree::leaf(1, 1),
                vec![],
                vec![],
            ),
            JoinTree::leaf(4, 2),
            vec![],
            vec![],
        );
        let forced = tree.with_leaf_order(&[2, 0, 1]).unwrap();
        assert_eq!(forced.leaf_scans(), vec![2, 0, 1]);

        // outer joins refuse forced reordering
        let outer = JoinTree::branch(
            2,
            JoinType::Left,
            JoinTree::leaf(0, 0),
            JoinTree::leaf(1, 1),
            vec![],
            vec![],
        );
        assert!(outer.with_leaf_order(&[1, 0]).is_none());
    }
}
