//! SELECT statement shaping
//!
//! Takes joined subplans from the enumerator and dresses each candidate
//! clause by clause: aggregation placement, the fragment boundary,
//! coordinator re-aggregation, window function, ORDER BY, DISTINCT,
//! LIMIT/OFFSET (with partition-side pushdown when sound) and the final
//! projection. The cheapest shaped candidate wins.

use super::access_path::add_send_receive_pair;
use super::aggregate_planner::{AggregatePlanner, AggregationPlacement};
use super::cost::{CostEstimator, PlanSelector};
use super::join_order::{EnumerationBudget, JoinOrderEnumerator};
use super::partitioning::{PartitioningHint, StatementPartitioning};
use super::plan::{
    AggregateStrategy, CompiledPlan, Determinism, PlanNode,
};
use crate::error::{Error, Result};
use crate::statement::{ParsedSelect, SelectItem};
use crate::types::{Catalog, ColumnRef, Expression, SortDirection};

pub struct SelectPlanner<'a> {
    catalog: &'a Catalog,
    budget: EnumerationBudget,
}

impl<'a> SelectPlanner<'a> {
    pub fn new(catalog: &'a Catalog, budget: EnumerationBudget) -> Self {
        SelectPlanner { catalog, budget }
    }

    pub fn plan(&self, select: &ParsedSelect, hint: PartitioningHint) -> Result<CompiledPlan> {
        Self::validate_window_functions(select)?;
        AggregatePlanner::check_order_by_aggregates(select)?;

        let mut enumerator =
            JoinOrderEnumerator::new(self.catalog, select, hint, self.budget)?;
        let mut selector = PlanSelector::new();
        let mut skip_reason: Option<String> = None;
        while let Some((subplan, partitioning)) = enumerator.next_plan()? {
            match self.shape_candidate(select, subplan, &partitioning)? {
                Ok(plan) => selector.consider(plan),
                Err(reason) => skip_reason = Some(reason),
            }
        }
        selector.into_best().ok_or_else(|| Error::NoPlan {
            diagnostic: skip_reason
                .unwrap_or_else(|| "no executable join order or access path".to_string()),
            sql: select.sql.clone(),
        })
    }

    /// Shapes one candidate. The inner Err is a per-candidate skip with a
    /// diagnostic, the outer Err is fatal for the statement.
    fn shape_candidate(
        &self,
        select: &ParsedSelect,
        subplan: PlanNode,
        partitioning: &StatementPartitioning,
    ) -> Result<std::result::Result<CompiledPlan, String>> {
        let two_fragment = partitioning.requires_two_fragments();
        let placement =
            AggregatePlanner::placement(select, self.catalog, partitioning, two_fragment)?;

        if matches!(placement, AggregationPlacement::Split { .. }) {
            if let Some(output) = AggregatePlanner::split_blocked_by_distinct(select) {
                return Ok(Err(format!(
                    "DISTINCT aggregate '{}' cannot be merged across partitions",
                    output
                )));
            }
        }

        // Whether the chosen outer scan already produces the ORDER BY order.
        // A window function's own sort would destroy it, so it does not
        // count there.
        let index_order = !select.order_by.is_empty()
            && !two_fragment
            && select.window_functions.is_empty()
            && Self::outer_scan_sort(&subplan).is_valid();
        // Same question for the sort a window function would need.
        let window_index_order = select.order_by.is_empty()
            && !select.window_functions.is_empty()
            && !two_fragment
            && Self::outer_scan_sort(&subplan).is_valid();

        let mut node = subplan;
        let mut coordinator_agg = None;
        let mut finalize = Vec::new();
        match placement {
            AggregationPlacement::None => {}
            AggregationPlacement::Single { aggregates } => {
                let strategy =
                    AggregatePlanner::strategy_for(&node, &select.group_by, self.catalog);
                node = PlanNode::Aggregate {
                    strategy,
                    group_by: select.group_by.clone(),
                    aggregates,
                    source: Box::new(node),
                };
            }
            AggregationPlacement::Split {
                partition,
                coordinator,
                finalize: f,
            } => {
                node = PlanNode::Aggregate {
                    strategy: AggregateStrategy::Partial,
                    group_by: select.group_by.clone(),
                    aggregates: partition,
                    source: Box::new(node),
                };
                coordinator_agg = Some(coordinator);
                finalize = f;
            }
        }

        if two_fragment {
            // LIMIT pushdown: each partition can pre-truncate to
            // limit + offset rows when no coordinator-side node reshapes the
            // row set. The coordinator keeps the real limit and offset.
            let pushdown_ok = select.limit_offset.is_present()
                && coordinator_agg.is_none()
                && !select.distinct
                && select.window_functions.is_empty();
            if pushdown_ok {
                if let Some(limit) = select.limit_offset.limit {
                    if !select.order_by.is_empty() {
                        node = PlanNode::OrderBy {
                            elements: select.order_by.clone(),
                            source: Box::new(node),
                        };
                    }
                    node = PlanNode::Limit {
                        limit: Some(limit.saturating_add(select.limit_offset.offset)),
                        offset: 0,
                        source: Box::new(node),
                    };
                }
            }
            node = add_send_receive_pair(node);
        }

        if let Some(aggregates) = coordinator_agg {
            node = PlanNode::Aggregate {
                strategy: AggregateStrategy::Hash,
                group_by: select.group_by.clone(),
                aggregates,
                source: Box::new(node),
            };
        }

        if let Some(window) = select.window_functions.first() {
            // The window executor wants its input clustered by PARTITION BY
            // and sorted by the window's ORDER BY. A single-fragment plan
            // whose outer scan already walks a matching index skips the sort.
            let mut elements: Vec<_> = window
                .partition_by
                .iter()
                .cloned()
                .map(crate::statement::OrderByElement::asc)
                .collect();
            elements.extend(window.order_by.iter().cloned());
            if !elements.is_empty() && !window_index_order {
                node = PlanNode::OrderBy {
                    elements,
                    source: Box::new(node),
                };
            }
            node = PlanNode::WindowFunction {
                call: window.clone(),
                source: Box::new(node),
            };
        }

        if select.distinct {
            node = Self::apply_projection(select, &finalize, node);
            node = Self::apply_distinct(select, node);
            if !select.order_by.is_empty() {
                node = PlanNode::OrderBy {
                    elements: select.order_by.clone(),
                    source: Box::new(node),
                };
            }
        } else {
            if !select.order_by.is_empty() && !index_order {
                node = PlanNode::OrderBy {
                    elements: select.order_by.clone(),
                    source: Box::new(node),
                };
            }
            node = Self::apply_projection(select, &finalize, node);
        }

        if select.limit_offset.is_present() {
            node = PlanNode::Limit {
                limit: select.limit_offset.limit,
                offset: select.limit_offset.offset,
                source: Box::new(node),
            };
        }

        if node.count_receive_nodes() > 1 {
            return Err(Error::JoinTooComplex {
                sql: select.sql.clone(),
            });
        }

        let cost = CostEstimator::new(self.catalog).estimate(&node);
        let determinism = Self::determinism(select, self.catalog, index_order);
        Ok(Ok(CompiledPlan {
            root: node,
            determinism,
            read_only: true,
            cost,
            has_limit_or_offset: select.limit_offset.is_present(),
        }))
    }

    fn validate_window_functions(select: &ParsedSelect) -> Result<()> {
        if select.window_functions.len() > 1 {
            return Err(Error::MultipleWindowFunctions {
                sql: select.sql.clone(),
            });
        }
        if !select.window_functions.is_empty() && !select.group_by.is_empty() {
            return Err(Error::WindowFunctionWithGroupBy {
                sql: select.sql.clone(),
            });
        }
        Ok(())
    }

    /// Sort direction of the scan at the outer end of the join spine; the
    /// only scan whose index ordering can stand in for the statement's
    /// ORDER BY.
    fn outer_scan_sort(node: &PlanNode) -> SortDirection {
        match node {
            PlanNode::IndexScan { sort_direction, .. } => *sort_direction,
            PlanNode::NestLoopJoin { left, .. } => Self::outer_scan_sort(left),
            PlanNode::NestLoopIndexJoin { outer, .. } => Self::outer_scan_sort(outer),
            _ => SortDirection::Invalid,
        }
    }

    fn apply_projection(
        select: &ParsedSelect,
        finalize: &[(String, Expression)],
        node: PlanNode,
    ) -> PlanNode {
        if select.items.is_empty() {
            return node;
        }
        let columns = select
            .items
            .iter()
            .map(|item| (Self::output_expression(item, finalize), item.alias.clone()))
            .collect();
        PlanNode::Projection {
            columns,
            source: Box::new(node),
        }
    }

    fn output_expression(item: &SelectItem, finalize: &[(String, Expression)]) -> Expression {
        if let Some((_, expr)) = finalize.iter().find(|(alias, _)| *alias == item.alias) {
            return expr.clone();
        }
        if item.aggregate.is_some() {
            // Aggregate results arrive as unqualified intermediate columns.
            return Expression::column("", item.alias.clone());
        }
        item.expression.clone()
    }

    /// DISTINCT as grouping on every output column, with no aggregates.
    fn apply_distinct(select: &ParsedSelect, node: PlanNode) -> PlanNode {
        let group_by = select
            .items
            .iter()
            .map(|item| Expression::column("", item.alias.clone()))
            .collect();
        PlanNode::Aggregate {
            strategy: AggregateStrategy::Hash,
            group_by,
            aggregates: Vec::new(),
            source: Box::new(node),
        }
    }

    /// Order and content determinism of the statement's result.
    fn determinism(select: &ParsedSelect, catalog: &Catalog, index_order: bool) -> Determinism {
        let ordered = Self::order_is_deterministic(select, catalog)
            || Self::yields_at_most_one_row(select, catalog);
        if ordered {
            return Determinism::deterministic();
        }
        if select.order_by.is_empty() && !index_order {
            let mut d = Determinism::unordered("no ORDER BY clause");
            if select.limit_offset.is_present() {
                d.content_deterministic = false;
                d.detail = Some("LIMIT or OFFSET applied to unordered rows".to_string());
            }
            return d;
        }
        // Ordered, but ties among equal sort keys may break differently.
        let mut d = Determinism::unordered("ORDER BY does not determine a unique row order");
        d.order_deterministic = false;
        if select.limit_offset.is_present() {
            d.content_deterministic = false;
            d.detail = Some(
                "LIMIT or OFFSET applied to an order with possible ties".to_string(),
            );
        }
        d
    }

    /// A statement that cannot emit more than one row is ordered by
    /// construction: an ungrouped aggregate collapses to a single row, and a
    /// full-equality probe of a unique key matches at most one.
    fn yields_at_most_one_row(select: &ParsedSelect, catalog: &Catalog) -> bool {
        if select.has_aggregates()
            && select.group_by.is_empty()
            && select.window_functions.is_empty()
        {
            return true;
        }
        let [scan] = select.scans.as_slice() else {
            return false;
        };
        let Ok(table) = catalog.get_table(&scan.table) else {
            return false;
        };
        table.indexes.iter().filter(|i| i.unique).any(|index| {
            index.columns.iter().all(|key_col| {
                select.where_exprs.iter().any(|conjunct| {
                    conjunct
                        .as_column_comparison(&scan.alias)
                        .is_some_and(|(op, col, comparand)| {
                            op.is_equality()
                                && col.column == *key_col
                                && comparand.is_constant_or_parameter()
                        })
                })
            })
        })
    }

    /// An ORDER BY pins row order when it covers every display column, or
    /// when it covers a unique index of a scanned table.
    fn order_is_deterministic(select: &ParsedSelect, catalog: &Catalog) -> bool {
        if select.order_by.is_empty() {
            return false;
        }
        let order_exprs: Vec<&Expression> =
            select.order_by.iter().map(|e| &e.expression).collect();

        let all_displayed = !select.items.is_empty()
            && select.items.iter().all(|item| {
                item.aggregate.is_some()
                    || order_exprs.contains(&&item.expression)
            });
        if all_displayed && select.items.iter().any(|i| i.aggregate.is_none()) {
            return true;
        }

        // Unique-key coverage over a single scanned table.
        for scan in &select.scans {
            let Ok(table) = catalog.get_table(&scan.table) else {
                continue;
            };
            for index in table.indexes.iter().filter(|i| i.unique) {
                let covered = index.columns.iter().all(|col| {
                    order_exprs.iter().any(|e| {
                        matches!(
                            e,
                            Expression::Column(ColumnRef { table: t, column: c })
                                if *t == scan.alias && c == col
                        )
                    })
                });
                if covered && select.scans.len() == 1 {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{
        AggregateCall, AggregateFunction, LimitOffset, OrderByElement, WindowFunctionCall,
    };
    use crate::types::{Column, DataType, Index, Table};

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        c.add_table(
            Table::new(
                "orders",
                vec![
                    Column::new("id", DataType::Integer),
                    Column::new("cust", DataType::Integer),
                    Column::new("total", DataType::Float),
                ],
            )
            .partitioned_on("cust")
            .with_primary_key(Index::new("pk_orders", "orders", vec!["id"]))
            .with_index(Index::new("idx_orders_cust", "orders", vec!["cust"]))
            .with_index(Index::new("idx_orders_cust_id", "orders", vec!["cust", "id"]))
            .rows(10_000),
        );
        c.add_table(
            Table::new(
                "regions",
                vec![
                    Column::new("code", DataType::Integer),
                    Column::new("name", DataType::Text),
                ],
            )
            .rows(50),
        );
        c
    }

    fn planner(catalog: &Catalog) -> SelectPlanner<'_> {
        SelectPlanner::new(catalog, EnumerationBudget::default())
    }

    fn find_node<'p>(plan: &'p PlanNode, pred: &dyn Fn(&PlanNode) -> bool) -> Option<&'p PlanNode> {
        if pred(plan) {
            return Some(plan);
        }
        plan.children().into_iter().find_map(|c| find_node(c, pred))
    }

    #[test]
    fn test_single_partition_point_lookup() {
        let catalog = catalog();
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.where_exprs.push(Expression::eq(
            Expression::column("o", "cust"),
            Expression::Parameter(0),
        ));
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        assert_eq!(plan.root.count_receive_nodes(), 0);
        assert!(plan.read_only);
        // index path beats the sequential scan
        assert!(find_node(&plan.root, &|n| matches!(
            n,
            PlanNode::IndexScan { index, .. } if index == "idx_orders_cust"
        ))
        .is_some());
    }

    #[test]
    fn test_multi_partition_scan_gets_boundary() {
        let catalog = catalog();
        let select = ParsedSelect::scan("q", "orders", "o");
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        assert_eq!(plan.root.count_receive_nodes(), 1);
        let fragments = plan.fragmentize();
        assert!(fragments.partition.is_some());
    }

    #[test]
    fn test_partition_column_group_by_pushes_whole_aggregate_down() {
        let catalog = catalog();
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.group_by = vec![Expression::column("o", "cust")];
        select.items = vec![
            SelectItem::column(Expression::column("o", "cust"), "cust"),
            SelectItem::aggregate(
                AggregateCall::new(
                    AggregateFunction::Sum,
                    Some(Expression::column("o", "total")),
                ),
                "total",
            ),
        ];
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        let fragments = plan.fragmentize();
        // the aggregate lives in the partition fragment
        let partition = fragments.partition.expect("two fragments");
        assert!(find_node(&partition, &|n| matches!(n, PlanNode::Aggregate { .. })).is_some());
        // and the coordinator has none
        assert!(find_node(&fragments.coordinator, &|n| matches!(
            n,
            PlanNode::Aggregate { .. }
        ))
        .is_none());
    }

    #[test]
    fn test_non_partition_group_by_re_aggregates_on_coordinator() {
        let catalog = catalog();
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.group_by = vec![Expression::column("o", "total")];
        select.items = vec![
            SelectItem::column(Expression::column("o", "total"), "total"),
            SelectItem::aggregate(
                AggregateCall::new(
                    AggregateFunction::Avg,
                    Some(Expression::column("o", "total")),
                ),
                "avg_total",
            ),
        ];
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        let fragments = plan.fragmentize();
        let partition = fragments.partition.expect("two fragments");
        // partition side computes partials
        let Some(PlanNode::Aggregate {
            strategy,
            aggregates,
            ..
        }) = find_node(&partition, &|n| matches!(n, PlanNode::Aggregate { .. }))
        else {
            panic!("no partition aggregate");
        };
        assert_eq!(*strategy, AggregateStrategy::Partial);
        assert_eq!(aggregates.len(), 2); // AVG split into SUM and COUNT
        // coordinator merges
        let Some(PlanNode::Aggregate { strategy, .. }) =
            find_node(&fragments.coordinator, &|n| {
                matches!(n, PlanNode::Aggregate { .. })
            })
        else {
            panic!("no coordinator aggregate");
        };
        assert_eq!(*strategy, AggregateStrategy::Hash);
        // and the projection rebuilds AVG by division
        let Some(PlanNode::Projection { columns, .. }) =
            find_node(&plan.root, &|n| matches!(n, PlanNode::Projection { .. }))
        else {
            panic!("no projection");
        };
        assert!(columns.iter().any(|(expr, alias)| {
            alias == "avg_total" && matches!(expr, Expression::Function(name, _) if name == "DIVIDE")
        }));
    }

    #[test]
    fn test_limit_pushdown_into_partition_fragment() {
        let catalog = catalog();
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.order_by = vec![OrderByElement::asc(Expression::column("o", "id"))];
        select.limit_offset = LimitOffset::limit(10).with_offset(5);
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        let fragments = plan.fragmentize();
        let partition = fragments.partition.expect("two fragments");
        // partition side pre-truncates to limit + offset with no offset
        let Some(PlanNode::Limit { limit, offset, .. }) =
            find_node(&partition, &|n| matches!(n, PlanNode::Limit { .. }))
        else {
            panic!("no pushed-down limit");
        };
        assert_eq!(*limit, Some(15));
        assert_eq!(*offset, 0);
        // coordinator applies the real limit and offset
        let Some(PlanNode::Limit { limit, offset, .. }) =
            find_node(&fragments.coordinator, &|n| matches!(n, PlanNode::Limit { .. }))
        else {
            panic!("no coordinator limit");
        };
        assert_eq!(*limit, Some(10));
        assert_eq!(*offset, 5);
    }

    #[test]
    fn test_limit_pushdown_blocked_by_coordinator_aggregate() {
        let catalog = catalog();
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.group_by = vec![Expression::column("o", "total")];
        select.items = vec![
            SelectItem::column(Expression::column("o", "total"), "total"),
            SelectItem::aggregate(
                AggregateCall::new(AggregateFunction::CountStar, None),
                "n",
            ),
        ];
        select.limit_offset = LimitOffset::limit(10);
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        let fragments = plan.fragmentize();
        let partition = fragments.partition.expect("two fragments");
        assert!(find_node(&partition, &|n| matches!(n, PlanNode::Limit { .. })).is_none());
    }

    #[test]
    fn test_index_order_skips_sort() {
        let catalog = catalog();
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.where_exprs.push(Expression::eq(
            Expression::column("o", "cust"),
            Expression::Parameter(0),
        ));
        select.order_by = vec![OrderByElement::asc(Expression::column("o", "id"))];
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        // the (cust, id) index filters and orders at once: no sort needed
        assert!(find_node(&plan.root, &|n| matches!(n, PlanNode::OrderBy { .. })).is_none());
        assert!(find_node(&plan.root, &|n| matches!(
            n,
            PlanNode::IndexScan { index, sort_direction, .. }
                if index == "idx_orders_cust_id" && sort_direction.is_valid()
        ))
        .is_some());
    }

    #[test]
    fn test_multi_partition_order_by_always_sorts_on_coordinator() {
        let catalog = catalog();
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.order_by = vec![OrderByElement::asc(Expression::column("o", "id"))];
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        let fragments = plan.fragmentize();
        assert!(find_node(&fragments.coordinator, &|n| matches!(
            n,
            PlanNode::OrderBy { .. }
        ))
        .is_some());
    }

    #[test]
    fn test_window_function_rules() {
        let catalog = catalog();
        let window = WindowFunctionCall {
            function: "RANK".into(),
            partition_by: vec![Expression::column("o", "cust")],
            order_by: vec![OrderByElement::asc(Expression::column("o", "total"))],
        };
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.window_functions = vec![window.clone(), window.clone()];
        let err = planner(&catalog)
            .plan(&select, PartitioningHint::Infer)
            .unwrap_err();
        assert!(matches!(err, Error::MultipleWindowFunctions { .. }));

        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.window_functions = vec![window.clone()];
        select.group_by = vec![Expression::column("o", "cust")];
        let err = planner(&catalog)
            .plan(&select, PartitioningHint::Infer)
            .unwrap_err();
        assert!(matches!(err, Error::WindowFunctionWithGroupBy { .. }));

        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.window_functions = vec![window];
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        let Some(PlanNode::WindowFunction { source, .. }) =
            find_node(&plan.root, &|n| matches!(n, PlanNode::WindowFunction { .. }))
        else {
            panic!("no window node");
        };
        // fed by a sort over partition-by then order-by
        assert!(matches!(source.as_ref(), PlanNode::OrderBy { .. }));
    }

    #[test]
    fn test_window_sort_skipped_when_index_orders() {
        let catalog = catalog();
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.where_exprs.push(Expression::eq(
            Expression::column("o", "cust"),
            Expression::Parameter(0),
        ));
        select.window_functions = vec![WindowFunctionCall {
            function: "ROW_NUMBER".into(),
            partition_by: vec![],
            order_by: vec![OrderByElement::asc(Expression::column("o", "id"))],
        }];
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        // the (cust, id) index feeds the window pre-sorted
        let Some(PlanNode::WindowFunction { source, .. }) =
            find_node(&plan.root, &|n| matches!(n, PlanNode::WindowFunction { .. }))
        else {
            panic!("no window node");
        };
        assert!(matches!(source.as_ref(), PlanNode::IndexScan { .. }));
    }

    #[test]
    fn test_determinism_flags() {
        let catalog = catalog();

        // no ORDER BY: content-deterministic only
        let select = ParsedSelect::scan("q", "regions", "r");
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        assert!(!plan.determinism.order_deterministic);
        assert!(plan.determinism.content_deterministic);
        assert!(plan.determinism.detail.is_some());

        // ORDER BY over a unique key: fully deterministic
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.order_by = vec![OrderByElement::asc(Expression::column("o", "id"))];
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        assert!(plan.determinism.order_deterministic);
        assert!(plan.determinism.content_deterministic);

        // LIMIT over a tie-prone order: not even content-deterministic
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.order_by = vec![OrderByElement::asc(Expression::column("o", "total"))];
        select.limit_offset = LimitOffset::limit(5);
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        assert!(!plan.determinism.order_deterministic);
        assert!(!plan.determinism.content_deterministic);
    }

    #[test]
    fn test_single_row_results_are_ordered_by_construction() {
        let catalog = catalog();

        // unique-key point lookup: at most one row, no ORDER BY needed
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.where_exprs.push(Expression::eq(
            Expression::column("o", "id"),
            Expression::Parameter(0),
        ));
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        assert!(plan.determinism.order_deterministic);
        assert!(plan.determinism.content_deterministic);

        // ungrouped aggregate: exactly one row
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.items = vec![SelectItem::aggregate(
            AggregateCall::new(AggregateFunction::CountStar, None),
            "n",
        )];
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        assert!(plan.determinism.order_deterministic);

        // a non-key equality pins nothing
        let mut select = ParsedSelect::scan("q", "orders", "o");
        select.where_exprs.push(Expression::eq(
            Expression::column("o", "total"),
            Expression::Parameter(0),
        ));
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        assert!(!plan.determinism.order_deterministic);
    }

    #[test]
    fn test_distinct_dedupes_after_projection() {
        let catalog = catalog();
        let mut select = ParsedSelect::scan("q", "regions", "r");
        select.distinct = true;
        select.items = vec![SelectItem::column(Expression::column("r", "name"), "name")];
        let plan = planner(&catalog).plan(&select, PartitioningHint::Infer).unwrap();
        let Some(PlanNode::Aggregate {
            group_by,
            aggregates,
            source,
            ..
        }) = find_node(&plan.root, &|n| matches!(n, PlanNode::Aggregate { .. }))
        else {
            panic!("no distinct node");
        };
        assert!(aggregates.is_empty());
        assert_eq!(group_by.len(), 1);
        assert!(matches!(source.as_ref(), PlanNode::Projection { .. }));
    }
}
