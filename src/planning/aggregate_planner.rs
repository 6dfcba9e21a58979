//! Aggregation shaping
//!
//! Decides how GROUP BY and aggregate functions execute across the fragment
//! boundary. When the grouping includes a partition column, groups never
//! straddle partitions and the whole aggregation pushes below the Send.
//! Otherwise each partition computes partials and the coordinator
//! re-aggregates: COUNT partials are summed, AVG splits into SUM and COUNT
//! with a final division, APPROX_COUNT_DISTINCT ships sketches.

use super::partitioning::StatementPartitioning;
use super::plan::{AggregateStrategy, PlanAggregate, PlanNode};
use crate::error::{Error, Result};
use crate::statement::{AggregateFunction, ParsedSelect};
use crate::types::{Catalog, ColumnRef, Expression};

/// How the statement's aggregation maps onto fragments.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationPlacement {
    /// No grouping and no aggregates.
    None,
    /// Entire aggregation runs in one place (single-partition plan, or the
    /// grouping covers a partition column so groups are partition-local).
    Single { aggregates: Vec<PlanAggregate> },
    /// Partition partials below the boundary, merge above it.
    Split {
        partition: Vec<PlanAggregate>,
        coordinator: Vec<PlanAggregate>,
        /// Output columns that must be recomputed from merged partials, e.g.
        /// AVG as SUM over COUNT. Pairs of (output alias, expression over
        /// intermediate columns).
        finalize: Vec<(String, Expression)>,
    },
}

pub struct AggregatePlanner;

impl AggregatePlanner {
    /// Chooses the placement for this SELECT's aggregation. `two_fragment`
    /// reflects the candidate's partitioning.
    pub fn placement(
        select: &ParsedSelect,
        catalog: &Catalog,
        partitioning: &StatementPartitioning,
        two_fragment: bool,
    ) -> Result<AggregationPlacement> {
        if !select.is_grouped() {
            return Ok(AggregationPlacement::None);
        }
        let aggregates = Self::plan_aggregates(select)?;

        if !two_fragment
            || Self::group_covers_partition_column(select, catalog, partitioning)?
        {
            return Ok(AggregationPlacement::Single { aggregates });
        }

        let mut partition = Vec::new();
        let mut coordinator = Vec::new();
        let mut finalize = Vec::new();
        for agg in aggregates {
            Self::split_one(&agg, &mut partition, &mut coordinator, &mut finalize);
        }
        Ok(AggregationPlacement::Split {
            partition,
            coordinator,
            finalize,
        })
    }

    fn plan_aggregates(select: &ParsedSelect) -> Result<Vec<PlanAggregate>> {
        let mut out = Vec::new();
        for item in &select.items {
            if let Some(call) = &item.aggregate {
                out.push(PlanAggregate {
                    function: call.function,
                    argument: call.argument.clone(),
                    distinct: call.distinct,
                    output: item.alias.clone(),
                });
            }
        }
        Ok(out)
    }

    /// A grouping that includes some scan's partition column keeps every
    /// group on one partition.
    fn group_covers_partition_column(
        select: &ParsedSelect,
        catalog: &Catalog,
        partitioning: &StatementPartitioning,
    ) -> Result<bool> {
        if partitioning.count_of_partitioned_tables() == 0 {
            return Ok(false);
        }
        for expr in &select.group_by {
            let Expression::Column(ColumnRef { table, column }) = expr else {
                continue;
            };
            let Some(scan) = select.scan_by_alias(table) else {
                continue;
            };
            if catalog.get_table(&scan.table)?.partition_column() == Some(column.as_str()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Splits one aggregate into its partition partial and coordinator
    /// merge. DISTINCT aggregates over non-partition groupings cannot be
    /// split soundly and are rejected upstream.
    fn split_one(
        agg: &PlanAggregate,
        partition: &mut Vec<PlanAggregate>,
        coordinator: &mut Vec<PlanAggregate>,
        finalize: &mut Vec<(String, Expression)>,
    ) {
        let partial_col = |suffix: &str| format!("{}${}", agg.output, suffix);
        // Intermediate columns are unqualified: they name partition-fragment
        // output columns, not base-table columns.
        let col = |name: &str| Expression::column("", name);

        match agg.function {
            AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => {
                partition.push(agg.clone());
                coordinator.push(PlanAggregate {
                    function: agg.function,
                    argument: Some(col(&agg.output)),
                    distinct: false,
                    output: agg.output.clone(),
                });
            }
            AggregateFunction::Count | AggregateFunction::CountStar => {
                partition.push(agg.clone());
                coordinator.push(PlanAggregate {
                    function: AggregateFunction::Sum,
                    argument: Some(col(&agg.output)),
                    distinct: false,
                    output: agg.output.clone(),
                });
            }
            AggregateFunction::Avg => {
                let sum_col = partial_col("sum");
                let count_col = partial_col("count");
                partition.push(PlanAggregate {
                    function: AggregateFunction::Sum,
                    argument: agg.argument.clone(),
                    distinct: false,
                    output: sum_col.clone(),
                });
                partition.push(PlanAggregate {
                    function: AggregateFunction::Count,
                    argument: agg.argument.clone(),
                    distinct: false,
                    output: count_col.clone(),
                });
                coordinator.push(PlanAggregate {
                    function: AggregateFunction::Sum,
                    argument: Some(col(&sum_col)),
                    distinct: false,
                    output: sum_col.clone(),
                });
                coordinator.push(PlanAggregate {
                    function: AggregateFunction::Sum,
                    argument: Some(col(&count_col)),
                    distinct: false,
                    output: count_col.clone(),
                });
                finalize.push((
                    agg.output.clone(),
                    Expression::Function("DIVIDE".into(), vec![col(&sum_col), col(&count_col)]),
                ));
            }
            AggregateFunction::ApproxCountDistinct => {
                let sketch_col = partial_col("sketch");
                partition.push(PlanAggregate {
                    function: AggregateFunction::SketchAccumulate,
                    argument: agg.argument.clone(),
                    distinct: false,
                    output: sketch_col.clone(),
                });
                coordinator.push(PlanAggregate {
                    function: AggregateFunction::SketchMerge,
                    argument: Some(col(&sketch_col)),
                    distinct: false,
                    output: agg.output.clone(),
                });
            }
            AggregateFunction::SketchAccumulate | AggregateFunction::SketchMerge => {
                // Planner-internal functions never reach placement.
                partition.push(agg.clone());
            }
        }
    }

    /// True when some aggregate would be unsound to split: DISTINCT over a
    /// grouping that does not pin groups to partitions.
    pub fn split_blocked_by_distinct(select: &ParsedSelect) -> Option<&str> {
        select
            .items
            .iter()
            .find(|i| i.aggregate.as_ref().is_some_and(|a| a.distinct))
            .map(|i| i.alias.as_str())
    }

    /// Picks Serial when the input subtree is an index scan whose key order
    /// matches the grouping, Hash otherwise.
    pub fn strategy_for(
        node: &PlanNode,
        group_by: &[Expression],
        catalog: &Catalog,
    ) -> AggregateStrategy {
        if group_by.is_empty() {
            return AggregateStrategy::Serial;
        }
        if let PlanNode::IndexScan {
            table,
            alias,
            index,
            ..
        } = node
        {
            let serializable = catalog
                .get_table(table)
                .ok()
                .and_then(|t| t.get_index(index).cloned())
                .is_some_and(|idx| {
                    super::access_path::IndexSelector::can_serialize_grouping(
                        &idx, alias, group_by,
                    )
                });
            if serializable {
                return AggregateStrategy::Serial;
            }
        }
        AggregateStrategy::Hash
    }

    /// Validates ORDER BY references to aggregate outputs: ordering by an
    /// aggregate that is not in the SELECT list is not plannable.
    pub fn check_order_by_aggregates(select: &ParsedSelect) -> Result<()> {
        if !select.is_grouped() {
            return Ok(());
        }
        for elem in &select.order_by {
            let Expression::Column(ColumnRef { table, column }) = &elem.expression else {
                continue;
            };
            if !table.is_empty() {
                continue;
            }
            // Unqualified names in a grouped ORDER BY must label a SELECT
            // item.
            if !select.items.iter().any(|i| i.alias == *column) {
                return Err(Error::AggregateNotInSelect {
                    column: column.clone(),
                    sql: select.sql.clone(),
                });
            }
        }
        Ok(())
    }
}
