//! DML and set-operation planning
//!
//! INSERT, UPDATE, DELETE and MIGRATE share a pattern: validate the target
//! table, find the cheapest row source through the same enumerator SELECT
//! uses, wrap it in the mutating node, and for multi-partition statements add
//! the boundary plus a coordinator SUM over the per-partition modified-row
//! counts. Every DML statement must be content-deterministic; one that is not
//! would diverge across replicas and is rejected outright.

use super::access_path::add_send_receive_pair;
use super::cost::CostEstimator;
use super::join_order::{EnumerationBudget, JoinOrderEnumerator};
use super::partitioning::PartitioningHint;
use super::plan::{
    AggregateStrategy, CompiledPlan, Determinism, PlanAggregate, PlanNode,
};
use super::select_planner::SelectPlanner;
use crate::error::{Error, Result};
use crate::statement::{
    AggregateFunction, InsertSource, ParsedDelete, ParsedInsert, ParsedMigrate, ParsedSelect,
    ParsedSwap, ParsedUnion, ParsedUpdate,
};
use crate::types::{Catalog, Expression, Table};

/// Output column name under which every mutating node reports its modified
/// row count.
const MODIFIED_TUPLES: &str = "modified_tuples";

const NONDETERMINISTIC_FUNCTIONS: &[&str] = &["RAND", "RANDOM", "NOW", "CURRENT_TIMESTAMP"];

pub struct StatementPlanner<'a> {
    catalog: &'a Catalog,
    budget: EnumerationBudget,
}

impl<'a> StatementPlanner<'a> {
    pub fn new(catalog: &'a Catalog, budget: EnumerationBudget) -> Self {
        StatementPlanner { catalog, budget }
    }

    pub fn plan_insert(&self, insert: &ParsedInsert, hint: PartitioningHint) -> Result<CompiledPlan> {
        let table = self.catalog.get_table(&insert.table)?;
        if table.materialized_view_of.is_some() {
            return Err(Error::MaterializedViewWrite {
                sql: insert.sql.clone(),
            });
        }
        // Streams accept plain INSERT (that is how rows reach the export
        // target) but nothing that needs to read existing rows back.
        if insert.upsert && table.is_stream {
            return Err(Error::StreamTableWrite {
                sql: insert.sql.clone(),
            });
        }
        if insert.upsert && table.primary_key_index().is_none() {
            return Err(Error::UpsertWithoutPrimaryKey {
                table: insert.table.clone(),
                sql: insert.sql.clone(),
            });
        }
        let columns = self.resolve_insert_columns(insert, table)?;
        if insert.upsert {
            // Matching an existing row requires the full key.
            if let Some(pk) = table.primary_key_index() {
                for key_column in &pk.columns {
                    if !columns.contains(key_column) {
                        return Err(Error::MissingColumnValue {
                            column: key_column.clone(),
                            sql: insert.sql.clone(),
                        });
                    }
                }
            }
        }

        let (source, single_partition) = match &insert.source {
            InsertSource::Values(rows) => {
                for row in rows {
                    if row.len() != columns.len() {
                        return Err(Error::Internal(format!(
                            "INSERT row has {} values for {} columns",
                            row.len(),
                            columns.len()
                        )));
                    }
                    for value in row {
                        if let Some(name) = nondeterministic_function(value) {
                            return Err(Error::NonDeterministicDml {
                                reason: format!("call to {}", name),
                                sql: insert.sql.clone(),
                            });
                        }
                    }
                }
                let single = match (hint, table.partition_column()) {
                    (PartitioningHint::ForceSinglePartition, _) => true,
                    (PartitioningHint::ForceMultiPartition, _) => false,
                    // A replicated table keeps a copy on every partition, so
                    // the write lands everywhere.
                    (PartitioningHint::Infer, None) => false,
                    // A constant or parameter in the partition column pins
                    // every row of a single-row insert to one partition.
                    (_, Some(pcol)) => {
                        rows.len() == 1
                            && columns.iter().position(|c| c.as_str() == pcol).is_some_and(|i| {
                                rows[0][i].is_constant_or_parameter()
                            })
                    }
                };
                (PlanNode::Values { rows: rows.clone() }, single)
            }
            InsertSource::Select(child) => {
                let child_plan =
                    SelectPlanner::new(self.catalog, self.budget).plan(child, hint)?;
                if !child_plan.determinism.content_deterministic {
                    return Err(Error::NonDeterministicDml {
                        reason: child_plan
                            .determinism
                            .detail
                            .unwrap_or_else(|| "source query is non-deterministic".into()),
                        sql: insert.sql.clone(),
                    });
                }
                // A source that already carries its boundary feeds the insert
                // on the coordinator; wrapping again would need a third
                // fragment.
                let single = child_plan.root.contains_receive()
                    || match (hint, table.partition_column()) {
                        (PartitioningHint::ForceSinglePartition, _) => true,
                        (PartitioningHint::ForceMultiPartition, _) => false,
                        (PartitioningHint::Infer, None) => false,
                        (PartitioningHint::Infer, Some(_)) => true,
                    };
                (child_plan.root, single)
            }
        };

        let mut node = PlanNode::Insert {
            table: insert.table.clone(),
            columns,
            source: Box::new(source),
            upsert: insert.upsert,
        };
        if !single_partition {
            node = self.sum_and_send(node);
        }
        Ok(self.compiled_dml(node))
    }

    pub fn plan_update(&self, update: &ParsedUpdate, hint: PartitioningHint) -> Result<CompiledPlan> {
        let table = self.catalog.get_table(&update.table)?;
        self.check_mutable(table, &update.sql)?;
        for (_, expr) in &update.assignments {
            if let Some(name) = nondeterministic_function(expr) {
                return Err(Error::NonDeterministicDml {
                    reason: format!("call to {}", name),
                    sql: update.sql.clone(),
                });
            }
        }

        let source_stmt = Self::row_source(&update.sql, &update.table, &update.alias, &update.where_exprs);
        let (scan, partitioning) = self.best_row_source(&source_stmt, hint)?;
        let mut node = PlanNode::Update {
            table: update.table.clone(),
            assignments: update.assignments.clone(),
            source: Box::new(scan),
        };
        if partitioning.requires_two_fragments() || Self::replicated_multi(table, hint) {
            node = self.sum_and_send(node);
        }
        Ok(self.compiled_dml(node))
    }

    pub fn plan_delete(&self, delete: &ParsedDelete, hint: PartitioningHint) -> Result<CompiledPlan> {
        let table = self.catalog.get_table(&delete.table)?;
        self.check_mutable(table, &delete.sql)?;

        let source_stmt = Self::row_source(&delete.sql, &delete.table, &delete.alias, &delete.where_exprs);
        let enumerator = JoinOrderEnumerator::new(self.catalog, &source_stmt, hint, self.budget)?;
        let two_fragments = enumerator.partitioning().requires_two_fragments();
        let multi = two_fragments || Self::replicated_multi(table, hint);

        // A filterless, unbounded DELETE degrades to a truncate.
        if delete.where_exprs.is_empty()
            && !delete.limit_offset.is_present()
            && delete.order_by.is_empty()
        {
            let mut node = PlanNode::Delete {
                table: delete.table.clone(),
                truncate: true,
                source: None,
            };
            if multi {
                node = self.sum_and_send(node);
            }
            return Ok(self.compiled_dml(node));
        }

        if delete.limit_offset.is_present() && delete.order_by.is_empty() {
            return Err(Error::NonDeterministicDml {
                reason: "DELETE with LIMIT requires ORDER BY".into(),
                sql: delete.sql.clone(),
            });
        }
        // Each partition would pick its own "first N" rows.
        if !delete.order_by.is_empty() && delete.limit_offset.is_present() && two_fragments {
            return Err(Error::OrderedDeleteNotSinglePartition {
                sql: delete.sql.clone(),
            });
        }

        let (mut scan, partitioning) = self.best_row_source(&source_stmt, hint)?;
        if !delete.order_by.is_empty() {
            scan = PlanNode::OrderBy {
                elements: delete.order_by.clone(),
                source: Box::new(scan),
            };
        }
        if delete.limit_offset.is_present() {
            scan = PlanNode::Limit {
                limit: delete.limit_offset.limit,
                offset: delete.limit_offset.offset,
                source: Box::new(scan),
            };
        }
        let mut node = PlanNode::Delete {
            table: delete.table.clone(),
            truncate: false,
            source: Some(Box::new(scan)),
        };
        if partitioning.requires_two_fragments() || Self::replicated_multi(table, hint) {
            node = self.sum_and_send(node);
        }
        Ok(self.compiled_dml(node))
    }

    pub fn plan_union(&self, union: &ParsedUnion, hint: PartitioningHint) -> Result<CompiledPlan> {
        let planner = SelectPlanner::new(self.catalog, self.budget);
        let mut plans = Vec::with_capacity(union.children.len());
        for child in &union.children {
            plans.push(planner.plan(child, hint)?.root);
        }
        // Children without boundaries combine on the coordinator. When any
        // child is multi-partition the whole set operation moves below one
        // shared boundary, which works only if every child runs entirely
        // partition-side; a child whose coordinator fragment does real work,
        // or one pinned to a single partition, has no place under that
        // boundary.
        let any_boundary = plans.iter().any(PlanNode::contains_receive);
        let children = if any_boundary {
            let mut stripped = Vec::with_capacity(plans.len());
            for plan in plans {
                let Some(subtree) = Self::partition_local_subtree(plan) else {
                    return Err(Error::SetOpPartitioningMismatch {
                        sql: union.sql.clone(),
                    });
                };
                stripped.push(subtree);
            }
            stripped
        } else {
            plans
        };
        let mut node = PlanNode::Union {
            op: union.op,
            children,
        };
        if any_boundary {
            node = add_send_receive_pair(node);
        }
        if !union.order_by.is_empty() {
            node = PlanNode::OrderBy {
                elements: union.order_by.clone(),
                source: Box::new(node),
            };
        }
        if union.limit_offset.is_present() {
            node = PlanNode::Limit {
                limit: union.limit_offset.limit,
                offset: union.limit_offset.offset,
                source: Box::new(node),
            };
        }
        let cost = CostEstimator::new(self.catalog).estimate(&node);
        Ok(CompiledPlan {
            root: node,
            determinism: if union.order_by.is_empty() {
                Determinism::unordered("no ORDER BY clause")
            } else {
                Determinism::deterministic()
            },
            read_only: true,
            cost,
            has_limit_or_offset: union.limit_offset.is_present(),
        })
    }

    /// Re-roots a child plan below the boundary: the Send subtree, with any
    /// coordinator-side projection reapplied to it. None when the coordinator
    /// fragment does more than project, or when the child never crossed a
    /// boundary at all.
    fn partition_local_subtree(root: PlanNode) -> Option<PlanNode> {
        match root {
            PlanNode::Receive { source } => {
                let PlanNode::Send { source } = *source else {
                    return None;
                };
                Some(*source)
            }
            PlanNode::Projection { columns, source } => {
                Self::partition_local_subtree(*source).map(|inner| PlanNode::Projection {
                    columns,
                    source: Box::new(inner),
                })
            }
            _ => None,
        }
    }

    pub fn plan_swap(&self, swap: &ParsedSwap) -> Result<CompiledPlan> {
        let a = self.catalog.get_table(&swap.table_a)?;
        let b = self.catalog.get_table(&swap.table_b)?;
        let mismatch = |reason: &str| Error::SwapTablesMismatch {
            reason: reason.to_string(),
            sql: swap.sql.clone(),
        };
        if a.columns != b.columns {
            return Err(mismatch("column definitions differ"));
        }
        if a.distribution != b.distribution {
            return Err(mismatch("distribution schemes differ"));
        }
        if a.is_stream || b.is_stream {
            return Err(mismatch("streams cannot be swapped"));
        }
        Ok(self.compiled_dml(PlanNode::Swap {
            table_a: swap.table_a.clone(),
            table_b: swap.table_b.clone(),
        }))
    }

    pub fn plan_migrate(&self, migrate: &ParsedMigrate, hint: PartitioningHint) -> Result<CompiledPlan> {
        let table = self.catalog.get_table(&migrate.table)?;
        self.check_mutable(table, &migrate.sql)?;
        let source_stmt =
            Self::row_source(&migrate.sql, &migrate.table, &migrate.alias, &migrate.where_exprs);
        let (scan, partitioning) = self.best_row_source(&source_stmt, hint)?;
        let mut node = PlanNode::Migrate {
            table: migrate.table.clone(),
            source: Box::new(scan),
        };
        if partitioning.requires_two_fragments() || Self::replicated_multi(table, hint) {
            node = self.sum_and_send(node);
        }
        Ok(self.compiled_dml(node))
    }

    /// A write to a replicated table runs on every partition unless the
    /// statement is pinned to one, so its counts merge like any other
    /// multi-partition DML.
    fn replicated_multi(table: &Table, hint: PartitioningHint) -> bool {
        table.is_replicated() && hint != PartitioningHint::ForceSinglePartition
    }

    fn check_mutable(&self, table: &Table, sql: &str) -> Result<()> {
        if table.is_stream {
            return Err(Error::StreamTableWrite {
                sql: sql.to_string(),
            });
        }
        if table.materialized_view_of.is_some() {
            return Err(Error::MaterializedViewWrite {
                sql: sql.to_string(),
            });
        }
        Ok(())
    }

    /// Resolves the INSERT's target column list and checks that every
    /// unlisted column can be defaulted.
    fn resolve_insert_columns(&self, insert: &ParsedInsert, table: &Table) -> Result<Vec<String>> {
        let columns: Vec<String> = if insert.columns.is_empty() {
            table.columns.iter().map(|c| c.name.clone()).collect()
        } else {
            for name in &insert.columns {
                if table.get_column(name).is_none() {
                    return Err(Error::ColumnNotFound(format!(
                        "{}.{}",
                        table.name, name
                    )));
                }
            }
            insert.columns.clone()
        };
        for column in &table.columns {
            if columns.contains(&column.name) {
                continue;
            }
            if column.default.is_none() && !column.nullable {
                return Err(Error::MissingColumnValue {
                    column: column.name.clone(),
                    sql: insert.sql.clone(),
                });
            }
        }
        Ok(columns)
    }

    /// A synthetic single-table SELECT carrying the DML statement's filter,
    /// reusing the SELECT machinery for access-path choice.
    fn row_source(sql: &str, table: &str, alias: &str, where_exprs: &[Expression]) -> ParsedSelect {
        let mut select = ParsedSelect::scan(sql, table, alias);
        select.where_exprs = where_exprs.to_vec();
        select
    }

    /// Cheapest scan subtree for a DML row source.
    fn best_row_source(
        &self,
        select: &ParsedSelect,
        hint: PartitioningHint,
    ) -> Result<(PlanNode, super::partitioning::StatementPartitioning)> {
        let mut enumerator =
            JoinOrderEnumerator::new(self.catalog, select, hint, self.budget)?;
        let estimator = CostEstimator::new(self.catalog);
        let mut best: Option<(PlanNode, super::partitioning::StatementPartitioning, f64)> = None;
        while let Some((plan, partitioning)) = enumerator.next_plan()? {
            let total = estimator.estimate(&plan).total();
            if best.as_ref().is_none_or(|(_, _, t)| total < *t) {
                best = Some((plan, partitioning, total));
            }
        }
        let (plan, partitioning, _) = best.ok_or_else(|| Error::NoPlan {
            diagnostic: "no executable access path for the target table".into(),
            sql: select.sql.clone(),
        })?;
        Ok((plan, partitioning))
    }

    /// Multi-partition DML wrapper: each partition reports how many rows it
    /// changed; the coordinator sums the counts into the statement result.
    fn sum_and_send(&self, dml: PlanNode) -> PlanNode {
        let node = add_send_receive_pair(dml);
        PlanNode::Aggregate {
            strategy: AggregateStrategy::Serial,
            group_by: Vec::new(),
            aggregates: vec![PlanAggregate {
                function: AggregateFunction::Sum,
                argument: Some(Expression::column("", MODIFIED_TUPLES)),
                distinct: false,
                output: MODIFIED_TUPLES.to_string(),
            }],
            source: Box::new(node),
        }
    }

    fn compiled_dml(&self, node: PlanNode) -> CompiledPlan {
        let cost = CostEstimator::new(self.catalog).estimate(&node);
        CompiledPlan {
            root: node,
            determinism: Determinism::deterministic(),
            read_only: false,
            cost,
            has_limit_or_offset: false,
        }
    }
}

/// Returns the name of a non-deterministic function called anywhere in the
/// expression, if any.
fn nondeterministic_function(expr: &Expression) -> Option<String> {
    let mut found = None;
    fn walk(expr: &Expression, found: &mut Option<String>) {
        if found.is_some() {
            return;
        }
        if let Expression::Function(name, _) = expr {
            if NONDETERMINISTIC_FUNCTIONS
                .iter()
                .any(|f| name.eq_ignore_ascii_case(f))
            {
                *found = Some(name.clone());
                return;
            }
        }
        match expr {
            Expression::Compare(_, l, r)
            | Expression::And(l, r)
            | Expression::Or(l, r)
            | Expression::Like(l, r) => {
                walk(l, found);
                walk(r, found);
            }
            Expression::Not(e) | Expression::IsNull(e) | Expression::IsNotNull(e) => {
                walk(e, found)
            }
            Expression::InList(e, list) => {
                walk(e, found);
                for item in list {
                    walk(item, found);
                }
            }
            Expression::Function(_, args) => {
                for arg in args {
                    walk(arg, found);
                }
            }
            _ => {}
        }
    }
    walk(expr, &mut found);
    found
}
