//! Physical plan nodes
//!
//! A compiled plan is a tree of `PlanNode` values. Distribution shows up as a
//! single Send/Receive pair: everything below the Send runs on every involved
//! partition, everything above the Receive runs once on the coordinator.
//! Single-partition plans have no pair at all.

use super::cost::Cost;
use crate::statement::{
    AggregateFunction, OrderByElement, SetOp, WindowFunctionCall,
};
use crate::types::{Expression, IndexLookup, JoinType, SortDirection};

/// One aggregate computed by an Aggregate node.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanAggregate {
    pub function: AggregateFunction,
    /// None for COUNT(*).
    pub argument: Option<Expression>,
    pub distinct: bool,
    /// Output column label, also the name coordinator-side re-aggregation
    /// uses to find the partial result.
    pub output: String,
}

/// How an Aggregate node executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStrategy {
    /// Hash table keyed on the group-by columns.
    Hash,
    /// Streaming aggregation over input already ordered on the group-by
    /// columns.
    Serial,
    /// Partition-side half of a split aggregation; a coordinator Aggregate
    /// above the Receive merges the partials.
    Partial,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    SeqScan {
        table: String,
        alias: String,
        predicate: Option<Expression>,
    },
    IndexScan {
        table: String,
        alias: String,
        index: String,
        lookup: IndexLookup,
        /// Comparand expressions for the key prefix, one per key column used.
        search_keys: Vec<Expression>,
        /// Scan-termination predicate for range scans.
        end_expr: Option<Expression>,
        /// Residual filter evaluated per row.
        predicate: Option<Expression>,
        sort_direction: SortDirection,
    },
    NestLoopJoin {
        join_type: JoinType,
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        /// Match condition, evaluated before null padding.
        predicate: Option<Expression>,
        /// Filter applied to joined (possibly padded) rows.
        post_predicate: Option<Expression>,
    },
    /// Nested loop whose inner side is an index scan probed with outer-row
    /// values.
    NestLoopIndexJoin {
        join_type: JoinType,
        outer: Box<PlanNode>,
        inner: Box<PlanNode>,
        predicate: Option<Expression>,
        post_predicate: Option<Expression>,
    },
    Aggregate {
        strategy: AggregateStrategy,
        group_by: Vec<Expression>,
        aggregates: Vec<PlanAggregate>,
        source: Box<PlanNode>,
    },
    OrderBy {
        elements: Vec<OrderByElement>,
        source: Box<PlanNode>,
    },
    Limit {
        limit: Option<i64>,
        offset: i64,
        source: Box<PlanNode>,
    },
    Projection {
        columns: Vec<(Expression, String)>,
        source: Box<PlanNode>,
    },
    WindowFunction {
        call: WindowFunctionCall,
        source: Box<PlanNode>,
    },
    /// Partition-fragment root: ships its input to the coordinator.
    Send { source: Box<PlanNode> },
    /// Coordinator-side merge point for partition results.
    Receive { source: Box<PlanNode> },
    /// Stands in for the Receive's subtree in a fragmentized coordinator
    /// fragment.
    PartitionResult,
    Union {
        op: SetOp,
        children: Vec<PlanNode>,
    },
    /// Literal rows, the source of an INSERT ... VALUES.
    Values { rows: Vec<Vec<Expression>> },
    Insert {
        table: String,
        columns: Vec<String>,
        source: Box<PlanNode>,
        upsert: bool,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expression)>,
        source: Box<PlanNode>,
    },
    Delete {
        table: String,
        /// Whole-table delete executed as a truncate, no row source needed.
        truncate: bool,
        source: Option<Box<PlanNode>>,
    },
    Swap {
        table_a: String,
        table_b: String,
    },
    Migrate {
        table: String,
        source: Box<PlanNode>,
    },
}

impl PlanNode {
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::NestLoopJoin { left, right, .. } => vec![left, right],
            PlanNode::NestLoopIndexJoin { outer, inner, .. } => vec![outer, inner],
            PlanNode::Aggregate { source, .. }
            | PlanNode::OrderBy { source, .. }
            | PlanNode::Limit { source, .. }
            | PlanNode::Projection { source, .. }
            | PlanNode::WindowFunction { source, .. }
            | PlanNode::Send { source }
            | PlanNode::Receive { source }
            | PlanNode::Insert { source, .. }
            | PlanNode::Update { source, .. }
            | PlanNode::Migrate { source, .. } => vec![source],
            PlanNode::Union { children, .. } => children.iter().collect(),
            PlanNode::Delete { source, .. } => {
                source.iter().map(|s| s.as_ref()).collect()
            }
            PlanNode::SeqScan { .. }
            | PlanNode::IndexScan { .. }
            | PlanNode::PartitionResult
            | PlanNode::Values { .. }
            | PlanNode::Swap { .. } => Vec::new(),
        }
    }

    /// Number of Receive nodes in the tree. More than one means the plan
    /// needs more than two fragments and cannot run.
    pub fn count_receive_nodes(&self) -> usize {
        let own = usize::from(matches!(self, PlanNode::Receive { .. }));
        own + self
            .children()
            .iter()
            .map(|c| c.count_receive_nodes())
            .sum::<usize>()
    }

    pub fn contains_receive(&self) -> bool {
        self.count_receive_nodes() > 0
    }

    /// Depth-first preorder visit.
    pub fn visit<'a, F: FnMut(&'a PlanNode)>(&'a self, f: &mut F) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }
}

/// Whether a plan's results are reproducible across replicas and re-runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Determinism {
    /// Rows arrive in a reproducible order.
    pub order_deterministic: bool,
    /// The row set is reproducible even if the order is not.
    pub content_deterministic: bool,
    /// Human-readable reason when either flag is false.
    pub detail: Option<String>,
}

impl Determinism {
    pub fn deterministic() -> Self {
        Determinism {
            order_deterministic: true,
            content_deterministic: true,
            detail: None,
        }
    }

    pub fn unordered(detail: impl Into<String>) -> Self {
        Determinism {
            order_deterministic: false,
            content_deterministic: true,
            detail: Some(detail.into()),
        }
    }
}

/// A fragmentized plan: the coordinator fragment plus at most one partition
/// fragment rooted at its Send node.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanFragments {
    pub coordinator: PlanNode,
    pub partition: Option<PlanNode>,
}

/// The finished output of planning.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    pub root: PlanNode,
    pub determinism: Determinism,
    pub read_only: bool,
    pub cost: Cost,
    /// True when the statement carried LIMIT or OFFSET; content determinism
    /// then additionally requires a fully deterministic order.
    pub has_limit_or_offset: bool,
}

impl CompiledPlan {
    /// Splits the plan at its Receive node. The partition fragment is the
    /// Send subtree; the coordinator keeps a `PartitionResult` placeholder
    /// where the Receive's input was. Plans without a Receive come back as a
    /// single fragment.
    pub fn fragmentize(&self) -> PlanFragments {
        let mut partition = None;
        let coordinator = cut_at_receive(self.root.clone(), &mut partition);
        PlanFragments {
            coordinator,
            partition,
        }
    }
}

fn cut_at_receive(node: PlanNode, extracted: &mut Option<PlanNode>) -> PlanNode {
    match node {
        PlanNode::Receive { source } => {
            *extracted = Some(*source);
            PlanNode::Receive {
                source: Box::new(PlanNode::PartitionResult),
            }
        }
        PlanNode::NestLoopJoin {
            join_type,
            left,
            right,
            predicate,
            post_predicate,
        } => PlanNode::NestLoopJoin {
            join_type,
            left: Box::new(cut_at_receive(*left, extracted)),
            right: Box::new(cut_at_receive(*right, extracted)),
            predicate,
            post_predicate,
        },
        PlanNode::NestLoopIndexJoin {
            join_type,
            outer,
            inner,
            predicate,
            post_predicate,
        } => PlanNode::NestLoopIndexJoin {
            join_type,
            outer: Box::new(cut_at_receive(*outer, extracted)),
            inner: Box::new(cut_at_receive(*inner, extracted)),
            predicate,
            post_predicate,
        },
        PlanNode::Aggregate {
            strategy,
            group_by,
            aggregates,
            source,
        } => PlanNode::Aggregate {
            strategy,
            group_by,
            aggregates,
            source: Box::new(cut_at_receive(*source, extracted)),
        },
        PlanNode::OrderBy { elements, source } => PlanNode::OrderBy {
            elements,
            source: Box::new(cut_at_receive(*source, extracted)),
        },
        PlanNode::Limit {
            limit,
            offset,
            source,
        } => PlanNode::Limit {
            limit,
            offset,
            source: Box::new(cut_at_receive(*source, extracted)),
        },
        PlanNode::Projection { columns, source } => PlanNode::Projection {
            columns,
            source: Box::new(cut_at_receive(*source, extracted)),
        },
        PlanNode::WindowFunction { call, source } => PlanNode::WindowFunction {
            call,
            source: Box::new(cut_at_receive(*source, extracted)),
        },
        PlanNode::Union { op, children } => PlanNode::Union {
            op,
            children: children
                .into_iter()
                .map(|c| cut_at_receive(c, extracted))
                .collect(),
        },
        PlanNode::Insert {
            table,
            columns,
            source,
            upsert,
        } => PlanNode::Insert {
            table,
            columns,
            source: Box::new(cut_at_receive(*source, extracted)),
            upsert,
        },
        PlanNode::Update {
            table,
            assignments,
            source,
        } => PlanNode::Update {
            table,
            assignments,
            source: Box::new(cut_at_receive(*source, extracted)),
        },
        PlanNode::Delete {
            table,
            truncate,
            source,
        } => PlanNode::Delete {
            table,
            truncate,
            source: source.map(|s| Box::new(cut_at_receive(*s, extracted))),
        },
        PlanNode::Migrate { table, source } => PlanNode::Migrate {
            table,
            source: Box::new(cut_at_receive(*source, extracted)),
        },
        leaf => leaf,
    }
}
