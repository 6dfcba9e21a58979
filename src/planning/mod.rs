//! Cost-driven plan assembly
//!
//! Turns parsed statements into executable plan trees. SELECT planning is a
//! candidate competition: the join-order enumerator streams bounded
//! combinations of join orders and per-scan access paths, statement shaping
//! turns each candidate into a complete tree (aggregation, the two-fragment
//! boundary, ordering, limits), and the cheapest survivor under the cost
//! model wins. DML planning reuses the same machinery for its row sources.

pub mod access_path;
pub mod aggregate_planner;
pub mod cache;
pub mod cost;
pub mod join_order;
pub mod partitioning;
pub mod plan;
pub mod planner;
pub mod select_planner;
pub mod session;
pub mod statement_planner;

pub use access_path::{AccessPath, IndexSelector};
pub use cache::CachingPlanner;
pub use cost::{Cost, CostEstimator};
pub use join_order::{EnumerationBudget, JoinOrderEnumerator};
pub use partitioning::{PartitioningHint, StatementPartitioning, ValueEquivalence};
pub use plan::{
    AggregateStrategy, CompiledPlan, Determinism, PlanAggregate, PlanFragments, PlanNode,
};
pub use planner::PlanAssembler;
pub use select_planner::SelectPlanner;
pub use session::PlanningSession;
pub use statement_planner::StatementPlanner;
