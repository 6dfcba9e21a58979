//! shardplan: a cost-driven query planner for a partitioned SQL engine
//!
//! The planner takes parsed, name-resolved statements and a catalog snapshot
//! and produces executable plan trees. A plan runs in at most two fragments:
//! a coordinator fragment and one partition fragment replicated across all
//! partitions, joined by a single Send/Receive boundary. Plan choice is a
//! competition over join orders and per-table access paths, scored by a
//! simple row/cpu/io cost model.
//!
//! Entry points: [`planning::PlanAssembler`] plans one statement;
//! [`planning::CachingPlanner`] adds an LRU cache keyed on SQL text and
//! catalog generation.

pub mod error;
pub mod planning;
pub mod statement;
pub mod types;

pub use error::{Error, Result};
