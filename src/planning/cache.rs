//! Compiled-plan cache
//!
//! Planning is deterministic for a given SQL text, partitioning hint and
//! catalog generation, so compiled plans are safe to reuse. The cache keys on
//! all three; a schema change bumps the generation and naturally strands the
//! stale entries until the LRU policy evicts them.

use super::join_order::EnumerationBudget;
use super::partitioning::PartitioningHint;
use super::plan::CompiledPlan;
use super::planner::PlanAssembler;
use crate::error::Result;
use crate::statement::ParsedStatement;
use crate::types::Catalog;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    sql: String,
    hint: PartitioningHint,
    generation: u64,
}

/// Wraps plan assembly with an LRU cache of compiled plans.
pub struct CachingPlanner {
    cache: Mutex<LruCache<CacheKey, CompiledPlan>>,
    budget: EnumerationBudget,
}

impl Default for CachingPlanner {
    fn default() -> Self {
        CachingPlanner::new(DEFAULT_CAPACITY)
    }
}

impl CachingPlanner {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        CachingPlanner {
            cache: Mutex::new(LruCache::new(capacity)),
            budget: EnumerationBudget::default(),
        }
    }

    pub fn with_budget(mut self, budget: EnumerationBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Returns the cached plan for this statement and catalog generation, or
    /// plans it and caches the result. Planning errors are not cached; a
    /// statement that failed is retried on the next call.
    pub fn plan(
        &self,
        catalog: &Catalog,
        statement: &ParsedStatement,
        hint: PartitioningHint,
    ) -> Result<CompiledPlan> {
        let key = CacheKey {
            sql: statement.sql().to_string(),
            hint,
            generation: catalog.generation,
        };
        if let Some(plan) = self.cache.lock().get(&key) {
            return Ok(plan.clone());
        }
        let plan = PlanAssembler::new(catalog)
            .with_budget(self.budget)
            .plan_statement(statement, hint)?;
        self.cache.lock().put(key, plan.clone());
        Ok(plan)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{ParsedSelect, SelectItem};
    use crate::types::{Column, DataType, Expression, Table};

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        c.add_table(Table::new(
            "regions",
            vec![
                Column::new("code", DataType::Integer).nullable(false),
                Column::new("name", DataType::Text),
            ],
        ));
        c
    }

    fn select() -> ParsedStatement {
        let mut s = ParsedSelect::scan("SELECT code FROM regions", "regions", "r");
        s.items
            .push(SelectItem::column(Expression::column("r", "code"), "code"));
        ParsedStatement::Select(s)
    }

    #[test]
    fn test_repeat_statement_hits_cache() {
        let catalog = catalog();
        let planner = CachingPlanner::new(10);
        let statement = select();
        let first = planner
            .plan(&catalog, &statement, PartitioningHint::Infer)
            .unwrap();
        assert_eq!(planner.len(), 1);
        let second = planner
            .plan(&catalog, &statement, PartitioningHint::Infer)
            .unwrap();
        assert_eq!(planner.len(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_schema_change_invalidates() {
        let mut catalog = catalog();
        let planner = CachingPlanner::new(10);
        let statement = select();
        planner
            .plan(&catalog, &statement, PartitioningHint::Infer)
            .unwrap();
        catalog.add_table(Table::new("t2", vec![Column::new("a", DataType::Integer)]));
        planner
            .plan(&catalog, &statement, PartitioningHint::Infer)
            .unwrap();
        // old and new generation entries coexist until evicted
        assert_eq!(planner.len(), 2);
    }

    #[test]
    fn test_hint_is_part_of_the_key() {
        let catalog = catalog();
        let planner = CachingPlanner::new(10);
        let statement = select();
        planner
            .plan(&catalog, &statement, PartitioningHint::Infer)
            .unwrap();
        planner
            .plan(&catalog, &statement, PartitioningHint::ForceMultiPartition)
            .unwrap();
        assert_eq!(planner.len(), 2);
    }

    #[test]
    fn test_capacity_evicts() {
        let catalog = catalog();
        let planner = CachingPlanner::new(1);
        planner
            .plan(&catalog, &select(), PartitioningHint::Infer)
            .unwrap();
        let mut other = ParsedSelect::scan("SELECT name FROM regions", "regions", "r");
        other
            .items
            .push(SelectItem::column(Expression::column("r", "name"), "name"));
        planner
            .plan(&catalog, &ParsedStatement::Select(other), PartitioningHint::Infer)
            .unwrap();
        assert_eq!(planner.len(), 1);
    }
}
