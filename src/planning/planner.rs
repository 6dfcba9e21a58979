//! Statement dispatch
//!
//! The assembler is the planner's front door: it takes any parsed statement,
//! holds the planning session for its duration, and hands it to the SELECT or
//! DML planner. Everything below it works per statement kind.

use super::join_order::EnumerationBudget;
use super::partitioning::PartitioningHint;
use super::plan::CompiledPlan;
use super::select_planner::SelectPlanner;
use super::session::PlanningSession;
use super::statement_planner::StatementPlanner;
use crate::error::Result;
use crate::statement::ParsedStatement;
use crate::types::Catalog;

pub struct PlanAssembler<'a> {
    catalog: &'a Catalog,
    budget: EnumerationBudget,
}

impl<'a> PlanAssembler<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        PlanAssembler {
            catalog,
            budget: EnumerationBudget::default(),
        }
    }

    pub fn with_budget(mut self, budget: EnumerationBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Plans one statement under the session lock.
    pub fn plan_statement(
        &self,
        statement: &ParsedStatement,
        hint: PartitioningHint,
    ) -> Result<CompiledPlan> {
        let _session = PlanningSession::acquire();
        let dml = StatementPlanner::new(self.catalog, self.budget);
        match statement {
            ParsedStatement::Select(s) => {
                SelectPlanner::new(self.catalog, self.budget).plan(s, hint)
            }
            ParsedStatement::Insert(s) => dml.plan_insert(s, hint),
            ParsedStatement::Update(s) => dml.plan_update(s, hint),
            ParsedStatement::Delete(s) => dml.plan_delete(s, hint),
            ParsedStatement::Union(s) => dml.plan_union(s, hint),
            ParsedStatement::Swap(s) => dml.plan_swap(s),
            ParsedStatement::Migrate(s) => dml.plan_migrate(s, hint),
        }
    }
}
