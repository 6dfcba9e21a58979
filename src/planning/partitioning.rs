//! Statement partitioning analysis
//!
//! Decides whether a statement can run on a single partition, and whether a
//! candidate join is executable in at most two fragments. The analysis works
//! on value equivalence: equality conjuncts merge expressions into classes,
//! and every partitioned table whose partition column lands in the same class
//! counts as one independently-partitioned group. One group is plannable
//! (scan every partition, merge at the coordinator); two or more would need
//! data movement between partitions and is rejected.

use crate::types::{Catalog, CompareOp, Expression};
use crate::statement::TableScan;
use crate::error::Result;

/// Caller-supplied constraint on where the statement may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PartitioningHint {
    /// Run on one partition chosen by an externally supplied value.
    ForceSinglePartition,
    /// Plan for all partitions even if a single-partition plan exists.
    ForceMultiPartition,
    /// Infer from the statement's filters.
    #[default]
    Infer,
}

/// Equivalence classes of expressions connected by equality conjuncts.
#[derive(Debug, Clone, Default)]
pub struct ValueEquivalence {
    classes: Vec<Vec<Expression>>,
}

impl ValueEquivalence {
    /// Builds classes from a conjunct pool. Only equalities between simple
    /// expressions (columns, constants, parameters) participate.
    pub fn build<'a, I>(conjuncts: I) -> Self
    where
        I: IntoIterator<Item = &'a Expression>,
    {
        let mut eq = ValueEquivalence::default();
        for conjunct in conjuncts {
            if let Expression::Compare(op, l, r) = conjunct {
                if op.is_equality() && is_simple(l) && is_simple(r) {
                    eq.add_equality(l, r);
                }
            }
        }
        eq
    }

    fn add_equality(&mut self, a: &Expression, b: &Expression) {
        let ia = self.class_index(a);
        let ib = self.class_index(b);
        match (ia, ib) {
            (Some(ia), Some(ib)) if ia != ib => {
                // Merge the later class into the earlier one.
                let (keep, drop) = (ia.min(ib), ia.max(ib));
                let merged = self.classes.remove(drop);
                self.classes[keep].extend(merged);
            }
            (Some(_), Some(_)) => {}
            (Some(ia), None) => self.classes[ia].push(b.clone()),
            (None, Some(ib)) => self.classes[ib].push(a.clone()),
            (None, None) => self.classes.push(vec![a.clone(), b.clone()]),
        }
    }

    fn class_index(&self, expr: &Expression) -> Option<usize> {
        self.classes.iter().position(|c| c.contains(expr))
    }

    pub fn class_containing(&self, expr: &Expression) -> Option<&[Expression]> {
        self.class_index(expr).map(|i| self.classes[i].as_slice())
    }
}

fn is_simple(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Column(_) | Expression::Constant(_) | Expression::Parameter(_)
    )
}

/// Per-candidate partitioning state. Cloned from the statement-level analysis
/// for every join order the enumerator tries.
#[derive(Debug, Clone)]
pub struct StatementPartitioning {
    hint: PartitioningHint,
    partitioned_table_count: usize,
    independent_group_count: usize,
    inferred_value: Option<Expression>,
}

impl StatementPartitioning {
    pub fn new(hint: PartitioningHint) -> Self {
        StatementPartitioning {
            hint,
            partitioned_table_count: 0,
            independent_group_count: 0,
            inferred_value: None,
        }
    }

    /// Clears analysis results so the same state can be reused for another
    /// candidate.
    pub fn reset(&mut self) {
        self.partitioned_table_count = 0;
        self.independent_group_count = 0;
        self.inferred_value = None;
    }

    /// Analyzes the partitioned tables among `scans` against the statement's
    /// value equivalence. Populates the group count and, when exactly one
    /// group is anchored by a constant or parameter, the inferred partition
    /// value.
    pub fn analyze(
        &mut self,
        scans: &[TableScan],
        equivalence: &ValueEquivalence,
        catalog: &Catalog,
    ) -> Result<()> {
        self.reset();
        // Class index (or None for uncovered columns) per partitioned scan.
        let mut covered_classes: Vec<&[Expression]> = Vec::new();
        let mut uncovered = 0usize;
        for scan in scans {
            let table = catalog.get_table(&scan.table)?;
            let Some(pcol) = table.partition_column() else {
                continue;
            };
            self.partitioned_table_count += 1;
            let pcol_expr = Expression::column(scan.alias.clone(), pcol);
            match equivalence.class_containing(&pcol_expr) {
                Some(class) => {
                    if !covered_classes
                        .iter()
                        .any(|existing| std::ptr::eq(*existing, class))
                    {
                        covered_classes.push(class);
                    }
                }
                None => uncovered += 1,
            }
        }
        self.independent_group_count = covered_classes.len() + uncovered;

        if self.hint == PartitioningHint::Infer && self.independent_group_count == 1 {
            if let Some(class) = covered_classes.first() {
                self.inferred_value = class
                    .iter()
                    .find(|e| !matches!(e, Expression::Column(_)))
                    .cloned();
            }
        }
        Ok(())
    }

    pub fn count_of_partitioned_tables(&self) -> usize {
        self.partitioned_table_count
    }

    pub fn count_of_independently_partitioned_tables(&self) -> usize {
        self.independent_group_count
    }

    /// The constant or parameter that pins the statement to one partition.
    pub fn inferred_partition_value(&self) -> Option<&Expression> {
        self.inferred_value.as_ref()
    }

    /// True when the statement touches one partition's data only.
    pub fn is_single_partition(&self) -> bool {
        match self.hint {
            PartitioningHint::ForceSinglePartition => true,
            PartitioningHint::ForceMultiPartition => false,
            PartitioningHint::Infer => {
                self.partitioned_table_count == 0 || self.inferred_value.is_some()
            }
        }
    }

    /// A multi-partition join is executable in two fragments only when at
    /// most one group of partitioned tables is scanned independently.
    pub fn is_join_valid(&self) -> bool {
        self.is_single_partition() || self.independent_group_count <= 1
    }

    /// Whether the plan needs a partition fragment below a Send/Receive pair.
    pub fn requires_two_fragments(&self) -> bool {
        !self.is_single_partition() && self.partitioned_table_count > 0
    }
}
