//! Plan cost model
//!
//! Deliberately coarse: the estimates only have to rank candidate plans for
//! the same statement against each other, never predict wall-clock time.
//! Cardinalities come from per-table row estimates, selectivities are fixed
//! factors per predicate shape.

use super::plan::{CompiledPlan, PlanNode};
use crate::types::{Catalog, IndexLookup};

const SEQ_SCAN_SELECTIVITY: f64 = 0.5;
const EQ_KEY_SELECTIVITY: f64 = 0.05;
const RANGE_SELECTIVITY: f64 = 0.33;
const JOIN_SELECTIVITY: f64 = 0.1;
/// Network transfer is weighted like storage io.
const IO_WEIGHT: f64 = 10.0;

/// Estimated cost of a plan subtree.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cost {
    /// Estimated output cardinality.
    pub rows: f64,
    /// Tuples examined.
    pub cpu: f64,
    /// Tuples read from storage or moved across the network.
    pub io: f64,
}

impl Cost {
    pub fn total(&self) -> f64 {
        self.cpu + self.io * IO_WEIGHT
    }
}

/// Bottom-up cost estimator.
pub struct CostEstimator<'a> {
    catalog: &'a Catalog,
}

impl<'a> CostEstimator<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        CostEstimator { catalog }
    }

    pub fn estimate(&self, node: &PlanNode) -> Cost {
        match node {
            PlanNode::SeqScan {
                table, predicate, ..
            } => {
                let base = self.table_rows(table);
                let rows = if predicate.is_some() {
                    base * SEQ_SCAN_SELECTIVITY
                } else {
                    base
                };
                Cost {
                    rows,
                    cpu: base,
                    io: base,
                }
            }
            PlanNode::IndexScan {
                table,
                lookup,
                search_keys,
                predicate,
                ..
            } => {
                let base = self.table_rows(table);
                // Each bound key component narrows the scan by the same
                // factor; the lookup type only matters for keyless walks.
                let mut rows = match lookup {
                    IndexLookup::GeoContains => base * EQ_KEY_SELECTIVITY,
                    _ if search_keys.is_empty() => base * RANGE_SELECTIVITY,
                    _ => base * EQ_KEY_SELECTIVITY.powi(search_keys.len() as i32),
                };
                if predicate.is_some() {
                    rows *= SEQ_SCAN_SELECTIVITY;
                }
                let rows = rows.max(1.0);
                // Probe cost plus one read per produced row.
                let probe = base.max(2.0).log2();
                Cost {
                    rows,
                    cpu: rows,
                    io: probe + rows,
                }
            }
            PlanNode::NestLoopJoin {
                left,
                right,
                predicate,
                ..
            } => {
                let l = self.estimate(left);
                let r = self.estimate(right);
                let pairs = l.rows * r.rows;
                let rows = if predicate.is_some() {
                    (pairs * JOIN_SELECTIVITY).max(1.0)
                } else {
                    pairs
                };
                Cost {
                    rows,
                    cpu: l.cpu + l.rows * r.cpu + pairs,
                    io: l.io + l.rows.max(1.0) * r.io,
                }
            }
            PlanNode::NestLoopIndexJoin { outer, inner, .. } => {
                let o = self.estimate(outer);
                let i = self.estimate(inner);
                // One indexed probe per outer row.
                let rows = (o.rows * i.rows * JOIN_SELECTIVITY).max(1.0);
                Cost {
                    rows,
                    cpu: o.cpu + o.rows * i.rows.max(1.0),
                    io: o.io + o.rows.max(1.0) * i.io,
                }
            }
            PlanNode::Aggregate {
                group_by, source, ..
            } => {
                let s = self.estimate(source);
                let rows = if group_by.is_empty() {
                    1.0
                } else {
                    s.rows.sqrt().max(1.0)
                };
                Cost {
                    rows,
                    cpu: s.cpu + s.rows,
                    io: s.io,
                }
            }
            PlanNode::OrderBy { source, .. } => {
                let s = self.estimate(source);
                Cost {
                    rows: s.rows,
                    cpu: s.cpu + s.rows * s.rows.max(2.0).log2(),
                    io: s.io,
                }
            }
            PlanNode::Limit { limit, source, .. } => {
                let s = self.estimate(source);
                let rows = match limit {
                    Some(n) => s.rows.min(*n as f64),
                    None => s.rows,
                };
                Cost { rows, ..s }
            }
            // The pair moves every produced row across the network.
            PlanNode::Send { source } | PlanNode::Receive { source } => {
                let s = self.estimate(source);
                Cost {
                    rows: s.rows,
                    cpu: s.cpu,
                    io: s.io + s.rows,
                }
            }
            PlanNode::Union { children, .. } => {
                let mut cost = Cost::default();
                for child in children {
                    let c = self.estimate(child);
                    cost.rows += c.rows;
                    cost.cpu += c.cpu;
                    cost.io += c.io;
                }
                cost
            }
            PlanNode::Values { rows } => Cost {
                rows: rows.len() as f64,
                cpu: rows.len() as f64,
                io: 0.0,
            },
            PlanNode::PartitionResult => Cost::default(),
            other => {
                // Shaping nodes (projection, window, DML wrappers) pass their
                // input through with one touch per row.
                let mut cost = Cost::default();
                for child in other.children() {
                    let c = self.estimate(child);
                    cost.rows += c.rows;
                    cost.cpu += c.cpu + c.rows;
                    cost.io += c.io;
                }
                cost
            }
        }
    }

    fn table_rows(&self, table: &str) -> f64 {
        self.catalog
            .get_table(table)
            .map(|t| t.row_estimate as f64)
            .unwrap_or(1000.0)
            .max(1.0)
    }
}

/// Keeps the cheapest of the candidate plans offered to it.
#[derive(Default)]
pub struct PlanSelector {
    best: Option<CompiledPlan>,
    candidates_seen: usize,
}

impl PlanSelector {
    pub fn new() -> Self {
        PlanSelector::default()
    }

    pub fn consider(&mut self, plan: CompiledPlan) {
        self.candidates_seen += 1;
        let better = match &self.best {
            Some(best) => plan.cost.total() < best.cost.total(),
            None => true,
        };
        if better {
            self.best = Some(plan);
        }
    }

    pub fn candidates_seen(&self) -> usize {
        self.candidates_seen
    }

    pub fn into_best(self) -> Option<CompiledPlan> {
        self.best
    }
}
