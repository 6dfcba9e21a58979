//! Shared query enums used across the statement model and plan nodes

use serde::{Deserialize, Serialize};

/// Join type. RIGHT joins are normalized to LEFT before planning and never
/// appear inside a join tree that the enumerator sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

/// Sort direction requested by ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Sort direction an access path can provide. `Invalid` means a downstream
/// sort node is mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
    Invalid,
}

impl SortDirection {
    pub fn from_direction(dir: Direction) -> Self {
        match dir {
            Direction::Ascending => SortDirection::Asc,
            Direction::Descending => SortDirection::Desc,
        }
    }

    pub fn is_valid(self) -> bool {
        self != SortDirection::Invalid
    }
}

/// Index lookup type for the first search-key probe of an index scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexLookup {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    GeoContains,
}
