//! Planning session guard
//!
//! The planner keeps no global mutable state, but plan assembly for one
//! statement must not interleave with a catalog swap on another thread: a
//! statement planned half against the old schema and half against the new one
//! would be silently wrong. Callers hold a [`PlanningSession`] for the
//! duration of one statement; catalog swaps take the same lock.

use parking_lot::{Mutex, MutexGuard};

static PLANNING_LOCK: Mutex<()> = Mutex::new(());

/// RAII guard serializing plan assembly against schema changes. Dropping it
/// releases the lock.
pub struct PlanningSession {
    _guard: MutexGuard<'static, ()>,
}

impl PlanningSession {
    pub fn acquire() -> Self {
        PlanningSession {
            _guard: PLANNING_LOCK.lock(),
        }
    }
}
