use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub limit: usize,
    pub running: usize,
    pub queued: usize,
    pub total_spawned: usize,
    pub completed: usize,
    pub failed: usize,
    pub abandoned: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        self.running as f64 / self.limit as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed + self.failed;
        if total == 0 {
            return 1.0;
        }
        self.completed as f64 / total as f64
    }

    pub fn is_idle(&self) -> bool {
        self.running == 0 && self.queued == 0
    }
}

/// Lifecycle of a task submitted to a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    Abandoned,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Queued,
            1 => TaskState::Running,
            2 => TaskState::Completed,
            3 => TaskState::Failed,
            _ => TaskState::Abandoned,
        }
    }

    pub fn is_settled(self) -> bool {
        !matches!(self, TaskState::Queued | TaskState::Running)
    }
}

/// Task state shared between the pool and a handle.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(TaskState::Queued as u8))
    }

    #[inline]
    pub(crate) fn get(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `from` to `to` only if the task is still in `from`.
    #[inline]
    pub(crate) fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Order in which joined results are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOrdering {
    /// Input order.
    Ordered,
    /// Completion order.
    UnOrdered,
}
