use thiserror::Error;

/// Boxed error produced by a unit of work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a single pool task.
pub type SpawnResult<T> = Result<T, SpawnError>;

/// Errors surfaced by the pool, the batch map and the concurrent stream.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SpawnError {
    /// A non-positive concurrency limit was supplied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The unit of work itself returned an error; the cause is kept as `source()`.
    #[error("operation failed: {0}")]
    OperationFailure(#[source] BoxError),

    /// The unit of work panicked.
    #[error("task panicked: {0}")]
    Panic(String),

    /// The task was dropped from the queue before it started.
    #[error("task abandoned before it started")]
    Abandoned,

    /// The caller stopped waiting for the result.
    #[error("timed out waiting for task result")]
    Timeout,

    /// The result channel closed without a value.
    #[error("result channel closed")]
    ChannelClosed,
}

impl SpawnError {
    pub(crate) fn invalid_limit(limit: usize) -> Self {
        SpawnError::InvalidArgument(format!("concurrency limit must be positive, got {limit}"))
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SpawnError::InvalidArgument(_) => "invalid_argument",
            SpawnError::OperationFailure(_) => "operation_failure",
            SpawnError::Panic(_) => "task_panic",
            SpawnError::Abandoned => "task_abandoned",
            SpawnError::Timeout => "wait_timeout",
            SpawnError::ChannelClosed => "channel_closed",
        }
    }

    /// `true` when the task ran and failed, either by error or by panic.
    pub fn is_failure(&self) -> bool {
        matches!(self, SpawnError::OperationFailure(_) | SpawnError::Panic(_))
    }
}
