//! Bounded-concurrency async task runner with cooperative cancellation
//!
//! # Features
//! - [`Pool`]: FIFO admission with a hard limit on running tasks and an idle `drain`
//! - [`map_with_concurrency`]: batch mode, results in input order, fail-fast
//! - [`run_with_concurrency`]: streaming mode, results in completion order
//! - [`CancellationController`]: one-shot cancellation fanned out to many observers
//! - Panics inside tasks are caught and reported as [`SpawnError::Panic`]
//!
//! ```no_run
//! use async_bounded::{map_with_concurrency, SpawnError};
//!
//! # async fn demo() -> Result<(), SpawnError> {
//! let doubled = map_with_concurrency(vec![1, 2, 3], |x: u32| async move {
//!     Ok::<_, SpawnError>(x * 2)
//! }, 2).await?;
//! assert_eq!(doubled, vec![2, 4, 6]);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod stream;

pub use cancel::{CancellationController, CancellationSignal, Subscription};
pub use config::Config;
pub use errors::{BoxError, SpawnError, SpawnResult};
pub use handle::JoinHandle;
pub use model::{JoinOrdering, PoolMetrics, TaskState};
pub use pool::{join_handles, map_with_concurrency, map_with_concurrency_settled, Pool};
pub use stream::{run_with_concurrency, ConcurrentStream};
