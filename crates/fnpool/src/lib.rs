//! # fnpool
//!
//! A bounded pool of isolated worker threads, each running the same bound
//! function, with futures for results.
//!
//! ## Features
//!
//! - **Hard resource cap**: exactly `size` worker threads, fixed at construction
//! - **FIFO admission**: calls queue in arrival order while every worker is busy
//! - **Warm reuse**: the most recently freed worker takes the next call
//! - **Clone semantics**: arguments and results are serialized across the worker
//!   boundary, so workers never share memory with callers
//! - **Disposal**: one call terminates every worker and rejects all outstanding calls
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Pool                                │
//! │  dispatch() ──► free worker? ──yes──► WorkerHandle::send     │
//! │                      │ no                                    │
//! │                      ▼                                       │
//! │               pending queue (FIFO)                           │
//! └─────────────────────────────────────────────────────────────┘
//!            │ payload                         ▲ WorkerEvent
//!            ▼                                 │
//! ┌─────────────────────────────────────────────────────────────┐
//! │   [worker-0]  [worker-1]  ...  [worker-N]   (OS threads)    │
//! │   each owns a clone of the bound function                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use fnpool::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), PoolError> {
//! let pool = Pool::new(
//!     |n: u64| if n > 90 { Err("overflow") } else { Ok(fib(n)) },
//!     4,
//! )?;
//!
//! let handles: Vec<_> = (80..90).map(|n| pool.dispatch(&n)).collect();
//! for handle in handles {
//!     println!("{}", handle.await?);
//! }
//!
//! pool.dispose();
//! # Ok(())
//! # }
//! # fn fib(n: u64) -> u64 { (0..n).fold((0u64, 1u64), |(a, b), _| (b, a + b)).0 }
//! ```

pub mod call;
pub mod codec;
pub mod config;
pub mod error;
pub mod pool;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::call::CallHandle;
    pub use crate::config::PoolConfig;
    pub use crate::error::{ConfigError, ExecutionError, PoolError};
    pub use crate::pool::{Pool, PoolStats, PoolStatus};
}

// Re-export key types at crate root
pub use call::CallHandle;
pub use codec::Payload;
pub use config::PoolConfig;
pub use error::{ConfigError, ExecutionError, PoolError};
pub use pool::{Pool, PoolStats, PoolStatus};
pub use worker::{WorkerId, WorkerState};
