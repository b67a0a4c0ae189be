//! # tsscore Pool
//!
//! Queue of operation ids waiting to be proposed for signing.
//!
//! - **Dedup**: an id is queued at most once while it waits
//! - **FIFO with backpressure**: a bounded channel; `add` waits while it is full
//! - **Re-validation**: ids are checked against chain again when dequeued, so
//!   the pool never hands out an id that is no longer approved
//! - **Catch-up**: a one-shot scan over all chain operations at startup
//!
//! ## Example
//!
//! ```rust,ignore
//! use tsscore_pool::Pool;
//!
//! let pool = Pool::new(chain.clone(), 10_000);
//! pool.add("op1").await?;
//! let batch = pool.get_next(32).await;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod catchup;
pub mod pool;

pub use catchup::CatchupScanner;
pub use pool::{Pool, DEFAULT_CAPACITY};

use tsscore_core::ChainError;

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur in pool operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The operation is not approved, already signed or of an unsupported type
    #[error("operation {0} cannot be approved for signing")]
    OperationNotApprovable(String),

    /// Chain lookup failed
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// The queue was closed
    #[error("pool is closed")]
    Closed,
}
