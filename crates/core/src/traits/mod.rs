//! Collaborator traits.
//!
//! Other crates depend on these traits rather than concrete clients so that
//! sessions can be driven in isolation with in-memory doubles.

mod chain;
mod engine;
mod store;
mod transport;

pub use chain::*;
pub use engine::*;
pub use store::*;
pub use transport::*;
