//! # tsscore Node
//!
//! Runtime of a tsscore party: builds the session engine from a
//! [`Config`](tsscore_config::Config) and externally supplied collaborators,
//! serves the `tss_*` RPC API and drives sessions from a stream of block
//! heights.
//!
//! ## Components
//!
//! - [`Node`] - owns the pool, session manager and RPC server
//! - [`Collaborators`] - chain client, MPC engine factory, stores and peer transport
//! - [`init_tracing`] - global subscriber from the `[logging]` section
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tsscore_config::Config;
//! use tsscore_node::{init_tracing, Collaborators, Node};
//! use tsscore_rpc::HttpPeerDialer;
//!
//! async fn start(
//!     chain: Arc<dyn tsscore_core::ChainClient>,
//!     engines: Arc<dyn tsscore_core::EngineFactory>,
//!     secrets: Arc<dyn tsscore_core::SecretStore>,
//!     store: Arc<dyn tsscore_core::SessionStore>,
//!     blocks: impl futures::Stream<Item = u64>,
//!     height: u64,
//! ) -> anyhow::Result<()> {
//!     let config = Config::load(Path::new("tsscore.toml"))?;
//!     init_tracing(&config.logging)?;
//!
//!     let dialer = Arc::new(HttpPeerDialer::new(config.network.request_timeout()));
//!     let collaborators = Collaborators { chain, engines, secrets, store, dialer };
//!     let mut node = Node::from_config(config, collaborators, height).await?;
//!     node.run(blocks).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod logging;
pub mod node;

pub use logging::{env_filter, init_tracing};
pub use node::{session_types, Collaborators, Node, NodeEvent, NodeStatus, ShutdownHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "tsscore.toml";
