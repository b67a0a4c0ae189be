//! # tsscore Configuration
//!
//! All node settings live in one `tsscore.toml` file. Chain-governed values
//! (roster, threshold, phase durations) are not configured here; they are
//! read from chain at the start of every session.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tsscore_config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("tsscore.toml"))?;
//! println!("account: {}", config.node.account);
//! println!("first session at block {}", config.session.start_block);
//! ```
//!
//! ## Configuration Sections
//!
//! - `[node]` - Local identity (account, key file)
//! - `[session]` - Bootstrap height and seed, proposal and mailbox limits
//! - `[pool]` - Pending operation queue capacity and catch-up scan
//! - `[network]` - Listen address and peer request timing
//! - `[logging]` - Log level and format

mod config;
mod error;

pub use config::*;
pub use error::*;
