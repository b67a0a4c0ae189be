//! RPC response types.

use serde::{Deserialize, Serialize};
use tsscore_types::SessionSummary;

/// Answer of `tss_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Local account
    pub account: String,
    /// Compressed public key of the request signing key (hex)
    pub pub_key: String,
    /// Live sessions, ordered by type
    pub sessions: Vec<SessionSummary>,
}
