//! Session shape: types, phases, durations and persisted records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of session. Each kind runs its own independent chain of sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Signs batches of pending operations
    Default,
    /// Regenerates the shared key under a new party set
    Reshare,
    /// Generates the initial shared key
    Keygen,
}

impl SessionType {
    /// Ordered phases a session of this type walks through when everything succeeds.
    pub fn phases(&self) -> &'static [ControllerKind] {
        match self {
            SessionType::Default => &[
                ControllerKind::Proposal,
                ControllerKind::Acceptance,
                ControllerKind::Sign,
                ControllerKind::Finish,
            ],
            SessionType::Reshare => &[
                ControllerKind::Proposal,
                ControllerKind::Acceptance,
                ControllerKind::Reshare,
                ControllerKind::Sign,
                ControllerKind::Finish,
            ],
            SessionType::Keygen => &[ControllerKind::Keygen, ControllerKind::Finish],
        }
    }

    /// First phase of a session of this type.
    pub fn first_phase(&self) -> ControllerKind {
        self.phases()[0]
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Default => "default",
            SessionType::Reshare => "reshare",
            SessionType::Keygen => "keygen",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(SessionType::Default),
            "reshare" => Ok(SessionType::Reshare),
            "keygen" => Ok(SessionType::Keygen),
            other => Err(format!("unknown session type: {other}")),
        }
    }
}

/// Phase controller kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    /// Proposer election and proposal exchange
    Proposal,
    /// Acceptance quorum
    Acceptance,
    /// Threshold signing
    Sign,
    /// Key resharing
    Reshare,
    /// Initial key generation
    Keygen,
    /// Terminal reporting and submission
    Finish,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerKind::Proposal => "proposal",
            ControllerKind::Acceptance => "acceptance",
            ControllerKind::Sign => "sign",
            ControllerKind::Reshare => "reshare",
            ControllerKind::Keygen => "keygen",
            ControllerKind::Finish => "finish",
        };
        f.write_str(s)
    }
}

/// Phase durations in blocks, as configured on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDurations {
    /// Proposal window
    pub proposal: u64,
    /// Acceptance window
    pub acceptance: u64,
    /// Signing window
    pub sign: u64,
    /// Reshare window
    pub reshare: u64,
    /// Keygen window
    pub keygen: u64,
    /// Finish window
    pub finish: u64,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            proposal: 3,
            acceptance: 3,
            sign: 10,
            reshare: 20,
            keygen: 20,
            finish: 2,
        }
    }
}

impl PhaseDurations {
    /// Duration of a single phase.
    pub fn phase(&self, kind: ControllerKind) -> u64 {
        match kind {
            ControllerKind::Proposal => self.proposal,
            ControllerKind::Acceptance => self.acceptance,
            ControllerKind::Sign => self.sign,
            ControllerKind::Reshare => self.reshare,
            ControllerKind::Keygen => self.keygen,
            ControllerKind::Finish => self.finish,
        }
    }

    /// Total span of a session: every phase occupies `duration + 1` blocks,
    /// and the last block of the last phase is the session end.
    pub fn total(&self, session_type: SessionType) -> u64 {
        let span: u64 = session_type
            .phases()
            .iter()
            .map(|k| self.phase(*k) + 1)
            .sum();
        span.saturating_sub(1)
    }
}

/// Lifecycle of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, not yet processing
    #[default]
    Pending,
    /// A proposal was accepted and the session is working on it
    Processing,
    /// Finished with a result
    Finished,
    /// Finished without a result
    Failed,
}

/// Persisted view of a session, for introspection only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session type
    pub session_type: SessionType,
    /// Session id
    pub id: u64,
    /// Status
    pub status: SessionStatus,
    /// First block
    pub start: u64,
    /// Last block
    pub end: u64,
    /// Roster accounts
    pub parties: Vec<String>,
    /// Elected proposer
    pub proposer: Option<String>,
    /// Proposed operation ids
    pub indexes: Vec<String>,
    /// Agreed root (hex)
    pub root: Option<String>,
    /// Accounts that accepted
    pub accepted: Vec<String>,
    /// Selected signer subset
    pub signers: Vec<String>,
    /// Recorded offenders
    pub offenders: Vec<String>,
    /// Produced signature (hex)
    pub signature: Option<String>,
    /// Produced global key (hex)
    pub new_key: Option<String>,
}

impl SessionRecord {
    /// Fresh record for a session that has not started yet.
    pub fn new(session_type: SessionType, id: u64, start: u64, end: u64) -> Self {
        Self {
            session_type,
            id,
            status: SessionStatus::Pending,
            start,
            end,
            parties: Vec::new(),
            proposer: None,
            indexes: Vec::new(),
            root: None,
            accepted: Vec::new(),
            signers: Vec::new(),
            offenders: Vec::new(),
            signature: None,
            new_key: None,
        }
    }
}

/// Short summary of a live session, returned by `Info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session type
    pub session_type: SessionType,
    /// Session id
    pub id: u64,
    /// First block
    pub start: u64,
    /// Last block
    pub end: u64,
    /// Status
    pub status: SessionStatus,
    /// Current phase, if the session has started
    pub phase: Option<ControllerKind>,
}
