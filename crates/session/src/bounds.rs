//! Phase block windows.
//!
//! Every phase occupies `duration + 1` blocks. A phase starts one block after
//! the previous phase ended; the first phase starts at the session start. The
//! `Finish` phase always ends at the session end, which also covers sessions
//! that skip straight to `Finish` from an early phase.

use parking_lot::Mutex;
use tsscore_types::{ControllerKind, PhaseDurations, SessionType};

/// Inclusive block window of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    /// First block
    pub start: u64,
    /// Last block
    pub end: u64,
}

impl Bounds {
    /// Whether `height` is past this window's last block or on it.
    pub fn elapsed(&self, height: u64) -> bool {
        height >= self.end
    }
}

/// Tracks the windows of the phases a session has started.
#[derive(Debug)]
pub struct BoundsManager {
    session_start: u64,
    session_end: u64,
    durations: PhaseDurations,
    phases: Mutex<Vec<(ControllerKind, Bounds)>>,
}

impl BoundsManager {
    /// Windows for a session of `session_type` starting at `session_start`.
    pub fn new(session_start: u64, durations: PhaseDurations, session_type: SessionType) -> Self {
        Self {
            session_start,
            session_end: session_start + durations.total(session_type),
            durations,
            phases: Mutex::new(Vec::new()),
        }
    }

    /// First block of the session.
    pub fn session_start(&self) -> u64 {
        self.session_start
    }

    /// Last block of the session.
    pub fn session_end(&self) -> u64 {
        self.session_end
    }

    /// Register the next phase and return its window.
    pub fn next_controller(&self, kind: ControllerKind) -> Bounds {
        let mut phases = self.phases.lock();
        let start = match phases.last() {
            Some((_, prev)) => prev.end + 1,
            None => self.session_start,
        };
        let end = if kind == ControllerKind::Finish {
            self.session_end
        } else {
            start + self.durations.phase(kind)
        };
        let bounds = Bounds { start, end };
        phases.push((kind, bounds));
        bounds
    }

    /// Window of the most recently registered phase.
    pub fn current(&self) -> Option<Bounds> {
        self.phases.lock().last().map(|(_, b)| *b)
    }

    /// All registered phases in order.
    pub fn all(&self) -> Vec<(ControllerKind, Bounds)> {
        self.phases.lock().clone()
    }
}
