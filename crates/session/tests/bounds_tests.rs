//! Integration tests for phase windows.

use tsscore_session::{Bounds, BoundsManager};
use tsscore_types::{ControllerKind, PhaseDurations, SessionType};

fn durations() -> PhaseDurations {
    PhaseDurations {
        proposal: 2,
        acceptance: 2,
        sign: 5,
        reshare: 7,
        keygen: 9,
        finish: 1,
    }
}

#[test]
fn test_default_session_layout() {
    let bounds = BoundsManager::new(100, durations(), SessionType::Default);
    assert_eq!(bounds.session_start(), 100);
    assert_eq!(bounds.session_end(), 113);

    assert_eq!(
        bounds.next_controller(ControllerKind::Proposal),
        Bounds { start: 100, end: 102 }
    );
    assert_eq!(
        bounds.next_controller(ControllerKind::Acceptance),
        Bounds { start: 103, end: 105 }
    );
    assert_eq!(
        bounds.next_controller(ControllerKind::Sign),
        Bounds { start: 106, end: 111 }
    );
    assert_eq!(
        bounds.next_controller(ControllerKind::Finish),
        Bounds { start: 112, end: 113 }
    );
}

#[test]
fn test_finish_extends_to_session_end() {
    let bounds = BoundsManager::new(0, durations(), SessionType::Default);
    bounds.next_controller(ControllerKind::Proposal);
    let finish = bounds.next_controller(ControllerKind::Finish);
    assert_eq!(finish, Bounds { start: 3, end: 13 });
}

#[test]
fn test_reshare_and_keygen_totals() {
    let reshare = BoundsManager::new(10, durations(), SessionType::Reshare);
    assert_eq!(reshare.session_end(), 10 + 21);

    let keygen = BoundsManager::new(10, durations(), SessionType::Keygen);
    assert_eq!(
        keygen.next_controller(ControllerKind::Keygen),
        Bounds { start: 10, end: 19 }
    );
    assert_eq!(
        keygen.next_controller(ControllerKind::Finish),
        Bounds { start: 20, end: 21 }
    );
    assert_eq!(keygen.session_end(), 21);
}

#[test]
fn test_current_and_history() {
    let bounds = BoundsManager::new(5, durations(), SessionType::Default);
    assert!(bounds.current().is_none());
    bounds.next_controller(ControllerKind::Proposal);
    bounds.next_controller(ControllerKind::Acceptance);
    assert_eq!(bounds.current(), Some(Bounds { start: 8, end: 10 }));
    let all = bounds.all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].0, ControllerKind::Proposal);
}

#[test]
fn test_elapsed() {
    let b = Bounds { start: 3, end: 6 };
    assert!(!b.elapsed(5));
    assert!(b.elapsed(6));
    assert!(b.elapsed(7));
}
