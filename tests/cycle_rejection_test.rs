//! Scenario 3: cycle rejection.
//!
//! Setting A's start time to `[B].t` then B's to `[A].t` must fail the
//! second edit with `WouldCreateCycle` and leave B's state unchanged.

use notegraph::{EngineError, Module, VariableKind};

#[test]
fn second_edge_that_would_close_the_cycle_is_rejected() {
    let mut m = Module::new("0", "1", "120", "4");

    let a = m.add_note();
    let b = m.add_note();

    m.set_expression(a, VariableKind::StartTime, &format!("[{b}].t")).unwrap();

    let err = m.set_expression(b, VariableKind::StartTime, &format!("[{a}].t")).unwrap_err();
    assert!(matches!(err, EngineError::WouldCreateCycle { note, .. } if note == b));

    assert!(m.note(b).unwrap().start_time.is_none());
}
