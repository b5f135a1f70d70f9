//! Scenario 2: sequential melody.
//!
//! Note 1: `startTime = base.t`, `duration = 1`, `frequency = base.f * 3/2`.
//! Note 2: `startTime = [1].t + [1].d`, `duration = 1`,
//! `frequency = [1].f * 5/4`. Expect note 2's start time to land at `1` and
//! its frequency to be exactly `base.f * 15/8`.

use notegraph::evaluator::SlotValue;
use notegraph::rational::Rational;
use notegraph::{Module, VariableKind};

#[test]
fn note_two_inherits_note_one_exactly() {
    let mut m = Module::new("0", "1", "120", "4");

    let n1 = m.add_note();
    m.set_expression(n1, VariableKind::StartTime, "base.t").unwrap();
    m.set_expression(n1, VariableKind::Duration, "1").unwrap();
    m.set_expression(n1, VariableKind::Frequency, "base.f * 3/2").unwrap();

    let n2 = m.add_note();
    m.set_expression(n2, VariableKind::StartTime, &format!("[{n1}].t + [{n1}].d")).unwrap();
    m.set_expression(n2, VariableKind::Duration, "1").unwrap();
    m.set_expression(n2, VariableKind::Frequency, &format!("[{n1}].f * 5/4")).unwrap();

    let results = m.evaluate();

    assert_eq!(results[&n2].start_time, SlotValue::Exact(Rational::from_integer(1)));
    assert_eq!(results[&n2].frequency, SlotValue::Exact(Rational::new(15, 8)));
}
