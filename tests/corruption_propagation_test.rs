//! Scenario 6: corruption propagation.
//!
//! `A.frequency = base.f * 2^(7/12)` is corrupt; `B.frequency = [A].f * 2`
//! inherits the corruption, while `B.startTime` (unrelated to `A.frequency`)
//! stays exact.

use notegraph::{Module, VariableKind};

#[test]
fn corruption_propagates_through_referencing_slot_only() {
    let mut m = Module::new("0", "1", "120", "4");

    let a = m.add_note();
    m.set_expression(a, VariableKind::Frequency, "base.f * 2^(7/12)").unwrap();

    let b = m.add_note();
    m.set_expression(b, VariableKind::Frequency, &format!("[{a}].f * 2")).unwrap();
    m.set_expression(b, VariableKind::StartTime, "base.t").unwrap();

    let results = m.evaluate();

    assert_ne!(results[&b].corruption & VariableKind::Frequency.corruption_bit(), 0);
    assert_eq!(results[&b].corruption & VariableKind::StartTime.corruption_bit(), 0);
}
