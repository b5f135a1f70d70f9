//! Scenario 1: 12-TET chromatic scale.
//!
//! Base note frequency `1/1`; twelve notes at `base.f * 2^(k/12)` for
//! `k = 1..=12`. Note 12 is exact (`2^(12/12) == 2`); notes 1..11 are
//! flagged corrupt in the frequency slot.

use notegraph::evaluator::SlotValue;
use notegraph::rational::Rational;
use notegraph::{Module, VariableKind};

#[test]
fn twelfth_note_is_exact_octave_others_are_corrupt() {
    let mut m = Module::new("0", "1", "120", "4");

    for k in 1..=12 {
        let id = m.add_note();
        m.set_expression(id, VariableKind::Frequency, &format!("base.f * 2^({}/12)", k))
            .unwrap();
    }

    let results = m.evaluate();

    let note12 = &results[&12];
    assert_eq!(note12.frequency, SlotValue::Exact(Rational::from_integer(2)));
    assert_eq!(note12.corruption & VariableKind::Frequency.corruption_bit(), 0);

    for k in 1..12u32 {
        let note = &results[&k];
        assert_ne!(
            note.corruption & VariableKind::Frequency.corruption_bit(),
            0,
            "note {k} should be flagged corrupt"
        );
        assert!(note.frequency.is_corrupted());
    }
}
