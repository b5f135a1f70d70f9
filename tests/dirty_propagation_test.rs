//! Scenario 5: dirty propagation.
//!
//! After `setExpression(0, Frequency, "440")` followed by `evaluate`, every
//! note whose frequency transitively references `base.f` is recomputed
//! (its cache generation advances); a note that does not depend on it is
//! left alone.

use notegraph::{Module, VariableKind};

#[test]
fn only_transitive_dependents_of_base_frequency_are_recomputed() {
    let mut m = Module::new("0", "1", "120", "4");

    let dependent = m.add_note();
    m.set_expression(dependent, VariableKind::Frequency, "base.f * 2").unwrap();

    let independent = m.add_note();
    m.set_expression(independent, VariableKind::Frequency, "5").unwrap();

    m.evaluate();

    m.set_expression(0, VariableKind::Frequency, "440").unwrap();
    let before_independent = m.cache_generation(independent);

    m.evaluate();

    assert!(m.cache_generation(dependent) > before_independent);
    assert_eq!(
        m.cache_generation(independent),
        before_independent,
        "independent note should not be re-evaluated"
    );
}
