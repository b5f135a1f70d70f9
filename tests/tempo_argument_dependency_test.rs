//! A bare `tempo([N])`/`measure([N])` argument — with no other reference to
//! `N` anywhere in the same expression — must still register as a real
//! dependency edge and participate in evaluation order.

use notegraph::evaluator::SlotValue;
use notegraph::rational::Rational;
use notegraph::{Module, VariableKind};

#[test]
fn bare_tempo_argument_is_a_real_dependency() {
    let mut m = Module::new("0", "1", "120", "4");

    let a = m.add_note();
    let b = m.add_note();

    m.set_expression(b, VariableKind::Tempo, "180").unwrap();
    m.set_expression(a, VariableKind::Tempo, &format!("tempo([{b}])")).unwrap();

    assert!(m.transitive_dependents(b).contains(&a));

    let results = m.evaluate();
    assert_eq!(results[&a].tempo, SlotValue::Exact(Rational::from_integer(180)));

    m.set_expression(b, VariableKind::Tempo, "90").unwrap();
    let results = m.evaluate();
    assert_eq!(results[&a].tempo, SlotValue::Exact(Rational::from_integer(90)));
}
