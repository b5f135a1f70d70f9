//! Scenario 4: measure chain.
//!
//! `m2.t = m1.t + measure(m1)`, `m3.t = m2.t + measure(m2)` form a chain;
//! `m4.t = base.t + 4*beat(base)` is an anchor and must not be swept into
//! m1's chain.

use notegraph::{Module, VariableKind};

#[test]
fn anchor_measure_is_excluded_from_chain_link_walk() {
    let mut m = Module::new("0", "1", "120", "4");

    let m1 = m.add_note();
    m.set_expression(m1, VariableKind::StartTime, "base.t").unwrap();

    let m2 = m.add_note();
    m.set_expression(m2, VariableKind::StartTime, &format!("[{m1}].t + measure([{m1}])")).unwrap();

    let m3 = m.add_note();
    m.set_expression(m3, VariableKind::StartTime, &format!("[{m2}].t + measure([{m2}])")).unwrap();

    let m4 = m.add_note();
    m.set_expression(m4, VariableKind::StartTime, "base.t + 4 * beat(base)").unwrap();

    m.evaluate();

    let chain = m.measure_chain(m2);
    assert_eq!(chain, vec![m1, m2, m3]);
    assert!(!chain.contains(&m4));
}
