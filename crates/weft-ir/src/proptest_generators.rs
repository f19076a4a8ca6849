//! Proptest strategies for generating well-formed `RuleAutomaton` instances.

use indexmap::IndexSet;
use proptest::prelude::*;

use crate::automaton::{Rule, RuleAutomaton};
use crate::formula::Formula;
use crate::port::Port;
use crate::term::Term;
use crate::value::Value;

/// The shared port universe: two inputs, two outputs. Automata drawn from the
/// same universe overlap on port names, so composition exercises joint
/// firing, interleaving, and blocking.
fn universe() -> Vec<Port> {
    vec![
        Port::input("a"),
        Port::input("b"),
        Port::output("c"),
        Port::output("d"),
    ]
}

/// Strategy for a well-formed automaton over the shared universe.
///
/// Generated automata have:
/// - a nonempty interface drawn from the universe
/// - 1–3 rules, each firing a nonempty subset of the interface
/// - a simple equational data constraint anchored on a fired port
pub fn arb_automaton() -> impl Strategy<Value = RuleAutomaton> {
    (
        1u8..16,
        proptest::collection::vec((1u8..16, 0..5i64), 1..4),
    )
        .prop_map(|(iface_mask, rule_specs)| {
            let universe = universe();
            let interface: IndexSet<Port> = universe
                .iter()
                .enumerate()
                .filter(|(i, _)| iface_mask & (1 << i) != 0)
                .map(|(_, p)| p.clone())
                .collect();
            let mut rules = Vec::new();
            for (fire_mask, k) in rule_specs {
                let mut firing: IndexSet<Port> = universe
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| fire_mask & (1 << i) != 0)
                    .map(|(_, p)| p.clone())
                    .filter(|p| interface.contains(p))
                    .collect();
                if firing.is_empty() {
                    firing.insert(interface.first().unwrap().clone());
                }
                let anchor = firing.first().unwrap().clone();
                let formula =
                    Formula::Eq(Term::port(anchor), Term::Const(Value::Integer(k)));
                rules.push(Rule::new(firing, formula));
            }
            RuleAutomaton::new(interface, rules)
        })
}
