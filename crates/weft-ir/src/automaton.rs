use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::formula::Formula;
use crate::port::Port;
use crate::term::{MemCell, Term};

/// One atomic step of a connector's behavior: the set of ports that fire
/// together, and the data constraint relating their observations and the
/// automaton's memory.
///
/// A port of the owning automaton's interface that is not in the firing set
/// is blocked during this step.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Rule {
    firing: IndexSet<Port>,
    formula: Formula,
}

impl Rule {
    pub fn new(firing: IndexSet<Port>, formula: Formula) -> Self {
        Rule { firing, formula }
    }

    pub fn firing(&self) -> &IndexSet<Port> {
        &self.firing
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// All ports this rule can observe: the firing set plus every free port
    /// occurrence in the formula.
    pub fn free_ports(&self) -> IndexSet<Port> {
        let mut out = self.firing.clone();
        out.extend(self.formula.free_ports());
        out
    }

    /// Memory cells with a free occurrence in the formula.
    pub fn memory_cells(&self) -> IndexSet<MemCell> {
        self.formula.free_memory_cells()
    }

    pub fn rename(&self, map: &IndexMap<Port, Port>) -> Rule {
        let firing = self
            .firing
            .iter()
            .map(|p| match map.get(p) {
                Some(target) => p.follow(target),
                None => p.clone(),
            })
            .collect();
        Rule {
            firing,
            formula: self.formula.rename_ports(map),
        }
    }

    /// Order-insensitive rendering used to compare rule sets structurally.
    pub fn canonical_key(&self) -> String {
        let mut firing: Vec<&str> = self.firing.iter().map(Port::name).collect();
        firing.sort_unstable();
        let (vars, body) = self.formula.prenex();
        let mut literals: Vec<String> =
            body.conjuncts().iter().map(|f| f.to_string()).collect();
        literals.sort_unstable();
        format!(
            "{{{}}} |{}| {}",
            firing.join(","),
            vars.len(),
            literals.join(" && ")
        )
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, p) in self.firing.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, "}} -> {}", self.formula)
    }
}

/// A rules-based symbolic automaton: a set of rules over a declared port
/// interface. The automaton owns its rules.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct RuleAutomaton {
    interface: IndexSet<Port>,
    rules: Vec<Rule>,
}

impl RuleAutomaton {
    pub fn new(interface: IndexSet<Port>, rules: Vec<Rule>) -> Self {
        RuleAutomaton { interface, rules }
    }

    /// The automaton with no ports and no rules: the identity of `compose`.
    pub fn empty() -> Self {
        RuleAutomaton {
            interface: IndexSet::new(),
            rules: Vec::new(),
        }
    }

    /// The default automaton over an interface: the identity/replication
    /// behavior of a routing node. Each input fires together with all
    /// outputs, replicating its datum; a port with no counterpart fires
    /// alone, unconstrained.
    pub fn node(ports: &IndexSet<Port>) -> Self {
        let inputs: Vec<&Port> = ports.iter().filter(|p| p.is_input()).collect();
        let outputs: Vec<&Port> = ports.iter().filter(|p| p.is_output()).collect();
        let mut rules = Vec::new();
        if inputs.is_empty() || outputs.is_empty() {
            for p in ports {
                let firing: IndexSet<Port> = IndexSet::from_iter([p.clone()]);
                rules.push(Rule::new(firing, Formula::True));
            }
        } else {
            for input in &inputs {
                let mut firing: IndexSet<Port> = IndexSet::from_iter([(*input).clone()]);
                let mut equalities = Vec::new();
                for output in &outputs {
                    firing.insert((*output).clone());
                    equalities.push(Formula::Eq(
                        Term::port((*output).clone()),
                        Term::port((*input).clone()),
                    ));
                }
                rules.push(Rule::new(firing, Formula::conj(equalities)));
            }
        }
        RuleAutomaton::new(ports.clone(), rules)
    }

    pub fn interface(&self) -> &IndexSet<Port> {
        &self.interface
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rename(&self, map: &IndexMap<Port, Port>) -> RuleAutomaton {
        let interface = self
            .interface
            .iter()
            .map(|p| match map.get(p) {
                Some(target) => p.follow(target),
                None => p.clone(),
            })
            .collect();
        let rules = self.rules.iter().map(|r| r.rename(map)).collect();
        RuleAutomaton::new(interface, rules)
    }

    /// Ports referenced by some rule but missing from the interface; a
    /// nonempty result indicates a malformed automaton.
    pub fn foreign_ports(&self) -> IndexSet<Port> {
        let mut out = IndexSet::new();
        for rule in &self.rules {
            for p in rule.free_ports() {
                if !self.interface.contains(&p) {
                    out.insert(p);
                }
            }
        }
        out
    }

    /// Synchronous product with `other`.
    ///
    /// A rule enters the product alone when its firing set does not touch the
    /// other interface (the other side idles). Two rules fire jointly when
    /// they agree on which shared ports fire; their formulas are conjoined
    /// capture-avoidingly. Memory cells are identity-based and never unify
    /// across operands.
    pub fn product(&self, other: &RuleAutomaton) -> RuleAutomaton {
        let mut interface = self.interface.clone();
        interface.extend(other.interface.iter().cloned());

        let mut rules = Vec::new();
        for r in &self.rules {
            if r.firing.iter().all(|p| !other.interface.contains(p)) {
                rules.push(r.clone());
            }
        }
        for r in &other.rules {
            if r.firing.iter().all(|p| !self.interface.contains(p)) {
                rules.push(r.clone());
            }
        }
        for r1 in &self.rules {
            let shared1: IndexSet<Port> = r1
                .firing
                .iter()
                .filter(|p| other.interface.contains(*p))
                .cloned()
                .collect();
            for r2 in &other.rules {
                let shared2: IndexSet<Port> = r2
                    .firing
                    .iter()
                    .filter(|p| self.interface.contains(*p))
                    .cloned()
                    .collect();
                if shared1 == shared2 {
                    let mut firing = r1.firing.clone();
                    firing.extend(r2.firing.iter().cloned());
                    rules.push(Rule::new(firing, r1.formula.and(&r2.formula)));
                }
            }
        }
        RuleAutomaton::new(interface, rules)
    }

    /// Fold the synchronous product over a list of automata. Associative and
    /// commutative up to rule-set equivalence; the empty automaton is the
    /// identity.
    pub fn compose<I>(automata: I) -> RuleAutomaton
    where
        I: IntoIterator<Item = RuleAutomaton>,
    {
        automata
            .into_iter()
            .fold(RuleAutomaton::empty(), |acc, a| acc.product(&a))
    }

    /// Sorted canonical keys of all rules, for structural comparison of rule
    /// sets regardless of construction order.
    pub fn canonical_form(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.rules.iter().map(Rule::canonical_key).collect();
        keys.sort_unstable();
        keys
    }
}

impl fmt::Display for RuleAutomaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rules-based automaton:")?;
        write!(f, "  interface:")?;
        for p in &self.interface {
            write!(f, " {p}")?;
        }
        writeln!(f)?;
        writeln!(f, "  rules:")?;
        for r in &self.rules {
            writeln!(f, "    {r}")?;
        }
        Ok(())
    }
}
