use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::automaton::RuleAutomaton;
use crate::monitor::Monitor;
use crate::port::Port;
use crate::value::{Binding, Language};

/// Resolved call descriptor of an externally implemented component.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Reference {
    /// Qualified name of the implementation in the target language.
    pub call: String,
    pub language: Language,
    /// Ordered parameter bindings, already evaluated by the binding
    /// subsystem.
    pub bindings: Vec<Binding>,
}

impl Reference {
    pub fn new(call: impl Into<String>, language: Language, bindings: Vec<Binding>) -> Self {
        Reference {
            call: call.into(),
            language,
            bindings,
        }
    }
}

/// An atomic connector: an automaton plus optional source-code call metadata.
/// No reference means a pure protocol atom whose behavior is synthesized; a
/// reference means the atom is implemented externally and stays opaque.
///
/// `links` maps each automaton port to its externally visible port. Renaming
/// rewrites the link targets; the automaton's own port names are only
/// rewritten once, by `integrate`.
#[derive(Debug, Clone)]
pub struct AtomConnector {
    pub name: Option<String>,
    pub automaton: RuleAutomaton,
    pub reference: Option<Reference>,
    links: IndexMap<Port, Port>,
}

impl AtomConnector {
    pub fn new(
        name: Option<String>,
        automaton: RuleAutomaton,
        reference: Option<Reference>,
    ) -> Self {
        let links = identity_links(automaton.interface().iter());
        AtomConnector {
            name,
            automaton,
            reference,
            links,
        }
    }

    pub fn links(&self) -> &IndexMap<Port, Port> {
        &self.links
    }

    /// Compose a rename map onto this atom's links (map applied last).
    pub fn rename_map(&self, map: &IndexMap<Port, Port>) -> AtomConnector {
        let links = self
            .links
            .iter()
            .map(|(k, v)| {
                let target = match map.get(v) {
                    Some(t) => v.follow(t),
                    None => v.clone(),
                };
                (k.clone(), target)
            })
            .collect();
        AtomConnector {
            name: self.name.clone(),
            automaton: self.automaton.clone(),
            reference: self.reference.clone(),
            links,
        }
    }

    /// Push the accumulated rename map into the automaton, yielding an atom
    /// whose port names are final and whose links are the identity.
    pub fn integrated(&self) -> AtomConnector {
        let automaton = self.automaton.rename(&self.links);
        AtomConnector::new(self.name.clone(), automaton, self.reference.clone())
    }
}

/// A composite connector: child connectors joined by a rename map that
/// unifies and hides ports across them.
#[derive(Debug, Clone)]
pub struct CompositeConnector {
    pub name: Option<String>,
    children: Vec<Connector>,
    links: IndexMap<Port, Port>,
    /// Rename entries that matched no port, kept for `propagate` to report.
    unresolved: Vec<String>,
}

impl CompositeConnector {
    pub fn new(name: Option<String>, children: Vec<Connector>) -> Self {
        let links = identity_links(children.iter().flat_map(|c| c.interface()));
        CompositeConnector {
            name,
            children,
            links,
            unresolved: Vec::new(),
        }
    }

    pub fn children(&self) -> &[Connector] {
        &self.children
    }
}

fn identity_links<I, P>(ports: I) -> IndexMap<Port, Port>
where
    I: IntoIterator<Item = P>,
    P: std::borrow::Borrow<Port>,
{
    let mut links = IndexMap::new();
    for p in ports {
        let p = p.borrow().clone();
        links.insert(p.clone(), p);
    }
    links
}

/// A hierarchical connector: an atom, or a composite of child connectors.
///
/// The tree is persistent: every transformation returns a new connector and
/// never mutates the receiver, so a subtree shared by multiple parents cannot
/// be corrupted through aliasing. Normalization runs
/// `propagate → flatten → insert_nodes → integrate`, after which the flat
/// atom list is consumed exactly once by the composer.
#[derive(Debug, Clone)]
pub enum Connector {
    Atom(AtomConnector),
    Composite(CompositeConnector),
}

impl Connector {
    pub fn atom(
        name: Option<String>,
        automaton: RuleAutomaton,
        reference: Option<Reference>,
    ) -> Self {
        Connector::Atom(AtomConnector::new(name, automaton, reference))
    }

    pub fn composite(name: Option<String>, children: Vec<Connector>) -> Self {
        Connector::Composite(CompositeConnector::new(name, children))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Connector::Atom(a) => a.name.as_deref(),
            Connector::Composite(c) => c.name.as_deref(),
        }
    }

    pub fn links(&self) -> &IndexMap<Port, Port> {
        match self {
            Connector::Atom(a) => &a.links,
            Connector::Composite(c) => &c.links,
        }
    }

    /// Externally visible ports (including hidden ones, which remain part of
    /// the structure until synthesis eliminates them).
    pub fn interface(&self) -> IndexSet<Port> {
        self.links().values().cloned().collect()
    }

    /// Apply a rename map to the externally visible ports. Entries matching
    /// no current port are remembered and reported by `propagate`.
    pub fn rename(&self, map: &IndexMap<Port, Port>) -> Connector {
        match self {
            Connector::Atom(a) => Connector::Atom(a.rename_map(map)),
            Connector::Composite(c) => {
                let current: IndexSet<&Port> = c.links.values().collect();
                let mut unresolved = c.unresolved.clone();
                for key in map.keys() {
                    if !current.contains(key) {
                        unresolved.push(key.name().to_string());
                    }
                }
                let links = c
                    .links
                    .iter()
                    .map(|(k, v)| {
                        let target = match map.get(v) {
                            Some(t) => v.follow(t),
                            None => v.clone(),
                        };
                        (k.clone(), target)
                    })
                    .collect();
                Connector::Composite(CompositeConnector {
                    name: c.name.clone(),
                    children: c.children.clone(),
                    links,
                    unresolved,
                })
            }
        }
    }

    /// Push rename/hide maps down through composite boundaries so that leaf
    /// atoms carry fully resolved port identities. Unresolved renames are
    /// reported to the monitor; propagation continues.
    pub fn propagate(&self, monitor: &mut Monitor) -> Connector {
        match self {
            Connector::Atom(_) => self.clone(),
            Connector::Composite(c) => {
                for name in &c.unresolved {
                    monitor.warning(format!(
                        "rename of '{}' does not match any port of '{}'",
                        name,
                        c.name.as_deref().unwrap_or("<anonymous>")
                    ));
                }
                let children: Vec<Connector> = c
                    .children
                    .iter()
                    .map(|ch| ch.rename(&c.links).propagate(monitor))
                    .collect();
                Connector::Composite(CompositeConnector::new(c.name.clone(), children))
            }
        }
    }

    /// Collapse nested composites into one composite whose children are all
    /// atoms. Rename maps merge by composition: child maps apply first, then
    /// the parent map.
    pub fn flatten(&self) -> Connector {
        match self {
            Connector::Atom(a) => Connector::Composite(CompositeConnector::new(
                None,
                vec![Connector::Atom(a.clone())],
            )),
            Connector::Composite(c) => {
                let mut atoms: Vec<Connector> = Vec::new();
                for child in &c.children {
                    match child.flatten() {
                        Connector::Composite(inner) => {
                            for grandchild in inner.children {
                                if let Connector::Atom(a) = grandchild {
                                    let merged = a.rename_map(&c.links);
                                    debug_assert!(
                                        injective(merged.links()),
                                        "rename merge produced a name collision"
                                    );
                                    atoms.push(Connector::Atom(merged));
                                }
                            }
                        }
                        Connector::Atom(a) => atoms.push(Connector::Atom(a.rename_map(&c.links))),
                    }
                }
                Connector::Composite(CompositeConnector::new(c.name.clone(), atoms))
            }
        }
    }

    /// Insert explicit routing nodes wherever a port name is shared in a way
    /// that needs merging or replication, so that afterwards every port has
    /// exactly one producer-declared and one consumer-declared end.
    ///
    /// A point-to-point link (one producer, one consumer) already satisfies
    /// that postcondition and is left untouched, preserving user-facing
    /// names. `merge_inputs` permits multi-producer fan-in, `merge_outputs`
    /// permits multi-consumer fan-out; a disabled case is an ERROR for that
    /// port and the port is left as it was.
    pub fn insert_nodes<F>(
        &self,
        merge_inputs: bool,
        merge_outputs: bool,
        factory: F,
        monitor: &mut Monitor,
    ) -> Connector
    where
        F: Fn(&IndexSet<Port>) -> RuleAutomaton,
    {
        let flat = match self.flatten() {
            Connector::Composite(c) => c,
            Connector::Atom(_) => unreachable!("flatten always yields a composite"),
        };
        let mut atoms: Vec<AtomConnector> = flat
            .children
            .into_iter()
            .filter_map(|c| match c {
                Connector::Atom(a) => Some(a),
                Connector::Composite(_) => None,
            })
            .collect();

        let mut occurrences: IndexMap<String, Vec<(usize, Port)>> = IndexMap::new();
        for (idx, atom) in atoms.iter().enumerate() {
            for ext in atom.links.values() {
                occurrences
                    .entry(ext.name().to_string())
                    .or_default()
                    .push((idx, ext.clone()));
            }
        }

        let mut renames: Vec<IndexMap<Port, Port>> = vec![IndexMap::new(); atoms.len()];
        let mut nodes: Vec<AtomConnector> = Vec::new();

        for (name, occ) in &occurrences {
            if occ.len() < 2 {
                continue;
            }
            let producers = occ.iter().filter(|(_, p)| p.is_output()).count();
            let consumers = occ.iter().filter(|(_, p)| p.is_input()).count();
            if producers <= 1 && consumers <= 1 {
                continue;
            }
            if producers > 1 && !merge_inputs {
                monitor.error(format!(
                    "port '{name}' has {producers} producers but merging is disabled"
                ));
                continue;
            }
            if consumers > 1 && !merge_outputs {
                monitor.error(format!(
                    "port '{name}' has {consumers} consumers but replication is disabled"
                ));
                continue;
            }
            let mut node_ports: IndexSet<Port> = IndexSet::new();
            for (k, (idx, ext)) in occ.iter().enumerate() {
                let alias = format!("{name}.{}", k + 1);
                renames[*idx].insert(ext.clone(), ext.rename(&alias).hide());
                node_ports.insert(ext.reversed().rename(alias).hide());
            }
            nodes.push(AtomConnector::new(
                Some(format!("node_{name}")),
                factory(&node_ports),
                None,
            ));
        }

        for (idx, map) in renames.into_iter().enumerate() {
            if !map.is_empty() {
                atoms[idx] = atoms[idx].rename_map(&map);
            }
        }
        atoms.extend(nodes);
        Connector::Composite(CompositeConnector::new(
            flat.name,
            atoms.into_iter().map(Connector::Atom).collect(),
        ))
    }

    /// Finalize normalization: push each atom's accumulated rename map into
    /// its automaton and return the flat atom list. An atom whose merged map
    /// is not injective (two ports collapsed onto one name) is reported and
    /// skipped so further errors can still surface.
    pub fn integrate(&self, monitor: &mut Monitor) -> Vec<AtomConnector> {
        let mut out = Vec::new();
        for atom in self.atoms() {
            if !injective(atom.links()) {
                monitor.error(format!(
                    "duplicate port name after merging renames in '{}'",
                    atom.name.as_deref().unwrap_or("<atom>")
                ));
                continue;
            }
            out.push(atom.integrated());
        }
        out
    }

    /// All atom leaves, in traversal order.
    pub fn atoms(&self) -> Vec<&AtomConnector> {
        match self {
            Connector::Atom(a) => vec![a],
            Connector::Composite(c) => c.children.iter().flat_map(|ch| ch.atoms()).collect(),
        }
    }
}

fn injective(links: &IndexMap<Port, Port>) -> bool {
    let mut seen: IndexSet<&str> = IndexSet::new();
    links.values().all(|v| seen.insert(v.name()))
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn go(c: &Connector, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let pad = "  ".repeat(depth);
            match c {
                Connector::Atom(a) => {
                    write!(f, "{pad}atom")?;
                    if let Some(name) = &a.name {
                        write!(f, " {name}")?;
                    }
                    write!(f, " [")?;
                    for (i, p) in a.links.values().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{p}")?;
                    }
                    writeln!(f, "]")
                }
                Connector::Composite(comp) => {
                    write!(f, "{pad}composite")?;
                    if let Some(name) = &comp.name {
                        write!(f, " {name}")?;
                    }
                    writeln!(f)?;
                    for ch in &comp.children {
                        go(ch, depth + 1, f)?;
                    }
                    Ok(())
                }
            }
        }
        go(self, 0, f)
    }
}
