use std::path::PathBuf;
use std::time::Instant;

use indexmap::{IndexMap, IndexSet};
use tracing::info;

use weft_ir::automaton::RuleAutomaton;
use weft_ir::connector::{Connector, Reference};
use weft_ir::monitor::Monitor;
use weft_ir::port::Port;
use weft_ir::term::Var;
use weft_ir::value::{Binding, Language, Value};

use crate::command::{commandify, Transition};
use crate::component::{AtomicComponent, Component, ComponentList, ProtocolComponent};
use crate::partition::{partition, resolve_memory};

/// Qualified names of the boundary window implementations.
const PRODUCER_WINDOW: &str = "io::producer";
const CONSUMER_WINDOW: &str = "io::consumer";

/// A compilation unit: a named connector with resolved ports and references,
/// as produced by the upstream interpretation and binding subsystems.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub source: Option<PathBuf>,
    pub connector: Connector,
}

impl Program {
    pub fn new(name: impl Into<String>, connector: Connector) -> Self {
        Program {
            name: name.into(),
            source: None,
            connector,
        }
    }

    pub fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }
}

/// Knobs of the synthesis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// Add window components for every visible boundary port, so a program
    /// without external components still has an observable interface.
    pub port_windows: bool,
    /// Rename every boundary port to a fresh `_k` hidden name before
    /// normalization. Keeps generated names clash-free at the cost of
    /// readable protocol interfaces.
    pub internalize_boundary: bool,
    /// Decompose the command set into synchronous regions instead of
    /// emitting a single protocol component.
    pub partitioning: bool,
    /// Target language used when rendering parameter literals.
    pub language: Language,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        SynthesisOptions {
            port_windows: true,
            internalize_boundary: false,
            partitioning: false,
            language: Language::Rust,
        }
    }
}

/// Run the connector-to-protocol synthesis pipeline.
///
/// Stage-local problems are reported to the monitor and synthesis continues
/// where safe, so one run surfaces as many independent errors as possible.
/// `None` is returned only for genuinely blocking conditions, with the
/// diagnostics already recorded; callers render the monitor once, at the end.
pub fn synthesize(
    program: &Program,
    options: &SynthesisOptions,
    monitor: &mut Monitor,
) -> Option<ComponentList> {
    let started = Instant::now();

    let mut members: Vec<Connector> = vec![program.connector.clone()];
    if options.port_windows {
        for p in program.connector.interface() {
            if p.is_hidden() {
                continue;
            }
            members.push(port_window(&p, options.language));
        }
    }
    let mut connector = Connector::composite(None, members);

    if options.internalize_boundary {
        let mut map: IndexMap<Port, Port> = IndexMap::new();
        for (i, p) in program.connector.interface().iter().enumerate() {
            map.insert(p.clone(), p.rename(format!("_{}", i + 1)).hide());
        }
        connector = connector.rename(&map);
    }

    let stage = Instant::now();
    let connector = connector
        .propagate(monitor)
        .flatten()
        .insert_nodes(true, false, RuleAutomaton::node, monitor);
    let atoms = connector.integrate(monitor);
    info!(
        elapsed_ms = stage.elapsed().as_millis() as u64,
        atoms = atoms.len(),
        "normalization"
    );

    if atoms.is_empty() {
        monitor.error("connector has no atoms; nothing to compile");
        return None;
    }

    let mut components: Vec<Component> = Vec::new();
    let mut protocol_interface: IndexSet<Port> = IndexSet::new();
    let mut automata: Vec<RuleAutomaton> = Vec::new();
    let mut atom_counter = 1;

    for atom in &atoms {
        let foreign = atom.automaton.foreign_ports();
        if !foreign.is_empty() {
            let names: Vec<&str> = foreign.iter().map(Port::name).collect();
            monitor.error(format!(
                "atom '{}' references ports outside its interface: {}",
                atom.name.as_deref().unwrap_or("<atom>"),
                names.join(", ")
            ));
            continue;
        }
        match &atom.reference {
            Some(reference) => {
                protocol_interface.extend(atom.automaton.interface().iter().cloned());
                let base = atom.name.as_deref().unwrap_or("Component");
                let mut parameters = Vec::new();
                for binding in &reference.bindings {
                    match binding {
                        Binding::Bound(value) => {
                            parameters.push(value.literal(options.language));
                        }
                        Binding::Deferred(name) => {
                            monitor.warning(format!(
                                "parameter '{name}' has no compile-time value, \
                                 expect runtime binding"
                            ));
                            parameters.push(name.clone());
                        }
                    }
                }
                components.push(Component::Atomic(AtomicComponent {
                    name: format!("{base}{atom_counter}"),
                    parameters,
                    interface: atom.automaton.interface().clone(),
                    reference: reference.clone(),
                }));
                atom_counter += 1;
            }
            None => automata.push(atom.automaton.clone()),
        }
    }

    let stage = Instant::now();
    let circuit = RuleAutomaton::compose(automata);
    info!(
        elapsed_ms = stage.elapsed().as_millis() as u64,
        rules = circuit.rules().len(),
        "composition"
    );

    let stage = Instant::now();
    let mut transitions: IndexSet<Transition> = IndexSet::new();
    for rule in circuit.rules() {
        let mut formula = rule.formula().clone();
        for p in rule.free_ports() {
            if !protocol_interface.contains(&p) {
                formula = formula.hide(&Var::port(p));
            }
        }
        match commandify(&formula) {
            Ok(mut transition) => {
                for p in rule.firing() {
                    if protocol_interface.contains(p) {
                        transition.interface.insert(p.clone());
                    }
                }
                transitions.insert(transition);
            }
            Err(e) => monitor.error(format!("rule '{rule}' dropped: {e}")),
        }
    }
    info!(
        elapsed_ms = stage.elapsed().as_millis() as u64,
        transitions = transitions.len(),
        "commandify"
    );

    let parts = partition(&transitions, options.partitioning);
    let mut protocol_counter = 1;
    for part in parts {
        if part.is_empty() {
            continue;
        }
        let initial = match resolve_memory(&part) {
            Ok(initial) => initial,
            Err(e) => {
                monitor.error(format!("protocol part dropped: {e}"));
                continue;
            }
        };
        let mut interface: IndexSet<Port> = IndexSet::new();
        for t in &part {
            interface.extend(t.interface.iter().cloned());
        }
        components.push(Component::Protocol(ProtocolComponent {
            name: format!("Protocol{protocol_counter}"),
            interface,
            transitions: part,
            initial,
        }));
        protocol_counter += 1;
    }

    if components.is_empty() {
        monitor.error("synthesis produced no components");
        return None;
    }

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        components = components.len(),
        "synthesis finished"
    );
    Some(ComponentList {
        program: program.name.clone(),
        source: program.source.clone(),
        components,
    })
}

/// An externally implemented window observing one boundary port. The window
/// side of the port is reversed (the program's input is produced into) and
/// hidden; its automaton is the single-port default, firing freely.
fn port_window(boundary: &Port, language: Language) -> Connector {
    let call = if boundary.is_input() {
        PRODUCER_WINDOW
    } else {
        CONSUMER_WINDOW
    };
    let window_port = boundary.reversed().hide();
    let interface: IndexSet<Port> = [window_port].into_iter().collect();
    let automaton = RuleAutomaton::node(&interface);
    let reference = Reference::new(
        call,
        language,
        vec![Binding::Bound(Value::String(boundary.name().to_string()))],
    );
    Connector::atom(Some("PortWindow".to_string()), automaton, Some(reference))
}
