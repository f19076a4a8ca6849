use indexmap::IndexSet;

use weft_engine::pipeline::{synthesize, Program, SynthesisOptions};
use weft_ir::automaton::{Rule, RuleAutomaton};
use weft_ir::connector::{Connector, Reference};
use weft_ir::formula::Formula;
use weft_ir::monitor::Monitor;
use weft_ir::port::{Port, TypeTag};
use weft_ir::term::{MemCell, Term, Var};
use weft_ir::value::{Binding, Language, Value};

fn ports(set: &[Port]) -> IndexSet<Port> {
    set.iter().cloned().collect()
}

/// A one-place buffer: `A? -> x' = A` when empty, `x? -> B! = x, x' = *`
/// when full.
fn fifo_connector() -> Connector {
    let a = Port::input("A").with_tag(TypeTag::new("T"));
    let b = Port::output("B").with_tag(TypeTag::new("T"));
    let x = MemCell::fresh("x", Some(TypeTag::new("T")));
    let fill = Rule::new(
        ports(&[a.clone()]),
        Formula::conj(vec![
            Formula::Eq(Term::mem(x.clone()), Term::Null),
            Formula::Eq(Term::mem_next(x.clone()), Term::port(a.clone())),
        ]),
    );
    let drain = Rule::new(
        ports(&[b.clone()]),
        Formula::conj(vec![
            Formula::Neq(Term::mem(x.clone()), Term::Null),
            Formula::Eq(Term::port(b.clone()), Term::mem(x.clone())),
            Formula::Eq(Term::mem_next(x.clone()), Term::Null),
        ]),
    );
    Connector::atom(
        Some("fifo".into()),
        RuleAutomaton::new(ports(&[a, b]), vec![fill, drain]),
        None,
    )
}

fn sync_channel(input: &str, output: &str) -> RuleAutomaton {
    let a = Port::input(input);
    let b = Port::output(output);
    let rule = Rule::new(
        ports(&[a.clone(), b.clone()]),
        Formula::Eq(Term::port(b.clone()), Term::port(a.clone())),
    );
    RuleAutomaton::new(ports(&[a, b]), vec![rule])
}

/// An externally implemented endpoint observing the given ports.
fn external(name: &str, call: &str, interface: &[Port], bindings: Vec<Binding>) -> Connector {
    let iface = ports(interface);
    Connector::atom(
        Some(name.into()),
        RuleAutomaton::node(&iface),
        Some(Reference::new(call, Language::Rust, bindings)),
    )
}

#[test]
fn fifo_synthesizes_one_protocol_with_two_transitions() {
    let program = Program::new("fifo_buffer", fifo_connector());
    let mut monitor = Monitor::new();
    let list = synthesize(&program, &SynthesisOptions::default(), &mut monitor)
        .expect("fifo compiles");
    assert!(!monitor.has_errors(), "diagnostics: {}", monitor.render());

    let protocols: Vec<_> = list.protocols().collect();
    assert_eq!(protocols.len(), 1);
    let protocol = protocols[0];
    assert_eq!(protocol.transitions.len(), 2);
    assert!(protocol.interface.contains(&Port::input("A")));
    assert!(protocol.interface.contains(&Port::output("B")));
    assert_eq!(protocol.interface.len(), 2);

    // initial memory: the single cell, typed, undefined
    assert_eq!(protocol.initial.len(), 1);
    let (cell, value) = protocol.initial.iter().next().expect("one cell");
    assert_eq!(cell.name(), "x");
    assert_eq!(cell.tag(), Some(&TypeTag::new("T")));
    assert!(value.is_none());

    // one transition fills the buffer from A, the other drains it into B
    let fill = protocol
        .transitions
        .iter()
        .find(|t| t.output.is_empty())
        .expect("fill transition");
    assert_eq!(fill.memory.len(), 1);
    assert!(fill.interface.contains(&Port::input("A")));
    let drain = protocol
        .transitions
        .iter()
        .find(|t| !t.output.is_empty())
        .expect("drain transition");
    assert!(drain.interface.contains(&Port::output("B")));
    assert_eq!(drain.memory.values().next(), Some(&Term::Null));

    // two boundary windows wrap the visible ports
    assert_eq!(list.atomics().count(), 2);
}

#[test]
fn composed_sync_channels_synchronize_through_the_chain() {
    // producer -> a -> sync -> b -> sync -> c -> consumer
    let producer = external("Producer", "demo::producer", &[Port::output("a")], vec![]);
    let consumer = external("Consumer", "demo::consumer", &[Port::input("c")], vec![]);
    let ch1 = Connector::atom(Some("sync1".into()), sync_channel("a", "b"), None);
    let ch2 = Connector::atom(Some("sync2".into()), sync_channel("b", "c"), None);
    let connector = Connector::composite(None, vec![producer, ch1, ch2, consumer]);

    let program = Program::new("pipe", connector);
    let options = SynthesisOptions {
        port_windows: false,
        ..SynthesisOptions::default()
    };
    let mut monitor = Monitor::new();
    let list = synthesize(&program, &options, &mut monitor).expect("pipe compiles");
    assert!(!monitor.has_errors(), "diagnostics: {}", monitor.render());

    let protocol = list.protocols().next().expect("protocol component");
    // a single end-to-end step: both channels fire jointly on the shared port
    assert_eq!(protocol.transitions.len(), 1);
    let step = protocol.transitions.iter().next().expect("one step");
    assert!(step.interface.contains(&Port::input("a")));
    assert!(step.interface.contains(&Port::output("c")));
    assert_eq!(step.output.get(&Port::output("c")), Some(&Term::port(Port::input("a"))));
    assert_eq!(list.atomics().count(), 2);
}

#[test]
fn malformed_hidden_memory_is_reported_and_skipped() {
    let a = Port::input("A");
    let m = MemCell::fresh("m", None);
    let broken = Rule::new(
        IndexSet::new(),
        Formula::Exists(
            Var::mem(m.clone()),
            Box::new(Formula::Neq(Term::mem(m), Term::Null)),
        ),
    );
    let fine = Rule::new(ports(&[a.clone()]), Formula::True);
    let connector = Connector::atom(
        Some("broken".into()),
        RuleAutomaton::new(ports(&[a]), vec![broken, fine]),
        None,
    );

    let program = Program::new("broken", connector);
    let mut monitor = Monitor::new();
    let list =
        synthesize(&program, &SynthesisOptions::default(), &mut monitor).expect("still compiles");

    assert!(monitor.has_errors());
    assert!(monitor.render().contains("no defining equality"));
    let protocol = list.protocols().next().expect("protocol survives");
    assert_eq!(protocol.transitions.len(), 1, "broken transition omitted");
}

#[test]
fn deferred_parameter_warns_but_succeeds() {
    let a = Port::output("a");
    let producer = external(
        "Producer",
        "demo::producer",
        &[a.clone()],
        vec![
            Binding::Bound(Value::Bool(true)),
            Binding::Deferred("rate".into()),
        ],
    );
    let sink = external("Sink", "demo::consumer", &[Port::input("b")], vec![]);
    let channel = Connector::atom(Some("sync".into()), sync_channel("a", "b"), None);
    let connector = Connector::composite(None, vec![producer, channel, sink]);

    let program = Program::new("deferred", connector);
    let options = SynthesisOptions {
        port_windows: false,
        ..SynthesisOptions::default()
    };
    let mut monitor = Monitor::new();
    let list = synthesize(&program, &options, &mut monitor).expect("compiles with warning");

    assert!(!monitor.has_errors(), "warnings only: {}", monitor.render());
    assert!(monitor.render().contains("expect runtime binding"));
    let atomic = list
        .atomics()
        .find(|a| a.reference.call == "demo::producer")
        .expect("producer component");
    assert_eq!(atomic.parameters, vec!["true".to_string(), "rate".to_string()]);
}

#[test]
fn bound_parameters_render_as_target_literals() {
    let a = Port::output("a");
    let producer = external(
        "Producer",
        "demo::producer",
        &[a.clone()],
        vec![
            Binding::Bound(Value::String("feed".into())),
            Binding::Bound(Value::Decimal(0.5)),
        ],
    );
    let sink = external("Sink", "demo::consumer", &[Port::input("b")], vec![]);
    let channel = Connector::atom(Some("sync".into()), sync_channel("a", "b"), None);
    let program = Program::new(
        "literals",
        Connector::composite(None, vec![producer, channel, sink]),
    );
    let options = SynthesisOptions {
        port_windows: false,
        ..SynthesisOptions::default()
    };
    let mut monitor = Monitor::new();
    let list = synthesize(&program, &options, &mut monitor).expect("compiles");
    let atomic = list
        .atomics()
        .find(|a| a.reference.call == "demo::producer")
        .expect("producer component");
    assert_eq!(
        atomic.parameters,
        vec!["\"feed\"".to_string(), "0.5".to_string()]
    );
}

#[test]
fn internalized_boundary_hides_and_renames_ports() {
    let program = Program::new("fifo_internal", fifo_connector());
    let options = SynthesisOptions {
        internalize_boundary: true,
        ..SynthesisOptions::default()
    };
    let mut monitor = Monitor::new();
    let list = synthesize(&program, &options, &mut monitor).expect("compiles");
    assert!(!monitor.has_errors(), "diagnostics: {}", monitor.render());

    let protocol = list.protocols().next().expect("protocol component");
    for p in &protocol.interface {
        assert!(p.name().starts_with('_'), "renamed: {}", p.name());
        assert!(p.is_hidden());
    }
}

#[test]
fn partitioning_keeps_memory_sharers_together() {
    let program = Program::new("fifo_partitioned", fifo_connector());
    let options = SynthesisOptions {
        partitioning: true,
        ..SynthesisOptions::default()
    };
    let mut monitor = Monitor::new();
    let list = synthesize(&program, &options, &mut monitor).expect("compiles");
    assert!(!monitor.has_errors(), "diagnostics: {}", monitor.render());

    // both transitions touch the buffer cell, so they stay in one component
    let protocols: Vec<_> = list.protocols().collect();
    assert_eq!(protocols.len(), 1);
    assert_eq!(protocols[0].transitions.len(), 2);
}

#[test]
fn empty_connector_aborts_with_a_diagnostic() {
    let program = Program::new("empty", Connector::composite(None, vec![]));
    let mut monitor = Monitor::new();
    let result = synthesize(&program, &SynthesisOptions::default(), &mut monitor);
    assert!(result.is_none());
    assert!(monitor.has_errors());
}

#[test]
fn fan_out_without_replication_support_reports_every_error() {
    // one producer port consumed by two channels, replication disabled in
    // the reference pipeline: the error is reported and synthesis goes on
    let producer = external("Producer", "demo::producer", &[Port::output("a")], vec![]);
    let ch1 = Connector::atom(Some("sync1".into()), sync_channel("a", "b"), None);
    let ch2 = Connector::atom(Some("sync2".into()), sync_channel("a", "c"), None);
    let sink1 = external("SinkB", "demo::consumer", &[Port::input("b")], vec![]);
    let sink2 = external("SinkC", "demo::consumer", &[Port::input("c")], vec![]);
    let connector = Connector::composite(None, vec![producer, ch1, ch2, sink1, sink2]);

    let program = Program::new("fanout", connector);
    let options = SynthesisOptions {
        port_windows: false,
        ..SynthesisOptions::default()
    };
    let mut monitor = Monitor::new();
    let list = synthesize(&program, &options, &mut monitor);
    assert!(monitor.has_errors());
    assert!(monitor.render().contains("replication is disabled"));
    // best-effort output still exists
    assert!(list.is_some());
}
