use std::fmt;
use std::path::PathBuf;

use indexmap::{IndexMap, IndexSet};
use serde::Serializer;

use weft_ir::connector::Reference;
use weft_ir::port::Port;
use weft_ir::term::MemCell;
use weft_ir::value::Value;

use crate::command::Transition;

/// A call to an externally implemented component, with its parameter values
/// already rendered as target-language literals.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AtomicComponent {
    pub name: String,
    pub parameters: Vec<String>,
    pub interface: IndexSet<Port>,
    pub reference: Reference,
}

/// A synthesized protocol component: its port interface, the guarded
/// commands it schedules, and the initial (undefined) memory valuation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProtocolComponent {
    pub name: String,
    pub interface: IndexSet<Port>,
    pub transitions: IndexSet<Transition>,
    #[serde(serialize_with = "ser_initial_map")]
    pub initial: IndexMap<MemCell, Option<Value>>,
}

fn ser_initial_map<S: Serializer>(
    map: &IndexMap<MemCell, Option<Value>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let named: IndexMap<&str, &Option<Value>> =
        map.iter().map(|(c, v)| (c.name(), v)).collect();
    serde::Serialize::serialize(&named, serializer)
}

/// One entry of the template-assembler contract. Components are immutable
/// once constructed.
#[derive(Debug, Clone, serde::Serialize)]
pub enum Component {
    Atomic(AtomicComponent),
    Protocol(ProtocolComponent),
}

impl Component {
    pub fn name(&self) -> &str {
        match self {
            Component::Atomic(a) => &a.name,
            Component::Protocol(p) => &p.name,
        }
    }

    pub fn interface(&self) -> &IndexSet<Port> {
        match self {
            Component::Atomic(a) => &a.interface,
            Component::Protocol(p) => &p.interface,
        }
    }
}

/// The ordered component sequence handed to the template assembler.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComponentList {
    pub program: String,
    pub source: Option<PathBuf>,
    pub components: Vec<Component>,
}

impl ComponentList {
    pub fn protocols(&self) -> impl Iterator<Item = &ProtocolComponent> {
        self.components.iter().filter_map(|c| match c {
            Component::Protocol(p) => Some(p),
            Component::Atomic(_) => None,
        })
    }

    pub fn atomics(&self) -> impl Iterator<Item = &AtomicComponent> {
        self.components.iter().filter_map(|c| match c {
            Component::Atomic(a) => Some(a),
            Component::Protocol(_) => None,
        })
    }
}

impl fmt::Display for ComponentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "program {}", self.program)?;
        for component in &self.components {
            match component {
                Component::Atomic(a) => {
                    write!(f, "  atomic {}({})", a.name, a.parameters.join(", "))?;
                    write!(f, " [")?;
                    for (i, p) in a.interface.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{p}")?;
                    }
                    writeln!(f, "] -> {}", a.reference.call)?;
                }
                Component::Protocol(p) => {
                    write!(f, "  protocol {} [", p.name)?;
                    for (i, port) in p.interface.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{port}")?;
                    }
                    writeln!(f, "]")?;
                    for t in &p.transitions {
                        writeln!(f, "    {t}")?;
                    }
                    for (cell, value) in &p.initial {
                        let tag = cell
                            .tag()
                            .map(|t| format!(": {t}"))
                            .unwrap_or_default();
                        match value {
                            Some(v) => writeln!(f, "    initial {cell}{tag} = {v}")?,
                            None => writeln!(f, "    initial {cell}{tag} = undefined")?,
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
