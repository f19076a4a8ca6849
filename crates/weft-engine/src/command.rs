use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::{IndexMap, IndexSet};
use miette::Diagnostic;
use serde::Serializer;
use thiserror::Error;

use weft_ir::formula::Formula;
use weft_ir::port::Port;
use weft_ir::term::{MemCell, Term, Var};

/// The commandified form of a rule: a deterministic guarded command.
///
/// The guard ranges over interface ports and current memory only; the output
/// map assigns each fired output port a term over inputs and current memory;
/// the memory map assigns next-step values to memory cells. Equality is
/// structural, so a set of transitions deduplicates commands that differ only
/// in construction order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Transition {
    pub guard: Formula,
    pub interface: IndexSet<Port>,
    #[serde(serialize_with = "ser_output_map")]
    pub output: IndexMap<Port, Term>,
    #[serde(serialize_with = "ser_memory_map")]
    pub memory: IndexMap<MemCell, Term>,
}

fn ser_output_map<S: Serializer>(
    map: &IndexMap<Port, Term>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let named: IndexMap<&str, &Term> = map.iter().map(|(p, t)| (p.name(), t)).collect();
    serde::Serialize::serialize(&named, serializer)
}

fn ser_memory_map<S: Serializer>(
    map: &IndexMap<MemCell, Term>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let named: IndexMap<&str, &Term> = map.iter().map(|(c, t)| (c.name(), t)).collect();
    serde::Serialize::serialize(&named, serializer)
}

impl Transition {
    /// Order-insensitive rendering used for structural equality and hashing.
    pub fn canonical_key(&self) -> String {
        let mut interface: Vec<&str> = self.interface.iter().map(Port::name).collect();
        interface.sort_unstable();
        let mut guard: Vec<String> = self
            .guard
            .conjuncts()
            .iter()
            .map(|f| f.to_string())
            .collect();
        guard.sort_unstable();
        let mut output: Vec<String> = self
            .output
            .iter()
            .map(|(p, t)| format!("{} := {t}", p.name()))
            .collect();
        output.sort_unstable();
        let mut memory: Vec<String> = self
            .memory
            .iter()
            .map(|(c, t)| format!("{}#{}' := {t}", c.name(), c.id()))
            .collect();
        memory.sort_unstable();
        format!(
            "[{}] {} | {} | {}",
            interface.join(","),
            guard.join(" && "),
            output.join("; "),
            memory.join("; ")
        )
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

impl Eq for Transition {}

impl Hash for Transition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_key().hash(state);
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, p) in self.interface.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, "}} {} ->", self.guard)?;
        for (p, t) in &self.output {
            write!(f, " {} := {t};", p.name())?;
        }
        for (c, t) in &self.memory {
            write!(f, " {c}' := {t};")?;
        }
        Ok(())
    }
}

/// Failures of the structural rewrite from rule formula to guarded command.
/// These are fatal for the affected transition and must be reported, never
/// silently dropped.
#[derive(Debug, Error, Diagnostic)]
pub enum CommandifyError {
    #[error("hidden variable '{0}' has no defining equality")]
    #[diagnostic(
        code(weft::commandify::undefined),
        help("every hidden port or memory reference must be fixed by an equality over visible terms")
    )]
    Undefined(String),

    #[error("derived contradictory constraint '{0}'")]
    #[diagnostic(
        code(weft::commandify::inconsistent),
        help("a hidden variable was given conflicting defining equalities")
    )]
    Inconsistent(String),
}

#[derive(Debug, Clone)]
enum Literal {
    Eq(Term, Term),
    Neq(Term, Term),
}

impl Literal {
    fn subst(&self, var: &Var, replacement: &Term) -> Literal {
        match self {
            Literal::Eq(a, b) => {
                Literal::Eq(a.subst(var, replacement), b.subst(var, replacement))
            }
            Literal::Neq(a, b) => {
                Literal::Neq(a.subst(var, replacement), b.subst(var, replacement))
            }
        }
    }

    fn terms(&self) -> [&Term; 2] {
        match self {
            Literal::Eq(a, b) | Literal::Neq(a, b) => [a, b],
        }
    }
}

fn is_ground(t: &Term) -> bool {
    matches!(t, Term::Const(_) | Term::Null)
}

/// Right-hand sides of assignments may only mention inputs, current memory,
/// and constants.
fn rhs_admissible(t: &Term) -> bool {
    match t {
        Term::Port(p) => p.is_input(),
        Term::Mem { primed, .. } => !primed,
        Term::Const(_) | Term::Null => true,
    }
}

/// Rewrite a rule formula into a deterministic guarded command.
///
/// The input carries its internal ports and memory in an existential prefix.
/// Hidden variables are eliminated structurally: the formula is treated as
/// solved form, repeatedly substituting a hidden variable by the other side
/// of one of its defining equalities. Chains of hidden variables resolve by
/// iteration; a residue equality between visible terms stays in the guard,
/// and a residue contradiction between ground terms means the definitions
/// conflicted. No symbolic quantifier elimination happens here; only
/// equational formulas are supported.
pub fn commandify(formula: &Formula) -> Result<Transition, CommandifyError> {
    let (prefix, body) = formula.prenex();
    let hidden: IndexSet<Var> = prefix.into_iter().collect();

    let mut literals: Vec<Literal> = Vec::new();
    for f in body.conjuncts() {
        match f {
            Formula::Eq(a, b) => {
                if a != b {
                    literals.push(Literal::Eq(a.clone(), b.clone()));
                }
            }
            Formula::Neq(a, b) => literals.push(Literal::Neq(a.clone(), b.clone())),
            Formula::True | Formula::Conj(_) | Formula::Exists(..) => {
                unreachable!("prenex body flattens to literals")
            }
        }
    }

    // Solved-form elimination of the existential prefix.
    loop {
        let mut target: Option<(usize, Var, Term)> = None;
        'scan: for (i, lit) in literals.iter().enumerate() {
            if let Literal::Eq(a, b) = lit {
                for (this, other) in [(a, b), (b, a)] {
                    if let Some(v) = this.as_var() {
                        if hidden.contains(&v) {
                            target = Some((i, v, other.clone()));
                            break 'scan;
                        }
                    }
                }
            }
        }
        let Some((index, var, replacement)) = target else {
            break;
        };
        literals.remove(index);
        literals = literals
            .iter()
            .map(|lit| lit.subst(&var, &replacement))
            .filter(|lit| !matches!(lit, Literal::Eq(a, b) if a == b))
            .collect();
    }

    // Ground residues: conflicting definitions surface here.
    let mut cleaned: Vec<Literal> = Vec::new();
    for lit in literals {
        match &lit {
            Literal::Eq(a, b) => {
                if a == b {
                    continue;
                }
                if is_ground(a) && is_ground(b) {
                    return Err(CommandifyError::Inconsistent(format!("{a} = {b}")));
                }
                cleaned.push(lit);
            }
            Literal::Neq(a, b) => {
                if a == b {
                    return Err(CommandifyError::Inconsistent(format!("{a} != {b}")));
                }
                if is_ground(a) && is_ground(b) {
                    continue; // distinct ground terms: trivially true
                }
                cleaned.push(lit);
            }
        }
    }

    // A hidden variable that survived elimination had no defining equality.
    for lit in &cleaned {
        for t in lit.terms() {
            if let Some(v) = t.as_var() {
                if hidden.contains(&v) {
                    return Err(CommandifyError::Undefined(v.to_string()));
                }
            }
        }
    }

    // Classify literals into output map, memory map, and guard.
    let mut guard: Vec<Formula> = Vec::new();
    let mut output: IndexMap<Port, Term> = IndexMap::new();
    let mut memory: IndexMap<MemCell, Term> = IndexMap::new();

    for lit in cleaned {
        match lit {
            Literal::Eq(a, b) => {
                let mut slotted = false;
                for (this, other) in [(&a, &b), (&b, &a)] {
                    if slotted {
                        break;
                    }
                    match this {
                        Term::Port(p) if p.is_output() && rhs_admissible(other) => {
                            match output.get(p) {
                                Some(existing) if existing != other => {
                                    guard.push(Formula::Eq(existing.clone(), other.clone()));
                                }
                                Some(_) => {}
                                None => {
                                    output.insert(p.clone(), other.clone());
                                }
                            }
                            slotted = true;
                        }
                        Term::Mem { cell, primed: true } if rhs_admissible(other) => {
                            match memory.get(cell) {
                                Some(existing) if existing != other => {
                                    guard.push(Formula::Eq(existing.clone(), other.clone()));
                                }
                                Some(_) => {}
                                None => {
                                    memory.insert(cell.clone(), other.clone());
                                }
                            }
                            slotted = true;
                        }
                        _ => {}
                    }
                }
                if !slotted {
                    guard.push(Formula::Eq(a, b));
                }
            }
            Literal::Neq(a, b) => guard.push(Formula::Neq(a, b)),
        }
    }

    // Resolve assignments chained through an already-mapped output port
    // (e.g. replication residues `b2 = b1` with `b1` mapped).
    enum Chain {
        Out(Port, Term),
        Mem(MemCell, Term),
    }
    loop {
        let mut progressed = false;
        let mut index = 0;
        while index < guard.len() {
            let resolved = match &guard[index] {
                Formula::Eq(Term::Port(p), Term::Port(q))
                    if p.is_output() && q.is_output() =>
                {
                    match (output.get(p).cloned(), output.get(q).cloned()) {
                        (Some(t), None) => Some(Chain::Out(q.clone(), t)),
                        (None, Some(t)) => Some(Chain::Out(p.clone(), t)),
                        _ => None,
                    }
                }
                Formula::Eq(Term::Mem { cell, primed: true }, Term::Port(q))
                | Formula::Eq(Term::Port(q), Term::Mem { cell, primed: true })
                    if q.is_output() =>
                {
                    output
                        .get(q)
                        .cloned()
                        .map(|t| Chain::Mem(cell.clone(), t))
                }
                _ => None,
            };
            match resolved {
                Some(Chain::Out(p, t)) => {
                    output.insert(p, t);
                    guard.remove(index);
                    progressed = true;
                }
                Some(Chain::Mem(c, t)) => {
                    memory.insert(c, t);
                    guard.remove(index);
                    progressed = true;
                }
                None => index += 1,
            }
        }
        if !progressed {
            break;
        }
    }

    let mut interface: IndexSet<Port> = IndexSet::new();
    for f in &guard {
        interface.extend(f.free_ports());
    }
    for (p, t) in &output {
        interface.insert(p.clone());
        if let Term::Port(q) = t {
            interface.insert(q.clone());
        }
    }
    for t in memory.values() {
        if let Term::Port(q) = t {
            interface.insert(q.clone());
        }
    }

    Ok(Transition {
        guard: Formula::conj(guard),
        interface,
        output,
        memory,
    })
}
