use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::port::{Port, TypeTag};
use crate::value::Value;

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

/// A typed memory location in an automaton's persistent state.
///
/// Cells are compared and hashed by identity, never by name: two automata may
/// both call a cell `buf` without sharing state. Composition only unifies
/// cells when rules literally reference the same cell. `with_tag` refines the
/// type tag while preserving identity, so a retagged cell still matches its
/// occurrences in earlier transitions.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct MemCell {
    id: u64,
    name: String,
    tag: Option<TypeTag>,
}

impl MemCell {
    /// Allocate a cell with a fresh identity.
    pub fn fresh(name: impl Into<String>, tag: Option<TypeTag>) -> Self {
        MemCell {
            id: NEXT_CELL_ID.fetch_add(1, AtomicOrdering::Relaxed),
            name: name.into(),
            tag,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&TypeTag> {
        self.tag.as_ref()
    }

    /// The same cell with a (possibly refined) type tag.
    pub fn with_tag(&self, tag: Option<TypeTag>) -> Self {
        MemCell {
            id: self.id,
            name: self.name.clone(),
            tag,
        }
    }
}

impl PartialEq for MemCell {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MemCell {}

impl Hash for MemCell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for MemCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemCell {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.name, self.id).cmp(&(&other.name, other.id))
    }
}

impl fmt::Display for MemCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A symbolic value expression. Terms are read-only once constructed.
///
/// `Null` is the distinguished empty datum (printed `*`): the value of an
/// empty buffer cell and the right-hand side of reset assignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Term {
    /// The datum observed at a port in the current step.
    Port(Port),
    /// The content of a memory cell; `primed` selects the next-step value.
    Mem { cell: MemCell, primed: bool },
    /// A literal constant.
    Const(Value),
    /// The empty datum.
    Null,
}

impl Term {
    pub fn port(p: Port) -> Self {
        Term::Port(p)
    }

    pub fn mem(cell: MemCell) -> Self {
        Term::Mem {
            cell,
            primed: false,
        }
    }

    pub fn mem_next(cell: MemCell) -> Self {
        Term::Mem { cell, primed: true }
    }

    pub fn type_tag(&self) -> Option<TypeTag> {
        match self {
            Term::Port(p) => p.tag().cloned(),
            Term::Mem { cell, .. } => cell.tag().cloned(),
            Term::Const(v) => Some(v.type_tag()),
            Term::Null => None,
        }
    }

    /// The variable this term denotes, if it is a variable occurrence.
    pub fn as_var(&self) -> Option<Var> {
        match self {
            Term::Port(p) => Some(Var::Port(p.clone())),
            Term::Mem { cell, primed } => Some(Var::Mem {
                cell: cell.clone(),
                primed: *primed,
            }),
            _ => None,
        }
    }

    pub fn mentions(&self, var: &Var) -> bool {
        self.as_var().as_ref() == Some(var)
    }

    /// Replace an occurrence of `var` by `replacement`.
    pub fn subst(&self, var: &Var, replacement: &Term) -> Term {
        if self.mentions(var) {
            replacement.clone()
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Port(p) => write!(f, "{}", p.name()),
            Term::Mem { cell, primed } => {
                if *primed {
                    write!(f, "{cell}'")
                } else {
                    write!(f, "{cell}")
                }
            }
            Term::Const(v) => write!(f, "{v}"),
            Term::Null => write!(f, "*"),
        }
    }
}

/// A variable that can be bound by existential quantification: a port, or a
/// memory cell in its current or next-step form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Var {
    Port(Port),
    Mem { cell: MemCell, primed: bool },
}

impl Var {
    pub fn port(p: Port) -> Self {
        Var::Port(p)
    }

    pub fn mem(cell: MemCell) -> Self {
        Var::Mem {
            cell,
            primed: false,
        }
    }

    pub fn mem_next(cell: MemCell) -> Self {
        Var::Mem { cell, primed: true }
    }

    /// The term form of this variable.
    pub fn term(&self) -> Term {
        match self {
            Var::Port(p) => Term::Port(p.clone()),
            Var::Mem { cell, primed } => Term::Mem {
                cell: cell.clone(),
                primed: *primed,
            },
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Port(p) => write!(f, "{}", p.name()),
            Var::Mem { cell, primed } => {
                if *primed {
                    write!(f, "{cell}'")
                } else {
                    write!(f, "{cell}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_compare_by_identity() {
        let a = MemCell::fresh("x", None);
        let b = MemCell::fresh("x", None);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn with_tag_preserves_identity() {
        let a = MemCell::fresh("x", None);
        let tagged = a.with_tag(Some(TypeTag::new("T")));
        assert_eq!(a, tagged);
        assert_eq!(tagged.tag(), Some(&TypeTag::new("T")));
    }

    #[test]
    fn term_tags_derive_from_carrier() {
        let p = Port::input("a").with_tag(TypeTag::new("T"));
        assert_eq!(Term::port(p).type_tag(), Some(TypeTag::new("T")));
        assert_eq!(Term::Const(Value::Integer(1)).type_tag(), Some(TypeTag::new("int")));
        assert_eq!(Term::Null.type_tag(), None);
    }

    #[test]
    fn substitution_replaces_only_the_variable() {
        let p = Port::input("a");
        let q = Port::output("b");
        let var = Var::port(p.clone());
        let replaced = Term::port(p.clone()).subst(&var, &Term::port(q.clone()));
        assert_eq!(replaced, Term::port(q.clone()));
        let untouched = Term::port(q.clone()).subst(&var, &Term::Null);
        assert_eq!(untouched, Term::port(q));
    }

    #[test]
    fn primed_and_unprimed_are_distinct_variables() {
        let x = MemCell::fresh("x", None);
        assert_ne!(Var::mem(x.clone()), Var::mem_next(x.clone()));
        assert!(!Term::mem(x.clone()).mentions(&Var::mem_next(x)));
    }

    #[test]
    fn display_forms() {
        let x = MemCell::fresh("x", None);
        assert_eq!(Term::mem(x.clone()).to_string(), "x");
        assert_eq!(Term::mem_next(x).to_string(), "x'");
        assert_eq!(Term::Null.to_string(), "*");
    }
}
