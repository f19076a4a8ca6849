use indexmap::{IndexMap, IndexSet};
use miette::Diagnostic;
use thiserror::Error;

use weft_ir::port::TypeTag;
use weft_ir::term::{MemCell, Term};
use weft_ir::value::Value;

use crate::command::Transition;

/// Failures while preparing a part's initial memory map.
#[derive(Debug, Error, Diagnostic)]
pub enum PartitionError {
    #[error("memory cell '{0}' has no resolvable type tag in its part")]
    #[diagnostic(
        code(weft::partition::untyped_cell),
        help("declare a type on the cell or on some term assigned to it")
    )]
    UnresolvedTag(String),
}

/// Memory cells a transition touches anywhere: assigned cells plus cells read
/// by the guard or by assignment right-hand sides.
fn cells_of(t: &Transition) -> IndexSet<MemCell> {
    let mut out: IndexSet<MemCell> = t.memory.keys().cloned().collect();
    out.extend(t.guard.free_memory_cells());
    for term in t.output.values().chain(t.memory.values()) {
        if let Term::Mem { cell, .. } = term {
            out.insert(cell.clone());
        }
    }
    out
}

/// Group transitions into independently realizable protocol components.
///
/// With `decompose` off, everything lands in a single part (the reference
/// behavior). With it on, parts are the connected components of the
/// "shares a memory cell or synchronizes via a directly-linked port"
/// relation. Either way the hard invariant holds: two transitions touching
/// the same cell are never separated, since splitting shared mutable state
/// across components is unsound.
pub fn partition(
    transitions: &IndexSet<Transition>,
    decompose: bool,
) -> Vec<IndexSet<Transition>> {
    if !decompose {
        return vec![transitions.clone()];
    }

    let items: Vec<&Transition> = transitions.iter().collect();
    let n = items.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut cursor = i;
        while parent[cursor] != root {
            let next = parent[cursor];
            parent[cursor] = root;
            cursor = next;
        }
        root
    }

    let cell_sets: Vec<IndexSet<MemCell>> = items.iter().map(|t| cells_of(t)).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            let share_cell = !cell_sets[i].is_disjoint(&cell_sets[j]);
            let share_port = !items[i].interface.is_disjoint(&items[j].interface);
            if share_cell || share_port {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut groups: IndexMap<usize, IndexSet<Transition>> = IndexMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().insert(items[i].clone());
    }
    groups.into_values().collect()
}

/// Resolve every memory cell's type tag across all transitions of a part and
/// build the part's initial memory map (all cells start undefined).
///
/// A cell's tag may be declared in one transition and referenced untyped in
/// another, so the whole part is scanned before any cell is initialized. A
/// cell whose tag cannot be resolved anywhere is a fatal error for the part.
pub fn resolve_memory(
    part: &IndexSet<Transition>,
) -> Result<IndexMap<MemCell, Option<Value>>, PartitionError> {
    let mut tags: IndexMap<MemCell, Option<TypeTag>> = IndexMap::new();
    for t in part {
        for (cell, term) in &t.memory {
            let entry = tags.entry(cell.clone()).or_insert(None);
            if entry.is_none() {
                *entry = cell.tag().cloned();
            }
            if entry.is_none() {
                *entry = term.type_tag();
            }
        }
    }

    let mut initial: IndexMap<MemCell, Option<Value>> = IndexMap::new();
    for (cell, tag) in tags {
        match tag {
            Some(tag) => {
                initial.insert(cell.with_tag(Some(tag)), None);
            }
            None => return Err(PartitionError::UnresolvedTag(cell.name().to_string())),
        }
    }
    Ok(initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexSet;
    use weft_ir::formula::Formula;
    use weft_ir::port::Port;

    fn transition(ports: &[Port], memory: Vec<(MemCell, Term)>) -> Transition {
        Transition {
            guard: Formula::True,
            interface: ports.iter().cloned().collect(),
            output: IndexMap::new(),
            memory: memory.into_iter().collect(),
        }
    }

    #[test]
    fn single_part_without_decomposition() {
        let t1 = transition(&[Port::input("a")], vec![]);
        let t2 = transition(&[Port::input("b")], vec![]);
        let set: IndexSet<Transition> = [t1, t2].into_iter().collect();
        let parts = partition(&set, false);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].len(), 2);
    }

    #[test]
    fn shared_cell_forces_same_part() {
        let x = MemCell::fresh("x", Some(TypeTag::new("T")));
        let t1 = transition(&[Port::input("a")], vec![(x.clone(), Term::Null)]);
        let t2 = transition(&[Port::output("b")], vec![(x.clone(), Term::Null)]);
        let t3 = transition(&[Port::input("c")], vec![]);
        let set: IndexSet<Transition> = [t1.clone(), t2.clone(), t3.clone()].into_iter().collect();
        let parts = partition(&set, true);
        assert_eq!(parts.len(), 2);
        let joint = parts.iter().find(|p| p.contains(&t1)).expect("part of t1");
        assert!(joint.contains(&t2), "cell sharers must stay together");
        assert!(!joint.contains(&t3));
    }

    #[test]
    fn shared_port_forces_same_part() {
        let p = Port::input("p");
        let t1 = transition(&[p.clone(), Port::output("x")], vec![]);
        let t2 = transition(&[p.clone()], vec![]);
        let set: IndexSet<Transition> = [t1, t2].into_iter().collect();
        let parts = partition(&set, true);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn guard_only_cell_reference_counts_as_sharing() {
        let x = MemCell::fresh("x", Some(TypeTag::new("T")));
        let writer = transition(&[Port::input("a")], vec![(x.clone(), Term::Null)]);
        let mut reader = transition(&[Port::output("b")], vec![]);
        reader.guard = Formula::Neq(Term::mem(x.clone()), Term::Null);
        let set: IndexSet<Transition> = [writer, reader].into_iter().collect();
        let parts = partition(&set, true);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn tags_resolve_across_transitions() {
        let x = MemCell::fresh("x", None);
        let a = Port::input("a").with_tag(TypeTag::new("T"));
        // one transition assigns a typed term, the other resets untyped
        let t1 = transition(&[a.clone()], vec![(x.clone(), Term::port(a.clone()))]);
        let t2 = transition(&[Port::output("b")], vec![(x.clone(), Term::Null)]);
        let set: IndexSet<Transition> = [t1, t2].into_iter().collect();
        let initial = resolve_memory(&set).expect("tag is declared somewhere");
        assert_eq!(initial.len(), 1);
        let (cell, value) = initial.into_iter().next().expect("one cell");
        assert_eq!(cell, x);
        assert_eq!(cell.tag(), Some(&TypeTag::new("T")));
        assert_eq!(value, None);
    }

    #[test]
    fn unresolved_tag_is_fatal_for_the_part() {
        let x = MemCell::fresh("x", None);
        let t = transition(&[Port::input("a")], vec![(x.clone(), Term::Null)]);
        let set: IndexSet<Transition> = [t].into_iter().collect();
        match resolve_memory(&set) {
            Err(PartitionError::UnresolvedTag(name)) => assert_eq!(name, "x"),
            other => panic!("expected UnresolvedTag, got {other:?}"),
        }
    }
}
