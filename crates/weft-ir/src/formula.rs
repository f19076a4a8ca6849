use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::port::Port;
use crate::term::{MemCell, Term, Var};

/// A first-order constraint over port and memory terms.
///
/// The fragment is deliberately small: equational atoms, conjunction, and
/// existential quantification. There is no general quantifier elimination
/// here; hidden variables are removed structurally when rules are turned into
/// guarded commands, which restricts rule formulas to solved (equational)
/// form. That restriction is a documented limitation of the rules-based
/// semantics, not a defect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Formula {
    True,
    Eq(Term, Term),
    Neq(Term, Term),
    Conj(Vec<Formula>),
    Exists(Var, Box<Formula>),
}

impl Formula {
    /// Conjunction of the given parts, flattened and with trivial parts
    /// removed.
    pub fn conj(parts: Vec<Formula>) -> Formula {
        fn push(f: Formula, out: &mut Vec<Formula>) {
            match f {
                Formula::True => {}
                Formula::Conj(fs) => {
                    for g in fs {
                        push(g, out);
                    }
                }
                other => out.push(other),
            }
        }
        let mut flat = Vec::new();
        for f in parts {
            push(f, &mut flat);
        }
        match flat.len() {
            0 => Formula::True,
            1 => flat.remove(0),
            _ => Formula::Conj(flat),
        }
    }

    /// Capture-avoiding conjunction of two formulas.
    ///
    /// Quantifiers of both sides are lifted to one prefix; a binder that
    /// clashes with a variable free on the other side is alpha-renamed, so a
    /// hidden variable of one rule can never capture a free occurrence
    /// belonging to another rule.
    pub fn and(&self, other: &Formula) -> Formula {
        let mut taken = self.free_vars();
        taken.extend(other.free_vars());
        let (mut vars, a) = self.prenex_avoiding(&mut taken);
        let (vars_b, b) = other.prenex_avoiding(&mut taken);
        vars.extend(vars_b);
        let mut f = Formula::conj(vec![a, b]);
        for v in vars.into_iter().rev() {
            f = Formula::Exists(v, Box::new(f));
        }
        f
    }

    /// Existentially close over `var`. A no-op when `var` is not free, so
    /// hiding an already-hidden variable never stacks quantifiers.
    pub fn hide(&self, var: &Var) -> Formula {
        if self.free_vars().contains(var) {
            Formula::Exists(var.clone(), Box::new(self.clone()))
        } else {
            self.clone()
        }
    }

    /// Variables with at least one free occurrence, in first-occurrence
    /// order.
    pub fn free_vars(&self) -> IndexSet<Var> {
        fn go(f: &Formula, bound: &mut Vec<Var>, out: &mut IndexSet<Var>) {
            match f {
                Formula::True => {}
                Formula::Eq(a, b) | Formula::Neq(a, b) => {
                    for t in [a, b] {
                        if let Some(v) = t.as_var() {
                            if !bound.contains(&v) {
                                out.insert(v);
                            }
                        }
                    }
                }
                Formula::Conj(fs) => {
                    for g in fs {
                        go(g, bound, out);
                    }
                }
                Formula::Exists(v, inner) => {
                    bound.push(v.clone());
                    go(inner, bound, out);
                    bound.pop();
                }
            }
        }
        let mut out = IndexSet::new();
        go(self, &mut Vec::new(), &mut out);
        out
    }

    /// Free port variables.
    pub fn free_ports(&self) -> IndexSet<Port> {
        self.free_vars()
            .into_iter()
            .filter_map(|v| match v {
                Var::Port(p) => Some(p),
                Var::Mem { .. } => None,
            })
            .collect()
    }

    /// Memory cells with a free occurrence (current or next-step).
    pub fn free_memory_cells(&self) -> IndexSet<MemCell> {
        self.free_vars()
            .into_iter()
            .filter_map(|v| match v {
                Var::Mem { cell, .. } => Some(cell),
                Var::Port(_) => None,
            })
            .collect()
    }

    /// Substitute `replacement` for free occurrences of `var`.
    pub fn subst(&self, var: &Var, replacement: &Term) -> Formula {
        match self {
            Formula::True => Formula::True,
            Formula::Eq(a, b) => {
                Formula::Eq(a.subst(var, replacement), b.subst(var, replacement))
            }
            Formula::Neq(a, b) => {
                Formula::Neq(a.subst(var, replacement), b.subst(var, replacement))
            }
            Formula::Conj(fs) => {
                Formula::Conj(fs.iter().map(|g| g.subst(var, replacement)).collect())
            }
            Formula::Exists(v, inner) => {
                if v == var {
                    // bound occurrences shadow the substitution
                    self.clone()
                } else if replacement.mentions(v) {
                    let mut taken = inner.free_vars();
                    if let Some(rv) = replacement.as_var() {
                        taken.insert(rv);
                    }
                    taken.insert(var.clone());
                    let fresh = fresh_var_like(v, &taken);
                    let renamed = inner.subst(v, &fresh.term());
                    Formula::Exists(fresh, Box::new(renamed.subst(var, replacement)))
                } else {
                    Formula::Exists(v.clone(), Box::new(inner.subst(var, replacement)))
                }
            }
        }
    }

    /// Apply a port rename map to all free port occurrences simultaneously.
    /// Entries shadowed by a binder do not apply under it; a binder that
    /// would capture an incoming name is alpha-renamed first.
    pub fn rename_ports(&self, map: &IndexMap<Port, Port>) -> Formula {
        fn rename_term(t: &Term, map: &IndexMap<Port, Port>) -> Term {
            match t {
                Term::Port(p) => match map.get(p) {
                    Some(target) => Term::Port(p.follow(target)),
                    None => t.clone(),
                },
                _ => t.clone(),
            }
        }
        if map.is_empty() {
            return self.clone();
        }
        match self {
            Formula::True => Formula::True,
            Formula::Eq(a, b) => Formula::Eq(rename_term(a, map), rename_term(b, map)),
            Formula::Neq(a, b) => Formula::Neq(rename_term(a, map), rename_term(b, map)),
            Formula::Conj(fs) => {
                Formula::Conj(fs.iter().map(|g| g.rename_ports(map)).collect())
            }
            Formula::Exists(v, inner) => {
                let mut scoped = map.clone();
                if let Var::Port(p) = v {
                    scoped.shift_remove(p);
                }
                let captures = match v {
                    Var::Port(p) => scoped.values().any(|t| t.name() == p.name()),
                    Var::Mem { .. } => false,
                };
                if captures {
                    let mut taken = inner.free_vars();
                    for t in scoped.values() {
                        taken.insert(Var::Port(t.clone()));
                    }
                    let fresh = fresh_var_like(v, &taken);
                    let renamed = inner.subst(v, &fresh.term());
                    Formula::Exists(fresh, Box::new(renamed.rename_ports(&scoped)))
                } else if scoped.is_empty() {
                    self.clone()
                } else {
                    Formula::Exists(v.clone(), Box::new(inner.rename_ports(&scoped)))
                }
            }
        }
    }

    /// Lift all quantifiers to one prefix and return it with the
    /// quantifier-free body. Binders clashing with anything in `taken` (or
    /// with each other) are alpha-renamed; every surviving binder is added to
    /// `taken`.
    pub fn prenex_avoiding(&self, taken: &mut IndexSet<Var>) -> (Vec<Var>, Formula) {
        fn go(f: &Formula, prefix: &mut Vec<Var>, taken: &mut IndexSet<Var>) -> Formula {
            match f {
                Formula::True | Formula::Eq(..) | Formula::Neq(..) => f.clone(),
                Formula::Conj(fs) => {
                    Formula::conj(fs.iter().map(|g| go(g, prefix, taken)).collect())
                }
                Formula::Exists(v, inner) => {
                    if taken.contains(v) {
                        let fresh = fresh_var_like(v, taken);
                        let renamed = inner.subst(v, &fresh.term());
                        taken.insert(fresh.clone());
                        prefix.push(fresh);
                        go(&renamed, prefix, taken)
                    } else {
                        taken.insert(v.clone());
                        prefix.push(v.clone());
                        go(inner, prefix, taken)
                    }
                }
            }
        }
        let mut prefix = Vec::new();
        let body = go(self, &mut prefix, taken);
        (prefix, body)
    }

    /// `prenex_avoiding` seeded with this formula's own free variables.
    pub fn prenex(&self) -> (Vec<Var>, Formula) {
        let mut taken = self.free_vars();
        self.prenex_avoiding(&mut taken)
    }

    /// Flattened conjuncts of a (possibly nested) conjunction.
    pub fn conjuncts(&self) -> Vec<&Formula> {
        fn go<'a>(f: &'a Formula, out: &mut Vec<&'a Formula>) {
            match f {
                Formula::True => {}
                Formula::Conj(fs) => {
                    for g in fs {
                        go(g, out);
                    }
                }
                other => out.push(other),
            }
        }
        let mut out = Vec::new();
        go(self, &mut out);
        out
    }
}

/// A variable of the same kind as `v`, guaranteed not to clash with anything
/// in `taken`. Ports get a numbered alias; memory cells get a fresh identity.
fn fresh_var_like(v: &Var, taken: &IndexSet<Var>) -> Var {
    match v {
        Var::Port(p) => {
            let names: IndexSet<&str> = taken
                .iter()
                .filter_map(|t| match t {
                    Var::Port(q) => Some(q.name()),
                    Var::Mem { .. } => None,
                })
                .collect();
            let mut k = 1;
            loop {
                let candidate = format!("{}~{k}", p.name());
                if !names.contains(candidate.as_str()) {
                    return Var::Port(p.rename(candidate));
                }
                k += 1;
            }
        }
        Var::Mem { cell, primed } => Var::Mem {
            cell: MemCell::fresh(format!("{}~", cell.name()), cell.tag().cloned()),
            primed: *primed,
        },
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => write!(f, "true"),
            Formula::Eq(a, b) => write!(f, "{a} = {b}"),
            Formula::Neq(a, b) => write!(f, "{a} != {b}"),
            Formula::Conj(fs) => {
                for (i, g) in fs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " && ")?;
                    }
                    if matches!(g, Formula::Exists(..)) {
                        write!(f, "({g})")?;
                    } else {
                        write!(f, "{g}")?;
                    }
                }
                Ok(())
            }
            Formula::Exists(v, inner) => write!(f, "exists {v}. ({inner})"),
        }
    }
}
