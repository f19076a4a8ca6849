use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use indexmap::IndexSet;

use weft_ir::automaton::{Rule, RuleAutomaton};
use weft_ir::formula::Formula;
use weft_ir::port::Port;
use weft_ir::term::Term;

/// A chain of `n` sync channels: x0 -> x1 -> ... -> xn.
fn channel_chain(n: usize) -> Vec<RuleAutomaton> {
    (0..n)
        .map(|i| {
            let a = Port::input(format!("x{i}"));
            let b = Port::output(format!("x{}", i + 1));
            let firing: IndexSet<Port> = [a.clone(), b.clone()].into_iter().collect();
            let rule = Rule::new(firing, Formula::Eq(Term::port(b.clone()), Term::port(a.clone())));
            RuleAutomaton::new([a, b].into_iter().collect(), vec![rule])
        })
        .collect()
}

fn bench_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("compose");
    for n in [4usize, 8, 12] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let automata = channel_chain(n);
            b.iter(|| RuleAutomaton::compose(automata.clone()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compose);
criterion_main!(benches);
