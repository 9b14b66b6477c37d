use std::{collections::BTreeMap, fs};

use maplit::btreemap;
use prolog_resolve::{LeafAnswer, Machine, Term};

pub fn prolog_benches() -> BTreeMap<&'static str, PrologBenchmark> {
    [
        (
            "nrev",                      // name of the benchmark
            "benches/nrev.pl",           // program to consult. the same file may serve several benchmarks
            "bench_nrev(400, Head).",    // query to benchmark against the consulted program
            Strategy::Reuse,
            btreemap! { "Head" => Term::integer(400) },
        ),
        (
            "count",
            "benches/count.pl",
            "count(0, 300000).",
            Strategy::Reuse,
            btreemap! {},
        ),
        (
            "sum",
            "benches/count.pl",
            "bench_sum(100000, S).",
            Strategy::Reuse,
            btreemap! { "S" => Term::integer(5_000_050_000) },
        ),
        (
            // tables outlive a query, so each run needs its own machine
            "reach",
            "benches/reach.pl",
            "findall(Y, reach(1, Y), Ys), length(Ys, N).",
            Strategy::Fresh,
            btreemap! { "N" => Term::integer(60) },
        ),
        (
            "assert",
            "benches/assert.pl",
            "bench_assert(20000, Count).",
            Strategy::Fresh,
            btreemap! { "Count" => Term::integer(20000) },
        ),
        (
            "churn",
            "benches/assert.pl",
            "bench_churn(20000, Count).",
            Strategy::Fresh,
            btreemap! { "Count" => Term::integer(0) },
        ),
    ]
    .map(|b| {
        (
            b.0,
            PrologBenchmark {
                name: b.0,
                filename: b.1,
                query: b.2,
                strategy: b.3,
                bindings: b.4,
            },
        )
    })
    .into()
}

pub enum Strategy {
    Fresh,
    Reuse,
}

pub struct PrologBenchmark {
    pub name: &'static str,
    pub filename: &'static str,
    pub query: &'static str,
    pub strategy: Strategy,
    pub bindings: BTreeMap<&'static str, Term>,
}

impl PrologBenchmark {
    pub fn make_machine(&self) -> Machine {
        let program = fs::read_to_string(self.filename).unwrap();
        let machine = Machine::default();
        machine.consult(&program).unwrap();
        machine
    }

    pub fn expected(&self) -> Vec<LeafAnswer> {
        if self.bindings.is_empty() {
            vec![LeafAnswer::True]
        } else {
            vec![LeafAnswer::from_bindings(self.bindings.clone())]
        }
    }

    pub fn setup(&self) -> impl FnMut() -> Vec<LeafAnswer> + '_ {
        let mut machine = self.make_machine();

        move || {
            use criterion::black_box;

            if let Strategy::Fresh = self.strategy {
                machine = self.make_machine();
            }

            black_box(machine.query_all(black_box(self.query))).unwrap()
        }
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn validate_benchmarks() {
        use super::prolog_benches;

        for (_, r) in prolog_benches() {
            let machine = r.make_machine();
            let result = machine.query_all(r.query).unwrap();
            assert_eq!(result, r.expected(), "validating benchmark {}", r.name);
        }
    }
}
