use crate::helper::*;

use prolog_resolve::*;

use serial_test::serial;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const GRAPH: &str = r#"
    :- table path/2.

    edge(a, b).
    edge(b, c).
    edge(c, a).
    edge(c, d).

    path(X, Y) :- edge(X, Y).
    path(X, Y) :- path(X, Z), edge(Z, Y).
"#;

fn sorted(mut terms: Vec<Term>) -> Vec<Term> {
    terms.sort_by_key(|term| term.to_string());
    terms
}

#[test]
fn left_recursion_over_a_cycle_terminates() {
    let machine = machine_with(GRAPH);

    let reachable = bindings_of(&machine, "path(a, Y)", "Y");

    assert_eq!(reachable.len(), 4);
    assert_eq!(sorted(reachable), ["a", "b", "c", "d"].map(Term::atom));
}

#[test]
fn every_pair_is_reported_once() {
    let machine = machine_with(GRAPH);

    let pairs = answers(&machine, "path(X, Y)");

    // a, b and c reach all four nodes; d reaches none.
    assert_eq!(pairs.len(), 12);
    assert_eq!(answers(&machine, "path(d, _)"), [LeafAnswer::False]);
}

#[test]
fn clause_order_does_not_matter() {
    let machine = machine_with(
        r#"
        :- table path/2.

        edge(a, b).
        edge(b, c).
        edge(c, a).
        edge(c, d).

        path(X, Y) :- path(X, Z), edge(Z, Y).
        path(X, Y) :- edge(X, Y).
        "#,
    );

    let reachable = bindings_of(&machine, "path(a, Y)", "Y");

    assert_eq!(sorted(reachable), ["a", "b", "c", "d"].map(Term::atom));
}

#[test]
fn right_recursion_with_both_arguments_open() {
    let machine = machine_with(
        r#"
        :- table path/2.

        edge(a, b).
        edge(b, c).
        edge(c, a).
        edge(c, d).

        path(X, Y) :- edge(X, Z), path(Z, Y).
        path(X, Y) :- edge(X, Y).
        "#,
    );

    let answers = answers(&machine, "path(X, Y)");
    let pairs: BTreeSet<String> = answers
        .iter()
        .map(|answer| format!("{}-{}", answer.get("X").unwrap(), answer.get("Y").unwrap()))
        .collect();

    assert_eq!(answers.len(), 12);
    assert_eq!(pairs.len(), 12);
    assert!(pairs.iter().all(|pair| !pair.starts_with('d')));
    assert_eq!(
        sorted(bindings_of(&machine, "path(b, Y)", "Y")),
        ["a", "b", "c", "d"].map(Term::atom)
    );
}

#[test]
fn completed_tables_answer_later_queries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let machine = machine_with(
        r#"
        :- table fib/2.

        fib(0, 0).
        fib(1, 1).
        fib(N, F) :-
            N > 1, tick,
            N1 is N - 1, N2 is N - 2,
            fib(N1, F1), fib(N2, F2),
            F is F1 + F2.
        "#,
    );

    let counter = calls.clone();
    machine.register_builtin(
        "tick",
        0,
        Builtin::deterministic(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }),
    );

    assert_eq!(bindings_of(&machine, "fib(30, F)", "F"), [Term::integer(832_040)]);

    // each variant is generated once
    assert_eq!(calls.load(Ordering::SeqCst), 29);

    assert_eq!(bindings_of(&machine, "fib(25, F)", "F"), [Term::integer(75_025)]);
    assert_eq!(calls.load(Ordering::SeqCst), 29);
}

#[test]
#[serial]
fn concurrent_callers_share_one_evaluation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let machine = machine_with(
        r#"
        :- table slow/1.

        slow(X) :- tick, ( X = 1 ; X = 2 ).
        "#,
    );

    let counter = calls.clone();
    machine.register_builtin(
        "tick",
        0,
        Builtin::deterministic(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            Ok(true)
        }),
    );

    let start = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let machine = machine.clone();
            let start = start.clone();

            thread::spawn(move || {
                start.wait();
                sorted(bindings_of(&machine, "slow(X)", "X"))
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), [Term::integer(1), Term::integer(2)]);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn a_caller_generating_its_own_table_waits_for_the_leader() {
    let calls = Arc::new(AtomicUsize::new(0));
    let leading = Arc::new(Barrier::new(2));
    let machine = machine_with(
        r#"
        :- table slow/1.
        :- table outer/1.

        slow(X) :- tick, ( X = 1 ; X = 2 ).
        outer(X) :- slow(X).
        "#,
    );

    let (counter, entered) = (calls.clone(), leading.clone());
    machine.register_builtin(
        "tick",
        0,
        Builtin::deterministic(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                entered.wait();
                thread::sleep(Duration::from_millis(100));
            }

            Ok(true)
        }),
    );

    let leader = {
        let machine = machine.clone();
        thread::spawn(move || sorted(bindings_of(&machine, "slow(X)", "X")))
    };

    let follower = {
        let machine = machine.clone();
        let leading = leading.clone();

        thread::spawn(move || {
            leading.wait();
            // generating outer(_) when it meets slow(_)
            sorted(bindings_of(&machine, "outer(X)", "X"))
        })
    };

    let expected = [Term::integer(1), Term::integer(2)];

    assert_eq!(leader.join().unwrap(), expected);
    assert_eq!(follower.join().unwrap(), expected);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn errors_leave_no_table_behind() {
    let machine = machine_with(
        r#"
        :- table t/1.
        :- dynamic(ready/0).

        t(X) :- ( ready -> X = ok ; X is foo + 1 ).
        "#,
    );

    assert!(machine.query_all("t(X)").is_err());

    machine.consult(":- assertz(ready).").unwrap();

    assert_eq!(bindings_of(&machine, "t(X)", "X"), [Term::atom("ok")]);
}
