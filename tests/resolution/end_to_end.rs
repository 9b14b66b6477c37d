use crate::helper::*;

use prolog_resolve::*;

use std::sync::Arc;

const APPEND: &str = r#"
    append([], L, L).
    append([H|T], L, [H|R]) :- append(T, L, R).
"#;

#[test]
fn append_forwards() {
    let machine = machine_with(APPEND);

    assert_eq!(
        bindings_of(&machine, "append([1,2], [3,4], X)", "X"),
        [Term::list([1, 2, 3, 4].map(Term::integer))]
    );
}

#[test]
fn append_backwards_enumerates_every_split() {
    let machine = machine_with(APPEND);
    let answers = answers(&machine, "append(X, Y, [1,2,3])");

    let splits: Vec<_> = answers
        .iter()
        .map(|answer| (answer.get("X").cloned(), answer.get("Y").cloned()))
        .collect();

    let list = |items: &[i64]| Some(Term::list(items.iter().copied().map(Term::integer)));

    assert_eq!(
        splits,
        [
            (list(&[]), list(&[1, 2, 3])),
            (list(&[1]), list(&[2, 3])),
            (list(&[1, 2]), list(&[3])),
            (list(&[1, 2, 3]), list(&[])),
        ]
    );
}

#[test]
fn cut_commits_to_the_first_clause() {
    let machine = machine_with(
        r#"
        p(1) :- !.
        p(2).

        t(X) :- call(((X = 1 ; X = 2), !)).
        t(3).

        classify(X, Y) :- ( X > 0 -> Y = pos ; Y = nonpos ).
        "#,
    );

    assert_eq!(bindings_of(&machine, "p(X)", "X"), [Term::integer(1)]);
    assert_eq!(answers(&machine, "p(2)"), [LeafAnswer::True]);

    // the cut inside call/1 is local to it
    assert_eq!(
        bindings_of(&machine, "t(X)", "X"),
        [Term::integer(1), Term::integer(3)]
    );

    assert_eq!(bindings_of(&machine, "classify(5, Y)", "Y"), [Term::atom("pos")]);
    assert_eq!(bindings_of(&machine, "classify(-1, Y)", "Y"), [Term::atom("nonpos")]);
}

#[test]
fn negation_and_once() {
    let machine = machine_with("q(1). q(2). q(3).");

    assert_eq!(answers(&machine, "\\+ q(4)"), [LeafAnswer::True]);
    assert_eq!(answers(&machine, "\\+ q(2)"), [LeafAnswer::False]);
    assert_eq!(bindings_of(&machine, "once(q(X))", "X"), [Term::integer(1)]);
    assert_eq!(
        bindings_of(&machine, "findall(X, (q(X), X >= 2), L)", "L"),
        [Term::list([Term::integer(2), Term::integer(3)])]
    );
}

#[test]
fn tail_recursion_runs_in_constant_stack() {
    let machine = machine_with(
        r#"
        len([], N, N).
        len([_|T], N0, N) :- N1 is N0 + 1, len(T, N1, N).
        "#,
    );

    let answers = answers(&machine, "findall(X, between(1, 200000, X), L), len(L, 0, N)");

    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].get("N"), Some(&Term::integer(200_000)));
}

#[test]
fn tail_loops_backtrack_into_their_prefix() {
    let machine = machine_with(
        r#"
        pick(X, X).
        pick(X, Y) :- X < 3, X1 is X + 1, pick(X1, Y).
        "#,
    );

    assert_eq!(
        bindings_of(&machine, "pick(0, Y)", "Y"),
        [0, 1, 2, 3].map(Term::integer)
    );
}

#[test]
fn cut_terminated_countdowns_run_as_loops() {
    let machine = machine_with(
        r#"
        count(0) :- !.
        count(N) :- N1 is N - 1, count(N1).
        "#,
    );

    assert_eq!(answers(&machine, "count(200000)"), [LeafAnswer::True]);
    assert_eq!(answers(&machine, "count(0)"), [LeafAnswer::True]);
}

#[test]
fn a_base_clause_cut_only_commits_its_own_depth() {
    let machine = machine_with(
        r#"
        walk(N, N) :- !.
        walk(N, M) :- N < M, between(1, 2, D), N1 is N + D, walk(N1, M).
        "#,
    );

    // 1+1+1, 1+2 and 2+1
    assert_eq!(answers(&machine, "walk(0, 3)").len(), 3);

    // at depth 0 the cut leaves nothing to backtrack into
    assert_eq!(
        bindings_of(&machine, "findall(N, walk(0, N), L)", "L"),
        [Term::list([Term::integer(0)])]
    );
}

#[test]
fn errors_carry_the_clause_they_were_raised_in() {
    let machine = machine_with("bad(X) :- X is foo + 1.");
    let mut answers = machine.run_query("bad(X)");

    match answers.next() {
        Some(Err(error @ EngineError::InClause { .. })) => {
            assert!(error.to_string().contains("bad("));
            assert!(matches!(error.root_cause(), EngineError::Type { .. }));
        }
        other => panic!("expected an annotated type error, got {other:?}"),
    }

    assert!(answers.next().is_none());
}

#[test]
fn dynamic_predicates_see_a_snapshot() {
    let machine = machine_with(
        r#"
        :- dynamic(counter/1).
        counter(0).
        "#,
    );

    // the clause asserted during the iteration is not visited by it
    assert_eq!(
        bindings_of(&machine, "counter(X), Y is X + 1, assertz(counter(Y))", "Y"),
        [Term::integer(1)]
    );

    assert_eq!(
        bindings_of(&machine, "counter(X)", "X"),
        [Term::integer(0), Term::integer(1)]
    );

    assert_eq!(
        bindings_of(&machine, "retract(counter(0)), counter(X)", "X"),
        [Term::integer(1)]
    );
}

#[test]
fn observers_see_every_port() {
    let recorder = Arc::new(RecordingObserver::default());
    let machine = MachineBuilder::new().with_observer(recorder.clone()).build();

    machine
        .consult(
            r#"
            q(1).
            q(2).
            c(X) :- X = 1, !.
            c(2).
            "#,
        )
        .unwrap();

    assert_eq!(answers(&machine, "q(2)"), [LeafAnswer::True]);
    assert_eq!(answers(&machine, "q(3)"), [LeafAnswer::False]);
    assert_eq!(answers(&machine, "c(X), X > 1"), [LeafAnswer::False]);

    assert_eq!(
        *recorder.events.lock(),
        [
            "call q(2)",
            "exit q(2)",
            "call q(3)",
            "fail q(3)",
            "call c(_0)",
            "exit c(1)",
            "redo c(1)",
            "cut c(_0)",
        ]
    );
}

#[test]
fn machines_are_shared_between_threads() {
    let machine = machine_with("p(1). p(2). p(3).");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let machine = machine.clone();
            std::thread::spawn(move || bindings_of(&machine, "p(X)", "X").len())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 3);
    }
}
