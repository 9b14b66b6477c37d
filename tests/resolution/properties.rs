use prolog_resolve::{Heap, Term, VarMap};

use proptest::prelude::*;

// clause-style templates over four shared variables
fn template() -> impl Strategy<Value = Term> {
    let leaf = prop_oneof![
        (0u32..4).prop_map(Term::var),
        prop::sample::select(vec!["a", "b"]).prop_map(Term::atom),
        (0i64..3).prop_map(Term::integer),
    ];

    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            (
                prop::sample::select(vec!["f", "g"]),
                prop::collection::vec(inner.clone(), 1..3)
            )
                .prop_map(|(name, args)| Term::compound(name, args)),
            prop::collection::vec(inner, 0..3).prop_map(Term::list),
        ]
    })
}

fn on_heap(a: &Term, b: &Term) -> (Heap, Term, Term) {
    let mut heap = Heap::new();
    let mut env = VarMap::new(4);

    let a = heap.instantiate(a, &mut env);
    let b = heap.instantiate(b, &mut env);

    (heap, a, b)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn unification_is_symmetric(a in template(), b in template()) {
        let (mut left, a1, b1) = on_heap(&a, &b);
        let (mut right, a2, b2) = on_heap(&a, &b);

        prop_assert_eq!(left.unify(&a1, &b1), right.unify(&b2, &a2));
    }

    #[test]
    fn undoing_restores_every_binding(a in template(), b in template()) {
        let (mut heap, a, b) = on_heap(&a, &b);

        let before = (heap.resolve(&a), heap.resolve(&b));
        let trail = heap.trail_len();
        let mark = heap.mark();

        heap.unify(&a, &b);
        heap.undo_to(mark);

        prop_assert_eq!((heap.resolve(&a), heap.resolve(&b)), before);
        prop_assert_eq!(heap.trail_len(), trail);
    }

    #[test]
    fn unifiers_are_idempotent(a in template(), b in template()) {
        let (mut heap, a, b) = on_heap(&a, &b);

        if heap.unify(&a, &b) {
            let trail = heap.trail_len();

            prop_assert!(heap.unify(&a, &b));
            prop_assert_eq!(heap.trail_len(), trail);
        }
    }
}
