#![cfg(test)]
//! Integration tests for the full transformation pipeline:
//! assemble -> supercompile -> defunctionalize -> verify/render.

use crate::builder::Builder;
use crate::node::{NodeId, NodeKind, Op};
use crate::Assembled;

/// `addOne = fn(x, k): k(x + 1)`.
fn add_one(b: &mut Builder) -> NodeId {
    let u32_ty = b.uint_type(32);
    let x = b.parameter(u32_ty);
    let k = b.entry_return(u32_ty);
    let one = b.literal(1);
    let sum = b.binary_op(Op::Add, x, one);
    let body = b.application(k, &[sum]);
    b.function(&[x, k], body)
}

/// `g = fn(f, y, k2): f(y, k2)`.
fn apply_fn(b: &mut Builder) -> NodeId {
    let u32_ty = b.uint_type(32);
    let k_ty = b.fn_type(&[u32_ty]);
    let f_ty = b.fn_type(&[u32_ty, k_ty]);
    let f = b.parameter(f_ty);
    let y = b.parameter(u32_ty);
    let k2 = b.parameter(k_ty);
    let body = b.application(f, &[y, k2]);
    b.function(&[f, y, k2], body)
}

#[test]
fn pipeline_specializes_direct_higher_order_calls() {
    let mut b = Builder::new();
    let add_one = add_one(&mut b);
    let g = apply_fn(&mut b);

    // entry = fn(ret): g(addOne, 5, ret)
    let u32_ty = b.uint_type(32);
    let ret = b.entry_return(u32_ty);
    let five = b.literal(5);
    let entry_body = b.application(g, &[add_one, five, ret]);
    let entry = b.function(&[ret], entry_body);
    b.set_external_name(entry, "main");

    let specialized = Assembled::new(b, entry).supercompile();
    assert_eq!(specialized.specialized, 1);

    let first_order = specialized.defunctionalize();
    first_order.verify().expect("first-order graph is well-formed");

    // The supercompiler already removed the only literal function value, so
    // there was nothing left to tag.
    assert!(first_order.tags.is_empty());

    // Every non-foreign parameter is first-order now.
    let b = &first_order.builder;
    for f in b.reachable_functions() {
        if b.node(f).external.is_some() {
            continue;
        }
        for &slot in b.node(f).params() {
            let slot_ty = b.node(slot).ty.unwrap();
            assert!(!matches!(b.node(slot_ty).kind, NodeKind::FnType));
        }
    }

    let rendered = first_order.render();
    assert!(rendered.contains("main #("));
    assert!(rendered.contains("-> \u{22a5}:"));

    let dot = first_order.render_graph();
    assert!(dot.starts_with("digraph ir {"));
    assert!(dot.contains("-> "));
}

#[test]
fn pipeline_defunctionalizes_branching_call_sites() {
    let mut b = Builder::new();
    let add_one = add_one(&mut b);

    // addTwo = fn(x2, k3): k3(x2 + 2)
    let u32_ty = b.uint_type(32);
    let x2 = b.parameter(u32_ty);
    let k3 = b.entry_return(u32_ty);
    let two = b.literal(2);
    let sum2 = b.binary_op(Op::Add, x2, two);
    let add_two_body = b.application(k3, &[sum2]);
    let add_two = b.function(&[x2, k3], add_two_body);

    let g = apply_fn(&mut b);

    // entry = fn(ret): case 0 [ 0 => g(addOne, 5, ret), 1 => g(addTwo, 6, ret) ]
    // Call sites under a Case are outside the supercompiler's current
    // scope, so both function values survive into defunctionalization.
    let ret = b.entry_return(u32_ty);
    let zero = b.literal(0);
    let one = b.literal(1);
    let five = b.literal(5);
    let six = b.literal(6);
    let branch_a = b.application(g, &[add_one, five, ret]);
    let branch_b = b.application(g, &[add_two, six, ret]);
    let entry_body = b.case_split(zero, &[(zero, branch_a), (one, branch_b)]);
    let entry = b.function(&[ret], entry_body);
    b.set_external_name(entry, "main");

    let specialized = Assembled::new(b, entry).supercompile();
    assert_eq!(specialized.specialized, 0);

    let first_order = specialized.defunctionalize();
    first_order.verify().expect("first-order graph is well-formed");

    // Both continuations were tagged and one dispatcher serves them.
    assert_eq!(first_order.tags.len(), 2);
    let b = &first_order.builder;
    assert_eq!(first_order.tags.get(&(add_one.0 as u64)), Some(&add_one));
    assert_eq!(first_order.tags.get(&(add_two.0 as u64)), Some(&add_two));

    let rendered = first_order.render();
    assert!(rendered.contains("_App #("));
    assert!(!rendered.contains("_App2"));

    // g's body dispatches on its integer parameter.
    let g_body = b.node(g).body();
    let dispatch = b.node(g_body).callee();
    assert!(matches!(b.node(dispatch).kind, NodeKind::Function));
    assert!(b.node(dispatch).external.is_some());
    let dispatch_body = b.node(dispatch).body();
    assert!(matches!(b.node(dispatch_body).kind, NodeKind::Case));
    assert_eq!(b.node(dispatch_body).arms().count(), 2);
}

#[test]
fn pipeline_is_deterministic() {
    // Two identical runs produce identical rendered output: hash-consing
    // and the ordered tables leave no iteration-order freedom.
    let build = || {
        let mut b = Builder::new();
        let add_one = add_one(&mut b);
        let g = apply_fn(&mut b);
        let u32_ty = b.uint_type(32);
        let ret = b.entry_return(u32_ty);
        let five = b.literal(5);
        let entry_body = b.application(g, &[add_one, five, ret]);
        let entry = b.function(&[ret], entry_body);
        b.set_external_name(entry, "main");
        Assembled::new(b, entry)
            .supercompile()
            .defunctionalize()
            .render()
    };
    assert_eq!(build(), build());
}
