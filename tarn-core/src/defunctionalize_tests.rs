#![cfg(test)]

use crate::builder::Builder;
use crate::defunctionalize::defunctionalize;
use crate::node::{NodeId, NodeKind, Op};
use crate::print;

/// `exit = fn(v, kx): kx(v)`, registered as a foreign contract so the
/// defunctionalizer leaves its signature alone.
fn exit_fn(b: &mut Builder) -> NodeId {
    let u32_ty = b.uint_type(32);
    let v = b.parameter(u32_ty);
    let kx_ty = b.fn_type(&[u32_ty]);
    let kx = b.parameter(kx_ty);
    let body = b.application(kx, &[v]);
    let exit = b.function(&[v, kx], body);
    b.set_external_name(exit, "exit");
    exit
}

/// A one-argument continuation `fn(r): case r [ match_val => exit(r, Z) ]`.
fn continuation(b: &mut Builder, exit: NodeId, match_val: u64) -> NodeId {
    let u32_ty = b.uint_type(32);
    let r = b.parameter(u32_ty);
    let z = b.fix();
    let pattern = b.literal(match_val);
    let call_exit = b.application(exit, &[r, z]);
    let body = b.case_split(r, &[(pattern, call_exit)]);
    b.function(&[r], body)
}

#[test]
fn tags_arguments_and_builds_dispatch() {
    let mut b = Builder::new();
    let exit = exit_fn(&mut b);
    let done = continuation(&mut b, exit, 7);

    // carrier = fn(kc): kc(7)
    let u32_ty = b.uint_type(32);
    let kc = b.entry_return(u32_ty);
    let seven = b.literal(7);
    let carrier_body = b.application(kc, &[seven]);
    let carrier = b.function(&[kc], carrier_body);

    // entry = fn(ret): carrier(done)
    let ret = b.entry_return(u32_ty);
    let entry_body = b.application(carrier, &[done]);
    let entry = b.function(&[ret], entry_body);
    b.set_external_name(entry, "main");

    let tags = defunctionalize(&mut b);

    // The literal function argument became its generation id.
    assert_eq!(tags.len(), 1);
    assert_eq!(tags.get(&(done.0 as u64)), Some(&done));
    let new_entry_body = b.node(entry).body();
    let arg = b.node(new_entry_body).args()[0];
    assert!(matches!(b.node(arg).kind, NodeKind::Literal(_)));
    assert_eq!(b.node(arg).kind, NodeKind::Literal(done.0 as u64));

    // carrier's continuation parameter is now a plain integer.
    let slot = b.node(carrier).params()[0];
    assert!(matches!(b.node(slot).kind, NodeKind::Parameter));
    let slot_ty = b.node(slot).ty.unwrap();
    assert!(matches!(b.node(slot_ty).kind, NodeKind::UIntType(32)));

    // The former higher-order call routes through the dispatch function.
    let carrier_call = b.node(carrier).body();
    let dispatch = b.node(carrier_call).callee();
    assert!(matches!(b.node(dispatch).kind, NodeKind::Function));
    assert_eq!(print::function_name(&b, dispatch), "_App");
    assert_eq!(b.node(carrier_call).args().to_vec(), vec![slot, seven]);

    // The dispatch body is a Case over the tag with one arm per recorded
    // tag, re-invoking the original callee.
    let dispatch_body = b.node(dispatch).body();
    assert!(matches!(b.node(dispatch_body).kind, NodeKind::Case));
    let arms: Vec<(NodeId, NodeId)> = b.node(dispatch_body).arms().collect();
    assert_eq!(arms.len(), 1);
    let (pattern, branch) = arms[0];
    assert_eq!(b.node(pattern).kind, NodeKind::Literal(done.0 as u64));
    assert_eq!(b.node(branch).callee(), done);

    // Foreign contracts keep their shape.
    let exit_k = b.node(exit).params()[1];
    assert!(matches!(b.node(exit_k).kind, NodeKind::ConstexprAnnotation));
}

#[test]
fn dispatch_arms_are_ordered_by_ascending_tag() {
    let mut b = Builder::new();
    let exit = exit_fn(&mut b);
    let done1 = continuation(&mut b, exit, 1);
    let done2 = continuation(&mut b, exit, 2);
    assert!(done1.0 < done2.0);

    // carrier = fn(ka, kb): case 0 [ 0 => ka(1), 1 => kb(2) ]
    let u32_ty = b.uint_type(32);
    let ka = b.entry_return(u32_ty);
    let kb = b.entry_return(u32_ty);
    let zero = b.literal(0);
    let one = b.literal(1);
    let two = b.literal(2);
    let call_a = b.application(ka, &[one]);
    let call_b = b.application(kb, &[two]);
    let carrier_body = b.case_split(zero, &[(zero, call_a), (one, call_b)]);
    let carrier = b.function(&[ka, kb], carrier_body);

    // entry = fn(ret): carrier(done2, done1), deliberately passing the
    // later-created continuation first.
    let ret = b.entry_return(u32_ty);
    let entry_body = b.application(carrier, &[done2, done1]);
    let entry = b.function(&[ret], entry_body);
    b.set_external_name(entry, "main");

    let tags = defunctionalize(&mut b);
    assert_eq!(tags.len(), 2);

    // One dispatcher serves both call sites; its arms come out in
    // ascending tag order regardless of discovery order.
    let branches: Vec<NodeId> = {
        let body = b.node(carrier).body();
        b.node(body).arms().map(|(_, branch)| branch).collect()
    };
    let dispatch = b.node(branches[0]).callee();
    assert_eq!(b.node(branches[1]).callee(), dispatch);
    assert_eq!(print::function_name(&b, dispatch), "_App");

    let dispatch_body = b.node(dispatch).body();
    let patterns: Vec<NodeKind> = b
        .node(dispatch_body)
        .arms()
        .map(|(pattern, _)| b.node(pattern).kind.clone())
        .collect();
    assert_eq!(
        patterns,
        vec![
            NodeKind::Literal(done1.0 as u64),
            NodeKind::Literal(done2.0 as u64)
        ]
    );
    let callees: Vec<NodeId> = b
        .node(dispatch_body)
        .arms()
        .map(|(_, branch)| b.node(branch).callee())
        .collect();
    assert_eq!(callees, vec![done1, done2]);
}

#[test]
fn no_higher_order_values_remain_outside_foreign_contracts() {
    let mut b = Builder::new();
    let exit = exit_fn(&mut b);
    let done = continuation(&mut b, exit, 7);

    let u32_ty = b.uint_type(32);
    let kc = b.entry_return(u32_ty);
    let seven = b.literal(7);
    let carrier_body = b.application(kc, &[seven]);
    let carrier = b.function(&[kc], carrier_body);

    let ret = b.entry_return(u32_ty);
    let entry_body = b.application(carrier, &[done]);
    let entry = b.function(&[ret], entry_body);
    b.set_external_name(entry, "main");

    defunctionalize(&mut b);

    for f in b.reachable_functions() {
        if b.node(f).external.is_some() {
            continue;
        }
        for &slot in b.node(f).params() {
            let slot_ty = b.node(slot).ty.unwrap();
            assert!(
                !matches!(b.node(slot_ty).kind, NodeKind::FnType),
                "function-typed parameter survived on fn_{}",
                f.0
            );
        }
        // No Application argument is a literal Function any more.
        let body = b.node(f).body();
        for n in b.reachable(&[body]) {
            if matches!(b.node(n).kind, NodeKind::Application) {
                for &arg in b.node(n).args() {
                    assert!(!matches!(b.node(arg).kind, NodeKind::Function));
                }
            }
        }
    }
}

#[test]
fn unused_higher_order_parameter_still_becomes_integer() {
    let mut b = Builder::new();

    // sink = fn(kc, x): noop(x)   never invokes kc, so no dispatch is
    // needed, but the parameter must still lose its function type.
    let u32_ty = b.uint_type(32);
    let noop_x = b.parameter(u32_ty);
    let noop_k = b.entry_return(u32_ty);
    let noop_body = b.application(noop_k, &[noop_x]);
    let noop = b.function(&[noop_x, noop_k], noop_body);
    b.set_external_name(noop, "noop");

    let kc = b.entry_return(u32_ty);
    let x = b.parameter(u32_ty);
    let sink_body = b.application(noop, &[x, kc]);
    let sink = b.function(&[kc, x], sink_body);

    let ret = b.entry_return(u32_ty);
    let five = b.literal(5);
    let entry_body = b.application(sink, &[ret, five]);
    let entry = b.function(&[ret], entry_body);
    b.set_external_name(entry, "main");

    let tags = defunctionalize(&mut b);
    assert!(tags.is_empty());

    let slot = b.node(sink).params()[0];
    assert!(matches!(b.node(slot).kind, NodeKind::Parameter));
    let slot_ty = b.node(slot).ty.unwrap();
    assert!(matches!(b.node(slot_ty).kind, NodeKind::UIntType(32)));
}

#[test]
fn op_symbols_render_in_dispatch_output() {
    // Rendering sanity for a defunctionalized program: the dispatcher and
    // its case arms show up in the linear form.
    let mut b = Builder::new();
    let exit = exit_fn(&mut b);
    let done = continuation(&mut b, exit, 7);

    let u32_ty = b.uint_type(32);
    let kc = b.entry_return(u32_ty);
    let three = b.literal(3);
    let four = b.literal(4);
    let sum = b.binary_op(Op::Add, three, four);
    let carrier_body = b.application(kc, &[sum]);
    let carrier = b.function(&[kc], carrier_body);

    let ret = b.entry_return(u32_ty);
    let entry_body = b.application(carrier, &[done]);
    let entry = b.function(&[ret], entry_body);
    b.set_external_name(entry, "main");

    defunctionalize(&mut b);
    let rendered = b.print();
    assert!(rendered.contains("_App"));
    assert!(rendered.contains("case"));
    assert!(rendered.contains("3 + 4"));
}
