//! Call-site specialization to a whole-program fixpoint.
//!
//! Removes indirect and higher-order call overhead: when a callee marks a
//! parameter as compile-time (ConstexprAnnotation) and a call site binds it
//! to a statically known value, the callee body is cloned with the value
//! substituted in and the call is rewritten against the narrowed interface.
//! Each specialization strictly shrinks the new callee's parameter count,
//! the visited set blocks reprocessing, and hash-consing caps duplication,
//! so the worklist empties in finitely many steps.

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;

use crate::builder::Builder;
use crate::node::{NodeId, NodeKind};

/// Run the specializer from `entry` to a fixpoint.
/// Returns the number of call sites specialized.
pub fn supercompile(builder: &mut Builder, entry: NodeId) -> usize {
    let mut sc = Supercompiler {
        builder,
        worklist: VecDeque::new(),
        visited: HashSet::new(),
        specialized: 0,
    };
    sc.run(entry)
}

struct Supercompiler<'a> {
    builder: &'a mut Builder,
    worklist: VecDeque<NodeId>,
    visited: HashSet<NodeId>,
    specialized: usize,
}

impl<'a> Supercompiler<'a> {
    fn run(&mut self, entry: NodeId) -> usize {
        self.worklist.push_back(entry);
        while let Some(f) = self.worklist.pop_front() {
            if self.visited.contains(&f) {
                continue;
            }
            if !matches!(self.builder.node(f).kind, NodeKind::Function) {
                continue;
            }
            self.visited.insert(f);
            self.process(f);
        }
        debug!("supercompile: {} call sites specialized", self.specialized);
        self.specialized
    }

    fn process(&mut self, f: NodeId) {
        let body = self.builder.node(f).body();
        match self.builder.node(body).kind {
            NodeKind::Application => {
                let new_body = self.specialize_application(body);
                if new_body != body {
                    self.builder.substitute(body, new_body, f);
                    self.visited.remove(&f);
                    self.worklist.push_back(f);
                }
            }
            NodeKind::Case => {
                // The scrutinee itself is not specialized; arms are still
                // walked for reachable functions.
                let branches: Vec<NodeId> =
                    self.builder.node(body).arms().map(|(_, branch)| branch).collect();
                for branch in branches {
                    self.enqueue_functions_in(branch);
                }
            }
            _ => panic!("BUG: Function body must be an Application or a Case"),
        }
    }

    /// Specialize one call site, or return it unchanged. Function-kind
    /// immediate children of the resulting Application are enqueued either
    /// way.
    fn specialize_application(&mut self, app: NodeId) -> NodeId {
        let callee = self.builder.node(app).callee();
        let args: Vec<NodeId> = self.builder.node(app).args().to_vec();

        let positions = if matches!(self.builder.node(callee).kind, NodeKind::Function) {
            self.specializable_positions(callee, &args)
        } else {
            Vec::new()
        };

        if positions.is_empty() {
            self.enqueue_function_children(app);
            return app;
        }

        let params: Vec<NodeId> = self.builder.node(callee).params().to_vec();
        let body = self.builder.node(callee).body();

        // Fresh binders for every slot; specialized slots get placeholders
        // that the call arguments are substituted for after cloning.
        let mut mapping = HashMap::new();
        let mut kept_params = Vec::new();
        let mut kept_args = Vec::new();
        let mut pending = Vec::new();
        for (i, (&slot, &arg)) in params.iter().zip(args.iter()).enumerate() {
            let (new_slot, old_inner, new_inner) = self.fresh_binder(slot);
            mapping.insert(old_inner, new_inner);
            if positions.contains(&i) {
                pending.push((new_slot, arg));
            } else {
                kept_params.push(new_slot);
                kept_args.push(arg);
            }
        }

        let mut cloned = self.builder.clone_subgraph(body, &mut mapping);
        for (placeholder, arg) in pending {
            cloned = self.builder.substitute(placeholder, arg, cloned);
        }

        // A fully specialized callee still needs its synthetic unit
        // parameter.
        if kept_params.is_empty() {
            let unit = self.builder.unit();
            kept_params.push(self.builder.parameter(unit));
            kept_args.push(self.builder.unit());
        }

        let new_fn = self.builder.function(&kept_params, cloned);
        let new_app = self.builder.application(new_fn, &kept_args);
        self.specialized += 1;
        debug!(
            "specialized call to fn_{}: fn_{} with {} of {} parameters inlined",
            callee.0,
            new_fn.0,
            positions.len(),
            params.len()
        );
        self.enqueue_function_children(new_app);
        new_app
    }

    /// Marked parameter positions whose call argument is statically known.
    /// The marker only says the argument may be treated as a compile-time
    /// constant; an argument that is itself a parameter is not one.
    fn specializable_positions(&self, callee: NodeId, args: &[NodeId]) -> Vec<usize> {
        let params = self.builder.node(callee).params();
        assert_eq!(
            params.len(),
            args.len(),
            "BUG: call arity mismatch: fn_{} takes {} parameters, got {} arguments",
            callee.0,
            params.len(),
            args.len()
        );
        let mut positions = Vec::new();
        for (i, (&slot, &arg)) in params.iter().zip(args.iter()).enumerate() {
            if matches!(self.builder.node(slot).kind, NodeKind::ConstexprAnnotation)
                && self.is_static(arg)
            {
                positions.push(i);
            }
        }
        positions
    }

    fn is_static(&self, n: NodeId) -> bool {
        matches!(
            self.builder.node(n).kind,
            NodeKind::Function | NodeKind::Literal(_) | NodeKind::Fix
        )
    }

    /// Fresh binder of the same shape and type as `slot`. Returns the new
    /// slot plus the old and new inner Parameters for the clone mapping.
    fn fresh_binder(&mut self, slot: NodeId) -> (NodeId, NodeId, NodeId) {
        match self.builder.node(slot).kind {
            NodeKind::ConstexprAnnotation => {
                let old_inner = self.builder.node(slot).children[0];
                let ty = self
                    .builder
                    .node(old_inner)
                    .ty
                    .expect("BUG: parameter missing type");
                let fresh = self.builder.parameter(ty);
                let new_slot = if matches!(
                    self.builder.node(fresh).kind,
                    NodeKind::ConstexprAnnotation
                ) {
                    fresh
                } else {
                    self.builder.constexpr_annotate(fresh)
                };
                let new_inner = self.builder.node(new_slot).children[0];
                (new_slot, old_inner, new_inner)
            }
            NodeKind::Parameter => {
                let ty = self.builder.node(slot).ty.expect("BUG: parameter missing type");
                let new_slot = self.builder.parameter(ty);
                (new_slot, slot, new_slot)
            }
            _ => panic!("BUG: Function parameter slot is not a binder"),
        }
    }

    fn enqueue_function_children(&mut self, app: NodeId) {
        let children = self.builder.node(app).children.clone();
        for c in children {
            if matches!(self.builder.node(c).kind, NodeKind::Function) {
                self.worklist.push_back(c);
            }
        }
    }

    /// Walk a subgraph and enqueue every Function node found.
    fn enqueue_functions_in(&mut self, root: NodeId) {
        let mut stack = vec![root];
        let mut seen = HashSet::new();
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            let node = self.builder.node(n);
            if matches!(node.kind, NodeKind::Function) {
                self.worklist.push_back(n);
            }
            stack.extend(node.children.iter().copied());
        }
    }
}
