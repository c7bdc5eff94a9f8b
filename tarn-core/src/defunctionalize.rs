//! Defunctionalization: eliminate first-class function values.
//!
//! Required before targeting environments without closures. Three sweeps
//! over the functions reachable from the registered roots:
//!
//! 1. Every Application argument that is a literal Function reference is
//!    replaced by the function's generation id, an integer tag, and the
//!    (tag, callee) correspondence is recorded.
//! 2. Every function-typed parameter of a non-exempt Function is replaced
//!    by a fresh plain-integer parameter. Functions with a fixed external
//!    (foreign) contract are exempt.
//! 3. A synthetic dispatch function `_App` is built per payload arity: a
//!    Case over the tag with one arm per distinct recorded tag, in
//!    ascending tag order, each arm re-invoking the tag's original callee
//!    with the payload parameters. Invocations through a rewritten integer
//!    parameter are routed through the dispatcher.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::debug;

use crate::builder::Builder;
use crate::node::{NodeId, NodeKind};

/// Tag value to original callee, in discovery order.
pub type TagTable = IndexMap<u64, NodeId>;

/// Run the pass over everything reachable from the Builder's roots.
/// Returns the recorded tag table.
pub fn defunctionalize(builder: &mut Builder) -> TagTable {
    let mut d = Defunctionalizer {
        builder,
        tags: IndexMap::new(),
        dispatchers: IndexMap::new(),
    };
    d.run()
}

struct Defunctionalizer<'a> {
    builder: &'a mut Builder,
    tags: TagTable,
    /// Payload arity to dispatch function.
    dispatchers: IndexMap<usize, NodeId>,
}

impl<'a> Defunctionalizer<'a> {
    fn run(&mut self) -> TagTable {
        let funcs = self.builder.reachable_functions();

        for &f in &funcs {
            self.tag_call_arguments(f);
        }

        let mut rewritten = Vec::new();
        for &f in &funcs {
            if let Some(int_params) = self.rewrite_params(f) {
                rewritten.push((f, int_params));
            }
        }

        for (f, int_params) in rewritten {
            self.route_through_dispatch(f, &int_params);
        }

        debug!(
            "defunctionalize: {} tags, {} dispatchers",
            self.tags.len(),
            self.dispatchers.len()
        );
        self.tags.clone()
    }

    // =========================================================================
    // Sweep 1: tag literal Function arguments
    // =========================================================================

    fn tag_call_arguments(&mut self, f: NodeId) {
        let body = self.builder.node(f).body();
        let mut memo = HashMap::new();
        let new_body = self.tag_rec(body, &mut memo);
        if new_body != body {
            self.builder.substitute(body, new_body, f);
        }
    }

    fn tag_rec(&mut self, at: NodeId, memo: &mut HashMap<NodeId, NodeId>) -> NodeId {
        if let Some(&r) = memo.get(&at) {
            return r;
        }
        let node = self.builder.node(at).clone();
        let result = match &node.kind {
            // A Function in value position is a separate unit; its own body
            // is rewritten when the sweep reaches it.
            NodeKind::Function | NodeKind::Parameter => at,

            NodeKind::Application => {
                // The callee slot is a direct call, not a first-class value.
                let mut children = vec![node.children[0]];
                for &arg in &node.children[1..] {
                    if matches!(self.builder.node(arg).kind, NodeKind::Function) {
                        let tag = arg.0 as u64;
                        let lit = self.builder.literal(tag);
                        self.tags.entry(tag).or_insert(arg);
                        debug!("tagged fn_{} as {}", arg.0, tag);
                        children.push(lit);
                    } else {
                        children.push(self.tag_rec(arg, memo));
                    }
                }
                if children == node.children {
                    at
                } else {
                    self.builder.rebuild(NodeKind::Application, children, node.ty)
                }
            }

            _ => {
                let children: Vec<NodeId> =
                    node.children.iter().map(|&c| self.tag_rec(c, memo)).collect();
                if children == node.children {
                    at
                } else {
                    self.builder.rebuild(node.kind.clone(), children, node.ty)
                }
            }
        };
        memo.insert(at, result);
        result
    }

    // =========================================================================
    // Sweep 2: integer parameters
    // =========================================================================

    /// Replace each function-typed parameter of `f` with a fresh integer
    /// parameter. Returns the new parameters, or None when `f` is exempt or
    /// first-order already.
    fn rewrite_params(&mut self, f: NodeId) -> Option<Vec<NodeId>> {
        if self.builder.external_name(f).is_some() {
            return None;
        }
        let params: Vec<NodeId> = self.builder.node(f).params().to_vec();
        let mut int_params = Vec::new();
        for slot in params {
            let slot_ty = self.builder.node(slot).ty.expect("BUG: parameter missing type");
            if !matches!(self.builder.node(slot_ty).kind, NodeKind::FnType) {
                continue;
            }
            let u32_ty = self.builder.uint_type(32);
            let int_param = self.builder.parameter(u32_ty);
            self.builder.substitute(slot, int_param, f);
            debug!("fn_{}: parameter {:?} rewritten to integer {:?}", f.0, slot, int_param);
            int_params.push(int_param);
        }
        if int_params.is_empty() {
            None
        } else {
            Some(int_params)
        }
    }

    // =========================================================================
    // Sweep 3: dispatch
    // =========================================================================

    /// Route every invocation through a rewritten integer parameter of `f`
    /// into the dispatch function for that arity.
    fn route_through_dispatch(&mut self, f: NodeId, int_params: &[NodeId]) {
        let ints: HashSet<NodeId> = int_params.iter().copied().collect();
        let body = self.builder.node(f).body();
        let sites = self.collect_sites(body, &ints);
        for site in sites {
            let callee = self.builder.node(site).callee();
            let args: Vec<NodeId> = self.builder.node(site).args().to_vec();
            match self.dispatcher(args.len()) {
                Some(dispatch) => {
                    let mut all_args = vec![callee];
                    all_args.extend_from_slice(&args);
                    let new_site = self.builder.application(dispatch, &all_args);
                    self.builder.substitute(site, new_site, f);
                    debug!("fn_{}: call through {:?} routed to dispatch", f.0, callee);
                }
                None => {
                    debug!(
                        "fn_{}: no dispatch targets of arity {} for call through {:?}",
                        f.0,
                        args.len(),
                        callee
                    );
                }
            }
        }
    }

    /// Applications in the body subgraph whose callee is one of `ints`.
    /// Does not descend into nested Function values.
    fn collect_sites(&self, root: NodeId, ints: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut sites = Vec::new();
        let mut stack = vec![root];
        let mut seen = HashSet::new();
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            let node = self.builder.node(n);
            if matches!(node.kind, NodeKind::Function) {
                continue;
            }
            if matches!(node.kind, NodeKind::Application) && ints.contains(&node.callee()) {
                sites.push(n);
            }
            stack.extend(node.children.iter().copied());
        }
        sites
    }

    /// The dispatch function for a payload arity, built on first use: one
    /// Case arm per distinct recorded tag of that arity, ascending, each
    /// re-invoking the tag's callee with the payload parameters. Returns
    /// None when no recorded callee has the arity.
    fn dispatcher(&mut self, arity: usize) -> Option<NodeId> {
        if let Some(&d) = self.dispatchers.get(&arity) {
            return Some(d);
        }

        let mut targets: Vec<(u64, NodeId)> = self
            .tags
            .iter()
            .filter(|(_, &callee)| self.builder.node(callee).params().len() == arity)
            .map(|(&tag, &callee)| (tag, callee))
            .collect();
        targets.sort_by_key(|&(tag, _)| tag);
        if targets.is_empty() {
            return None;
        }

        // Payload parameters typed from the first target's slots; positions
        // that are still function-typed there carry tags by now.
        let sample = targets[0].1;
        let payload_tys: Vec<NodeId> = self
            .builder
            .node(sample)
            .params()
            .iter()
            .map(|&p| self.builder.node(p).ty.expect("BUG: parameter missing type"))
            .collect();
        let u32_ty = self.builder.uint_type(32);
        let tag_param = self.builder.parameter(u32_ty);
        let payload: Vec<NodeId> = payload_tys
            .into_iter()
            .map(|ty| {
                let ty = if matches!(self.builder.node(ty).kind, NodeKind::FnType) {
                    self.builder.uint_type(32)
                } else {
                    ty
                };
                self.builder.parameter(ty)
            })
            .collect();

        let arms: Vec<(NodeId, NodeId)> = targets
            .iter()
            .map(|&(tag, callee)| {
                let pattern = self.builder.literal(tag);
                let branch = self.builder.application(callee, &payload);
                (pattern, branch)
            })
            .collect();
        let case = self.builder.case_split(tag_param, &arms);

        let mut params = vec![tag_param];
        params.extend_from_slice(&payload);
        let dispatch = self.builder.function(&params, case);
        let name = if self.dispatchers.is_empty() {
            "_App".to_string()
        } else {
            format!("_App{}", arity)
        };
        self.builder.set_external_name(dispatch, &name);
        debug!("built dispatch {} with {} arms", name, arms.len());

        self.dispatchers.insert(arity, dispatch);
        Some(dispatch)
    }
}
