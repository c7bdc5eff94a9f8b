//! Graph builder: node creation, hash-consing, substitution, cloning.
//!
//! The Builder is the sole authority over the node graph. Every node is
//! created through its constructors, deduplicated against the cons table,
//! and owned by the append-only arena for the Builder's whole lifetime.
//! Structurally equal nodes are always the same instance, with one
//! exception: Parameters are nominal and never merged, since each denotes
//! a distinct binding occurrence.
//!
//! The single mutating operation is [`Builder::substitute`]. Interior nodes
//! are never mutated in place (they may be shared with unrelated subgraphs)
//! and are reconstructed bottom-up through the cons table; only the root of
//! a substitution is spliced in place, so its identity is preserved and
//! external references to it stay valid.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use log::trace;

use crate::intern::{Symbol, SymbolTable};
use crate::node::{Node, NodeId, NodeKind, Op, Shape};
use crate::print;

/// Owner of the node graph.
pub struct Builder {
    nodes: Vec<Node>,
    cons: IndexMap<Shape, NodeId>,
    pub symbols: SymbolTable,
    /// Output-visible Functions, in registration order.
    roots: IndexMap<Symbol, NodeId>,
    kind: NodeId,
    ty: NodeId,
    prop: NodeId,
    unit: NodeId,
    bottom: NodeId,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        let mut b = Builder {
            nodes: Vec::new(),
            cons: IndexMap::new(),
            symbols: SymbolTable::new(),
            roots: IndexMap::new(),
            kind: NodeId(0),
            ty: NodeId(0),
            prop: NodeId(0),
            unit: NodeId(0),
            bottom: NodeId(0),
        };

        // Bootstrap the universe chain. Kind types itself; everything else
        // hangs off it, so `type : kind`, `prop : type`, `unit : type` hold
        // from construction.
        let kind = b.push(NodeKind::Kind, Vec::new(), None);
        b.nodes[kind.index()].ty = Some(kind);
        let shape = b.nodes[kind.index()].shape();
        b.cons.insert(shape, kind);
        debug_assert_eq!(kind, NodeId(0));

        b.kind = kind;
        b.ty = b.intern(NodeKind::Type, Vec::new(), Some(kind));
        b.prop = b.intern(NodeKind::Prop, Vec::new(), Some(b.ty));
        b.unit = b.intern(NodeKind::Unit, Vec::new(), Some(b.ty));
        b.bottom = b.intern(NodeKind::Bottom, Vec::new(), Some(b.ty));
        b
    }

    // =========================================================================
    // Arena access
    // =========================================================================

    /// Borrow a node. Panics on an id this Builder does not own.
    pub fn node(&self, id: NodeId) -> &Node {
        self.check_owned(id);
        &self.nodes[id.index()]
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn check_owned(&self, id: NodeId) {
        assert!(
            id.index() < self.nodes.len(),
            "BUG: node {:?} is not owned by this Builder",
            id
        );
    }

    /// Whether a node is the cons table's canonical instance for its shape.
    /// Parameters are nominal and always count as canonical.
    pub fn is_canonical(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if matches!(node.kind, NodeKind::Parameter) {
            return true;
        }
        self.cons.get(&node.shape()) == Some(&id)
    }

    /// Append a node without indexing it (Parameters, bootstrap).
    fn push(&mut self, kind: NodeKind, children: Vec<NodeId>, ty: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            children,
            ty,
            external: None,
        });
        id
    }

    /// Return the canonical node for a shape, creating it once.
    fn intern(&mut self, kind: NodeKind, children: Vec<NodeId>, ty: Option<NodeId>) -> NodeId {
        debug_assert!(
            !matches!(kind, NodeKind::Parameter),
            "BUG: Parameters are nominal, never interned"
        );
        let shape = Shape { kind, children, ty };
        if let Some(&id) = self.cons.get(&shape) {
            return id;
        }
        let id = self.push(shape.kind.clone(), shape.children.clone(), shape.ty);
        trace!("cons: new {:?} as {:?}", self.nodes[id.index()].kind, id);
        self.cons.insert(shape, id);
        id
    }

    /// Generic hash-consed reconstruction, for passes that rewrite nodes
    /// kind-agnostically.
    pub(crate) fn rebuild(
        &mut self,
        kind: NodeKind,
        children: Vec<NodeId>,
        ty: Option<NodeId>,
    ) -> NodeId {
        self.intern(kind, children, ty)
    }

    // =========================================================================
    // Universe and type constructors
    // =========================================================================

    pub fn kind(&self) -> NodeId {
        self.kind
    }

    pub fn type_(&self) -> NodeId {
        self.ty
    }

    pub fn prop(&self) -> NodeId {
        self.prop
    }

    pub fn unit(&self) -> NodeId {
        self.unit
    }

    pub fn bottom(&self) -> NodeId {
        self.bottom
    }

    pub fn uint_type(&mut self, bits: u32) -> NodeId {
        let ty = self.ty;
        self.intern(NodeKind::UIntType(bits), Vec::new(), Some(ty))
    }

    pub fn ptr_type(&mut self, pointee: NodeId) -> NodeId {
        let ty = self.ty;
        self.intern(NodeKind::PtrType, vec![pointee], Some(ty))
    }

    /// The type of a function taking `params`. The result type is always
    /// bottom in this calling discipline, so it is implicit.
    pub fn fn_type(&mut self, params: &[NodeId]) -> NodeId {
        let ty = self.ty;
        self.intern(NodeKind::FnType, params.to_vec(), Some(ty))
    }

    pub fn tuple(&mut self, elems: &[NodeId]) -> NodeId {
        let ty = self.ty;
        self.intern(NodeKind::Tuple, elems.to_vec(), Some(ty))
    }

    /// The fixpoint combinator value ("Z"). Type-opaque: the checker that
    /// assigns its per-use type runs upstream of this layer.
    pub fn fix(&mut self) -> NodeId {
        self.intern(NodeKind::Fix, Vec::new(), None)
    }

    // =========================================================================
    // Value constructors
    // =========================================================================

    /// Canonical 64-bit literal, typed as a 32-bit unsigned integer.
    pub fn literal(&mut self, value: u64) -> NodeId {
        let ty = self.uint_type(32);
        self.intern(NodeKind::Literal(value), Vec::new(), Some(ty))
    }

    fn literal_value(&self, id: NodeId) -> Option<u64> {
        match self.node(id).kind {
            NodeKind::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Canonical binary operation. Peephole identities on literal operands
    /// are applied first; the result type equals the left operand's type.
    /// Operand types must already be unified upstream.
    pub fn binary_op(&mut self, op: Op, lhs: NodeId, rhs: NodeId) -> NodeId {
        let lv = self.literal_value(lhs);
        let rv = self.literal_value(rhs);
        match op {
            Op::Add => {
                if lv == Some(0) {
                    return rhs;
                }
                if rv == Some(0) {
                    return lhs;
                }
            }
            Op::Sub => {
                if rv == Some(0) {
                    return lhs;
                }
            }
            Op::Mul => {
                if lv == Some(0) || rv == Some(0) {
                    return self.literal(0);
                }
                if lv == Some(1) {
                    return rhs;
                }
                if rv == Some(1) {
                    return lhs;
                }
            }
            _ => {}
        }
        debug_assert_eq!(
            self.node(lhs).ty,
            self.node(rhs).ty,
            "BUG: binary_op operand types must be unified upstream"
        );
        let ty = self.node(lhs).ty;
        self.intern(NodeKind::BinaryOp(op), vec![lhs, rhs], ty)
    }

    /// Fresh nominal parameter. Two calls with the same type yield two
    /// distinct nodes: a Parameter denotes a binding occurrence, not a
    /// shape. When `ty` is a function type the result is wrapped in
    /// ConstexprAnnotation, marking it specialization-eligible.
    pub fn parameter(&mut self, ty: NodeId) -> NodeId {
        self.check_owned(ty);
        let id = self.push(NodeKind::Parameter, Vec::new(), Some(ty));
        if matches!(self.node(ty).kind, NodeKind::FnType) {
            return self.constexpr_annotate(id);
        }
        id
    }

    /// Mark a parameter as specialization-eligible.
    pub fn constexpr_annotate(&mut self, param: NodeId) -> NodeId {
        assert!(
            matches!(self.node(param).kind, NodeKind::Parameter),
            "BUG: constexpr_annotate requires a Parameter"
        );
        let ty = self.node(param).ty;
        self.intern(NodeKind::ConstexprAnnotation, vec![param], ty)
    }

    /// The explicit return continuation for a program entry: a
    /// specialization-eligible parameter of type `(result) -> bottom`.
    pub fn entry_return(&mut self, result_ty: NodeId) -> NodeId {
        let k_ty = self.fn_type(&[result_ty]);
        self.parameter(k_ty)
    }

    /// Canonical function. Parameter slots take Parameter or
    /// ConstexprAnnotation nodes; the body must be an Application or a
    /// Case. Nullary functions take a synthetic unit parameter.
    pub fn function(&mut self, params: &[NodeId], body: NodeId) -> NodeId {
        assert!(
            !params.is_empty(),
            "BUG: Function requires at least one parameter (pass a synthetic unit parameter)"
        );
        for &p in params {
            assert!(
                matches!(
                    self.node(p).kind,
                    NodeKind::Parameter | NodeKind::ConstexprAnnotation
                ),
                "BUG: Function parameter slots take Parameter or ConstexprAnnotation nodes"
            );
        }
        assert!(
            matches!(self.node(body).kind, NodeKind::Application | NodeKind::Case),
            "BUG: Function body must be an Application or a Case"
        );
        let param_tys: Vec<NodeId> = params
            .iter()
            .map(|&p| self.node(p).ty.expect("BUG: parameter missing type"))
            .collect();
        let fty = self.fn_type(&param_tys);
        let mut children = params.to_vec();
        children.push(body);
        self.intern(NodeKind::Function, children, Some(fty))
    }

    /// Canonical application, typed bottom.
    pub fn application(&mut self, callee: NodeId, args: &[NodeId]) -> NodeId {
        let mut children = vec![callee];
        children.extend_from_slice(args);
        let ty = self.bottom;
        self.intern(NodeKind::Application, children, Some(ty))
    }

    /// Canonical case split over (pattern, branch) pairs, typed bottom.
    pub fn case_split(&mut self, scrutinee: NodeId, arms: &[(NodeId, NodeId)]) -> NodeId {
        assert!(!arms.is_empty(), "BUG: Case requires at least one arm");
        let mut children = vec![scrutinee];
        for &(pattern, branch) in arms {
            children.push(pattern);
            children.push(branch);
        }
        let ty = self.bottom;
        self.intern(NodeKind::Case, children, Some(ty))
    }

    /// Canonical named data constructor applied to `args`.
    pub fn constructor(&mut self, name: &str, args: &[NodeId], ty: NodeId) -> NodeId {
        let sym = self.symbols.intern(name);
        self.intern(NodeKind::Constructor(sym), args.to_vec(), Some(ty))
    }

    // =========================================================================
    // External names
    // =========================================================================

    /// Mark a Function as output-visible and register it as a root.
    pub fn set_external_name(&mut self, f: NodeId, name: &str) {
        assert!(
            matches!(self.node(f).kind, NodeKind::Function),
            "BUG: external names attach to Function nodes"
        );
        let sym = self.symbols.intern(name);
        self.nodes[f.index()].external = Some(sym);
        self.roots.insert(sym, f);
    }

    pub fn external_name(&self, f: NodeId) -> Option<Symbol> {
        self.node(f).external
    }

    /// Registered output-visible Functions, in registration order.
    pub fn roots(&self) -> impl Iterator<Item = (Symbol, NodeId)> + '_ {
        self.roots.iter().map(|(&sym, &id)| (sym, id))
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// True iff `x` occurs nowhere in the subgraph rooted at `within`.
    /// Children and typing edges both count as occurrences.
    pub fn is_free(&self, x: NodeId, within: NodeId) -> bool {
        self.check_owned(x);
        self.check_owned(within);
        let mut seen = HashSet::new();
        !self.occurs(x, within, &mut seen)
    }

    fn occurs(&self, x: NodeId, at: NodeId, seen: &mut HashSet<NodeId>) -> bool {
        if at == x {
            return true;
        }
        if !seen.insert(at) {
            return false;
        }
        let node = &self.nodes[at.index()];
        node.children
            .iter()
            .chain(node.ty.iter())
            .any(|&c| self.occurs(x, c, seen))
    }

    /// Nodes reachable from `start` through child and typing edges, in
    /// breadth-first discovery order.
    pub fn reachable(&self, start: &[NodeId]) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeId> = start.iter().copied().collect();
        while let Some(n) = queue.pop_front() {
            if !seen.insert(n) {
                continue;
            }
            self.check_owned(n);
            order.push(n);
            let node = &self.nodes[n.index()];
            queue.extend(node.children.iter().copied());
            if let Some(t) = node.ty {
                queue.push_back(t);
            }
        }
        order
    }

    /// Functions reachable from the registered roots.
    pub fn reachable_functions(&self) -> Vec<NodeId> {
        let roots: Vec<NodeId> = self.roots.values().copied().collect();
        self.reachable(&roots)
            .into_iter()
            .filter(|&n| matches!(self.nodes[n.index()].kind, NodeKind::Function))
            .collect()
    }

    // =========================================================================
    // Substitution
    // =========================================================================

    /// Replace every occurrence of `what` with `with` reachable from
    /// `within`, returning `within`.
    ///
    /// Interior nodes are reconstructed bottom-up through the cons table.
    /// Only `within` itself is spliced in place: its stale cons entry is
    /// removed and it is re-indexed under its new shape, so its identity is
    /// preserved and every external reference to it stays valid. A Function
    /// root additionally gets its type re-derived from its (possibly new)
    /// parameter slots.
    pub fn substitute(&mut self, what: NodeId, with: NodeId, within: NodeId) -> NodeId {
        self.check_owned(what);
        self.check_owned(with);
        self.check_owned(within);
        if within == what {
            return with;
        }

        let mut memo = HashMap::new();
        memo.insert(what, with);

        let old_children = self.nodes[within.index()].children.clone();
        let old_ty = self.nodes[within.index()].ty;
        let new_children: Vec<NodeId> = old_children
            .iter()
            .map(|&c| self.rewrite(c, &mut memo))
            .collect();
        let new_ty = match old_ty {
            Some(t) => Some(self.rewrite(t, &mut memo)),
            None => None,
        };
        if new_children == old_children && new_ty == old_ty {
            return within;
        }
        self.splice(within, new_children, new_ty);
        within
    }

    fn rewrite(&mut self, at: NodeId, memo: &mut HashMap<NodeId, NodeId>) -> NodeId {
        if let Some(&r) = memo.get(&at) {
            return r;
        }
        // Provisional identity: breaks the universe self-typing cycle.
        memo.insert(at, at);

        let node = self.nodes[at.index()].clone();
        if matches!(node.kind, NodeKind::Parameter) {
            return at;
        }
        let children: Vec<NodeId> = node.children.iter().map(|&c| self.rewrite(c, memo)).collect();
        let ty = match node.ty {
            Some(t) => Some(self.rewrite(t, memo)),
            None => None,
        };
        let result = if children == node.children && ty == node.ty {
            at
        } else {
            self.intern(node.kind, children, ty)
        };
        memo.insert(at, result);
        result
    }

    /// Update a root's children in place and re-index it.
    fn splice(&mut self, root: NodeId, children: Vec<NodeId>, ty: Option<NodeId>) {
        let old_shape = self.nodes[root.index()].shape();
        if self.cons.get(&old_shape) == Some(&root) {
            self.cons.shift_remove(&old_shape);
        }

        {
            let node = &mut self.nodes[root.index()];
            node.children = children;
            node.ty = ty;
        }

        // A Function's type tracks its parameter slots.
        if matches!(self.nodes[root.index()].kind, NodeKind::Function) {
            let param_tys: Vec<NodeId> = {
                let node = &self.nodes[root.index()];
                node.children[..node.children.len() - 1]
                    .iter()
                    .map(|&p| self.nodes[p.index()].ty.expect("BUG: parameter missing type"))
                    .collect()
            };
            let fty = self.fn_type(&param_tys);
            self.nodes[root.index()].ty = Some(fty);
        }

        if !matches!(self.nodes[root.index()].kind, NodeKind::Parameter) {
            let new_shape = self.nodes[root.index()].shape();
            let prev = self.cons.insert(new_shape, root);
            // Nominal parameter children keep Function shapes distinct, so a
            // collision here would mean two structurally equal instances.
            debug_assert!(
                prev.is_none() || prev == Some(root),
                "BUG: substitution produced a shape collision at the root"
            );
        }
    }

    // =========================================================================
    // Cloning
    // =========================================================================

    /// Structurally fresh copy of the subgraph rooted at `node`.
    ///
    /// `mapping` carries old-to-new Parameter replacements, so bound
    /// occurrences of already-renamed parameters stay consistent across
    /// clone calls. Reaching a Parameter that is not mapped is a fatal
    /// error: a clone must introduce fresh binders explicitly, never
    /// silently duplicate one. Subtrees that contain no mapped Parameter
    /// dedupe back to their canonical nodes through the cons table.
    pub fn clone_subgraph(
        &mut self,
        node: NodeId,
        mapping: &mut HashMap<NodeId, NodeId>,
    ) -> NodeId {
        self.check_owned(node);
        self.clone_rec(node, mapping)
    }

    fn clone_rec(&mut self, at: NodeId, memo: &mut HashMap<NodeId, NodeId>) -> NodeId {
        if let Some(&r) = memo.get(&at) {
            return r;
        }
        memo.insert(at, at);

        let node = self.nodes[at.index()].clone();
        if matches!(node.kind, NodeKind::Parameter) {
            panic!("BUG: cloned an unmapped Parameter {:?}", at);
        }
        let children: Vec<NodeId> = node
            .children
            .iter()
            .map(|&c| self.clone_rec(c, memo))
            .collect();
        let ty = match node.ty {
            Some(t) => Some(self.clone_rec(t, memo)),
            None => None,
        };
        let result = if children == node.children && ty == node.ty {
            at
        } else {
            self.intern(node.kind, children, ty)
        };
        memo.insert(at, result);
        result
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render reachable Function definitions as linear pseudocode.
    pub fn print(&self) -> String {
        print::render(self)
    }

    /// Render the reachable graph in Graphviz DOT form.
    pub fn print_graph(&self) -> String {
        print::render_graph(self)
    }
}
