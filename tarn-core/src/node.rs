//! IR node model.
//!
//! A node is a tagged variant with a fixed child arity per kind, an optional
//! typing edge (every node may be typed by another node), and a payload for
//! the kinds that carry one. Nodes are created only through the
//! [`Builder`](crate::builder::Builder) and live in its append-only arena
//! for the Builder's whole lifetime.

use crate::intern::Symbol;

/// A unique identifier for IR nodes.
///
/// Doubles as the node's generation id: ids are handed out monotonically by
/// the owning Builder, so they are usable for naming (`fn_7`, `p3`) and as
/// defunctionalization tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Binary operator carried by a `BinaryOp` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lt,
}

impl Op {
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Eq => "==",
            Op::Lt => "<",
        }
    }
}

/// The kind of node.
///
/// Children live in [`Node::children`]; the variants carry only the
/// kind-specific payload. Child layout per kind:
///
/// - `PtrType`: `[pointee]`
/// - `FnType`: parameter types (the result is always bottom, so the
///   parameter list fully determines the arrow)
/// - `Tuple`: elements
/// - `BinaryOp`: `[lhs, rhs]`
/// - `ConstexprAnnotation`: `[parameter]`
/// - `Constructor`: argument values
/// - `Function`: parameters, then the body last
/// - `Application`: callee, then arguments
/// - `Case`: scrutinee, then alternating (pattern, branch) pairs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Top universe. Self-typed at bootstrap.
    Kind,
    /// Universe of types, typed by `Kind`.
    Type,
    /// Universe of propositions, typed by `Type`.
    Prop,
    /// The unit type.
    Unit,
    /// The uninhabited bottom type. Every Function and Application is typed
    /// by it: functions never return, they invoke a continuation.
    Bottom,
    /// Unsigned integer type of the given bit width.
    UIntType(u32),
    /// Pointer type.
    PtrType,
    /// Function type. A value of this type is eligible for specialization
    /// when bound to a marked parameter.
    FnType,
    /// Tuple of types or values.
    Tuple,
    /// The explicit fixpoint combinator ("Z"). Recursion is expressed by
    /// applying it to a helper function, never by graph back-edges.
    Fix,
    /// 64-bit unsigned literal.
    Literal(u64),
    /// Binary arithmetic or comparison.
    BinaryOp(Op),
    /// A binding occurrence. Nominal: never merged by hash-consing, even
    /// when structurally identical to another Parameter.
    Parameter,
    /// Marks a Parameter as specialization-eligible: arguments bound to it
    /// may be treated as compile-time constants.
    ConstexprAnnotation,
    /// Named data constructor.
    Constructor(Symbol),
    /// Function definition. The external name, when set, lives on the node
    /// outside the structural shape (it is mutable).
    Function,
    /// Call. Typed bottom; the callee never returns here.
    Application,
    /// Case split over a scrutinee.
    Case,
}

/// A single IR node.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
    /// Typing edge: the node this node is typed by. `None` only for the
    /// type-opaque `Fix` primitive.
    pub ty: Option<NodeId>,
    /// Output-visible symbol. Function nodes only; mutable after creation
    /// and excluded from the structural shape.
    pub external: Option<Symbol>,
}

/// Structural shape of a node: the hash-consing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
    pub ty: Option<NodeId>,
}

impl Node {
    pub fn shape(&self) -> Shape {
        Shape {
            kind: self.kind.clone(),
            children: self.children.clone(),
            ty: self.ty,
        }
    }

    /// Parameter slots of a Function (everything but the last child).
    pub fn params(&self) -> &[NodeId] {
        assert!(matches!(self.kind, NodeKind::Function), "BUG: params() on non-Function node");
        &self.children[..self.children.len() - 1]
    }

    /// Body of a Function (the last child).
    pub fn body(&self) -> NodeId {
        assert!(matches!(self.kind, NodeKind::Function), "BUG: body() on non-Function node");
        *self.children.last().expect("BUG: Function without children")
    }

    /// Callee of an Application (the first child).
    pub fn callee(&self) -> NodeId {
        assert!(matches!(self.kind, NodeKind::Application), "BUG: callee() on non-Application node");
        self.children[0]
    }

    /// Arguments of an Application (everything after the callee).
    pub fn args(&self) -> &[NodeId] {
        assert!(matches!(self.kind, NodeKind::Application), "BUG: args() on non-Application node");
        &self.children[1..]
    }

    /// Scrutinee of a Case (the first child).
    pub fn scrutinee(&self) -> NodeId {
        assert!(matches!(self.kind, NodeKind::Case), "BUG: scrutinee() on non-Case node");
        self.children[0]
    }

    /// (pattern, branch) pairs of a Case.
    pub fn arms(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        assert!(matches!(self.kind, NodeKind::Case), "BUG: arms() on non-Case node");
        self.children[1..].chunks_exact(2).map(|pair| (pair[0], pair[1]))
    }
}
