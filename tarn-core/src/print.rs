//! Rendering of reachable Function definitions.
//!
//! Two forms: linear pseudocode, one definition per line, and a Graphviz
//! DOT digraph for visualization. Unnamed functions print as `fn_<id>` and
//! parameters as `p<id>`, using generation ids.

use std::fmt::Write;

use crate::builder::Builder;
use crate::node::{NodeId, NodeKind};

/// Render every reachable Function definition:
/// `name #(param : type, ...) -> ⊥: body`.
pub fn render(builder: &Builder) -> String {
    let mut out = String::new();
    for f in builder.reachable_functions() {
        render_function(builder, f, &mut out);
        out.push('\n');
    }
    out
}

fn render_function(builder: &Builder, f: NodeId, out: &mut String) {
    out.push_str(&function_name(builder, f));
    out.push_str(" #(");
    let node = builder.node(f);
    for (i, &p) in node.params().iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(
            out,
            "{} : {}",
            expr(builder, p),
            type_expr(builder, builder.node(p).ty.expect("BUG: parameter missing type"))
        );
    }
    out.push_str(") -> \u{22a5}: ");
    out.push_str(&expr(builder, node.body()));
}

/// A Function's display name: its external name, or `fn_<id>`.
pub fn function_name(builder: &Builder, f: NodeId) -> String {
    match builder.node(f).external {
        Some(sym) => builder.symbols.resolve(sym).to_string(),
        None => format!("fn_{}", f.0),
    }
}

/// Render a node in operand position. Functions print as their name, not
/// their body; bodies appear on their own definition lines.
pub fn expr(builder: &Builder, id: NodeId) -> String {
    let node = builder.node(id);
    match &node.kind {
        NodeKind::Function => function_name(builder, id),
        NodeKind::Parameter => format!("p{}", id.0),
        NodeKind::ConstexprAnnotation => format!("p{}", node.children[0].0),
        NodeKind::Literal(v) => format!("{}", v),
        NodeKind::Fix => "Z".to_string(),
        NodeKind::BinaryOp(op) => format!(
            "{} {} {}",
            expr(builder, node.children[0]),
            op.symbol(),
            expr(builder, node.children[1])
        ),
        NodeKind::Application => {
            let args: Vec<String> = node.args().iter().map(|&a| expr(builder, a)).collect();
            format!("{} ({})", expr(builder, node.callee()), args.join(", "))
        }
        NodeKind::Case => {
            let arms: Vec<String> = node
                .arms()
                .map(|(pattern, branch)| {
                    format!("{} => {}", expr(builder, pattern), expr(builder, branch))
                })
                .collect();
            format!(
                "case {} [ {} ]",
                expr(builder, node.scrutinee()),
                arms.join(" ")
            )
        }
        NodeKind::Constructor(sym) => {
            let name = builder.symbols.resolve(*sym);
            if node.children.is_empty() {
                name.to_string()
            } else {
                let args: Vec<String> =
                    node.children.iter().map(|&a| expr(builder, a)).collect();
                format!("{}({})", name, args.join(", "))
            }
        }
        NodeKind::Tuple => {
            let elems: Vec<String> = node.children.iter().map(|&e| expr(builder, e)).collect();
            format!("({})", elems.join(", "))
        }
        // Type-kinded nodes in operand position render as types.
        _ => type_expr(builder, id),
    }
}

fn type_expr(builder: &Builder, id: NodeId) -> String {
    let node = builder.node(id);
    match &node.kind {
        NodeKind::Kind => "kind".to_string(),
        NodeKind::Type => "type".to_string(),
        NodeKind::Prop => "prop".to_string(),
        NodeKind::Unit => "unit".to_string(),
        NodeKind::Bottom => "\u{22a5}".to_string(),
        NodeKind::UIntType(bits) => format!("u{}", bits),
        NodeKind::PtrType => format!("ptr {}", type_expr(builder, node.children[0])),
        NodeKind::FnType => {
            let params: Vec<String> =
                node.children.iter().map(|&p| type_expr(builder, p)).collect();
            format!("({}) -> \u{22a5}", params.join(", "))
        }
        NodeKind::Tuple => {
            let elems: Vec<String> =
                node.children.iter().map(|&e| type_expr(builder, e)).collect();
            format!("({})", elems.join(", "))
        }
        NodeKind::Parameter => format!("p{}", id.0),
        _ => expr(builder, id),
    }
}

/// Render the reachable graph as a Graphviz digraph: one node per distinct
/// IR node, edges from operands to their consumers.
pub fn render_graph(builder: &Builder) -> String {
    let roots: Vec<NodeId> = builder.roots().map(|(_, f)| f).collect();
    let mut out = String::from("digraph ir {\n");
    let reachable = builder.reachable(&roots);
    for &n in &reachable {
        let _ = writeln!(out, "  n{} [label=\"{}\"];", n.0, node_label(builder, n));
    }
    for &n in &reachable {
        for &child in &builder.node(n).children {
            let _ = writeln!(out, "  n{} -> n{};", child.0, n.0);
        }
    }
    out.push_str("}\n");
    out
}

fn node_label(builder: &Builder, id: NodeId) -> String {
    let node = builder.node(id);
    match &node.kind {
        NodeKind::Function => function_name(builder, id),
        NodeKind::Parameter => format!("p{}", id.0),
        NodeKind::ConstexprAnnotation => "constexpr".to_string(),
        NodeKind::Literal(v) => format!("{}", v),
        NodeKind::BinaryOp(op) => op.symbol().to_string(),
        NodeKind::Application => "apply".to_string(),
        NodeKind::Case => "case".to_string(),
        NodeKind::Constructor(sym) => builder.symbols.resolve(*sym).to_string(),
        NodeKind::Fix => "Z".to_string(),
        _ => type_expr(builder, id),
    }
}
