//! Structural verification of a finished graph.
//!
//! Checks the invariants the Builder enforces by construction but that
//! graph rewriting could in principle disturb. Violations are collected and
//! returned rather than panicking, so embedders and tests can inspect a
//! graph without aborting.

use crate::builder::Builder;
use crate::node::{NodeId, NodeKind};

/// A structural invariant violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// A Function body is neither an Application nor a Case.
    BodyShape { function: NodeId, body: NodeId },

    /// A Function has an empty parameter list.
    MissingParameters { function: NodeId },

    /// A Function parameter slot holds a non-binder node.
    BadParameterSlot { function: NodeId, slot: NodeId },

    /// A Case has no scrutinee or an incomplete (pattern, branch) pairing.
    MalformedCase { case: NodeId },

    /// A ConstexprAnnotation wraps something other than a Parameter.
    AnnotationShape { annotation: NodeId },

    /// A non-Parameter node is not the canonical instance for its shape.
    NotCanonical { node: NodeId },
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::BodyShape { function, body } => write!(
                f,
                "Function {:?} has body {:?} that is neither an Application nor a Case",
                function, body
            ),
            VerifyError::MissingParameters { function } => {
                write!(f, "Function {:?} has no parameters", function)
            }
            VerifyError::BadParameterSlot { function, slot } => write!(
                f,
                "Function {:?} parameter slot {:?} is not a Parameter or ConstexprAnnotation",
                function, slot
            ),
            VerifyError::MalformedCase { case } => {
                write!(f, "Case {:?} is missing a scrutinee or has an unpaired arm", case)
            }
            VerifyError::AnnotationShape { annotation } => write!(
                f,
                "ConstexprAnnotation {:?} does not wrap a Parameter",
                annotation
            ),
            VerifyError::NotCanonical { node } => write!(
                f,
                "node {:?} is not the canonical instance for its shape",
                node
            ),
        }
    }
}

/// Verify every node reachable from the registered roots.
pub fn verify(builder: &Builder) -> Result<(), Vec<VerifyError>> {
    let roots: Vec<NodeId> = builder.roots().map(|(_, f)| f).collect();
    let mut errors = Vec::new();

    for id in builder.reachable(&roots) {
        let node = builder.node(id);
        match node.kind {
            NodeKind::Function => {
                if node.children.len() < 2 {
                    errors.push(VerifyError::MissingParameters { function: id });
                    continue;
                }
                for &slot in node.params() {
                    if !matches!(
                        builder.node(slot).kind,
                        NodeKind::Parameter | NodeKind::ConstexprAnnotation
                    ) {
                        errors.push(VerifyError::BadParameterSlot { function: id, slot });
                    }
                }
                let body = node.body();
                if !matches!(
                    builder.node(body).kind,
                    NodeKind::Application | NodeKind::Case
                ) {
                    errors.push(VerifyError::BodyShape { function: id, body });
                }
            }
            NodeKind::Case => {
                if node.children.len() < 3 || node.children.len() % 2 == 0 {
                    errors.push(VerifyError::MalformedCase { case: id });
                }
            }
            NodeKind::ConstexprAnnotation => {
                if node.children.len() != 1
                    || !matches!(builder.node(node.children[0]).kind, NodeKind::Parameter)
                {
                    errors.push(VerifyError::AnnotationShape { annotation: id });
                }
            }
            _ => {}
        }
        if !builder.is_canonical(id) {
            errors.push(VerifyError::NotCanonical { node: id });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
