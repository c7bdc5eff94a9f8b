//! Tarn IR core.
//!
//! A hash-consed node graph for a CPS-style dependently-typed intermediate
//! representation, plus the two whole-program passes that consume it: a
//! call-site specializer (supercompiler) and a defunctionalizer. The front
//! end, type checker, and code generators are separate collaborators; they
//! exchange graphs with this crate through [`Builder`] constructors and the
//! rendered output forms.

pub mod builder;
pub mod defunctionalize;
pub mod intern;
pub mod node;
pub mod print;
pub mod supercompile;
pub mod verify;

#[cfg(test)]
mod defunctionalize_tests;
#[cfg(test)]
mod integration_tests;

pub use builder::Builder;
pub use defunctionalize::TagTable;
pub use intern::{Symbol, SymbolTable};
pub use node::{Node, NodeId, NodeKind, Op};
pub use verify::VerifyError;

// =============================================================================
// Typestate pipeline
// =============================================================================
//
// Each struct represents a stage; methods consume `self` and return the next
// stage, enforcing valid ordering. The Builder travels through the stages,
// since both passes borrow it exclusively for their whole run:
//
//   let assembled = Assembled::new(builder, entry);
//     -> .supercompile()     -> Specialized
//       -> .defunctionalize() -> FirstOrder

/// An initial graph has been assembled by the front end.
pub struct Assembled {
    pub builder: Builder,
    pub entry: NodeId,
}

impl Assembled {
    /// Wrap a front-end-built graph. The entry must be an externally named
    /// Function so the passes and renderers can reach the program.
    pub fn new(builder: Builder, entry: NodeId) -> Self {
        assert!(
            matches!(builder.node(entry).kind, NodeKind::Function),
            "BUG: pipeline entry must be a Function"
        );
        assert!(
            builder.external_name(entry).is_some(),
            "BUG: pipeline entry must be externally named"
        );
        Assembled { builder, entry }
    }

    /// Specialize call sites to a fixpoint.
    pub fn supercompile(mut self) -> Specialized {
        let specialized = supercompile::supercompile(&mut self.builder, self.entry);
        Specialized {
            builder: self.builder,
            entry: self.entry,
            specialized,
        }
    }

    pub fn render(&self) -> String {
        self.builder.print()
    }
}

/// Call sites have been specialized.
pub struct Specialized {
    pub builder: Builder,
    pub entry: NodeId,
    /// Number of call sites the supercompiler rewrote.
    pub specialized: usize,
}

impl Specialized {
    /// Remove remaining higher-order structure.
    pub fn defunctionalize(mut self) -> FirstOrder {
        let tags = defunctionalize::defunctionalize(&mut self.builder);
        FirstOrder {
            builder: self.builder,
            entry: self.entry,
            tags,
        }
    }

    pub fn render(&self) -> String {
        self.builder.print()
    }
}

/// The graph is first-order: ready for a code generator.
pub struct FirstOrder {
    pub builder: Builder,
    pub entry: NodeId,
    /// Tag to original callee, as recorded by the defunctionalizer.
    pub tags: TagTable,
}

impl FirstOrder {
    pub fn render(&self) -> String {
        self.builder.print()
    }

    pub fn render_graph(&self) -> String {
        self.builder.print_graph()
    }

    /// Check structural invariants over the finished graph.
    pub fn verify(&self) -> Result<(), Vec<VerifyError>> {
        verify::verify(&self.builder)
    }
}
