//! String interning.
//!
//! Symbols name output-visible functions and data constructors. The table
//! is owned by one Builder (one compilation context); there is no ambient
//! global interner.

use indexmap::IndexSet;

/// Interned string handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(pub u32);

/// Deduplicating string table. Insertion order is iteration order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    names: IndexSet<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name, returning the existing symbol if already present.
    pub fn intern(&mut self, name: &str) -> Symbol {
        let (index, _) = self.names.insert_full(name.to_string());
        Symbol(index as u32)
    }

    /// Look up the name for a symbol.
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.names
            .get_index(sym.0 as usize)
            .expect("BUG: symbol not in table")
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (Symbol(i as u32), name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
