use std::collections::HashMap;

use crate::vm::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Static,
    Field,
    Argument,
    Local,
}

impl Scope {
    /// The VM memory segment addressed when pushing or popping a symbol of
    /// this scope.
    pub fn segment(self) -> Segment {
        match self {
            Scope::Static => Segment::Static,
            Scope::Field => Segment::This,
            Scope::Argument => Segment::Argument,
            Scope::Local => Segment::Local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub index: u16,
    pub scope: Scope,
    pub ty: String,
}

/// One naming scope's name→symbol mapping, built once and never mutated.
/// Indexes are the entries' list positions.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    scope: Scope,
}

impl SymbolTable {
    pub fn build(entries: impl IntoIterator<Item = (String, String)>, scope: Scope) -> Self {
        let symbols = entries
            .into_iter()
            .enumerate()
            .map(|(index, (name, ty))| {
                (
                    name,
                    Symbol {
                        index: index as u16,
                        scope,
                        ty,
                    },
                )
            })
            .collect();
        Self { symbols, scope }
    }

    pub fn empty(scope: Scope) -> Self {
        Self::build([], scope)
    }

    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }
}

/// The four tables visible from a subroutine body, queried in fixed
/// priority order: Argument, then Local, then Field, then Static. The
/// nearer scope shadows the farther one.
pub struct ScopeChain<'a> {
    tables: [&'a SymbolTable; 4],
}

impl<'a> ScopeChain<'a> {
    pub fn new(
        arguments: &'a SymbolTable,
        locals: &'a SymbolTable,
        fields: &'a SymbolTable,
        statics: &'a SymbolTable,
    ) -> Self {
        Self {
            tables: [arguments, locals, fields, statics],
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.tables.iter().find_map(|table| table.resolve(name))
    }
}
