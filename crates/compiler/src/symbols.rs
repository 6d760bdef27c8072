//! Hierarchical symbol table
//!
//! Scopes form a tree rooted at the global scope. The table owns every scope
//! in a flat pool and keeps a stack of currently-open scopes; [`ScopeId`]
//! index handles stay valid for the table's lifetime, so leaving a scope
//! only hides it from lookup, it never frees it.
//!
//! Functions, classes and constants additionally land in kind-indexed maps
//! so hot lookups from the inferencer and the builder skip the scope walk.

use crate::ast::SourceLocation;
use crate::types::InferredType;
use std::collections::HashMap;

/// Index handle into the scope pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Variable,
    Function,
    Class,
    Interface,
    Trait,
    Constant,
    Parameter,
    Property,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

/// Declared parameter of a function symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub ty: InferredType,
}

/// Kind-specific symbol payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolMetadata {
    None,
    Function {
        params: Vec<ParamInfo>,
        return_type: InferredType,
        is_variadic: bool,
    },
    Class {
        parent: Option<String>,
        interfaces: Vec<String>,
        is_abstract: bool,
        is_final: bool,
    },
    Property {
        visibility: Visibility,
        is_static: bool,
        is_readonly: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub inferred_type: InferredType,
    pub mutable: bool,
    pub initialized: bool,
    pub location: SourceLocation,
    /// Owning class for properties and methods.
    pub class_name: Option<String>,
    pub metadata: SymbolMetadata,
}

impl Symbol {
    /// A mutable, initialized variable. The common case.
    pub fn variable(name: impl Into<String>, ty: InferredType, location: SourceLocation) -> Self {
        Symbol {
            name: name.into(),
            kind: SymbolKind::Variable,
            inferred_type: ty,
            mutable: true,
            initialized: true,
            location,
            class_name: None,
            metadata: SymbolMetadata::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Class,
    Block,
    Loop,
    Conditional,
}

/// One lexical scope. Symbols are stored in insertion order (a `Vec`) with a
/// name index on the side, so iteration order is deterministic while lookup
/// stays O(1).
#[derive(Debug)]
pub struct Scope {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, usize>,
    pub parent: Option<ScopeId>,
    pub depth: u32,
    pub kind: ScopeKind,
    pub name: Option<String>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, depth: u32, name: Option<String>) -> Self {
        Scope {
            symbols: Vec::new(),
            by_name: HashMap::new(),
            parent,
            depth,
            kind,
            name,
        }
    }

    /// Insert a symbol. A name collision overwrites in place, keeping the
    /// original insertion position.
    fn insert(&mut self, symbol: Symbol) -> usize {
        if let Some(&idx) = self.by_name.get(&symbol.name) {
            self.symbols[idx] = symbol;
            idx
        } else {
            let idx = self.symbols.len();
            self.by_name.insert(symbol.name.clone(), idx);
            self.symbols.push(symbol);
            idx
        }
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.by_name.get(name).map(|&idx| &self.symbols[idx])
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Location of a symbol inside the pool: scope plus slot.
type SymbolRef = (ScopeId, usize);

/// The symbol table: scope pool, scope stack, and kind-indexed lookups.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    stack: Vec<ScopeId>,
    functions: HashMap<String, SymbolRef>,
    classes: HashMap<String, SymbolRef>,
    constants: HashMap<String, SymbolRef>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Create a table with the global scope already open.
    pub fn new() -> Self {
        let global = Scope::new(ScopeKind::Global, None, 0, None);
        SymbolTable {
            scopes: vec![global],
            stack: vec![ScopeId(0)],
            functions: HashMap::new(),
            classes: HashMap::new(),
            constants: HashMap::new(),
        }
    }

    /// Open a child of the current scope and make it current.
    pub fn enter_scope(&mut self, kind: ScopeKind, name: Option<&str>) -> ScopeId {
        let parent = self.current_scope();
        let depth = self.scopes[parent.0].depth + 1;
        let id = ScopeId(self.scopes.len());
        self.scopes
            .push(Scope::new(kind, Some(parent), depth, name.map(String::from)));
        self.stack.push(id);
        id
    }

    /// Pop the current scope. The global scope is never popped; the popped
    /// scope stays addressable through its [`ScopeId`].
    pub fn leave_scope(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub fn current_scope(&self) -> ScopeId {
        *self.stack.last().expect("scope stack is never empty")
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn depth(&self) -> u32 {
        self.scopes[self.current_scope().0].depth
    }

    pub fn is_global_scope(&self) -> bool {
        self.depth() == 0
    }

    /// True when any scope on the parent chain is a function scope.
    pub fn is_in_function(&self) -> bool {
        self.enclosing_function().is_some()
    }

    /// Innermost enclosing function scope, if any.
    pub fn enclosing_function(&self) -> Option<&Scope> {
        self.walk_to_kind(ScopeKind::Function)
    }

    /// Innermost enclosing class scope, if any.
    pub fn enclosing_class(&self) -> Option<&Scope> {
        self.walk_to_kind(ScopeKind::Class)
    }

    fn walk_to_kind(&self, kind: ScopeKind) -> Option<&Scope> {
        let mut cursor = Some(self.current_scope());
        while let Some(id) = cursor {
            let scope = &self.scopes[id.0];
            if scope.kind == kind {
                return Some(scope);
            }
            cursor = scope.parent;
        }
        None
    }

    /// Insert into the current scope, recording functions/methods, type-like
    /// kinds and constants in their kind-indexed maps.
    pub fn define(&mut self, symbol: Symbol) {
        let kind = symbol.kind;
        let name = symbol.name.clone();
        let scope_id = self.current_scope();
        let idx = self.scopes[scope_id.0].insert(symbol);
        match kind {
            SymbolKind::Function | SymbolKind::Method => {
                self.functions.insert(name, (scope_id, idx));
            }
            SymbolKind::Class | SymbolKind::Interface | SymbolKind::Trait => {
                self.classes.insert(name, (scope_id, idx));
            }
            SymbolKind::Constant => {
                self.constants.insert(name, (scope_id, idx));
            }
            _ => {}
        }
    }

    /// Define a mutable, initialized variable in the current scope.
    pub fn define_variable(
        &mut self,
        name: &str,
        ty: InferredType,
        location: SourceLocation,
    ) {
        self.define(Symbol::variable(name, ty, location));
    }

    /// Define a function. Functions always land in the global scope.
    pub fn define_function(
        &mut self,
        name: &str,
        params: Vec<ParamInfo>,
        return_type: InferredType,
        location: SourceLocation,
    ) {
        let symbol = Symbol {
            name: name.to_string(),
            kind: SymbolKind::Function,
            inferred_type: return_type.clone(),
            mutable: false,
            initialized: true,
            location,
            class_name: None,
            metadata: SymbolMetadata::Function {
                params,
                return_type,
                is_variadic: false,
            },
        };
        self.define_global(symbol);
    }

    /// Define a class. Classes always land in the global scope.
    pub fn define_class(
        &mut self,
        name: &str,
        parent: Option<&str>,
        interfaces: Vec<String>,
        location: SourceLocation,
    ) {
        let symbol = Symbol {
            name: name.to_string(),
            kind: SymbolKind::Class,
            inferred_type: InferredType::Concrete(crate::types::ConcreteType::Object),
            mutable: false,
            initialized: true,
            location,
            class_name: None,
            metadata: SymbolMetadata::Class {
                parent: parent.map(String::from),
                interfaces,
                is_abstract: false,
                is_final: false,
            },
        };
        self.define_global(symbol);
    }

    /// Define a constant. Constants always land in the global scope.
    pub fn define_constant(
        &mut self,
        name: &str,
        ty: InferredType,
        location: SourceLocation,
    ) {
        let symbol = Symbol {
            name: name.to_string(),
            kind: SymbolKind::Constant,
            inferred_type: ty,
            mutable: false,
            initialized: true,
            location,
            class_name: None,
            metadata: SymbolMetadata::None,
        };
        self.define_global(symbol);
    }

    fn define_global(&mut self, symbol: Symbol) {
        let kind = symbol.kind;
        let name = symbol.name.clone();
        let idx = self.scopes[0].insert(symbol);
        match kind {
            SymbolKind::Function | SymbolKind::Method => {
                self.functions.insert(name, (ScopeId(0), idx));
            }
            SymbolKind::Class | SymbolKind::Interface | SymbolKind::Trait => {
                self.classes.insert(name, (ScopeId(0), idx));
            }
            SymbolKind::Constant => {
                self.constants.insert(name, (ScopeId(0), idx));
            }
            _ => {}
        }
    }

    /// Search the current scope, then its parents.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let mut cursor = Some(self.current_scope());
        while let Some(id) = cursor {
            let scope = &self.scopes[id.0];
            if let Some(symbol) = scope.get(name) {
                return Some(symbol);
            }
            cursor = scope.parent;
        }
        None
    }

    /// Search only the current scope.
    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes[self.current_scope().0].get(name)
    }

    pub fn lookup_function(&self, name: &str) -> Option<&Symbol> {
        self.lookup_indexed(&self.functions, name)
    }

    pub fn lookup_class(&self, name: &str) -> Option<&Symbol> {
        self.lookup_indexed(&self.classes, name)
    }

    pub fn lookup_constant(&self, name: &str) -> Option<&Symbol> {
        self.lookup_indexed(&self.constants, name)
    }

    fn lookup_indexed(&self, map: &HashMap<String, SymbolRef>, name: &str) -> Option<&Symbol> {
        map.get(name)
            .map(|&(scope, idx)| &self.scopes[scope.0].symbols[idx])
    }

    /// Rewrite the inferred type of `name` in its innermost defining scope.
    /// Returns whether a definition was found.
    pub fn update_type(&mut self, name: &str, ty: InferredType) -> bool {
        let mut cursor = Some(self.current_scope());
        while let Some(id) = cursor {
            let scope = &mut self.scopes[id.0];
            if let Some(&idx) = scope.by_name.get(name) {
                scope.symbols[idx].inferred_type = ty;
                return true;
            }
            cursor = scope.parent;
        }
        false
    }
}
