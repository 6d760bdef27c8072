//! Type system for the compiler core
//!
//! Two type worlds live here. [`InferredType`] is the analysis lattice: what
//! the inferencer has proved about an expression (a concrete type, a union of
//! concrete types, `dynamic` for "any runtime value", `unknown` for "no
//! information yet"). [`IrType`] is the value-side type attached to IR
//! registers, which the downstream native backend understands directly.
//!
//! The lattice operations are pure; nothing in this module allocates beyond
//! union member vectors.

/// Concrete source-language types the inferencer can prove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConcreteType {
    Void,
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    Object,
    Callable,
    Resource,
    Iterable,
    /// Bottom element: the expression cannot produce a value.
    Never,
}

impl ConcreteType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ConcreteType::Int | ConcreteType::Float)
    }
}

impl std::fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConcreteType::Void => "void",
            ConcreteType::Null => "null",
            ConcreteType::Bool => "bool",
            ConcreteType::Int => "int",
            ConcreteType::Float => "float",
            ConcreteType::String => "string",
            ConcreteType::Array => "array",
            ConcreteType::Object => "object",
            ConcreteType::Callable => "callable",
            ConcreteType::Resource => "resource",
            ConcreteType::Iterable => "iterable",
            ConcreteType::Never => "never",
        };
        write!(f, "{}", name)
    }
}

/// What static analysis knows about a value.
///
/// `Union` always holds at least two distinct members, sorted; singleton
/// unions collapse to `Concrete` (use [`InferredType::union_of`] to build
/// unions so the invariant holds). `Dynamic` and `Unknown` are distinct:
/// `Dynamic` means "proved to be anything", `Unknown` means "not yet
/// inferred".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferredType {
    Concrete(ConcreteType),
    Union(Vec<ConcreteType>),
    Dynamic,
    Unknown,
}

impl InferredType {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, InferredType::Dynamic)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, InferredType::Unknown)
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, InferredType::Concrete(_))
    }

    pub fn int() -> Self {
        InferredType::Concrete(ConcreteType::Int)
    }

    pub fn float() -> Self {
        InferredType::Concrete(ConcreteType::Float)
    }

    pub fn bool() -> Self {
        InferredType::Concrete(ConcreteType::Bool)
    }

    pub fn string() -> Self {
        InferredType::Concrete(ConcreteType::String)
    }

    pub fn null() -> Self {
        InferredType::Concrete(ConcreteType::Null)
    }

    /// Build a union from members, collapsing degenerate shapes: duplicates
    /// are removed, `never` is absorbed when anything else is present, a
    /// single survivor collapses to `Concrete`, zero survivors yield
    /// `concrete(never)`.
    pub fn union_of(members: impl IntoIterator<Item = ConcreteType>) -> Self {
        let mut set: Vec<ConcreteType> = Vec::new();
        for m in members {
            if !set.contains(&m) {
                set.push(m);
            }
        }
        if set.len() > 1 {
            set.retain(|m| *m != ConcreteType::Never);
        }
        set.sort();
        match set.len() {
            0 => InferredType::Concrete(ConcreteType::Never),
            1 => InferredType::Concrete(set[0]),
            _ => InferredType::Union(set),
        }
    }

    /// Parse a recognized type name. `mixed` and unrecognized names return
    /// `None`; the caller decides whether that means `dynamic` (for `mixed`)
    /// or a class type (for everything else).
    pub fn from_type_name(name: &str) -> Option<ConcreteType> {
        match name {
            "void" => Some(ConcreteType::Void),
            "null" => Some(ConcreteType::Null),
            "bool" | "boolean" => Some(ConcreteType::Bool),
            "int" | "integer" => Some(ConcreteType::Int),
            "float" | "double" => Some(ConcreteType::Float),
            "string" => Some(ConcreteType::String),
            "array" => Some(ConcreteType::Array),
            "object" => Some(ConcreteType::Object),
            "callable" => Some(ConcreteType::Callable),
            "resource" => Some(ConcreteType::Resource),
            "iterable" => Some(ConcreteType::Iterable),
            "never" => Some(ConcreteType::Never),
            _ => None,
        }
    }

    /// Control-flow join: `never` is absorbed, equal types join to
    /// themselves, everything else widens to `dynamic`.
    pub fn join(&self, other: &InferredType) -> InferredType {
        use ConcreteType::Never;
        match (self, other) {
            (InferredType::Concrete(Never), _) => other.clone(),
            (_, InferredType::Concrete(Never)) => self.clone(),
            (a, b) if a == b => a.clone(),
            _ => InferredType::Dynamic,
        }
    }

    /// Join for arithmetic operators: float contaminates any numeric pair,
    /// int stays int, string stays string (the builder decides what op that
    /// becomes), anything touching `dynamic` or `unknown` is `dynamic`.
    pub fn arithmetic_join(&self, other: &InferredType) -> InferredType {
        use ConcreteType::{Float, Int, String as Str};
        let (a, b) = match (self, other) {
            (InferredType::Concrete(a), InferredType::Concrete(b)) => (*a, *b),
            _ => return InferredType::Dynamic,
        };
        match (a, b) {
            (Float, x) | (x, Float) if x.is_numeric() => InferredType::float(),
            (Int, Int) => InferredType::int(),
            (Str, Str) => InferredType::string(),
            _ => InferredType::Dynamic,
        }
    }

    /// Join for the `??` operator: a known-null left side yields the right
    /// side, identical concrete sides stay, everything else is `dynamic`.
    pub fn null_coalesce_join(&self, other: &InferredType) -> InferredType {
        match (self, other) {
            (InferredType::Concrete(ConcreteType::Null), rhs) => rhs.clone(),
            (InferredType::Concrete(a), InferredType::Concrete(b)) if a == b => {
                InferredType::Concrete(*a)
            }
            _ => InferredType::Dynamic,
        }
    }

    /// Lower to the register type the IR uses for a value of this type.
    /// Anything without a precise unboxed representation becomes the boxed
    /// `php_value`.
    pub fn to_ir_type(&self) -> IrType {
        match self {
            InferredType::Concrete(c) => match c {
                ConcreteType::Int => IrType::I64,
                ConcreteType::Float => IrType::F64,
                ConcreteType::Bool => IrType::Bool,
                ConcreteType::Void | ConcreteType::Never => IrType::Void,
                ConcreteType::String => IrType::PhpString,
                ConcreteType::Array => IrType::PhpArray,
                ConcreteType::Object => IrType::PhpObject(String::new()),
                ConcreteType::Callable => IrType::PhpCallable,
                ConcreteType::Resource => IrType::PhpResource,
                ConcreteType::Null | ConcreteType::Iterable => IrType::PhpValue,
            },
            InferredType::Union(_) | InferredType::Dynamic | InferredType::Unknown => {
                IrType::PhpValue
            }
        }
    }
}

impl std::fmt::Display for InferredType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferredType::Concrete(c) => write!(f, "{}", c),
            InferredType::Union(members) => {
                let parts: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                write!(f, "{}", parts.join("|"))
            }
            InferredType::Dynamic => write!(f, "dynamic"),
            InferredType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Value-side type of an IR register.
///
/// `PhpValue` is the boxed dynamic representation (tag + data + refcount),
/// 24 bytes in the layout the backend assumes. String, array, object,
/// resource and callable values are pointer-shaped handles into the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    Void,
    Bool,
    I64,
    F64,
    Ptr(Box<IrType>),
    PhpValue,
    PhpString,
    PhpArray,
    /// Empty class name means "some object".
    PhpObject(String),
    PhpResource,
    PhpCallable,
    Function {
        params: Vec<IrType>,
        ret: Box<IrType>,
    },
    Nullable(Box<IrType>),
}

impl IrType {
    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    /// Storage size the backend's value layout assumes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            IrType::Void => 0,
            IrType::Bool => 1,
            IrType::I64 | IrType::F64 => 8,
            IrType::PhpValue => 24,
            IrType::Ptr(_)
            | IrType::PhpString
            | IrType::PhpArray
            | IrType::PhpObject(_)
            | IrType::PhpResource
            | IrType::PhpCallable
            | IrType::Function { .. } => 8,
            IrType::Nullable(inner) => inner.size_in_bytes(),
        }
    }
}

impl std::fmt::Display for IrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "bool"),
            IrType::I64 => write!(f, "i64"),
            IrType::F64 => write!(f, "f64"),
            IrType::Ptr(inner) => write!(f, "ptr<{}>", inner),
            IrType::PhpValue => write!(f, "php_value"),
            IrType::PhpString => write!(f, "php_string"),
            IrType::PhpArray => write!(f, "php_array"),
            IrType::PhpObject(class) if class.is_empty() => write!(f, "php_object"),
            IrType::PhpObject(class) => write!(f, "php_object<{}>", class),
            IrType::PhpResource => write!(f, "php_resource"),
            IrType::PhpCallable => write!(f, "php_callable"),
            IrType::Function { params, ret } => {
                let parts: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "fn({}) -> {}", parts.join(", "), ret)
            }
            IrType::Nullable(inner) => write!(f, "?{}", inner),
        }
    }
}
