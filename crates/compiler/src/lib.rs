//! PHP AOT compiler core
//!
//! Lowers a dynamically-typed PHP AST into a statically-typed SSA IR,
//! running type inference and constant folding along the way, and hands the
//! finished module to a native-code backend. Lexing, parsing, native code
//! generation and linking live outside this crate; the input contract is the
//! flat AST of [`ast::Ast`] and the output is an [`ir::Module`].
//!
//! # Pipeline
//!
//! ```rust,ignore
//! use phpc::{Ast, CompilerConfig, DiagnosticEngine, compile_to_ir, serialize_module};
//!
//! let mut diagnostics = DiagnosticEngine::new();
//! let config = CompilerConfig::default();
//! match compile_to_ir(&ast, &config, &mut diagnostics) {
//!     Ok(module) => println!("{}", serialize_module(&module)),
//!     Err(err) => eprintln!("{}\n{}", err, diagnostics.render()),
//! }
//! ```
//!
//! Compilation is single-threaded and fully synchronous. Independent
//! modules can compile in parallel by giving each its own
//! (AST, config, diagnostics) triple; the only shared state is the
//! read-only built-in table.

pub mod ast;
pub mod builder;
pub mod builtins;
pub mod config;
pub mod diagnostics;
pub mod infer;
pub mod ir;
pub mod serializer;
pub mod symbols;
pub mod types;

pub use ast::{Ast, NodeId, NodeKind, SourceLocation, StringTable};
pub use builder::IrBuilder;
pub use builtins::builtin_return_type;
pub use config::CompilerConfig;
pub use diagnostics::{Diagnostic, DiagnosticEngine, Severity};
pub use infer::TypeInferencer;
pub use ir::Module;
pub use serializer::serialize_module;
pub use symbols::{Symbol, SymbolKind, SymbolTable};
pub use types::{ConcreteType, InferredType, IrType};

use tracing::info;

/// Why a compilation produced no module.
#[derive(Debug)]
pub enum CompileError {
    /// The AST violated its input contract (bad child index, wrong payload
    /// shape). The module was abandoned early.
    MalformedAst(String),
    /// The builder broke an SSA or block invariant. Always a bug in the
    /// compiler, never in user code.
    Invariant(String),
    /// Semantic errors were recorded on the diagnostics engine; render it
    /// for the details.
    Failed { errors: usize, warnings: usize },
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::MalformedAst(msg) => write!(f, "malformed AST: {}", msg),
            CompileError::Invariant(msg) => {
                write!(f, "internal invariant violation: {}", msg)
            }
            CompileError::Failed { errors, warnings } => write!(
                f,
                "compilation failed with {} error(s), {} warning(s)",
                errors, warnings
            ),
        }
    }
}

impl std::error::Error for CompileError {}

/// Compile one unit to IR.
///
/// The result is `Ok` exactly when the diagnostics engine recorded zero
/// errors after module finalization; warnings do not block. On `Err` no
/// module is handed out, but everything recorded on `diagnostics` remains
/// available for rendering.
pub fn compile_to_ir(
    ast: &Ast,
    config: &CompilerConfig,
    diagnostics: &mut DiagnosticEngine,
) -> Result<Module, CompileError> {
    diagnostics.set_color(config.color_diagnostics);
    let builder = IrBuilder::new(ast, config, diagnostics);
    let module = builder.build()?;

    let errors = diagnostics.error_count();
    let warnings = diagnostics.warning_count();
    info!(module = %module.name, errors, warnings, "compilation finished");

    if errors > 0 {
        return Err(CompileError::Failed { errors, warnings });
    }
    Ok(module)
}
