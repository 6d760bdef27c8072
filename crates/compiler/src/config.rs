//! Compiler configuration
//!
//! Options the orchestrator can set per compilation: builder-style `with_*`
//! methods for programmatic use, or [`CompilerConfig::from_toml`] when the
//! options come from a project file.

use serde::Deserialize;

fn default_entry_function() -> String {
    "main".to_string()
}

/// Configuration for one module compilation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Module name; defaults to the source file name when unset.
    pub module_name: Option<String>,

    /// Fold constant-only expressions during IR construction. Disabling
    /// this makes every expression lower to runtime ops, which differential
    /// tests use to compare folded and unfolded programs.
    pub fold_constants: bool,

    /// Emit ANSI color codes when rendering diagnostics.
    pub color_diagnostics: bool,

    /// Name of the synthesized function that receives top-level statements.
    pub entry_function: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            module_name: None,
            fold_constants: true,
            color_diagnostics: false,
            entry_function: default_entry_function(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse compiler config: {}", e))
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = Some(name.into());
        self
    }

    pub fn with_fold_constants(mut self, fold: bool) -> Self {
        self.fold_constants = fold;
        self
    }

    pub fn with_color_diagnostics(mut self, color: bool) -> Self {
        self.color_diagnostics = color;
        self
    }

    pub fn with_entry_function(mut self, name: impl Into<String>) -> Self {
        self.entry_function = name.into();
        self
    }
}
