//! Diagnostics engine
//!
//! A sink for severity-tagged, source-located messages shared by every stage
//! of a compilation. The engine is append-only while a compilation runs;
//! callers read counts and render output afterwards.
//!
//! When the full source text is attached the renderer shows the offending
//! line with a caret under the reported column, in the style compilers users
//! already know:
//!
//! ```text
//! script.php:3:9: error: Undefined variable $y
//!     echo $y;
//!         ^
//! 1 error(s), 0 warning(s) generated.
//! ```

use crate::ast::SourceLocation;
use serde::Serialize;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_CYAN: &str = "\x1b[36m";
const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_RESET: &str = "\x1b[0m";

/// Severity level of a diagnostic.
///
/// Notes are informational: they are rendered but never counted, so a run
/// that produced only notes still compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    /// Convert to the LSP DiagnosticSeverity scale.
    pub fn to_lsp_severity(&self) -> u32 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Note => 3,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            Severity::Error => ANSI_RED,
            Severity::Warning => ANSI_YELLOW,
            Severity::Note => ANSI_CYAN,
        }
    }
}

/// One recorded diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: SourceLocation,
    pub message: String,
    /// Optional fix suggestion rendered after the caret line.
    pub hint: Option<String>,
    /// Sub-notes attached to this diagnostic (not counted separately).
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn with_hint(&mut self, hint: impl Into<String>) -> &mut Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_note(&mut self, note: impl Into<String>) -> &mut Self {
        self.notes.push(note.into());
        self
    }
}

/// Collects diagnostics for one compilation.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
    /// Source text split by line, for caret rendering.
    source_lines: Option<Vec<String>>,
    color: bool,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        DiagnosticEngine::default()
    }

    /// Register the full source text; rendering will show offending lines.
    pub fn attach_source(&mut self, source: &str) {
        self.source_lines = Some(source.lines().map(|l| l.to_string()).collect());
    }

    /// Toggle ANSI color codes in rendered output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn error(
        &mut self,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> &mut Diagnostic {
        self.report(Severity::Error, location, message)
    }

    pub fn warning(
        &mut self,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> &mut Diagnostic {
        self.report(Severity::Warning, location, message)
    }

    pub fn note(
        &mut self,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> &mut Diagnostic {
        self.report(Severity::Note, location, message)
    }

    /// Record a diagnostic. Returns a handle so the caller can attach a hint
    /// or sub-notes to the message it just produced.
    pub fn report(
        &mut self,
        severity: Severity,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> &mut Diagnostic {
        match severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Note => {}
        }
        self.diagnostics.push(Diagnostic {
            severity,
            location,
            message: message.into(),
            hint: None,
            notes: Vec::new(),
        });
        self.diagnostics.last_mut().unwrap()
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drop all stored messages and reset counters. The attached source and
    /// color setting survive.
    pub fn clear(&mut self) {
        self.diagnostics = Vec::new();
        self.errors = 0;
        self.warnings = 0;
    }

    /// Render all diagnostics, followed by a one-line summary when anything
    /// counted was recorded.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for diag in &self.diagnostics {
            self.render_one(diag, &mut out);
        }
        if self.errors > 0 || self.warnings > 0 {
            out.push_str(&format!(
                "{} error(s), {} warning(s) generated.\n",
                self.errors, self.warnings
            ));
        }
        out
    }

    fn render_one(&self, diag: &Diagnostic, out: &mut String) {
        let loc = &diag.location;
        if !loc.file.is_empty() {
            if loc.is_none() {
                out.push_str(&format!("{}: ", loc.file));
            } else {
                out.push_str(&format!("{}:{}:{}: ", loc.file, loc.line, loc.column));
            }
        }
        if self.color {
            out.push_str(&format!(
                "{}{}{}{}: ",
                ANSI_BOLD,
                diag.severity.color(),
                diag.severity.label(),
                ANSI_RESET
            ));
        } else {
            out.push_str(&format!("{}: ", diag.severity.label()));
        }
        out.push_str(&diag.message);
        out.push('\n');

        // Offending line with a caret under (column, length)
        if let Some(lines) = &self.source_lines
            && loc.line > 0
            && let Some(line) = lines.get((loc.line - 1) as usize)
        {
            out.push_str(line);
            out.push('\n');
            let pad = loc.column.saturating_sub(1) as usize;
            let underline = loc.length.saturating_sub(1) as usize;
            out.push_str(&" ".repeat(pad));
            out.push('^');
            out.push_str(&"~".repeat(underline));
            out.push('\n');
        }

        if let Some(hint) = &diag.hint {
            out.push_str(&format!("  hint: {}\n", hint));
        }
        for note in &diag.notes {
            out.push_str(&format!("  note: {}\n", note));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, column: u32, length: u32) -> SourceLocation {
        SourceLocation::new("test.php", line, column, length)
    }

    #[test]
    fn test_counts_separate_severities() {
        let mut engine = DiagnosticEngine::new();
        engine.error(loc(1, 1, 1), "e1");
        engine.error(loc(2, 1, 1), "e2");
        engine.warning(loc(3, 1, 1), "w1");
        engine.note(loc(4, 1, 1), "n1");
        engine.note(loc(5, 1, 1), "n2");

        assert_eq!(engine.error_count(), 2);
        assert_eq!(engine.warning_count(), 1);
        assert!(engine.has_errors());
        assert!(engine.has_warnings());
        assert_eq!(engine.diagnostics().len(), 5);
    }

    #[test]
    fn test_notes_do_not_set_has_errors() {
        let mut engine = DiagnosticEngine::new();
        engine.note(loc(1, 1, 1), "just saying");
        assert!(!engine.has_errors());
        assert!(!engine.has_warnings());
    }

    #[test]
    fn test_clear_resets() {
        let mut engine = DiagnosticEngine::new();
        engine.error(loc(1, 1, 1), "e");
        engine.warning(loc(1, 1, 1), "w");
        engine.clear();
        assert_eq!(engine.error_count(), 0);
        assert_eq!(engine.warning_count(), 0);
        assert!(engine.diagnostics().is_empty());
        assert_eq!(engine.render(), "");
    }

    #[test]
    fn test_render_plain_format() {
        let mut engine = DiagnosticEngine::new();
        engine.error(loc(3, 9, 2), "Undefined variable $y");
        let rendered = engine.render();
        assert!(rendered.starts_with("test.php:3:9: error: Undefined variable $y\n"));
        assert!(rendered.ends_with("1 error(s), 0 warning(s) generated.\n"));
    }

    #[test]
    fn test_render_caret_under_column() {
        let mut engine = DiagnosticEngine::new();
        engine.attach_source("line one\n    echo $y;\n");
        engine.error(loc(2, 10, 2), "Undefined variable $y");
        let rendered = engine.render();
        assert!(rendered.contains("    echo $y;\n"));
        assert!(rendered.contains("         ^~\n"));
    }

    #[test]
    fn test_render_hint_and_notes() {
        let mut engine = DiagnosticEngine::new();
        engine
            .warning(loc(1, 1, 1), "division by zero")
            .with_hint("guard the divisor")
            .with_note("the divisor is the literal 0");
        let rendered = engine.render();
        assert!(rendered.contains("  hint: guard the divisor\n"));
        assert!(rendered.contains("  note: the divisor is the literal 0\n"));
    }

    #[test]
    fn test_render_color_toggle() {
        let mut engine = DiagnosticEngine::new();
        engine.set_color(true);
        engine.error(loc(1, 1, 1), "boom");
        assert!(engine.render().contains("\x1b[31m"));

        engine.set_color(false);
        assert!(!engine.render().contains("\x1b[31m"));
    }

    #[test]
    fn test_no_location_renders_without_line_col() {
        let mut engine = DiagnosticEngine::new();
        let mut l = SourceLocation::none();
        l.file = "test.php".to_string();
        engine.error(l, "module-level problem");
        let rendered = engine.render();
        assert!(rendered.starts_with("test.php: error: module-level problem\n"));
    }

    #[test]
    fn test_serializes_for_tooling() {
        let mut engine = DiagnosticEngine::new();
        engine.warning(loc(7, 2, 1), "suspicious shift");
        let json = serde_json::to_string(&engine.diagnostics()[0]).unwrap();
        assert!(json.contains("\"severity\":\"warning\""));
        assert!(json.contains("\"line\":7"));
        assert_eq!(Severity::Warning.to_lsp_severity(), 2);
    }
}
