//! Non-fatal findings collected during decode and encode.
//!
//! Real-world containers routinely carry recoverable inconsistencies, so the
//! codec reports them here and keeps going with a best-effort result. Each
//! entry is also emitted as a `tracing` event.

use std::fmt;

/// What kind of problem a diagnostic describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Duplicate struct keys, bad flags, checksum mismatch, excess data.
    SchemaViolation,
    /// Undefined ids, undefined symbols, duplicate symbol definitions.
    SymbolResolution,
    /// Reserved type codes, sorted structs, shared-table definitions.
    Unsupported,
    /// Informational: padding, version drift, unexpected-but-legal input.
    Notice,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::SchemaViolation => "schema violation",
            DiagnosticKind::SymbolResolution => "symbol resolution",
            DiagnosticKind::Unsupported => "unsupported",
            DiagnosticKind::Notice => "notice",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{level} ({}): {}", self.kind, self.message)
    }
}

/// Ordered sink of diagnostics for one document.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(kind = %kind, "{message}");
        self.entries.push(Diagnostic {
            kind,
            severity: Severity::Warning,
            message,
        });
    }

    pub fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(kind = %kind, "{message}");
        self.entries.push(Diagnostic {
            kind,
            severity: Severity::Error,
            message,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Diagnostics of one kind, in the order they were reported.
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
