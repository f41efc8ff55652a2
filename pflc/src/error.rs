//! Structured diagnostics for the compilation pipeline.
//!
//! [`Fatal`] errors abort a compile immediately by propagating as `Err`.
//! [`Diagnostic`]s (PDL errors, PFL errors, warnings) are instead pushed into
//! an [`ErrorRecorder`] that every pass shares, so a single `compile()` call
//! can surface every problem it finds rather than stopping at the first one.

use std::fmt;

/// An internal invariant violation or other unrecoverable failure. Returned
/// by `compile()` as `Err(Fatal)`; never placed in an [`ErrorRecorder`].
#[derive(Debug, thiserror::Error)]
pub enum Fatal {
    #[error("no protocol named 'startproto' in the encapsulation graph")]
    MissingStartProto,
    #[error("duplicate protocol id {0}")]
    DuplicateProtoId(u32),
    #[error("symbol table lookup by id {0} failed")]
    UnknownSymbolId(u32),
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// A single recorded, non-fatal diagnostic.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Diagnostic {
    /// Malformed or unsupported database content. The affected protocol is
    /// pruned from the encapsulation graph.
    #[error("PDL error in protocol '{proto}': {message}")]
    Pdl { proto: String, message: String },

    /// Malformed filter expression. Causes `compile()` to return
    /// `CompileOutcome::Failure`.
    #[error("PFL error: {message}")]
    Pfl { message: String },

    /// Recoverable degradation that still produces bytecode.
    #[error("warning: {message}")]
    Warning { message: String },
}

impl Diagnostic {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Diagnostic::Pfl { .. })
    }
}

/// Accumulates diagnostics across pass boundaries. Shared (by `&mut`)
/// through the compiler driver; never cloned mid-compile so that every pass
/// sees the full history so far.
#[derive(Debug, Default)]
pub struct ErrorRecorder {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::Pdl { proto, message } => {
                log::warn!(target: "pflc::pdl", "{proto}: {message}")
            }
            Diagnostic::Pfl { message } => log::error!(target: "pflc::pfl", "{message}"),
            Diagnostic::Warning { message } => log::warn!(target: "pflc::warn", "{message}"),
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_blocking(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_blocking)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl fmt::Display for ErrorRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, Fatal>;
