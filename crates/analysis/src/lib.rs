//! Document validation pipeline for the doiuse language server.
//!
//! The [`Orchestrator`] owns the live settings, the browser-target cache and
//! the open documents. A pass checks the ignore globs, resolves the browser
//! target, scans the stylesheet and hands the resulting diagnostics to a
//! [`DiagnosticSink`].

mod diagnostics;
mod documents;
mod error;
mod ignore;
mod orchestrator;
mod resolver;
mod settings;

pub use diagnostics::{
    build_diagnostic, build_diagnostics, classify, strip_position_prefix, Diagnostic, Position,
    Range, DIAGNOSTIC_SOURCE,
};
pub use documents::{Document, DocumentStore};
pub use error::{PipelineError, SettingsError};
pub use ignore::{workspace_relative_path, IgnoreMatcher};
pub use orchestrator::{BatchReport, DiagnosticSink, Orchestrator, OrchestratorStatus, PassOutcome};
pub use resolver::BrowserTargetResolver;
pub use settings::{ActiveSettings, SettingsStore};

// Re-exported so callers need only this crate for the common types.
pub use doiuse_config::{Severity, TriggerMode, ValidationSettings};
pub use doiuse_engine::{
    FeatureFinding, FeatureFlags, FeatureScanner, ScanError, ScanRequest, SourcePosition, Syntax,
};
