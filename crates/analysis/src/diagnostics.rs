use doiuse_config::Severity;
use doiuse_engine::{FeatureFinding, FeatureFlags};
use regex::Regex;
use std::sync::LazyLock;

/// Value of the `source` field of every published diagnostic.
pub const DIAGNOSTIC_SOURCE: &str = "doiuse";

/// Location prefix the engine puts in front of its messages, e.g.
/// `<input css 1>:4:3: `.
static POSITION_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^<input css [^>]*>:\d+:\d+:\s*")
        .map_err(|e| tracing::error!("Invalid position prefix pattern: {e}"))
        .ok()
});

/// Position in a document (0-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Range in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A diagnostic ready to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: Severity,
    pub message: String,
    /// Feature identifier that triggered the diagnostic
    pub code: String,
    pub source: &'static str,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        range: Range,
        severity: Severity,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            range,
            severity,
            message: message.into(),
            code: code.into(),
            source: DIAGNOSTIC_SOURCE,
        }
    }
}

/// Severity of a finding: missing support is an error, partial support a warning.
#[must_use]
pub const fn classify(flags: FeatureFlags) -> Severity {
    if flags.missing {
        Severity::Error
    } else if flags.partial {
        Severity::Warning
    } else {
        Severity::Information
    }
}

/// Remove the engine's `<input css N>:L:C:` location prefix from a message.
#[must_use]
pub fn strip_position_prefix(message: &str) -> &str {
    match POSITION_PREFIX.as_ref().and_then(|re| re.find(message)) {
        Some(prefix) => &message[prefix.end()..],
        None => message,
    }
}

/// Convert one finding into a diagnostic.
///
/// Returns `None` when the finding is less urgent than `message_level`.
///
/// The end column is the engine's 1-based column taken as is, so the range
/// ends one character after the reported end.
#[must_use]
pub fn build_diagnostic(finding: &FeatureFinding, message_level: Severity) -> Option<Diagnostic> {
    let severity = classify(finding.flags);
    if severity > message_level {
        return None;
    }

    let position = finding.position;
    let range = Range::new(
        Position::new(
            position.start_line.saturating_sub(1),
            position.start_column.saturating_sub(1),
        ),
        Position::new(position.end_line.saturating_sub(1), position.end_column),
    );

    Some(Diagnostic::new(
        range,
        severity,
        strip_position_prefix(&finding.message),
        finding.feature_id.clone(),
    ))
}

/// Build the diagnostics of one scan, preserving finding order.
#[must_use]
pub fn build_diagnostics(findings: &[FeatureFinding], message_level: Severity) -> Vec<Diagnostic> {
    findings
        .iter()
        .filter_map(|finding| build_diagnostic(finding, message_level))
        .collect()
}
