//! Conversions from doiuse-analysis types to LSP types.

use doiuse_analysis::{OrchestratorStatus, Severity};
use lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range};

pub const fn convert_position(pos: doiuse_analysis::Position) -> Position {
    Position {
        line: pos.line,
        character: pos.character,
    }
}

pub const fn convert_range(range: doiuse_analysis::Range) -> Range {
    Range {
        start: convert_position(range.start),
        end: convert_position(range.end),
    }
}

pub const fn convert_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
    }
}

pub fn convert_diagnostic(diag: doiuse_analysis::Diagnostic) -> Diagnostic {
    Diagnostic {
        range: convert_range(diag.range),
        severity: Some(convert_severity(diag.severity)),
        code: Some(NumberOrString::String(diag.code)),
        source: Some(diag.source.to_string()),
        message: diag.message,
        ..Default::default()
    }
}

/// Multi-line status report for the `doiuse.checkStatus` command.
pub fn format_status(status: &OrchestratorStatus) -> String {
    let mut lines = Vec::new();

    lines.push(match &status.workspace_root {
        Some(root) => format!("Workspace: {}", root.display()),
        None => "Workspace: none".to_string(),
    });
    lines.push(format!(
        "Engine: {}",
        if status.engine_loaded {
            "loaded"
        } else {
            "not loaded"
        }
    ));

    match &status.settings {
        Some(settings) => {
            lines.push(format!("Enabled: {}", settings.enabled));
            lines.push(format!("Message level: {}", settings.message_level));
            lines.push(format!("Run: {:?}", settings.trigger));
            if settings.has_explicit_browsers() {
                lines.push(format!("Browsers: {}", settings.browsers.join(", ")));
            }
            if !settings.ignore_features.is_empty() {
                lines.push(format!(
                    "Ignored features: {}",
                    settings.ignore_features.join(", ")
                ));
            }
            if !settings.ignore_file_globs.is_empty() {
                lines.push(format!(
                    "Ignored files: {}",
                    settings.ignore_file_globs.join(", ")
                ));
            }
        }
        None => lines.push("Settings: not received".to_string()),
    }

    lines.push(String::new());
    lines.push(format!("{} files open in editor", status.open_documents));
    lines.push(format!("{} cached browser target scopes", status.cached_scopes));

    lines.join("\n")
}
