use crate::conversions::convert_diagnostic;
use doiuse_analysis::{Diagnostic, DiagnosticSink};
use lsp_types::{MessageType, Uri};
use tower_lsp_server::Client;

/// Publishes validation results to the editor.
pub struct ClientSink {
    client: Client,
}

impl ClientSink {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

impl DiagnosticSink for ClientSink {
    async fn publish(&self, uri: &str, version: Option<i32>, diagnostics: Vec<Diagnostic>) {
        let Ok(lsp_uri) = uri.parse::<Uri>() else {
            tracing::warn!(uri, "Cannot publish diagnostics for an invalid URI");
            return;
        };

        let diagnostics = diagnostics.into_iter().map(convert_diagnostic).collect();
        self.client
            .publish_diagnostics(lsp_uri, diagnostics, version)
            .await;
    }

    async fn report_errors(&self, errors: Vec<String>) {
        let message = format!(
            "doiuse failed to validate {} document(s):\n{}",
            errors.len(),
            errors.join("\n")
        );
        self.client.show_message(MessageType::ERROR, message).await;
    }
}
