use crate::conversions::format_status;
use crate::sink::ClientSink;
use doiuse_analysis::{Document, Orchestrator, ValidationSettings};
use doiuse_config::{is_declaration_file, DECLARATION_FILES, PACKAGE_MANIFEST};
use doiuse_engine::{EngineError, NodeScanner};
use lsp_types::{
    DidChangeConfigurationParams, DidChangeTextDocumentParams, DidChangeWatchedFilesParams,
    DidChangeWatchedFilesRegistrationOptions, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams, ExecuteCommandOptions,
    ExecuteCommandParams, FileSystemWatcher, GlobPattern, InitializeParams, InitializeResult,
    InitializedParams, MessageType, Registration, SaveOptions, ServerCapabilities, ServerInfo,
    TextDocumentSyncCapability, TextDocumentSyncKind, TextDocumentSyncOptions,
    TextDocumentSyncSaveOptions, Uri, WatchKind, WorkDoneProgressOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_lsp_server::jsonrpc::{Error, ErrorCode, Result};
use tower_lsp_server::{Client, LanguageServer, UriExt};

const CHECK_STATUS_COMMAND: &str = "doiuse.checkStatus";

pub struct DoiuseLanguageServer {
    client: Client,
    orchestrator: Orchestrator<NodeScanner, ClientSink>,
}

impl DoiuseLanguageServer {
    pub fn new(client: Client) -> Self {
        Self {
            orchestrator: Orchestrator::new(ClientSink::new(client.clone())),
            client,
        }
    }

    fn file_path(uri: &Uri) -> Option<PathBuf> {
        uri.to_file_path().map(std::borrow::Cow::into_owned)
    }

    /// Resolve the doiuse engine from the workspace, unless it is loaded already.
    fn load_engine(&self) -> std::result::Result<(), EngineError> {
        if self.orchestrator.has_scanner() {
            return Ok(());
        }

        let root = self
            .orchestrator
            .resolver()
            .workspace_root()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();

        let scanner = NodeScanner::resolve(&root)?;
        tracing::info!(
            module_root = %scanner.module_root().display(),
            "Loaded doiuse engine"
        );
        self.orchestrator.set_scanner(Some(Arc::new(scanner)));
        Ok(())
    }

    /// Load the engine only when validation is enabled. Workspaces that never
    /// opted in do not need doiuse installed.
    fn prepare_engine(
        &self,
        settings: &ValidationSettings,
    ) -> std::result::Result<(), EngineError> {
        if settings.enabled {
            self.load_engine()
        } else {
            Ok(())
        }
    }

    fn parse_settings(
        value: serde_json::Value,
    ) -> std::result::Result<ValidationSettings, String> {
        ValidationSettings::from_json(value).map_err(|e| e.to_string())
    }
}

impl LanguageServer for DoiuseLanguageServer {
    #[tracing::instrument(skip(self, params))]
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        tracing::info!("Initializing doiuse Language Server");

        let folder_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|folder| Self::file_path(&folder.uri));
        #[allow(deprecated)]
        let root = folder_root.or_else(|| params.root_uri.as_ref().and_then(Self::file_path));
        tracing::info!(root = ?root, "Workspace root");
        self.orchestrator.set_workspace_root(root);

        match params.initialization_options {
            Some(options) => {
                let settings = Self::parse_settings(options).map_err(Error::invalid_params)?;
                if let Err(e) = self.prepare_engine(&settings) {
                    tracing::error!("{e}");
                    return Err(Error {
                        code: ErrorCode::InternalError,
                        message: e.to_string().into(),
                        data: Some(serde_json::json!({ "retry": true })),
                    });
                }
                self.orchestrator.on_configuration_changed(settings).await;
            }
            None => {
                if let Err(e) = self.load_engine() {
                    tracing::debug!("doiuse engine not available yet: {e}");
                }
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![CHECK_STATUS_COMMAND.to_string()],
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "doiuse Language Server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        let version = env!("CARGO_PKG_VERSION");
        tracing::info!(version, "doiuse Language Server initialized");
        self.client
            .log_message(
                MessageType::INFO,
                format!("doiuse LSP initialized (v{version})"),
            )
            .await;

        let watchers: Vec<FileSystemWatcher> = std::iter::once(PACKAGE_MANIFEST)
            .chain(DECLARATION_FILES.iter().copied())
            .map(|filename| FileSystemWatcher {
                glob_pattern: GlobPattern::String(format!("**/{filename}")),
                kind: Some(WatchKind::all()),
            })
            .collect();

        let register_options =
            match serde_json::to_value(DidChangeWatchedFilesRegistrationOptions { watchers }) {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!("Failed to encode watcher registration: {e}");
                    return;
                }
            };

        let registration = Registration {
            id: "doiuse-browserslist-watcher".to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: Some(register_options),
        };

        match self.client.register_capability(vec![registration]).await {
            Ok(()) => tracing::info!("Registered browserslist file watchers"),
            Err(e) => tracing::error!("Failed to register browserslist file watchers: {e:?}"),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down doiuse Language Server");
        Ok(())
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let settings = match Self::parse_settings(params.settings) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!("{e}");
                self.client.show_message(MessageType::ERROR, e).await;
                return;
            }
        };

        if let Err(e) = self.prepare_engine(&settings) {
            tracing::warn!("{e}");
            self.client.show_message(MessageType::ERROR, e).await;
        }

        self.orchestrator.on_configuration_changed(settings).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let relevant = params.changes.iter().any(|change| {
            Self::file_path(&change.uri).is_some_and(|path| is_declaration_file(&path))
        });
        if !relevant {
            tracing::debug!("No browserslist declaration among changed files");
            return;
        }

        tracing::info!("Browserslist declaration changed, revalidating open documents");
        self.orchestrator.on_watched_files_changed().await;
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let item = params.text_document;
        tracing::debug!(uri = ?item.uri, language_id = %item.language_id, "Document opened");

        let document = Document::new(
            item.uri.to_string(),
            Self::file_path(&item.uri),
            item.language_id,
            item.text,
            Some(item.version),
        );
        self.orchestrator.on_document_opened(document).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        let uri = params.text_document.uri.to_string();
        self.orchestrator
            .on_document_changed(&uri, change.text, Some(params.text_document.version))
            .await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri.to_string();
        self.orchestrator.on_document_saved(&uri, params.text).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        tracing::debug!(uri = ?params.text_document.uri, "Document closed");
        let uri = params.text_document.uri.to_string();
        self.orchestrator.on_document_closed(&uri).await;
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> Result<Option<serde_json::Value>> {
        tracing::info!("Execute command requested: {}", params.command);

        if params.command != CHECK_STATUS_COMMAND {
            tracing::warn!("Unknown command: {}", params.command);
            return Ok(None);
        }

        let status = self.orchestrator.status();
        let full_report = format!("\n=== doiuse LSP Status ===\n{}\n", format_status(&status));
        tracing::info!("{full_report}");
        self.client
            .log_message(MessageType::INFO, full_report)
            .await;

        let summary = if status.engine_loaded {
            format!(
                "doiuse is validating {} document(s) - Check output for details",
                status.open_documents
            )
        } else {
            "doiuse engine is not loaded - Check output for details".to_string()
        };
        self.client.show_message(MessageType::INFO, summary).await;

        Ok(Some(serde_json::json!({ "success": true })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doiuse_engine::find_engine_module;
    use tower_lsp_server::LspService;

    fn server_in(root: &std::path::Path) -> LspService<DoiuseLanguageServer> {
        let (service, _socket) = LspService::new(DoiuseLanguageServer::new);
        service
            .inner()
            .orchestrator
            .set_workspace_root(Some(root.to_path_buf()));
        service
    }

    #[test]
    fn test_disabled_settings_do_not_need_engine() {
        let temp_dir = tempfile::tempdir().unwrap();
        let service = server_in(temp_dir.path());
        let server = service.inner();

        let settings = ValidationSettings::default();
        assert!(!settings.enabled);
        assert!(server.prepare_engine(&settings).is_ok());
        assert!(!server.orchestrator.has_scanner());
    }

    #[test]
    fn test_enabled_settings_require_engine() {
        let temp_dir = tempfile::tempdir().unwrap();
        if find_engine_module(temp_dir.path()).is_some() {
            // A doiuse install above the temp dir would make this test meaningless.
            return;
        }
        let service = server_in(temp_dir.path());
        let server = service.inner();

        let settings = ValidationSettings {
            enabled: true,
            ..ValidationSettings::default()
        };
        let error = server.prepare_engine(&settings).unwrap_err();
        assert!(matches!(error, EngineError::EngineNotFound { .. }));
    }
}
