use crate::diagnostics::{build_diagnostics, Diagnostic};
use crate::ignore::workspace_relative_path;
use crate::{
    ActiveSettings, BrowserTargetResolver, Document, DocumentStore, PipelineError, SettingsStore,
};
use dashmap::DashMap;
use doiuse_config::{TriggerMode, ValidationSettings};
use doiuse_engine::{syntax_for, FeatureScanner, ScanError, ScanRequest};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Receives the results of validation passes.
pub trait DiagnosticSink: Send + Sync {
    /// Replace every diagnostic of `uri` with `diagnostics`.
    fn publish(
        &self,
        uri: &str,
        version: Option<i32>,
        diagnostics: Vec<Diagnostic>,
    ) -> impl Future<Output = ()> + Send;

    /// Surface the failures of one batch, one line per failing document.
    fn report_errors(&self, errors: Vec<String>) -> impl Future<Output = ()> + Send;
}

/// How a validation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Diagnostics were published.
    Published,
    /// The file matches an ignore glob; an empty set was published.
    Ignored,
    /// No browser target applies; an empty set was published.
    Indeterminate,
    /// The stylesheet did not parse; previous diagnostics stay.
    ParseFailure,
    /// Validation is off, unconfigured or has no engine.
    Disabled,
    /// A newer pass for the same document exists, or it was closed.
    Superseded,
}

impl PassOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Ignored => "ignored",
            Self::Indeterminate => "indeterminate",
            Self::ParseFailure => "parse-failure",
            Self::Disabled => "disabled",
            Self::Superseded => "superseded",
        }
    }
}

/// Result of validating a set of documents for one trigger.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Outcome per document, for passes that did not fail.
    pub outcomes: Vec<(String, PassOutcome)>,
    /// `"<uri>: <error>"` for every failed pass.
    pub failures: Vec<String>,
}

impl BatchReport {
    #[must_use]
    pub fn outcome(&self, uri: &str) -> Option<PassOutcome> {
        self.outcomes
            .iter()
            .find(|(candidate, _)| candidate == uri)
            .map(|(_, outcome)| *outcome)
    }
}

/// Snapshot of the orchestrator state, for status reporting.
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    pub workspace_root: Option<PathBuf>,
    pub engine_loaded: bool,
    pub settings: Option<ValidationSettings>,
    pub open_documents: usize,
    pub cached_scopes: usize,
}

/// Per-document pass tickets. Only the newest ticket of a URI may publish.
#[derive(Debug, Default)]
struct Generations {
    counter: AtomicU64,
    latest: DashMap<String, u64>,
}

impl Generations {
    fn issue(&self, uri: &str) -> u64 {
        let ticket = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.latest.insert(uri.to_string(), ticket);
        ticket
    }

    fn is_current(&self, uri: &str, ticket: u64) -> bool {
        self.latest.get(uri).is_some_and(|latest| *latest == ticket)
    }

    fn retire(&self, uri: &str) {
        self.latest.remove(uri);
    }
}

/// Runs validation passes for open documents.
pub struct Orchestrator<S, P> {
    settings: SettingsStore,
    resolver: BrowserTargetResolver,
    documents: DocumentStore,
    scanner: RwLock<Option<Arc<S>>>,
    generations: Generations,
    sink: P,
}

impl<S, P> std::fmt::Debug for Orchestrator<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("resolver", &self.resolver)
            .field("documents", &self.documents.len())
            .finish_non_exhaustive()
    }
}

impl<S: FeatureScanner, P: DiagnosticSink> Orchestrator<S, P> {
    #[must_use]
    pub fn new(sink: P) -> Self {
        Self::with_resolver(sink, BrowserTargetResolver::default())
    }

    #[must_use]
    pub fn with_resolver(sink: P, resolver: BrowserTargetResolver) -> Self {
        Self {
            settings: SettingsStore::new(),
            resolver,
            documents: DocumentStore::new(),
            scanner: RwLock::new(None),
            generations: Generations::default(),
            sink,
        }
    }

    #[must_use]
    pub const fn sink(&self) -> &P {
        &self.sink
    }

    #[must_use]
    pub const fn resolver(&self) -> &BrowserTargetResolver {
        &self.resolver
    }

    #[must_use]
    pub const fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    #[must_use]
    pub fn settings(&self) -> Option<Arc<ActiveSettings>> {
        self.settings.current().ok()
    }

    pub fn set_scanner(&self, scanner: Option<Arc<S>>) {
        *self.scanner.write().unwrap_or_else(PoisonError::into_inner) = scanner;
    }

    #[must_use]
    pub fn has_scanner(&self) -> bool {
        self.scanner().is_some()
    }

    fn scanner(&self) -> Option<Arc<S>> {
        self.scanner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_workspace_root(&self, root: Option<PathBuf>) {
        self.resolver.set_workspace_root(root);
    }

    #[must_use]
    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            workspace_root: self.resolver.workspace_root(),
            engine_loaded: self.has_scanner(),
            settings: self.settings().map(|active| active.validation.clone()),
            open_documents: self.documents.len(),
            cached_scopes: self.resolver.cached_scope_count(),
        }
    }

    fn trigger_mode(&self) -> TriggerMode {
        self.settings()
            .map(|active| active.validation.trigger)
            .unwrap_or_default()
    }

    /// Replace the settings, drop cached targets and revalidate everything open.
    pub async fn on_configuration_changed(&self, settings: ValidationSettings) -> BatchReport {
        tracing::info!(
            enabled = settings.enabled,
            message_level = %settings.message_level,
            trigger = ?settings.trigger,
            "Settings changed"
        );
        self.settings.set(settings);
        self.resolver.invalidate();
        self.revalidate_all().await
    }

    /// A browserslist declaration changed on disk.
    pub async fn on_watched_files_changed(&self) -> BatchReport {
        self.resolver.invalidate();
        self.revalidate_all().await
    }

    pub async fn on_document_opened(&self, document: Document) -> BatchReport {
        self.documents.open(document.clone());
        if self.trigger_mode() == TriggerMode::OnType {
            self.validate_batch(vec![document]).await
        } else {
            BatchReport::default()
        }
    }

    pub async fn on_document_changed(
        &self,
        uri: &str,
        text: String,
        version: Option<i32>,
    ) -> BatchReport {
        let Some(document) = self.documents.update(uri, text, version) else {
            tracing::warn!(uri, "Change for a document that is not open");
            return BatchReport::default();
        };
        if self.trigger_mode() == TriggerMode::OnType {
            self.validate_batch(vec![document]).await
        } else {
            BatchReport::default()
        }
    }

    pub async fn on_document_saved(&self, uri: &str, text: Option<String>) -> BatchReport {
        let document = match text {
            Some(text) => self.documents.update(uri, text, None),
            None => self.documents.get(uri),
        };
        let Some(document) = document else {
            tracing::warn!(uri, "Save for a document that is not open");
            return BatchReport::default();
        };
        if self.trigger_mode() == TriggerMode::OnSave {
            self.validate_batch(vec![document]).await
        } else {
            BatchReport::default()
        }
    }

    /// Forget the document and clear its diagnostics.
    pub async fn on_document_closed(&self, uri: &str) {
        self.generations.retire(uri);
        if self.documents.close(uri).is_some() {
            self.sink.publish(uri, None, Vec::new()).await;
        }
    }

    pub async fn revalidate_all(&self) -> BatchReport {
        self.validate_batch(self.documents.all()).await
    }

    /// Validate documents concurrently and report every failure in one message.
    pub async fn validate_batch(&self, documents: Vec<Document>) -> BatchReport {
        let passes = documents.iter().map(|document| async move {
            let result = self.validate_document(document).await;
            (document.uri.as_str(), result)
        });
        let results = futures_util::future::join_all(passes).await;

        let mut report = BatchReport::default();
        for (uri, result) in results {
            match result {
                Ok(outcome) => report.outcomes.push((uri.to_string(), outcome)),
                Err(error) => {
                    tracing::error!(uri, %error, "Validation failed");
                    report.failures.push(format!("{uri}: {error}"));
                }
            }
        }

        if !report.failures.is_empty() {
            self.sink.report_errors(report.failures.clone()).await;
        }
        report
    }

    /// Run one validation pass and publish its result.
    #[tracing::instrument(skip_all, fields(uri = %document.uri, version = ?document.version))]
    pub async fn validate_document(
        &self,
        document: &Document,
    ) -> Result<PassOutcome, PipelineError> {
        let ticket = self.generations.issue(&document.uri);
        let result = self.run_pass(document, ticket).await;

        let result = match result {
            Err(_) if !self.generations.is_current(&document.uri, ticket) => {
                Ok(PassOutcome::Superseded)
            }
            other => other,
        };
        if let Ok(outcome) = result {
            tracing::debug!(outcome = outcome.as_str(), "Validation pass finished");
        }
        result
    }

    async fn run_pass(
        &self,
        document: &Document,
        ticket: u64,
    ) -> Result<PassOutcome, PipelineError> {
        let Ok(settings) = self.settings.current() else {
            return Ok(PassOutcome::Disabled);
        };
        let validation = &settings.validation;

        if !validation.enabled {
            return Ok(self
                .publish(document, ticket, Vec::new(), PassOutcome::Disabled)
                .await);
        }

        if self.is_ignored(document, &settings) {
            return Ok(self
                .publish(document, ticket, Vec::new(), PassOutcome::Ignored)
                .await);
        }

        let browsers = self
            .resolver
            .resolve(document.path.as_deref(), validation)
            .await?;
        if browsers.is_empty() {
            tracing::debug!("No browser target applies");
            return Ok(self
                .publish(document, ticket, Vec::new(), PassOutcome::Indeterminate)
                .await);
        }

        let Some(scanner) = self.scanner() else {
            return Ok(PassOutcome::Disabled);
        };
        if !self.generations.is_current(&document.uri, ticket) {
            return Ok(PassOutcome::Superseded);
        }

        let request = ScanRequest {
            css: &document.text,
            syntax: syntax_for(&document.language_id),
            browsers: &browsers,
            ignore: &validation.ignore_features,
        };
        let findings = match scanner.scan(request).await {
            Ok(findings) => findings,
            Err(ScanError::Parse(message)) => {
                tracing::debug!(message, "Stylesheet did not parse");
                return Ok(PassOutcome::ParseFailure);
            }
            Err(error) => return Err(error.into()),
        };

        let diagnostics = build_diagnostics(&findings, validation.message_level);
        Ok(self
            .publish(document, ticket, diagnostics, PassOutcome::Published)
            .await)
    }

    fn is_ignored(&self, document: &Document, settings: &ActiveSettings) -> bool {
        if settings.ignore.is_empty() {
            return false;
        }
        let candidate = match &document.path {
            Some(path) => {
                workspace_relative_path(path, self.resolver.workspace_root().as_deref())
            }
            None => document.uri.clone(),
        };
        settings.ignore.is_ignored(&candidate)
    }

    async fn publish(
        &self,
        document: &Document,
        ticket: u64,
        diagnostics: Vec<Diagnostic>,
        outcome: PassOutcome,
    ) -> PassOutcome {
        if !self.generations.is_current(&document.uri, ticket) {
            return PassOutcome::Superseded;
        }
        self.sink
            .publish(&document.uri, document.version, diagnostics)
            .await;
        outcome
    }
}
