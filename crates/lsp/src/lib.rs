//! doiuse Language Server Protocol implementation.
//!
//! Reports the CSS features used by open stylesheets that the configured
//! browser targets do not support. Communicates over stdio.

mod conversions;
mod server;
mod sink;

use server::DoiuseLanguageServer;
use tower_lsp_server::{LspService, Server};

/// Initialize tracing for the language server.
///
/// Logs go to stderr because stdout carries the protocol. Safe to call
/// more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Run the doiuse language server over stdio.
///
/// ```ignore
/// fn main() {
///     tokio::runtime::Builder::new_current_thread()
///         .enable_all()
///         .build()
///         .unwrap()
///         .block_on(doiuse_lsp::run_server());
/// }
/// ```
pub async fn run_server() {
    init_tracing();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(DoiuseLanguageServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
