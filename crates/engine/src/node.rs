//! Persistent Node.js bridge to doiuse.

use crate::{
    EngineError, FeatureFinding, FeatureFlags, FeatureScanner, ScanError, ScanRequest,
    SourcePosition, Syntax,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// npm package name of the scanning engine.
pub const ENGINE_MODULE: &str = "doiuse";

/// Per-scan timeout used unless overridden with [`NodeScanner::with_timeout`].
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes of bridge stderr kept for error reports.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

const BRIDGE_SCRIPT: &str = r#"import { createInterface } from 'node:readline';
import { stdin, stdout } from 'node:process';
import { createRequire } from 'node:module';
import { pathToFileURL } from 'node:url';

const require = createRequire(pathToFileURL(process.cwd() + '/'));

let postcss = null;
let doiuse = null;
try {
  postcss = require('postcss');
  doiuse = require('doiuse');
} catch (err) {
  const message = err && err.message ? err.message : String(err);
  console.error(`doiuse bridge failed to load doiuse: ${message}`);
  process.exit(2);
}

const syntaxes = new Map();
function loadSyntax(name) {
  if (!syntaxes.has(name)) {
    syntaxes.set(name, require(name));
  }
  return syntaxes.get(name);
}

stdout.write(JSON.stringify({ ready: true }) + '\n');

const rl = createInterface({ input: stdin, crlfDelay: Infinity });

for await (const line of rl) {
  if (!line.trim()) continue;

  let req;
  try {
    req = JSON.parse(line);
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    stdout.write(JSON.stringify({ id: null, error: `invalid json: ${message}` }) + '\n');
    continue;
  }

  const id = req.id;
  const findings = [];

  try {
    const syntax = req.syntax ? loadSyntax(req.syntax) : undefined;
    const plugin = doiuse({
      browsers: req.browsers,
      ignore: req.ignore || [],
      onFeatureUsage(usage) {
        const source = (usage.usage && usage.usage.source) || {};
        const start = source.start || { line: 1, column: 1 };
        const end = source.end || start;
        const data = usage.featureData || {};
        findings.push({
          feature: usage.feature,
          missing: Boolean(data.missing),
          partial: Boolean(data.partial),
          message: usage.message || '',
          start: { line: start.line, column: start.column },
          end: { line: end.line, column: end.column }
        });
      }
    });
    await postcss([plugin]).process(req.css, { from: undefined, syntax });
    stdout.write(JSON.stringify({ id, findings }) + '\n');
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    if (err && err.name === 'CssSyntaxError') {
      stdout.write(JSON.stringify({ id, parseError: message }) + '\n');
    } else {
      stdout.write(JSON.stringify({ id, error: message }) + '\n');
    }
  }
}
"#;

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    css: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    syntax: Option<&'static str>,
    browsers: &'a [String],
    ignore: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeResponse {
    id: Option<u64>,
    findings: Option<Vec<BridgeFinding>>,
    parse_error: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BridgeReady {
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct BridgeFinding {
    feature: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    partial: bool,
    #[serde(default)]
    message: String,
    start: BridgePosition,
    end: BridgePosition,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct BridgePosition {
    line: u32,
    column: u32,
}

impl From<BridgeFinding> for FeatureFinding {
    fn from(finding: BridgeFinding) -> Self {
        Self {
            feature_id: finding.feature,
            flags: FeatureFlags {
                missing: finding.missing,
                partial: finding.partial,
            },
            message: finding.message,
            position: SourcePosition {
                start_line: finding.start.line,
                start_column: finding.start.column,
                end_line: finding.end.line,
                end_column: finding.end.column,
            },
        }
    }
}

fn into_findings(
    response: BridgeResponse,
    expected_id: u64,
) -> Result<Vec<FeatureFinding>, ScanError> {
    match response.id {
        Some(id) if id == expected_id => {}
        Some(id) => {
            return Err(ScanError::Protocol(format!(
                "unexpected response id {id}, expected {expected_id}"
            )))
        }
        None => {
            return Err(ScanError::Protocol(
                response
                    .error
                    .unwrap_or_else(|| "missing response id".to_string()),
            ))
        }
    }

    if let Some(error) = response.error {
        return Err(ScanError::Engine(error));
    }
    if let Some(message) = response.parse_error {
        return Err(ScanError::Parse(message));
    }

    response
        .findings
        .map(|findings| findings.into_iter().map(FeatureFinding::from).collect())
        .ok_or_else(|| ScanError::Protocol("response without findings".to_string()))
}

/// Find the directory whose `node_modules` contains doiuse, walking up from `start`
/// the way Node's module resolution does.
#[must_use]
pub fn find_engine_module(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| {
            dir.join("node_modules")
                .join(ENGINE_MODULE)
                .join("package.json")
                .is_file()
        })
        .map(Path::to_path_buf)
}

/// [`FeatureScanner`] backed by a persistent `node` process running doiuse.
///
/// The process is started on the first scan and reused afterwards. Scans are
/// serialized on it. A crashed, hung or confused process is discarded and a
/// fresh one is started by the next scan.
pub struct NodeScanner {
    node_path: PathBuf,
    module_root: PathBuf,
    timeout: Option<Duration>,
    worker: Mutex<Option<BridgeWorker>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for NodeScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeScanner")
            .field("node_path", &self.node_path)
            .field("module_root", &self.module_root)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl NodeScanner {
    #[must_use]
    pub fn new(node_path: PathBuf, module_root: PathBuf) -> Self {
        Self {
            node_path,
            module_root,
            timeout: Some(DEFAULT_SCAN_TIMEOUT),
            worker: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Locate doiuse for a workspace and the `node` binary to run it with.
    #[tracing::instrument(skip_all, fields(workspace_root = %workspace_root.display()))]
    pub fn resolve(workspace_root: &Path) -> Result<Self, EngineError> {
        let module_root =
            find_engine_module(workspace_root).ok_or_else(|| EngineError::EngineNotFound {
                workspace_root: workspace_root.to_path_buf(),
            })?;
        let node_path = which::which("node").map_err(|_| EngineError::NodeNotFound)?;

        tracing::info!(
            module_root = %module_root.display(),
            node = %node_path.display(),
            "Resolved doiuse engine"
        );

        Ok(Self::new(node_path, module_root))
    }

    /// Set the per-scan timeout. `None` waits forever.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory the engine is resolved from.
    #[must_use]
    pub fn module_root(&self) -> &Path {
        &self.module_root
    }

    async fn exchange(
        &self,
        slot: &mut Option<BridgeWorker>,
        request: &BridgeRequest<'_>,
    ) -> Result<BridgeResponse, ScanError> {
        if slot.is_none() {
            *slot = Some(BridgeWorker::spawn(&self.node_path, &self.module_root).await?);
        }
        let Some(worker) = slot.as_mut() else {
            return Err(ScanError::Protocol("bridge worker unavailable".to_string()));
        };
        worker.request(request).await
    }
}

impl FeatureScanner for NodeScanner {
    async fn scan(&self, request: ScanRequest<'_>) -> Result<Vec<FeatureFinding>, ScanError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bridge_request = BridgeRequest {
            id,
            css: request.css,
            syntax: request.syntax.map(Syntax::module_name),
            browsers: request.browsers,
            ignore: request.ignore,
        };

        let mut slot = self.worker.lock().await;
        let result = match self.timeout {
            Some(limit) => {
                tokio::time::timeout(limit, self.exchange(&mut slot, &bridge_request))
                    .await
                    .unwrap_or(Err(ScanError::Timeout(limit)))
            }
            None => self.exchange(&mut slot, &bridge_request).await,
        };

        if result.as_ref().is_err_and(ScanError::is_fatal) {
            tracing::warn!("Discarding doiuse bridge process");
            *slot = None;
        }

        result.and_then(|response| into_findings(response, id))
    }
}

struct BridgeWorker {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<String>>,
}

impl BridgeWorker {
    async fn spawn(node_path: &Path, module_root: &Path) -> Result<Self, ScanError> {
        tracing::debug!(module_root = %module_root.display(), "Starting doiuse bridge");

        let mut child = Command::new(node_path)
            .args(["--input-type=module", "--eval", BRIDGE_SCRIPT])
            .current_dir(module_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ScanError::Protocol("failed to open bridge stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScanError::Protocol("failed to open bridge stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ScanError::Protocol("failed to open bridge stderr".to_string()))?;

        let stderr_task = tokio::spawn(stderr_tail(stderr, STDERR_TAIL_BYTES));

        let mut worker = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr_task: Some(stderr_task),
        };

        let ready_line = worker.next_line().await?;
        let ready: BridgeReady = serde_json::from_str(&ready_line)
            .map_err(|e| ScanError::Protocol(format!("invalid ready response: {e}")))?;
        if !ready.ready {
            return Err(ScanError::Protocol(format!(
                "unexpected ready response: {ready_line}"
            )));
        }

        Ok(worker)
    }

    async fn request(&mut self, request: &BridgeRequest<'_>) -> Result<BridgeResponse, ScanError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| ScanError::Protocol(format!("failed to serialize request: {e}")))?;
        line.push('\n');

        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let response_line = self.next_line().await?;
        serde_json::from_str(&response_line)
            .map_err(|e| ScanError::Protocol(format!("invalid response: {e} ({response_line})")))
    }

    async fn next_line(&mut self) -> Result<String, ScanError> {
        if let Some(line) = self.stdout.next_line().await? {
            return Ok(line);
        }

        let stderr = match self.stderr_task.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        let status = self.child.wait().await?;
        Err(ScanError::ProcessFailed {
            code: status.code().unwrap_or(-1),
            stderr,
        })
    }
}

/// Drain `reader` line by line, keeping roughly the last `limit` bytes.
/// The newest line is always kept.
async fn stderr_tail<R: AsyncRead + Unpin>(reader: R, limit: usize) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::new();
    let mut size = 0;

    while let Ok(Some(line)) = lines.next_line().await {
        tracing::trace!(target: "doiuse_bridge", "{line}");
        size += line.len() + 1;
        tail.push_back(line);
        while size > limit && tail.len() > 1 {
            if let Some(dropped) = tail.pop_front() {
                size -= dropped.len() + 1;
            }
        }
    }

    Vec::from(tail).join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> BridgeResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_findings_from_response() {
        let json = r#"{
            "id": 7,
            "findings": [{
                "feature": "css-gradients",
                "missing": true,
                "partial": false,
                "message": "<input css 1>:2:3: CSS Gradients not supported by: IE (9)",
                "start": { "line": 2, "column": 3 },
                "end": { "line": 2, "column": 40 }
            }]
        }"#;

        let findings = into_findings(response(json), 7).unwrap();
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.feature_id, "css-gradients");
        assert!(finding.flags.missing);
        assert!(!finding.flags.partial);
        assert_eq!(
            finding.position,
            SourcePosition {
                start_line: 2,
                start_column: 3,
                end_line: 2,
                end_column: 40,
            }
        );
    }

    #[test]
    fn test_findings_keep_engine_order() {
        let json = r#"{
            "id": 1,
            "findings": [
                { "feature": "b", "start": { "line": 3, "column": 1 }, "end": { "line": 3, "column": 2 } },
                { "feature": "a", "start": { "line": 1, "column": 1 }, "end": { "line": 1, "column": 2 } }
            ]
        }"#;

        let ids: Vec<_> = into_findings(response(json), 1)
            .unwrap()
            .into_iter()
            .map(|finding| finding.feature_id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_parse_error_response() {
        let result = into_findings(response(r#"{ "id": 3, "parseError": "Unclosed block" }"#), 3);
        assert!(matches!(result, Err(ScanError::Parse(message)) if message == "Unclosed block"));
    }

    #[test]
    fn test_engine_error_response() {
        let result = into_findings(response(r#"{ "id": 3, "error": "Unknown browser" }"#), 3);
        let error = result.unwrap_err();
        assert!(matches!(error, ScanError::Engine(_)));
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_mismatched_id_is_protocol_error() {
        let result = into_findings(response(r#"{ "id": 4, "findings": [] }"#), 3);
        let error = result.unwrap_err();
        assert!(matches!(error, ScanError::Protocol(_)));
        assert!(error.is_fatal());

        let result = into_findings(response(r#"{ "id": null, "error": "invalid json" }"#), 3);
        assert!(matches!(result, Err(ScanError::Protocol(message)) if message == "invalid json"));
    }

    #[test]
    fn test_request_serialization() {
        let browsers = vec!["ie >= 9".to_string()];
        let ignore = Vec::new();
        let request = BridgeRequest {
            id: 1,
            css: "a { color: red }",
            syntax: Some(Syntax::Scss.module_name()),
            browsers: &browsers,
            ignore: &ignore,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["syntax"], "postcss-scss");
        assert_eq!(value["browsers"][0], "ie >= 9");

        let request = BridgeRequest {
            syntax: None,
            ..request
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("syntax").is_none());
    }

    #[test]
    fn test_find_engine_module_walks_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        let module_dir = temp_dir.path().join("node_modules").join(ENGINE_MODULE);
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(module_dir.join("package.json"), "{}").unwrap();

        let nested = temp_dir.path().join("packages").join("web");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_engine_module(&nested),
            Some(temp_dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_resolve_without_engine() {
        let temp_dir = tempfile::tempdir().unwrap();
        if find_engine_module(temp_dir.path()).is_some() {
            // A doiuse install above the temp dir would make this test meaningless.
            return;
        }

        let error = NodeScanner::resolve(temp_dir.path()).unwrap_err();
        assert!(matches!(error, EngineError::EngineNotFound { .. }));
        assert!(error.to_string().contains("npm install"));
    }

    #[tokio::test]
    async fn test_stderr_tail_keeps_newest_lines() {
        let output: String = (0..100).map(|i| format!("warning {i:03}\n")).collect();
        let tail = stderr_tail(output.as_bytes(), 48).await;

        let lines: Vec<_> = tail.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines.first(), Some(&"warning 096"));
        assert_eq!(lines.last(), Some(&"warning 099"));
    }

    #[tokio::test]
    async fn test_stderr_tail_keeps_oversized_last_line() {
        let long = "x".repeat(100);
        let output = format!("first\n{long}\n");
        let tail = stderr_tail(output.as_bytes(), 10).await;
        assert_eq!(tail, long);
    }
}
