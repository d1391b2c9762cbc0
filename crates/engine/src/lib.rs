//! Boundary to the doiuse feature-usage scanner.
//!
//! The scanner itself is the `doiuse` npm package running on `postcss`. This crate
//! defines what the language server needs from it ([`FeatureScanner`]) and ships
//! [`NodeScanner`], which drives a persistent Node.js bridge process resolved from
//! the workspace's `node_modules`.

mod error;
mod finding;
mod node;
mod scanner;
mod syntax;

pub use error::{EngineError, ScanError};
pub use finding::{FeatureFinding, FeatureFlags, SourcePosition};
pub use node::{find_engine_module, NodeScanner, DEFAULT_SCAN_TIMEOUT, ENGINE_MODULE};
pub use scanner::{FeatureScanner, ScanRequest};
pub use syntax::{syntax_for, Syntax};
