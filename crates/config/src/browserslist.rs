use crate::{ConfigError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Package manifest that may carry a `browserslist` field.
pub const PACKAGE_MANIFEST: &str = "package.json";

/// Dedicated browserslist declaration files, in order of preference.
pub const DECLARATION_FILES: &[&str] = &["browserslist", ".browserslistrc"];

/// Environment section used when `package.json` declares per-environment queries
/// and neither `BROWSERSLIST_ENV` nor `NODE_ENV` is set.
const DEFAULT_ENV: &str = "production";

/// Where a browserslist declaration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    /// The `browserslist` field of a `package.json`
    PackageManifest,
    /// A `browserslist` or `.browserslistrc` file
    BrowserslistFile,
}

/// A browserslist declaration found in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub path: PathBuf,
    pub kind: DeclarationKind,
    pub queries: Vec<String>,
}

/// Check whether a changed file can affect browser-target discovery.
#[must_use]
pub fn is_declaration_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == PACKAGE_MANIFEST || DECLARATION_FILES.contains(&name))
}

/// Look for a browserslist declaration directly inside `dir`.
///
/// The `package.json` field is checked first, then the dedicated files. A
/// `package.json` without a `browserslist` field does not stop the search.
#[tracing::instrument(skip_all, fields(dir = %dir.display()))]
pub fn load_declaration(dir: &Path) -> Result<Option<Declaration>> {
    let manifest_path = dir.join(PACKAGE_MANIFEST);
    if manifest_path.is_file() {
        let contents = read(&manifest_path)?;
        if let Some(queries) = parse_package_browserslist(&contents, &manifest_path)? {
            tracing::debug!(path = %manifest_path.display(), "Found browserslist field");
            return Ok(Some(Declaration {
                path: manifest_path,
                kind: DeclarationKind::PackageManifest,
                queries,
            }));
        }
    }

    for file_name in DECLARATION_FILES {
        let path = dir.join(file_name);
        if path.is_file() {
            let contents = read(&path)?;
            tracing::debug!(path = %path.display(), "Found browserslist file");
            return Ok(Some(Declaration {
                queries: parse_browserslist(&contents),
                path,
                kind: DeclarationKind::BrowserslistFile,
            }));
        }
    }

    Ok(None)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a bare browserslist file.
///
/// Full-line `#` comments and blank lines are dropped; every other line is one
/// query, trimmed. Order and duplicates are preserved.
#[must_use]
pub fn parse_browserslist(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

/// Extract the `browserslist` field from `package.json` contents.
///
/// Returns `Ok(None)` when the manifest has no such field.
pub fn parse_package_browserslist(contents: &str, path: &Path) -> Result<Option<Vec<String>>> {
    let manifest: serde_json::Value =
        serde_json::from_str(contents).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: format!("JSON parse error: {e}"),
        })?;

    let Some(field) = manifest.get("browserslist") else {
        return Ok(None);
    };

    let field = match field {
        serde_json::Value::Object(environments) => {
            let env = environment_name();
            match environments
                .get(&env)
                .or_else(|| environments.get("defaults"))
            {
                Some(section) => section,
                None => {
                    tracing::debug!(env, "No browserslist section for environment");
                    return Ok(None);
                }
            }
        }
        other => other,
    };

    queries_from_value(field)
        .map(Some)
        .ok_or_else(|| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: "\"browserslist\" must be a string or an array of strings".to_string(),
        })
}

fn queries_from_value(value: &serde_json::Value) -> Option<Vec<String>> {
    match value {
        serde_json::Value::String(query) => Some(vec![query.clone()]),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(ToString::to_string))
            .collect(),
        _ => None,
    }
}

fn environment_name() -> String {
    std::env::var("BROWSERSLIST_ENV")
        .or_else(|_| std::env::var("NODE_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string())
}

/// Queries from the `BROWSERSLIST` environment variable, if set.
///
/// The variable holds a comma-separated query list, e.g. `"> 1%, ie >= 11"`.
#[must_use]
pub fn queries_from_env() -> Option<Vec<String>> {
    let value = std::env::var("BROWSERSLIST").ok()?;
    let queries: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .map(ToString::to_string)
        .collect();

    if queries.is_empty() {
        None
    } else {
        Some(queries)
    }
}
