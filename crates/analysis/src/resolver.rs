use doiuse_config::{load_declaration, queries_from_env, ConfigError, ValidationSettings};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

#[derive(Debug, Default)]
struct TargetCache {
    /// Bumped on every invalidation.
    epoch: u64,
    scopes: HashMap<PathBuf, Arc<[String]>>,
}

/// Resolves the browser targets that apply to a file.
///
/// Resolution order:
/// 1. explicit `browsers` from the settings
/// 2. the nearest declaration found walking up from the file's directory to the
///    workspace root (`package.json` field, `browserslist`, `.browserslistrc`)
/// 3. the `BROWSERSLIST` environment variable, captured at construction
///
/// Results from steps 2 and 3 are cached per directory.
#[derive(Debug)]
pub struct BrowserTargetResolver {
    workspace_root: RwLock<Option<PathBuf>>,
    default_targets: Arc<[String]>,
    cache: Mutex<TargetCache>,
}

impl Default for BrowserTargetResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

impl BrowserTargetResolver {
    #[must_use]
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self::with_default_targets(workspace_root, queries_from_env().unwrap_or_default())
    }

    /// Create a resolver with an explicit fallback target.
    #[must_use]
    pub fn with_default_targets(workspace_root: Option<PathBuf>, defaults: Vec<String>) -> Self {
        Self {
            workspace_root: RwLock::new(workspace_root),
            default_targets: defaults.into(),
            cache: Mutex::new(TargetCache::default()),
        }
    }

    #[must_use]
    pub fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace_root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the directory the upward walk stops at. Clears the cache.
    pub fn set_workspace_root(&self, root: Option<PathBuf>) {
        *self
            .workspace_root
            .write()
            .unwrap_or_else(PoisonError::into_inner) = root;
        self.invalidate();
    }

    /// Drop every cached scope.
    ///
    /// Lookups already in flight will not insert their results.
    pub fn invalidate(&self) {
        let mut cache = self.lock_cache();
        cache.epoch += 1;
        cache.scopes.clear();
        tracing::debug!(epoch = cache.epoch, "Browser target cache cleared");
    }

    #[must_use]
    pub fn cached_scope_count(&self) -> usize {
        self.lock_cache().scopes.len()
    }

    fn lock_cache(&self) -> MutexGuard<'_, TargetCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached(&self, dir: &Path) -> Option<Arc<[String]>> {
        self.lock_cache().scopes.get(dir).cloned()
    }

    /// Browser targets for a file. `None` means the document has no
    /// filesystem path and only the settings or the default apply.
    ///
    /// An empty result means the target is indeterminate.
    pub async fn resolve(
        &self,
        file_path: Option<&Path>,
        settings: &ValidationSettings,
    ) -> Result<Arc<[String]>, ConfigError> {
        if settings.has_explicit_browsers() {
            return Ok(settings.browsers.clone().into());
        }

        let Some(start) = file_path.and_then(Path::parent) else {
            return Ok(Arc::clone(&self.default_targets));
        };

        let epoch = self.lock_cache().epoch;
        let root = self
            .workspace_root()
            .filter(|root| start.starts_with(root));

        let mut visited = Vec::new();
        let mut resolved = None;
        for dir in start.ancestors() {
            if let Some(targets) = self.cached(dir) {
                resolved = Some(targets);
                break;
            }

            visited.push(dir.to_path_buf());
            if let Some(targets) = self.load_scope(dir).await? {
                resolved = Some(targets);
                break;
            }

            if root.as_deref() == Some(dir) {
                break;
            }
        }

        let targets = resolved.unwrap_or_else(|| Arc::clone(&self.default_targets));

        let mut cache = self.lock_cache();
        if cache.epoch == epoch {
            for dir in visited {
                cache.scopes.insert(dir, Arc::clone(&targets));
            }
        } else {
            tracing::debug!("Cache invalidated during resolution, result not stored");
        }

        Ok(targets)
    }

    /// Read the declaration in `dir`, if any. Declarations without queries
    /// do not stop the walk.
    async fn load_scope(&self, dir: &Path) -> Result<Option<Arc<[String]>>, ConfigError> {
        let owned = dir.to_path_buf();
        let declaration = tokio::task::spawn_blocking(move || load_declaration(&owned))
            .await
            .map_err(|e| ConfigError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::other(e),
            })??;

        match declaration {
            Some(declaration) if !declaration.queries.is_empty() => {
                tracing::info!(
                    scope = %dir.display(),
                    source = %declaration.path.display(),
                    browsers = ?declaration.queries,
                    "Resolved browser targets"
                );
                Ok(Some(declaration.queries.into()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn settings() -> ValidationSettings {
        ValidationSettings {
            enabled: true,
            ..ValidationSettings::default()
        }
    }

    fn workspace() -> TempDir {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp_dir.path().join("app/styles/components")).unwrap();
        temp_dir
    }

    #[tokio::test]
    async fn test_explicit_browsers_win() {
        let temp_dir = workspace();
        fs::write(temp_dir.path().join(".browserslistrc"), "chrome 100\n").unwrap();
        let resolver = BrowserTargetResolver::new(Some(temp_dir.path().to_path_buf()));

        let settings = ValidationSettings {
            browsers: vec!["ie >= 9".to_string()],
            ..settings()
        };
        let file = temp_dir.path().join("app/a.css");
        let targets = resolver.resolve(Some(&file), &settings).await.unwrap();

        assert_eq!(&*targets, ["ie >= 9".to_string()]);
        assert_eq!(resolver.cached_scope_count(), 0);
    }

    #[tokio::test]
    async fn test_nearest_declaration_wins() {
        let temp_dir = workspace();
        fs::write(temp_dir.path().join(".browserslistrc"), "chrome 100\n").unwrap();
        fs::write(
            temp_dir.path().join("app/package.json"),
            r#"{ "browserslist": ["ie >= 11"] }"#,
        )
        .unwrap();
        let resolver = BrowserTargetResolver::with_default_targets(
            Some(temp_dir.path().to_path_buf()),
            Vec::new(),
        );

        let nested = temp_dir.path().join("app/styles/components/button.css");
        let targets = resolver.resolve(Some(&nested), &settings()).await.unwrap();
        assert_eq!(&*targets, ["ie >= 11".to_string()]);

        let top = temp_dir.path().join("site.css");
        let targets = resolver.resolve(Some(&top), &settings()).await.unwrap();
        assert_eq!(&*targets, ["chrome 100".to_string()]);
    }

    #[tokio::test]
    async fn test_cache_hit_shares_result() {
        let temp_dir = workspace();
        fs::write(temp_dir.path().join("browserslist"), "firefox esr\n").unwrap();
        let resolver = BrowserTargetResolver::new(Some(temp_dir.path().to_path_buf()));

        let first = temp_dir.path().join("app/styles/a.css");
        let second = temp_dir.path().join("app/b.css");
        let a = resolver.resolve(Some(&first), &settings()).await.unwrap();
        // styles, app and the root are all cached after one walk.
        assert_eq!(resolver.cached_scope_count(), 3);

        let b = resolver.resolve(Some(&second), &settings()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        // Changing the file on disk is invisible until invalidation.
        fs::write(temp_dir.path().join("browserslist"), "safari 15\n").unwrap();
        let stale = resolver.resolve(Some(&first), &settings()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &stale));

        resolver.invalidate();
        assert_eq!(resolver.cached_scope_count(), 0);
        let fresh = resolver.resolve(Some(&first), &settings()).await.unwrap();
        assert_eq!(&*fresh, ["safari 15".to_string()]);
    }

    #[tokio::test]
    async fn test_lookup_racing_invalidation_is_not_cached() {
        let temp_dir = workspace();
        fs::write(temp_dir.path().join(".browserslistrc"), "ie 9\n").unwrap();
        let resolver = BrowserTargetResolver::new(Some(temp_dir.path().to_path_buf()));

        let file = temp_dir.path().join("app/styles/a.css");
        let settings = settings();
        let (targets, ()) = tokio::join!(resolver.resolve(Some(&file), &settings), async {
            tokio::task::yield_now().await;
            resolver.invalidate();
        });

        assert_eq!(&*targets.unwrap(), ["ie 9".to_string()]);
        assert_eq!(resolver.cached_scope_count(), 0);
    }

    #[tokio::test]
    async fn test_default_targets_when_nothing_declared() {
        let temp_dir = workspace();
        let resolver = BrowserTargetResolver::with_default_targets(
            Some(temp_dir.path().to_path_buf()),
            vec!["defaults".to_string()],
        );

        let file = temp_dir.path().join("app/a.css");
        let targets = resolver.resolve(Some(&file), &settings()).await.unwrap();
        assert_eq!(&*targets, ["defaults".to_string()]);

        let targets = resolver.resolve(None, &settings()).await.unwrap();
        assert_eq!(&*targets, ["defaults".to_string()]);
    }

    #[tokio::test]
    async fn test_walk_stops_at_workspace_root() {
        let outer = tempfile::tempdir().unwrap();
        fs::write(outer.path().join(".browserslistrc"), "chrome 100\n").unwrap();
        let root = outer.path().join("project");
        fs::create_dir_all(root.join("src")).unwrap();

        let resolver = BrowserTargetResolver::with_default_targets(Some(root.clone()), Vec::new());
        let file = root.join("src/a.css");
        let targets = resolver.resolve(Some(&file), &settings()).await.unwrap();
        assert!(targets.is_empty());
    }

    #[tokio::test]
    async fn test_empty_declaration_does_not_stop_walk() {
        let temp_dir = workspace();
        fs::write(temp_dir.path().join(".browserslistrc"), "ie >= 10\n").unwrap();
        fs::write(temp_dir.path().join("app/browserslist"), "# nothing yet\n").unwrap();
        let resolver = BrowserTargetResolver::new(Some(temp_dir.path().to_path_buf()));

        let file = temp_dir.path().join("app/a.css");
        let targets = resolver.resolve(Some(&file), &settings()).await.unwrap();
        assert_eq!(&*targets, ["ie >= 10".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_an_error() {
        let temp_dir = workspace();
        fs::write(temp_dir.path().join("app/package.json"), "{ oops").unwrap();
        let resolver = BrowserTargetResolver::new(Some(temp_dir.path().to_path_buf()));

        let file = temp_dir.path().join("app/a.css");
        let result = resolver.resolve(Some(&file), &settings()).await;
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        assert_eq!(resolver.cached_scope_count(), 0);
    }
}
