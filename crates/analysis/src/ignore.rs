use glob::{MatchOptions, Pattern};
use std::path::Path;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled set of ignore globs.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<Pattern>,
}

impl IgnoreMatcher {
    /// Compile glob patterns. Invalid patterns are skipped with a warning.
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Self {
        let mut patterns = Vec::new();
        for glob in globs {
            let glob = glob.as_ref();
            for expanded in expand_braces(glob) {
                match Pattern::new(&expanded) {
                    Ok(pattern) => patterns.push(pattern),
                    Err(e) => {
                        tracing::warn!(glob, expanded, "Skipping invalid ignore pattern: {e}");
                    }
                }
            }
        }
        Self { patterns }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `path` matches at least one pattern.
    #[must_use]
    pub fn is_ignored(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(path, MATCH_OPTIONS))
    }
}

/// Path used for ignore matching.
///
/// Relative to the workspace root with `/` separators when the file lies
/// inside it, otherwise the path as is.
#[must_use]
pub fn workspace_relative_path(path: &Path, workspace_root: Option<&Path>) -> String {
    let relative = workspace_root.and_then(|root| path.strip_prefix(root).ok());
    match relative {
        Some(relative) => relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        None => path.to_string_lossy().into_owned(),
    }
}

/// Expand brace groups like `{css,scss}` into one pattern per alternative.
///
/// Groups may be nested or repeated. An unbalanced `{` is left as is.
fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(start) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0usize;
    let mut end = None;
    let mut splits = Vec::new();
    for (offset, ch) in pattern[start..].char_indices() {
        let index = start + offset;
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(index);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(index),
            _ => {}
        }
    }

    let Some(end) = end else {
        return vec![pattern.to_string()];
    };

    let before = &pattern[..start];
    let after = &pattern[end + 1..];
    let mut bounds = Vec::with_capacity(splits.len() + 2);
    bounds.push(start);
    bounds.extend(splits);
    bounds.push(end);

    bounds
        .windows(2)
        .flat_map(|window| {
            let option = &pattern[window[0] + 1..window[1]];
            expand_braces(&format!("{before}{option}{after}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_braces() {
        assert_eq!(expand_braces("**/*.css"), vec!["**/*.css"]);
        assert_eq!(expand_braces("**/*.{css,scss}"), vec!["**/*.css", "**/*.scss"]);
        assert_eq!(
            expand_braces("{a,b}/{c,d}"),
            vec!["a/c", "a/d", "b/c", "b/d"]
        );
        assert_eq!(
            expand_braces("x.{min.{css,js},map}"),
            vec!["x.min.css", "x.min.js", "x.map"]
        );
        assert_eq!(expand_braces("broken{a,b"), vec!["broken{a,b"]);
    }

    #[test]
    fn test_empty_matcher_never_matches() {
        let matcher = IgnoreMatcher::new::<String>(&[]);
        assert!(matcher.is_empty());
        assert!(!matcher.is_ignored("anything.css"));
        assert!(!matcher.is_ignored(""));
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        let matcher = IgnoreMatcher::new(&["vendor/*.css"]);
        assert!(matcher.is_ignored("vendor/reset.css"));
        assert!(!matcher.is_ignored("vendor/lib/reset.css"));
        assert!(!matcher.is_ignored("src/vendor/reset.css"));
    }

    #[test]
    fn test_double_star_spans_directories() {
        let matcher = IgnoreMatcher::new(&["**/*.min.css"]);
        assert!(matcher.is_ignored("dist/app.min.css"));
        assert!(matcher.is_ignored("a/b/c/app.min.css"));
        assert!(matcher.is_ignored("app.min.css"));
        assert!(!matcher.is_ignored("src/app.css"));
    }

    #[test]
    fn test_brace_and_class_patterns() {
        let matcher = IgnoreMatcher::new(&["legacy/**/*.{less,scss}", "theme[0-9].css"]);
        assert!(matcher.is_ignored("legacy/old/buttons.less"));
        assert!(matcher.is_ignored("legacy/forms.scss"));
        assert!(!matcher.is_ignored("legacy/forms.css"));
        assert!(matcher.is_ignored("theme3.css"));
        assert!(!matcher.is_ignored("themeX.css"));
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let matcher = IgnoreMatcher::new(&["[unclosed", "*.css"]);
        assert!(matcher.is_ignored("site.css"));
        assert!(!matcher.is_ignored("[unclosed"));
    }

    #[test]
    fn test_workspace_relative_path() {
        let root = Path::new("/work");
        assert_eq!(
            workspace_relative_path(Path::new("/work/src/a.css"), Some(root)),
            "src/a.css"
        );
        assert_eq!(
            workspace_relative_path(Path::new("/elsewhere/a.css"), Some(root)),
            "/elsewhere/a.css"
        );
        assert_eq!(
            workspace_relative_path(Path::new("/work/a.css"), None),
            "/work/a.css"
        );
    }
}
