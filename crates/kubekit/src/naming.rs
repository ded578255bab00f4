//! Identifier sanitization.
//!
//! Branch names end up in image tags, namespace names and subdomains, all
//! of which only accept lowercase alphanumerics and hyphens.

use regex::Regex;
use std::sync::LazyLock;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^0-9a-z]+").expect("sanitize regex"));

/// Lowercase `name` and collapse every run of other characters into one `-`.
///
/// ```
/// assert_eq!(kubekit::sanitize("Feature/ABC_1"), "feature-abc-1");
/// ```
pub fn sanitize(name: &str) -> String {
    NON_ALPHANUMERIC
        .replace_all(&name.to_lowercase(), "-")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_lowercases() {
        assert_eq!(sanitize("MASTER"), "master");
        assert_eq!(sanitize("test/A-1"), "test-a-1");
    }

    #[test]
    fn test_sanitize_collapses_runs() {
        assert_eq!(sanitize("feature//some__thing"), "feature-some-thing");
        assert_eq!(sanitize("a.b c"), "a-b-c");
    }

    #[test]
    fn test_sanitize_keeps_edges() {
        assert_eq!(sanitize("/leading"), "-leading");
        assert_eq!(sanitize("trailing!"), "trailing-");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_sanitize_idempotent() {
        for name in ["feature/x", "Release_2.0", "already-clean"] {
            let once = sanitize(name);
            assert_eq!(sanitize(&once), once);
        }
    }
}
