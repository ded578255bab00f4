//! Branch-to-namespace reconciliation.
//!
//! Every branch deploys into a namespace named after the sanitized branch.
//! Once the branch is deleted its namespace lingers until something
//! compares the two sets.

use crate::naming::sanitize;
use std::collections::BTreeSet;

/// Namespaces that no longer correspond to any branch.
///
/// Branch names are sanitized before comparison; namespace names are used
/// as given. The result is sorted and free of duplicates.
pub fn unused_namespaces<B, N>(remote_branches: B, live_namespaces: N) -> Vec<String>
where
    B: IntoIterator,
    B::Item: AsRef<str>,
    N: IntoIterator,
    N::Item: AsRef<str>,
{
    let branches: BTreeSet<String> = remote_branches
        .into_iter()
        .map(|branch| sanitize(branch.as_ref()))
        .collect();

    let unused: BTreeSet<String> = live_namespaces
        .into_iter()
        .map(|namespace| namespace.as_ref().to_string())
        .filter(|namespace| !branches.contains(namespace))
        .collect();

    log::info!("Remote branches: {branches:?}");
    log::info!("Unused namespaces: {unused:?}");

    unused.into_iter().collect()
}

/// Whether `branch` has no namespace yet.
pub fn is_new_namespace<N>(branch: &str, live_namespaces: N) -> bool
where
    N: IntoIterator,
    N::Item: AsRef<str>,
{
    let namespace = sanitize(branch);
    !live_namespaces
        .into_iter()
        .any(|live| live.as_ref() == namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unused_namespace_found() {
        assert_eq!(unused_namespaces(["a1"], ["a1", "b2"]), vec!["b2"]);
    }

    #[test]
    fn test_no_unused_namespaces() {
        assert!(unused_namespaces(["a1", "b2"], ["a1", "b2"]).is_empty());
    }

    #[test]
    fn test_branches_are_sanitized() {
        assert_eq!(
            unused_namespaces(["test/A-1"], ["test-a-1", "thing-b-2"]),
            vec!["thing-b-2"]
        );
    }

    #[test]
    fn test_output_sorted_and_deduplicated() {
        let branches: Vec<String> = vec!["master".into()];
        let namespaces = vec!["zeta", "alpha", "master", "alpha"];

        assert_eq!(unused_namespaces(&branches, &namespaces), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_no_branches_means_everything_unused() {
        let none: [&str; 0] = [];
        assert_eq!(unused_namespaces(none, ["b", "a"]), vec!["a", "b"]);
    }

    #[test]
    fn test_is_new_namespace() {
        let live = ["master", "feature-x"];

        assert!(!is_new_namespace("Feature/X", live));
        assert!(!is_new_namespace("master", live));
        assert!(is_new_namespace("feature/y", live));
    }
}
