//! # kubekit
//!
//! One namespace per branch: naming, garbage collection and the
//! `kubectl`/`git`/`helm` wrappers behind it.
//!
//! [`unused_namespaces`] and [`is_new_namespace`] are pure set operations
//! over branch and namespace names. [`Syncer`] runs them against a live
//! cluster and repository.
//!
//! ## Example
//!
//! ```no_run
//! use kubekit::Syncer;
//!
//! let syncer = Syncer::new(".")?;
//! for namespace in syncer.cleanup_namespaces(|_| {})? {
//!     println!("{namespace}");
//! }
//! # Ok::<(), kubekit::Error>(())
//! ```

pub mod backend;
pub mod error;
mod naming;
mod reconcile;
mod syncer;

pub use backend::git::{Git, MockVcs, VcsBackend};
pub use backend::helm::{Helm, TemplateRequest};
pub use backend::kubectl::{ClusterBackend, Kubectl, MockCluster};
pub use error::{Error, ErrorCategory, Result};
pub use naming::sanitize;
pub use reconcile::{is_new_namespace, unused_namespaces};
pub use syncer::{MANAGED_LABEL, Syncer};
