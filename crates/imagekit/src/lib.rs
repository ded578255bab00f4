//! # imagekit
//!
//! Tag planning and cached multi-stage builds for container images.
//!
//! [`plan`] is pure: it turns a service's image names and the current
//! branch/commit into the exact list of builds and pushes. [`Builder`]
//! executes a plan through a [`backend::Backend`].
//!
//! ## Example
//!
//! ```no_run
//! use imagekit::{BuildContext, Builder, ImageSpec, Registry, plan};
//! use std::path::Path;
//!
//! let spec = ImageSpec::new("frontend").with_stages(vec!["build-env".into()]);
//! let registry = Registry::gcr("demo-123", "demo");
//! let ctx = BuildContext::ci("feature-x", "abcd123", Some("master".into()));
//!
//! let plan = plan(&spec, &registry, &ctx);
//! let builder = Builder::new()?;
//! builder.build(Path::new("services/frontend"), &plan)?;
//! builder.push(&plan)?;
//! # Ok::<(), imagekit::Error>(())
//! ```

pub mod backend;
mod builder;
pub mod error;
mod plan;
mod types;

pub use backend::MockBackend;
pub use builder::Builder;
pub use error::{Error, ErrorCategory, Result};
pub use plan::{BuildPlan, BuildStep, plan};
pub use types::{
    BuildContext, ImageSpec, LATEST_TAG, PRODUCTION_TAG, Registry, TaggedImageSet,
};
