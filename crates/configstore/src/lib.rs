//! Project configuration for kubails.
//!
//! A project is described by a single JSON document, `kubails.json`, at the
//! project root. This crate loads it, reads and writes values by dotted
//! path, and flattens it for consumption as Terraform variables.
//!
//! # Example
//!
//! ```no_run
//! use configstore::{ConfigStore, flatten};
//! use std::path::Path;
//!
//! let mut store = ConfigStore::discover(Path::new("."))?;
//! store.set("__services.frontend.replicas", "2")?;
//!
//! for (key, value) in flatten(store.read()) {
//!     println!("{key} = {value}");
//! }
//! # Ok::<(), configstore::Error>(())
//! ```

mod error;
mod flatten;
mod project;
mod store;

pub use error::{Error, ErrorCategory, Result};
pub use flatten::{FlatConfig, SEPARATOR, flatten, flatten_grouped};
pub use project::{Project, SecretsSpec, ServiceSpec, keys};
pub use store::{CONFIG_FILE_NAME, Config, ConfigStore, find_config_file};
