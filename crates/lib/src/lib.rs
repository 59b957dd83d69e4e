//! externa-lib: versioned caches of external tools and prebuilt artifacts.
//!
//! - [`store`]: archives named `{name}__{version}{ext}`, unpacked lazily behind
//!   a completion marker, with drift detection against peer stores
//! - [`algorithm`]: the capability every wrapped tool implements, plus version
//!   resolution and task registration for running it
//! - [`ledger`]: the per-working-directory record of resolved versions
//! - [`prebuild`]: host-namespaced build products reused across versions
//! - [`task`]: the scheduler abstraction work is registered with

pub mod algorithm;
pub mod config;
pub mod consts;
pub mod ledger;
pub mod platform;
pub mod prebuild;
pub mod store;
pub mod task;
pub mod util;
pub mod version;

pub use version::{Version, VersionRange, VersionRequest};
