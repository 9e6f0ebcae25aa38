//! Muster - provision and operate short-lived compute clusters.
//!
//! Muster turns a layered JSON profile into running cloud instances, then
//! configures and launches the cluster's software (a dask scheduler/worker
//! topology and/or a notebook host) over remote shell commands, keeping a
//! durable per-cluster record for start/stop/show/destroy.
//!
//! # Modules
//!
//! - [`profile`] - Layered profiles: template merging, CLI path overrides,
//!   lazy per-role validation
//! - [`cloud`] - The `CloudProvider` collaborator trait and its REST driver
//! - [`remote`] - Typed remote instructions and the retrying command channel
//! - [`probe`] - HTTP reachability probing for dashboards
//! - [`browser`] - Local browser launching
//! - [`store`] - Durable cluster records (one JSON document per cluster)
//! - [`orchestrator`] - The lifecycle state machine tying it all together
//! - [`retry`] - The fixed-interval retry policy shared by every poller
//! - [`settings`] - Tool settings from `~/.muster/config.toml`
//! - [`cli`] - clap definitions, dispatch, paths, and output helpers
//! - [`error`] - Error types for the crate
//!
//! # Features
//!
//! - `testkit` - Scripted fakes for every collaborator trait, used by the
//!   integration tests

pub mod browser;
pub mod cli;
pub mod cloud;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod profile;
pub mod remote;
pub mod retry;
pub mod settings;
pub mod store;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use error::{Error, Result};
