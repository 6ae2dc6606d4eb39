//! Reconciliation engine for edge access control.
//!
//! This crate turns a desired mapping of identifiers to actions into Fastly
//! configuration:
//!
//! - **Collections**: [`AclCollection`] shards network identifiers over
//!   capacity-bounded ACLs and commits staged diffs with conflict repair
//! - **Services**: [`ServiceReconciler`] drives the collections, country and
//!   AS number sets, and the rule snippet of every action
//! - **Retry**: [`RetryPolicy`] for transient remote failures
//! - **Config**: TOML configuration through [`BouncerConfig`]
//! - **Snapshots**: [`ServiceSnapshot`] for restart continuity
//!
//! # Example
//!
//! ```rust,ignore
//! use edgeward_sync::ServiceConfig;
//!
//! let service = ServiceConfig::new("service-id");
//! let mut reconciler = service.reconciler("3", transport)?;
//! reconciler
//!     .transform_state([("1.2.3.4", "ban"), ("CN", "ban")])
//!     .await?;
//! ```

#![doc(html_root_url = "https://docs.rs/edgeward-sync/0.3.0")]

pub mod collection;
pub mod conditions;
pub mod config;
pub mod retry;
pub mod service;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use collection::{AclCollection, AclCollectionSnapshot, DEFAULT_ACL_CAPACITY};
pub use config::{BouncerConfig, ServiceConfig};
pub use retry::{Disposition, RetryConfig, RetryPolicy};
pub use service::{ServiceReconciler, ServiceReconcilerBuilder, DEFAULT_BAN_BODY};
pub use snapshot::ServiceSnapshot;
