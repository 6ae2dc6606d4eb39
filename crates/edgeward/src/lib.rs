//! Keeps sharded Fastly ACLs and VCL snippets in sync with access decisions.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use edgeward::{BouncerConfig, FastlyClient, Transport};
//!
//! #[tokio::main]
//! async fn main() -> edgeward::Result<()> {
//!     let config = BouncerConfig::load("edgeward.toml".as_ref())?;
//!     config.validate()?;
//!
//!     let transport: Arc<dyn Transport> = Arc::new(FastlyClient::new(&config.api_token)?);
//!     let mut reconciler = config.reconciler(&config.services[0].id, "1", transport)?;
//!
//!     reconciler.create_static_snippets().await?;
//!     reconciler
//!         .transform_state([("1.2.3.4", "ban"), ("CN", "ban"), ("64512", "ban")])
//!         .await?;
//!
//!     let snapshot = reconciler.snapshot().to_json()?;
//!     println!("{snapshot}");
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `default` - Uses rustls for TLS
//! - `rustls` - Use rustls for TLS (recommended)
//! - `native-tls` - Use system native TLS

#![doc(html_root_url = "https://docs.rs/edgeward/0.3.0")]

// Re-export core types
pub use edgeward_core::*;

// Re-export client
pub use edgeward_client::{FastlyClient, FastlyClientBuilder, RateLimitConfig};

// Re-export the engine
pub use edgeward_sync::{
    AclCollection, AclCollectionSnapshot, BouncerConfig, RetryConfig, RetryPolicy,
    ServiceConfig, ServiceReconciler, ServiceReconcilerBuilder, ServiceSnapshot,
};

// Re-export runtime for convenience
pub use serde;
pub use serde_json;
pub use tokio;
