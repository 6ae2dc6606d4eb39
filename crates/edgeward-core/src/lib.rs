//! Core types and traits for edgeward.
//!
//! This crate provides the foundational types shared by the edgeward crates:
//!
//! - **Types**: ACLs, VCL snippets, actions and identifier classification
//! - **Transport**: The [`Transport`] trait the reconciler drives
//! - **Errors**: Error handling with [`EdgeError`]
//!
//! # Example
//!
//! ```rust,ignore
//! use edgeward_core::{IdentifierKind, Result};
//!
//! fn route(item: &str) -> Result<()> {
//!     match IdentifierKind::classify(item) {
//!         Some(IdentifierKind::Network) => println!("{item} goes into an ACL"),
//!         Some(kind) => println!("{item} is a {kind}"),
//!         None => println!("{item} is ignored"),
//!     }
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/edgeward-core/0.3.0")]

mod error;
mod transport;
pub mod types;

pub use error::{EdgeError, Result};
pub use transport::Transport;
pub use types::*;
