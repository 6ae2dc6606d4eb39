//! HTTP client for the Fastly configuration API.
//!
//! This crate provides [`FastlyClient`], which talks to the ACL, VCL snippet
//! and service version endpoints and implements the
//! [`Transport`](edgeward_core::Transport) trait driven by the reconciler.

#![doc(html_root_url = "https://docs.rs/edgeward-client/0.3.0")]

mod client;
mod config;
mod transport;
pub mod api;

pub use client::{FastlyClient, FastlyClientBuilder};
pub use config::*;
pub use edgeward_core::{EdgeError, Result};
pub use transport::diff_operations;
