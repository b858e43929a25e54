//! gaeship-admin — App Engine Admin API v1 client.
//!
//! Reads and patches a service's traffic split, polls the long-running
//! operations a patch returns, and lists deployed versions. [`AdminClient`]
//! implements [`gaeship_core::ControlPlane`] so the migration loop can run
//! against it directly.
//!
//! Requests go over HTTP/1.1 with rustls (Mozilla roots) for `https` base
//! URLs; plain `http` base URLs are accepted for local emulators.

pub mod client;
pub mod error;
pub mod transport;
pub mod wire;

pub use client::{AdminClient, AdminConfig, DEFAULT_API_BASE};
pub use error::{AdminError, AdminResult};
