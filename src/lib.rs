//! rseticket - console eTicket parsing, title-key recovery, and patching.
//!
//! This crate provides:
//! - Signature-header resolution and the fixed-layout ticket record codec.
//! - Title-key recovery for common (master-key-wrapped) and personalized
//!   (device-RSA-wrapped) tickets.
//! - Ticket patching into durable, console-independent common tickets.
//! - The key-table seam and the platform ticket-service boundary.
//!
//! Feature flags:
//! - `cli`: enable the CLI binary helpers.
//! - `log`: route internal diagnostics through the `log` crate.

#[macro_use]
mod macros;

/// Common error types and Result alias.
pub mod error;
/// Key table seam and console RSA device keys.
pub mod keys;
/// Ticket patching into common tickets.
pub mod patch;
/// Content rights identifiers.
pub mod rights_id;
/// Platform ticket-service boundary.
pub mod store;
/// Signature-header resolution and ticket record codec.
pub mod ticket;
/// Title-key recovery.
pub mod titlekey;

pub use error::{Error, Result};
