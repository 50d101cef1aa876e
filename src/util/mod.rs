//! Shared utilities.
//!
//! - [`sig_down`] - graceful shutdown signal handling, shared by the HTTP listener
//!   and the reconciliation monitor.

pub mod sig_down;

pub use sig_down::SigDown;
