//! Core domain types for the hot wallet refill service.
//!
//! - [`entities`] — persisted entities: `Chain`, `Wallet`, `Asset`, `RefillTransaction`.
//! - [`decimal`] — human-amount <-> atomic-unit conversions, arbitrary precision only.
//! - [`error`] — the closed set of admission/orchestration error codes and `AppError`.

pub mod decimal;
pub mod entities;
pub mod error;

pub use decimal::{DecimalAmount, DecimalConversionError, atomic_from_str};
pub use entities::*;
pub use error::{AppError, ErrorCode};
