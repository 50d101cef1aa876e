//! Custody-provider abstraction for the hot wallet refill service.
//!
//! - [`provider`] — the narrow `Provider` trait every backend implements.
//! - [`liminal`] / [`fireblocks`] — the two reference adapters (spec §4.2).
//! - [`registry`] — `ProviderRegistry`, built once at boot from configuration.

pub mod fireblocks;
pub mod liminal;
pub mod provider;
pub mod registry;

pub use fireblocks::FireblocksProvider;
pub use liminal::LiminalProvider;
pub use provider::{
    Credentials, Provider, ProviderError, ProviderTransferResult, TokenInfo,
    TransferRequestParams,
};
pub use registry::{ProviderRegistry, ProviderSettings, RegistryError};
