//! The narrow custody-provider contract (spec §4.2, §6.2).
//!
//! Every custody backend is wrapped behind this trait — one adapter per backend,
//! never a fluent SDK chain leaking into the admission/orchestration core.

use async_trait::async_trait;
use serde_json::Value as Json;
use std::collections::HashMap;

/// Everything a provider needs to answer a balance query for one token on one wallet.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub symbol: String,
    pub chain_symbol: String,
    pub contract_address: Option<String>,
    pub decimals: u32,
    /// `<provider-name> -> identifier bag`
    pub wallet_config: HashMap<String, Json>,
}

impl TokenInfo {
    /// The identifier bag this provider cares about, if the asset carries one.
    pub fn config_for(&self, provider: &str) -> Option<&Json> {
        self.wallet_config.get(provider)
    }
}

/// Parameters for `create_transfer_request` (spec §4.2).
#[derive(Debug, Clone)]
pub struct TransferRequestParams {
    pub cold_wallet_id: String,
    pub hot_wallet_address: String,
    pub amount_decimal_string: String,
    pub asset: String,
    pub chain: String,
    /// Reused verbatim as the idempotency key (spec §4.2, §9 Open Question 2).
    pub external_tx_id: String,
    pub cold_wallet_config: Json,
    pub contract_address: Option<String>,
}

/// A provider's answer to `create_transfer_request` or `get_transaction_by_id`,
/// normalized just enough to be provider-agnostic at the call boundary. The
/// per-provider raw shape is preserved in `raw` for the status mapper (spec §4.6)
/// to extract from.
#[derive(Debug, Clone)]
pub struct ProviderTransferResult {
    pub provider_tx_id: String,
    pub raw_status: String,
    pub message: Option<String>,
    pub external_tx_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub raw: Json,
}

/// Errors a provider call can raise. The caller (C4/C5/C7) classifies these —
/// the provider itself does not know about admission error codes.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("credential error: {0}")]
    Credentials(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("provider rejected the request: {0}")]
    Rejected(String),
    /// The provider reports that `external_tx_id` was already used (spec §9 Open
    /// Question 2) — the orchestrator should re-fetch rather than treat this as fatal.
    #[error("external id already used: {0}")]
    DuplicateExternalId(String),
    #[error("unexpected response shape: {0}")]
    MalformedResponse(String),
}

/// Credentials handed to `Provider::init`. Kept opaque (`Json`) since each backend's
/// credential shape differs and the core never inspects it.
pub type Credentials = Json;

/// A custody backend exposing the operations of spec §4.2/§6.2.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Canonical lowercase identifier (e.g. `"liminal"`, `"fireblocks"`).
    fn name(&self) -> &str;

    /// One-time authentication setup. Idempotent at the registry level.
    async fn init(&self, credentials: Credentials) -> Result<(), ProviderError>;

    /// Live balance query. Returns an atomic-unit integer string.
    async fn get_token_balance(&self, token_info: &TokenInfo) -> Result<String, ProviderError>;

    async fn create_transfer_request(
        &self,
        params: TransferRequestParams,
    ) -> Result<ProviderTransferResult, ProviderError>;

    async fn get_transaction_by_id(
        &self,
        provider_tx_id: &str,
        token_info: Option<&TokenInfo>,
    ) -> Result<Json, ProviderError>;
}
