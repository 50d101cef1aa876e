//! Liminal custody provider adapter.
//!
//! Raw status vocabulary (spec §4.6): `1`, `2` => processing; `4` => completed;
//! `5` => failed. This module only talks HTTP; status mapping lives in
//! `refill-core::status`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value as Json, json};
use std::sync::RwLock;
use tokio::sync::OnceCell;

use crate::provider::{
    Credentials, Provider, ProviderError, ProviderTransferResult, TokenInfo, TransferRequestParams,
};

#[derive(Debug, Clone, Deserialize)]
struct LiminalWalletConfig {
    vault_id: String,
    #[serde(default)]
    asset_id: Option<String>,
}

pub struct LiminalProvider {
    base_url: String,
    http: reqwest::Client,
    api_key: OnceCell<String>,
    last_credentials: RwLock<Option<Credentials>>,
}

impl LiminalProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            api_key: OnceCell::new(),
            last_credentials: RwLock::new(None),
        }
    }

    fn wallet_config(&self, token_info: &TokenInfo) -> Result<LiminalWalletConfig, ProviderError> {
        let raw = token_info
            .config_for("liminal")
            .ok_or_else(|| ProviderError::Rejected("no liminal wallet config".into()))?;
        serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .get()
            .map(String::as_str)
            .ok_or_else(|| ProviderError::Credentials("liminal not initialized".into()))
    }
}

#[async_trait]
impl Provider for LiminalProvider {
    fn name(&self) -> &str {
        "liminal"
    }

    async fn init(&self, credentials: Credentials) -> Result<(), ProviderError> {
        let key = credentials
            .get("api_key")
            .and_then(Json::as_str)
            .ok_or_else(|| ProviderError::Credentials("missing liminal api_key".into()))?
            .to_string();
        self.api_key
            .set(key)
            .map_err(|_| ProviderError::Credentials("liminal already initialized".into()))?;
        *self.last_credentials.write().unwrap() = Some(credentials);
        Ok(())
    }

    async fn get_token_balance(&self, token_info: &TokenInfo) -> Result<String, ProviderError> {
        let config = self.wallet_config(token_info)?;
        let url = format!("{}/vaults/{}/balance", self.base_url, config.vault_id);
        let response = self
            .http
            .get(url)
            .bearer_auth(self.api_key()?)
            .query(&[("assetId", config.asset_id.as_deref().unwrap_or(""))])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;
        let body: Json = response.json().await?;
        body.get("balance")
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::MalformedResponse("missing balance".into()))
    }

    async fn create_transfer_request(
        &self,
        params: TransferRequestParams,
    ) -> Result<ProviderTransferResult, ProviderError> {
        let url = format!("{}/transfers", self.base_url);
        let response = self
            .http
            .post(url)
            .bearer_auth(self.api_key()?)
            .json(&json!({
                "externalTxId": params.external_tx_id,
                "fromVaultId": params.cold_wallet_id,
                "toAddress": params.hot_wallet_address,
                "amount": params.amount_decimal_string,
                "asset": params.asset,
                "chain": params.chain,
            }))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(ProviderError::DuplicateExternalId(params.external_tx_id));
        }
        let body: Json = response
            .error_for_status()
            .map_err(|e| ProviderError::Rejected(e.to_string()))?
            .json()
            .await?;
        parse_transfer(body, &params.external_tx_id)
    }

    async fn get_transaction_by_id(
        &self,
        provider_tx_id: &str,
        _token_info: Option<&TokenInfo>,
    ) -> Result<Json, ProviderError> {
        let url = format!("{}/transfers/{}", self.base_url, provider_tx_id);
        let response = self
            .http
            .get(url)
            .bearer_auth(self.api_key()?)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;
        Ok(response.json().await?)
    }
}

fn parse_transfer(body: Json, external_tx_id: &str) -> Result<ProviderTransferResult, ProviderError> {
    let id = body
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| ProviderError::MalformedResponse("missing transfer id".into()))?
        .to_string();
    let status = match body.get("status") {
        Some(Json::String(s)) => s.clone(),
        Some(Json::Number(n)) => n.to_string(),
        _ => return Err(ProviderError::MalformedResponse("missing status".into())),
    };
    let message = body
        .get("note")
        .and_then(Json::as_str)
        .map(str::to_string);
    Ok(ProviderTransferResult {
        provider_tx_id: id,
        raw_status: status,
        message,
        external_tx_id: external_tx_id.to_string(),
        created_at: chrono::Utc::now(),
        raw: body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transfer_response() {
        let body = json!({"id": "lim-1", "status": "2", "note": "queued"});
        let parsed = parse_transfer(body, "REQ001").unwrap();
        assert_eq!(parsed.provider_tx_id, "lim-1");
        assert_eq!(parsed.raw_status, "2");
        assert_eq!(parsed.message.as_deref(), Some("queued"));
    }
}
