//! Refill orchestrator (C5, spec §4.5): on an accepted intent, persists the
//! transaction row, invokes the provider transfer, and records the outcome.

use chrono::Utc;
use refill_providers::{Provider, ProviderError, TransferRequestParams};
use refill_types::entities::{RefillStatus, RefillTransaction, RefillTransactionPatch};
use refill_types::error::{AppError, ErrorCode};
use serde::Serialize;
use serde_json::json;

use crate::admission::AcceptedRefill;
use crate::catalog::Catalog;
use crate::status;

/// What the orchestrator hands back to the HTTP layer on success.
#[derive(Debug, Clone, Serialize)]
pub struct RefillOutcome {
    pub refill_request_id: String,
    pub provider_tx_id: Option<String>,
    pub status: RefillStatus,
    pub provider: String,
}

/// Runs C5 end to end for one accepted intent.
pub async fn initiate(catalog: &dyn Catalog, accepted: AcceptedRefill) -> Result<RefillOutcome, AppError> {
    let provider_name = accepted.provider.name().to_string();
    let now = Utc::now();

    let row = RefillTransaction {
        refill_request_id: accepted.refill_request_id.clone(),
        asset_id: accepted.asset.id,
        provider: provider_name.clone(),
        amount_atomic: accepted.refill_amount_atomic,
        amount: accepted.refill_amount.to_string(),
        chain_name: accepted.chain.name.clone(),
        token_symbol: accepted.asset.symbol.clone(),
        status: RefillStatus::Pending,
        provider_status: None,
        provider_tx_id: None,
        tx_hash: None,
        message: None,
        provider_data: None,
        created_at: now,
        updated_at: now,
    };

    let inserted = match catalog.insert_transaction(row).await {
        Ok(row) => row,
        Err(crate::catalog::CatalogError::UniquenessViolation(id)) => {
            let existing = catalog
                .get_transaction_by_request_id(&id)
                .await
                .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?
                .ok_or_else(|| AppError::new(ErrorCode::InternalError, "uniqueness violation but row not found"))?;
            return Err(AppError::new(ErrorCode::TransactionExists, "a refill with this id already exists")
                .with_data(json!({ "transaction": existing })));
        }
        Err(e) => return Err(AppError::new(ErrorCode::TransactionCreationError, e.to_string())),
    };

    let params = TransferRequestParams {
        cold_wallet_id: accepted.asset.refill_sweep_wallet.clone(),
        hot_wallet_address: accepted.wallet.address.clone(),
        amount_decimal_string: accepted.refill_amount.to_string(),
        asset: accepted.asset.symbol.clone(),
        chain: accepted.chain.name.clone(),
        external_tx_id: inserted.refill_request_id.clone(),
        cold_wallet_config: accepted.asset.sweep_wallet_config.clone(),
        contract_address: if accepted.asset.is_native() {
            None
        } else {
            Some(accepted.asset.contract_address.clone())
        },
    };

    let transfer = match accepted.provider.create_transfer_request(params).await {
        Ok(transfer) => transfer,
        // Provider-side "already used" is not a hard failure (SPEC_FULL.md §9,
        // Open Question 2): re-fetch the prior transfer by external id instead of
        // surfacing REFILL_INITIATION_ERROR for a request that actually succeeded.
        Err(ProviderError::DuplicateExternalId(_)) => {
            match recover_duplicate(accepted.provider.as_ref(), &inserted.refill_request_id).await {
                Ok(transfer) => transfer,
                Err(e) => return fail_transaction(catalog, &inserted.refill_request_id, e.to_string()).await,
            }
        }
        Err(e) => return fail_transaction(catalog, &inserted.refill_request_id, e.to_string()).await,
    };

    let extracted = status::extract(&provider_name, &transfer.raw);
    let mapped = status::map_status(&provider_name, &extracted.raw_status);

    let patch = RefillTransactionPatch {
        status: Some(mapped),
        provider_status: Some(extracted.raw_status.clone()),
        provider_tx_id: Some(transfer.provider_tx_id.clone()),
        tx_hash: extracted.tx_hash.clone(),
        message: extracted.message.clone().or(transfer.message.clone()),
        provider_data: Some(extracted.raw_response.clone()),
    };

    catalog
        .update_transaction(&inserted.refill_request_id, patch)
        .await
        .map_err(|e| AppError::new(ErrorCode::TransactionUpdateError, e.to_string()))?;

    Ok(RefillOutcome {
        refill_request_id: inserted.refill_request_id,
        provider_tx_id: Some(transfer.provider_tx_id),
        status: mapped,
        provider: provider_name,
    })
}

/// Re-fetches a transfer the provider reports as a duplicate, by treating the
/// `external_tx_id` as its own lookup key.
async fn recover_duplicate(
    provider: &dyn Provider,
    external_tx_id: &str,
) -> Result<refill_providers::ProviderTransferResult, ProviderError> {
    let raw = provider.get_transaction_by_id(external_tx_id, None).await?;
    let extracted = status::extract(provider.name(), &raw);
    let provider_tx_id = extracted
        .provider_tx_id
        .clone()
        .unwrap_or_else(|| external_tx_id.to_string());
    Ok(refill_providers::ProviderTransferResult {
        provider_tx_id,
        raw_status: extracted.raw_status,
        message: extracted.message,
        external_tx_id: external_tx_id.to_string(),
        created_at: Utc::now(),
        raw,
    })
}

async fn fail_transaction(
    catalog: &dyn Catalog,
    refill_request_id: &str,
    message: String,
) -> Result<RefillOutcome, AppError> {
    let patch = RefillTransactionPatch {
        status: Some(RefillStatus::Failed),
        message: Some(message.clone()),
        ..Default::default()
    };
    let _ = catalog.update_transaction(refill_request_id, patch).await;
    Err(AppError::new(ErrorCode::RefillInitiationError, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use refill_providers::TokenInfo;
    use refill_types::entities::{Asset, Chain, Id, Wallet, WalletType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct FakeCatalog {
        rows: Mutex<Vec<RefillTransaction>>,
    }

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn get_chain_by_name(&self, _name: &str) -> Result<Option<Chain>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_asset_by_symbol_and_chain(
            &self,
            _s: &str,
            _c: Id,
        ) -> Result<Option<refill_types::entities::AssetView>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_wallet_by_address(&self, _a: &str) -> Result<Option<Wallet>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_asset_view_by_id(
            &self,
            _id: Id,
        ) -> Result<Option<refill_types::entities::AssetView>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn insert_transaction(
            &self,
            row: RefillTransaction,
        ) -> Result<RefillTransaction, crate::catalog::CatalogError> {
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|r| r.refill_request_id == row.refill_request_id) {
                return Err(crate::catalog::CatalogError::UniquenessViolation(row.refill_request_id));
            }
            rows.push(row.clone());
            Ok(row)
        }
        async fn update_transaction(
            &self,
            refill_request_id: &str,
            patch: RefillTransactionPatch,
        ) -> Result<u64, crate::catalog::CatalogError> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|r| r.refill_request_id == refill_request_id) {
                if let Some(s) = patch.status {
                    row.status = s;
                }
                if let Some(v) = patch.provider_status {
                    row.provider_status = Some(v);
                }
                if let Some(v) = patch.provider_tx_id {
                    row.provider_tx_id = Some(v);
                }
                if let Some(v) = patch.tx_hash {
                    row.tx_hash = Some(v);
                }
                if let Some(v) = patch.message {
                    row.message = Some(v);
                }
                if let Some(v) = patch.provider_data {
                    row.provider_data = Some(v);
                }
                return Ok(1);
            }
            Ok(0)
        }
        async fn get_transaction_by_request_id(
            &self,
            id: &str,
        ) -> Result<Option<RefillTransaction>, crate::catalog::CatalogError> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.refill_request_id == id).cloned())
        }
        async fn get_pending_transaction_by_asset_id(
            &self,
            _asset_id: Id,
        ) -> Result<Option<RefillTransaction>, crate::catalog::CatalogError> {
            Ok(None)
        }
        async fn get_last_successful_refill_by_asset_id(
            &self,
            _asset_id: Id,
        ) -> Result<Option<RefillTransaction>, crate::catalog::CatalogError> {
            Ok(None)
        }
        async fn get_transactions_by_status(
            &self,
            _status: RefillStatus,
        ) -> Result<Vec<RefillTransaction>, crate::catalog::CatalogError> {
            Ok(vec![])
        }
        async fn ping(&self) -> Result<(), crate::catalog::CatalogError> {
            Ok(())
        }
    }

    struct FakeProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            "fireblocks"
        }
        async fn init(&self, _credentials: refill_providers::Credentials) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn get_token_balance(&self, _token_info: &TokenInfo) -> Result<String, ProviderError> {
            Ok("100000000".to_string())
        }
        async fn create_transfer_request(
            &self,
            params: TransferRequestParams,
        ) -> Result<refill_providers::ProviderTransferResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(refill_providers::ProviderTransferResult {
                provider_tx_id: "fb-1".into(),
                raw_status: "SUBMITTED".into(),
                message: None,
                external_tx_id: params.external_tx_id,
                created_at: Utc::now(),
                raw: json!({"id": "fb-1", "status": "SUBMITTED"}),
            })
        }
        async fn get_transaction_by_id(
            &self,
            _id: &str,
            _token_info: Option<&TokenInfo>,
        ) -> Result<serde_json::Value, ProviderError> {
            Ok(json!({"id": "fb-1", "status": "SUBMITTED"}))
        }
    }

    fn sample_accepted(provider: Arc<dyn Provider>) -> AcceptedRefill {
        AcceptedRefill {
            refill_request_id: "REQ001".into(),
            chain: Chain {
                id: 1,
                name: "Bitcoin".into(),
                symbol: "BTC".into(),
                native_asset_symbol: "BTC".into(),
                is_active: true,
            },
            asset: Asset {
                id: 1,
                symbol: "BTC".into(),
                chain_id: 1,
                contract_address: "native".into(),
                decimals: 8,
                wallet_id: 1,
                refill_sweep_wallet: "0xcold".into(),
                sweep_wallet_config: json!({"provider": "fireblocks"}),
                hot_wallet_config: json!({"provider": "fireblocks"}),
                refill_target_balance_atomic: 100_000_000,
                refill_trigger_threshold_atomic: 50_000_000,
                refill_cooldown_period: None,
                is_active: true,
            },
            wallet: Wallet {
                id: 1,
                address: "0xhot".into(),
                wallet_type: WalletType::Hot,
                hot_wallet_config: json!({"provider": "fireblocks"}),
            },
            refill_amount: refill_types::DecimalAmount::parse("0.5").unwrap(),
            refill_amount_atomic: 50_000_000,
            current_hot_balance_atomic: 30_000_000,
            provider,
        }
    }

    #[tokio::test]
    async fn happy_path_persists_processing_row() {
        let catalog = FakeCatalog { rows: Mutex::new(vec![]) };
        let provider: Arc<dyn Provider> = Arc::new(FakeProvider { calls: AtomicUsize::new(0) });
        let outcome = initiate(&catalog, sample_accepted(provider)).await.unwrap();
        assert_eq!(outcome.status, RefillStatus::Processing);
        assert_eq!(outcome.provider_tx_id.as_deref(), Some("fb-1"));

        let row = catalog.get_transaction_by_request_id("REQ001").await.unwrap().unwrap();
        assert_eq!(row.amount_atomic, 50_000_000);
        assert_eq!(row.status, RefillStatus::Processing);
        assert_eq!(row.provider_status.as_deref(), Some("SUBMITTED"));
    }

    #[tokio::test]
    async fn duplicate_request_id_surfaces_transaction_exists() {
        let catalog = FakeCatalog { rows: Mutex::new(vec![]) };
        let provider: Arc<dyn Provider> = Arc::new(FakeProvider { calls: AtomicUsize::new(0) });
        initiate(&catalog, sample_accepted(provider.clone())).await.unwrap();

        let err = initiate(&catalog, sample_accepted(provider)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransactionExists);
        assert!(err.data.unwrap()["transaction"]["refill_request_id"] == "REQ001");
    }
}
