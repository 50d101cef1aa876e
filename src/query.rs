//! Query surface (C8, spec §4.8): read a refill's persisted fields verbatim.
//! Never calls a provider — the monitor (C7) is the sole writer of
//! provider-sourced fields.

use refill_types::error::{AppError, ErrorCode};

use crate::catalog::Catalog;

pub use refill_types::entities::RefillTransaction as RefillStatusView;

pub async fn get_refill_status(catalog: &dyn Catalog, refill_request_id: &str) -> Result<RefillStatusView, AppError> {
    catalog
        .get_transaction_by_request_id(refill_request_id)
        .await
        .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?
        .ok_or_else(|| AppError::new(ErrorCode::TransactionNotFound, "no refill found for this id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use refill_types::entities::{AssetView, Chain, Id, RefillStatus, RefillTransactionPatch, Wallet};
    use std::sync::Mutex;

    struct FakeCatalog(Mutex<Vec<RefillTransaction>>);

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn get_chain_by_name(&self, _n: &str) -> Result<Option<Chain>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_asset_by_symbol_and_chain(&self, _s: &str, _c: Id) -> Result<Option<AssetView>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_wallet_by_address(&self, _a: &str) -> Result<Option<Wallet>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_asset_view_by_id(&self, _id: Id) -> Result<Option<AssetView>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn insert_transaction(&self, row: RefillTransaction) -> Result<RefillTransaction, crate::catalog::CatalogError> {
            Ok(row)
        }
        async fn update_transaction(&self, _id: &str, _patch: RefillTransactionPatch) -> Result<u64, crate::catalog::CatalogError> {
            Ok(0)
        }
        async fn get_transaction_by_request_id(&self, id: &str) -> Result<Option<RefillTransaction>, crate::catalog::CatalogError> {
            Ok(self.0.lock().unwrap().iter().find(|r| r.refill_request_id == id).cloned())
        }
        async fn get_pending_transaction_by_asset_id(&self, _asset_id: Id) -> Result<Option<RefillTransaction>, crate::catalog::CatalogError> {
            Ok(None)
        }
        async fn get_last_successful_refill_by_asset_id(&self, _asset_id: Id) -> Result<Option<RefillTransaction>, crate::catalog::CatalogError> {
            Ok(None)
        }
        async fn get_transactions_by_status(&self, _status: RefillStatus) -> Result<Vec<RefillTransaction>, crate::catalog::CatalogError> {
            Ok(vec![])
        }
        async fn ping(&self) -> Result<(), crate::catalog::CatalogError> {
            Ok(())
        }
    }

    fn sample() -> RefillTransaction {
        RefillTransaction {
            refill_request_id: "REQ001".into(),
            asset_id: 1,
            provider: "fireblocks".into(),
            amount_atomic: 50_000_000,
            amount: "0.5".into(),
            chain_name: "Bitcoin".into(),
            token_symbol: "BTC".into(),
            status: RefillStatus::Completed,
            provider_status: Some("COMPLETED".into()),
            provider_tx_id: Some("fb-1".into()),
            tx_hash: Some("0xabc".into()),
            message: None,
            provider_data: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn returns_the_persisted_row() {
        let catalog = FakeCatalog(Mutex::new(vec![sample()]));
        let row = get_refill_status(&catalog, "REQ001").await.unwrap();
        assert_eq!(row.status, RefillStatus::Completed);
    }

    #[tokio::test]
    async fn missing_row_is_transaction_not_found() {
        let catalog = FakeCatalog(Mutex::new(vec![]));
        let err = get_refill_status(&catalog, "REQ404").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransactionNotFound);
    }
}
