//! Reconciliation monitor (C7, spec §4.7): a periodic task polling non-terminal
//! transactions, normalizing provider responses, persisting diffs, and grouping
//! alerts for transactions stuck past the configured dwell threshold.
//!
//! Lifecycle and cancellation share the same `SigDown`-driven shutdown as the HTTP
//! listener: one `CancellationToken` stops both.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use refill_providers::{Provider, TokenInfo};
use refill_types::entities::{Id, RefillStatus, RefillTransaction};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertSink;
use crate::catalog::Catalog;
use crate::status;

/// Tunables for one reconciliation cycle (spec §6.4).
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub pending_alert_threshold: Duration,
    pub max_concurrency: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(30_000),
            pending_alert_threshold: Duration::from_secs(1800),
            max_concurrency: 8,
        }
    }
}

/// Owns the spawned reconciliation task. `start` is idempotent; a second call
/// while already running is a no-op (spec §4.7 "Lifecycle").
pub struct Monitor {
    catalog: Arc<dyn Catalog>,
    providers: HashMap<String, Arc<dyn Provider>>,
    alerts: Arc<dyn AlertSink>,
    config: MonitorConfig,
    running: AtomicBool,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        providers: HashMap<String, Arc<dyn Provider>>,
        alerts: Arc<dyn AlertSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            catalog,
            providers,
            alerts,
            config,
            running: AtomicBool::new(false),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Spawns the periodic task. A second call before `stop()` is a no-op.
    pub fn start(self: &Arc<Self>, cancellation_token: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.interval);
            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        tracing::info!("reconciliation monitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        this.run_cycle().await;
                    }
                }
            }
            this.running.store(false, Ordering::SeqCst);
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Cancels the scheduler and awaits the in-flight cycle briefly.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }

    async fn run_cycle(&self) {
        let pending = self.catalog.get_transactions_by_status(RefillStatus::Pending).await;
        let processing = self.catalog.get_transactions_by_status(RefillStatus::Processing).await;

        let mut rows = match (pending, processing) {
            (Ok(mut p), Ok(mut q)) => {
                p.append(&mut q);
                p
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "failed to fetch non-terminal transactions");
                return;
            }
        };
        rows.sort_by_key(|r| r.created_at);

        let before_cycle_snapshot: HashMap<String, chrono::DateTime<Utc>> =
            rows.iter().map(|r| (r.refill_request_id.clone(), r.updated_at)).collect();

        let catalog = &self.catalog;
        let providers = &self.providers;
        let results: Vec<Option<(RefillTransaction, bool)>> = stream::iter(rows)
            .map(|row| async move { reconcile_one(catalog.as_ref(), providers, row).await })
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        let mut stuck_ids = Vec::new();
        let now = Utc::now();
        for result in results.into_iter().flatten() {
            let (row, is_terminal_now) = result;
            if is_terminal_now {
                continue;
            }
            let Some(dwell_start) = before_cycle_snapshot.get(&row.refill_request_id) else {
                continue;
            };
            let dwell = now - *dwell_start;
            if dwell.to_std().unwrap_or_default() >= self.config.pending_alert_threshold {
                stuck_ids.push(row.refill_request_id.clone());
            }
        }

        if !stuck_ids.is_empty() {
            let message = format!(
                "{} refill(s) have been pending past the alert threshold: {}",
                stuck_ids.len(),
                stuck_ids.join(", ")
            );
            self.alerts.notify(&message).await;
        }
    }
}

/// Polls, extracts, diffs, and persists one transaction. Returns the post-patch
/// row and whether it is now terminal, or `None` on a non-fatal per-row failure
/// (spec §4.7 "Failure isolation" — errors here never abort the cycle).
async fn reconcile_one(
    catalog: &dyn Catalog,
    providers: &HashMap<String, Arc<dyn Provider>>,
    row: RefillTransaction,
) -> Option<(RefillTransaction, bool)> {
    let Some(provider) = providers.get(&row.provider) else {
        tracing::error!(provider = %row.provider, refill_request_id = %row.refill_request_id, "no provider client for reconciliation");
        return Some((row.clone(), row.status.is_terminal()));
    };
    let Some(provider_tx_id) = row.provider_tx_id.as_deref() else {
        return Some((row.clone(), row.status.is_terminal()));
    };

    let token_info = match asset_token_info(catalog, row.asset_id).await {
        Ok(Some(info)) => Some(info),
        Ok(None) => {
            tracing::error!(asset_id = row.asset_id, refill_request_id = %row.refill_request_id, "asset missing for in-flight transaction");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, asset_id = row.asset_id, "catalog error reconstructing token info");
            None
        }
    };

    let raw = match provider.get_transaction_by_id(provider_tx_id, token_info.as_ref()).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, refill_request_id = %row.refill_request_id, "provider poll failed, retrying next cycle");
            return Some((row.clone(), row.status.is_terminal()));
        }
    };

    let extracted = status::extract(&row.provider, &raw);
    let patch = status::diff(&row, &row.provider, &extracted);
    if !patch.has_changes() {
        return Some((row.clone(), row.status.is_terminal()));
    }

    let mut updated = row.clone();
    if let Some(s) = patch.status {
        updated.status = s;
    }
    if let Some(v) = patch.provider_status.clone() {
        updated.provider_status = Some(v);
    }
    if let Some(v) = patch.tx_hash.clone() {
        updated.tx_hash = Some(v);
    }
    if let Some(v) = patch.message.clone() {
        updated.message = Some(v);
    }
    if let Some(v) = patch.provider_data.clone() {
        updated.provider_data = Some(v);
    }
    updated.updated_at = Utc::now();

    match catalog.update_transaction(&row.refill_request_id, patch).await {
        Ok(_) => {
            let terminal = updated.status.is_terminal();
            Some((updated, terminal))
        }
        Err(e) => {
            tracing::error!(error = %e, refill_request_id = %row.refill_request_id, "failed to persist reconciliation patch");
            let terminal = row.status.is_terminal();
            Some((row, terminal))
        }
    }
}

async fn asset_token_info(catalog: &dyn Catalog, asset_id: Id) -> Result<Option<TokenInfo>, crate::catalog::CatalogError> {
    let Some(view) = catalog.get_asset_view_by_id(asset_id).await? else {
        return Ok(None);
    };
    let provider_name = view.asset.provider_name().unwrap_or_default().to_string();
    let mut wallet_config = HashMap::new();
    if let Some(cfg) = view.asset.hot_wallet_config.get(&provider_name) {
        wallet_config.insert(provider_name, cfg.clone());
    }
    Ok(Some(TokenInfo {
        symbol: view.asset.symbol.clone(),
        chain_symbol: view.chain.symbol.clone(),
        contract_address: if view.asset.is_native() {
            None
        } else {
            Some(view.asset.contract_address.clone())
        },
        decimals: view.asset.decimals,
        wallet_config,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use refill_providers::ProviderError;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct StubCatalog {
        rows: StdMutex<Vec<RefillTransaction>>,
    }

    #[async_trait]
    impl Catalog for StubCatalog {
        async fn get_chain_by_name(&self, _name: &str) -> Result<Option<refill_types::entities::Chain>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_asset_by_symbol_and_chain(
            &self,
            _s: &str,
            _c: Id,
        ) -> Result<Option<refill_types::entities::AssetView>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_wallet_by_address(&self, _a: &str) -> Result<Option<refill_types::entities::Wallet>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_asset_view_by_id(
            &self,
            _id: Id,
        ) -> Result<Option<refill_types::entities::AssetView>, crate::catalog::CatalogError> {
            Ok(None)
        }
        async fn insert_transaction(
            &self,
            row: RefillTransaction,
        ) -> Result<RefillTransaction, crate::catalog::CatalogError> {
            Ok(row)
        }
        async fn update_transaction(
            &self,
            refill_request_id: &str,
            patch: refill_types::entities::RefillTransactionPatch,
        ) -> Result<u64, crate::catalog::CatalogError> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|r| r.refill_request_id == refill_request_id) {
                if let Some(s) = patch.status {
                    row.status = s;
                }
                if let Some(v) = patch.provider_status {
                    row.provider_status = Some(v);
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
            status: RefillStatus,
        ) -> Result<Vec<RefillTransaction>, crate::catalog::CatalogError> {
            Ok(self.rows.lock().unwrap().iter().filter(|r| r.status == status).cloned().collect())
        }
        async fn ping(&self) -> Result<(), crate::catalog::CatalogError> {
            Ok(())
        }
    }

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "fireblocks"
        }
        async fn init(&self, _c: refill_providers::Credentials) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn get_token_balance(&self, _t: &TokenInfo) -> Result<String, ProviderError> {
            Ok("0".into())
        }
        async fn create_transfer_request(
            &self,
            _p: refill_providers::TransferRequestParams,
        ) -> Result<refill_providers::ProviderTransferResult, ProviderError> {
            unimplemented!()
        }
        async fn get_transaction_by_id(
            &self,
            _id: &str,
            _t: Option<&TokenInfo>,
        ) -> Result<serde_json::Value, ProviderError> {
            Ok(json!({"id": "fb-1", "status": "COMPLETED"}))
        }
    }

    fn sample_row() -> RefillTransaction {
        RefillTransaction {
            refill_request_id: "REQ001".into(),
            asset_id: 1,
            provider: "fireblocks".into(),
            amount_atomic: 50_000_000,
            amount: "0.5".into(),
            chain_name: "Bitcoin".into(),
            token_symbol: "BTC".into(),
            status: RefillStatus::Processing,
            provider_status: Some("SUBMITTED".into()),
            provider_tx_id: Some("fb-1".into()),
            tx_hash: None,
            message: None,
            provider_data: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reconcile_one_drives_row_to_terminal() {
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        providers.insert("fireblocks".into(), Arc::new(StubProvider));
        let catalog = StubCatalog { rows: StdMutex::new(vec![sample_row()]) };

        let (updated, terminal) = reconcile_one(&catalog, &providers, sample_row()).await.unwrap();
        assert!(terminal);
        assert_eq!(updated.status, RefillStatus::Completed);
    }

    #[tokio::test]
    async fn missing_provider_leaves_row_unchanged() {
        let providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        let catalog = StubCatalog { rows: StdMutex::new(vec![sample_row()]) };

        let (updated, terminal) = reconcile_one(&catalog, &providers, sample_row()).await.unwrap();
        assert!(!terminal);
        assert_eq!(updated.status, RefillStatus::Processing);
    }
}
