//! Health probe (C9, spec §4.9): a `SELECT 1`-equivalent round-trip against the
//! persistence backend.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::Catalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: ServiceStatus,
    pub services: Services,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Services {
    pub database: ServiceStatus,
    pub api: ServiceStatus,
}

/// Pings the catalog's backing store and reports overall liveness.
pub async fn check(catalog: &dyn Catalog) -> HealthReport {
    let database = match catalog.ping().await {
        Ok(()) => ServiceStatus::Healthy,
        Err(e) => {
            tracing::error!(error = %e, "health probe: database ping failed");
            ServiceStatus::Unhealthy
        }
    };
    let status = if database == ServiceStatus::Healthy {
        ServiceStatus::Healthy
    } else {
        ServiceStatus::Unhealthy
    };
    HealthReport {
        status,
        services: Services {
            database,
            api: ServiceStatus::Healthy,
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use refill_types::entities::{AssetView, Chain, Id, RefillStatus, RefillTransaction, RefillTransactionPatch, Wallet};

    struct StubCatalog {
        ping_ok: bool,
    }

    #[async_trait]
    impl Catalog for StubCatalog {
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
        async fn insert_transaction(&self, _row: RefillTransaction) -> Result<RefillTransaction, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn update_transaction(&self, _id: &str, _patch: RefillTransactionPatch) -> Result<u64, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_transaction_by_request_id(&self, _id: &str) -> Result<Option<RefillTransaction>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_pending_transaction_by_asset_id(&self, _asset_id: Id) -> Result<Option<RefillTransaction>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_last_successful_refill_by_asset_id(&self, _asset_id: Id) -> Result<Option<RefillTransaction>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn get_transactions_by_status(&self, _status: RefillStatus) -> Result<Vec<RefillTransaction>, crate::catalog::CatalogError> {
            unimplemented!()
        }
        async fn ping(&self) -> Result<(), crate::catalog::CatalogError> {
            if self.ping_ok {
                Ok(())
            } else {
                Err(crate::catalog::CatalogError::DataAnomaly("connection refused".into()))
            }
        }
    }

    #[tokio::test]
    async fn healthy_when_ping_succeeds() {
        let report = check(&StubCatalog { ping_ok: true }).await;
        assert_eq!(report.status, ServiceStatus::Healthy);
    }

    #[tokio::test]
    async fn unhealthy_when_ping_fails() {
        let report = check(&StubCatalog { ping_ok: false }).await;
        assert_eq!(report.status, ServiceStatus::Unhealthy);
        assert_eq!(report.services.database, ServiceStatus::Unhealthy);
    }
}
