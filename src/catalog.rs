//! Token catalog (C1, spec §4.1): read accessors over chains/wallets/assets, and
//! the sole write surface for `RefillTransaction` rows.

use async_trait::async_trait;
use refill_types::entities::{
    Asset, AssetView, Chain, Id, RefillStatus, RefillTransaction, RefillTransactionPatch, Wallet,
    WalletType,
};
use serde_json::Value as Json;
use sqlx::PgPool;
use sqlx::Row;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("refill_request_id already exists: {0}")]
    UniquenessViolation(String),
    #[error("data anomaly: {0}")]
    DataAnomaly(String),
}

/// Read/write accessors the core depends on (spec §4.1). Trait-bound rather than
/// a concrete `PgPool` so admission/orchestrator/monitor tests can substitute an
/// in-memory fake (SPEC_FULL.md §8).
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_chain_by_name(&self, name: &str) -> Result<Option<Chain>, CatalogError>;
    async fn get_asset_by_symbol_and_chain(
        &self,
        symbol: &str,
        chain_id: Id,
    ) -> Result<Option<AssetView>, CatalogError>;
    async fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>, CatalogError>;
    /// Joined asset/chain/wallet view by asset id, used by the monitor (C7) to
    /// reconstruct `TokenInfo` for a pending transaction without a symbol in hand.
    async fn get_asset_view_by_id(&self, asset_id: Id) -> Result<Option<AssetView>, CatalogError>;

    async fn insert_transaction(
        &self,
        row: RefillTransaction,
    ) -> Result<RefillTransaction, CatalogError>;
    async fn update_transaction(
        &self,
        refill_request_id: &str,
        patch: RefillTransactionPatch,
    ) -> Result<u64, CatalogError>;
    async fn get_transaction_by_request_id(
        &self,
        id: &str,
    ) -> Result<Option<RefillTransaction>, CatalogError>;
    async fn get_pending_transaction_by_asset_id(
        &self,
        asset_id: Id,
    ) -> Result<Option<RefillTransaction>, CatalogError>;
    async fn get_last_successful_refill_by_asset_id(
        &self,
        asset_id: Id,
    ) -> Result<Option<RefillTransaction>, CatalogError>;
    async fn get_transactions_by_status(
        &self,
        status: RefillStatus,
    ) -> Result<Vec<RefillTransaction>, CatalogError>;

    /// `SELECT 1`-equivalent round-trip (C9, spec §4.9).
    async fn ping(&self) -> Result<(), CatalogError>;
}

pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_chain(row: &sqlx::postgres::PgRow) -> Result<Chain, sqlx::Error> {
    Ok(Chain {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        symbol: row.try_get("symbol")?,
        native_asset_symbol: row.try_get("native_asset_symbol")?,
        is_active: row.try_get("is_active")?,
    })
}

fn row_to_wallet(row: &sqlx::postgres::PgRow) -> Result<Wallet, sqlx::Error> {
    let wallet_type_str: String = row.try_get("wallet_type")?;
    Ok(Wallet {
        id: row.try_get("id")?,
        address: row.try_get("address")?,
        wallet_type: WalletType::from_str(&wallet_type_str).unwrap(),
        hot_wallet_config: row.try_get("hot_wallet_config")?,
    })
}

fn row_to_asset(row: &sqlx::postgres::PgRow) -> Result<Asset, CatalogError> {
    let target: String = row.try_get("refill_target_balance_atomic")?;
    let trigger: String = row.try_get("refill_trigger_threshold_atomic")?;
    Ok(Asset {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        chain_id: row.try_get("chain_id")?,
        contract_address: row.try_get("contract_address")?,
        decimals: row.try_get::<i32, _>("decimals")? as u32,
        wallet_id: row.try_get("wallet_id")?,
        refill_sweep_wallet: row.try_get("refill_sweep_wallet")?,
        sweep_wallet_config: row.try_get("sweep_wallet_config")?,
        hot_wallet_config: row.try_get("hot_wallet_config")?,
        refill_target_balance_atomic: target
            .parse()
            .map_err(|_| CatalogError::DataAnomaly("bad target atomic".into()))?,
        refill_trigger_threshold_atomic: trigger
            .parse()
            .map_err(|_| CatalogError::DataAnomaly("bad trigger atomic".into()))?,
        refill_cooldown_period: row.try_get("refill_cooldown_period")?,
        is_active: row.try_get("is_active")?,
    })
}

fn row_to_asset_view(row: &sqlx::postgres::PgRow) -> Result<AssetView, CatalogError> {
    let asset = row_to_asset(row)?;
    let chain = Chain {
        id: row.try_get("c_id")?,
        name: row.try_get("c_name")?,
        symbol: row.try_get("c_symbol")?,
        native_asset_symbol: row.try_get("c_native_asset_symbol")?,
        is_active: row.try_get("c_is_active")?,
    };
    let wallet_type_str: String = row.try_get("w_wallet_type")?;
    let wallet = Wallet {
        id: row.try_get("w_id")?,
        address: row.try_get("w_address")?,
        wallet_type: WalletType::from_str(&wallet_type_str).unwrap(),
        hot_wallet_config: row.try_get("w_hot_wallet_config")?,
    };
    Ok(AssetView {
        asset,
        chain,
        wallet,
    })
}

const ASSET_VIEW_SELECT: &str = r#"
    SELECT a.*, c.id AS c_id, c.name AS c_name, c.symbol AS c_symbol,
           c.native_asset_symbol AS c_native_asset_symbol, c.is_active AS c_is_active,
           w.id AS w_id, w.address AS w_address, w.wallet_type AS w_wallet_type,
           w.hot_wallet_config AS w_hot_wallet_config
    FROM assets a
    JOIN chains c ON c.id = a.chain_id
    JOIN wallets w ON w.id = a.wallet_id
"#;

fn row_to_transaction(row: &sqlx::postgres::PgRow) -> Result<RefillTransaction, CatalogError> {
    let status_str: String = row.try_get("status")?;
    let amount_atomic: String = row.try_get("amount_atomic")?;
    Ok(RefillTransaction {
        refill_request_id: row.try_get("refill_request_id")?,
        asset_id: row.try_get("asset_id")?,
        provider: row.try_get("provider")?,
        amount_atomic: amount_atomic
            .parse()
            .map_err(|_| CatalogError::DataAnomaly("bad amount_atomic".into()))?,
        amount: row.try_get("amount")?,
        chain_name: row.try_get("chain_name")?,
        token_symbol: row.try_get("token_symbol")?,
        status: RefillStatus::from_str(&status_str)
            .map_err(|e| CatalogError::DataAnomaly(e.to_string()))?,
        provider_status: row.try_get("provider_status")?,
        provider_tx_id: row.try_get("provider_tx_id")?,
        tx_hash: row.try_get("tx_hash")?,
        message: row.try_get("message")?,
        provider_data: row.try_get::<Option<Json>, _>("provider_data")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn get_chain_by_name(&self, name: &str) -> Result<Option<Chain>, CatalogError> {
        let row = sqlx::query("SELECT * FROM chains WHERE lower(name) = lower($1)")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref()
            .map(row_to_chain)
            .transpose()
            .map_err(CatalogError::from)
    }

    async fn get_asset_by_symbol_and_chain(
        &self,
        symbol: &str,
        chain_id: Id,
    ) -> Result<Option<AssetView>, CatalogError> {
        let sql = format!(
            "{ASSET_VIEW_SELECT} WHERE lower(a.symbol) = lower($1) AND a.chain_id = $2 AND a.is_active"
        );
        let row = sqlx::query(&sql)
            .bind(symbol)
            .bind(chain_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_asset_view).transpose()
    }

    async fn get_asset_view_by_id(&self, asset_id: Id) -> Result<Option<AssetView>, CatalogError> {
        let sql = format!("{ASSET_VIEW_SELECT} WHERE a.id = $1");
        let row = sqlx::query(&sql)
            .bind(asset_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_asset_view).transpose()
    }

    async fn get_wallet_by_address(&self, address: &str) -> Result<Option<Wallet>, CatalogError> {
        let row = sqlx::query("SELECT * FROM wallets WHERE lower(address) = lower($1)")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref()
            .map(row_to_wallet)
            .transpose()
            .map_err(CatalogError::from)
    }

    async fn insert_transaction(
        &self,
        row: RefillTransaction,
    ) -> Result<RefillTransaction, CatalogError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO refill_transactions
                (refill_request_id, asset_id, provider, amount_atomic, amount,
                 chain_name, token_symbol, status, provider_status, provider_tx_id,
                 tx_hash, message, provider_data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(&row.refill_request_id)
        .bind(row.asset_id)
        .bind(&row.provider)
        .bind(row.amount_atomic.to_string())
        .bind(&row.amount)
        .bind(&row.chain_name)
        .bind(&row.token_symbol)
        .bind(row.status.as_db_str())
        .bind(&row.provider_status)
        .bind(&row.provider_tx_id)
        .bind(&row.tx_hash)
        .bind(&row.message)
        .bind(&row.provider_data)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(r) => row_to_transaction(&r),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                CatalogError::UniquenessViolation(row.refill_request_id.clone()),
            ),
            Err(e) => Err(CatalogError::from(e)),
        }
    }

    async fn update_transaction(
        &self,
        refill_request_id: &str,
        patch: RefillTransactionPatch,
    ) -> Result<u64, CatalogError> {
        let result = sqlx::query(
            r#"
            UPDATE refill_transactions SET
                status = COALESCE($2, status),
                provider_status = COALESCE($3, provider_status),
                provider_tx_id = COALESCE($4, provider_tx_id),
                tx_hash = COALESCE($5, tx_hash),
                message = COALESCE($6, message),
                provider_data = COALESCE($7, provider_data),
                updated_at = now()
            WHERE refill_request_id = $1
            "#,
        )
        .bind(refill_request_id)
        .bind(patch.status.map(|s| s.as_db_str().to_string()))
        .bind(patch.provider_status)
        .bind(patch.provider_tx_id)
        .bind(patch.tx_hash)
        .bind(patch.message)
        .bind(patch.provider_data)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_transaction_by_request_id(
        &self,
        id: &str,
    ) -> Result<Option<RefillTransaction>, CatalogError> {
        let row = sqlx::query("SELECT * FROM refill_transactions WHERE refill_request_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn get_pending_transaction_by_asset_id(
        &self,
        asset_id: Id,
    ) -> Result<Option<RefillTransaction>, CatalogError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM refill_transactions
            WHERE asset_id = $1 AND status IN ('PENDING', 'PROCESSING')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn get_last_successful_refill_by_asset_id(
        &self,
        asset_id: Id,
    ) -> Result<Option<RefillTransaction>, CatalogError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM refill_transactions
            WHERE asset_id = $1 AND status = 'COMPLETED'
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn get_transactions_by_status(
        &self,
        status: RefillStatus,
    ) -> Result<Vec<RefillTransaction>, CatalogError> {
        let rows = sqlx::query(
            "SELECT * FROM refill_transactions WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(status.as_db_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_transaction).collect()
    }

    async fn ping(&self) -> Result<(), CatalogError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

