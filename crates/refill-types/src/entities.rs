//! Persisted entities (spec §3): `Chain`, `Wallet`, `Asset`, `RefillTransaction`.
//!
//! These are semantic types only — the persistence layer (`refill-core::catalog`)
//! owns the physical row mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use std::str::FromStr;

pub type Id = i64;

/// Identity of a supported blockchain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub id: Id,
    pub name: String,
    pub symbol: String,
    pub native_asset_symbol: String,
    pub is_active: bool,
}

/// `wallet_type` discriminator. Kept as an app-level enum over a `TEXT` column
/// (see SPEC_FULL.md §3) so new wallet kinds don't need a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    Hot,
    Cold,
    Other,
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WalletType::Hot => "hot",
            WalletType::Cold => "cold",
            WalletType::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl FromStr for WalletType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "hot" => WalletType::Hot,
            "cold" => WalletType::Cold,
            _ => WalletType::Other,
        })
    }
}

/// A custody address the system knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Id,
    pub address: String,
    pub wallet_type: WalletType,
    /// provider-name -> provider-specific identifier bag
    pub hot_wallet_config: Json,
}

/// Sentinel used in place of a contract address for an asset's native coin.
pub const NATIVE_SENTINEL: &str = "native";

/// A token on a specific chain, with refill policy (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Id,
    pub symbol: String,
    pub chain_id: Id,
    pub contract_address: String,
    pub decimals: u32,
    pub wallet_id: Id,
    pub refill_sweep_wallet: String,
    pub sweep_wallet_config: Json,
    pub hot_wallet_config: Json,
    pub refill_target_balance_atomic: u128,
    pub refill_trigger_threshold_atomic: u128,
    pub refill_cooldown_period: Option<i64>,
    pub is_active: bool,
}

impl Asset {
    pub fn is_native(&self) -> bool {
        self.contract_address.eq_ignore_ascii_case(NATIVE_SENTINEL)
    }

    /// The provider name authoritative for this asset's refills (spec §4.2).
    pub fn provider_name(&self) -> Option<&str> {
        self.sweep_wallet_config.get("provider")?.as_str()
    }

    pub fn cooldown_active(&self) -> bool {
        matches!(self.refill_cooldown_period, Some(p) if p > 0)
    }
}

/// A joined view of an Asset with its Chain and hot Wallet, as most catalog reads
/// return it (spec §4.1: "joins Wallet and Chain for convenience").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetView {
    pub asset: Asset,
    pub chain: Chain,
    pub wallet: Wallet,
}

/// Internal refill state machine (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefillStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RefillStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RefillStatus::Completed | RefillStatus::Failed)
    }

    pub fn as_db_str(self) -> &'static str {
        match self {
            RefillStatus::Pending => "PENDING",
            RefillStatus::Processing => "PROCESSING",
            RefillStatus::Completed => "COMPLETED",
            RefillStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RefillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown refill status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for RefillStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RefillStatus::Pending),
            "PROCESSING" => Ok(RefillStatus::Processing),
            "COMPLETED" => Ok(RefillStatus::Completed),
            "FAILED" => Ok(RefillStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One attempted refill (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefillTransaction {
    pub refill_request_id: String,
    pub asset_id: Id,
    pub provider: String,
    pub amount_atomic: u128,
    pub amount: String,
    pub chain_name: String,
    pub token_symbol: String,
    pub status: RefillStatus,
    pub provider_status: Option<String>,
    pub provider_tx_id: Option<String>,
    pub tx_hash: Option<String>,
    pub message: Option<String>,
    pub provider_data: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable fields a status-mapper diff or the orchestrator may patch.
/// `None` means "leave unchanged" (spec §4.6: "Null/undefined incoming fields MUST
/// NOT overwrite non-null stored fields").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefillTransactionPatch {
    pub status: Option<RefillStatus>,
    pub provider_status: Option<String>,
    pub provider_tx_id: Option<String>,
    pub tx_hash: Option<String>,
    pub message: Option<String>,
    pub provider_data: Option<Json>,
}

impl RefillTransactionPatch {
    pub fn has_changes(&self) -> bool {
        self.status.is_some()
            || self.provider_status.is_some()
            || self.provider_tx_id.is_some()
            || self.tx_hash.is_some()
            || self.message.is_some()
            || self.provider_data.is_some()
    }
}
