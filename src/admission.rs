//! Admission pipeline (C4, spec §4.4): validates a refill intent end to end and
//! decides accept/reject with a typed error code. Steps run in order as a chain
//! of `Result`-returning functions, short-circuited with `?` on the first failure
//! — the redesign flag in spec §9 ("replace exception-driven control flow with a
//! single result sum type") already applied.

use std::sync::Arc;

use chrono::Utc;
use refill_providers::{Provider, TokenInfo};
use refill_types::entities::{Asset, Chain, Wallet, WalletType, NATIVE_SENTINEL};
use refill_types::error::{AppError, ErrorCode};
use refill_types::{DecimalAmount, atomic_from_str};
use serde::Deserialize;
use serde_json::{Value as Json, json};

use crate::catalog::Catalog;

/// The seven fields of an inbound refill intent (spec §4.4).
#[derive(Debug, Clone, Deserialize)]
pub struct RefillIntent {
    pub refill_request_id: Option<String>,
    pub wallet_address: Option<String>,
    pub asset_symbol: Option<String>,
    pub asset_address: Option<String>,
    pub chain_name: Option<String>,
    pub refill_amount: Option<String>,
    pub refill_sweep_wallet: Option<String>,
}

/// All seven fields, guaranteed present, after the presence check (step 1).
struct PresentIntent {
    refill_request_id: String,
    wallet_address: String,
    asset_symbol: String,
    asset_address: String,
    chain_name: String,
    refill_amount: String,
    refill_sweep_wallet: String,
}

/// The validated view returned on acceptance (spec §4.4 closing paragraph).
pub struct AcceptedRefill {
    pub refill_request_id: String,
    pub chain: Chain,
    pub asset: Asset,
    pub wallet: Wallet,
    pub refill_amount: DecimalAmount,
    pub refill_amount_atomic: u128,
    pub current_hot_balance_atomic: u128,
    pub provider: Arc<dyn Provider>,
}

fn check_presence(intent: RefillIntent) -> Result<PresentIntent, AppError> {
    let mut missing = Vec::new();
    macro_rules! require {
        ($field:expr, $name:literal) => {
            match $field {
                Some(v) if !v.trim().is_empty() => v,
                _ => {
                    missing.push($name);
                    String::new()
                }
            }
        };
    }
    let refill_request_id = require!(intent.refill_request_id, "refill_request_id");
    let wallet_address = require!(intent.wallet_address, "wallet_address");
    let asset_symbol = require!(intent.asset_symbol, "asset_symbol");
    let asset_address = require!(intent.asset_address, "asset_address");
    let chain_name = require!(intent.chain_name, "chain_name");
    let refill_amount = require!(intent.refill_amount, "refill_amount");
    let refill_sweep_wallet = require!(intent.refill_sweep_wallet, "refill_sweep_wallet");

    if !missing.is_empty() {
        return Err(
            AppError::new(ErrorCode::MissingFields, "missing required fields")
                .with_data(json!({ "missing_fields": missing })),
        );
    }

    Ok(PresentIntent {
        refill_request_id,
        wallet_address,
        asset_symbol,
        asset_address,
        chain_name,
        refill_amount,
        refill_sweep_wallet,
    })
}

async fn lookup_chain(catalog: &dyn Catalog, chain_name: &str) -> Result<Chain, AppError> {
    let chain = catalog
        .get_chain_by_name(chain_name)
        .await
        .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?
        .filter(|c| c.is_active)
        .ok_or_else(|| AppError::new(ErrorCode::BlockchainNotFound, "blockchain not found"))?;
    Ok(chain)
}

async fn lookup_asset(
    catalog: &dyn Catalog,
    asset_symbol: &str,
    chain_id: i64,
) -> Result<(Asset, Wallet), AppError> {
    let view = catalog
        .get_asset_by_symbol_and_chain(asset_symbol, chain_id)
        .await
        .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?
        .ok_or_else(|| AppError::new(ErrorCode::AssetNotFound, "asset not found"))?;
    Ok((view.asset, view.wallet))
}

async fn check_in_flight(catalog: &dyn Catalog, asset: &Asset) -> Result<(), AppError> {
    if let Some(existing) = catalog
        .get_pending_transaction_by_asset_id(asset.id)
        .await
        .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?
    {
        return Err(AppError::new(ErrorCode::RefillInProgress, "a refill is already in progress for this asset")
            .with_data(json!({
                "existing_refill_request_id": existing.refill_request_id,
                "status": existing.status,
                "provider_tx_id": existing.provider_tx_id,
                "created_at": existing.created_at,
            })));
    }
    Ok(())
}

async fn check_cooldown(catalog: &dyn Catalog, asset: &Asset) -> Result<(), AppError> {
    if !asset.cooldown_active() {
        return Ok(());
    }
    let cooldown = asset.refill_cooldown_period.unwrap_or(0);
    let Some(last) = catalog
        .get_last_successful_refill_by_asset_id(asset.id)
        .await
        .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?
    else {
        return Ok(());
    };
    let elapsed = (Utc::now() - last.updated_at).num_seconds();
    if elapsed < cooldown {
        let remaining = cooldown - elapsed;
        return Err(
            AppError::new(ErrorCode::CooldownPeriodActive, "refill cooldown period is active").with_data(json!({
                "last_refill_time": last.updated_at,
                "cooldown_period_seconds": cooldown,
                "remaining_cooldown_seconds": remaining,
                "last_refill_request_id": last.refill_request_id,
            })),
        );
    }
    Ok(())
}

fn check_hot_wallet_address(intent: &PresentIntent, asset: &Asset, wallet: &Wallet) -> Result<(), AppError> {
    if !intent.wallet_address.eq_ignore_ascii_case(&wallet.address) {
        return Err(
            AppError::new(ErrorCode::HotWalletAddressValidationError, "wallet_address does not match the asset's hot wallet").with_data(json!({
                "expected": wallet.address,
                "actual": intent.wallet_address,
            })),
        );
    }

    let asset_is_native = asset.is_native();
    let intent_is_native = intent.asset_address.eq_ignore_ascii_case(NATIVE_SENTINEL);
    if asset_is_native != intent_is_native {
        return Err(
            AppError::new(ErrorCode::HotWalletAddressValidationError, "native sentinel mismatch between intent and asset").with_data(json!({
                "expected_contract_address": asset.contract_address,
                "actual_asset_address": intent.asset_address,
            })),
        );
    }
    if !asset_is_native && !intent.asset_address.eq_ignore_ascii_case(&asset.contract_address) {
        return Err(
            AppError::new(ErrorCode::HotWalletAddressValidationError, "asset_address does not match the asset's contract address").with_data(json!({
                "expected": asset.contract_address,
                "actual": intent.asset_address,
            })),
        );
    }
    Ok(())
}

fn check_sweep_wallet(intent: &PresentIntent, asset: &Asset) -> Result<(), AppError> {
    if asset.refill_sweep_wallet.is_empty() {
        return Err(AppError::new(
            ErrorCode::NoSweepWalletConfigured,
            "asset has no configured sweep wallet",
        ));
    }
    if intent.refill_sweep_wallet != asset.refill_sweep_wallet {
        return Err(
            AppError::new(ErrorCode::SweepWalletMismatch, "refill_sweep_wallet does not exactly match the asset's configured sweep wallet").with_data(json!({
                "expected": asset.refill_sweep_wallet,
                "actual": intent.refill_sweep_wallet,
            })),
        );
    }
    Ok(())
}

fn resolve_provider(
    registry: &refill_providers::ProviderRegistry,
    asset: &Asset,
) -> Result<Arc<dyn Provider>, AppError> {
    let provider_name = asset
        .provider_name()
        .ok_or_else(|| AppError::new(ErrorCode::NoProviderAvailable, "asset has no configured provider"))?;
    registry
        .get(provider_name)
        .ok_or_else(|| AppError::new(ErrorCode::NoProviderAvailable, format!("no provider client for '{provider_name}'")))
}

fn token_info_from(
    config: &Json,
    asset: &Asset,
    chain: &Chain,
    provider_name: &str,
    on_missing: impl FnOnce(&str) -> AppError,
) -> Result<TokenInfo, AppError> {
    let mut wallet_config = std::collections::HashMap::new();
    let per_provider = config.get(provider_name).ok_or_else(|| on_missing(provider_name))?;
    wallet_config.insert(provider_name.to_string(), per_provider.clone());
    Ok(TokenInfo {
        symbol: asset.symbol.clone(),
        chain_symbol: chain.symbol.clone(),
        contract_address: if asset.is_native() {
            None
        } else {
            Some(asset.contract_address.clone())
        },
        decimals: asset.decimals,
        wallet_config,
    })
}

fn missing_cold_wallet_error(provider_name: &str) -> AppError {
    match provider_name {
        "liminal" => AppError::new(ErrorCode::NoLiminalColdWalletConfigured, "no liminal cold wallet configured"),
        "fireblocks" => AppError::new(ErrorCode::NoFireblocksColdWalletConfigured, "no fireblocks cold wallet configured"),
        other => AppError::new(ErrorCode::UnsupportedProvider, format!("unsupported provider '{other}'")),
    }
}

/// Absence here means the hot wallet row's own config bag is missing an entry for
/// its own resolved provider — a data anomaly, not a user-facing validation failure.
fn missing_hot_wallet_error(provider_name: &str) -> AppError {
    AppError::new(
        ErrorCode::InternalError,
        format!("hot wallet has no configuration for provider '{provider_name}'"),
    )
}

async fn check_cold_balance(
    provider: &dyn Provider,
    asset: &Asset,
    chain: &Chain,
    required_atomic: u128,
) -> Result<(), AppError> {
    let provider_name = asset.provider_name().unwrap_or_default();
    let token_info = token_info_from(&asset.sweep_wallet_config, asset, chain, provider_name, missing_cold_wallet_error)?;
    let balance_raw = provider
        .get_token_balance(&token_info)
        .await
        .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?;
    let balance = atomic_from_str(&balance_raw)
        .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?;
    if balance < required_atomic {
        return Err(
            AppError::new(ErrorCode::InsufficientBalance, "cold wallet balance is insufficient for this refill").with_data(json!({
                "balance": balance.to_string(),
                "required": required_atomic.to_string(),
            })),
        );
    }
    Ok(())
}

/// Step 10 outcome.
enum HotWalletDecision {
    Accept,
    Reject(AppError),
}

fn evaluate_hot_wallet_need(asset: &Asset, current: u128, refill_atomic: u128) -> HotWalletDecision {
    let target = asset.refill_target_balance_atomic;
    let trigger = asset.refill_trigger_threshold_atomic;

    if target > 0 && current >= target {
        return HotWalletDecision::Reject(
            AppError::new(ErrorCode::SufficientBalance, "hot wallet balance already meets or exceeds target")
                .with_data(json!({ "current": current.to_string(), "target": target.to_string() })),
        );
    }
    if trigger > 0 && current >= trigger {
        return HotWalletDecision::Reject(
            AppError::new(ErrorCode::AboveTriggerThreshold, "hot wallet balance is above the trigger threshold")
                .with_data(json!({ "current": current.to_string(), "trigger": trigger.to_string() })),
        );
    }
    if target > 0 {
        let projected = current + refill_atomic;
        if projected > target {
            return HotWalletDecision::Reject(
                AppError::new(ErrorCode::WillOverfillTarget, "refill would overfill the target balance")
                    .with_data(json!({ "projected": projected.to_string(), "target": target.to_string() })),
            );
        }
    }
    HotWalletDecision::Accept
}

/// Runs the full admission pipeline (spec §4.4, steps 1-10).
pub async fn admit(
    catalog: &dyn Catalog,
    registry: &refill_providers::ProviderRegistry,
    intent: RefillIntent,
) -> Result<AcceptedRefill, AppError> {
    // 1. Presence check
    let intent = check_presence(intent)?;

    // 2. Chain lookup
    let chain = lookup_chain(catalog, &intent.chain_name).await?;

    // 3. Asset lookup
    let (asset, wallet) = lookup_asset(catalog, &intent.asset_symbol, chain.id).await?;

    // 4. In-flight lock
    check_in_flight(catalog, &asset).await?;

    // 5. Cooldown
    check_cooldown(catalog, &asset).await?;

    // 6. Hot-wallet address matching
    check_hot_wallet_address(&intent, &asset, &wallet)?;

    // 7. Sweep-wallet matching
    check_sweep_wallet(&intent, &asset)?;

    // 8. Provider resolution
    let provider = resolve_provider(registry, &asset)?;

    // Parse/convert the requested amount before it's needed by steps 9-10.
    let refill_amount = DecimalAmount::parse(&intent.refill_amount)
        .map_err(|e| AppError::new(ErrorCode::InvalidAmount, e.to_string()))?;
    if !refill_amount.is_positive() {
        return Err(AppError::new(ErrorCode::InvalidAmount, "refill_amount must be positive"));
    }
    let refill_amount_atomic = refill_amount
        .to_atomic(asset.decimals)
        .map_err(|e| AppError::new(ErrorCode::InvalidAmount, e.to_string()))?;

    // 9. Cold-wallet balance (live)
    check_cold_balance(provider.as_ref(), &asset, &chain, refill_amount_atomic).await?;

    // 10. Hot-wallet need (live)
    if wallet.wallet_type != WalletType::Hot {
        return Err(AppError::new(ErrorCode::InvalidWalletType, "target wallet is not a hot wallet"));
    }
    let hot_provider_name = asset.provider_name().unwrap_or_default();
    let hot_token_info = token_info_from(&asset.hot_wallet_config, &asset, &chain, hot_provider_name, missing_hot_wallet_error)?;
    let hot_balance_raw = provider
        .get_token_balance(&hot_token_info)
        .await
        .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?;
    let current_hot_balance_atomic = atomic_from_str(&hot_balance_raw)
        .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))?;

    match evaluate_hot_wallet_need(&asset, current_hot_balance_atomic, refill_amount_atomic) {
        HotWalletDecision::Reject(err) => return Err(err),
        HotWalletDecision::Accept => {}
    }

    Ok(AcceptedRefill {
        refill_request_id: intent.refill_request_id,
        chain,
        asset,
        wallet,
        refill_amount,
        refill_amount_atomic,
        current_hot_balance_atomic,
        provider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overfill_rejects_with_projected_and_target() {
        let asset = sample_asset(100_000_000, 50_000_000);
        let decision = evaluate_hot_wallet_need(&asset, 90_000_000, 50_000_000);
        match decision {
            HotWalletDecision::Reject(err) => {
                assert_eq!(err.code, ErrorCode::WillOverfillTarget);
                assert_eq!(err.data.unwrap()["projected"], "140000000");
            }
            HotWalletDecision::Accept => panic!("expected rejection"),
        }
    }

    #[test]
    fn sufficient_balance_short_circuits_before_overfill_check() {
        let asset = sample_asset(100_000_000, 50_000_000);
        let decision = evaluate_hot_wallet_need(&asset, 100_000_000, 50_000_000);
        matches!(decision, HotWalletDecision::Reject(_));
    }

    #[test]
    fn below_trigger_with_room_accepts() {
        let asset = sample_asset(100_000_000, 50_000_000);
        let decision = evaluate_hot_wallet_need(&asset, 30_000_000, 50_000_000);
        assert!(matches!(decision, HotWalletDecision::Accept));
    }

    fn sample_asset(target: u128, trigger: u128) -> Asset {
        Asset {
            id: 1,
            symbol: "BTC".into(),
            chain_id: 1,
            contract_address: "native".into(),
            decimals: 8,
            wallet_id: 1,
            refill_sweep_wallet: "0xcold".into(),
            sweep_wallet_config: json!({"provider": "fireblocks"}),
            hot_wallet_config: json!({"provider": "fireblocks"}),
            refill_target_balance_atomic: target,
            refill_trigger_threshold_atomic: trigger,
            refill_cooldown_period: None,
            is_active: true,
        }
    }
}
