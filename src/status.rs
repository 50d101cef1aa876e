//! Status mapper (C6, spec §4.6): raw provider status -> internal state machine,
//! the per-provider response extractor, and the diff used by the orchestrator
//! and monitor to decide what to persist.

use refill_types::entities::{RefillStatus, RefillTransaction, RefillTransactionPatch};
use serde_json::Value as Json;

/// Maps a provider's raw status string to the internal state machine (spec §4.6
/// vocabulary table). Unknown raw status defaults to `PROCESSING`.
pub fn map_status(provider: &str, raw_status: &str) -> RefillStatus {
    match provider {
        "liminal" => match raw_status {
            "1" | "2" => RefillStatus::Processing,
            "4" => RefillStatus::Completed,
            "5" => RefillStatus::Failed,
            other => {
                tracing::warn!(provider, raw_status = other, "unmapped liminal status, defaulting to PROCESSING");
                RefillStatus::Processing
            }
        },
        "fireblocks" => match raw_status {
            "SUBMITTED" | "PENDING_AML_SCREENING" | "PENDING_ENRICHMENT"
            | "PENDING_AUTHORIZATION" | "QUEUED" | "PENDING_SIGNATURE"
            | "PENDING_3RD_PARTY_MANUAL_APPROVAL" | "PENDING_3RD_PARTY" | "BROADCASTING"
            | "CONFIRMING" | "CANCELLING" => RefillStatus::Processing,
            "COMPLETED" => RefillStatus::Completed,
            "CANCELLED" | "BLOCKED" | "REJECTED" | "FAILED" => RefillStatus::Failed,
            other => {
                tracing::warn!(provider, raw_status = other, "unmapped fireblocks status, defaulting to PROCESSING");
                RefillStatus::Processing
            }
        },
        other => {
            tracing::warn!(provider = other, "unknown provider, defaulting to PROCESSING");
            RefillStatus::Processing
        }
    }
}

/// A normalized snapshot of a provider response (spec §4.6 "Extractor").
#[derive(Debug, Clone)]
pub struct ExtractedStatus {
    pub provider_tx_id: Option<String>,
    pub tx_hash: Option<String>,
    pub raw_status: String,
    pub message: Option<String>,
    pub raw_response: Json,
}

/// Absorbs the per-provider shape differences: Fireblocks nests the transaction
/// under a top-level `data` object sometimes and uses `subStatus`/`note` in
/// different places than Liminal's flat `note` field.
pub fn extract(provider: &str, raw: &Json) -> ExtractedStatus {
    let body = raw.get("data").unwrap_or(raw);
    let provider_tx_id = body
        .get("id")
        .or_else(|| body.get("transactionId"))
        .and_then(Json::as_str)
        .map(str::to_string);
    let tx_hash = body
        .get("txHash")
        .or_else(|| body.get("tx_hash"))
        .or_else(|| body.get("hash"))
        .and_then(Json::as_str)
        .map(str::to_string);
    let raw_status = match body.get("status") {
        Some(Json::String(s)) => s.clone(),
        Some(Json::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let message = match provider {
        "fireblocks" => body.get("subStatus").and_then(Json::as_str),
        _ => body
            .get("note")
            .or_else(|| body.get("message"))
            .or_else(|| body.get("comment"))
            .and_then(Json::as_str),
    }
    .map(str::to_string);

    ExtractedStatus {
        provider_tx_id,
        tx_hash,
        raw_status,
        message,
        raw_response: raw.clone(),
    }
}

/// Produces a patch containing only changed fields (spec §4.6 "Diff").
///
/// `status` is omitted when the mapped status is unchanged, even if `provider_status`
/// changed — this is how intermediate custody states flow through without
/// triggering internal transitions. `provider_data` is always included whenever
/// `provider_status` changes.
pub fn diff(
    current: &RefillTransaction,
    provider: &str,
    extracted: &ExtractedStatus,
) -> RefillTransactionPatch {
    let mut patch = RefillTransactionPatch::default();

    let provider_status_changed = current.provider_status.as_deref() != Some(&extracted.raw_status)
        && !extracted.raw_status.is_empty();
    if provider_status_changed {
        patch.provider_status = Some(extracted.raw_status.clone());
        patch.provider_data = Some(extracted.raw_response.clone());

        let mapped = map_status(provider, &extracted.raw_status);
        if mapped != current.status {
            patch.status = Some(mapped);
        }
    }

    if let Some(tx_hash) = &extracted.tx_hash {
        if current.tx_hash.as_deref() != Some(tx_hash.as_str()) {
            patch.tx_hash = Some(tx_hash.clone());
        }
    }
    if let Some(provider_tx_id) = &extracted.provider_tx_id {
        if current.provider_tx_id.as_deref() != Some(provider_tx_id.as_str()) {
            patch.provider_tx_id = Some(provider_tx_id.clone());
        }
    }
    if let Some(message) = &extracted.message {
        if current.message.as_deref() != Some(message.as_str()) {
            patch.message = Some(message.clone());
        }
    }

    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn sample_tx(status: RefillStatus, provider_status: Option<&str>) -> RefillTransaction {
        RefillTransaction {
            refill_request_id: "REQ001".into(),
            asset_id: 1,
            provider: "fireblocks".into(),
            amount_atomic: 50_000_000,
            amount: "0.5".into(),
            chain_name: "Bitcoin".into(),
            token_symbol: "BTC".into(),
            status,
            provider_status: provider_status.map(str::to_string),
            provider_tx_id: Some("fb-1".into()),
            tx_hash: None,
            message: None,
            provider_data: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn maps_liminal_vocabulary() {
        assert_eq!(map_status("liminal", "1"), RefillStatus::Processing);
        assert_eq!(map_status("liminal", "4"), RefillStatus::Completed);
        assert_eq!(map_status("liminal", "5"), RefillStatus::Failed);
        assert_eq!(map_status("liminal", "99"), RefillStatus::Processing);
    }

    #[test]
    fn maps_fireblocks_vocabulary() {
        assert_eq!(map_status("fireblocks", "SUBMITTED"), RefillStatus::Processing);
        assert_eq!(map_status("fireblocks", "COMPLETED"), RefillStatus::Completed);
        assert_eq!(map_status("fireblocks", "REJECTED"), RefillStatus::Failed);
    }

    #[test]
    fn diff_omits_status_when_unchanged_despite_provider_status_change() {
        let current = sample_tx(RefillStatus::Processing, Some("SUBMITTED"));
        let extracted = extract(
            "fireblocks",
            &json!({"id": "fb-1", "status": "BROADCASTING", "txHash": "0xabc"}),
        );
        let patch = diff(&current, "fireblocks", &extracted);
        assert_eq!(patch.status, None);
        assert_eq!(patch.provider_status.as_deref(), Some("BROADCASTING"));
        assert_eq!(patch.tx_hash.as_deref(), Some("0xabc"));
        assert!(patch.provider_data.is_some());
    }

    #[test]
    fn diff_includes_status_on_terminal_transition() {
        let current = sample_tx(RefillStatus::Processing, Some("BROADCASTING"));
        let extracted = extract("fireblocks", &json!({"id": "fb-1", "status": "COMPLETED"}));
        let patch = diff(&current, "fireblocks", &extracted);
        assert_eq!(patch.status, Some(RefillStatus::Completed));
    }

    #[test]
    fn diff_is_idempotent_on_repeated_application() {
        let current = sample_tx(RefillStatus::Processing, Some("SUBMITTED"));
        let extracted = extract("fireblocks", &json!({"id": "fb-1", "status": "BROADCASTING"}));
        let first_patch = diff(&current, "fireblocks", &extracted);

        let mut updated = current.clone();
        updated.provider_status = first_patch.provider_status.clone();
        updated.status = first_patch.status.unwrap_or(updated.status);
        updated.provider_data = first_patch.provider_data.clone();

        let second_patch = diff(&updated, "fireblocks", &extracted);
        assert!(!second_patch.has_changes());
    }

    #[test]
    fn null_fields_do_not_overwrite_stored_values() {
        let current = sample_tx(RefillStatus::Processing, Some("BROADCASTING"));
        let extracted = extract("fireblocks", &json!({"id": "fb-1", "status": "BROADCASTING"}));
        let patch = diff(&current, "fireblocks", &extracted);
        assert_eq!(patch.tx_hash, None);
        assert!(!patch.has_changes());
    }
}
