//! Signed request/response envelope (C3, spec §4.3).
//!
//! Every externally facing request/response may be wrapped in a signed token whose
//! payload is a JSON object, carrying `iat`/`exp` claims bounded by
//! `jwt_max_lifetime_in_seconds`. Verification uses an operator-supplied public key;
//! signing uses the paired private key. `jsonwebtoken` speaks exactly this
//! vocabulary: claims struct, PEM keys, `exp` enforcement.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use refill_types::error::{AppError, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Envelope configuration (spec §6.4).
#[derive(Clone)]
pub struct EnvelopeConfig {
    pub auth_enabled: bool,
    pub jwt_max_lifetime_in_seconds: i64,
    pub auth_public_key_pem: Option<Vec<u8>>,
    pub callback_private_key_pem: Option<Vec<u8>>,
    pub algorithm: Algorithm,
}

impl EnvelopeConfig {
    pub fn disabled() -> Self {
        Self {
            auth_enabled: false,
            jwt_max_lifetime_in_seconds: 300,
            auth_public_key_pem: None,
            callback_private_key_pem: None,
            algorithm: Algorithm::RS256,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iat: i64,
    exp: i64,
    #[serde(flatten)]
    payload: Json,
}

/// Verifies an inbound signed token and returns the decoded payload.
///
/// When `auth_enabled` is false, this is a pass-through: `token` is parsed as
/// plain JSON and returned verbatim (spec: "the envelope is a pass-through that
/// copies the parsed request body into the verified-data slot").
pub fn verify(config: &EnvelopeConfig, token: &str) -> Result<Json, AppError> {
    if !config.auth_enabled {
        return serde_json::from_str(token)
            .map_err(|e| AppError::new(ErrorCode::InvalidToken, e.to_string()));
    }

    let key_pem = config
        .auth_public_key_pem
        .as_deref()
        .ok_or_else(|| AppError::new(ErrorCode::AuthConfigError, "no auth_public_key configured"))?;
    let decoding_key = decoding_key_for(config.algorithm, key_pem)
        .map_err(|e| AppError::new(ErrorCode::AuthConfigError, e.to_string()))?;

    let mut validation = Validation::new(config.algorithm);
    validation.validate_exp = true;
    validation.required_spec_claims.clear();

    let decoded = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::new(ErrorCode::TokenExpired, "token expired"),
            _ => AppError::new(ErrorCode::InvalidToken, e.to_string()),
        }
    })?;

    let claims = decoded.claims;
    let lifetime = claims.exp - claims.iat;
    if lifetime > config.jwt_max_lifetime_in_seconds {
        return Err(AppError::new(
            ErrorCode::JwtLifetimeExceeded,
            format!(
                "token lifetime {lifetime}s exceeds max {}s",
                config.jwt_max_lifetime_in_seconds
            ),
        ));
    }

    Ok(claims.payload)
}

/// Signs a JSON response payload into a token (spec §4.3 "Signing contract").
/// `iat = now`, `exp = now + jwt_max_lifetime_in_seconds`.
pub fn sign(config: &EnvelopeConfig, payload: Json) -> Result<String, AppError> {
    let key_pem = config
        .callback_private_key_pem
        .as_deref()
        .ok_or_else(|| {
            AppError::new(ErrorCode::AuthConfigError, "no callback_private_key configured")
        })?;
    let encoding_key = encoding_key_for(config.algorithm, key_pem)
        .map_err(|e| AppError::new(ErrorCode::AuthConfigError, e.to_string()))?;

    let now = Utc::now().timestamp();
    let claims = Claims {
        iat: now,
        exp: now + config.jwt_max_lifetime_in_seconds,
        payload,
    };
    encode(&Header::new(config.algorithm), &claims, &encoding_key)
        .map_err(|e| AppError::new(ErrorCode::InternalError, e.to_string()))
}

fn decoding_key_for(
    algorithm: Algorithm,
    pem: &[u8],
) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
    match algorithm {
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
            DecodingKey::from_rsa_pem(pem)
        }
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
        _ => DecodingKey::from_rsa_pem(pem),
    }
}

fn encoding_key_for(
    algorithm: Algorithm,
    pem: &[u8],
) -> Result<EncodingKey, jsonwebtoken::errors::Error> {
    match algorithm {
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
            EncodingKey::from_rsa_pem(pem)
        }
        Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(pem),
        _ => EncodingKey::from_rsa_pem(pem),
    }
}

/// Extracts a bearer token from an `Authorization` header value (spec §4.3,
/// read-operation token convention).
pub fn bearer_token(header_value: Option<&str>) -> Result<&str, AppError> {
    let value = header_value.ok_or_else(|| {
        AppError::new(ErrorCode::MissingAuthorizationHeader, "missing Authorization header")
    })?;
    let Some(token) = value.strip_prefix("Bearer ") else {
        return Err(AppError::new(
            ErrorCode::InvalidAuthorizationFormat,
            "expected 'Bearer <token>'",
        ));
    };
    if token.trim().is_empty() {
        return Err(AppError::new(ErrorCode::MissingBearerToken, "empty bearer token"));
    }
    Ok(token)
}

/// Cross-validates a read's target identifier carried in both the signed payload
/// and the URL path (spec §4.3 "Cross-validation for reads").
pub fn cross_validate_refill_request_id(payload: &Json, path_id: &str) -> Result<(), AppError> {
    if let Some(payload_id) = payload.get("refill_request_id").and_then(Json::as_str) {
        if payload_id != path_id {
            return Err(AppError::new(
                ErrorCode::RefillRequestIdMismatch,
                "refill_request_id in signed payload does not match path parameter",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pass_through_when_auth_disabled() {
        let config = EnvelopeConfig::disabled();
        let body = json!({"refill_request_id": "REQ001"});
        let verified = verify(&config, &body.to_string()).unwrap();
        assert_eq!(verified, body);
    }

    #[test]
    fn bearer_token_requires_prefix() {
        assert!(bearer_token(None).is_err());
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn cross_validation_rejects_mismatch() {
        let payload = json!({"refill_request_id": "REQ001"});
        assert!(cross_validate_refill_request_id(&payload, "REQ001").is_ok());
        assert!(cross_validate_refill_request_id(&payload, "REQ002").is_err());
    }
}
