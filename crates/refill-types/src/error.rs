//! The closed set of error codes (spec §7) and the `AppError` envelope every
//! component returns on failure.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json_;

/// Discriminated error code. The set is closed per spec §7 — a new failure mode
/// is a spec change, not an open-ended string. Wire representation is
/// SCREAMING_SNAKE_CASE (spec §6.1/§7), e.g. `TRANSACTION_EXISTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Admission (spec §4.4)
    MissingFields,
    BlockchainNotFound,
    AssetNotFound,
    RefillInProgress,
    CooldownPeriodActive,
    HotWalletAddressValidationError,
    SweepWalletMismatch,
    NoSweepWalletConfigured,
    NoProviderAvailable,
    NoLiminalColdWalletConfigured,
    NoFireblocksColdWalletConfigured,
    UnsupportedProvider,
    InsufficientBalance,
    InvalidWalletType,
    InvalidAmount,
    SufficientBalance,
    AboveTriggerThreshold,
    WillOverfillTarget,

    // Orchestrator / query (spec §4.5, §4.8, §7)
    TransactionExists,
    TransactionNotFound,
    TransactionCreationError,
    TransactionUpdateError,
    RefillInitiationError,
    StatusCheckError,
    ProviderNotAvailable,
    UnknownProvider,

    // Envelope (spec §4.3)
    JwtLifetimeExceeded,
    TokenExpired,
    InvalidToken,
    MissingAuthorizationHeader,
    InvalidAuthorizationFormat,
    MissingBearerToken,
    RefillRequestIdMismatch,
    AuthConfigError,

    // Read-path parameter errors (spec §6.1)
    MissingParameter,

    InternalError,
}

impl ErrorCode {
    /// HTTP status is a pure function of the code (spec §7).
    pub fn status_code(self) -> StatusCode {
        use ErrorCode::*;
        match self {
            MissingFields
            | BlockchainNotFound
            | AssetNotFound
            | CooldownPeriodActive
            | HotWalletAddressValidationError
            | SweepWalletMismatch
            | NoSweepWalletConfigured
            | NoProviderAvailable
            | NoLiminalColdWalletConfigured
            | NoFireblocksColdWalletConfigured
            | UnsupportedProvider
            | InsufficientBalance
            | InvalidWalletType
            | InvalidAmount
            | SufficientBalance
            | AboveTriggerThreshold
            | WillOverfillTarget
            | TransactionExists
            | MissingParameter
            | RefillRequestIdMismatch => StatusCode::BAD_REQUEST,

            RefillInProgress => StatusCode::CONFLICT,

            TransactionNotFound => StatusCode::NOT_FOUND,

            TokenExpired
            | InvalidToken
            | MissingAuthorizationHeader
            | InvalidAuthorizationFormat
            | MissingBearerToken
            | JwtLifetimeExceeded => StatusCode::UNAUTHORIZED,

            TransactionCreationError
            | TransactionUpdateError
            | RefillInitiationError
            | StatusCheckError
            | ProviderNotAvailable
            | UnknownProvider
            | AuthConfigError
            | InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Every internal operation returns either a typed success payload, or this:
/// `{code, error_message, data}` (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Json_>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            error_message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Json_) -> Self {
        self.data = Some(data);
        self
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.error_message)
    }
}

impl std::error::Error for AppError {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    code: ErrorCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Json_>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = ErrorBody {
            success: false,
            code: self.code,
            message: &self.error_message,
            data: self.data.as_ref(),
        };
        (status, Json(body)).into_response()
    }
}
