//! Error taxonomy (spec §7): validation, replay-state, authorization, economic, and
//! unstake-lifecycle failures, each mapped to an HTTP status code at the handler boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Top-level error surfaced by the settlement engine (spec §4.6 entry points).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("quote validation failed: {0}")]
    Validation(#[from] crate::types::QuoteError),

    #[error("invalid quote: {0}")]
    InvalidQuote(&'static str),

    #[error("signature invalid: {0}")]
    Signature(#[from] crate::eip712::SignatureError),

    #[error("order {order_id} already exists")]
    OrderAlreadyExists { order_id: String },

    #[error("order {order_id} not found")]
    OrderNotFound { order_id: String },

    #[error("order {order_id} is in state {actual}, expected {expected}")]
    WrongOrderState {
        order_id: String,
        actual: crate::types::OrderState,
        expected: crate::types::OrderState,
    },

    #[error("deposit deadline has passed")]
    DepositDeadlineExpired,

    #[error("fill deadline has passed")]
    FillDeadlineExpired,

    #[error("fill deadline has not yet passed")]
    FillDeadlineNotYetExpired,

    #[error("nonce already used")]
    NonceReplayed,

    #[error("solver {solver} is not registered")]
    SolverNotRegistered { solver: String },

    #[error("solver {solver} has insufficient unreserved bond: needs {needed}, has {available}")]
    InsufficientBond {
        solver: String,
        needed: String,
        available: String,
    },

    #[error("unstake already in progress")]
    UnstakeAlreadyPending,

    #[error("no unstake request pending")]
    NoUnstakePending,

    #[error("unstake lock has not yet elapsed")]
    UnstakeLockNotElapsed,

    #[error("deposit amount does not match quote")]
    DepositAmountMismatch,

    #[error("no excess balance to withdraw")]
    NoExcessBalance,

    #[error("caller is not authorized to perform this action")]
    Unauthorized,

    #[error("tolerance exceeds the protocol maximum")]
    ToleranceTooLarge,

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl EngineError {
    fn status(&self) -> StatusCode {
        match self {
            EngineError::Validation(_)
            | EngineError::InvalidQuote(_)
            | EngineError::DepositAmountMismatch
            | EngineError::ToleranceTooLarge => StatusCode::BAD_REQUEST,
            EngineError::Signature(_) | EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            EngineError::OrderNotFound { .. } | EngineError::SolverNotRegistered { .. } => {
                StatusCode::NOT_FOUND
            }
            EngineError::OrderAlreadyExists { .. } | EngineError::NonceReplayed => {
                StatusCode::CONFLICT
            }
            EngineError::WrongOrderState { .. }
            | EngineError::DepositDeadlineExpired
            | EngineError::FillDeadlineExpired
            | EngineError::FillDeadlineNotYetExpired
            | EngineError::UnstakeAlreadyPending
            | EngineError::NoUnstakePending
            | EngineError::NoExcessBalance
            | EngineError::UnstakeLockNotElapsed => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::InsufficientBond { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Storage(_) | EngineError::Encoding(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(error = %self, status = %status, "engine error");
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Errors from the aggregator's solicit/validate/rank pipeline (spec §4.8).
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("no solver returned a valid quote within the timeout")]
    NoQuotes,

    #[error("chain {0} is not configured")]
    UnknownChain(String),

    #[error("request validation failed: {0}")]
    Validation(#[from] crate::types::QuoteError),

    #[error("upstream registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl IntoResponse for AggregatorError {
    fn into_response(self) -> Response {
        let status = match &self {
            AggregatorError::NoQuotes => StatusCode::GATEWAY_TIMEOUT,
            AggregatorError::UnknownChain(_) => StatusCode::NOT_FOUND,
            AggregatorError::Validation(_) => StatusCode::BAD_REQUEST,
            AggregatorError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(error = %self, status = %status, "aggregator error");
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Errors from solver registration and lookup (spec §4.7).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry is at capacity for this chain")]
    AtCapacity,

    #[error("endpoint url failed SSRF validation: {0}")]
    UnsafeEndpoint(String),

    #[error("auth signature invalid")]
    BadAuth,

    #[error("solver {0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::AtCapacity => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::UnsafeEndpoint(_) => StatusCode::BAD_REQUEST,
            RegistryError::BadAuth => StatusCode::UNAUTHORIZED,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Storage(_) | RegistryError::Encoding(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        tracing::warn!(error = %self, status = %status, "registry error");
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
