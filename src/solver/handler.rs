//! The reference solver's own `/quote` endpoint (spec §4.9/§6): the
//! counterpart a registered solver's `endpoint` field points at. The
//! Aggregator is the only expected caller.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::chain_id::ChainId;
use crate::solver::pricing::{self, FeedAdapter, PricingParams};
use crate::solver::{NonceAllocator, QuoteSigner};
use crate::types::{DecimalU256, EvmAddress, EvmSignature, OrderType, Quote};

#[derive(Debug, thiserror::Error)]
pub enum SolverQuoteError {
    #[error("unsupported token pair")]
    UnsupportedPair,
    #[error(transparent)]
    Pricing(#[from] pricing::PricingError),
    #[error(transparent)]
    Signing(#[from] crate::solver::signer::SignerError),
    #[error("no verifying contract configured for chain {0}")]
    UnknownChain(ChainId),
}

impl IntoResponse for SolverQuoteError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            SolverQuoteError::UnsupportedPair | SolverQuoteError::Pricing(_) => axum::http::StatusCode::BAD_REQUEST,
            SolverQuoteError::UnknownChain(_) => axum::http::StatusCode::NOT_FOUND,
            SolverQuoteError::Signing(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverQuoteRequest {
    pub input_token: EvmAddress,
    pub output_token: EvmAddress,
    pub order_type: OrderType,
    pub amount: DecimalU256,
    pub user_address: EvmAddress,
    pub chain_id: ChainId,
    pub deposit_deadline: u32,
    pub fill_deadline: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverQuoteResponse {
    pub quote: Quote,
    pub signature: EvmSignature,
}

pub struct SolverState {
    pub signer: QuoteSigner,
    pub nonce_allocator: Arc<NonceAllocator>,
    pub adapter: FeedAdapter,
    pub pricing: PricingParams,
    pub min_order: U256,
    pub verifying_contracts: HashMap<ChainId, Address>,
}

pub async fn solver_quote(
    State(state): State<Arc<SolverState>>,
    Json(request): Json<SolverQuoteRequest>,
) -> axum::response::Response {
    match handle(&state, request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle(state: &SolverState, request: SolverQuoteRequest) -> Result<SolverQuoteResponse, SolverQuoteError> {
    let verifying_contract = *state
        .verifying_contracts
        .get(&request.chain_id)
        .ok_or(SolverQuoteError::UnknownChain(request.chain_id))?;

    let input = request.input_token.to_string().to_lowercase();
    let output = request.output_token.to_string().to_lowercase();
    let (bid, ask, inverted) = match state.adapter.bid_ask(&input, &output) {
        Some((bid, ask)) => (bid, ask, false),
        None => match state.adapter.bid_ask(&output, &input) {
            Some((bid, ask)) => (bid, ask, true),
            None => return Err(SolverQuoteError::UnsupportedPair),
        },
    };

    let counterpart = pricing::price(
        request.order_type,
        request.amount.0,
        bid,
        ask,
        inverted,
        &state.pricing,
        state.min_order,
    )?;

    let (input_amount, output_amount) = match request.order_type {
        OrderType::ExactOutput => (counterpart, request.amount.0),
        OrderType::ExactInput => (request.amount.0, counterpart),
    };

    let nonce = state.nonce_allocator.next().await;
    let quote = Quote {
        solver: state.signer.address().into(),
        user: request.user_address,
        input_token: request.input_token,
        input_amount: DecimalU256(input_amount),
        output_token: request.output_token,
        output_amount: DecimalU256(output_amount),
        order_type: request.order_type,
        output_chain_id: DecimalU256(U256::from(request.chain_id.reference())),
        deposit_deadline: request.deposit_deadline,
        fill_deadline: request.fill_deadline,
        nonce,
    };
    let signature = state.signer.sign(&quote, request.chain_id, verifying_contract)?;
    Ok(SolverQuoteResponse { quote, signature })
}
