//! HTTP surface (spec §6/§6.1): quote solicitation, order status, solver
//! registry management, and a push-stream stub for engine events.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::aggregator::{Aggregator, QuoteRequest};
use crate::chain_id::ChainId;
use crate::engine::settlement::SimulatedGateway;
use crate::engine::SettlementEngine;
use crate::error::{AggregatorError, EngineError, RegistryError};
use crate::registry::SolverRegistry;
use crate::types::{EvmAddress, OrderState};

/// Shared application state. The deployed binary fixes the engine's gateway to
/// [`SimulatedGateway`] absent a live `alloy` provider wiring; swapping in a
/// real chain means providing a different [`crate::engine::settlement::OnchainGateway`]
/// impl here, not changing any handler.
#[derive(Clone)]
pub struct AppState {
    pub engines: Arc<HashMap<ChainId, Arc<SettlementEngine<SimulatedGateway>>>>,
    pub aggregator: Arc<Aggregator>,
    pub registry: Arc<SolverRegistry>,
}

fn unknown_chain(chain_id: &str) -> axum::response::Response {
    (axum::http::StatusCode::NOT_FOUND, format!("unknown chain id {chain_id:?}")).into_response()
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn quote(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    Json(request): Json<QuoteRequest>,
) -> axum::response::Response {
    let Ok(parsed_chain) = chain_id.parse::<ChainId>() else {
        return unknown_chain(&chain_id);
    };
    if !state.engines.contains_key(&parsed_chain) {
        return unknown_chain(&chain_id);
    }
    let now = crate::timestamp::UnixTimestamp::try_now().map(|t| t.0 as u32).unwrap_or(0);
    match state.aggregator.quote(request, now).await {
        Ok(quote) => Json(quote).into_response(),
        Err(err @ AggregatorError::UnknownChain(_)) => unknown_chain(&err.to_string()),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusResponse {
    order_id: String,
    state: OrderState,
    user: EvmAddress,
    solver: EvmAddress,
    input_token: EvmAddress,
    input_amount: crate::types::DecimalU256,
    output_token: EvmAddress,
    output_amount: crate::types::DecimalU256,
    fill_deadline: u32,
}

pub async fn order_status(
    State(state): State<AppState>,
    Path((chain_id, order_id)): Path<(String, String)>,
) -> axum::response::Response {
    let Ok(parsed_chain) = chain_id.parse::<ChainId>() else {
        return unknown_chain(&chain_id);
    };
    let Some(engine) = state.engines.get(&parsed_chain) else {
        return unknown_chain(&chain_id);
    };
    let Ok(order_id_bytes) = hex::decode(order_id.trim_start_matches("0x")) else {
        return EngineError::OrderNotFound { order_id }.into_response();
    };
    let Ok(order_id_arr): Result<[u8; 32], _> = order_id_bytes.try_into() else {
        return EngineError::OrderNotFound { order_id }.into_response();
    };
    match engine.order(&order_id_arr) {
        Ok(Some(order)) => Json(OrderStatusResponse {
            order_id: format!("0x{}", hex::encode(order.order_id)),
            state: order.state,
            user: order.user,
            solver: order.solver,
            input_token: order.input_token,
            input_amount: order.input_amount,
            output_token: order.output_token,
            output_amount: order.output_amount,
            fill_deadline: order.fill_deadline,
        })
        .into_response(),
        Ok(None) => EngineError::OrderNotFound { order_id: hex::encode(order_id_arr) }.into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub address: EvmAddress,
    pub endpoint: String,
    pub name: String,
    pub timestamp_ms: u64,
    pub signature: crate::types::EvmSignature,
}

pub async fn register_solver(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    Json(request): Json<RegisterRequest>,
) -> axum::response::Response {
    let Ok(parsed_chain) = chain_id.parse::<ChainId>() else {
        return unknown_chain(&chain_id);
    };
    let now = crate::timestamp::UnixTimestamp::try_now().map(|t| t.0 * 1000).unwrap_or(0);
    match state.registry.register(
        parsed_chain,
        request.address.0,
        request.endpoint,
        request.name,
        request.timestamp_ms,
        &request.signature.0,
        now,
    ) {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterRequest {
    pub timestamp_ms: u64,
    pub signature: crate::types::EvmSignature,
}

pub async fn unregister_solver(
    State(state): State<AppState>,
    Path((chain_id, address)): Path<(String, String)>,
    Json(request): Json<UnregisterRequest>,
) -> axum::response::Response {
    let Ok(parsed_chain) = chain_id.parse::<ChainId>() else {
        return unknown_chain(&chain_id);
    };
    let Ok(solver_address) = address.parse::<alloy_primitives::Address>() else {
        return RegistryError::NotFound(address).into_response();
    };
    let now = crate::timestamp::UnixTimestamp::try_now().map(|t| t.0 * 1000).unwrap_or(0);
    match state
        .registry
        .unregister(parsed_chain, solver_address, request.timestamp_ms, &request.signature.0, now)
    {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn list_solvers(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
) -> axum::response::Response {
    let Ok(parsed_chain) = chain_id.parse::<ChainId>() else {
        return unknown_chain(&chain_id);
    };
    match state.registry.active_for_chain(parsed_chain) {
        Ok(solvers) => Json(solvers).into_response(),
        Err(err) => err.into_response(),
    }
}

/// `GET /v1/ws`: upgrades and replays engine-emitted events. No external
/// message broker is introduced; this stands on the in-process broadcast
/// channel each [`SettlementEngine`] already exposes via `subscribe()`.
pub async fn event_stream(ws: axum::extract::WebSocketUpgrade, State(state): State<AppState>) -> axum::response::Response {
    ws.on_upgrade(move |socket| async move {
        let Some(engine) = state.engines.values().next() else {
            return;
        };
        let mut events = engine.subscribe();
        let mut socket = socket;
        use axum::extract::ws::Message;
        while let Ok(event) = events.recv().await {
            let payload = format!("{event:?}");
            if socket.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    })
}
