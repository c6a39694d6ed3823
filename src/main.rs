//! FirmSwap HTTP entrypoint.
//!
//! This binary launches an Axum-based server exposing the Aggregator and
//! SolverRegistry interface (spec §6), and, when a `solver` section is
//! present in the config, also runs the reference solver's background tasks
//! (nonce allocator, deposit watcher, filler) and its own `/quote` endpoint.
//!
//! Endpoints:
//! - `GET /health`
//! - `POST /v1/{chainId}/quote`
//! - `GET /v1/{chainId}/order/{orderId}`
//! - `POST /v1/{chainId}/solvers/register`
//! - `DELETE /v1/{chainId}/solvers/{address}`
//! - `GET /v1/{chainId}/solvers`
//! - `GET /v1/ws`
//! - `POST /quote` (reference solver only)

mod aggregator;
mod chain_id;
mod config;
mod eip712;
mod engine;
mod error;
mod handlers;
mod rate_limit;
mod registry;
mod solver;
mod timestamp;
mod types;
mod util;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use crate::aggregator::{Aggregator, AggregatorSettings};
use crate::config::{CliArgs, Config};
use crate::engine::settlement::SimulatedGateway;
use crate::engine::{OrderStore, SettlementEngine};
use crate::handlers::AppState;
use crate::rate_limit::RouteLimiter;
use crate::registry::SolverRegistry;
use crate::solver::handler::SolverState;
use crate::util::{SigDown, Telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let _telemetry = Telemetry::new();

    let args = CliArgs::parse();
    let config = Config::load(&args)?;

    let db = sled::open(&config.registry.db_path)?;
    let solvers_tree = db.open_tree("solvers")?;
    let registry = SolverRegistry::new(solvers_tree, config.registry.max_solvers_per_chain, false);

    let mut engines = HashMap::new();
    let mut verifying_contracts = HashMap::new();
    for chain_cfg in config.chains.values() {
        let orders_tree = db.open_tree(format!("orders:{}", chain_cfg.chain_id))?;
        let engine = Arc::new(SettlementEngine::new(
            chain_cfg.chain_id,
            chain_cfg.settlement_engine.0,
            chain_cfg.bond_token.0,
            OrderStore::new(orders_tree),
            SimulatedGateway::new(),
        ));
        verifying_contracts.insert(chain_cfg.chain_id, chain_cfg.settlement_engine.0);
        engines.insert(chain_cfg.chain_id, engine);
    }
    let engines = Arc::new(engines);

    let aggregator = Arc::new(Aggregator::new(
        registry.clone(),
        AggregatorSettings::from(&config.aggregator),
        verifying_contracts.clone(),
    ));

    let state = AppState { engines: engines.clone(), aggregator, registry: Arc::new(registry) };

    let sig_down = SigDown::try_new()?;

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/v1/{chainId}/quote",
            post(handlers::quote).layer(axum::middleware::from_fn_with_state(RouteLimiter::per_minute(30), rate_limit::enforce)),
        )
        .route(
            "/v1/{chainId}/order/{orderId}",
            get(handlers::order_status).layer(axum::middleware::from_fn_with_state(RouteLimiter::per_minute(60), rate_limit::enforce)),
        )
        .route(
            "/v1/{chainId}/solvers/register",
            post(handlers::register_solver).layer(axum::middleware::from_fn_with_state(RouteLimiter::per_minute(5), rate_limit::enforce)),
        )
        .route(
            "/v1/{chainId}/solvers/{address}",
            delete(handlers::unregister_solver).layer(axum::middleware::from_fn_with_state(RouteLimiter::per_minute(10), rate_limit::enforce)),
        )
        .route(
            "/v1/{chainId}/solvers",
            get(handlers::list_solvers).layer(axum::middleware::from_fn_with_state(RouteLimiter::per_minute(60), rate_limit::enforce)),
        )
        .route("/v1/ws", get(handlers::event_stream))
        .with_state(state);

    if let Some(solver_cfg) = config.solver.clone() {
        let private_key = solver_cfg.private_key.resolve()?;
        let signer = solver::QuoteSigner::from_hex(&private_key)?;
        let solver_address = signer.address();

        let rates = solver_cfg
            .price_feed
            .iter()
            .map(|(pair, entry)| {
                let (base, quote) = pair.split_once(':').unwrap_or((pair.as_str(), ""));
                ((base.to_lowercase(), quote.to_lowercase()), (entry.bid, entry.ask))
            })
            .collect();
        let adapter = solver::FeedAdapter::new(rates);

        let mut used_nonces = Vec::new();
        for engine in engines.values() {
            for n in 0..solver::nonce_allocator::NONCE_SCAN_BOUND {
                if engine.is_nonce_used(solver_address, crate::types::Nonce::from_u64(n)).await {
                    used_nonces.push(n);
                }
            }
        }
        let nonce_allocator = Arc::new(
            solver::NonceAllocator::bootstrap(|n| used_nonces.contains(&n)).await?,
        );

        let solver_state = Arc::new(SolverState {
            signer,
            nonce_allocator,
            adapter,
            pricing: solver::PricingParams {
                spread_bps: solver_cfg.spread_bps,
                usd_notional_ceiling: solver_cfg.usd_notional_ceiling,
                input_decimals: 18,
                output_decimals: 18,
            },
            min_order: alloy_primitives::U256::from(crate::types::MIN_ORDER),
            verifying_contracts,
        });
        let solver_router = Router::new()
            .route("/quote", post(solver::handler::solver_quote))
            .with_state(solver_state);
        app = app.merge(solver_router);

        for engine in engines.values().cloned() {
            let (filler, _filler_task) = solver::filler::spawn(engine.clone(), solver_address, sig_down.cancellation_token());
            let _watcher_task = solver::deposit_watcher::spawn(
                engine.subscribe(),
                solver_address.into(),
                filler,
                sig_down.cancellation_token(),
            );
        }
    }

    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers(cors::Any),
        );

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("Starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let cancellation_token = sig_down.cancellation_token();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await?;

    Ok(())
}
