//! Core Rust implementation of FirmSwap, a firm-quote, bonded-solver swap
//! protocol for EVM chains.
//!
//! # Overview
//!
//! A user asks to trade one ERC-20 for another on a given chain; competing
//! solvers return fully-priced, signed commitments; the user picks one; the
//! user delivers input tokens; the solver delivers the promised output; if the
//! solver defaults, anyone can force a refund and slash the solver's bond.
//!
//! # Modules
//!
//! - [`eip712`] — Canonical quote hashing and EIP-712 signing/verification (QuoteCodec).
//! - [`types`] — Wire and domain types: quotes, orders, solver records.
//! - [`chain_id`] — CAIP-2 `eip155:<reference>` chain identifiers.
//! - [`engine`] — The on-chain settlement engine: nonces, bonds, deposit addresses, orders.
//! - [`registry`] — Off-chain, per-chain solver registry.
//! - [`aggregator`] — Multi-solver quote fan-out, validation, and ranking.
//! - [`solver`] — Reference solver: pricing, signing, nonce allocation, filling.
//! - [`handlers`] — HTTP endpoint handlers for the aggregator/registry server.
//! - [`rate_limit`] — Per-route token-bucket rate limiting.
//! - [`config`] — Runtime configuration loading.
//! - [`error`] — Subsystem error taxonomies mapped to HTTP status codes.
//! - [`timestamp`] — Unix timestamp type for deadline and signature-freshness checks.
//! - [`util`] — Graceful shutdown and telemetry setup.

pub mod aggregator;
pub mod chain_id;
pub mod config;
pub mod eip712;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod registry;
pub mod solver;
pub mod timestamp;
pub mod types;
pub mod util;
