//! Aggregator (spec §4.8): multi-solver fan-out, response validation, signature
//! verification, and best-price ranking.

use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::chain_id::ChainId;
use crate::eip712;
use crate::error::AggregatorError;
use crate::registry::SolverRegistry;
use crate::types::{DecimalU256, EvmAddress, EvmSignature, OrderType, Quote};

const MAX_FAN_OUT: usize = 16;
const DEFAULT_DEPOSIT_WINDOW_SECS: u32 = 300;
const DEFAULT_FILL_WINDOW_SECS: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositMode {
    Contract,
    Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub input_token: EvmAddress,
    pub output_token: EvmAddress,
    pub order_type: OrderType,
    pub amount: DecimalU256,
    pub user_address: EvmAddress,
    pub origin_chain_id: ChainId,
    pub destination_chain_id: ChainId,
    #[serde(default)]
    pub deposit_window: Option<u32>,
    pub deposit_mode: DepositMode,
}

/// Request shape sent to each solver's `{endpoint}/quote`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolverQuoteRequest {
    input_token: EvmAddress,
    output_token: EvmAddress,
    order_type: OrderType,
    amount: DecimalU256,
    user_address: EvmAddress,
    chain_id: ChainId,
    deposit_deadline: u32,
    fill_deadline: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolverQuoteResponse {
    quote: Quote,
    signature: EvmSignature,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeQuote {
    pub quote: Quote,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedQuote {
    pub quote: Quote,
    pub solver_signature: EvmSignature,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_address: Option<EvmAddress>,
    pub alternative_quotes: Vec<AlternativeQuote>,
}

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub solicit_timeout: Duration,
    pub max_quotes_returned: usize,
}

impl From<&crate::config::AggregatorConfig> for AggregatorSettings {
    fn from(cfg: &crate::config::AggregatorConfig) -> Self {
        AggregatorSettings {
            solicit_timeout: Duration::from_millis(cfg.solicit_timeout_ms),
            max_quotes_returned: cfg.max_quotes_returned,
        }
    }
}

struct VerifiedQuote {
    quote: Quote,
    signature: EvmSignature,
}

pub struct Aggregator {
    registry: SolverRegistry,
    http: reqwest::Client,
    settings: AggregatorSettings,
    /// `chainId -> (verifying contract / engine address)`. A quote's signature
    /// is rejected unless its chain is present here.
    verifying_contracts: std::collections::HashMap<ChainId, Address>,
}

impl Aggregator {
    pub fn new(
        registry: SolverRegistry,
        settings: AggregatorSettings,
        verifying_contracts: std::collections::HashMap<ChainId, Address>,
    ) -> Self {
        Aggregator {
            registry,
            http: reqwest::Client::new(),
            settings,
            verifying_contracts,
        }
    }

    #[tracing::instrument(skip_all, err, fields(chain = %request.origin_chain_id))]
    pub async fn quote(&self, request: QuoteRequest, now: u32) -> Result<AggregatedQuote, AggregatorError> {
        let verifying_contract = *self
            .verifying_contracts
            .get(&request.origin_chain_id)
            .ok_or_else(|| AggregatorError::UnknownChain(request.origin_chain_id.to_string()))?;

        let mut solvers = self.registry.active_for_chain(request.origin_chain_id)?;
        if solvers.is_empty() {
            return Err(AggregatorError::NoQuotes);
        }
        solvers.truncate(MAX_FAN_OUT);

        let deposit_deadline = now + request.deposit_window.unwrap_or(DEFAULT_DEPOSIT_WINDOW_SECS);
        let fill_deadline = deposit_deadline + DEFAULT_FILL_WINDOW_SECS;

        let solver_request = SolverQuoteRequest {
            input_token: request.input_token,
            output_token: request.output_token,
            order_type: request.order_type,
            amount: request.amount,
            user_address: request.user_address,
            chain_id: request.origin_chain_id,
            deposit_deadline,
            fill_deadline,
        };

        let dispatched = solvers.into_iter().map(|solver| {
            let client = self.http.clone();
            let body = solver_request.clone();
            let timeout = self.settings.solicit_timeout;
            let endpoint = solver.endpoint.clone();
            async move { solicit_one(&client, &endpoint, &body, timeout).await }
        });
        let responses = futures_util::future::join_all(dispatched).await;

        let now_u32 = now;
        let mut verified = Vec::new();
        for response in responses.into_iter().flatten() {
            if response.quote.user != request.user_address {
                tracing::warn!("solver quote rejected: user mismatch");
                continue;
            }
            if response.quote.input_token != request.input_token || response.quote.output_token != request.output_token {
                tracing::warn!("solver quote rejected: token mismatch");
                continue;
            }
            if response.quote.deposit_deadline <= now_u32 {
                tracing::warn!("solver quote rejected: deposit deadline already passed");
                continue;
            }
            if response.quote.input_amount.0.is_zero() || response.quote.output_amount.0.is_zero() {
                tracing::warn!("solver quote rejected: zero amount");
                continue;
            }
            if eip712::verify_quote_signature(&response.quote, &response.signature, request.origin_chain_id, verifying_contract).is_err() {
                tracing::warn!("solver quote rejected: bad signature");
                continue;
            }
            verified.push(VerifiedQuote { quote: response.quote, signature: response.signature });
        }

        if verified.is_empty() {
            return Err(AggregatorError::NoQuotes);
        }

        rank(&mut verified, request.order_type);
        verified.truncate(self.settings.max_quotes_returned.max(1));

        let best = verified.remove(0);
        let deposit_address = if request.deposit_mode == DepositMode::Address {
            Some(EvmAddress(crate::engine::deposit_address::compute(
                verifying_contract,
                eip712::order_id(eip712::struct_hash(&best.quote), &best.signature),
            )))
        } else {
            None
        };

        Ok(AggregatedQuote {
            quote: best.quote,
            solver_signature: best.signature,
            deposit_address,
            alternative_quotes: verified.into_iter().map(|v| AlternativeQuote { quote: v.quote }).collect(),
        })
    }
}

/// Ranking (spec §4.8 step 7): EXACT_INPUT favors higher outputAmount;
/// EXACT_OUTPUT favors lower inputAmount. Ties keep arrival order (stable sort).
fn rank(quotes: &mut [VerifiedQuote], order_type: OrderType) {
    match order_type {
        OrderType::ExactInput => {
            quotes.sort_by(|a, b| b.quote.output_amount.0.cmp(&a.quote.output_amount.0));
        }
        OrderType::ExactOutput => {
            quotes.sort_by(|a, b| a.quote.input_amount.0.cmp(&b.quote.input_amount.0));
        }
    }
}

async fn solicit_one(
    client: &reqwest::Client,
    endpoint: &str,
    body: &SolverQuoteRequest,
    timeout: Duration,
) -> Option<SolverQuoteResponse> {
    crate::registry::validate_endpoint(endpoint, false).ok()?;
    let url = format!("{}/quote", endpoint.trim_end_matches('/'));
    let result = tokio::time::timeout(timeout, client.post(&url).json(body).send()).await;
    let response = match result {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            tracing::warn!(endpoint, error = %e, "solver request failed");
            return None;
        }
        Err(_) => {
            tracing::warn!(endpoint, "solver request timed out");
            return None;
        }
    };
    match response.json::<SolverQuoteResponse>().await {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(endpoint, error = %e, "solver response malformed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, U256};

    fn quote_with(output: u64, input: u64) -> Quote {
        Quote {
            solver: EvmAddress(address!("0x1111111111111111111111111111111111111111")),
            user: EvmAddress(address!("0x2222222222222222222222222222222222222222")),
            input_token: EvmAddress(address!("0x3333333333333333333333333333333333333333")),
            input_amount: DecimalU256(U256::from(input)),
            output_token: EvmAddress(address!("0x4444444444444444444444444444444444444444")),
            output_amount: DecimalU256(U256::from(output)),
            order_type: OrderType::ExactOutput,
            output_chain_id: DecimalU256(U256::from(8453u64)),
            deposit_deadline: 1000,
            fill_deadline: 2000,
            nonce: crate::types::Nonce::from_u64(0),
        }
    }

    fn verified(output: u64, input: u64) -> VerifiedQuote {
        VerifiedQuote { quote: quote_with(output, input), signature: EvmSignature([0u8; 65]) }
    }

    #[test]
    fn exact_output_ranks_by_ascending_input() {
        let mut quotes = vec![verified(200, 1200), verified(200, 1100), verified(200, 1300)];
        rank(&mut quotes, OrderType::ExactOutput);
        assert_eq!(quotes[0].quote.input_amount.0, U256::from(1100u64));
        assert_eq!(quotes[2].quote.input_amount.0, U256::from(1300u64));
    }

    #[test]
    fn exact_input_ranks_by_descending_output() {
        let mut quotes = vec![verified(200, 1000), verified(250, 1000), verified(150, 1000)];
        rank(&mut quotes, OrderType::ExactInput);
        assert_eq!(quotes[0].quote.output_amount.0, U256::from(250u64));
        assert_eq!(quotes[2].quote.output_amount.0, U256::from(150u64));
    }

    #[test]
    fn ties_preserve_arrival_order() {
        let mut quotes = vec![verified(200, 1000), verified(200, 1000)];
        let first_solver_marker = quotes[0].quote.nonce;
        rank(&mut quotes, OrderType::ExactOutput);
        assert_eq!(quotes[0].quote.nonce, first_solver_marker);
    }
}
