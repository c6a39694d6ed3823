//! SettlementEngine (spec §4.6): the on-chain protocol core, modeled as an
//! in-process, testable state machine. Token balances, proxy sweeps, and event
//! emission are plain data behind the [`OnchainGateway`] seam; a real `alloy`
//! contract binding would implement that trait in place of [`SimulatedGateway`]
//! when a live chain is available.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use tokio::sync::{broadcast, Mutex};

use crate::chain_id::ChainId;
use crate::eip712;
use crate::engine::bond_ledger::{reserve_amount, BondLedger};
use crate::engine::deposit_address;
use crate::engine::nonce_bitmap::NonceBitmap;
use crate::engine::order_store::OrderStore;
use crate::error::EngineError;
use crate::types::{DecimalU256, EvmAddress, EvmSignature, Order, OrderState, Quote};

/// Abstracts token movement and proxy deployment away from the state machine so
/// the same logic runs against an in-memory simulation in tests and, behind a
/// different implementation, a real chain via `alloy`.
pub trait OnchainGateway: Send + Sync {
    fn balance_of(&self, token: Address, holder: Address) -> U256;

    /// Pulls up to `amount` of `token` from `from` to `to`. Returns the amount
    /// actually received by `to` (balance-difference accounting, tolerating
    /// fee-on-transfer tokens).
    fn transfer(&mut self, token: Address, from: Address, to: Address, amount: U256) -> U256;

    /// Deploys (idempotently) the sweep proxy at `deposit_address` and sweeps its
    /// entire balance of `token` to `to`. Returns the amount swept.
    fn sweep(&mut self, token: Address, deposit_address: Address, to: Address) -> U256;
}

/// In-memory gateway used by tests and by any deployment that has not wired a
/// live `alloy` provider. Balances are seeded directly by callers.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    balances: HashMap<(Address, Address), U256>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, token: Address, holder: Address, amount: U256) {
        *self.balances.entry((token, holder)).or_insert(U256::ZERO) += amount;
    }
}

impl OnchainGateway for SimulatedGateway {
    fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances.get(&(token, holder)).copied().unwrap_or(U256::ZERO)
    }

    fn transfer(&mut self, token: Address, from: Address, to: Address, amount: U256) -> U256 {
        let available = self.balance_of(token, from);
        let moved = amount.min(available);
        *self.balances.entry((token, from)).or_insert(U256::ZERO) -= moved;
        *self.balances.entry((token, to)).or_insert(U256::ZERO) += moved;
        moved
    }

    fn sweep(&mut self, token: Address, deposit_address: Address, to: Address) -> U256 {
        let amount = self.balance_of(token, deposit_address);
        self.transfer(token, deposit_address, to, amount)
    }
}

/// Domain events mirroring the on-chain log the real contract would emit.
#[derive(Debug, Clone)]
pub enum Event {
    Deposited { order: Order },
    Settled { order_id: [u8; 32], user: EvmAddress, solver: EvmAddress },
    Refunded { order_id: [u8; 32], user: EvmAddress, input_amount: U256, bond_slashed: U256 },
    TokensRecovered { order_id: [u8; 32], token: EvmAddress, amount: U256 },
    ExcessDeposit { user: EvmAddress, token: EvmAddress, amount: U256 },
    ExcessWithdrawn { user: EvmAddress, token: EvmAddress, amount: U256 },
    SolverRegistered { solver: EvmAddress, amount: U256 },
    SolverBondAdded { solver: EvmAddress, amount: U256 },
    ResolvedOrderOpened { order_id: [u8; 32] },
}

struct Inner<G: OnchainGateway> {
    nonces: NonceBitmap,
    bonds: BondLedger,
    excess: HashMap<(EvmAddress, EvmAddress), U256>,
    gateway: G,
}

/// One instance per chain id, modeling a single deployed contract instance.
/// Non-reentrancy and per-call-chain serialization are realized by the guarding
/// `tokio::sync::Mutex`: only one entry point runs at a time per engine.
pub struct SettlementEngine<G: OnchainGateway> {
    pub chain_id: ChainId,
    pub engine_address: Address,
    pub bond_token: Address,
    orders: OrderStore,
    inner: Mutex<Inner<G>>,
    events: broadcast::Sender<Event>,
}

const MAX_TOLERANCE_BPS: u64 = 10_000;

impl<G: OnchainGateway> SettlementEngine<G> {
    pub fn new(chain_id: ChainId, engine_address: Address, bond_token: Address, orders: OrderStore, gateway: G) -> Self {
        let (events, _) = broadcast::channel(1024);
        SettlementEngine {
            chain_id,
            engine_address,
            bond_token,
            orders,
            inner: Mutex::new(Inner {
                nonces: NonceBitmap::new(),
                bonds: BondLedger::new(),
                excess: HashMap::new(),
                gateway,
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn validate_quote_common(
        &self,
        quote: &Quote,
        sig: &EvmSignature,
        now: u32,
    ) -> Result<(), EngineError> {
        quote.validate(self.chain_id)?;
        eip712::verify_quote_signature(quote, sig, self.chain_id, self.engine_address)?;
        Ok(())
    }

    fn compute_order_id(&self, quote: &Quote, sig: &EvmSignature) -> [u8; 32] {
        let quote_hash = eip712::struct_hash(quote);
        eip712::order_id(quote_hash, sig)
    }

    fn order_from_quote(&self, order_id: [u8; 32], quote: &Quote, state: OrderState) -> Order {
        Order {
            order_id,
            state,
            user: quote.user,
            solver: quote.solver,
            input_token: quote.input_token,
            input_amount: quote.input_amount,
            output_token: quote.output_token,
            output_amount: quote.output_amount,
            fill_deadline: quote.fill_deadline,
        }
    }

    /// **deposit(quote, sig)** — contract deposit path.
    #[tracing::instrument(skip_all, err, fields(solver = %quote.solver))]
    pub async fn deposit(&self, quote: &Quote, sig: &EvmSignature, caller: Address, now: u32) -> Result<Order, EngineError> {
        self.validate_quote_common(quote, sig, now)?;
        if now > quote.deposit_deadline {
            return Err(EngineError::DepositDeadlineExpired);
        }
        let order_id = self.compute_order_id(quote, sig);
        if self.orders.get(&order_id)?.is_some() {
            return Err(EngineError::OrderAlreadyExists { order_id: hex::encode(order_id) });
        }

        let mut inner = self.inner.lock().await;
        if !inner.bonds.get(quote.solver).is_some_and(|r| r.registered) {
            return Err(EngineError::SolverNotRegistered { solver: quote.solver.to_string() });
        }
        inner.nonces.mark_used(quote.solver, quote.nonce).map_err(|_| EngineError::NonceReplayed)?;
        inner
            .bonds
            .reserve(quote.solver, quote.output_amount.0)
            .map_err(|e| EngineError::InsufficientBond {
                solver: quote.solver.to_string(),
                needed: reserve_amount(quote.output_amount.0).to_string(),
                available: format!("{e}"),
            })?;

        let received = inner.gateway.transfer(quote.input_token.0, caller, self.engine_address, quote.input_amount.0);
        let mut order = self.order_from_quote(order_id, quote, OrderState::Deposited);
        order.input_amount = DecimalU256(received);
        self.orders.create(&order)?;
        drop(inner);

        self.emit(Event::Deposited { order });
        self.emit(Event::ResolvedOrderOpened { order_id });
        Ok(order)
    }

    /// **depositWithPermit2(quote, sig, ...)** — token pull is routed through a
    /// Permit2 signature-transfer instead of a standard `transferFrom`; the
    /// gateway models both the same way since the permit's validity is assumed
    /// checked upstream by the caller-supplied signature.
    pub async fn deposit_with_permit2(&self, quote: &Quote, sig: &EvmSignature, caller: Address, now: u32) -> Result<Order, EngineError> {
        self.deposit(quote, sig, caller, now).await
    }

    /// **fill(orderId)** — contract deposit settlement.
    #[tracing::instrument(skip_all, err)]
    pub async fn fill(&self, order_id: [u8; 32], caller: Address, now: u32) -> Result<Order, EngineError> {
        let order = self.orders.get(&order_id)?.ok_or_else(|| EngineError::OrderNotFound { order_id: hex::encode(order_id) })?;
        if order.state != OrderState::Deposited {
            return Err(EngineError::WrongOrderState { order_id: hex::encode(order_id), actual: order.state, expected: OrderState::Deposited });
        }
        if caller != order.solver.0 {
            return Err(EngineError::Unauthorized);
        }
        if now > order.fill_deadline {
            return Err(EngineError::FillDeadlineExpired);
        }

        let updated = self.orders.transition(&order_id, OrderState::Deposited, OrderState::Settled)?;
        let mut inner = self.inner.lock().await;
        inner.bonds.release(order.solver, order.output_amount.0)?;
        inner.gateway.transfer(order.output_token.0, order.solver.0, order.user.0, order.output_amount.0);
        inner.gateway.transfer(order.input_token.0, self.engine_address, order.solver.0, order.input_amount.0);
        drop(inner);

        self.emit(Event::Settled { order_id, user: order.user, solver: order.solver });
        Ok(updated)
    }

    /// **settle(quote, sig)** — address-deposit atomic settlement.
    pub async fn settle(&self, quote: &Quote, sig: &EvmSignature, caller: Address, now: u32) -> Result<Order, EngineError> {
        self.settle_with_tolerance(quote, sig, quote.input_amount.0, caller, now).await
    }

    /// **settleWithTolerance(quote, sig, acceptedInputAmount)**.
    #[tracing::instrument(skip_all, err)]
    pub async fn settle_with_tolerance(
        &self,
        quote: &Quote,
        sig: &EvmSignature,
        accepted_input_amount: U256,
        caller: Address,
        now: u32,
    ) -> Result<Order, EngineError> {
        self.validate_quote_common(quote, sig, now)?;
        if now > quote.deposit_deadline {
            return Err(EngineError::DepositDeadlineExpired);
        }
        if accepted_input_amount.is_zero() || accepted_input_amount > quote.input_amount.0 {
            return Err(EngineError::ToleranceTooLarge);
        }

        let order_id = self.compute_order_id(quote, sig);
        if self.orders.get(&order_id)?.is_some() {
            return Err(EngineError::OrderAlreadyExists { order_id: hex::encode(order_id) });
        }
        let deposit_addr = deposit_address::compute(self.engine_address, order_id);

        let mut inner = self.inner.lock().await;
        let deposited = inner.gateway.balance_of(quote.input_token.0, deposit_addr);
        if deposited < accepted_input_amount {
            return Err(EngineError::DepositAmountMismatch);
        }
        if !inner.bonds.get(quote.solver).is_some_and(|r| r.registered) {
            return Err(EngineError::SolverNotRegistered { solver: quote.solver.to_string() });
        }
        inner.nonces.mark_used(quote.solver, quote.nonce).map_err(|_| EngineError::NonceReplayed)?;
        inner.bonds.check_reserve(quote.solver, quote.output_amount.0)?;

        let order = self.order_from_quote(order_id, quote, OrderState::Settled);
        self.orders.create(&order)?;

        let swept = inner.gateway.sweep(quote.input_token.0, deposit_addr, self.engine_address);
        let to_solver = swept.min(quote.input_amount.0);
        inner.gateway.transfer(quote.output_token.0, caller, quote.user.0, quote.output_amount.0);
        inner.gateway.transfer(quote.input_token.0, self.engine_address, quote.solver.0, to_solver);
        let excess = swept.saturating_sub(to_solver);
        if excess > U256::ZERO {
            let key = (quote.user, quote.input_token);
            *inner.excess.entry(key).or_insert(U256::ZERO) += excess;
        }
        drop(inner);

        self.emit(Event::Settled { order_id, user: quote.user, solver: quote.solver });
        if excess > U256::ZERO {
            self.emit(Event::ExcessDeposit { user: quote.user, token: quote.input_token, amount: excess });
        }
        Ok(order)
    }

    /// **refund(orderId)** — contract deposit default path.
    #[tracing::instrument(skip_all, err)]
    pub async fn refund(&self, order_id: [u8; 32], now: u32) -> Result<Order, EngineError> {
        let order = self.orders.get(&order_id)?.ok_or_else(|| EngineError::OrderNotFound { order_id: hex::encode(order_id) })?;
        if order.state != OrderState::Deposited {
            return Err(EngineError::WrongOrderState { order_id: hex::encode(order_id), actual: order.state, expected: OrderState::Deposited });
        }
        if now <= order.fill_deadline {
            return Err(EngineError::FillDeadlineNotYetExpired);
        }

        let mut inner = self.inner.lock().await;
        let slashed = inner.bonds.slash(order.solver, order.output_amount.0)?;
        let updated = self.orders.transition(&order_id, OrderState::Deposited, OrderState::Refunded)?;
        inner.gateway.transfer(order.input_token.0, self.engine_address, order.user.0, order.input_amount.0);
        if slashed > U256::ZERO {
            inner.gateway.transfer(self.bond_token, self.engine_address, order.user.0, slashed);
        }
        drop(inner);

        self.emit(Event::Refunded { order_id, user: order.user, input_amount: order.input_amount.0, bond_slashed: slashed });
        Ok(updated)
    }

    /// **refundAddressDeposit(quote, sig)** — address-deposit default path.
    #[tracing::instrument(skip_all, err)]
    pub async fn refund_address_deposit(&self, quote: &Quote, sig: &EvmSignature, now: u32) -> Result<Order, EngineError> {
        // Deposit-deadline freshness does not apply to the default path: by
        // construction this is only reachable after fillDeadline has passed.
        quote.validate(self.chain_id)?;
        eip712::verify_quote_signature(quote, sig, self.chain_id, self.engine_address)?;

        let order_id = self.compute_order_id(quote, sig);
        if self.orders.get(&order_id)?.is_some() {
            return Err(EngineError::OrderAlreadyExists { order_id: hex::encode(order_id) });
        }
        if now <= quote.fill_deadline {
            return Err(EngineError::FillDeadlineNotYetExpired);
        }
        let deposit_addr = deposit_address::compute(self.engine_address, order_id);

        let mut inner = self.inner.lock().await;
        let deposited = inner.gateway.balance_of(quote.input_token.0, deposit_addr);
        if deposited.is_zero() {
            return Err(EngineError::DepositAmountMismatch);
        }
        inner.nonces.mark_used(quote.solver, quote.nonce).map_err(|_| EngineError::NonceReplayed)?;

        let slashed = if deposited >= quote.input_amount.0 {
            inner.bonds.slash(quote.solver, quote.output_amount.0).unwrap_or(U256::ZERO)
        } else {
            U256::ZERO
        };

        let order = self.order_from_quote(order_id, quote, OrderState::Refunded);
        self.orders.create(&order)?;
        let swept = inner.gateway.sweep(quote.input_token.0, deposit_addr, quote.user.0);
        drop(inner);

        self.emit(Event::Refunded { order_id, user: quote.user, input_amount: swept, bond_slashed: slashed });
        Ok(order)
    }

    /// **recoverFromProxy(quote, sig, token)** — sweeps a stray token from a
    /// settled/refunded order's proxy. No bond effect.
    pub async fn recover_from_proxy(&self, quote: &Quote, sig: &EvmSignature, token: Address) -> Result<U256, EngineError> {
        let order_id = self.compute_order_id(quote, sig);
        let order = self.orders.get(&order_id)?.ok_or_else(|| EngineError::OrderNotFound { order_id: hex::encode(order_id) })?;
        if order.state == OrderState::Deposited || order.state == OrderState::None {
            return Err(EngineError::WrongOrderState { order_id: hex::encode(order_id), actual: order.state, expected: OrderState::Settled });
        }
        let deposit_addr = deposit_address::compute(self.engine_address, order_id);
        let mut inner = self.inner.lock().await;
        let swept = inner.gateway.sweep(token, deposit_addr, order.user.0);
        drop(inner);
        self.emit(Event::TokensRecovered { order_id, token: EvmAddress(token), amount: swept });
        Ok(swept)
    }

    /// **deployAndRecover(quote, sig, token)** — wrong-token-deposited recovery path.
    pub async fn deploy_and_recover(&self, quote: &Quote, sig: &EvmSignature, token: Address, now: u32) -> Result<Order, EngineError> {
        if token == quote.input_token.0 {
            return Err(EngineError::InvalidQuote("recovery token must differ from quote.inputToken"));
        }
        eip712::verify_quote_signature(quote, sig, self.chain_id, self.engine_address)?;
        let order_id = self.compute_order_id(quote, sig);
        if self.orders.get(&order_id)?.is_some() {
            return Err(EngineError::OrderAlreadyExists { order_id: hex::encode(order_id) });
        }
        if now <= quote.fill_deadline {
            return Err(EngineError::FillDeadlineNotYetExpired);
        }
        let deposit_addr = deposit_address::compute(self.engine_address, order_id);

        let mut inner = self.inner.lock().await;
        inner.nonces.mark_used(quote.solver, quote.nonce).map_err(|_| EngineError::NonceReplayed)?;
        let order = self.order_from_quote(order_id, quote, OrderState::Refunded);
        self.orders.create(&order)?;
        let swept = inner.gateway.sweep(token, deposit_addr, quote.user.0);
        drop(inner);

        self.emit(Event::TokensRecovered { order_id, token: EvmAddress(token), amount: swept });
        Ok(order)
    }

    /// **withdrawExcess(token)** for `user`.
    pub async fn withdraw_excess(&self, user: Address, token: Address) -> Result<U256, EngineError> {
        let key = (EvmAddress(user), EvmAddress(token));
        let mut inner = self.inner.lock().await;
        let amount = inner.excess.get(&key).copied().unwrap_or(U256::ZERO);
        if amount.is_zero() {
            return Err(EngineError::NoExcessBalance);
        }
        inner.excess.insert(key, U256::ZERO);
        inner.gateway.transfer(token, self.engine_address, user, amount);
        drop(inner);
        self.emit(Event::ExcessWithdrawn { user: EvmAddress(user), token: EvmAddress(token), amount });
        Ok(amount)
    }

    pub async fn excess_balance(&self, user: Address, token: Address) -> U256 {
        let inner = self.inner.lock().await;
        inner.excess.get(&(EvmAddress(user), EvmAddress(token))).copied().unwrap_or(U256::ZERO)
    }

    // --- Solver-management entry points ---

    pub async fn register_solver(&self, solver: Address, amount: U256) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        inner.bonds.register(EvmAddress(solver), amount).map_err(|e| EngineError::InsufficientBond {
            solver: EvmAddress(solver).to_string(),
            needed: amount.to_string(),
            available: e.to_string(),
        })?;
        drop(inner);
        self.emit(Event::SolverRegistered { solver: EvmAddress(solver), amount });
        Ok(())
    }

    pub async fn add_bond(&self, solver: Address, amount: U256) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        inner.bonds.add(EvmAddress(solver), amount).map_err(|e| EngineError::InsufficientBond {
            solver: EvmAddress(solver).to_string(),
            needed: amount.to_string(),
            available: e.to_string(),
        })?;
        drop(inner);
        self.emit(Event::SolverBondAdded { solver: EvmAddress(solver), amount });
        Ok(())
    }

    pub async fn request_unstake(&self, solver: Address, amount: U256, now: u64) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        inner.bonds.request_unstake(EvmAddress(solver), amount, now).map_err(|e| EngineError::InsufficientBond {
            solver: EvmAddress(solver).to_string(),
            needed: amount.to_string(),
            available: e.to_string(),
        })
    }

    pub async fn cancel_unstake(&self, solver: Address) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        inner.bonds.cancel_unstake(EvmAddress(solver)).map_err(|_| EngineError::NoUnstakePending)
    }

    pub async fn execute_unstake(&self, solver: Address, now: u64) -> Result<U256, EngineError> {
        let mut inner = self.inner.lock().await;
        let amount = inner.bonds.execute_unstake(EvmAddress(solver), now).map_err(|e| match e {
            crate::engine::bond_ledger::BondError::UnstakeNotReady => EngineError::UnstakeLockNotElapsed,
            _ => EngineError::NoUnstakePending,
        })?;
        inner.gateway.transfer(self.bond_token, self.engine_address, solver, amount);
        Ok(amount)
    }

    pub async fn cancel_nonce(&self, solver: Address, nonce: crate::types::Nonce) {
        let mut inner = self.inner.lock().await;
        inner.nonces.mark_many(EvmAddress(solver), nonce.word_index(), U256::from(1u64) << nonce.bit_index());
    }

    pub async fn cancel_nonces(&self, solver: Address, word_index: U256, mask: U256) {
        let mut inner = self.inner.lock().await;
        inner.nonces.mark_many(EvmAddress(solver), word_index, mask);
    }

    // --- Read views ---

    pub fn order(&self, order_id: &[u8; 32]) -> Result<Option<Order>, EngineError> {
        self.orders.get(order_id)
    }

    pub async fn solver(&self, solver: Address) -> Option<crate::types::SolverRecord> {
        self.inner.lock().await.bonds.get(EvmAddress(solver))
    }

    pub async fn is_nonce_used(&self, solver: Address, nonce: crate::types::Nonce) -> bool {
        self.inner.lock().await.nonces.is_used(EvmAddress(solver), nonce)
    }

    pub async fn available_bond(&self, solver: Address) -> U256 {
        self.inner.lock().await.bonds.available(EvmAddress(solver))
    }

    pub fn compute_deposit_address(&self, quote: &Quote, sig: &EvmSignature) -> Address {
        let order_id = self.compute_order_id(quote, sig);
        deposit_address::compute(self.engine_address, order_id)
    }

    /// Test/bootstrap hook: seed a token balance directly, bypassing any
    /// transfer semantics. Not part of the on-chain surface.
    pub async fn seed_balance(&self, token: Address, holder: Address, amount: U256)
    where
        G: SeedableGateway,
    {
        self.inner.lock().await.gateway.credit(token, holder, amount);
    }
}

/// Narrow extension letting tests seed balances without widening the general
/// [`OnchainGateway`] trait with a test-only method.
pub trait SeedableGateway: OnchainGateway {
    fn credit(&mut self, token: Address, holder: Address, amount: U256);
}

impl SeedableGateway for SimulatedGateway {
    fn credit(&mut self, token: Address, holder: Address, amount: U256) {
        SimulatedGateway::credit(self, token, holder, amount);
    }
}
