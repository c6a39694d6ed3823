//! Wire and domain types for FirmSwap quotes, orders, and solver records.
//!
//! Mirrors the structures used across the protocol: `Quote`, `Order`, `SolverRecord`,
//! and the regex-validated newtypes used to (de)serialize EVM primitives to/from JSON
//! in a form compatible with client SDKs (0x-prefixed hex addresses, decimal-string
//! 256-bit integers).

use alloy_primitives::{Address, U256};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use crate::chain_id::ChainId;

/// Minimum accepted order size, denominated in the output token's smallest unit.
pub const MIN_ORDER: u64 = 1_000_000;

/// Order side: which amount is fixed by the user's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    ExactInput,
    ExactOutput,
}

impl Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderType::ExactInput => "EXACT_INPUT",
            OrderType::ExactOutput => "EXACT_OUTPUT",
        };
        write!(f, "{s}")
    }
}

impl OrderType {
    /// The numeric encoding used in the EIP-712 struct hash (`uint8 orderType`).
    pub fn as_u8(&self) -> u8 {
        match self {
            OrderType::ExactInput => 0,
            OrderType::ExactOutput => 1,
        }
    }
}

/// Final order lifecycle state, stored by the [`crate::engine::order_store::OrderStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    None,
    Deposited,
    Settled,
    Refunded,
}

impl Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::None => "NONE",
            OrderState::Deposited => "DEPOSITED",
            OrderState::Settled => "SETTLED",
            OrderState::Refunded => "REFUNDED",
        };
        write!(f, "{s}")
    }
}

/// A `0x`-prefixed, 20-byte EVM address, serialized as a checksum-agnostic lowercase hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvmAddress(pub Address);

impl Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for EvmAddress {
    fn from(address: Address) -> Self {
        EvmAddress(address)
    }
}

impl From<EvmAddress> for Address {
    fn from(value: EvmAddress) -> Self {
        value.0
    }
}

impl Serialize for EvmAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:#x}", self.0))
    }
}

impl<'de> Deserialize<'de> for EvmAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        static ADDRESS_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("invalid address regex"));
        if !ADDRESS_REGEX.is_match(&s) {
            return Err(D::Error::custom("invalid EVM address format"));
        }
        let address = Address::from_str(&s).map_err(D::Error::custom)?;
        Ok(EvmAddress(address))
    }
}

/// A 256-bit unsigned integer, serialized as a decimal string to avoid precision
/// loss in JSON (which cannot represent integers beyond 2^53 exactly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DecimalU256(pub U256);

impl From<U256> for DecimalU256 {
    fn from(value: U256) -> Self {
        DecimalU256(value)
    }
}

impl From<DecimalU256> for U256 {
    fn from(value: DecimalU256) -> Self {
        value.0
    }
}

impl Display for DecimalU256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for DecimalU256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for DecimalU256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        static DECIMAL_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^[0-9]{1,78}$").expect("invalid decimal regex"));
        if !DECIMAL_REGEX.is_match(&s) {
            return Err(D::Error::custom("expected a non-negative decimal integer string"));
        }
        let value = U256::from_str(&s).map_err(D::Error::custom)?;
        Ok(DecimalU256(value))
    }
}

/// A 32-byte per-solver nonce, serialized as a 0x-prefixed 64-hex-char string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce(pub U256);

impl Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = DecimalU256::deserialize(deserializer)?;
        Ok(Nonce(value.0))
    }
}

impl Nonce {
    pub fn word_index(&self) -> U256 {
        self.0 >> 8
    }

    pub fn bit_index(&self) -> u32 {
        (self.0 & U256::from(0xffu64)).to::<u64>() as u32
    }

    pub fn from_u64(n: u64) -> Self {
        Nonce(U256::from(n))
    }
}

/// A 65-byte ECDSA signature (r, s, v), serialized as `0x`-prefixed 130-hex-char string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmSignature(pub [u8; 65]);

impl Serialize for EvmSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for EvmSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        static SIG_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{130}$").expect("invalid signature regex"));
        if !SIG_REGEX.is_match(&s) {
            return Err(D::Error::custom(
                "invalid signature format: must be 0x-prefixed and 130 hex chars",
            ));
        }
        let bytes = hex::decode(&s[2..]).map_err(D::Error::custom)?;
        let array: [u8; 65] = bytes
            .try_into()
            .map_err(|_| D::Error::custom("signature must be exactly 65 bytes"))?;
        Ok(EvmSignature(array))
    }
}

/// A signed, immutable price commitment produced by a solver. See data model §3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub solver: EvmAddress,
    pub user: EvmAddress,
    pub input_token: EvmAddress,
    pub input_amount: DecimalU256,
    pub output_token: EvmAddress,
    pub output_amount: DecimalU256,
    pub order_type: OrderType,
    pub output_chain_id: DecimalU256,
    pub deposit_deadline: u32,
    pub fill_deadline: u32,
    pub nonce: Nonce,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QuoteError {
    #[error("inputAmount must be > 0")]
    ZeroInputAmount,
    #[error("outputAmount must be > 0")]
    ZeroOutputAmount,
    #[error("outputAmount below protocol minimum of {MIN_ORDER}")]
    BelowMinimumOrder,
    #[error("fillDeadline ({fill}) must be strictly after depositDeadline ({deposit})")]
    FillDeadlineBeforeDeposit { deposit: u32, fill: u32 },
    #[error("outputChainId ({quoted}) does not match current chain ({current})")]
    WrongChain { quoted: u64, current: u64 },
}

impl Quote {
    /// Validates the field invariants from data model §3, given the chain this
    /// quote is being acted upon.
    pub fn validate(&self, current_chain: ChainId) -> Result<(), QuoteError> {
        if self.input_amount.0.is_zero() {
            return Err(QuoteError::ZeroInputAmount);
        }
        if self.output_amount.0.is_zero() {
            return Err(QuoteError::ZeroOutputAmount);
        }
        if self.output_amount.0 < U256::from(MIN_ORDER) {
            return Err(QuoteError::BelowMinimumOrder);
        }
        if self.fill_deadline <= self.deposit_deadline {
            return Err(QuoteError::FillDeadlineBeforeDeposit {
                deposit: self.deposit_deadline,
                fill: self.fill_deadline,
            });
        }
        let quoted_chain = u64::try_from(self.output_chain_id.0).map_err(|_| QuoteError::WrongChain {
            quoted: u64::MAX,
            current: current_chain.reference(),
        })?;
        if quoted_chain != current_chain.reference() {
            return Err(QuoteError::WrongChain {
                quoted: quoted_chain,
                current: current_chain.reference(),
            });
        }
        Ok(())
    }
}

/// An order record instantiated on-chain from a (quote, signature) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: [u8; 32],
    pub state: OrderState,
    pub user: EvmAddress,
    pub solver: EvmAddress,
    pub input_token: EvmAddress,
    pub input_amount: DecimalU256,
    pub output_token: EvmAddress,
    pub output_amount: DecimalU256,
    pub fill_deadline: u32,
}

/// Per-solver bond accounting record. See data model §3 and [`crate::engine::bond_ledger`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SolverRecord {
    pub total_bond: U256,
    pub reserved_bond: U256,
    pub unstake_amount: U256,
    pub unstake_unlock_time: u64,
    pub registered: bool,
}
