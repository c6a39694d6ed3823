//! CAIP-2 chain identifiers, restricted to the `eip155` (EVM) namespace.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// An `eip155:<reference>` chain identifier, e.g. `eip155:8453` for Base mainnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(u64);

impl ChainId {
    pub fn new(reference: u64) -> Self {
        ChainId(reference)
    }

    pub fn reference(&self) -> u64 {
        self.0
    }

    pub const NAMESPACE: &'static str = "eip155";
}

#[derive(Debug, thiserror::Error)]
pub enum ChainIdError {
    #[error("chain id must be of the form eip155:<reference>, got {0:?}")]
    Malformed(String),
    #[error("unsupported chain namespace {0:?}, only eip155 is supported")]
    UnsupportedNamespace(String),
    #[error("chain reference {0:?} is not a valid u64")]
    InvalidReference(String),
}

impl FromStr for ChainId {
    type Err = ChainIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| ChainIdError::Malformed(s.to_string()))?;
        if namespace != Self::NAMESPACE {
            return Err(ChainIdError::UnsupportedNamespace(namespace.to_string()));
        }
        let reference = reference
            .parse::<u64>()
            .map_err(|_| ChainIdError::InvalidReference(reference.to_string()))?;
        Ok(ChainId(reference))
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", Self::NAMESPACE, self.0)
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChainId::from_str(&s).map_err(D::Error::custom)
    }
}

impl From<u64> for ChainId {
    fn from(reference: u64) -> Self {
        ChainId(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_eip155_chain_id() {
        let chain_id: ChainId = "eip155:8453".parse().unwrap();
        assert_eq!(chain_id.reference(), 8453);
        assert_eq!(chain_id.to_string(), "eip155:8453");
    }

    #[test]
    fn rejects_other_namespaces() {
        let err = "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp"
            .parse::<ChainId>()
            .unwrap_err();
        assert!(matches!(err, ChainIdError::UnsupportedNamespace(_)));
    }

    #[test]
    fn rejects_malformed() {
        assert!("not-a-chain-id".parse::<ChainId>().is_err());
        assert!("eip155:not-a-number".parse::<ChainId>().is_err());
    }
}
