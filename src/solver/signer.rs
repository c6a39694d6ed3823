//! Signing core (spec §4.9): wraps computed amounts in a quote and produces an
//! EIP-712 signature over it with the solver's private key.

use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

use crate::chain_id::ChainId;
use crate::eip712;
use crate::types::{EvmSignature, Quote};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

pub struct QuoteSigner {
    signer: PrivateKeySigner,
}

impl QuoteSigner {
    pub fn from_hex(private_key_hex: &str) -> Result<Self, SignerError> {
        let signer: PrivateKeySigner = private_key_hex
            .parse()
            .map_err(|e: alloy_signer_local::LocalSignerError| SignerError::InvalidKey(e.to_string()))?;
        Ok(QuoteSigner { signer })
    }

    pub fn address(&self) -> alloy_primitives::Address {
        self.signer.address()
    }

    pub fn sign(&self, quote: &Quote, chain_id: ChainId, verifying_contract: alloy_primitives::Address) -> Result<EvmSignature, SignerError> {
        let digest = eip712::signing_hash(quote, chain_id, verifying_contract);
        let signature = self
            .signer
            .sign_hash_sync(&digest)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;
        Ok(EvmSignature(signature.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecimalU256, EvmAddress, Nonce, OrderType};
    use alloy_primitives::{address, U256};
    use alloy_signer_local::PrivateKeySigner as LocalSigner;

    #[test]
    fn signs_and_recovers_to_the_signer_address() {
        let key_signer = LocalSigner::random();
        let hex_key = hex::encode(key_signer.to_bytes());
        let signer = QuoteSigner::from_hex(&hex_key).unwrap();
        assert_eq!(signer.address(), key_signer.address());

        let quote = Quote {
            solver: EvmAddress(signer.address()),
            user: EvmAddress(address!("0x1111111111111111111111111111111111111111")),
            input_token: EvmAddress(address!("0x2222222222222222222222222222222222222222")),
            input_amount: DecimalU256(U256::from(1u64)),
            output_token: EvmAddress(address!("0x3333333333333333333333333333333333333333")),
            output_amount: DecimalU256(U256::from(1_000_000u64)),
            order_type: OrderType::ExactOutput,
            output_chain_id: DecimalU256(U256::from(8453u64)),
            deposit_deadline: 1000,
            fill_deadline: 2000,
            nonce: Nonce::from_u64(0),
        };
        let verifying_contract = address!("0x4444444444444444444444444444444444444444");
        let chain_id = ChainId::new(8453);
        let sig = signer.sign(&quote, chain_id, verifying_contract).unwrap();
        eip712::verify_quote_signature(&quote, &sig, chain_id, verifying_contract).unwrap();
    }
}
