//! QuoteCodec (spec §4.1): canonical EIP-712 struct hash and signing digest for a [`Quote`].
//!
//! The codec must produce byte-identical digests to whatever on-chain settlement engine
//! this off-chain implementation talks to, so the struct layout below is pinned to the
//! literal type string quoted in the specification and must not be reordered.

use alloy_primitives::{Address, B256, U256};
use alloy_signer::Signature;
use alloy_sol_types::{SolStruct, eip712_domain, sol};

use crate::chain_id::ChainId;
use crate::types::Quote;

sol! {
    /// Solidity-compatible struct mirroring the on-chain `FirmSwapQuote` type.
    struct FirmSwapQuote {
        address solver;
        address user;
        address inputToken;
        uint256 inputAmount;
        address outputToken;
        uint256 outputAmount;
        uint8 orderType;
        uint256 outputChainId;
        uint32 depositDeadline;
        uint32 fillDeadline;
        uint256 nonce;
    }
}

impl From<&Quote> for FirmSwapQuote {
    fn from(quote: &Quote) -> Self {
        FirmSwapQuote {
            solver: quote.solver.0,
            user: quote.user.0,
            inputToken: quote.input_token.0,
            inputAmount: quote.input_amount.0,
            outputToken: quote.output_token.0,
            outputAmount: quote.output_amount.0,
            orderType: quote.order_type.as_u8(),
            outputChainId: quote.output_chain_id.0,
            depositDeadline: quote.deposit_deadline,
            fillDeadline: quote.fill_deadline,
            nonce: quote.nonce.0,
        }
    }
}

/// Builds the `{name:"FirmSwap", version:"1", chainId, verifyingContract}` EIP-712 domain.
pub fn domain(chain_id: ChainId, verifying_contract: Address) -> alloy_sol_types::Eip712Domain {
    eip712_domain! {
        name: "FirmSwap",
        version: "1",
        chain_id: chain_id.reference(),
        verifying_contract: verifying_contract,
    }
}

/// The quote's EIP-712 struct hash, independent of any domain (used as the quote's
/// off-chain identifier per data model §3).
pub fn struct_hash(quote: &Quote) -> B256 {
    let sol_quote: FirmSwapQuote = quote.into();
    sol_quote.eip712_hash_struct()
}

/// `keccak256(0x1901 ‖ domainSeparator ‖ structHash)`, the digest a solver signs
/// and a verifier recovers against.
pub fn signing_hash(
    quote: &Quote,
    chain_id: ChainId,
    verifying_contract: Address,
) -> B256 {
    let sol_quote: FirmSwapQuote = quote.into();
    let domain = domain(chain_id, verifying_contract);
    sol_quote.eip712_signing_hash(&domain)
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("signature does not recover to the claimed solver address")]
    Mismatch,
}

/// Recovers the signer of `quote`'s EIP-712 digest and checks it matches `quote.solver`.
pub fn verify_quote_signature(
    quote: &Quote,
    signature: &crate::types::EvmSignature,
    chain_id: ChainId,
    verifying_contract: Address,
) -> Result<(), SignatureError> {
    let digest = signing_hash(quote, chain_id, verifying_contract);
    let sig = Signature::from_raw_array(&signature.0)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    let recovered = sig
        .recover_address_from_prehash(&digest)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    if recovered != quote.solver.0 {
        return Err(SignatureError::Mismatch);
    }
    Ok(())
}

/// `orderId = keccak256(encode(quoteHash, keccak256(solverSignature)))` (data model §3).
pub fn order_id(quote_hash: B256, signature: &crate::types::EvmSignature) -> [u8; 32] {
    use alloy_primitives::keccak256;
    let sig_hash = keccak256(signature.0);
    let mut buf = [0u8; 64];
    buf[0..32].copy_from_slice(quote_hash.as_slice());
    buf[32..64].copy_from_slice(sig_hash.as_slice());
    keccak256(buf).0
}

/// Computes the deterministic CREATE2-style sweep-proxy address for address-deposit mode
/// (spec §4.4): the last 20 bytes of `keccak256(0xff ‖ engine ‖ salt ‖ codeHash)`.
pub fn deposit_address(engine: Address, salt: [u8; 32], code_hash: B256) -> Address {
    use alloy_primitives::keccak256;
    let mut buf = Vec::with_capacity(1 + 20 + 32 + 32);
    buf.push(0xff);
    buf.extend_from_slice(engine.as_slice());
    buf.extend_from_slice(&salt);
    buf.extend_from_slice(code_hash.as_slice());
    let hash = keccak256(buf);
    Address::from_slice(&hash[12..32])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecimalU256, EvmAddress, Nonce, OrderType};
    use alloy_primitives::address;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    fn sample_quote(solver: Address) -> Quote {
        Quote {
            solver: EvmAddress(solver),
            user: EvmAddress(address!("0x1111111111111111111111111111111111111111")),
            input_token: EvmAddress(address!("0x2222222222222222222222222222222222222222")),
            input_amount: DecimalU256(U256::from(1148u64) * U256::from(10u64).pow(U256::from(18))),
            output_token: EvmAddress(address!("0x3333333333333333333333333333333333333333")),
            output_amount: DecimalU256(U256::from(200_000_000u64)),
            order_type: OrderType::ExactOutput,
            output_chain_id: DecimalU256(U256::from(8453u64)),
            deposit_deadline: 1_700_000_300,
            fill_deadline: 1_700_000_420,
            nonce: Nonce::from_u64(0),
        }
    }

    #[test]
    fn struct_hash_is_deterministic() {
        let signer = PrivateKeySigner::random();
        let quote = sample_quote(signer.address());
        let h1 = struct_hash(&quote);
        let h2 = struct_hash(&quote);
        assert_eq!(h1, h2);
    }

    #[test]
    fn signature_round_trips() {
        let signer = PrivateKeySigner::random();
        let quote = sample_quote(signer.address());
        let verifying_contract = address!("0x4444444444444444444444444444444444444444");
        let chain_id = ChainId::new(8453);
        let digest = signing_hash(&quote, chain_id, verifying_contract);
        let signature = signer.sign_hash_sync(&digest).unwrap();
        let wire_sig = crate::types::EvmSignature(signature.as_bytes());
        verify_quote_signature(&quote, &wire_sig, chain_id, verifying_contract).unwrap();
    }

    #[test]
    fn signature_rejects_wrong_signer() {
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let quote = sample_quote(signer.address());
        let verifying_contract = address!("0x4444444444444444444444444444444444444444");
        let chain_id = ChainId::new(8453);
        let digest = signing_hash(&quote, chain_id, verifying_contract);
        let signature = other.sign_hash_sync(&digest).unwrap();
        let wire_sig = crate::types::EvmSignature(signature.as_bytes());
        let err = verify_quote_signature(&quote, &wire_sig, chain_id, verifying_contract).unwrap_err();
        assert!(matches!(err, SignatureError::Mismatch));
    }

    #[test]
    fn order_id_is_deterministic_function_of_inputs() {
        let quote_hash = B256::repeat_byte(7);
        let sig = crate::types::EvmSignature([9u8; 65]);
        assert_eq!(order_id(quote_hash, &sig), order_id(quote_hash, &sig));
    }
}
