//! DepositAddress (spec §4.4): deterministic CREATE2-style address derivation for
//! address-deposit mode.

use alloy_primitives::{Address, B256};

/// `keccak256(sweepProxyInitCode ‖ abi.encode(engine))`, a fixed constant for a
/// given engine deployment. The sweep proxy's only capability is: on a call from
/// the engine, transfer its entire balance of a given ERC-20 to a destination.
///
/// There is no live deployment behind this process, so the hash is derived once
/// from the (simulated) proxy bytecode constant rather than read from a deployed
/// contract's creation code, mirroring the way the engine's creation-code hash
/// would be exposed for independent re-derivation per the design notes.
pub fn proxy_code_hash(engine: Address) -> B256 {
    use alloy_primitives::keccak256;
    const SWEEP_PROXY_INIT_CODE: &[u8] = b"firmswap-sweep-proxy-v1";
    let mut buf = Vec::with_capacity(SWEEP_PROXY_INIT_CODE.len() + 20);
    buf.extend_from_slice(SWEEP_PROXY_INIT_CODE);
    buf.extend_from_slice(engine.as_slice());
    keccak256(buf)
}

/// The deposit address for a given order, using the orderId as the CREATE2 salt.
pub fn compute(engine: Address, order_id: [u8; 32]) -> Address {
    let code_hash = proxy_code_hash(engine);
    crate::eip712::deposit_address(engine, order_id, code_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn deposit_address_is_deterministic() {
        let engine = address!("0x5555555555555555555555555555555555555555");
        let order_id = [1u8; 32];
        assert_eq!(compute(engine, order_id), compute(engine, order_id));
    }

    #[test]
    fn different_orders_get_different_addresses() {
        let engine = address!("0x5555555555555555555555555555555555555555");
        assert_ne!(compute(engine, [1u8; 32]), compute(engine, [2u8; 32]));
    }
}
