//! NonceBitmap (spec §4.2): per-solver 256-bit-per-word replay-protection bitmap.

use std::collections::HashMap;

use alloy_primitives::U256;

use crate::types::{EvmAddress, Nonce};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NonceError {
    #[error("nonce already used")]
    AlreadyUsed,
}

/// In-memory per-solver bitmap. Word index is 248-bit in principle (nonces are
/// 256-bit); in practice a `U256` word index comfortably indexes any real nonce
/// stream, so it is used directly as the map key.
#[derive(Debug, Default)]
pub struct NonceBitmap {
    words: HashMap<(EvmAddress, U256), U256>,
}

impl NonceBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_used(&self, solver: EvmAddress, nonce: Nonce) -> bool {
        let word = self
            .words
            .get(&(solver, nonce.word_index()))
            .copied()
            .unwrap_or(U256::ZERO);
        (word >> nonce.bit_index()) & U256::from(1u64) == U256::from(1u64)
    }

    /// Sets the bit for `nonce`. Fails if already set (spec: used nonces never
    /// return to unused, and re-use is always rejected).
    pub fn mark_used(&mut self, solver: EvmAddress, nonce: Nonce) -> Result<(), NonceError> {
        if self.is_used(solver, nonce) {
            return Err(NonceError::AlreadyUsed);
        }
        let key = (solver, nonce.word_index());
        let word = self.words.entry(key).or_insert(U256::ZERO);
        *word |= U256::from(1u64) << nonce.bit_index();
        Ok(())
    }

    /// Batch-cancel: OR-in an arbitrary 256-bit mask for a given word index.
    pub fn mark_many(&mut self, solver: EvmAddress, word_index: U256, mask: U256) {
        let word = self.words.entry((solver, word_index)).or_insert(U256::ZERO);
        *word |= mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn solver() -> EvmAddress {
        EvmAddress(address!("0x0101010101010101010101010101010101010101"))
    }

    #[test]
    fn unused_nonce_reads_false() {
        let bitmap = NonceBitmap::new();
        assert!(!bitmap.is_used(solver(), Nonce::from_u64(0)));
    }

    #[test]
    fn marking_used_is_observable() {
        let mut bitmap = NonceBitmap::new();
        bitmap.mark_used(solver(), Nonce::from_u64(42)).unwrap();
        assert!(bitmap.is_used(solver(), Nonce::from_u64(42)));
        assert!(!bitmap.is_used(solver(), Nonce::from_u64(41)));
    }

    #[test]
    fn replay_is_rejected() {
        let mut bitmap = NonceBitmap::new();
        bitmap.mark_used(solver(), Nonce::from_u64(7)).unwrap();
        let err = bitmap.mark_used(solver(), Nonce::from_u64(7)).unwrap_err();
        assert_eq!(err, NonceError::AlreadyUsed);
    }

    #[test]
    fn word_boundary_nonces_are_independent() {
        let mut bitmap = NonceBitmap::new();
        bitmap.mark_used(solver(), Nonce::from_u64(255)).unwrap();
        assert!(bitmap.is_used(solver(), Nonce::from_u64(255)));
        assert!(!bitmap.is_used(solver(), Nonce::from_u64(256)));
    }

    #[test]
    fn mark_many_cancels_a_batch() {
        let mut bitmap = NonceBitmap::new();
        bitmap.mark_many(solver(), U256::ZERO, U256::from(0b1011u64));
        assert!(bitmap.is_used(solver(), Nonce::from_u64(0)));
        assert!(bitmap.is_used(solver(), Nonce::from_u64(1)));
        assert!(!bitmap.is_used(solver(), Nonce::from_u64(2)));
        assert!(bitmap.is_used(solver(), Nonce::from_u64(3)));
    }
}
