//! BondLedger (spec §4.3): per-solver (total, reserved) bond accounting, the 5%
//! per-order reservation rule, and timelocked unstake.

use std::collections::HashMap;

use alloy_primitives::U256;

use crate::types::{EvmAddress, SolverRecord};

pub const RESERVATION_BPS: u64 = 500;
pub const MIN_BOND: u64 = 1_000_000_000;
pub const UNSTAKE_DELAY_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BondError {
    #[error("solver already registered")]
    AlreadyRegistered,
    #[error("solver not registered")]
    NotRegistered,
    #[error("bond amount {0} is below the minimum of {MIN_BOND}")]
    BelowMinimumBond(U256),
    #[error("insufficient unreserved bond: needs {needed}, has {available}")]
    InsufficientBond { needed: U256, available: U256 },
    #[error("an unstake request is already pending")]
    PendingUnstakeExists,
    #[error("no unstake request is pending")]
    NoPendingUnstake,
    #[error("unstake lock has not yet elapsed")]
    UnstakeNotReady,
}

/// `outputAmount × RESERVATION_BPS / 10_000`, the bond held against a single order.
pub fn reserve_amount(output_amount: U256) -> U256 {
    output_amount * U256::from(RESERVATION_BPS) / U256::from(10_000u64)
}

#[derive(Debug, Default)]
pub struct BondLedger {
    solvers: HashMap<EvmAddress, SolverRecord>,
}

impl BondLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, solver: EvmAddress) -> Option<SolverRecord> {
        self.solvers.get(&solver).copied()
    }

    pub fn register(&mut self, solver: EvmAddress, amount: U256) -> Result<(), BondError> {
        if self.solvers.get(&solver).is_some_and(|r| r.registered) {
            return Err(BondError::AlreadyRegistered);
        }
        if amount < U256::from(MIN_BOND) {
            return Err(BondError::BelowMinimumBond(amount));
        }
        self.solvers.insert(
            solver,
            SolverRecord {
                total_bond: amount,
                reserved_bond: U256::ZERO,
                unstake_amount: U256::ZERO,
                unstake_unlock_time: 0,
                registered: true,
            },
        );
        Ok(())
    }

    pub fn add(&mut self, solver: EvmAddress, amount: U256) -> Result<(), BondError> {
        let record = self.solvers.get_mut(&solver).ok_or(BondError::NotRegistered)?;
        if !record.registered {
            return Err(BondError::NotRegistered);
        }
        record.total_bond += amount;
        Ok(())
    }

    fn record(&self, solver: EvmAddress) -> Result<&SolverRecord, BondError> {
        self.solvers.get(&solver).filter(|r| r.registered).ok_or(BondError::NotRegistered)
    }

    pub fn available(&self, solver: EvmAddress) -> U256 {
        match self.solvers.get(&solver) {
            Some(r) => r.total_bond - r.reserved_bond,
            None => U256::ZERO,
        }
    }

    pub fn check_reserve(&self, solver: EvmAddress, output_amount: U256) -> Result<(), BondError> {
        let record = self.record(solver)?;
        let needed = reserve_amount(output_amount);
        let available = record.total_bond - record.reserved_bond;
        if available < needed {
            return Err(BondError::InsufficientBond { needed, available });
        }
        Ok(())
    }

    pub fn reserve(&mut self, solver: EvmAddress, output_amount: U256) -> Result<(), BondError> {
        self.check_reserve(solver, output_amount)?;
        let needed = reserve_amount(output_amount);
        let record = self.solvers.get_mut(&solver).expect("checked above");
        record.reserved_bond += needed;
        Ok(())
    }

    /// Releases a previously-reserved amount, e.g. after a successful fill.
    pub fn release(&mut self, solver: EvmAddress, output_amount: U256) -> Result<(), BondError> {
        let record = self.solvers.get_mut(&solver).ok_or(BondError::NotRegistered)?;
        let amount = reserve_amount(output_amount);
        record.reserved_bond = record.reserved_bond.saturating_sub(amount);
        Ok(())
    }

    /// Slashes up to `reserve(outputAmount)`, never more than `totalBond`, and
    /// returns the amount actually slashed.
    pub fn slash(&mut self, solver: EvmAddress, output_amount: U256) -> Result<U256, BondError> {
        let record = self.solvers.get_mut(&solver).ok_or(BondError::NotRegistered)?;
        let wanted = reserve_amount(output_amount);
        let slashed = wanted.min(record.total_bond);
        record.total_bond -= slashed;
        record.reserved_bond = record.reserved_bond.saturating_sub(slashed);
        Ok(slashed)
    }

    pub fn request_unstake(&mut self, solver: EvmAddress, amount: U256, now: u64) -> Result<(), BondError> {
        let record = self.solvers.get_mut(&solver).ok_or(BondError::NotRegistered)?;
        if record.unstake_amount != U256::ZERO {
            return Err(BondError::PendingUnstakeExists);
        }
        let available = record.total_bond - record.reserved_bond;
        if available < amount {
            return Err(BondError::InsufficientBond { needed: amount, available });
        }
        if record.total_bond - amount < U256::from(MIN_BOND) {
            return Err(BondError::BelowMinimumBond(record.total_bond - amount));
        }
        record.unstake_amount = amount;
        record.unstake_unlock_time = now + UNSTAKE_DELAY_SECS;
        Ok(())
    }

    pub fn cancel_unstake(&mut self, solver: EvmAddress) -> Result<(), BondError> {
        let record = self.solvers.get_mut(&solver).ok_or(BondError::NotRegistered)?;
        if record.unstake_amount == U256::ZERO {
            return Err(BondError::NoPendingUnstake);
        }
        record.unstake_amount = U256::ZERO;
        record.unstake_unlock_time = 0;
        Ok(())
    }

    /// Returns the amount transferred out.
    pub fn execute_unstake(&mut self, solver: EvmAddress, now: u64) -> Result<U256, BondError> {
        let record = self.solvers.get_mut(&solver).ok_or(BondError::NotRegistered)?;
        if record.unstake_amount == U256::ZERO {
            return Err(BondError::NoPendingUnstake);
        }
        if now < record.unstake_unlock_time {
            return Err(BondError::UnstakeNotReady);
        }
        let amount = record.unstake_amount;
        record.total_bond -= amount;
        record.unstake_amount = U256::ZERO;
        record.unstake_unlock_time = 0;
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn solver() -> EvmAddress {
        EvmAddress(address!("0x0202020202020202020202020202020202020202"))
    }

    #[test]
    fn reserve_amount_is_five_percent() {
        assert_eq!(reserve_amount(U256::from(200_000_000u64)), U256::from(10_000_000u64));
    }

    #[test]
    fn register_then_reserve_then_release() {
        let mut ledger = BondLedger::new();
        ledger.register(solver(), U256::from(2_000_000_000u64)).unwrap();
        ledger.reserve(solver(), U256::from(200_000_000u64)).unwrap();
        assert_eq!(ledger.get(solver()).unwrap().reserved_bond, U256::from(10_000_000u64));
        ledger.release(solver(), U256::from(200_000_000u64)).unwrap();
        assert_eq!(ledger.get(solver()).unwrap().reserved_bond, U256::ZERO);
    }

    #[test]
    fn reservation_never_exceeds_total() {
        let mut ledger = BondLedger::new();
        ledger.register(solver(), U256::from(MIN_BOND)).unwrap();
        let err = ledger
            .reserve(solver(), U256::from(MIN_BOND) * U256::from(1000u64))
            .unwrap_err();
        assert!(matches!(err, BondError::InsufficientBond { .. }));
        assert!(ledger.get(solver()).unwrap().reserved_bond <= ledger.get(solver()).unwrap().total_bond);
    }

    #[test]
    fn slash_caps_at_total_bond() {
        let mut ledger = BondLedger::new();
        ledger.register(solver(), U256::from(MIN_BOND)).unwrap();
        let slashed = ledger.slash(solver(), U256::from(u64::MAX)).unwrap();
        assert_eq!(slashed, U256::from(MIN_BOND));
        assert_eq!(ledger.get(solver()).unwrap().total_bond, U256::ZERO);
    }

    #[test]
    fn below_minimum_bond_is_rejected_register() {
        let mut ledger = BondLedger::new();
        let err = ledger.register(solver(), U256::from(1u64)).unwrap_err();
        assert!(matches!(err, BondError::BelowMinimumBond(_)));
    }

    #[test]
    fn unstake_lifecycle() {
        let mut ledger = BondLedger::new();
        ledger.register(solver(), U256::from(MIN_BOND) * U256::from(2u64)).unwrap();
        ledger.request_unstake(solver(), U256::from(MIN_BOND), 1_000).unwrap();
        assert!(matches!(
            ledger.execute_unstake(solver(), 1_000).unwrap_err(),
            BondError::UnstakeNotReady
        ));
        let amount = ledger
            .execute_unstake(solver(), 1_000 + UNSTAKE_DELAY_SECS)
            .unwrap();
        assert_eq!(amount, U256::from(MIN_BOND));
        assert_eq!(ledger.get(solver()).unwrap().total_bond, U256::from(MIN_BOND));
    }

    #[test]
    fn double_unstake_request_rejected() {
        let mut ledger = BondLedger::new();
        ledger.register(solver(), U256::from(MIN_BOND) * U256::from(3u64)).unwrap();
        ledger.request_unstake(solver(), U256::from(MIN_BOND), 0).unwrap();
        let err = ledger.request_unstake(solver(), U256::from(MIN_BOND), 0).unwrap_err();
        assert!(matches!(err, BondError::PendingUnstakeExists));
    }
}
