//! OrderStore (spec §4.5): orderId → order record, backed by a `sled::Tree` so
//! reads survive process restart without replaying chain history.

use crate::error::EngineError;
use crate::types::{Order, OrderState};

#[derive(Clone)]
pub struct OrderStore {
    tree: sled::Tree,
}

impl OrderStore {
    pub fn new(tree: sled::Tree) -> Self {
        OrderStore { tree }
    }

    fn key(order_id: &[u8; 32]) -> &[u8] {
        order_id
    }

    pub fn get(&self, order_id: &[u8; 32]) -> Result<Option<Order>, EngineError> {
        match self.tree.get(Self::key(order_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Inserts a brand-new order record. Fails if any record already exists for
    /// this orderId, regardless of its state.
    pub fn create(&self, order: &Order) -> Result<(), EngineError> {
        let encoded = serde_json::to_vec(order)?;
        let result = self
            .tree
            .compare_and_swap(Self::key(&order.order_id), None::<&[u8]>, Some(encoded))?;
        if result.is_err() {
            return Err(EngineError::OrderAlreadyExists {
                order_id: hex::encode(order.order_id),
            });
        }
        Ok(())
    }

    /// Transitions the stored order's state, failing if the current state does
    /// not match `expected_from`. Returns the updated order.
    pub fn transition(
        &self,
        order_id: &[u8; 32],
        expected_from: OrderState,
        to: OrderState,
    ) -> Result<Order, EngineError> {
        let current = self.get(order_id)?.ok_or_else(|| EngineError::OrderNotFound {
            order_id: hex::encode(order_id),
        })?;
        if current.state != expected_from {
            return Err(EngineError::WrongOrderState {
                order_id: hex::encode(order_id),
                actual: current.state,
                expected: expected_from,
            });
        }
        let mut updated = current;
        updated.state = to;
        self.put(&updated)?;
        Ok(updated)
    }

    /// Overwrites the stored record for `order.order_id`. Used internally by
    /// `transition` and by entry points that mutate fields alongside state
    /// (e.g. recording the actually-received input amount).
    pub fn put(&self, order: &Order) -> Result<(), EngineError> {
        let encoded = serde_json::to_vec(order)?;
        self.tree.insert(Self::key(&order.order_id), encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecimalU256, EvmAddress};
    use alloy_primitives::{address, U256};

    fn sample_order(order_id: [u8; 32], state: OrderState) -> Order {
        Order {
            order_id,
            state,
            user: EvmAddress(address!("0x1111111111111111111111111111111111111111")),
            solver: EvmAddress(address!("0x2222222222222222222222222222222222222222")),
            input_token: EvmAddress(address!("0x3333333333333333333333333333333333333333")),
            input_amount: DecimalU256(U256::from(100u64)),
            output_token: EvmAddress(address!("0x4444444444444444444444444444444444444444")),
            output_amount: DecimalU256(U256::from(200u64)),
            fill_deadline: 1_700_000_000,
        }
    }

    fn store() -> OrderStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        OrderStore::new(db.open_tree("orders").unwrap())
    }

    #[test]
    fn get_on_empty_store_is_none() {
        let store = store();
        assert!(store.get(&[0u8; 32]).unwrap().is_none());
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = store();
        let order = sample_order([1u8; 32], OrderState::Deposited);
        store.create(&order).unwrap();
        let fetched = store.get(&[1u8; 32]).unwrap().unwrap();
        assert_eq!(fetched.state, OrderState::Deposited);
    }

    #[test]
    fn create_rejects_duplicate_order_id() {
        let store = store();
        let order = sample_order([2u8; 32], OrderState::Deposited);
        store.create(&order).unwrap();
        let err = store.create(&order).unwrap_err();
        assert!(matches!(err, EngineError::OrderAlreadyExists { .. }));
    }

    #[test]
    fn transition_enforces_expected_from_state() {
        let store = store();
        let order = sample_order([3u8; 32], OrderState::Deposited);
        store.create(&order).unwrap();
        store
            .transition(&[3u8; 32], OrderState::Deposited, OrderState::Settled)
            .unwrap();
        let err = store
            .transition(&[3u8; 32], OrderState::Deposited, OrderState::Refunded)
            .unwrap_err();
        assert!(matches!(err, EngineError::WrongOrderState { .. }));
    }

    #[test]
    fn transition_on_missing_order_is_not_found() {
        let store = store();
        let err = store
            .transition(&[9u8; 32], OrderState::Deposited, OrderState::Settled)
            .unwrap_err();
        assert!(matches!(err, EngineError::OrderNotFound { .. }));
    }
}
