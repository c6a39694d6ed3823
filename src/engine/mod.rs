//! The on-chain settlement engine (spec §4.2–§4.6): nonce replay protection, bond
//! accounting, deposit-address derivation, order persistence, and the entry-point
//! state machine that composes them.

pub mod bond_ledger;
pub mod deposit_address;
pub mod nonce_bitmap;
pub mod order_store;
pub mod settlement;

pub use bond_ledger::{BondError, BondLedger};
pub use nonce_bitmap::{NonceBitmap, NonceError};
pub use order_store::OrderStore;
pub use settlement::{Event, OnchainGateway, SettlementEngine, SimulatedGateway};
