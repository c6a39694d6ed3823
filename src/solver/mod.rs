//! Reference solver (spec §4.9): pricing, signing, nonce assignment, deposit
//! monitoring, and a strictly serial filler.

pub mod deposit_watcher;
pub mod filler;
pub mod handler;
pub mod nonce_allocator;
pub mod pricing;
pub mod signer;

pub use nonce_allocator::NonceAllocator;
pub use pricing::{price, price_usd_hint, ExchangeAdapter, FeedAdapter, PricingError, PricingParams};
pub use signer::QuoteSigner;
