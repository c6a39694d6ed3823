//! Filler (spec §4.9): a strictly serial fill queue. At most one in-flight fill
//! transaction per solver address, because concurrent submissions from the same
//! EOA would contend for the same on-chain nonce.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::settlement::OnchainGateway;
use crate::engine::SettlementEngine;

#[derive(Debug, Clone, Copy)]
pub struct FillJob {
    pub order_id: [u8; 32],
    pub fill_deadline: u32,
}

/// Handle for enqueueing fill jobs; the queue itself runs on a dedicated task.
#[derive(Clone)]
pub struct FillerHandle {
    sender: mpsc::UnboundedSender<FillJob>,
}

impl FillerHandle {
    pub fn enqueue(&self, job: FillJob) {
        // The receiving task only ever shuts down alongside the process, via
        // `shutdown`'s cancellation; a closed channel here means shutdown is
        // already underway, so a dropped job is not a correctness issue.
        let _ = self.sender.send(job);
    }
}

/// Spawns the serial filler task for `solver_address` against `engine`.
/// Returns a handle to enqueue jobs; the task itself exits when `shutdown` is
/// cancelled and the queue drains.
pub fn spawn<G: OnchainGateway + 'static>(
    engine: std::sync::Arc<SettlementEngine<G>>,
    solver_address: alloy_primitives::Address,
    shutdown: CancellationToken,
) -> (FillerHandle, tokio::task::JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<FillJob>();

    let task = tokio::spawn(async move {
        loop {
            let job = tokio::select! {
                _ = shutdown.cancelled() => break,
                job = receiver.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let now = crate::timestamp::UnixTimestamp::try_now()
                .map(|t| t.0 as u32)
                .unwrap_or(job.fill_deadline);
            if now > job.fill_deadline {
                tracing::warn!(order_id = %hex::encode(job.order_id), "dropping fill job past deadline");
                continue;
            }
            match engine.fill(job.order_id, solver_address, now).await {
                Ok(_) => tracing::info!(order_id = %hex::encode(job.order_id), "fill submitted"),
                Err(error) => tracing::warn!(order_id = %hex::encode(job.order_id), %error, "fill failed"),
            }
        }
    });

    (FillerHandle { sender }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_id::ChainId;
    use crate::eip712;
    use crate::engine::{OrderStore, SimulatedGateway};
    use crate::engine::settlement::SeedableGateway;
    use crate::types::{DecimalU256, EvmAddress, EvmSignature, Nonce, OrderType, Quote};
    use alloy_primitives::{address, U256};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    #[tokio::test]
    async fn queued_fill_settles_the_order() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let orders = OrderStore::new(db.open_tree("orders").unwrap());
        let mut gateway = SimulatedGateway::new();

        let signer = PrivateKeySigner::random();
        let engine_address = address!("0x9999999999999999999999999999999999999999");
        let user = address!("0x1111111111111111111111111111111111111111");
        let input_token = address!("0x2222222222222222222222222222222222222222");
        let output_token = address!("0x3333333333333333333333333333333333333333");

        gateway.credit(output_token, signer.address(), U256::from(1_000_000_000u64));

        let engine = std::sync::Arc::new(SettlementEngine::new(
            ChainId::new(8453),
            engine_address,
            address!("0x8888888888888888888888888888888888888888"),
            orders,
            gateway,
        ));
        engine.register_solver(signer.address(), U256::from(crate::engine::bond_ledger::MIN_BOND)).await.unwrap();

        let quote = Quote {
            solver: EvmAddress(signer.address()),
            user: EvmAddress(user),
            input_token: EvmAddress(input_token),
            input_amount: DecimalU256(U256::from(1_148_000_000_000_000_000u128)),
            output_token: EvmAddress(output_token),
            output_amount: DecimalU256(U256::from(200_000_000u64)),
            order_type: OrderType::ExactOutput,
            output_chain_id: DecimalU256(U256::from(8453u64)),
            deposit_deadline: 1_000,
            fill_deadline: 2_000,
            nonce: Nonce::from_u64(0),
        };
        let digest = eip712::signing_hash(&quote, ChainId::new(8453), engine_address);
        let signature = EvmSignature(signer.sign_hash_sync(&digest).unwrap().as_bytes());

        engine.deposit(&quote, &signature, user, 500).await.unwrap();
        let order_id = eip712::order_id(eip712::struct_hash(&quote), &signature);

        let shutdown = CancellationToken::new();
        let (handle, task) = spawn(engine.clone(), signer.address(), shutdown.clone());
        handle.enqueue(FillJob { order_id, fill_deadline: quote.fill_deadline });

        // Give the serial task a chance to process the single queued job.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        task.await.unwrap();

        let order = engine.order(&order_id).unwrap().unwrap();
        assert_eq!(order.state, crate::types::OrderState::Settled);
    }
}
