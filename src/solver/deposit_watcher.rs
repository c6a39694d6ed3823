//! Deposit watcher (spec §4.9): observes the engine's deposited-event stream and
//! enqueues a fill job for every order targeting this solver whose fill
//! deadline has not yet passed.
//!
//! The real engine would be polled via RPC logs between the last-seen and
//! current block; here the in-process [`crate::engine::settlement::Event`]
//! broadcast channel stands in for that log, per the engine's §4.6 design note.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::engine::settlement::Event;
use crate::solver::filler::{FillJob, FillerHandle};
use crate::types::EvmAddress;

pub fn spawn(
    mut events: broadcast::Receiver<Event>,
    solver_address: EvmAddress,
    filler: FillerHandle,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(Event::Deposited { order }) if order.solver == solver_address => {
                    let now = crate::timestamp::UnixTimestamp::try_now().map(|t| t.0 as u32).unwrap_or(0);
                    if order.fill_deadline > now {
                        filler.enqueue(FillJob { order_id: order.order_id, fill_deadline: order.fill_deadline });
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "deposit watcher lagged behind the event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_id::ChainId;
    use crate::engine::{OrderStore, SimulatedGateway};
    use alloy_primitives::address;

    #[tokio::test]
    async fn ignores_deposits_for_other_solvers() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let orders = OrderStore::new(db.open_tree("orders").unwrap());
        let engine = std::sync::Arc::new(crate::engine::SettlementEngine::new(
            ChainId::new(8453),
            address!("0x9999999999999999999999999999999999999999"),
            address!("0x8888888888888888888888888888888888888888"),
            orders,
            SimulatedGateway::new(),
        ));
        let (filler, filler_task) = crate::solver::filler::spawn(
            engine.clone(),
            address!("0x1010101010101010101010101010101010101010"),
            CancellationToken::new(),
        );
        let shutdown = CancellationToken::new();
        let watcher = spawn(
            engine.subscribe(),
            EvmAddress(address!("0x1010101010101010101010101010101010101010")),
            filler,
            shutdown.clone(),
        );
        shutdown.cancel();
        watcher.await.unwrap();
        filler_task.abort();
    }
}
