use crate::{
    collectors::Orchestrator,
    subsystem::Subsystem,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

/// Spawns one ticker per registered subsystem. Every due tick starts a
/// cycle in the background, so a slow cycle makes the next tick hit the
/// subsystem's guard instead of delaying it. The tickers end when `cancel`
/// fires.
pub fn spawn(orchestrator: &Arc<Orchestrator>, interval: Duration, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
    orchestrator
        .subsystems()
        .into_iter()
        .map(|subsystem| tokio::spawn(run(orchestrator.clone(), subsystem, interval, cancel.clone())))
        .collect()
}

async fn run(orchestrator: Arc<Orchestrator>, subsystem: Subsystem, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(instance = orchestrator.instance(), %subsystem, ?interval, "collection scheduled");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if !orchestrator.is_due(subsystem) {
            debug!(
                instance = orchestrator.instance(),
                %subsystem,
                failures = orchestrator.consecutive_failures(subsystem),
                "backing off"
            );
            continue;
        }
        orchestrator.trigger(subsystem);
    }
    debug!(instance = orchestrator.instance(), %subsystem, "collection unscheduled");
}
