//! Periodic expiry of abandoned pending subscriptions

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// Run one sweep over both ledgers. Errors are logged, never propagated.
pub async fn sweep_once(state: &AppState, ttl: Duration) -> usize {
    let mut swept = 0;

    match state.agent_subscriptions.expire_abandoned(ttl).await {
        Ok(rows) => swept += rows.len(),
        Err(e) => tracing::warn!(error = %e, "Agent subscription sweep failed"),
    }
    match state.team_subscriptions.expire_abandoned(ttl).await {
        Ok(rows) => swept += rows.len(),
        Err(e) => tracing::warn!(error = %e, "Team subscription sweep failed"),
    }

    swept
}

/// Sweep every `interval` until the runtime shuts down
pub fn spawn(state: AppState, ttl: Duration, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let swept = sweep_once(&state, ttl).await;
            tracing::debug!(swept, "Pending sweep finished");
        }
    })
}
