use std::time::Duration;

use crate::state::AppState;
use crate::usecase::sweep::SweepSessionsUseCase;

/// Periodically deactivate and purge expired sessions. Runs until the process exits.
pub async fn run(state: AppState, every: Duration, retention: chrono::Duration) {
    let usecase = SweepSessionsUseCase {
        sessions: state.session_repo(),
        clock: state.clock(),
        retention,
    };
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = usecase.execute().await {
            tracing::warn!(error = %e, "session sweep failed");
        }
    }
}
