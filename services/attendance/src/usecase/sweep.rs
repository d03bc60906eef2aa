use chrono::Duration;

use crate::domain::repository::{Clock, QrSessionRepository};
use crate::error::AttendanceServiceError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deactivated: u64,
    pub purged: u64,
}

/// Housekeeping for expired sessions. Scans are never judged by `active` alone, so
/// this only keeps the table tidy.
pub struct SweepSessionsUseCase<Q, C>
where
    Q: QrSessionRepository,
    C: Clock,
{
    pub sessions: Q,
    pub clock: C,
    /// How long expired sessions (and their scans) are kept before deletion.
    pub retention: Duration,
}

impl<Q, C> SweepSessionsUseCase<Q, C>
where
    Q: QrSessionRepository,
    C: Clock,
{
    pub async fn execute(&self) -> Result<SweepReport, AttendanceServiceError> {
        let now = self.clock.now();
        let deactivated = self.sessions.deactivate_expired(now).await?;
        let purged = self
            .sessions
            .purge_expired_before(now - self.retention)
            .await?;

        if deactivated > 0 || purged > 0 {
            tracing::info!(deactivated, purged, "expired sessions swept");
        }
        Ok(SweepReport {
            deactivated,
            purged,
        })
    }
}
