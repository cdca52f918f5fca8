//! Periodic eviction of transfers that stopped making progress.

use crate::session::{Session, SessionState, SessionStore, TransferId};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    pub period: Duration,
    pub stale_after: Duration,
    /// Paused transfers count as stalled too; `false` keeps them around.
    pub include_paused: bool,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            stale_after: Duration::from_secs(5 * 60),
            include_paused: true,
        }
    }
}

pub fn is_stuck(session: &Session, now: Instant, cfg: &ReaperConfig) -> bool {
    match session.state {
        SessionState::Fetching | SessionState::Completing | SessionState::Failed => return false,
        SessionState::Paused if !cfg.include_paused => return false,
        SessionState::Paused | SessionState::Downloading => {}
    }
    let Some(started_at) = session.started_at else {
        return false;
    };
    session.progress() < 1.0
        && now.saturating_duration_since(started_at) > cfg.stale_after
        && session.download_rate_bps == 0
        && session.peer_count == 0
}

pub fn find_stuck(store: &SessionStore, now: Instant, cfg: &ReaperConfig) -> Vec<TransferId> {
    store
        .list()
        .into_iter()
        .filter(|s| is_stuck(s, now, cfg))
        .map(|s| s.id)
        .collect()
}
