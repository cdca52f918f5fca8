//! Aggregate status, one-shot notices and the throttled publisher.

use crate::session::ledger::LIVE_RECORDS;
use crate::session::{CompletedLedger, CompletedRecord, SessionState, SessionStore, TransferId};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub id: TransferId,
    pub name: String,
    /// Percent with one decimal.
    pub progress: f64,
    pub downloaded: String,
    pub total: String,
    pub speed: String,
    pub time_remaining: String,
    pub peers: u32,
    pub state: SessionState,
    pub paused: bool,
    pub done: bool,
    pub retry_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusStats {
    pub active_count: usize,
    pub total_transfers: usize,
    pub completed_files: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStatus {
    pub active: Vec<SessionStatus>,
    pub completed: Vec<CompletedRecord>,
    pub stats: StatusStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    MetadataFetched,
    Completed,
    Retrying,
    Restored,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionNotice {
    pub event_kind: NoticeKind,
    pub session_id: TransferId,
    pub message: String,
    pub retry_count: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    Status(AggregateStatus),
    Notice(SessionNotice),
}

pub fn build_status(
    store: &SessionStore,
    ledger: &CompletedLedger,
    engine_transfers: usize,
) -> AggregateStatus {
    let active = store
        .list()
        .into_iter()
        .map(|s| SessionStatus {
            id: s.id,
            name: s.label().to_string(),
            progress: (s.progress() * 1000.0).round() / 10.0,
            downloaded: format_bytes(s.downloaded_bytes),
            total: format_bytes(s.total_bytes),
            speed: format_bytes(s.download_rate_bps),
            time_remaining: format_duration(s.eta_secs()),
            peers: s.peer_count,
            state: s.state,
            paused: s.is_paused(),
            done: s.state == SessionState::Completing,
            retry_count: s.retry_count,
        })
        .collect::<Vec<_>>();

    AggregateStatus {
        stats: StatusStats {
            active_count: active.len(),
            total_transfers: engine_transfers,
            completed_files: ledger.len(),
        },
        active,
        completed: ledger.recent(LIVE_RECORDS).to_vec(),
    }
}

/// Base-1024 scaling with at most two decimals, trailing zeros trimmed.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let mut text = format!("{value:.2}");
    if text.contains('.') {
        text = text.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{text} {}", UNITS[unit])
}

pub fn format_duration(secs: Option<u64>) -> String {
    let Some(secs) = secs else {
        return "Unknown".to_string();
    };
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// At most one status broadcast per interval; requests inside the window coalesce
/// into one trailing broadcast.
#[derive(Debug, Clone)]
pub struct StatusThrottle {
    interval: Duration,
    last_sent: Option<Instant>,
    pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    SendNow,
    /// Send at this instant; the caller arms a flush.
    Defer(Instant),
    /// A trailing send is already scheduled.
    Coalesced,
}

impl StatusThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
            pending: false,
        }
    }

    pub fn request(&mut self, now: Instant) -> ThrottleDecision {
        if self.pending {
            return ThrottleDecision::Coalesced;
        }
        match self.last_sent {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.pending = true;
                ThrottleDecision::Defer(last + self.interval)
            }
            _ => ThrottleDecision::SendNow,
        }
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_sent = Some(now);
        self.pending = false;
    }

    pub fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}

pub struct StatusPublisher {
    tx: broadcast::Sender<ServiceEvent>,
    throttle: StatusThrottle,
}

impl StatusPublisher {
    pub fn new(tx: broadcast::Sender<ServiceEvent>, interval: Duration) -> Self {
        Self {
            tx,
            throttle: StatusThrottle::new(interval),
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    /// Throttled status broadcast. `build` only runs when a frame is actually sent.
    /// Returns the instant a deferred flush must run at, if one was newly scheduled.
    pub fn publish_status(
        &mut self,
        now: Instant,
        build: impl FnOnce() -> AggregateStatus,
    ) -> Option<Instant> {
        if !self.has_subscribers() {
            return None;
        }
        match self.throttle.request(now) {
            ThrottleDecision::SendNow => {
                let _ = self.tx.send(ServiceEvent::Status(build()));
                self.throttle.mark_sent(now);
                None
            }
            ThrottleDecision::Defer(at) => Some(at),
            ThrottleDecision::Coalesced => None,
        }
    }

    /// Sends the trailing frame of a throttle window, if one is owed.
    pub fn flush(&mut self, now: Instant, build: impl FnOnce() -> AggregateStatus) -> bool {
        if !self.throttle.take_pending() || !self.has_subscribers() {
            return false;
        }
        let _ = self.tx.send(ServiceEvent::Status(build()));
        self.throttle.mark_sent(now);
        true
    }

    /// One-shot notices are never throttled.
    pub fn publish_event(&self, notice: SessionNotice) -> bool {
        if !self.has_subscribers() {
            return false;
        }
        self.tx.send(ServiceEvent::Notice(notice)).is_ok()
    }
}
