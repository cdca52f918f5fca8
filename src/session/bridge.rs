//! Translates engine events into session transitions.
//!
//! `reduce` is pure: it returns the next session value plus the side effects the
//! service has to carry out (timers, notices, ledger writes, teardown).

use crate::engine::EngineEvent;
use crate::session::retry::FailureCause;
use crate::session::status::NoticeKind;
use crate::session::{CompletedRecord, Session, SessionState};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CancelWatchdog,
    PublishNotice { kind: NoticeKind, message: String },
    PublishStatus,
    RecordCompletion(CompletedRecord),
    ScheduleGrace,
    Fail(FailureCause),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub session: Session,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(session: &Session) -> Self {
        Self {
            session: session.clone(),
            effects: Vec::new(),
        }
    }
}

pub fn reduce(session: &Session, event: &EngineEvent, now: Instant, now_unix: u64) -> Transition {
    // Only telemetry is still accepted during the completion grace.
    if session.state == SessionState::Completing && !matches!(event, EngineEvent::Progress { .. })
    {
        return Transition::unchanged(session);
    }

    let mut next = session.clone();
    let mut effects = Vec::new();

    match event {
        EngineEvent::MetadataReady {
            name, total_bytes, ..
        } => {
            let first = next.display_name.is_none();
            next.display_name = Some(name.clone());
            next.total_bytes = *total_bytes;
            next.metadata_deadline = None;
            if next.started_at.is_none() {
                next.started_at = Some(now);
            }
            if next.state == SessionState::Fetching {
                next.state = SessionState::Downloading;
            }
            effects.push(Effect::CancelWatchdog);
            if first {
                effects.push(Effect::PublishNotice {
                    kind: NoticeKind::MetadataFetched,
                    message: format!("Metadata fetched: {name}"),
                });
            }
            effects.push(Effect::PublishStatus);
        }
        EngineEvent::Progress {
            downloaded_bytes,
            total_bytes,
            download_rate_bps,
            peer_count,
            ..
        } => {
            if *total_bytes > 0 {
                next.total_bytes = *total_bytes;
            }
            next.downloaded_bytes = if next.total_bytes > 0 {
                (*downloaded_bytes).min(next.total_bytes)
            } else {
                *downloaded_bytes
            };
            next.download_rate_bps = *download_rate_bps;
            next.peer_count = *peer_count;
            effects.push(Effect::PublishStatus);
        }
        EngineEvent::Completed { .. } => {
            next.state = SessionState::Completing;
            next.metadata_deadline = None;
            next.downloaded_bytes = next.total_bytes.max(next.downloaded_bytes);
            next.download_rate_bps = 0;
            let name = next.label().to_string();
            effects.push(Effect::CancelWatchdog);
            effects.push(Effect::RecordCompletion(CompletedRecord {
                name: name.clone(),
                size_bytes: next.total_bytes,
                completed_at: now_unix,
                duration_seconds: next.running_for(now).as_secs_f64(),
            }));
            effects.push(Effect::PublishNotice {
                kind: NoticeKind::Completed,
                message: format!("Download completed: {name}"),
            });
            effects.push(Effect::ScheduleGrace);
            effects.push(Effect::PublishStatus);
        }
        EngineEvent::Error { error, .. } => {
            next.state = SessionState::Failed;
            effects.push(Effect::Fail(FailureCause::Engine(error.clone())));
        }
    }

    Transition {
        session: next,
        effects,
    }
}
