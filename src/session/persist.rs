//! Shutdown snapshot of active sessions and the completed ledger.
//!
//! The snapshot is transient: it is written once at graceful shutdown and removed as
//! soon as the next startup has read it.

use crate::session::errors::PersistError;
use crate::session::{CompletedLedger, CompletedRecord, SessionState, SessionStore, TransferId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, PersistError>;

pub const STATE_FILE_NAME: &str = "session_state.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub id: TransferId,
    #[serde(rename = "sourceURI")]
    pub source_uri: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub active_sessions: Vec<PersistedSession>,
    #[serde(default)]
    pub completed_records: Vec<CompletedRecord>,
}

/// A persisted session scheduled to be re-added `delay` after startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartIntent {
    pub id: TransferId,
    pub source_uri: String,
    pub display_name: Option<String>,
    pub paused: bool,
    pub delay: Duration,
}

/// Sessions without a source locator cannot be re-added and are left out, as are
/// finished ones, which live on in the ledger.
pub fn snapshot(store: &SessionStore, ledger: &CompletedLedger) -> PersistedState {
    let active_sessions = store
        .list()
        .into_iter()
        .filter(|s| s.state != SessionState::Completing && !s.source_uri.trim().is_empty())
        .map(|s| PersistedSession {
            id: s.id,
            source_uri: s.source_uri.clone(),
            display_name: s.display_name.clone().or_else(|| s.restored_name.clone()),
            progress: s.progress(),
            paused: s.is_paused(),
        })
        .collect();
    PersistedState {
        active_sessions,
        completed_records: ledger.records().to_vec(),
    }
}

/// Entry `i` gets `stagger * i`. Duplicate ids keep their first occurrence.
pub fn restart_intents(state: &PersistedState, stagger: Duration) -> Vec<RestartIntent> {
    let mut seen = HashSet::new();
    state
        .active_sessions
        .iter()
        .filter(|s| !s.source_uri.trim().is_empty() && seen.insert(s.id))
        .enumerate()
        .map(|(i, s)| RestartIntent {
            id: s.id,
            source_uri: s.source_uri.clone(),
            display_name: s.display_name.clone(),
            paused: s.paused,
            delay: stagger.saturating_mul(i as u32),
        })
        .collect()
}

pub async fn save_snapshot(path: &Path, state: &PersistedState) -> Result<()> {
    let bytes =
        serde_json::to_vec_pretty(state).map_err(|source| PersistError::Serialize { source })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| PersistError::EnsureDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|source| PersistError::WriteFile {
            path: tmp.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| PersistError::Rename {
            from: tmp,
            to: path.to_path_buf(),
            source,
        })?;
    Ok(())
}

/// Reads the snapshot and deletes it. `Ok(None)` when there is none.
///
/// An unparsable snapshot is deleted as well, then reported as [`PersistError::Parse`].
/// A snapshot that parsed but could not be deleted is still returned.
pub async fn take_snapshot(path: &Path) -> Result<Option<PersistedState>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistError::ReadFile {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let parsed = serde_json::from_slice::<PersistedState>(&bytes);
    let removed = tokio::fs::remove_file(path).await;
    settle_take(path, parsed, removed)
}

fn settle_take(
    path: &Path,
    parsed: serde_json::Result<PersistedState>,
    removed: std::io::Result<()>,
) -> Result<Option<PersistedState>> {
    if let Err(err) = removed {
        tracing::warn!(
            error = %err,
            path = %path.display(),
            "could not remove consumed session state; it will be read again on next start"
        );
    }
    parsed.map(Some).map_err(|source| PersistError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".tmp");
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ledger::DEFAULT_RETENTION;
    use tokio::time::Instant;

    fn temp_dir(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        p.push(format!("rust-swarm-persist-{tag}-{nanos}"));
        p
    }

    fn id(b: u8) -> TransferId {
        TransferId([b; 20])
    }

    fn persisted(b: u8, paused: bool) -> PersistedSession {
        PersistedSession {
            id: id(b),
            source_uri: format!("magnet:?xt=urn:btih:{}", id(b)),
            display_name: Some(format!("file-{b}")),
            progress: 0.5,
            paused,
        }
    }

    #[test]
    fn snapshot_skips_sessions_without_source_and_finished_ones() {
        let mut store = SessionStore::new();
        let now = Instant::now();
        store
            .create(id(1), "magnet:?xt=urn:btih:one".to_string(), false, now)
            .expect("create");
        store
            .create(id(2), "   ".to_string(), false, now)
            .expect("create");
        let s = store
            .create(id(3), "magnet:?xt=urn:btih:three".to_string(), false, now)
            .expect("create");
        s.state = SessionState::Paused;
        s.display_name = Some("three.iso".to_string());
        store
            .create(id(4), "magnet:?xt=urn:btih:four".to_string(), false, now)
            .expect("create")
            .state = SessionState::Completing;

        let mut ledger = CompletedLedger::new(DEFAULT_RETENTION);
        ledger.push(CompletedRecord {
            name: "done.iso".to_string(),
            size_bytes: 1,
            completed_at: 1,
            duration_seconds: 1.0,
        });

        let state = snapshot(&store, &ledger);
        let ids: Vec<TransferId> = state.active_sessions.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![id(1), id(3)]);
        assert!(state.active_sessions[1].paused);
        assert_eq!(
            state.active_sessions[1].display_name.as_deref(),
            Some("three.iso")
        );
        assert_eq!(state.completed_records.len(), 1);
    }

    #[test]
    fn restart_intents_are_staggered_in_order() {
        let state = PersistedState {
            active_sessions: vec![persisted(1, false), persisted(2, true), persisted(1, false), persisted(3, false)],
            completed_records: Vec::new(),
        };
        let intents = restart_intents(&state, Duration::from_secs(1));
        let got: Vec<(TransferId, Duration)> = intents.iter().map(|i| (i.id, i.delay)).collect();
        assert_eq!(
            got,
            vec![
                (id(1), Duration::ZERO),
                (id(2), Duration::from_secs(1)),
                (id(3), Duration::from_secs(2)),
            ]
        );
        assert!(intents[1].paused);
    }

    #[test]
    fn wire_format_uses_documented_field_names() {
        let state = PersistedState {
            active_sessions: vec![persisted(7, false)],
            completed_records: Vec::new(),
        };
        let json = serde_json::to_value(&state).expect("json");
        let entry = &json["activeSessions"][0];
        assert_eq!(entry["id"], id(7).to_hex_lower());
        assert!(entry["sourceURI"].as_str().expect("uri").starts_with("magnet:"));
        assert_eq!(entry["displayName"], "file-7");
        assert!(json["completedRecords"].as_array().expect("array").is_empty());
    }

    #[tokio::test]
    async fn take_snapshot_reads_once_and_removes_file() {
        let root = temp_dir("take");
        let path = root.join(STATE_FILE_NAME);
        let state = PersistedState {
            active_sessions: vec![persisted(1, false), persisted(2, true)],
            completed_records: Vec::new(),
        };
        save_snapshot(&path, &state).await.expect("save");
        assert!(path.exists());

        let loaded = take_snapshot(&path).await.expect("take");
        assert_eq!(loaded, Some(state));
        assert!(!path.exists());
        assert_eq!(take_snapshot(&path).await.expect("take again"), None);

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn parsed_snapshot_survives_a_failed_removal() {
        let path = Path::new("/nonexistent/session_state.json");
        let state = PersistedState {
            active_sessions: vec![persisted(5, true)],
            completed_records: Vec::new(),
        };
        let removed = Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        let got = settle_take(path, Ok(state.clone()), removed).expect("state kept");
        assert_eq!(got, Some(state));

        let bad = serde_json::from_slice::<PersistedState>(b"{oops");
        let removed = Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        let err = settle_take(path, bad, removed).expect_err("parse error");
        assert!(matches!(err, PersistError::Parse { .. }));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_removed_and_reported() {
        let root = temp_dir("corrupt");
        tokio::fs::create_dir_all(&root).await.expect("mkdir");
        let path = root.join(STATE_FILE_NAME);
        tokio::fs::write(&path, b"{not-json").await.expect("write");

        let err = take_snapshot(&path).await.expect_err("corrupt");
        assert!(matches!(err, PersistError::Parse { .. }));
        assert!(!path.exists());

        let _ = std::fs::remove_dir_all(root);
    }
}
