//! In-process engine that keeps a transfer table but moves no bytes.
//!
//! The daemon falls back to it when no external swarm backend is linked, and the test
//! suites drive it through [`MemoryEngineControl`] to inject engine events.

use crate::engine::{AddOptions, EngineError, EngineErrorKind, EngineEvent, EngineTransfer, SwarmEngine};
use crate::session::{TransferId, magnet};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

const EVENT_QUEUE: usize = 256;

#[derive(Debug, Clone)]
struct MemoryTransfer {
    source_uri: String,
    name: Option<String>,
    paused: bool,
    done: bool,
}

#[derive(Debug, Default)]
struct Inner {
    transfers: BTreeMap<TransferId, MemoryTransfer>,
    added_sources: Vec<String>,
    last_options: Option<AddOptions>,
    fail_next_add: Option<EngineError>,
    destroyed: bool,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    match inner.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("memory engine lock poisoned; continuing with recovered state");
            poisoned.into_inner()
        }
    }
}

pub struct MemoryEngine {
    inner: Arc<Mutex<Inner>>,
}

/// Test/diagnostic side of a [`MemoryEngine`].
#[derive(Clone)]
pub struct MemoryEngineControl {
    inner: Arc<Mutex<Inner>>,
    events_tx: mpsc::Sender<EngineEvent>,
}

impl MemoryEngine {
    pub fn new() -> (Self, MemoryEngineControl, mpsc::Receiver<EngineEvent>) {
        let inner = Arc::new(Mutex::new(Inner::default()));
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        (
            Self {
                inner: inner.clone(),
            },
            MemoryEngineControl { inner, events_tx },
            events_rx,
        )
    }
}

impl SwarmEngine for MemoryEngine {
    fn add(&mut self, source_uri: &str, opts: &AddOptions) -> Result<(), EngineError> {
        let id = magnet::parse_magnet(source_uri)
            .map_err(|err| EngineError::new(EngineErrorKind::InvalidTransfer, err.to_string()))?;
        let mut inner = lock(&self.inner);
        if let Some(err) = inner.fail_next_add.take() {
            return Err(err);
        }
        if inner.destroyed {
            return Err(EngineError::new(EngineErrorKind::Other, "engine destroyed"));
        }
        if inner.transfers.contains_key(&id) {
            return Err(EngineError::new(
                EngineErrorKind::InvalidTransfer,
                format!("transfer {id} already added"),
            ));
        }
        inner.transfers.insert(
            id,
            MemoryTransfer {
                source_uri: source_uri.to_string(),
                name: None,
                paused: false,
                done: false,
            },
        );
        inner.added_sources.push(source_uri.to_string());
        inner.last_options = Some(opts.clone());
        Ok(())
    }

    fn remove(&mut self, id: TransferId) -> Result<(), EngineError> {
        lock(&self.inner)
            .transfers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::new(EngineErrorKind::Other, format!("no transfer {id}")))
    }

    fn get(&self, id: TransferId) -> Option<EngineTransfer> {
        lock(&self.inner).transfers.get(&id).map(|t| EngineTransfer {
            id,
            name: t.name.clone(),
            paused: t.paused,
            done: t.done,
        })
    }

    fn pause(&mut self, id: TransferId) -> Result<(), EngineError> {
        set_paused(&self.inner, id, true)
    }

    fn resume(&mut self, id: TransferId) -> Result<(), EngineError> {
        set_paused(&self.inner, id, false)
    }

    fn transfer_count(&self) -> usize {
        lock(&self.inner).transfers.len()
    }

    fn destroy(&mut self) {
        let mut inner = lock(&self.inner);
        inner.transfers.clear();
        inner.destroyed = true;
    }
}

fn set_paused(inner: &Mutex<Inner>, id: TransferId, paused: bool) -> Result<(), EngineError> {
    let mut inner = lock(inner);
    let t = inner
        .transfers
        .get_mut(&id)
        .ok_or_else(|| EngineError::new(EngineErrorKind::Other, format!("no transfer {id}")))?;
    t.paused = paused;
    Ok(())
}

impl MemoryEngineControl {
    pub async fn emit(&self, event: EngineEvent) -> bool {
        {
            let mut inner = lock(&self.inner);
            let id = event.id();
            if let Some(t) = inner.transfers.get_mut(&id) {
                match &event {
                    EngineEvent::MetadataReady { name, .. } => t.name = Some(name.clone()),
                    EngineEvent::Completed { .. } => t.done = true,
                    _ => {}
                }
            }
        }
        self.events_tx.send(event).await.is_ok()
    }

    pub async fn metadata(&self, id: TransferId, name: &str, total_bytes: u64) -> bool {
        self.emit(EngineEvent::MetadataReady {
            id,
            name: name.to_string(),
            total_bytes,
        })
        .await
    }

    pub async fn progress(
        &self,
        id: TransferId,
        downloaded_bytes: u64,
        total_bytes: u64,
        download_rate_bps: u64,
        peer_count: u32,
    ) -> bool {
        self.emit(EngineEvent::Progress {
            id,
            downloaded_bytes,
            total_bytes,
            download_rate_bps,
            peer_count,
        })
        .await
    }

    pub async fn complete(&self, id: TransferId) -> bool {
        self.emit(EngineEvent::Completed { id }).await
    }

    pub async fn fail(&self, id: TransferId, error: EngineError) -> bool {
        self.emit(EngineEvent::Error { id, error }).await
    }

    /// The next `add` call fails with `err`.
    pub fn fail_next_add(&self, err: EngineError) {
        lock(&self.inner).fail_next_add = Some(err);
    }

    pub fn contains(&self, id: TransferId) -> bool {
        lock(&self.inner).transfers.contains_key(&id)
    }

    pub fn is_paused(&self, id: TransferId) -> bool {
        lock(&self.inner)
            .transfers
            .get(&id)
            .map(|t| t.paused)
            .unwrap_or(false)
    }

    pub fn source_of(&self, id: TransferId) -> Option<String> {
        lock(&self.inner)
            .transfers
            .get(&id)
            .map(|t| t.source_uri.clone())
    }

    /// Every source passed to a successful `add`, in call order.
    pub fn added_sources(&self) -> Vec<String> {
        lock(&self.inner).added_sources.clone()
    }

    pub fn last_add_options(&self) -> Option<AddOptions> {
        lock(&self.inner).last_options.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        lock(&self.inner).destroyed
    }
}
