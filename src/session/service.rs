use crate::config::Config;
use crate::engine::{AddOptions, EngineEvent, SwarmEngine};
use crate::logging;
use crate::session::bridge::{self, Effect};
use crate::session::ledger::{self, DEFAULT_RETENTION};
use crate::session::persist::{self, STATE_FILE_NAME};
use crate::session::reaper::{self, ReaperConfig};
use crate::session::retry::{self, FailureCause, RetryDecision, RetryPolicy};
use crate::session::status::{self, StatusPublisher};
use crate::session::timers::{TimerKey, TimerSet};
use crate::session::{
    AggregateStatus, CompletedLedger, NoticeKind, PersistError, PersistedSession, RestartIntent,
    ServiceEvent, SessionError, SessionNotice, SessionState, SessionStore, TransferId, magnet,
};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};

pub type Result<T> = std::result::Result<T, SessionError>;

const UNKNOWN_EVENT_WARN_EVERY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SessionServiceConfig {
    pub download_dir: PathBuf,
    pub state_path: PathBuf,
    pub add_options: AddOptions,
    pub metadata_timeout: Duration,
    pub retry: RetryPolicy,
    /// How long a completed session stays visible before it is dropped from the store.
    pub completion_grace: Duration,
    pub reaper: ReaperConfig,
    pub status_throttle: Duration,
    pub restore_stagger: Duration,
    pub ledger_retention: Duration,
    pub ledger_sweep_every: Duration,
    pub command_queue: usize,
    pub event_capacity: usize,
}

impl SessionServiceConfig {
    pub fn from_data_dir(data_dir: &Path) -> Self {
        let download_dir = data_dir.join("downloads");
        Self {
            add_options: AddOptions {
                download_dir: download_dir.clone(),
                announce: Vec::new(),
                max_conns: 100,
                max_web_conns: 200,
            },
            download_dir,
            state_path: data_dir.join(STATE_FILE_NAME),
            metadata_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            completion_grace: Duration::from_secs(30),
            reaper: ReaperConfig::default(),
            status_throttle: Duration::from_secs(1),
            restore_stagger: Duration::from_secs(1),
            ledger_retention: DEFAULT_RETENTION,
            ledger_sweep_every: Duration::from_secs(3600),
            command_queue: 128,
            event_capacity: 256,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let data_dir = PathBuf::from(&cfg.general.data_dir);
        let s = &cfg.session;
        let mut out = Self::from_data_dir(&data_dir);
        out.add_options.announce = cfg.engine.announce.clone();
        out.add_options.max_conns = cfg.engine.max_conns;
        out.add_options.max_web_conns = cfg.engine.max_web_conns;
        out.metadata_timeout = Duration::from_secs(s.metadata_timeout_secs.max(1));
        out.retry = RetryPolicy {
            backoff: Duration::from_secs(s.retry_backoff_secs),
            retry_metadata_timeout: Duration::from_secs(s.retry_metadata_timeout_secs.max(1)),
        };
        out.completion_grace = Duration::from_secs(s.completion_grace_secs);
        out.reaper = ReaperConfig {
            period: Duration::from_secs(s.reaper_every_secs.max(1)),
            stale_after: Duration::from_secs(s.reaper_stale_after_secs),
            include_paused: s.reaper_include_paused,
        };
        out.status_throttle = Duration::from_millis(s.status_throttle_ms);
        out.restore_stagger = Duration::from_millis(s.restore_stagger_ms);
        out.ledger_retention = Duration::from_secs(s.ledger_retention_secs);
        out.ledger_sweep_every = Duration::from_secs(s.ledger_sweep_every_secs.max(1));
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Resume,
    Cancel,
}

impl ControlAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
        }
    }
}

#[derive(Debug)]
pub enum SessionCommand {
    Start {
        source_uri: String,
        reply: oneshot::Sender<Result<TransferId>>,
    },
    Control {
        id: TransferId,
        action: ControlAction,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteCompleted {
        name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    QueryStatus {
        reply: oneshot::Sender<AggregateStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct SessionServiceHandle {
    tx: mpsc::Sender<SessionCommand>,
    events_tx: broadcast::Sender<ServiceEvent>,
}

impl SessionServiceHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    pub async fn start_transfer(&self, source_uri: impl Into<String>) -> Result<TransferId> {
        let source_uri = source_uri.into();
        self.request(|reply| SessionCommand::Start { source_uri, reply })
            .await?
    }

    /// `id` is the hex transfer id; anything that does not parse is reported as not found.
    pub async fn control(&self, id: &str, action: ControlAction) -> Result<()> {
        let id = TransferId::from_hex(id.trim())
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        self.request(|reply| SessionCommand::Control { id, action, reply })
            .await?
    }

    pub async fn delete_completed_artifact(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.request(|reply| SessionCommand::DeleteCompleted { name, reply })
            .await?
    }

    pub async fn query_status(&self) -> Result<AggregateStatus> {
        self.request(|reply| SessionCommand::QueryStatus { reply })
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events_tx.subscribe()
    }

    /// Returns once the shutdown snapshot has been attempted.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Shutdown { reply })
            .await
    }
}

/// Reserved id of a transfer waiting out its retry backoff.
#[derive(Debug, Clone)]
struct PendingRetry {
    /// Creation order of the failed session.
    seq: u64,
    source_uri: String,
    display_name: Option<String>,
    retry_count: u8,
}

struct SessionService<E> {
    cfg: SessionServiceConfig,
    engine: E,
    store: SessionStore,
    ledger: CompletedLedger,
    timers: TimerSet,
    publisher: StatusPublisher,
    pending_retries: HashMap<TransferId, PendingRetry>,
    pending_restores: HashMap<TransferId, RestartIntent>,
}

pub async fn start_service<E: SwarmEngine>(
    cfg: SessionServiceConfig,
    engine: E,
    engine_rx: mpsc::Receiver<EngineEvent>,
) -> Result<(SessionServiceHandle, tokio::task::JoinHandle<Result<()>>)> {
    tokio::fs::create_dir_all(&cfg.download_dir)
        .await
        .map_err(|source| PersistError::EnsureDir {
            path: cfg.download_dir.clone(),
            source,
        })?;

    let now = Instant::now();
    let mut ledger = CompletedLedger::new(cfg.ledger_retention);
    let mut timers = TimerSet::new();
    let mut pending_restores = HashMap::new();
    match persist::take_snapshot(&cfg.state_path).await {
        Ok(Some(state)) => {
            let intents = persist::restart_intents(&state, cfg.restore_stagger);
            tracing::info!(
                sessions = intents.len(),
                completed = state.completed_records.len(),
                "restoring session state"
            );
            ledger = CompletedLedger::from_records(
                state.completed_records,
                cfg.ledger_retention,
                ledger::unix_now(),
            );
            for intent in intents {
                timers.arm(TimerKey::RestoreIntent(intent.id), now + intent.delay);
                pending_restores.insert(intent.id, intent);
            }
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(
                error = %err,
                path = %cfg.state_path.display(),
                "discarding unreadable session state"
            );
        }
    }

    let (tx, rx) = mpsc::channel(cfg.command_queue.max(1));
    let (events_tx, _) = broadcast::channel(cfg.event_capacity.max(1));
    let svc = SessionService {
        publisher: StatusPublisher::new(events_tx.clone(), cfg.status_throttle),
        cfg,
        engine,
        store: SessionStore::new(),
        ledger,
        timers,
        pending_retries: HashMap::new(),
        pending_restores,
    };
    let join = tokio::spawn(run_service(svc, rx, engine_rx));
    Ok((SessionServiceHandle { tx, events_tx }, join))
}

/// Waits for the task returned by [`start_service`]; a panic surfaces as `ServiceJoin`.
pub async fn join_service(join: tokio::task::JoinHandle<Result<()>>) -> Result<()> {
    join.await?
}

async fn run_service<E: SwarmEngine>(
    mut svc: SessionService<E>,
    mut rx: mpsc::Receiver<SessionCommand>,
    mut engine_rx: mpsc::Receiver<EngineEvent>,
) -> Result<()> {
    tracing::info!(
        download_dir = %svc.cfg.download_dir.display(),
        restoring = svc.pending_restores.len(),
        "session service started"
    );

    let start = Instant::now();
    let mut reaper_tick = interval_at(start + svc.cfg.reaper.period, svc.cfg.reaper.period);
    let mut ledger_tick = interval_at(
        start + svc.cfg.ledger_sweep_every,
        svc.cfg.ledger_sweep_every,
    );
    reaper_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ledger_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut engine_open = true;
    loop {
        let next_timer = svc.timers.next_deadline();
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(SessionCommand::Shutdown { reply }) => {
                        svc.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => svc.handle_command(cmd, Instant::now()),
                    None => {
                        tracing::info!("all session handles dropped");
                        svc.shutdown().await;
                        break;
                    }
                }
            }

            event = engine_rx.recv(), if engine_open => {
                match event {
                    Some(event) => svc.handle_engine_event(event, Instant::now()),
                    None => {
                        tracing::warn!("engine event stream closed");
                        engine_open = false;
                    }
                }
            }

            _ = sleep_until_opt(next_timer) => {
                svc.fire_due_timers(Instant::now());
            }

            _ = reaper_tick.tick() => {
                svc.reap(Instant::now());
            }

            _ = ledger_tick.tick() => {
                svc.sweep_ledger(Instant::now());
            }
        }
    }

    tracing::info!("session service stopped");
    Ok(())
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

impl<E: SwarmEngine> SessionService<E> {
    fn handle_command(&mut self, cmd: SessionCommand, now: Instant) {
        match cmd {
            SessionCommand::Start { source_uri, reply } => {
                let _ = reply.send(self.start_transfer(source_uri, now));
            }
            SessionCommand::Control { id, action, reply } => {
                let _ = reply.send(self.control(id, action, now));
            }
            SessionCommand::DeleteCompleted { name, reply } => {
                self.delete_completed(name, reply, now);
            }
            SessionCommand::QueryStatus { reply } => {
                let _ = reply.send(self.build_status());
            }
            // Handled by the loop so the reply goes out after the snapshot.
            SessionCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn build_status(&self) -> AggregateStatus {
        status::build_status(&self.store, &self.ledger, self.engine.transfer_count())
    }

    fn request_status(&mut self, now: Instant) {
        let flush_at = self.publisher.publish_status(now, || {
            status::build_status(&self.store, &self.ledger, self.engine.transfer_count())
        });
        if let Some(at) = flush_at {
            self.timers.arm(TimerKey::StatusFlush, at);
        }
    }

    fn notify(&self, kind: NoticeKind, id: TransferId, message: String, retry_count: u8) {
        self.publisher.publish_event(SessionNotice {
            event_kind: kind,
            session_id: id,
            message,
            retry_count,
        });
    }

    /// Any of these holds the id; a new start for it is a duplicate.
    fn id_reserved(&self, id: TransferId) -> bool {
        self.engine.get(id).is_some()
            || self.pending_retries.contains_key(&id)
            || self.pending_restores.contains_key(&id)
    }

    fn start_transfer(&mut self, source_uri: String, now: Instant) -> Result<TransferId> {
        let source_uri = source_uri.trim().to_string();
        let id = magnet::parse_magnet(&source_uri)?;
        self.admit(id, source_uri, 0, None, now)?;
        tracing::info!(
            %id,
            "transfer started"
        );
        self.request_status(now);
        Ok(id)
    }

    fn metadata_window(&self, retry_count: u8) -> Duration {
        if retry_count > 0 {
            self.cfg.retry.retry_metadata_timeout
        } else {
            self.cfg.metadata_timeout
        }
    }

    /// Adds a transfer to the engine and tracks it as a `Fetching` session.
    fn admit(
        &mut self,
        id: TransferId,
        source_uri: String,
        retry_count: u8,
        restored_name: Option<String>,
        now: Instant,
    ) -> Result<()> {
        let reserved = self.id_reserved(id);
        let deadline = now + self.metadata_window(retry_count);
        let session = self.store.create(id, source_uri.clone(), reserved, now)?;
        session.retry_count = retry_count;
        session.restored_name = restored_name;
        session.metadata_deadline = Some(deadline);

        if let Err(err) = self.engine.add(&source_uri, &self.cfg.add_options) {
            self.store.remove(id);
            return Err(SessionError::Engine(err));
        }
        self.timers.arm(TimerKey::MetadataDeadline(id), deadline);
        Ok(())
    }

    /// Drops every trace of the session: timers, store entry, engine transfer.
    fn teardown(&mut self, id: TransferId) -> Option<crate::session::Session> {
        self.timers.cancel_session(id);
        let session = self.store.remove(id);
        if self.engine.get(id).is_some()
            && let Err(err) = self.engine.remove(id)
        {
            tracing::debug!(
                %id,
                error = %err,
                "engine remove failed during teardown"
            );
        }
        session
    }

    fn fail_session(&mut self, id: TransferId, cause: FailureCause, now: Instant) {
        let Some(session) = self.teardown(id) else {
            return;
        };
        let label = session.label().to_string();

        match retry::decide(session.retry_count, &cause, &self.cfg.retry) {
            RetryDecision::Retry { after } => {
                tracing::info!(
                    %id,
                    retry_in_ms = after.as_millis() as u64,
                    cause = ?cause,
                    "scheduling transfer retry"
                );
                self.pending_retries.insert(
                    id,
                    PendingRetry {
                        seq: session.seq,
                        source_uri: session.source_uri.clone(),
                        display_name: session
                            .display_name
                            .clone()
                            .or_else(|| session.restored_name.clone()),
                        retry_count: session.retry_count + 1,
                    },
                );
                self.timers.arm(TimerKey::RetryReadd(id), now + after);
                self.notify(
                    NoticeKind::Retrying,
                    id,
                    format!("Retrying {label}: {}", describe_cause(&cause)),
                    session.retry_count,
                );
            }
            RetryDecision::GiveUp => {
                let err = cause.into_error(id);
                tracing::warn!(
                    %id,
                    retry_count = session.retry_count,
                    error = %err,
                    "transfer failed"
                );
                self.notify(
                    NoticeKind::Error,
                    id,
                    format!("{label}: {err}"),
                    session.retry_count,
                );
            }
        }
        self.request_status(now);
    }

    fn handle_engine_event(&mut self, event: EngineEvent, now: Instant) {
        let id = event.id();
        let Some(session) = self.store.get(id) else {
            if logging::warn_throttled("session_unknown_engine_event", UNKNOWN_EVENT_WARN_EVERY) {
                tracing::warn!(
                    %id,
                    event = event.kind_str(),
                    "dropping engine event for unknown transfer"
                );
            }
            return;
        };

        let transition = bridge::reduce(session, &event, now, ledger::unix_now());
        let retry_count = transition.session.retry_count;
        if let Some(slot) = self.store.get_mut(id) {
            *slot = transition.session;
        }
        for effect in transition.effects {
            match effect {
                Effect::CancelWatchdog => {
                    self.timers.cancel(TimerKey::MetadataDeadline(id));
                }
                Effect::PublishNotice { kind, message } => {
                    tracing::info!(
                        %id,
                        notice = ?kind,
                        "{message}"
                    );
                    self.notify(kind, id, message, retry_count);
                }
                Effect::PublishStatus => self.request_status(now),
                Effect::RecordCompletion(record) => self.ledger.push(record),
                Effect::ScheduleGrace => {
                    self.timers
                        .arm(TimerKey::CompletionGrace(id), now + self.cfg.completion_grace);
                }
                Effect::Fail(cause) => self.fail_session(id, cause, now),
            }
        }
    }

    fn fire_due_timers(&mut self, now: Instant) {
        for key in self.timers.pop_due(now) {
            match key {
                TimerKey::MetadataDeadline(id) => self.on_metadata_deadline(id, now),
                TimerKey::RetryReadd(id) => self.on_retry_due(id, now),
                TimerKey::CompletionGrace(id) => {
                    if self.store.remove(id).is_some() {
                        self.timers.cancel_session(id);
                        tracing::debug!(
                            %id,
                            "completion grace elapsed"
                        );
                        self.request_status(now);
                    }
                }
                TimerKey::RestoreIntent(id) => self.on_restore_due(id, now),
                TimerKey::StatusFlush => {
                    self.publisher.flush(now, || {
                        status::build_status(
                            &self.store,
                            &self.ledger,
                            self.engine.transfer_count(),
                        )
                    });
                }
            }
        }
    }

    fn on_metadata_deadline(&mut self, id: TransferId, now: Instant) {
        let timed_out = self
            .store
            .get(id)
            .is_some_and(|s| s.state == SessionState::Fetching && s.display_name.is_none());
        if timed_out {
            tracing::info!(
                %id,
                "metadata fetch timed out"
            );
            self.fail_session(id, FailureCause::MetadataTimeout, now);
        }
    }

    fn on_retry_due(&mut self, id: TransferId, now: Instant) {
        let Some(pending) = self.pending_retries.remove(&id) else {
            return;
        };
        let label = pending
            .display_name
            .clone()
            .unwrap_or_else(|| id.to_hex_lower());

        if self.engine.get(id).is_some() || self.store.contains(id) {
            tracing::warn!(
                %id,
                "retry abandoned: transfer already exists"
            );
            self.notify(
                NoticeKind::Error,
                id,
                format!("Retry of {label} abandoned: transfer already exists"),
                pending.retry_count,
            );
            return;
        }

        match self.admit(
            id,
            pending.source_uri,
            pending.retry_count,
            pending.display_name,
            now,
        ) {
            Ok(()) => {
                tracing::info!(
                    %id,
                    retry_count = pending.retry_count,
                    "transfer re-added"
                );
                self.request_status(now);
            }
            Err(err) => {
                tracing::warn!(
                    %id,
                    error = %err,
                    "retry re-add failed"
                );
                self.notify(
                    NoticeKind::Error,
                    id,
                    format!("Retry of {label} failed: {err}"),
                    pending.retry_count,
                );
            }
        }
    }

    fn on_restore_due(&mut self, id: TransferId, now: Instant) {
        let Some(intent) = self.pending_restores.remove(&id) else {
            return;
        };
        let label = intent
            .display_name
            .clone()
            .unwrap_or_else(|| id.to_hex_lower());

        match self.admit(id, intent.source_uri, 0, intent.display_name, now) {
            Ok(()) => {
                if intent.paused
                    && let Err(err) = self.pause(id)
                {
                    tracing::warn!(
                        %id,
                        error = %err,
                        "could not pause restored transfer"
                    );
                }
                tracing::info!(
                    %id,
                    paused = intent.paused,
                    "transfer restored"
                );
                self.notify(NoticeKind::Restored, id, format!("Restored {label}"), 0);
                self.request_status(now);
            }
            Err(err) => {
                tracing::warn!(
                    %id,
                    error = %err,
                    "restore skipped"
                );
                self.notify(
                    NoticeKind::Error,
                    id,
                    format!("Could not restore {label}: {err}"),
                    0,
                );
            }
        }
    }

    fn control(&mut self, id: TransferId, action: ControlAction, now: Instant) -> Result<()> {
        if self.engine.get(id).is_none() {
            return Err(SessionError::NotFound(id.to_hex_lower()));
        }
        tracing::debug!(
            %id,
            action = action.as_str(),
            "transfer control"
        );
        match action {
            ControlAction::Pause => self.pause(id)?,
            ControlAction::Resume => self.resume(id, now)?,
            ControlAction::Cancel => {
                let label = self
                    .teardown(id)
                    .map(|s| s.label().to_string())
                    .unwrap_or_else(|| id.to_hex_lower());
                self.notify(
                    NoticeKind::Cancelled,
                    id,
                    format!("Cancelled {label}"),
                    0,
                );
            }
        }
        self.request_status(now);
        Ok(())
    }

    fn pause(&mut self, id: TransferId) -> Result<()> {
        self.engine.pause(id)?;
        let Some(session) = self.store.get_mut(id) else {
            return Ok(());
        };
        match session.state {
            SessionState::Fetching => {
                session.state = SessionState::Paused;
                session.metadata_deadline = None;
                self.timers.cancel(TimerKey::MetadataDeadline(id));
            }
            SessionState::Downloading => session.state = SessionState::Paused,
            SessionState::Paused | SessionState::Completing | SessionState::Failed => {}
        }
        Ok(())
    }

    fn resume(&mut self, id: TransferId, now: Instant) -> Result<()> {
        self.engine.resume(id)?;
        let window = self
            .store
            .get(id)
            .map(|s| self.metadata_window(s.retry_count));
        let Some(session) = self.store.get_mut(id) else {
            return Ok(());
        };
        if session.state != SessionState::Paused {
            return Ok(());
        }
        if session.display_name.is_some() {
            session.state = SessionState::Downloading;
        } else {
            let deadline = now + window.unwrap_or(self.cfg.metadata_timeout);
            session.state = SessionState::Fetching;
            session.metadata_deadline = Some(deadline);
            self.timers.arm(TimerKey::MetadataDeadline(id), deadline);
        }
        Ok(())
    }

    fn delete_completed(&mut self, name: String, reply: oneshot::Sender<Result<()>>, now: Instant) {
        if !is_single_component(&name) {
            let _ = reply.send(Err(SessionError::InvalidArtifactName(name)));
            return;
        }
        let had_record = self.ledger.remove_named(&name);
        if had_record {
            self.request_status(now);
        }

        let path = self.cfg.download_dir.join(&name);
        tokio::spawn(async move {
            let result = match remove_artifact(&path).await {
                Ok(true) => Ok(()),
                Ok(false) if had_record => Ok(()),
                Ok(false) => Err(SessionError::NotFound(name)),
                Err(err) => Err(SessionError::Persist(err)),
            };
            if let Err(err) = &result {
                tracing::debug!(error = %err, path = %path.display(), "artifact delete failed");
            }
            let _ = reply.send(result);
        });
    }

    fn reap(&mut self, now: Instant) {
        let stuck = reaper::find_stuck(&self.store, now, &self.cfg.reaper);
        if stuck.is_empty() {
            return;
        }
        for id in stuck {
            let Some(session) = self.teardown(id) else {
                continue;
            };
            tracing::warn!(
                %id,
                stale_secs = session.running_for(now).as_secs(),
                "removing stuck transfer"
            );
            self.notify(
                NoticeKind::Error,
                id,
                format!(
                    "Removed stuck transfer {}: no progress and no peers",
                    session.label()
                ),
                session.retry_count,
            );
        }
        self.request_status(now);
    }

    fn sweep_ledger(&mut self, now: Instant) {
        let evicted = self.ledger.evict_expired(ledger::unix_now());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.ledger.len(), "completed ledger swept");
            self.request_status(now);
        }
    }

    async fn shutdown(&mut self) {
        tracing::info!(sessions = self.store.len(), "session service shutting down");

        let mut state = persist::snapshot(&self.store, &self.ledger);
        // Live sessions and those waiting out a retry go back in creation order.
        let mut ordered: Vec<(u64, PersistedSession)> = state
            .active_sessions
            .drain(..)
            .map(|p| (self.store.get(p.id).map_or(u64::MAX, |s| s.seq), p))
            .collect();
        ordered.extend(self.pending_retries.drain().map(|(id, p)| {
            (
                p.seq,
                PersistedSession {
                    id,
                    source_uri: p.source_uri,
                    display_name: p.display_name,
                    progress: 0.0,
                    paused: false,
                },
            )
        }));
        ordered.sort_by_key(|(seq, _)| *seq);
        state.active_sessions = ordered.into_iter().map(|(_, p)| p).collect();
        let mut restores: Vec<_> = self.pending_restores.drain().map(|(_, i)| i).collect();
        restores.sort_by_key(|i| i.delay);
        for intent in restores {
            state.active_sessions.push(PersistedSession {
                id: intent.id,
                source_uri: intent.source_uri,
                display_name: intent.display_name,
                progress: 0.0,
                paused: intent.paused,
            });
        }
        self.timers.clear();

        match persist::save_snapshot(&self.cfg.state_path, &state).await {
            Ok(()) => tracing::info!(
                sessions = state.active_sessions.len(),
                completed = state.completed_records.len(),
                path = %self.cfg.state_path.display(),
                "session state saved"
            ),
            Err(err) => tracing::warn!(error = %err, "failed to save session state"),
        }

        for id in self.store.ids() {
            if let Err(err) = self.engine.pause(id) {
                tracing::debug!(
                    %id,
                    error = %err,
                    "pause on shutdown failed"
                );
            }
        }
        self.engine.destroy();
    }
}

fn describe_cause(cause: &FailureCause) -> String {
    match cause {
        FailureCause::MetadataTimeout => "metadata fetch timed out".to_string(),
        FailureCause::Engine(err) => err.message.clone(),
    }
}

fn is_single_component(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// `Ok(false)` when nothing was there.
async fn remove_artifact(path: &Path) -> std::result::Result<bool, PersistError> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(source) => {
            return Err(PersistError::ReadFile {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let removed = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    removed.map_err(|source| PersistError::RemoveFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}
