pub mod bridge;
pub mod errors;
pub mod ledger;
pub mod magnet;
pub mod persist;
pub mod reaper;
pub mod retry;
pub mod service;
pub mod status;
pub mod store;
pub mod timers;
pub mod types;

pub use errors::{PersistError, SessionError};
pub use ledger::{CompletedLedger, CompletedRecord};
pub use persist::{PersistedSession, PersistedState, RestartIntent};
pub use service::{
    ControlAction, SessionCommand, SessionServiceConfig, SessionServiceHandle, join_service,
    start_service,
};
pub use status::{AggregateStatus, NoticeKind, ServiceEvent, SessionNotice, SessionStatus};
pub use store::SessionStore;
pub use types::{Session, SessionState, TransferId};
