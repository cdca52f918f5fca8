use crate::session::{Session, SessionError, TransferId};
use std::collections::HashMap;
use tokio::time::Instant;

pub type Result<T> = std::result::Result<T, SessionError>;

/// Registry of active sessions. At most one session per transfer id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<TransferId, Session>,
    next_seq: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `Fetching` session. `engine_knows` reports whether the id is already
    /// held elsewhere (engine table, pending retry or restore); such ids are duplicates.
    pub fn create(
        &mut self,
        id: TransferId,
        source_uri: String,
        engine_knows: bool,
        now: Instant,
    ) -> Result<&mut Session> {
        if engine_knows || self.sessions.contains_key(&id) {
            return Err(SessionError::Duplicate(id));
        }
        let mut session = Session::new(id, source_uri, now);
        session.seq = self.next_seq;
        self.next_seq += 1;
        Ok(self.sessions.entry(id).or_insert(session))
    }

    pub fn get(&self, id: TransferId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: TransferId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn contains(&self, id: TransferId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn remove(&mut self, id: TransferId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Sessions in creation order.
    pub fn list(&self) -> Vec<&Session> {
        let mut out: Vec<&Session> = self.sessions.values().collect();
        out.sort_by_key(|s| s.seq);
        out
    }

    pub fn ids(&self) -> Vec<TransferId> {
        self.list().into_iter().map(|s| s.id).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    fn id(b: u8) -> TransferId {
        TransferId([b; 20])
    }

    #[test]
    fn create_starts_in_fetching_and_rejects_duplicates() {
        let mut store = SessionStore::new();
        let now = Instant::now();
        let s = store
            .create(id(1), "magnet:?a".to_string(), false, now)
            .expect("create");
        assert_eq!(s.state, SessionState::Fetching);
        assert_eq!(s.retry_count, 0);

        let err = store
            .create(id(1), "magnet:?a".to_string(), false, now)
            .expect_err("duplicate");
        assert!(matches!(err, SessionError::Duplicate(d) if d == id(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn create_rejects_ids_known_elsewhere() {
        let mut store = SessionStore::new();
        let err = store
            .create(id(2), "magnet:?b".to_string(), true, Instant::now())
            .expect_err("engine knows");
        assert!(matches!(err, SessionError::Duplicate(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn list_keeps_creation_order_after_removal() {
        let mut store = SessionStore::new();
        let now = Instant::now();
        for b in [5u8, 3, 9, 1] {
            store
                .create(id(b), format!("magnet:?{b}"), false, now)
                .expect("create");
        }
        assert!(store.remove(id(9)).is_some());
        assert!(store.remove(id(9)).is_none());
        assert_eq!(store.ids(), vec![id(5), id(3), id(1)]);

        store
            .create(id(9), "magnet:?again".to_string(), false, now)
            .expect("recreate");
        assert_eq!(store.ids(), vec![id(5), id(3), id(1), id(9)]);
    }
}
