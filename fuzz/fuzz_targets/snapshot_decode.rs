#![no_main]

use libfuzzer_sys::fuzz_target;
use rust_swarm::session::{PersistedState, persist::restart_intents};
use std::time::Duration;

fuzz_target!(|data: &[u8]| {
    if let Ok(state) = serde_json::from_slice::<PersistedState>(data) {
        let intents = restart_intents(&state, Duration::from_millis(1000));
        assert!(intents.len() <= state.active_sessions.len());
    }
});
