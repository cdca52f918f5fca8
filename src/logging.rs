//! Rate limiting for warnings that can repeat once per event or per frame.

use std::{
    collections::HashMap,
    sync::{LazyLock, Mutex, PoisonError},
    time::{Duration, Instant},
};

struct Gate {
    opened_at: Instant,
    swallowed: u64,
}

static GATES: LazyLock<Mutex<HashMap<&'static str, Gate>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Returns `true` when the caller should emit its warning for `key`. Calls inside
/// `interval` of the last emitted one are counted, and the count is logged the next
/// time the key is let through.
pub fn warn_throttled(key: &'static str, interval: Duration) -> bool {
    match admit(key, interval, Instant::now()) {
        Some(0) => true,
        Some(swallowed) => {
            tracing::warn!(key, swallowed, "repeated warnings were suppressed");
            true
        }
        None => false,
    }
}

/// `Some(n)` when the gate for `key` is open, `n` being the calls swallowed since it
/// last opened; `None` while it is closed.
fn admit(key: &'static str, interval: Duration, now: Instant) -> Option<u64> {
    let mut gates = GATES.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(gate) = gates.get_mut(key) else {
        gates.insert(
            key,
            Gate {
                opened_at: now,
                swallowed: 0,
            },
        );
        return Some(0);
    };
    if now.saturating_duration_since(gate.opened_at) < interval {
        gate.swallowed += 1;
        return None;
    }
    gate.opened_at = now;
    Some(std::mem::take(&mut gate.swallowed))
}
