use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::time::Instant;

/// Shown instead of a name while metadata is still being fetched.
pub const NAME_PLACEHOLDER: &str = "Fetching metadata...";

/// 160-bit transfer identifier (BitTorrent v1 info-hash).
///
/// Rendered as 40 lower-case hex characters everywhere it leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(pub [u8; 20]);

impl TransferId {
    pub const HEX_LEN: usize = 40;

    /// Accepts upper- or lower-case hex of exactly [`Self::HEX_LEN`] characters.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != Self::HEX_LEN {
            return None;
        }
        let mut out = [0u8; 20];
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            out[i] = ((hi << 4) | lo) as u8;
        }
        Some(Self(out))
    }

    pub fn to_hex_lower(self) -> String {
        let mut s = String::with_capacity(Self::HEX_LEN);
        for b in self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex_lower())
    }
}

impl Serialize for TransferId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex_lower())
    }
}

impl<'de> Deserialize<'de> for TransferId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid transfer id '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Fetching,
    Downloading,
    Paused,
    Completing,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completing => "completing",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: TransferId,
    pub source_uri: String,
    pub display_name: Option<String>,
    /// Name carried over from a snapshot. Display only; does not count as metadata.
    pub restored_name: Option<String>,
    pub state: SessionState,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub download_rate_bps: u64,
    pub peer_count: u32,
    pub created_at: Instant,
    /// Set when metadata arrives.
    pub started_at: Option<Instant>,
    pub retry_count: u8,
    pub metadata_deadline: Option<Instant>,
    pub(crate) seq: u64,
}

impl Session {
    pub fn new(id: TransferId, source_uri: String, now: Instant) -> Self {
        Self {
            id,
            source_uri,
            display_name: None,
            restored_name: None,
            state: SessionState::Fetching,
            total_bytes: 0,
            downloaded_bytes: 0,
            download_rate_bps: 0,
            peer_count: 0,
            created_at: now,
            started_at: None,
            retry_count: 0,
            metadata_deadline: None,
            seq: 0,
        }
    }

    /// Fraction in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.state == SessionState::Completing {
            return 1.0;
        }
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.downloaded_bytes as f64 / self.total_bytes as f64).min(1.0)
    }

    pub fn is_paused(&self) -> bool {
        self.state == SessionState::Paused
    }

    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.restored_name.as_deref())
            .unwrap_or(NAME_PLACEHOLDER)
    }

    /// Estimated seconds left at the current rate; `None` when it cannot be estimated.
    pub fn eta_secs(&self) -> Option<u64> {
        if self.download_rate_bps == 0 || self.total_bytes == 0 {
            return None;
        }
        let left = self.total_bytes.saturating_sub(self.downloaded_bytes);
        Some(left / self.download_rate_bps)
    }

    /// Time since the download effectively began (or since creation before metadata).
    pub fn running_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.started_at.unwrap_or(self.created_at))
    }
}
