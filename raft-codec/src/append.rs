use serde_derive::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A replicated log entry. `index` is the 0-based position in the log and
/// `timestamp` (seconds since the Unix epoch) is informational only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub term: u64,
    pub index: i64,
    pub command: String,
    pub timestamp: f64,
}

impl Entry {
    /// Creates an entry stamped with the current wall clock.
    pub fn new(term: u64, index: i64, command: impl Into<String>) -> Entry {
        Entry {
            term,
            index,
            command: command.into(),
            timestamp: unix_time(),
        }
    }
}

fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

/// Leader-to-follower replication. An empty `entries` batch is a heartbeat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: String,
    pub prev_log_index: i64,
    pub prev_log_term: u64,
    pub entries: Vec<Entry>,
    pub leader_commit: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
    /// Highest index now known replicated on the responder, or -1.
    #[serde(default = "missing_match_index")]
    pub match_index: i64,
}

fn missing_match_index() -> i64 {
    -1
}
