use std::collections::HashMap;

use tracing::debug;

use raft_core::codec::Entry;

/// Callback invoked for every committed entry as it is applied, in index
/// order.
pub type CommitCallback = Box<dyn Fn(&Entry) + Send>;

/// A deterministic state machine fed committed log entries in index order.
/// Implementations must be pure functions of the entry sequence.
pub trait StateMachine: Send {
    fn apply(&mut self, entry: &Entry);

    /// A copy of the observable key-value contents, for status reporting.
    fn snapshot(&self) -> HashMap<String, String>;
}

/// A parsed state machine command. The command language lives here so the
/// role engine never looks inside a command string.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Set { key: String, value: String },
    Get { key: String },
    /// Anything unrecognized. Applied as a no-op, never an error.
    Noop,
}

impl Command {
    pub fn parse(raw: &str) -> Command {
        if let Some(rest) = raw.strip_prefix("SET ") {
            let mut parts = rest.splitn(2, ' ');
            match (parts.next(), parts.next()) {
                (Some(key), Some(value)) => Command::Set {
                    key: key.to_string(),
                    value: value.to_string(),
                },
                _ => Command::Noop,
            }
        } else if let Some(key) = raw.strip_prefix("GET ") {
            Command::Get {
                key: key.to_string(),
            }
        } else {
            Command::Noop
        }
    }
}

/// The default key-value store.
#[derive(Debug, Default)]
pub struct KvStore {
    data: HashMap<String, String>,
}

impl KvStore {
    pub fn new() -> KvStore {
        KvStore {
            data: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.data.get(key)
    }
}

impl StateMachine for KvStore {
    fn apply(&mut self, entry: &Entry) {
        match Command::parse(&entry.command) {
            Command::Set { key, value } => {
                debug!("applied SET {} = {}", key, value);
                self.data.insert(key, value);
            }
            // Reads mutate nothing; their result is observable through the
            // commit callback.
            Command::Get { .. } | Command::Noop => {}
        }
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.data.clone()
    }
}
