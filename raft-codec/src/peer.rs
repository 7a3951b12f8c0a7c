use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Host spellings that all name the local machine. Only consulted for
/// identity checks, never for display or map keys.
const LOOPBACK_ALIASES: [&str; 4] = ["127.0.0.1", "localhost", "::1", "0.0.0.0"];

/// A cluster member, identified by host and port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Peer {
    host: String,
    port: u16,
}

impl Peer {
    pub fn new(host: impl Into<String>, port: u16) -> Peer {
        Peer {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stable `"host:port"` identifier, usable as a map key.
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_loopback(&self) -> bool {
        LOOPBACK_ALIASES.contains(&self.host.as_str())
    }
}

/// Equality treats all loopback aliases as the same host. Ports must still
/// match exactly.
impl PartialEq for Peer {
    fn eq(&self, other: &Peer) -> bool {
        if self.port != other.port {
            return false;
        }
        self.host == other.host || (self.is_loopback() && other.is_loopback())
    }
}

impl Eq for Peer {}

impl fmt::Display for Peer {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Peer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Peer, Error> {
        let mut parts = s.rsplitn(2, ':');
        let port = parts
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(|| Error::Malformed(format!("invalid peer address {:?}", s)))?;
        let host = parts
            .next()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Malformed(format!("invalid peer address {:?}", s)))?;
        Ok(Peer::new(host, port))
    }
}
