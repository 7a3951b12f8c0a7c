use rand::Rng;
use serde_derive::Deserialize;
use std::time::Duration;

use raft_core::codec::Peer;

use crate::error::{Error, Result};

/// Protocol timing, all in milliseconds. The defaults are the reference
/// values; tests shrink them through this surface to keep cluster
/// scenarios fast.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub rpc_timeout_ms: u64,
}

impl Default for Timing {
    fn default() -> Timing {
        Timing {
            election_timeout_min_ms: 1500,
            election_timeout_max_ms: 3000,
            heartbeat_interval_ms: 500,
            tick_interval_ms: 100,
            rpc_timeout_ms: 5000,
        }
    }
}

impl Timing {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Samples a fresh election timeout from the configured range.
    pub fn random_election_timeout(&self) -> Duration {
        let (min, max) = (self.election_timeout_min_ms, self.election_timeout_max_ms);
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min, max))
    }
}

/// Static cluster membership plus this node's own listen address. Every
/// node in the cluster is started with the same `members` list.
#[derive(Clone, Debug, Deserialize)]
pub struct ClusterConfig {
    /// Address this node listens on; must appear in `members`.
    pub listen: Peer,
    /// All cluster members, this node included.
    pub members: Vec<Peer>,
    #[serde(default)]
    pub timing: Timing,
}

impl ClusterConfig {
    pub fn new(listen: Peer, members: Vec<Peer>) -> ClusterConfig {
        ClusterConfig {
            listen,
            members,
            timing: Timing::default(),
        }
    }

    /// Loads a configuration file in any format the config crate detects
    /// from the extension.
    pub fn load(path: &str) -> Result<ClusterConfig> {
        let mut settings = config::Config::new();
        settings.merge(config::File::with_name(path))?;
        let cluster: ClusterConfig = settings.try_into()?;
        cluster.validate()?;
        Ok(cluster)
    }

    pub fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(Error::Config("cluster has no members".to_string()));
        }
        if !self.members.iter().any(|member| *member == self.listen) {
            return Err(Error::Config(format!(
                "listen address {} is not a cluster member",
                self.listen
            )));
        }
        if self.timing.election_timeout_min_ms == 0
            || self.timing.election_timeout_max_ms < self.timing.election_timeout_min_ms
        {
            return Err(Error::Config("invalid election timeout range".to_string()));
        }
        Ok(())
    }

    /// Smallest number of members that constitutes a quorum.
    pub fn majority(&self) -> usize {
        self.members.len() / 2 + 1
    }
}
