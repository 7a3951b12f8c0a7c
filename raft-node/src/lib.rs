mod client;
mod config;
mod error;
mod log;
mod node;
mod state;
mod transport;

pub mod server;

pub use client::Client;
pub use config::{ClusterConfig, Timing};
pub use error::{Error, Result};
pub use node::{Node, Status};
pub use server::RaftNode;
pub use state::{Command, CommitCallback, KvStore, StateMachine};
pub use transport::Transport;

pub mod codec {
    pub use raft_core::codec::*;
}
