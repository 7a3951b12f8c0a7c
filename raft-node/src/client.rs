use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;

use raft_core::codec::{ClientRequest, Message, Payload, Peer, StatusRequest, StatusResponse};
use raft_core::Connection;

use crate::error::{Error, Result};

/// A one-shot wire client for a single node: submit commands to it and read
/// its status. Commands only land while the target is the current leader;
/// callers pick another node when they get `false` back.
pub struct Client {
    target: Peer,
    from: Peer,
    timeout: Duration,
}

impl Client {
    pub fn new(target: Peer) -> Client {
        Client {
            target,
            from: Peer::new("127.0.0.1", 0),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Client {
        self.timeout = timeout;
        self
    }

    /// Submits a command for replication. Returns whether the target
    /// accepted it as leader.
    pub async fn submit(&self, command: &str) -> Result<bool> {
        let request = Message::new(
            Payload::ClientRequest(ClientRequest {
                command: command.to_string(),
            }),
            self.from.clone(),
        );
        match self.exchange(&request).await? {
            Some(Message {
                payload: Payload::ClientResponse(resp),
                ..
            }) => Ok(resp.success),
            reply => Err(unexpected(&self.target, reply)),
        }
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let request = Message::new(
            Payload::StatusRequest(StatusRequest {}),
            self.from.clone(),
        );
        match self.exchange(&request).await? {
            Some(Message {
                payload: Payload::StatusResponse(resp),
                ..
            }) => Ok(resp),
            reply => Err(unexpected(&self.target, reply)),
        }
    }

    async fn exchange(&self, request: &Message) -> Result<Option<Message>> {
        let exchange = async {
            let socket = TcpStream::connect((self.target.host(), self.target.port())).await?;
            let mut connection = Connection::new(socket);
            connection
                .write_message(request)
                .await
                .map_err(|err| Error::Internal(err.to_string()))?;
            connection
                .read_message()
                .await
                .map_err(|err| Error::Internal(err.to_string()))
        };
        time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Internal(format!("request to {} timed out", self.target)))?
    }
}

fn unexpected(target: &Peer, reply: Option<Message>) -> Error {
    match reply {
        Some(message) => Error::Internal(format!(
            "unexpected {} reply from {}",
            message.payload.kind(),
            target
        )),
        None => Error::Internal(format!("no reply from {}", target)),
    }
}
