use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

use raft_core::codec::{Message, Peer};
use raft_core::Connection;

/// Dial-per-request message exchange with the rest of the cluster.
///
/// Every outbound RPC opens a fresh connection, writes one framed message,
/// reads at most one framed reply and closes, all under a single deadline.
/// Transient failures of any kind are absorbed; callers observe them as an
/// absent reply.
#[derive(Clone, Debug)]
pub struct Transport {
    listen: Peer,
    rpc_timeout: Duration,
}

impl Transport {
    pub fn new(listen: Peer, rpc_timeout: Duration) -> Transport {
        Transport {
            listen,
            rpc_timeout,
        }
    }

    /// True iff `peer` addresses this node's own listener. Peer equality
    /// already folds loopback aliases together.
    pub fn is_self(&self, peer: &Peer) -> bool {
        *peer == self.listen
    }

    /// Sends one request and waits for its reply. `None` on refusal,
    /// timeout, reset, or a malformed response.
    pub async fn send_with_response(&self, peer: &Peer, message: &Message) -> Option<Message> {
        match time::timeout(self.rpc_timeout, self.exchange(peer, message)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                debug!("rpc to {} failed: {}", peer, err);
                None
            }
            Err(_) => {
                debug!("rpc to {} timed out", peer);
                None
            }
        }
    }

    async fn exchange(&self, peer: &Peer, message: &Message) -> raft_core::Result<Option<Message>> {
        let socket = TcpStream::connect((peer.host(), peer.port())).await?;
        let mut connection = Connection::new(socket);
        connection.write_message(message).await?;
        connection.read_message().await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_self_folds_loopback() {
        let transport = Transport::new(Peer::new("127.0.0.1", 5001), Duration::from_secs(5));
        assert!(transport.is_self(&Peer::new("localhost", 5001)));
        assert!(transport.is_self(&Peer::new("0.0.0.0", 5001)));
        assert!(!transport.is_self(&Peer::new("localhost", 5002)));
        assert!(!transport.is_self(&Peer::new("192.168.1.4", 5001)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_absorbed() {
        let transport = Transport::new(Peer::new("127.0.0.1", 1), Duration::from_millis(250));
        let message = Message::new(
            raft_core::codec::Payload::StatusRequest(raft_core::codec::StatusRequest {}),
            Peer::new("127.0.0.1", 1),
        );
        // Port 9 on loopback has no listener in the test environment.
        let reply = transport
            .send_with_response(&Peer::new("127.0.0.1", 9), &message)
            .await;
        assert!(reply.is_none());
    }
}
