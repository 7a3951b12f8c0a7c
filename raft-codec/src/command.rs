use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

/// A command submitted by an external client. Accepted only by the leader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub command: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    pub success: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRequest {}

/// A point-in-time readout of one node, including a copy of its key-value
/// contents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub state: String,
    pub term: u64,
    pub voted_for: Option<String>,
    pub log_length: u64,
    pub commit_index: i64,
    pub last_applied: i64,
    pub state_machine: HashMap<String, String>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Message, Payload, Peer};
    use bytes::BytesMut;

    #[test]
    fn test_client_roundtrip() {
        for payload in vec![
            Payload::ClientRequest(ClientRequest {
                command: "SET name Alice".to_string(),
            }),
            Payload::ClientResponse(ClientResponse { success: false }),
        ] {
            let message = Message::new(payload, Peer::new("127.0.0.1", 0));
            let mut buf = BytesMut::new();
            message.encode(&mut buf).unwrap();
            assert_eq!(message, Message::parse(&mut buf).unwrap());
        }
    }

    #[test]
    fn test_status_roundtrip() {
        let mut state_machine = HashMap::new();
        state_machine.insert("name".to_string(), "Alice".to_string());
        for payload in vec![
            Payload::StatusRequest(StatusRequest {}),
            Payload::StatusResponse(StatusResponse {
                state: "leader".to_string(),
                term: 7,
                voted_for: Some("127.0.0.1:5001".to_string()),
                log_length: 3,
                commit_index: 2,
                last_applied: 2,
                state_machine,
            }),
        ] {
            let message = Message::new(payload, Peer::new("127.0.0.1", 5001));
            let mut buf = BytesMut::new();
            message.encode(&mut buf).unwrap();
            assert_eq!(message, Message::parse(&mut buf).unwrap());
        }
    }
}
