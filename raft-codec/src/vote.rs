use serde_derive::{Deserialize, Serialize};

/// A candidate soliciting a vote. `last_log_index` is -1 and
/// `last_log_term` is 0 when the candidate's log is empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: String,
    pub last_log_index: i64,
    pub last_log_term: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

#[cfg(test)]
mod test {
    use crate::{Message, Payload, Peer, VoteRequest, VoteResponse};
    use bytes::BytesMut;

    #[test]
    fn test_vote_request_roundtrip() {
        let message = Message::new(
            Payload::VoteRequest(VoteRequest {
                term: 3,
                candidate_id: "127.0.0.1:5001".to_string(),
                last_log_index: -1,
                last_log_term: 0,
            }),
            Peer::new("127.0.0.1", 5001),
        );
        let mut buf = BytesMut::new();
        message.encode(&mut buf).unwrap();
        assert_eq!(message, Message::parse(&mut buf).unwrap());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_vote_response_roundtrip() {
        let message = Message::new(
            Payload::VoteResponse(VoteResponse {
                term: 3,
                vote_granted: true,
            }),
            Peer::new("localhost", 5002),
        );
        let mut buf = BytesMut::new();
        message.encode(&mut buf).unwrap();
        assert_eq!(message, Message::parse(&mut buf).unwrap());
    }
}
