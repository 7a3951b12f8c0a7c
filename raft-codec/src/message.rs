use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::append::{AppendEntriesRequest, AppendEntriesResponse};
use crate::command::{ClientRequest, ClientResponse, StatusRequest, StatusResponse};
use crate::error::Error;
use crate::peer::Peer;
use crate::vote::{VoteRequest, VoteResponse};

/// One message between peers: a typed payload plus the sender's identity.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub payload: Payload,
    pub sender: Peer,
}

impl Message {
    pub fn new(payload: Payload, sender: Peer) -> Message {
        Message { payload, sender }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    AppendEntries(AppendEntriesRequest),
    AppendResponse(AppendEntriesResponse),
    ClientRequest(ClientRequest),
    ClientResponse(ClientResponse),
    StatusRequest(StatusRequest),
    StatusResponse(StatusResponse),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::VoteRequest(_) => "vote_request",
            Payload::VoteResponse(_) => "vote_response",
            Payload::AppendEntries(_) => "append_entries",
            Payload::AppendResponse(_) => "append_response",
            Payload::ClientRequest(_) => "client_request",
            Payload::ClientResponse(_) => "client_response",
            Payload::StatusRequest(_) => "status_request",
            Payload::StatusResponse(_) => "status_response",
        }
    }

    fn to_data(&self) -> Result<Value, Error> {
        let data = match self {
            Payload::VoteRequest(inner) => serde_json::to_value(inner)?,
            Payload::VoteResponse(inner) => serde_json::to_value(inner)?,
            Payload::AppendEntries(inner) => serde_json::to_value(inner)?,
            Payload::AppendResponse(inner) => serde_json::to_value(inner)?,
            Payload::ClientRequest(inner) => serde_json::to_value(inner)?,
            Payload::ClientResponse(inner) => serde_json::to_value(inner)?,
            Payload::StatusRequest(inner) => serde_json::to_value(inner)?,
            Payload::StatusResponse(inner) => serde_json::to_value(inner)?,
        };
        Ok(data)
    }

    fn from_wire(msg_type: &str, data: Value) -> Result<Payload, Error> {
        let payload = match msg_type {
            "vote_request" => Payload::VoteRequest(serde_json::from_value(data)?),
            "vote_response" => Payload::VoteResponse(serde_json::from_value(data)?),
            "append_entries" => Payload::AppendEntries(serde_json::from_value(data)?),
            "append_response" => Payload::AppendResponse(serde_json::from_value(data)?),
            "client_request" => Payload::ClientRequest(serde_json::from_value(data)?),
            "client_response" => Payload::ClientResponse(serde_json::from_value(data)?),
            "status_request" => Payload::StatusRequest(serde_json::from_value(data)?),
            "status_response" => Payload::StatusResponse(serde_json::from_value(data)?),
            other => return Err(Error::UnknownMessageType(other.to_string())),
        };
        Ok(payload)
    }
}

/// The on-the-wire envelope. Top-level keys beyond these three are ignored
/// on decode.
#[derive(Serialize, Deserialize)]
pub(crate) struct WireMessage {
    pub(crate) msg_type: String,
    pub(crate) data: Value,
    pub(crate) sender: Peer,
}

impl Message {
    pub(crate) fn to_wire(&self) -> Result<WireMessage, Error> {
        Ok(WireMessage {
            msg_type: self.payload.kind().to_string(),
            data: self.payload.to_data()?,
            sender: self.sender.clone(),
        })
    }

    pub(crate) fn from_wire(wire: WireMessage) -> Result<Message, Error> {
        Ok(Message {
            payload: Payload::from_wire(&wire.msg_type, wire.data)?,
            sender: wire.sender,
        })
    }
}
