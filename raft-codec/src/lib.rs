mod append;
mod command;
mod error;
mod frame;
mod message;
mod peer;
mod vote;

pub use append::{AppendEntriesRequest, AppendEntriesResponse, Entry};
pub use command::{ClientRequest, ClientResponse, StatusRequest, StatusResponse};
pub use error::Error;
pub use frame::MAX_FRAME_SIZE;
pub use message::{Message, Payload};
pub use peer::Peer;
pub use vote::{VoteRequest, VoteResponse};
