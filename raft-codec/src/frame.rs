use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::message::Message;

/// Frames longer than this are treated as malformed and drop the connection.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

impl Message {
    /// Parses one length-prefixed message out of `buf`, advancing past the
    /// consumed frame. Returns `Error::Incomplete` until a whole frame
    /// (4-byte big-endian length plus that many body bytes) is buffered.
    pub fn parse(buf: &mut BytesMut) -> Result<Message, Error> {
        if buf.len() < 4 {
            return Err(Error::Incomplete);
        }
        let len = BigEndian::read_u32(&buf[..4]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(Error::InvalidLength(len));
        }
        if buf.len() < 4 + len {
            return Err(Error::Incomplete);
        }
        buf.advance(4);
        let body = buf.split_to(len);
        Message::decode(&body)
    }

    /// Appends the framed encoding of this message to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        let body = serde_json::to_vec(&self.to_wire()?)?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(Error::InvalidLength(body.len()));
        }
        buf.reserve(4 + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        Ok(())
    }

    /// Decodes a single JSON body without the length prefix.
    pub fn decode(body: &[u8]) -> Result<Message, Error> {
        Message::from_wire(serde_json::from_slice(body)?)
    }
}
