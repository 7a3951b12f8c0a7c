use crate::Result;
use bytes::BytesMut;
use raft_codec::{Error, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

/// A framed message stream over one TCP socket.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Reads a single message. Returns `None` on a clean end of stream; an
    /// end of stream in the middle of a frame is an error for this
    /// connection only.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        loop {
            match Message::parse(&mut self.buffer) {
                Ok(message) => return Ok(Some(message)),
                Err(Error::Incomplete) => {}
                Err(e) => return Err(e.into()),
            }

            // Not enough buffered data for a frame. Attempt to read more
            // from the socket; `0` indicates end of stream.
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err("connection reset by peer".into())
                };
            }
        }
    }

    /// Writes a single framed message and flushes it.
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        let mut buf = BytesMut::new();
        message.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
