//! Wire protocol for client-server chat messages.
//!
//! Messages are newline-delimited UTF-8 text: one `\n`-terminated line per
//! message, payload capped at [`MAX_MESSAGE_LEN`] bytes. Line framing keeps
//! sessions debuggable with netcat-style tools.

use thiserror::Error;

/// Maximum message payload length in bytes, excluding the delimiter.
///
/// Also sizes the terminal input buffer, so anything the user can finish
/// typing is guaranteed to fit on the wire.
pub const MAX_MESSAGE_LEN: usize = 512;

/// Input line that ends the session locally. Never sent to the server.
pub const EXIT_COMMAND: &str = "/exit";

/// Message sent in place of an empty input line.
pub const DEFAULT_MESSAGE: &str = "Hello world!";

/// Errors raised by the codec.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The underlying stream failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    /// A message exceeds [`MAX_MESSAGE_LEN`].
    #[error("message too long: {len} bytes (limit {MAX_MESSAGE_LEN})")]
    MessageTooLong {
        /// Observed payload length.
        len: usize,
    },
    /// An inbound message is not valid UTF-8.
    #[error("inbound message is not valid UTF-8")]
    InvalidUtf8,
}

/// One decoded read from the server.
///
/// An orderly close is its own variant rather than a zero-length payload, so
/// callers never have to guess what an empty string means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A chat message payload.
    Message(String),
    /// The remote end closed the connection.
    Disconnected,
}

/// Framing for messages: one UTF-8 line per message, `\n` delimited.
pub mod framing {
    use super::{Inbound, ProtocolError, MAX_MESSAGE_LEN};
    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Write a single message and flush it to the peer.
    pub async fn write_message<W>(writer: &mut W, text: &str) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        if text.len() > MAX_MESSAGE_LEN {
            return Err(ProtocolError::MessageTooLong { len: text.len() });
        }
        writer.write_all(text.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read the next message, or [`Inbound::Disconnected`] on orderly close.
    ///
    /// A final line missing its delimiter (peer closed mid-line) is still
    /// delivered; the following read reports the close.
    pub async fn read_message<R>(reader: &mut R) -> Result<Inbound, ProtocolError>
    where
        R: AsyncBufRead + Unpin,
    {
        // +2 leaves room for a \r\n delimiter on a full-length payload.
        let limit = (MAX_MESSAGE_LEN + 2) as u64;
        let mut line = Vec::new();
        let bytes = (&mut *reader).take(limit).read_until(b'\n', &mut line).await?;
        if bytes == 0 {
            return Ok(Inbound::Disconnected);
        }

        let delimited = line.last() == Some(&b'\n');
        if !delimited && bytes == limit as usize {
            return Err(ProtocolError::MessageTooLong { len: line.len() });
        }
        if delimited {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        if line.len() > MAX_MESSAGE_LEN {
            return Err(ProtocolError::MessageTooLong { len: line.len() });
        }

        let text = String::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(Inbound::Message(text))
    }
}
