//! Wire protocol for client-server communication.
//!
//! The protocol is binary and self-delimiting: unsigned varints carry every
//! length and flag, strings are varint-length-prefixed UTF-8, and each
//! connection turn is exactly one request frame followed by one response
//! frame.

use crate::error::{IpcError, Result};

/// Request sent from client to server: an ordered sequence of argument
/// strings. Order and count are preserved exactly as given by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Argument strings, in transmission order.
    pub args: Vec<String>,
}

impl Message {
    /// Create a message from any sequence of string-likes.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Response sent from server to client: a success flag and a single payload
/// string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Whether the server considers the call to have succeeded.
    pub success: bool,
    /// Human-readable or machine-parseable payload.
    pub text: String,
}

impl Response {
    /// Create a successful response.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    /// Create a failed response.
    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

/// Frame encoding and decoding.
///
/// Varints are little-endian base-128: 7 payload bits per byte, least
/// significant group first, 0x80 set on every byte except the last. A string
/// is `varint(byte_len)` followed by raw UTF-8. A message is
/// `varint(arg_count)` followed by its strings; a response is
/// `varint(success)` followed by one string.
///
/// Every function here reads or writes exactly one full logical frame. A
/// stream that ends mid-frame surfaces as [`IpcError::Transport`], never as a
/// partial value.
pub mod wire {
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    use super::{IpcError, Message, Response, Result};

    const CONTINUATION_BIT: u8 = 0x80;
    const PAYLOAD_MASK: u8 = 0x7F;

    /// Write an unsigned varint.
    pub async fn write_varint<W>(writer: &mut W, mut value: u64) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        // 10 bytes cover the full u64 range.
        let mut buf = [0u8; 10];
        let mut len = 0;
        loop {
            let low = (value as u8) & PAYLOAD_MASK;
            value >>= 7;
            buf[len] = if value != 0 { low | CONTINUATION_BIT } else { low };
            len += 1;
            if value == 0 {
                break;
            }
        }
        writer.write_all(&buf[..len]).await?;
        Ok(())
    }

    /// Read an unsigned varint.
    pub async fn read_varint<R>(reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = reader.read_u8().await?;
            let payload = byte & PAYLOAD_MASK;
            if shift >= 64 || (shift == 63 && payload > 1) {
                return Err(IpcError::Malformed("varint exceeds 64 bits".into()));
            }
            value |= u64::from(payload) << shift;
            if byte & CONTINUATION_BIT == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Write a length-prefixed UTF-8 string.
    pub async fn write_string<W>(writer: &mut W, s: &str) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let bytes = s.as_bytes();
        write_varint(writer, bytes.len() as u64).await?;
        writer.write_all(bytes).await?;
        Ok(())
    }

    /// Read a length-prefixed UTF-8 string.
    pub async fn read_string<R>(reader: &mut R) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let len = read_varint(reader).await?;
        // The declared length is remote input; the buffer grows as bytes
        // arrive instead of being allocated up front.
        let mut buf = Vec::new();
        (&mut *reader).take(len).read_to_end(&mut buf).await?;
        if (buf.len() as u64) < len {
            return Err(IpcError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed unexpectedly while reading",
            )));
        }
        String::from_utf8(buf)
            .map_err(|_| IpcError::Malformed("string payload is not valid UTF-8".into()))
    }

    /// Write one complete request frame and flush it.
    pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        write_varint(writer, message.args.len() as u64).await?;
        for arg in &message.args {
            write_string(writer, arg).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Read one complete request frame.
    pub async fn read_message<R>(reader: &mut R) -> Result<Message>
    where
        R: AsyncRead + Unpin,
    {
        let count = read_varint(reader).await?;
        let count = usize::try_from(count)
            .map_err(|_| IpcError::Malformed(format!("message count {count} is out of range")))?;
        let mut args = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            args.push(read_string(reader).await?);
        }
        Ok(Message { args })
    }

    /// Write one complete response frame and flush it.
    pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        write_varint(writer, u64::from(response.success)).await?;
        write_string(writer, &response.text).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one complete response frame. Any nonzero flag reads as success.
    pub async fn read_response<R>(reader: &mut R) -> Result<Response>
    where
        R: AsyncRead + Unpin,
    {
        let success = read_varint(reader).await? != 0;
        let text = read_string(reader).await?;
        Ok(Response { success, text })
    }
}
