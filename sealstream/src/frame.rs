//! Stream-level framing.
//!
//! Two kinds of units cross the wire:
//!
//! - Handshake messages, each a fixed number of bytes known from the
//!   protocol step (`MessageKind::wire_len`). They are read with an exact
//!   length and carry no prefix.
//! - Application frames, laid out as
//!
//! ```text
//! +------------------------+---------- variable ----------+
//! | length (8B, LE u64)    | ciphertext (IV || CBC blocks) |
//! +------------------------+-------------------------------+
//! ```
//!
//! A stream that ends exactly on a unit boundary is a clean close
//! (`ConnectionClosed`); one that ends inside a unit is `Truncated`.

use bytes::{BufMut, Bytes, BytesMut};
use sealtrust::handshake::messages::{Begin, HandshakeMessage, MessageKind, Response1, Response2};
use sealtrust::SealTrustError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Result, SealStreamError};

/// Width of the application frame length prefix.
pub const LENGTH_PREFIX_LEN: usize = 8;

/// One encrypted application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub ciphertext: Bytes,
}

impl Frame {
    pub fn new(ciphertext: impl Into<Bytes>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
        }
    }

    /// Total bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        LENGTH_PREFIX_LEN + self.ciphertext.len()
    }

    /// Encode this frame into a `Bytes` buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode into a pre-allocated `BytesMut`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.ciphertext.len() as u64);
        buf.put_slice(&self.ciphertext);
    }

    /// Decode one complete frame from `data`, returning it with the number
    /// of bytes consumed. Trailing bytes after the frame are left alone.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        ensure_len(data, LENGTH_PREFIX_LEN, "frame length prefix")?;
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&data[..LENGTH_PREFIX_LEN]);
        let declared = u64::from_le_bytes(prefix);
        let total = usize::try_from(declared)
            .ok()
            .and_then(|body_len| body_len.checked_add(LENGTH_PREFIX_LEN))
            .ok_or(SealStreamError::FrameTooLarge {
                size: declared,
                max: usize::MAX - LENGTH_PREFIX_LEN,
            })?;
        ensure_len(data, total, "frame body")?;
        let frame = Frame::new(Bytes::copy_from_slice(&data[LENGTH_PREFIX_LEN..total]));
        Ok((frame, total))
    }
}

fn ensure_len(data: &[u8], needed: usize, context: &'static str) -> Result<()> {
    if data.len() < needed {
        Err(SealStreamError::Truncated {
            context,
            expected: needed,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}

/// 8-byte little-endian length || ciphertext.
pub fn encode_frame(ciphertext: &[u8]) -> Bytes {
    Frame::new(Bytes::copy_from_slice(ciphertext)).encode()
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
/// Returns the number of bytes read.
async fn read_up_to<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read exactly `len` bytes. End of stream before the first byte is a clean
/// close; end of stream after it is a truncation.
async fn read_exact_unit<R>(reader: &mut R, len: usize, context: &'static str) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; len];
    let got = read_up_to(reader, &mut buf).await?;
    match got {
        n if n == len => Ok(buf),
        0 if len > 0 => Err(SealStreamError::ConnectionClosed),
        n => Err(SealStreamError::Truncated {
            context,
            expected: len,
            actual: n,
        }),
    }
}

/// Read one application frame and return its ciphertext.
///
/// A declared length above `max_len` is rejected before any allocation.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let prefix = read_exact_unit(reader, LENGTH_PREFIX_LEN, "frame length prefix").await?;
    let mut raw = [0u8; LENGTH_PREFIX_LEN];
    raw.copy_from_slice(&prefix);
    let declared = u64::from_le_bytes(raw);
    if declared > max_len as u64 {
        return Err(SealStreamError::FrameTooLarge {
            size: declared,
            max: max_len,
        });
    }
    // declared <= max_len, so it fits in usize.
    let body_len = declared as usize;
    let mut body = vec![0u8; body_len];
    let got = read_up_to(reader, &mut body).await?;
    if got != body_len {
        return Err(SealStreamError::Truncated {
            context: "frame body",
            expected: body_len,
            actual: got,
        });
    }
    trace!(len = body_len, "frame read");
    Ok(Bytes::from(body))
}

/// Write one application frame and flush.
pub async fn write_frame<W>(writer: &mut W, ciphertext: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_frame(ciphertext);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    trace!(len = ciphertext.len(), "frame written");
    Ok(())
}

// ── Handshake messages ───────────────────────────────────────────────────

/// Read the handshake message the current step expects.
pub async fn read_handshake<R>(reader: &mut R, kind: MessageKind) -> Result<HandshakeMessage>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let bytes = read_exact_unit(reader, kind.wire_len(), kind.label()).await?;
    trace!(message = kind.label(), len = bytes.len(), "handshake message read");
    Ok(HandshakeMessage::decode(kind, &bytes)?)
}

/// Write one handshake message as a single unit and flush.
pub async fn write_handshake<W>(writer: &mut W, message: &HandshakeMessage) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = message.encode();
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    trace!(message = message.kind().label(), len = bytes.len(), "handshake message written");
    Ok(())
}

pub async fn read_begin<R>(reader: &mut R) -> Result<Begin>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match read_handshake(reader, MessageKind::Begin).await? {
        HandshakeMessage::Begin(m) => Ok(m),
        other => Err(unexpected(MessageKind::Begin, &other)),
    }
}

pub async fn read_response1<R>(reader: &mut R) -> Result<Response1>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match read_handshake(reader, MessageKind::Response1).await? {
        HandshakeMessage::Response1(m) => Ok(m),
        other => Err(unexpected(MessageKind::Response1, &other)),
    }
}

pub async fn read_response2<R>(reader: &mut R) -> Result<Response2>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match read_handshake(reader, MessageKind::Response2).await? {
        HandshakeMessage::Response2(m) => Ok(m),
        other => Err(unexpected(MessageKind::Response2, &other)),
    }
}

fn unexpected(expected: MessageKind, got: &HandshakeMessage) -> SealStreamError {
    SealTrustError::Malformed {
        context: expected.label(),
        expected: expected.wire_len(),
        actual: got.kind().wire_len(),
    }
    .into()
}
