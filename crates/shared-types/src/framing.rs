//! # Record Framing
//!
//! `[4 bytes: length (big-endian u32)][N bytes: encoded BusEvent]`
//!
//! Used by the replay log and by the TCP transport, which both need to carry
//! whole envelopes over a byte stream. No checksum, no index.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{BusError, BusResult};

/// Largest record accepted on read or write.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Prefix `payload` with its big-endian length.
pub fn encode_frame(payload: &[u8]) -> BusResult<Vec<u8>> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(BusError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream at a record boundary.
pub async fn read_frame<R>(reader: &mut R) -> BusResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(BusError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> BusResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
