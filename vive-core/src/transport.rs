//! Frame transport: whole length-prefixed frames over an async byte stream.
//!
//! Readers report a stream that closes before a full frame arrives (at the prefix or
//! mid-payload) as end of stream; the protocol cannot resynchronize, so both cases mean the
//! connection is done. No retries here: reconnecting is the caller's job.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::wire::{self, LEN_SIZE};

/// Socket-level failure. The connection must be treated as dead.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("frame too large: {len} bytes (max {max})")]
    TooLarge { len: u64, max: u64 },
    #[error("timed out waiting for frame")]
    TimedOut,
}

/// Write `payload` as one frame: a single buffered write of prefix + payload, then flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Prefix + payload in one buffer.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    wire::prefix_payload(payload).ok_or(TransportError::TooLarge {
        len: payload.len() as u64,
        max: u32::MAX as u64,
    })
}

/// Read one frame. `Ok(None)` is end of stream.
pub async fn read_frame<R>(reader: &mut R, max_len: u32) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LEN_SIZE];
    if !read_full(reader, &mut header).await? {
        return Ok(None);
    }
    let len = wire::frame_len(header);
    if len > max_len {
        return Err(TransportError::TooLarge {
            len: len as u64,
            max: max_len as u64,
        });
    }
    let mut payload = vec![0u8; len as usize];
    if !read_full(reader, &mut payload).await? {
        return Ok(None);
    }
    Ok(Some(payload))
}

/// `read_frame` with an optional deadline for the whole frame.
pub async fn read_frame_timeout<R>(
    reader: &mut R,
    max_len: u32,
    timeout: Option<Duration>,
) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, read_frame(reader, max_len))
            .await
            .map_err(|_| TransportError::TimedOut)?,
        None => read_frame(reader, max_len).await,
    }
}

/// Fill `buf` completely. Returns false if the stream closed first.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool, TransportError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn frames_of_mixed_sizes_arrive_in_order() {
        let payloads: Vec<Vec<u8>> = [0usize, 1, 65535, 1 << 20]
            .iter()
            .map(|&n| (0..n).map(|i| (i % 251) as u8).collect())
            .collect();
        let (mut client, mut server) = duplex(64 * 1024);
        let to_send = payloads.clone();
        let writer = tokio::spawn(async move {
            for p in &to_send {
                write_frame(&mut client, p).await.unwrap();
            }
        });
        for expected in &payloads {
            let got = read_frame(&mut server, wire::DEFAULT_MAX_FRAME_LEN)
                .await
                .unwrap()
                .expect("frame");
            assert_eq!(&got, expected);
        }
        writer.await.unwrap();
        // Writer half dropped: clean end of stream.
        assert!(read_frame(&mut server, wire::DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn prefix_without_payload_is_end_of_stream() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&16u32.to_be_bytes()).await.unwrap();
        drop(client);
        let got = read_frame(&mut server, wire::DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn partial_prefix_is_end_of_stream() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0, 0]).await.unwrap();
        drop(client);
        assert!(read_frame(&mut server, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_payload_is_end_of_stream() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&8u32.to_be_bytes()).await.unwrap();
        client.write_all(&[1, 2, 3]).await.unwrap();
        drop(client);
        assert!(read_frame(&mut server, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_prefix_rejected() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&2048u32.to_be_bytes()).await.unwrap();
        let err = read_frame(&mut server, 1024).await.unwrap_err();
        assert!(matches!(err, TransportError::TooLarge { len: 2048, max: 1024 }));
    }

    #[tokio::test]
    async fn read_timeout_expires() {
        let (_client, mut server) = duplex(64);
        let err = read_frame_timeout(&mut server, 1024, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::TimedOut));
    }

    #[tokio::test]
    async fn write_after_peer_closed_fails() {
        let (mut client, server) = duplex(64);
        drop(server);
        let err = write_frame(&mut client, b"pose").await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
