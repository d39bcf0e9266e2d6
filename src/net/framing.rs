//! Delimiter framing for the text protocol
//!
//! Every record on the wire is terminated by the literal `end~`. Reads
//! arrive in arbitrary chunks; `PacketBuffer` keeps the partial tail
//! until the next delimiter shows up.

use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Record terminator
pub const DELIMITER: &[u8] = b"end~";

/// Errors that can occur during framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Frame too large: {0} bytes pending without delimiter (max {1})")]
    FrameTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Accumulates stream bytes and yields complete frames
#[derive(Debug)]
pub struct PacketBuffer {
    buffer: Vec<u8>,
    /// Offset up to which no delimiter can start
    scanned: usize,
    max_pending: usize,
}

impl PacketBuffer {
    pub fn new(max_pending: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            scanned: 0,
            max_pending,
        }
    }

    /// Append a chunk read from the stream
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Extract the next complete frame (without the delimiter)
    ///
    /// Returns `Ok(None)` when only a partial frame is buffered and
    /// `FrameTooLarge` once the partial frame exceeds the limit.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        match find_delimiter(&self.buffer[self.scanned..]) {
            Some(pos) => {
                let end = self.scanned + pos;
                let frame = self.buffer[..end].to_vec();
                self.buffer.drain(..end + DELIMITER.len());
                self.scanned = 0;
                Ok(Some(frame))
            }
            None => {
                if self.buffer.len() > self.max_pending {
                    return Err(FramingError::FrameTooLarge(self.buffer.len(), self.max_pending));
                }
                // The delimiter may straddle the next chunk boundary
                self.scanned = self.buffer.len().saturating_sub(DELIMITER.len() - 1);
                Ok(None)
            }
        }
    }

    /// Bytes buffered without a delimiter yet
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

/// Append the delimiter to a record
pub fn encode_frame(record: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(record.len() + DELIMITER.len());
    out.extend_from_slice(record.as_bytes());
    out.extend_from_slice(DELIMITER);
    out
}

/// Write half guarded by a single-slot lock so frames never interleave
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Write one complete frame, returning the number of bytes written
    pub async fn write_frame(&self, record: &str) -> Result<usize, FramingError> {
        let bytes = encode_frame(record);
        let mut writer = self.inner.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(bytes.len())
    }

    /// Shut down the underlying stream
    pub async fn shutdown(&self) -> Result<(), FramingError> {
        self.inner.lock().await.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn drain(buffer: &mut PacketBuffer) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = buffer.next_frame().unwrap() {
            frames.push(String::from_utf8(frame).unwrap());
        }
        frames
    }

    #[test]
    fn test_single_frame() {
        let mut buffer = PacketBuffer::new(1024);
        buffer.extend(b"battle;pingend~");
        assert_eq!(drain(&mut buffer), vec!["battle;ping"]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_partial_tail_retained() {
        let mut buffer = PacketBuffer::new(1024);
        buffer.extend(b"a;bend~c;d");
        assert_eq!(drain(&mut buffer), vec!["a;b"]);
        assert_eq!(buffer.pending(), 3);
        buffer.extend(b"en");
        assert!(drain(&mut buffer).is_empty());
        buffer.extend(b"d~");
        assert_eq!(drain(&mut buffer), vec!["c;d"]);
    }

    #[test]
    fn test_arbitrary_chunk_splits() {
        let records: Vec<String> = (0..6)
            .map(|i| format!("battle;move;tank{};{{\"n\":{}}}", i, i))
            .collect();
        let stream: Vec<u8> = records.iter().flat_map(|r| encode_frame(r)).collect();

        for chunk_size in 1..=stream.len() {
            let mut buffer = PacketBuffer::new(4096);
            let mut frames = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                buffer.extend(chunk);
                frames.extend(drain(&mut buffer));
            }
            assert_eq!(frames, records, "chunk size {}", chunk_size);
            assert_eq!(buffer.pending(), 0);
        }
    }

    #[test]
    fn test_frame_too_large() {
        let mut buffer = PacketBuffer::new(8);
        buffer.extend(b"0123456789");
        assert!(matches!(
            buffer.next_frame(),
            Err(FramingError::FrameTooLarge(10, 8))
        ));
    }

    #[test]
    fn test_empty_frame() {
        let mut buffer = PacketBuffer::new(64);
        buffer.extend(b"end~end~");
        assert_eq!(drain(&mut buffer), vec!["", ""]);
    }

    #[tokio::test]
    async fn test_writer_appends_delimiter() {
        let (client, mut server) = tokio::io::duplex(1024);
        let writer = FrameWriter::new(client);
        let written = writer.write_frame("battle;pong").await.unwrap();
        assert_eq!(written, 15);
        writer.shutdown().await.unwrap();

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "battle;pongend~");
    }

    #[tokio::test]
    async fn test_writer_frames_in_order_then_fails() {
        let mock = tokio_test::io::Builder::new()
            .write(b"lobby;init_battle_selectend~")
            .write(b"battle;pongend~")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();
        let writer = FrameWriter::new(mock);
        writer.write_frame("lobby;init_battle_select").await.unwrap();
        writer.write_frame("battle;pong").await.unwrap();
        assert!(matches!(
            writer.write_frame("battle;pong").await,
            Err(FramingError::Io(_))
        ));
    }
}
