use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::mime::MimeType;
use crate::error::RecorderError;

/// One segment of encoder output
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    /// Milliseconds since the encoder started
    pub timestamp_ms: u64,
}

/// Metadata for a single buffered chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Chunk number (0-indexed)
    pub chunk_index: usize,
    /// Offset of the chunk inside the assembled artifact
    pub offset: usize,
    pub size_bytes: usize,
    pub timestamp_ms: u64,
}

/// Accumulates encoder output until the recording is finalized
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<EncodedChunk>,
    metadata: Vec<ChunkMetadata>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk; empty chunks carry nothing and are skipped
    pub fn push(&mut self, chunk: EncodedChunk) {
        if chunk.data.is_empty() {
            return;
        }
        self.metadata.push(ChunkMetadata {
            chunk_index: self.chunks.len(),
            offset: self.total_bytes,
            size_bytes: chunk.data.len(),
            timestamp_ms: chunk.timestamp_ms,
        });
        self.total_bytes += chunk.data.len();
        self.chunks.push(chunk);
    }

    /// Drain `rx` until the encoder closes it (its finalize signal)
    pub async fn collect(mut self, mut chunk_rx: mpsc::Receiver<EncodedChunk>) -> Self {
        debug!("Starting chunk collection");

        while let Some(chunk) = chunk_rx.recv().await {
            self.push(chunk);
        }

        info!(
            "Encoder finalized: {} chunks, {} bytes buffered",
            self.chunks.len(),
            self.total_bytes
        );
        self
    }

    /// Collect on a background task
    pub fn spawn_collector(chunk_rx: mpsc::Receiver<EncodedChunk>) -> JoinHandle<ChunkBuffer> {
        tokio::spawn(ChunkBuffer::new().collect(chunk_rx))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    /// Concatenate the buffered chunks into one artifact
    pub fn assemble(self, mime_type: MimeType) -> Result<Artifact, RecorderError> {
        if self.chunks.is_empty() {
            return Err(RecorderError::ProcessData("encoder produced no data".to_string()));
        }

        let mut bytes = Vec::with_capacity(self.total_bytes);
        for chunk in self.chunks {
            bytes.extend_from_slice(&chunk.data);
        }

        Ok(Artifact {
            bytes: Arc::new(bytes),
            mime_type,
        })
    }
}

/// The finalized encoded bytes of one recording
#[derive(Clone)]
pub struct Artifact {
    bytes: Arc<Vec<u8>>,
    mime_type: MimeType,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, mime_type: MimeType) -> Self {
        Self {
            bytes: Arc::new(bytes),
            mime_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> MimeType {
        self.mime_type
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("mime_type", &self.mime_type.to_string())
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collects_until_channel_closes() {
        let (tx, rx) = mpsc::channel(8);
        let handle = ChunkBuffer::spawn_collector(rx);

        for i in 0..3u8 {
            tx.send(EncodedChunk {
                data: vec![i; 4],
                timestamp_ms: i as u64 * 1000,
            })
            .await
            .unwrap();
        }
        tx.send(EncodedChunk {
            data: Vec::new(),
            timestamp_ms: 3000,
        })
        .await
        .unwrap();
        drop(tx);

        let buffer = handle.await.unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.total_bytes(), 12);
        assert_eq!(buffer.metadata()[2].offset, 8);

        let artifact = buffer.assemble(MimeType::webm_baseline()).unwrap();
        assert_eq!(artifact.bytes(), &[0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn test_empty_buffer_is_process_data_error() {
        let err = ChunkBuffer::new().assemble(MimeType::webm_baseline()).unwrap_err();
        assert_eq!(err.code(), "PROCESS_DATA");
    }
}
