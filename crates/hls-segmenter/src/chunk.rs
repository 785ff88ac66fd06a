//! A single output media (or init) segment and its byte sink.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tempfile::NamedTempFile;

use crate::config::{ChunkDestination, SegmenterConfig};
use crate::error::ChunkError;
use crate::uploader::{ChunkedSink, Header, Uploader};

/// Request headers describing a chunk, attached to uploads of `.ts` payloads.
pub fn chunk_headers(index: u64, target_duration_s: f64, created_at_ns: u128) -> Vec<Header> {
    vec![
        ("Content-Type".to_string(), "video/MP2T".to_string()),
        ("Joc-Hls-Chunk-Seq-Number".to_string(), index.to_string()),
        (
            "Joc-Hls-Targetduration-Ms".to_string(),
            format!("{:.8}", target_duration_s * 1000.0),
        ),
        ("Joc-Hls-CreatedAt-Ns".to_string(), created_at_ns.to_string()),
    ]
}

enum ChunkSink {
    None,
    File(BufWriter<File>),
    ChunkedTransfer(ChunkedSink),
    Staged {
        file: BufWriter<NamedTempFile>,
    },
}

/// One output segment: a media chunk or (in `InitSegment` mode) the init chunk.
pub struct Chunk {
    index: u64,
    filename: PathBuf,
    ghost_filename: Option<PathBuf>,
    created_at: SystemTime,
    total_bytes: u64,
    sink: ChunkSink,
    closed: bool,
    uploader: Arc<dyn Uploader>,
    destination: ChunkDestination,
    target_duration_s: f64,
}

impl Chunk {
    /// Opens a chunk's sink per the configured [`ChunkDestination`].
    pub fn open(
        index: u64,
        filename: PathBuf,
        config: &SegmenterConfig,
        uploader: Arc<dyn Uploader>,
    ) -> Result<Self, ChunkError> {
        let ghost_filename = config.ghost_filename(index);
        let sink = match config.chunk_destination {
            ChunkDestination::None => ChunkSink::None,
            ChunkDestination::File => {
                if let Some(ghost) = &ghost_filename {
                    File::create(ghost).map_err(|source| ChunkError::Io {
                        path: ghost.clone(),
                        source,
                    })?;
                }
                let file = File::create(&filename).map_err(|source| ChunkError::Io {
                    path: filename.clone(),
                    source,
                })?;
                ChunkSink::File(BufWriter::new(file))
            }
            ChunkDestination::HttpChunkedTransfer => {
                let headers = chunk_headers(index, config.target_segment_duration_s, now_ns());
                ChunkSink::ChunkedTransfer(uploader.upload_chunked_transfer(&filename, &headers))
            }
            ChunkDestination::HttpBufferedPost | ChunkDestination::ObjectStore => {
                let tmp = NamedTempFile::new().map_err(|source| ChunkError::Io {
                    path: filename.clone(),
                    source,
                })?;
                ChunkSink::Staged {
                    file: BufWriter::new(tmp),
                }
            }
        };

        Ok(Chunk {
            index,
            filename,
            ghost_filename,
            created_at: SystemTime::now(),
            total_bytes: 0,
            sink,
            closed: false,
            uploader,
            destination: config.chunk_destination,
            target_duration_s: config.target_segment_duration_s,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Appends `data` to the chunk's sink, preserving call order.
    pub fn add_data(&mut self, data: Bytes) -> Result<(), ChunkError> {
        if self.closed {
            return Err(ChunkError::AlreadyClosed {
                path: self.filename.clone(),
            });
        }
        match &mut self.sink {
            ChunkSink::None => {}
            ChunkSink::File(writer) => {
                writer.write_all(&data).map_err(|source| ChunkError::Io {
                    path: self.filename.clone(),
                    source,
                })?;
            }
            ChunkSink::ChunkedTransfer(sink) => {
                sink.send(data.clone()).map_err(|_| ChunkError::ChannelClosed)?;
            }
            ChunkSink::Staged { file } => {
                file.write_all(&data).map_err(|source| ChunkError::Io {
                    path: self.filename.clone(),
                    source,
                })?;
            }
        }
        self.total_bytes += data.len() as u64;
        Ok(())
    }

    /// Finalizes the chunk: flushes bytes, removes the ghost file, and for
    /// staged modes hands the temp file to the uploader then deletes it.
    pub fn close(mut self) -> Result<(), ChunkError> {
        self.closed = true;
        match std::mem::replace(&mut self.sink, ChunkSink::None) {
            ChunkSink::None => {}
            ChunkSink::File(mut writer) => {
                writer.flush().map_err(|source| ChunkError::Io {
                    path: self.filename.clone(),
                    source,
                })?;
                if let Some(ghost) = &self.ghost_filename {
                    let _ = std::fs::remove_file(ghost);
                }
            }
            ChunkSink::ChunkedTransfer(mut sink) => {
                sink.close().map_err(|_| ChunkError::ChannelClosed)?;
            }
            ChunkSink::Staged { mut file } => {
                file.flush().map_err(|source| ChunkError::Io {
                    path: self.filename.clone(),
                    source,
                })?;
                let tmp = file.into_inner().map_err(|e| ChunkError::Io {
                    path: self.filename.clone(),
                    source: e.into_error(),
                })?;
                let headers = chunk_headers(self.index, self.target_duration_s, now_ns());
                let path = tmp.path().to_path_buf();
                if self.destination == ChunkDestination::HttpBufferedPost
                    || self.destination == ChunkDestination::ObjectStore
                {
                    if let Err(err) = self.uploader.upload_local_file(&path, &self.filename, &headers) {
                        tracing::error!(filename = %self.filename.display(), error = %err, "chunk upload failed, chunk lost");
                    }
                }
                // `tmp` (a NamedTempFile) drops here, deleting the staged file.
            }
        }
        Ok(())
    }
}

fn now_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
