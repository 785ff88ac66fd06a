use thiserror::Error;

/// Errors raised while writing bytes to a chunk's sink.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk I/O error for {path}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("add_data called on a closed chunk ({path})")]
    AlreadyClosed { path: std::path::PathBuf },

    #[error("chunked-transfer sink channel was closed by the uploader")]
    ChannelClosed,
}

/// Errors raised while assembling or persisting the HLS chunklist.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest I/O error for {path}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload of manifest to {dst} failed")]
    Upload {
        dst: String,
        #[source]
        source: UploadError,
    },
}

/// Errors raised by the ingest/segmentation state machine.
#[derive(Debug, Error)]
pub enum SegmenterError {
    #[error("configuration is invalid: {reason}")]
    InvalidConfig { reason: &'static str },

    #[error("chunk write failed")]
    ChunkWrite(#[from] ChunkError),

    #[error("manifest update failed")]
    Manifest(#[from] ManifestError),

    #[error("input read error")]
    InputRead(#[source] std::io::Error),
}

/// Errors raised by an [`crate::uploader::Uploader`] implementation.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload to {dst} returned a non-retriable status {status}")]
    NonRetriable { dst: String, status: u16 },

    #[error("upload to {dst} exhausted {attempts} retries")]
    RetriesExhausted { dst: String, attempts: u32 },

    #[error("upload to {dst} timed out")]
    Timeout { dst: String },

    #[error("local I/O error while preparing upload of {dst}")]
    Io {
        dst: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = SegmenterError> = std::result::Result<T, E>;
