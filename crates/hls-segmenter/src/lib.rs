//! A live MPEG-TS segmenter: fixed-duration chunks plus an HLS chunklist.
//!
//! Consumes a raw transport-stream byte feed via [`Segmenter::add_data`],
//! writing media segments through a [`Uploader`] capability and maintaining
//! an [`HlsChunklist`] manifest. Process entry, argument parsing and the
//! concrete network/cloud transports are external collaborators.

pub mod chunk;
pub mod chunklist;
pub mod config;
pub mod error;
pub mod segmenter;
pub mod uploader;

pub use chunk::Chunk;
pub use chunklist::{ChunklistEntry, HlsChunklist};
pub use config::{
    ChunkDestination, ChunkInitType, ManifestDestination, ManifestType, PidSelection, RetryPolicy,
    SegmenterConfig, SegmenterConfigBuilder,
};
pub use error::{ChunkError, ManifestError, Result, SegmenterError, UploadError};
pub use segmenter::Segmenter;
pub use uploader::{ChunkedSink, Header, NullUploader, Uploader};
