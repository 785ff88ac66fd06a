//! Segmenter configuration.

use std::path::PathBuf;

use crate::error::{Result, SegmenterError};

/// How PAT/PMT initialization data is handled relative to media chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkInitType {
    /// PAT/PMT are parsed only for PID discovery; never persisted specially.
    NoIni,
    /// The first PAT/PMT are written to a dedicated init chunk, registered
    /// on the chunklist via `#EXT-X-MAP`.
    InitSegment,
    /// The first PAT/PMT are cached and replayed at the start of every
    /// newly opened media chunk.
    InitAtStart,
}

/// How PIDs of interest are determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidSelection {
    /// Discover video/audio PIDs from PAT/PMT.
    Auto,
    /// Caller supplies both PIDs; PAT/PMT are not parsed for selection.
    Manual { video_pid: u16, audio_pid: u16 },
}

/// Output destination for media chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDestination {
    None,
    File,
    HttpChunkedTransfer,
    HttpBufferedPost,
    ObjectStore,
}

/// Output destination for the chunklist manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestDestination {
    None,
    File,
    Http,
    ObjectStore,
}

/// `#EXT-X-PLAYLIST-TYPE` selection, plus the unmarked sliding-window live case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestType {
    Vod,
    LiveEvent,
    LiveWindow,
}

/// Linear retry policy for buffered HTTP uploads.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    /// When `false` (default), the first retry sleeps 0ms and delay grows
    /// as `retry_intent * initial_delay_ms` — preserved legacy behaviour.
    /// When `true`, delay is `(retry_intent + 1) * initial_delay_ms`.
    pub delay_from_first_attempt: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 500,
            delay_from_first_attempt: false,
        }
    }
}

impl RetryPolicy {
    /// The sleep duration, in milliseconds, before retry attempt `retry_intent`
    /// (0-based: the first retry is `retry_intent == 0`).
    pub fn delay_ms(&self, retry_intent: u32) -> u64 {
        let factor = if self.delay_from_first_attempt {
            retry_intent as u64 + 1
        } else {
            retry_intent as u64
        };
        factor * self.initial_delay_ms
    }
}

/// Full segmenter configuration, built via [`SegmenterConfig::builder`].
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub base_path: PathBuf,
    pub chunk_base_filename: String,
    pub file_extension: String,
    pub file_number_width: usize,
    pub ghost_prefix: Option<String>,
    pub target_segment_duration_s: f64,
    pub pid_selection: PidSelection,
    pub chunk_init_type: ChunkInitType,
    pub lhls_advanced_chunks: usize,
    pub manifest_type: ManifestType,
    pub sliding_window_size: usize,
    pub chunk_destination: ChunkDestination,
    pub manifest_destination: ManifestDestination,
    pub manifest_filename: String,
    pub retry_policy: RetryPolicy,
}

impl SegmenterConfig {
    pub fn builder() -> SegmenterConfigBuilder {
        SegmenterConfigBuilder::default()
    }

    /// Zero-padded filename for the media chunk at `index`, e.g. `chunk_00042.ts`.
    pub fn chunk_filename(&self, index: u64) -> PathBuf {
        self.base_path.join(format!(
            "{}{:0width$}{}",
            self.chunk_base_filename,
            index,
            self.file_extension,
            width = self.file_number_width
        ))
    }

    /// Ghost companion filename, if a ghost prefix is configured.
    pub fn ghost_filename(&self, index: u64) -> Option<PathBuf> {
        self.ghost_prefix.as_ref().map(|prefix| {
            self.base_path.join(format!(
                "{}{}{:0width$}{}",
                prefix,
                self.chunk_base_filename,
                index,
                self.file_extension,
                width = self.file_number_width
            ))
        })
    }

    pub fn init_chunk_filename(&self) -> PathBuf {
        self.base_path
            .join(format!("init{:0width$}{}", 0, self.file_extension, width = self.file_number_width))
    }

    /// Full path of the chunklist manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.base_path.join(&self.manifest_filename)
    }

    fn validate(&self) -> Result<()> {
        if matches!(self.pid_selection, PidSelection::Manual { .. })
            && self.chunk_init_type != ChunkInitType::NoIni
        {
            return Err(SegmenterError::InvalidConfig {
                reason: "manual PID selection requires ChunkInitType::NoIni",
            });
        }
        if self.target_segment_duration_s <= 0.0 {
            return Err(SegmenterError::InvalidConfig {
                reason: "target_segment_duration_s must be positive",
            });
        }
        Ok(())
    }
}

/// Builder for [`SegmenterConfig`], mirroring the teacher workspace's
/// writer-config builder idiom.
pub struct SegmenterConfigBuilder {
    base_path: PathBuf,
    chunk_base_filename: String,
    file_extension: String,
    file_number_width: usize,
    ghost_prefix: Option<String>,
    target_segment_duration_s: f64,
    pid_selection: PidSelection,
    chunk_init_type: ChunkInitType,
    lhls_advanced_chunks: usize,
    manifest_type: ManifestType,
    sliding_window_size: usize,
    chunk_destination: ChunkDestination,
    manifest_destination: ManifestDestination,
    manifest_filename: String,
    retry_policy: RetryPolicy,
}

impl Default for SegmenterConfigBuilder {
    fn default() -> Self {
        SegmenterConfigBuilder {
            base_path: PathBuf::from("."),
            chunk_base_filename: "chunk_".to_string(),
            file_extension: ".ts".to_string(),
            file_number_width: 5,
            ghost_prefix: None,
            target_segment_duration_s: 6.0,
            pid_selection: PidSelection::Auto,
            chunk_init_type: ChunkInitType::NoIni,
            lhls_advanced_chunks: 0,
            manifest_type: ManifestType::LiveWindow,
            sliding_window_size: 6,
            chunk_destination: ChunkDestination::File,
            manifest_destination: ManifestDestination::File,
            manifest_filename: "chunklist.m3u8".to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl SegmenterConfigBuilder {
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    pub fn chunk_base_filename(mut self, name: impl Into<String>) -> Self {
        self.chunk_base_filename = name.into();
        self
    }

    pub fn file_extension(mut self, ext: impl Into<String>) -> Self {
        self.file_extension = ext.into();
        self
    }

    pub fn file_number_width(mut self, width: usize) -> Self {
        self.file_number_width = width;
        self
    }

    pub fn ghost_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ghost_prefix = Some(prefix.into());
        self
    }

    pub fn target_segment_duration_s(mut self, duration: f64) -> Self {
        self.target_segment_duration_s = duration;
        self
    }

    pub fn pid_selection(mut self, selection: PidSelection) -> Self {
        self.pid_selection = selection;
        self
    }

    pub fn chunk_init_type(mut self, init_type: ChunkInitType) -> Self {
        self.chunk_init_type = init_type;
        self
    }

    pub fn lhls_advanced_chunks(mut self, count: usize) -> Self {
        self.lhls_advanced_chunks = count;
        self
    }

    pub fn manifest_type(mut self, manifest_type: ManifestType) -> Self {
        self.manifest_type = manifest_type;
        self
    }

    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.sliding_window_size = size;
        self
    }

    pub fn chunk_destination(mut self, dest: ChunkDestination) -> Self {
        self.chunk_destination = dest;
        self
    }

    pub fn manifest_destination(mut self, dest: ManifestDestination) -> Self {
        self.manifest_destination = dest;
        self
    }

    pub fn manifest_filename(mut self, filename: impl Into<String>) -> Self {
        self.manifest_filename = filename.into();
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn build(self) -> Result<SegmenterConfig> {
        let config = SegmenterConfig {
            base_path: self.base_path,
            chunk_base_filename: self.chunk_base_filename,
            file_extension: self.file_extension,
            file_number_width: self.file_number_width,
            ghost_prefix: self.ghost_prefix,
            target_segment_duration_s: self.target_segment_duration_s,
            pid_selection: self.pid_selection,
            chunk_init_type: self.chunk_init_type,
            lhls_advanced_chunks: self.lhls_advanced_chunks,
            manifest_type: self.manifest_type,
            sliding_window_size: self.sliding_window_size,
            chunk_destination: self.chunk_destination,
            manifest_destination: self.manifest_destination,
            manifest_filename: self.manifest_filename,
            retry_policy: self.retry_policy,
        };
        config.validate()?;
        Ok(config)
    }
}
