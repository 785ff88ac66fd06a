//! HLS chunklist (media playlist) assembly and serialization.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::config::ManifestType;
use crate::uploader::Header;

/// Request headers for persisting the manifest (spec §6: `.m3u8` uploads
/// carry `Content-Type: application/vnd.apple.mpegurl`).
pub fn manifest_headers() -> Vec<Header> {
    vec![(
        "Content-Type".to_string(),
        "application/vnd.apple.mpegurl".to_string(),
    )]
}

/// One entry in the chunklist: a published (or pre-allocated, growing) segment.
#[derive(Debug, Clone)]
pub struct ChunklistEntry {
    pub filename: String,
    pub duration_s: f64,
    pub is_discontinuity: bool,
    pub is_growing: bool,
}

/// The ordered set of published segments plus sequence counters, serialized
/// to HLS media-playlist text.
#[derive(Debug, Clone)]
pub struct HlsChunklist {
    entries: std::collections::VecDeque<ChunklistEntry>,
    media_sequence: u64,
    discontinuity_sequence: u64,
    target_duration_s: f64,
    sliding_window_size: usize,
    lhls_advanced_chunks: usize,
    init_chunk_filename: Option<String>,
    is_closed: bool,
    manifest_type: ManifestType,
}

impl HlsChunklist {
    pub fn new(manifest_type: ManifestType, target_duration_s: f64, sliding_window_size: usize, lhls_advanced_chunks: usize) -> Self {
        HlsChunklist {
            entries: std::collections::VecDeque::new(),
            media_sequence: 0,
            discontinuity_sequence: 0,
            target_duration_s,
            sliding_window_size,
            lhls_advanced_chunks,
            init_chunk_filename: None,
            is_closed: false,
            manifest_type,
        }
    }

    /// Registers an init segment reference; promotes the manifest to version 7.
    pub fn set_init_chunk(&mut self, filename: impl Into<String>) {
        self.init_chunk_filename = Some(filename.into());
    }

    pub fn version(&self) -> u8 {
        if self.init_chunk_filename.is_some() {
            7
        } else {
            3
        }
    }

    pub fn media_sequence(&self) -> u64 {
        self.media_sequence
    }

    pub fn discontinuity_sequence(&self) -> u64 {
        self.discontinuity_sequence
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChunklistEntry> {
        self.entries.iter()
    }

    /// Appends a new entry; for `ManifestType::LiveWindow`, evicts from the
    /// front once `sliding_window_size + lhls_advanced_chunks` is exceeded.
    ///
    /// Evicting an entry whose `is_discontinuity` flag is set advances
    /// `discontinuity_sequence`, the conservative reading of the source's
    /// ambiguous eviction behaviour (see design notes).
    pub fn add_chunk(&mut self, entry: ChunklistEntry) {
        self.entries.push_back(entry);
        if self.manifest_type == ManifestType::LiveWindow {
            let cap = self.sliding_window_size + self.lhls_advanced_chunks;
            while self.entries.len() > cap {
                if let Some(evicted) = self.entries.pop_front() {
                    self.media_sequence += 1;
                    if evicted.is_discontinuity {
                        self.discontinuity_sequence += 1;
                    }
                }
            }
        }
    }

    /// Replaces the still-growing placeholder entry for `filename` (LHLS
    /// pre-allocation) with its final measured duration.
    pub fn finalize_entry(&mut self, filename: &str, duration_s: f64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.filename == filename) {
            entry.duration_s = duration_s;
            entry.is_growing = false;
        }
    }

    /// Drops an entry that never received media (e.g. an LHLS placeholder
    /// still pre-allocated when the stream ends) without touching the
    /// sequence counters — it was never actually published.
    pub fn remove_entry(&mut self, filename: &str) {
        self.entries.retain(|e| e.filename != filename);
    }

    pub fn close_manifest(&mut self) {
        self.is_closed = true;
    }

    /// Computes `#EXT-X-TARGETDURATION`: the ceiling of the largest segment
    /// duration seen, or the configured target if no entries exist yet.
    fn effective_target_duration(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.duration_s)
            .fold(self.target_duration_s, f64::max)
            .ceil() as u64
    }

    /// Renders the manifest text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        writeln!(out, "#EXTM3U").unwrap();
        writeln!(out, "#EXT-X-VERSION:{}", self.version()).unwrap();
        writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence).unwrap();
        writeln!(out, "#EXT-X-DISCONTINUITY-SEQUENCE:{}", self.discontinuity_sequence).unwrap();
        match self.manifest_type {
            ManifestType::Vod => {
                writeln!(out, "#EXT-X-PLAYLIST-TYPE:VOD").unwrap();
            }
            ManifestType::LiveEvent => {
                writeln!(out, "#EXT-X-PLAYLIST-TYPE:EVENT").unwrap();
            }
            ManifestType::LiveWindow => {}
        }
        writeln!(out, "#EXT-X-TARGETDURATION:{}", self.effective_target_duration()).unwrap();
        writeln!(out, "#EXT-X-INDEPENDENT-SEGMENTS").unwrap();
        if let Some(init) = &self.init_chunk_filename {
            writeln!(out, "#EXT-X-MAP:URI=\"{}\"", init).unwrap();
        }
        for entry in &self.entries {
            if entry.is_discontinuity {
                writeln!(out, "#EXT-X-DISCONTINUITY").unwrap();
            }
            writeln!(out, "#EXTINF:{:.8},", entry.duration_s).unwrap();
            writeln!(out, "{}", entry.filename).unwrap();
        }
        if self.is_closed {
            writeln!(out, "#EXT-X-ENDLIST").unwrap();
        }
        out
    }
}

pub(crate) fn relative_to(base: &std::path::Path, target: &std::path::Path) -> PathBuf {
    target
        .strip_prefix(base)
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|_| target.to_path_buf())
}
