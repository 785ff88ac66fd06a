//! Ingest state machine: resync, packet classification, segment boundaries,
//! init handling and LHLS pre-allocation.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use ts::{TsPacket, MAX_PCR_S, PID_PAT, SYNC_BYTE};

use crate::chunk::Chunk;
use crate::chunklist::{self, ChunklistEntry, HlsChunklist};
use crate::config::{ChunkInitType, ManifestDestination, ManifestType, PidSelection, SegmenterConfig};
use crate::error::{ManifestError, Result, SegmenterError};
use crate::uploader::Uploader;

/// How much of PAT/PMT init data has been captured so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    NotIni,
    SavedPat,
    SavedPmt,
}

#[derive(Debug, Clone, Copy)]
enum InitKind {
    Pat,
    Pmt,
}

/// Drives packet-by-packet ingestion of a live MPEG-TS byte stream,
/// producing media chunks and an HLS chunklist.
pub struct Segmenter {
    config: SegmenterConfig,
    uploader: Arc<dyn Uploader>,
    packet: TsPacket,
    is_in_sync: bool,
    detected_pmt_pid: i32,
    video_pid: i32,
    audio_pid: i32,
    chunk_start_time_s: f64,
    last_pcr_s: f64,
    init_state: InitState,
    cached_pat: Option<TsPacket>,
    cached_pmt: Option<TsPacket>,
    current_chunks: VecDeque<Chunk>,
    current_chunk_index: u64,
    first_chunk_created: bool,
    chunklist: HlsChunklist,
    processed_packets: u64,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig, uploader: Arc<dyn Uploader>) -> Result<Self> {
        if matches!(config.pid_selection, PidSelection::Manual { .. })
            && config.chunk_init_type != ChunkInitType::NoIni
        {
            return Err(SegmenterError::InvalidConfig {
                reason: "manual PID selection requires ChunkInitType::NoIni",
            });
        }
        let (video_pid, audio_pid) = match config.pid_selection {
            PidSelection::Manual { video_pid, audio_pid } => (video_pid as i32, audio_pid as i32),
            PidSelection::Auto => (-1, -1),
        };
        let chunklist = HlsChunklist::new(
            config.manifest_type,
            config.target_segment_duration_s,
            config.sliding_window_size,
            config.lhls_advanced_chunks,
        );
        Ok(Segmenter {
            config,
            uploader,
            packet: TsPacket::new(),
            is_in_sync: false,
            detected_pmt_pid: -1,
            video_pid,
            audio_pid,
            chunk_start_time_s: -1.0,
            last_pcr_s: -1.0,
            init_state: InitState::NotIni,
            cached_pat: None,
            cached_pmt: None,
            current_chunks: VecDeque::new(),
            current_chunk_index: 0,
            first_chunk_created: false,
            chunklist,
            processed_packets: 0,
        })
    }

    pub fn chunklist(&self) -> &HlsChunklist {
        &self.chunklist
    }

    pub fn processed_packets(&self) -> u64 {
        self.processed_packets
    }

    /// Feeds a chunk of bytes from the input stream. Handles arbitrary
    /// chunking boundaries: a call may contain a fraction of a packet, many
    /// packets, or span a resync.
    pub fn add_data(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            if !self.is_in_sync {
                match buf.iter().position(|&b| b == SYNC_BYTE) {
                    Some(pos) => {
                        buf = &buf[pos..];
                        self.is_in_sync = true;
                    }
                    None => return Ok(()),
                }
            }
            let consumed = self.packet.add_data(buf);
            buf = &buf[consumed..];
            if self.packet.is_complete() {
                match self.packet.parse(self.detected_pmt_pid) {
                    Ok(()) => {
                        self.process_packet()?;
                        self.packet.reset();
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "TS parse failure, resynchronizing");
                        self.is_in_sync = false;
                        self.packet.reset();
                    }
                }
            }
        }
        Ok(())
    }

    /// Signals end of input: emits the final segment boundary and, for VOD,
    /// closes out the manifest with `#EXT-X-ENDLIST`.
    pub fn close(&mut self) -> Result<()> {
        if self.chunk_start_time_s >= 0.0 && self.last_pcr_s >= 0.0 {
            let dur = self.duration_since_chunk_start(self.last_pcr_s);
            self.close_head_chunk(dur)?;
        }
        // Any chunks still open here (e.g. unconsumed LHLS pre-allocated
        // placeholders) never received media; close their sinks and drop
        // their manifest entries rather than leaving them growing forever.
        while let Some(chunk) = self.current_chunks.pop_front() {
            let filename = self.relative_filename(&chunk);
            let was_empty = chunk.is_empty();
            chunk.close().map_err(SegmenterError::ChunkWrite)?;
            if was_empty {
                self.chunklist.remove_entry(&filename);
            }
        }
        if self.config.manifest_type == ManifestType::Vod {
            self.chunklist.close_manifest();
        }
        self.persist_manifest()?;
        Ok(())
    }

    /// Re-serializes the chunklist and writes it to the configured sink.
    fn persist_manifest(&self) -> Result<()> {
        match self.config.manifest_destination {
            ManifestDestination::None => Ok(()),
            ManifestDestination::File => {
                let path = self.config.manifest_path();
                std::fs::write(&path, self.chunklist.render())
                    .map_err(|source| SegmenterError::Manifest(ManifestError::Io { path, source }))
            }
            ManifestDestination::Http | ManifestDestination::ObjectStore => {
                let path = self.config.manifest_path();
                let body = Bytes::from(self.chunklist.render());
                let headers = chunklist::manifest_headers();
                self.uploader.upload_data(body, &path, &headers).map_err(|source| {
                    SegmenterError::Manifest(ManifestError::Upload {
                        dst: path.to_string_lossy().into_owned(),
                        source,
                    })
                })
            }
        }
    }

    fn effective_pids(&self) -> (i32, i32) {
        (self.video_pid, self.audio_pid)
    }

    fn is_saving_media_packet(&self) -> bool {
        matches!(self.config.pid_selection, PidSelection::Manual { .. })
            || self.config.chunk_init_type == ChunkInitType::NoIni
            || self.init_state == InitState::SavedPmt
    }

    fn duration_since_chunk_start(&self, pcr: f64) -> f64 {
        if pcr < self.chunk_start_time_s {
            MAX_PCR_S - self.chunk_start_time_s + pcr
        } else {
            pcr - self.chunk_start_time_s
        }
    }

    fn process_packet(&mut self) -> Result<()> {
        self.processed_packets += 1;
        let pid = match self.packet.pid() {
            Some(pid) => pid,
            None => return Ok(()),
        };

        if matches!(self.config.pid_selection, PidSelection::Auto) {
            if pid == PID_PAT {
                let pmt_pid = self.packet.pat_pmt_pid();
                if pmt_pid >= 0 {
                    self.detected_pmt_pid = pmt_pid;
                    self.handle_init_packet(InitKind::Pat)?;
                }
            } else if self.detected_pmt_pid >= 0 && pid as i32 == self.detected_pmt_pid {
                if let Some(streams) = self.packet.pmt_streams() {
                    if let Some(v) = streams.first_video_pid() {
                        self.video_pid = v as i32;
                    }
                    if let Some(a) = streams.first_audio_pid() {
                        self.audio_pid = a as i32;
                    }
                    self.handle_init_packet(InitKind::Pmt)?;
                }
            }
        }

        let (video_pid, audio_pid) = self.effective_pids();
        if video_pid >= 0 && pid as i32 == video_pid {
            if self.is_saving_media_packet() {
                if self.packet.is_random_access() {
                    self.on_idr()?;
                }
                self.write_media_packet()?;
            }
        } else if audio_pid >= 0 && pid as i32 == audio_pid && self.is_saving_media_packet() {
            self.write_media_packet()?;
        }
        Ok(())
    }

    fn on_idr(&mut self) -> Result<()> {
        let pcr = self.packet.pcr_seconds();
        if pcr < 0.0 {
            return Ok(());
        }
        self.last_pcr_s = pcr;
        if !self.first_chunk_created {
            self.chunk_start_time_s = pcr;
            self.open_initial_chunks()?;
            return Ok(());
        }
        if self.chunk_start_time_s < 0.0 {
            self.chunk_start_time_s = pcr;
            return Ok(());
        }
        let dur = self.duration_since_chunk_start(pcr);
        if dur + 0.25 > self.config.target_segment_duration_s {
            self.rotate_chunk(dur)?;
            self.chunk_start_time_s = pcr;
        }
        Ok(())
    }

    fn relative_filename(&self, chunk: &Chunk) -> String {
        crate::chunklist::relative_to(&self.config.base_path, chunk.filename())
            .to_string_lossy()
            .into_owned()
    }

    fn open_initial_chunks(&mut self) -> Result<()> {
        let extra = self.config.lhls_advanced_chunks;
        for _ in 0..=extra {
            let filename = self.config.chunk_filename(self.current_chunk_index);
            let chunk = Chunk::open(self.current_chunk_index, filename, &self.config, self.uploader.clone())
                .map_err(SegmenterError::ChunkWrite)?;
            if extra > 0 {
                self.chunklist.add_chunk(ChunklistEntry {
                    filename: self.relative_filename(&chunk),
                    duration_s: self.config.target_segment_duration_s,
                    is_discontinuity: false,
                    is_growing: true,
                });
            }
            self.current_chunk_index += 1;
            self.current_chunks.push_back(chunk);
        }
        self.first_chunk_created = true;
        self.replay_init_into_new_tail()?;
        if extra > 0 {
            self.persist_manifest()?;
        }
        Ok(())
    }

    fn rotate_chunk(&mut self, measured_duration_s: f64) -> Result<()> {
        self.close_head_chunk(measured_duration_s)?;
        let filename = self.config.chunk_filename(self.current_chunk_index);
        let chunk = Chunk::open(self.current_chunk_index, filename, &self.config, self.uploader.clone())
            .map_err(SegmenterError::ChunkWrite)?;
        if self.config.lhls_advanced_chunks > 0 {
            self.chunklist.add_chunk(ChunklistEntry {
                filename: self.relative_filename(&chunk),
                duration_s: self.config.target_segment_duration_s,
                is_discontinuity: false,
                is_growing: true,
            });
            self.persist_manifest()?;
        }
        self.current_chunk_index += 1;
        self.current_chunks.push_back(chunk);
        self.replay_init_into_new_tail()?;
        Ok(())
    }

    fn close_head_chunk(&mut self, measured_duration_s: f64) -> Result<()> {
        if let Some(chunk) = self.current_chunks.pop_front() {
            let filename = self.relative_filename(&chunk);
            let was_empty = chunk.is_empty();
            chunk.close().map_err(SegmenterError::ChunkWrite)?;
            if was_empty {
                return Ok(());
            }
            if self.config.lhls_advanced_chunks > 0 {
                self.chunklist.finalize_entry(&filename, measured_duration_s);
            } else {
                self.chunklist.add_chunk(ChunklistEntry {
                    filename,
                    duration_s: measured_duration_s,
                    is_discontinuity: false,
                    is_growing: false,
                });
            }
            self.persist_manifest()?;
        }
        Ok(())
    }

    fn replay_init_into_new_tail(&mut self) -> Result<()> {
        if self.config.chunk_init_type != ChunkInitType::InitAtStart {
            return Ok(());
        }
        if let Some(chunk) = self.current_chunks.back_mut() {
            if let Some(pat) = &self.cached_pat {
                chunk.add_data(pat.raw_bytes()).map_err(SegmenterError::ChunkWrite)?;
            }
            if let Some(pmt) = &self.cached_pmt {
                chunk.add_data(pmt.raw_bytes()).map_err(SegmenterError::ChunkWrite)?;
            }
        }
        Ok(())
    }

    fn write_media_packet(&mut self) -> Result<()> {
        if let Some(chunk) = self.current_chunks.front_mut() {
            chunk.add_data(self.packet.raw_bytes()).map_err(SegmenterError::ChunkWrite)?;
        }
        Ok(())
    }

    fn handle_init_packet(&mut self, kind: InitKind) -> Result<()> {
        match self.config.chunk_init_type {
            ChunkInitType::NoIni => {}
            ChunkInitType::InitSegment => self.handle_init_segment(kind)?,
            ChunkInitType::InitAtStart => self.handle_init_at_start(kind),
        }
        Ok(())
    }

    fn handle_init_segment(&mut self, kind: InitKind) -> Result<()> {
        match (kind, self.init_state) {
            (InitKind::Pat, InitState::NotIni) => {
                let filename = self.config.init_chunk_filename();
                let mut chunk = Chunk::open(0, filename, &self.config, self.uploader.clone())
                    .map_err(SegmenterError::ChunkWrite)?;
                chunk.add_data(self.packet.raw_bytes()).map_err(SegmenterError::ChunkWrite)?;
                self.current_chunks.push_front(chunk);
                self.init_state = InitState::SavedPat;
            }
            (InitKind::Pmt, InitState::SavedPat) => {
                if let Some(mut init_chunk) = self.current_chunks.pop_front() {
                    let filename = self.relative_filename(&init_chunk);
                    init_chunk
                        .add_data(self.packet.raw_bytes())
                        .map_err(SegmenterError::ChunkWrite)?;
                    init_chunk.close().map_err(SegmenterError::ChunkWrite)?;
                    self.chunklist.set_init_chunk(filename);
                    self.persist_manifest()?;
                }
                self.init_state = InitState::SavedPmt;
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_init_at_start(&mut self, kind: InitKind) {
        match (kind, self.init_state) {
            (InitKind::Pat, InitState::NotIni) => {
                self.cached_pat = Some(self.packet.clone());
                self.init_state = InitState::SavedPat;
            }
            (InitKind::Pmt, InitState::SavedPat) => {
                self.cached_pmt = Some(self.packet.clone());
                self.init_state = InitState::SavedPmt;
            }
            _ => {}
        }
    }
}
