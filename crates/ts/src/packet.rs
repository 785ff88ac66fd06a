//! Accumulating parser for a single 188-byte TS packet.
//!
//! Unlike a one-shot `parse(Bytes)` API, [`TsPacket`] is fed incrementally
//! via [`TsPacket::add_data`] because the segmenter receives the transport
//! stream as an arbitrarily chunked byte stream and must resync mid-packet.

use bytes::{Bytes, BytesMut};

use crate::adaptation_field::AdaptationField;
use crate::error::{Result, TsError};
use crate::pat::Pat;
use crate::pmt::{self, PmtStreams};

pub const PACKET_LEN: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;

pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1FFF;

/// Parsed view of one complete, valid TS packet.
#[derive(Debug, Clone, Default)]
struct ParsedView {
    pid: u16,
    payload_unit_start: bool,
    continuity_counter: u8,
    adaptation_field: Option<AdaptationField>,
    pat: Option<Pat>,
    pmt_streams: Option<PmtStreams>,
}

/// A single TS packet, filled incrementally and parsed once complete.
#[derive(Debug, Clone)]
pub struct TsPacket {
    buf: BytesMut,
    parsed: Option<ParsedView>,
}

impl Default for TsPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl TsPacket {
    pub fn new() -> Self {
        TsPacket {
            buf: BytesMut::with_capacity(PACKET_LEN),
            parsed: None,
        }
    }

    /// Appends up to `PACKET_LEN - len()` bytes from `data`, returning the
    /// number of bytes actually consumed.
    pub fn add_data(&mut self, data: &[u8]) -> usize {
        let remaining = PACKET_LEN - self.buf.len();
        let take = remaining.min(data.len());
        self.buf.extend_from_slice(&data[..take]);
        take
    }

    /// True once 188 bytes have been accumulated.
    pub fn is_complete(&self) -> bool {
        self.buf.len() == PACKET_LEN
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards accumulated bytes and parsed state so the packet can be reused.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.parsed = None;
    }

    /// Raw 188-byte packet contents. Panics if not yet complete; callers
    /// must check [`TsPacket::is_complete`] first.
    pub fn raw_bytes(&self) -> Bytes {
        assert!(self.is_complete(), "raw_bytes called on incomplete packet");
        self.buf.clone().freeze()
    }

    /// Parses the accumulated 188 bytes. `expected_pmt_pid` is `-1` when the
    /// PMT PID is not yet known; pass the current tracked value so PMT
    /// sections can be recognised and classified.
    pub fn parse(&mut self, expected_pmt_pid: i32) -> Result<()> {
        if !self.is_complete() {
            return Err(TsError::Incomplete {
                have: self.buf.len(),
            });
        }
        let data = &self.buf[..];
        if data[0] != SYNC_BYTE {
            return Err(TsError::BadSyncByte {
                found: data[0],
                offset: 0,
            });
        }
        let payload_unit_start = data[1] & 0x40 != 0;
        let pid = (((data[1] as u16) & 0x1F) << 8) | data[2] as u16;
        let adaptation_field_control = (data[3] >> 4) & 0x03;
        let continuity_counter = data[3] & 0x0F;

        let mut offset = 4usize;
        let mut adaptation_field = None;
        if adaptation_field_control == 0b10 || adaptation_field_control == 0b11 {
            let af = AdaptationField::parse(&data[offset..])?;
            let raw_len = data[offset] as usize;
            offset += 1 + raw_len;
            adaptation_field = Some(af);
        }
        let has_payload = adaptation_field_control == 0b01 || adaptation_field_control == 0b11;

        let mut pat = None;
        let mut pmt_streams = None;
        if has_payload && offset < PACKET_LEN {
            let mut payload = &data[offset..];
            if payload_unit_start && !payload.is_empty() {
                let pointer_field = payload[0] as usize;
                if payload.len() > pointer_field {
                    payload = &payload[1 + pointer_field..];
                } else {
                    payload = &[];
                }
            }
            if pid == PID_PAT {
                pat = Pat::parse(payload).ok();
            } else if expected_pmt_pid >= 0 && pid as i32 == expected_pmt_pid {
                pmt_streams = pmt::parse(payload).ok();
            }
        }

        self.parsed = Some(ParsedView {
            pid,
            payload_unit_start,
            continuity_counter,
            adaptation_field,
            pat,
            pmt_streams,
        });
        Ok(())
    }

    fn parsed(&self) -> Option<&ParsedView> {
        self.parsed.as_ref()
    }

    pub fn pid(&self) -> Option<u16> {
        self.parsed().map(|p| p.pid)
    }

    pub fn payload_unit_start(&self) -> bool {
        self.parsed().map(|p| p.payload_unit_start).unwrap_or(false)
    }

    pub fn continuity_counter(&self) -> Option<u8> {
        self.parsed().map(|p| p.continuity_counter)
    }

    /// PCR in seconds, or `-1.0` if this packet carries no PCR — mirrors the
    /// sentinel convention of the original implementation.
    pub fn pcr_seconds(&self) -> f64 {
        self.parsed()
            .and_then(|p| p.adaptation_field.as_ref())
            .and_then(|af| af.pcr)
            .map(|pcr| pcr.as_seconds())
            .unwrap_or(-1.0)
    }

    pub fn is_random_access(&self) -> bool {
        self.parsed()
            .and_then(|p| p.adaptation_field.as_ref())
            .map(|af| af.random_access_indicator)
            .unwrap_or(false)
    }

    pub fn is_discontinuity(&self) -> bool {
        self.parsed()
            .and_then(|p| p.adaptation_field.as_ref())
            .map(|af| af.discontinuity_indicator)
            .unwrap_or(false)
    }

    /// The PMT PID carried by this packet, if it is a valid PAT. `-1` if not.
    pub fn pat_pmt_pid(&self) -> i32 {
        self.parsed()
            .and_then(|p| p.pat.as_ref())
            .map(|pat| pat.pmt_pid as i32)
            .unwrap_or(-1)
    }

    pub fn pmt_streams(&self) -> Option<&PmtStreams> {
        self.parsed().and_then(|p| p.pmt_streams.as_ref())
    }
}
