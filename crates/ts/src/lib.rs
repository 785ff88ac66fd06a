//! MPEG-2 Transport Stream packet parsing.
//!
//! Parses individual 188-byte TS packets: headers, adaptation fields, PCR,
//! PAT and PMT sections. Consumers feed bytes incrementally via
//! [`TsPacket::add_data`] since the stream is not guaranteed to arrive
//! packet-aligned.

pub mod adaptation_field;
pub mod error;
pub mod pat;
pub mod packet;
pub mod pmt;

pub use adaptation_field::{AdaptationField, Pcr, MAX_PCR_S};
pub use error::{Result, TsError};
pub use pat::Pat;
pub use packet::{TsPacket, PACKET_LEN, PID_NULL, PID_PAT, SYNC_BYTE};
pub use pmt::{PmtStreams, STREAM_TYPE_ADTS_AAC, STREAM_TYPE_H264};
