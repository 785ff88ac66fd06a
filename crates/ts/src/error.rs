use thiserror::Error;

/// Errors produced while accumulating or parsing a single TS packet.
#[derive(Debug, Error)]
pub enum TsError {
    #[error("expected sync byte 0x47, found 0x{found:02x} at buffer offset {offset}")]
    BadSyncByte { found: u8, offset: usize },

    #[error("packet buffer is not complete: have {have} of 188 bytes")]
    Incomplete { have: usize },

    #[error("adaptation field length {length} exceeds the packet's remaining space")]
    AdaptationFieldTooLong { length: usize },

    #[error("PAT section is truncated: {reason}")]
    TruncatedPat { reason: &'static str },

    #[error("PMT section is truncated: {reason}")]
    TruncatedPmt { reason: &'static str },

    #[error("too much data handed to add_data: packet already has {have} of 188 bytes")]
    Overfed { have: usize },
}

pub type Result<T> = std::result::Result<T, TsError>;
