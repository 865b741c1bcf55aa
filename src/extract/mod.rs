//! Per-capture sequence extraction.
//! Decodes one capture into an ordered list of (time, signed length)
//! observations, classifying each packet against the target address set.
pub mod containers;
pub mod filter;
pub mod pcap;

use std::io;

/// Errors raised while turning one capture into a sequence. Always scoped
/// to that capture; the pipeline logs them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed capture: {0}")]
    Malformed(String),
    #[error("unsupported link type {0}")]
    UnsupportedLink(i32),
    #[error("tshark filter failed: {0}")]
    Filter(String),
}
