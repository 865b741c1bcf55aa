//! capseq converts per-site packet captures into traffic fingerprint
//! sequences: one (relative time, signed length) observation per relevant
//! packet, one output file per capture. Runs are parallel, interruptible,
//! and resumable via an append-only checkpoint log.

pub mod extract;
pub mod pipeline;
pub mod registry;
pub mod ui;
