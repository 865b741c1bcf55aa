//! File and terminal output.
pub mod output;
