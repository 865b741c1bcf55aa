//! Optional tshark pre-filter.
//!
//! When enabled, a capture is first reduced to packets involving the target
//! addresses. tshark writes the filtered packets to a temporary capture
//! next to the source; the worker extracts from that file and removes it
//! afterwards. The rest of the pipeline treats this hook as a black box
//! returning a capture path.
use super::ExtractError;
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Extension appended to the source name for the filtered capture.
pub const FILTERED_SUFFIX: &str = "ttmp";

/// Builds the display filter matching any of the target addresses.
pub fn address_filter(targets: &HashSet<IpAddr>) -> String {
    let mut terms: Vec<String> = targets
        .iter()
        .map(|addr| match addr {
            IpAddr::V4(v4) => format!("ip.addr == {v4}"),
            IpAddr::V6(v6) => format!("ipv6.addr == {v6}"),
        })
        .collect();
    terms.sort();
    terms.join(" or ")
}

/// Runs tshark over `source`, keeping only target traffic, and returns the
/// path of the filtered capture. The caller owns that file and is expected
/// to delete it once extraction is done.
pub fn filter_capture(source: &Path, targets: &HashSet<IpAddr>) -> Result<PathBuf, ExtractError> {
    let input = source
        .to_str()
        .ok_or_else(|| ExtractError::Filter(format!("non-UTF-8 path: {}", source.display())))?;
    let output = filtered_path(source);
    let output_str = output
        .to_str()
        .ok_or_else(|| ExtractError::Filter(format!("non-UTF-8 path: {}", output.display())))?;
    let filter = address_filter(targets);
    log::debug!("filtering {input} with '{filter}'");

    let builder = rtshark::RTSharkBuilder::builder()
        .input_path(input)
        .display_filter(&filter)
        .output_path(output_str);

    let mut rtshark = builder
        .spawn()
        .map_err(|e| ExtractError::Filter(e.to_string()))?;

    // Drain tshark's output so we only return once the filtered capture is
    // fully written.
    while let Some(_packet) = rtshark
        .read()
        .map_err(|e| ExtractError::Filter(e.to_string()))?
    {}
    rtshark.kill();

    Ok(output)
}

fn filtered_path(source: &Path) -> PathBuf {
    let mut name = source
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(FILTERED_SUFFIX);
    source.with_file_name(name)
}
