//! Shared fixtures for the end-to-end tests: hand-rolled legacy pcap
//! captures with Ethernet/IPv4 frames.
use std::fs;
use std::path::Path;

pub const TARGET: [u8; 4] = [10, 0, 0, 5];
pub const REMOTE: [u8; 4] = [93, 184, 216, 34];

/// Writes a capture of `(sec, usec, src, dst, wire_len)` frames.
pub fn write_capture_frames(path: &Path, frames: &[(u32, u32, [u8; 4], [u8; 4], usize)]) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&4u16.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&65535u32.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes());
    for &(sec, usec, src, dst, wire_len) in frames {
        let frame = ipv4_frame(src, dst, wire_len);
        bytes.extend_from_slice(&sec.to_le_bytes());
        bytes.extend_from_slice(&usec.to_le_bytes());
        bytes.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&frame);
    }
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// Writes a capture of target traffic: `(sec, usec, outbound, wire_len)`.
pub fn write_capture(path: &Path, records: &[(u32, u32, bool, usize)]) {
    let frames: Vec<(u32, u32, [u8; 4], [u8; 4], usize)> = records
        .iter()
        .map(|&(sec, usec, outbound, wire_len)| {
            let (src, dst) = if outbound { (TARGET, REMOTE) } else { (REMOTE, TARGET) };
            (sec, usec, src, dst, wire_len)
        })
        .collect();
    write_capture_frames(path, &frames);
}

fn ipv4_frame(src: [u8; 4], dst: [u8; 4], wire_len: usize) -> Vec<u8> {
    let mut frame = vec![0u8; wire_len.max(34)];
    frame[12] = 0x08;
    frame[14] = 0x45;
    frame[23] = 6;
    frame[26..30].copy_from_slice(&src);
    frame[30..34].copy_from_slice(&dst);
    frame
}
