//! Legacy-pcap decoding into observation sequences.
//!
//! Extraction is a pure function of the capture file and the target set:
//! no shared state, safe to run on many captures concurrently.
use super::containers::{PacketObservation, Sequence};
use super::ExtractError;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, Linktype, PcapBlockOwned, PcapError};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::net::IpAddr;
use std::path::Path;

const BUFFER_SIZE: usize = 65536;

/// Decodes `path` and returns the ordered observations for every packet
/// whose IP source or destination is in `targets`.
///
/// The first relevant packet's timestamp becomes the time origin when
/// `normalize` is set; otherwise raw timestamps are recorded. A capture
/// with no relevant packets yields an empty sequence, which is a success.
pub fn extract_sequence(
    path: &Path,
    targets: &HashSet<IpAddr>,
    normalize: bool,
) -> Result<Sequence, ExtractError> {
    let file = File::open(path)?;
    let mut reader = LegacyPcapReader::new(BUFFER_SIZE, BufReader::new(file))
        .map_err(|e| ExtractError::Malformed(format!("{e:?}")))?;

    let mut link = Linktype::ETHERNET;
    let mut nanos = false;
    let mut origin: Option<i64> = None;
    let mut sequence = Sequence::new();
    let mut stalled = false;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                stalled = false;
                match block {
                    PcapBlockOwned::LegacyHeader(ref header) => {
                        link = header.network;
                        if !supported_link(link) {
                            return Err(ExtractError::UnsupportedLink(link.0));
                        }
                        // Nanosecond magic, native or byte-swapped.
                        nanos = matches!(header.magic_number, 0xa1b2_3c4d | 0x4d3c_b2a1);
                    }
                    PcapBlockOwned::Legacy(ref packet) => {
                        if packet.origlen > 0 {
                            if let Some(direction) = classify(link, packet.data, targets) {
                                let sub_us = if nanos { packet.ts_usec / 1000 } else { packet.ts_usec };
                                let stamp = i64::from(packet.ts_sec) * 1_000_000 + i64::from(sub_us);
                                let time_us = if normalize {
                                    let origin = *origin.get_or_insert(stamp);
                                    stamp - origin
                                } else {
                                    stamp
                                };
                                let length = direction * packet.origlen as i32;
                                sequence.push(PacketObservation::new(time_us, length));
                            }
                        }
                    }
                    // A LegacyPcapReader never yields pcapng blocks.
                    PcapBlockOwned::NG(_) => {}
                }
                drop(block);
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete) => {
                // Two Incompletes in a row means refill gained nothing:
                // the file ends mid-record.
                if stalled {
                    return Err(ExtractError::Malformed(String::from("truncated capture")));
                }
                stalled = true;
                reader
                    .refill()
                    .map_err(|e| ExtractError::Malformed(format!("{e:?}")))?;
            }
            Err(e) => return Err(ExtractError::Malformed(format!("{e:?}"))),
        }
    }

    Ok(sequence)
}

fn supported_link(link: Linktype) -> bool {
    matches!(
        link,
        Linktype::ETHERNET | Linktype::LINUX_SLL | Linktype::RAW | Linktype::IPV4 | Linktype::IPV6
    )
}

/// Classifies one packet against the target set: -1 when a target is the
/// destination, +1 when a target is the source (destination wins when both
/// match), None when the packet is irrelevant and contributes nothing.
fn classify(link: Linktype, data: &[u8], targets: &HashSet<IpAddr>) -> Option<i32> {
    let (src, dst) = ip_addresses(link, data)?;
    if targets.contains(&dst) {
        Some(-1)
    } else if targets.contains(&src) {
        Some(1)
    } else {
        None
    }
}

/// Finds the IP header for the capture's link type and reads its addresses.
fn ip_addresses(link: Linktype, data: &[u8]) -> Option<(IpAddr, IpAddr)> {
    match link {
        Linktype::ETHERNET => {
            if data.len() < 14 {
                return None;
            }
            match u16::from_be_bytes([data[12], data[13]]) {
                0x0800 => ipv4_addresses(&data[14..]),
                0x86dd => ipv6_addresses(&data[14..]),
                // One 802.1Q tag; the real ethertype follows it.
                0x8100 => {
                    if data.len() < 18 {
                        return None;
                    }
                    match u16::from_be_bytes([data[16], data[17]]) {
                        0x0800 => ipv4_addresses(&data[18..]),
                        0x86dd => ipv6_addresses(&data[18..]),
                        _ => None,
                    }
                }
                _ => None,
            }
        }
        Linktype::LINUX_SLL => {
            if data.len() < 16 {
                return None;
            }
            match u16::from_be_bytes([data[14], data[15]]) {
                0x0800 => ipv4_addresses(&data[16..]),
                0x86dd => ipv6_addresses(&data[16..]),
                _ => None,
            }
        }
        Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => match data.first().map(|b| b >> 4) {
            Some(4) => ipv4_addresses(data),
            Some(6) => ipv6_addresses(data),
            _ => None,
        },
        _ => None,
    }
}

fn ipv4_addresses(ip: &[u8]) -> Option<(IpAddr, IpAddr)> {
    if ip.len() < 20 {
        return None;
    }
    let src: [u8; 4] = ip[12..16].try_into().ok()?;
    let dst: [u8; 4] = ip[16..20].try_into().ok()?;
    Some((IpAddr::from(src), IpAddr::from(dst)))
}

fn ipv6_addresses(ip: &[u8]) -> Option<(IpAddr, IpAddr)> {
    if ip.len() < 40 {
        return None;
    }
    let src: [u8; 16] = ip[8..24].try_into().ok()?;
    let dst: [u8; 16] = ip[24..40].try_into().ok()?;
    Some((IpAddr::from(src), IpAddr::from(dst)))
}
