#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use etherparse::PacketBuilder;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError};
use pichi_core::pcap::PcapWriter;

const SRC_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 1];
const DST_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 2];
const ETH_IPV4_TCP_LEN: usize = 14 + 20 + 20;

/// Ethernet/IPv4/TCP frame padded with payload to exactly `frame_len` bytes.
pub fn tcp4(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, frame_len: usize) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(src, dst, 64)
        .tcp(sport, dport, 1, 4096);
    let mut frame = Vec::with_capacity(frame_len);
    let payload = vec![0x5A; frame_len.saturating_sub(ETH_IPV4_TCP_LEN)];
    builder.write(&mut frame, &payload).unwrap();
    frame
}

pub fn udp6(src: [u8; 16], dst: [u8; 16], sport: u16, dport: u16) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv6(src, dst, 64)
        .udp(sport, dport);
    let mut frame = Vec::new();
    builder.write(&mut frame, &[1, 2, 3, 4]).unwrap();
    frame
}

pub fn icmp4(src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(src, dst, 64)
        .icmpv4_echo_request(1, 1);
    let mut frame = Vec::new();
    builder.write(&mut frame, &[0u8; 16]).unwrap();
    frame
}

/// Write a little-endian microsecond Ethernet capture and return its bytes.
pub fn write_pcap(path: &Path, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut writer = PcapWriter::new(Vec::new()).unwrap();
    for (i, frame) in frames.iter().enumerate() {
        writer
            .write_packet(1_700_000_000 + i as u32, 1000 * i as u32, frame)
            .unwrap();
    }
    let bytes = writer.into_inner();
    fs::write(path, &bytes).unwrap();
    bytes
}

/// Frames of a capture, decoded independently with `LegacyPcapReader`.
pub fn read_frames(path: &Path) -> Vec<Vec<u8>> {
    let file = fs::File::open(path).unwrap();
    let mut reader = LegacyPcapReader::new(64 * 1024, file).unwrap();
    let mut frames = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::Legacy(packet) = block {
                    frames.push(packet.data.to_vec());
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => reader.refill().unwrap(),
            Err(err) => panic!("unreadable capture {}: {err:?}", path.display()),
        }
    }
    frames
}

pub fn inputs(paths: &[&Path]) -> Vec<PathBuf> {
    paths.iter().map(|path| path.to_path_buf()).collect()
}
