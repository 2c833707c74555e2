//! Builders for small synthetic transport streams.
//!
//! These produce byte-exact packets, PSI sections and PES headers so that the
//! scanners can be exercised without fixture files. They only cover what the
//! indexer reads; nothing here is a general purpose muxer.

use super::types::*;
use crate::utils::Crc32Mpeg2;

fn header(pid: u16, unit_start: bool, afc: u8, cc: u8) -> [u8; TS_HEADER_SIZE] {
    let mut b1 = ((pid >> 8) & 0x1f) as u8;
    if unit_start {
        b1 |= 0x40;
    }
    [TS_SYNC_BYTE, b1, (pid & 0xff) as u8, (afc << 4) | (cc & 0x0f)]
}

/// Encodes a PCR into the 6-byte adaptation field layout.
pub fn encode_pcr(pcr: Pcr) -> [u8; 6] {
    let base = pcr.value() / 300;
    let ext = pcr.value() % 300;
    let raw = (base << 15) | (0x3f << 9) | ext;
    let bytes = raw.to_be_bytes();
    [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
}

/// Payload-only packet; a short payload is padded with 0xFF.
pub fn payload_packet(pid: u16, unit_start: bool, cc: u8, payload: &[u8]) -> PacketBuf {
    let mut packet = [0xFFu8; TS_PACKET_SIZE];
    packet[..TS_HEADER_SIZE].copy_from_slice(&header(pid, unit_start, 0b01, cc));
    let len = payload.len().min(TS_PACKET_SIZE - TS_HEADER_SIZE);
    packet[TS_HEADER_SIZE..TS_HEADER_SIZE + len].copy_from_slice(&payload[..len]);
    packet
}

/// Adaptation-only packet carrying a PCR.
pub fn pcr_packet(pid: u16, pcr: Pcr) -> PacketBuf {
    let mut packet = [0xFFu8; TS_PACKET_SIZE];
    packet[..TS_HEADER_SIZE].copy_from_slice(&header(pid, false, 0b10, 0));
    packet[4] = (TS_PACKET_SIZE - TS_HEADER_SIZE - 1) as u8;
    packet[5] = 0x10;
    packet[6..12].copy_from_slice(&encode_pcr(pcr));
    packet
}

/// Packet with a PCR-bearing adaptation field followed by payload.
pub fn pcr_payload_packet(
    pid: u16,
    pcr: Pcr,
    unit_start: bool,
    cc: u8,
    payload: &[u8],
) -> PacketBuf {
    let mut packet = [0xFFu8; TS_PACKET_SIZE];
    packet[..TS_HEADER_SIZE].copy_from_slice(&header(pid, unit_start, 0b11, cc));
    packet[4] = 7;
    packet[5] = 0x10;
    packet[6..12].copy_from_slice(&encode_pcr(pcr));
    let len = payload.len().min(TS_PACKET_SIZE - 12);
    packet[12..12 + len].copy_from_slice(&payload[..len]);
    packet
}

/// Long-form PSI section with a valid CRC_32.
pub fn psi_section(
    table_id: u8,
    table_id_extension: u16,
    section_number: u8,
    last_section_number: u8,
    body: &[u8],
) -> Vec<u8> {
    // extension(2) + version(1) + numbers(2) + body + crc(4)
    let section_length = 5 + body.len() + 4;
    let mut section = vec![
        table_id,
        0xB0 | ((section_length >> 8) & 0x0f) as u8,
        (section_length & 0xff) as u8,
        (table_id_extension >> 8) as u8,
        table_id_extension as u8,
        0xC1,
        section_number,
        last_section_number,
    ];
    section.extend_from_slice(body);
    let crc = Crc32Mpeg2::new().calculate(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

/// PAT section listing `(program_number, pmt_pid)` pairs.
pub fn pat_section(programs: &[(u16, u16)], section_number: u8, last_section_number: u8) -> Vec<u8> {
    let mut body = Vec::with_capacity(programs.len() * 4);
    for &(program, pid) in programs {
        body.extend_from_slice(&program.to_be_bytes());
        body.extend_from_slice(&(0xE000 | (pid & 0x1fff)).to_be_bytes());
    }
    psi_section(TABLE_ID_PAT, 1, section_number, last_section_number, &body)
}

/// PMT section listing `(stream_type, elementary_pid)` pairs.
pub fn pmt_section(
    program_number: u16,
    pcr_pid: u16,
    streams: &[(u8, u16)],
    section_number: u8,
    last_section_number: u8,
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(0xE000 | (pcr_pid & 0x1fff)).to_be_bytes());
    body.extend_from_slice(&[0xF0, 0x00]);
    for &(stream_type, pid) in streams {
        body.push(stream_type);
        body.extend_from_slice(&(0xE000 | (pid & 0x1fff)).to_be_bytes());
        body.extend_from_slice(&[0xF0, 0x00]);
    }
    psi_section(TABLE_ID_PMT, program_number, section_number, last_section_number, &body)
}

/// Splits one section over as many packets as needed, pointer field first.
pub fn section_packets(pid: u16, section: &[u8]) -> Vec<PacketBuf> {
    let mut first = Vec::with_capacity(section.len() + 1);
    first.push(0x00);
    first.extend_from_slice(section);

    first
        .chunks(TS_PACKET_SIZE - TS_HEADER_SIZE)
        .enumerate()
        .map(|(i, chunk)| payload_packet(pid, i == 0, i as u8, chunk))
        .collect()
}

/// PES header with an optional PTS (90 kHz ticks), no DTS.
pub fn pes_header(stream_id: u8, pts: Option<u64>) -> Vec<u8> {
    let mut header = vec![0x00, 0x00, 0x01, stream_id, 0x00, 0x00, 0x80];
    match pts {
        Some(pts) => {
            let pts = pts & PTS_MASK;
            header.push(0x80);
            header.push(5);
            header.push(0x20 | (((pts >> 30) & 0x07) as u8) << 1 | 0x01);
            header.extend_from_slice(&((((pts >> 15) & 0x7fff) << 1 | 1) as u16).to_be_bytes());
            header.extend_from_slice(&((((pts & 0x7fff) << 1) | 1) as u16).to_be_bytes());
        }
        None => {
            header.push(0x00);
            header.push(0);
        }
    }
    header
}

/// Concatenates packets into a flat byte stream.
pub fn flatten(packets: &[PacketBuf]) -> Vec<u8> {
    packets.iter().flat_map(|p| p.iter().copied()).collect()
}
