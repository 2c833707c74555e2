use serde::Serialize;
use std::time::Duration;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1fff;
pub const PID_MAX: u16 = 0x1fff;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary Stream Types
pub const STREAM_TYPE_MPEG1_VIDEO: u8 = 0x01;
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
pub const STREAM_TYPE_PRIVATE_PES: u8 = 0x06;
pub const STREAM_TYPE_AAC: u8 = 0x0f;
pub const STREAM_TYPE_AAC_LATM: u8 = 0x11;
pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_H265: u8 = 0x24;
pub const STREAM_TYPE_AC3: u8 = 0x81;
pub const STREAM_TYPE_EAC3: u8 = 0x87;

// Constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const TS_PACKET_BITS: f64 = (TS_PACKET_SIZE * 8) as f64;
pub const PTS_HZ: u64 = 90_000;
pub const PCR_HZ: u64 = 27_000_000;

/// Longest PSI section body allowed after the 3-byte section header.
pub const MAX_SECTION_LENGTH: usize = 1021;

/// Ceiling of the PCR counter: `2^33 * 300 + 2^9`.
pub const MAX_PCR: u64 = (1u64 << 33) * 300 + (1u64 << 9);

/// Mask of the 33-bit PTS/DTS counter.
pub const PTS_MASK: u64 = (1u64 << 33) - 1;

/// Raw 188-byte packet as produced by the packet reader.
pub type PacketBuf = [u8; TS_PACKET_SIZE];

/// Program Clock Reference sample in 27 MHz ticks (`base * 300 + extension`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Pcr(u64);

impl Pcr {
    /// Builds a PCR from its 33-bit 90 kHz base and 9-bit extension.
    pub fn from_parts(base: u64, extension: u16) -> Self {
        Pcr((base & PTS_MASK) * 300 + extension as u64)
    }

    /// Wraps an already combined 27 MHz tick count.
    pub fn from_ticks(ticks: u64) -> Self {
        Pcr(ticks % MAX_PCR)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Ticks elapsed from `self` to `later`, assuming at most one wrap of the
    /// counter in between.
    ///
    /// Equal samples are treated as no elapsed time.
    pub fn wrapping_span_to(&self, later: Pcr) -> u64 {
        if later.0 >= self.0 {
            later.0 - self.0
        } else {
            (MAX_PCR - self.0) + later.0
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / PCR_HZ as f64
    }
}

/// Converts a 27 MHz tick span to a duration.
pub fn pcr_ticks_to_time(ticks: u64) -> Duration {
    Duration::from_nanos(((ticks as u128 * 1_000_000_000) / PCR_HZ as u128) as u64)
}

pub fn pts_to_time(pts: u64) -> Duration {
    Duration::from_nanos(((pts as u128 * 1_000_000_000) / PTS_HZ as u128) as u64)
}

/// Human readable name of a PMT `stream_type` code.
pub fn stream_type_name(stream_type: u8) -> &'static str {
    match stream_type {
        0x00 => "Reserved",
        STREAM_TYPE_MPEG1_VIDEO => "MPEG-1 Video",
        STREAM_TYPE_MPEG2_VIDEO => "MPEG-2 Video",
        STREAM_TYPE_MPEG1_AUDIO => "MPEG-1 Audio",
        STREAM_TYPE_MPEG2_AUDIO => "MPEG-2 Audio",
        0x05 => "Private Sections",
        STREAM_TYPE_PRIVATE_PES => "PES Private Data",
        0x07 => "MHEG",
        0x08 => "DSM-CC",
        0x09 => "H.222.1",
        0x0a => "DSM-CC Type A",
        0x0b => "DSM-CC Type B",
        0x0c => "DSM-CC Type C",
        0x0d => "DSM-CC Type D",
        0x0e => "Auxiliary",
        STREAM_TYPE_AAC => "AAC",
        0x10 => "MPEG-4 Visual",
        STREAM_TYPE_AAC_LATM => "AAC LATM",
        0x12 => "MPEG-4 SL PES",
        0x13 => "MPEG-4 SL Sections",
        0x14 => "DSM-CC Download",
        0x15 => "Metadata PES",
        0x1b => "H.264",
        0x1c => "MPEG-4 Audio",
        STREAM_TYPE_H265 => "H.265",
        0x42 => "AVS Video",
        0x7f => "IPMP",
        STREAM_TYPE_AC3 => "AC-3",
        0x86 => "SCTE-35",
        STREAM_TYPE_EAC3 => "E-AC-3",
        _ => "Unknown",
    }
}

/// Whether a `stream_type` carries audio access units.
pub fn is_audio_stream_type(stream_type: u8) -> bool {
    matches!(
        stream_type,
        STREAM_TYPE_MPEG1_AUDIO
            | STREAM_TYPE_MPEG2_AUDIO
            | STREAM_TYPE_AAC
            | STREAM_TYPE_AAC_LATM
            | 0x1c
            | STREAM_TYPE_AC3
            | STREAM_TYPE_EAC3
    )
}
