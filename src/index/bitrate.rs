use crate::error::{Result, TsIndexError};
use crate::format::ts::types::PCR_HZ;
use crate::format::ts::{PacketReader, Pcr, TsPacket};
use log::{debug, info};
use serde::Serialize;
use std::io::{Read, Seek};
use std::path::Path;
use std::time::Duration;

/// Overall bitrate and duration derived from the first and last PCR of one PID.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BitrateDuration {
    /// Bits per second over the measured byte span
    pub bitrate: f64,
    pub duration_ms: f64,
    pub pcr_pid: u16,
    pub first_pcr: Pcr,
    pub last_pcr: Pcr,
    /// Packet start offsets of the two PCR samples
    pub first_offset: u64,
    pub last_offset: u64,
}

impl BitrateDuration {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_ms / 1000.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct PcrSample {
    pid: u16,
    pcr: Pcr,
    offset: u64,
}

fn read_pcr(packet: &TsPacket<'_>) -> Option<Pcr> {
    match packet.pcr() {
        Ok(pcr) => pcr,
        Err(e) => {
            debug!("ignoring PCR on pid 0x{:04x}: {}", packet.pid(), e);
            None
        }
    }
}

/// Runs the head and tail PCR scans over an already opened reader.
///
/// Returns `Ok(None)` when the source holds no complete packet.
pub fn estimate_from_reader<R: Read + Seek>(
    reader: &mut PacketReader<R>,
    lookback_bytes: u64,
) -> Result<Option<BitrateDuration>> {
    let mut seen_packet = false;
    let mut first = None;
    while let Some(buf) = reader.read_validated_packet()? {
        seen_packet = true;
        let packet = TsPacket::new(&buf);
        if let Some(pcr) = read_pcr(&packet) {
            first = Some(PcrSample {
                pid: packet.pid(),
                pcr,
                offset: reader.last_packet_offset().unwrap_or_default(),
            });
            break;
        }
    }
    if !seen_packet {
        return Ok(None);
    }
    let first = first.ok_or(TsIndexError::PcrNotFound { pid: None })?;
    debug!(
        "first PCR {:.6}s on pid 0x{:04x} at {}",
        first.pcr.as_secs_f64(),
        first.pid,
        first.offset
    );

    reader.seek_tail(lookback_bytes)?;
    let mut last = None;
    while let Some(buf) = reader.read_validated_packet()? {
        let packet = TsPacket::new(&buf);
        if packet.pid() != first.pid {
            continue;
        }
        if let Some(pcr) = read_pcr(&packet) {
            last = Some(PcrSample {
                pid: first.pid,
                pcr,
                offset: reader.last_packet_offset().unwrap_or_default(),
            });
        }
    }
    let last = last.ok_or(TsIndexError::PcrNotFound {
        pid: Some(first.pid),
    })?;
    debug!("last PCR {:.6}s at {}", last.pcr.as_secs_f64(), last.offset);

    let span = first.pcr.wrapping_span_to(last.pcr);
    if span == 0 {
        return Err(TsIndexError::DegeneratePcrSpan { pid: first.pid });
    }
    let seconds = span as f64 / PCR_HZ as f64;
    let bytes = last.offset.saturating_sub(first.offset);

    let result = BitrateDuration {
        bitrate: (bytes * 8) as f64 / seconds,
        duration_ms: seconds * 1000.0,
        pcr_pid: first.pid,
        first_pcr: first.pcr,
        last_pcr: last.pcr,
        first_offset: first.offset,
        last_offset: last.offset,
    };
    info!(
        "bitrate {:.0} bit/s over {:.3} s (pcr pid 0x{:04x})",
        result.bitrate, seconds, result.pcr_pid
    );
    Ok(Some(result))
}

/// Opens `path` and estimates its overall bitrate and duration from PCRs.
pub fn estimate_bitrate_and_duration<P: AsRef<Path>>(
    path: P,
    lookback_bytes: u64,
) -> Result<Option<BitrateDuration>> {
    let mut reader = PacketReader::open(path)?;
    estimate_from_reader(&mut reader, lookback_bytes)
}
