//! # Stream Indexing
//!
//! Estimators that answer timing questions about a whole file, and
//! [`index_file`] which combines them with the PAT/PMT into one record per
//! program and elementary stream.
//!
//! Each estimator opens its own file handle and makes one pass (or a head
//! pass plus a tail pass for the PCR estimator). Nothing is shared between
//! scans or between files.
//!
//! ```rust,no_run
//! use tsindex::config::IndexConfig;
//! use tsindex::index::index_file;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let index = index_file("capture.ts", &IndexConfig::default(), None)?;
//! for program in &index.programs {
//!     for stream in &program.streams {
//!         println!("{} 0x{:04x} {:?}", program.program_number, stream.pid, stream.max_bitrate);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod bitrate;
pub mod pts;
pub mod rate;

pub use batch::index_files;
pub use bitrate::{estimate_bitrate_and_duration, BitrateDuration};
pub use pts::{analyze_pts_deltas, PesPtsAnalyzer, PtsCadence, PtsDeltaState};
pub use rate::{calculate_max_bitrates, PerPidRateSampler, PidRate};

use crate::config::IndexConfig;
use crate::error::{Result, TsIndexError};
use crate::format::ts::types::{PID_NULL, TS_PACKET_BITS};
use crate::format::ts::{find_and_parse_pat, find_and_parse_pmts, ProgramMap};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where the overall bitrate and duration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingSource {
    /// Supplied by the caller, e.g. from container metadata
    Hint,
    /// Measured from the first and last PCR
    Pcr,
}

/// Overall bitrate and duration of a file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreamTiming {
    /// Bits per second
    pub bitrate: f64,
    pub duration_ms: f64,
    pub source: TimingSource,
}

impl StreamTiming {
    pub fn hint(bitrate: f64, duration_ms: f64) -> Self {
        Self {
            bitrate,
            duration_ms,
            source: TimingSource::Hint,
        }
    }

    /// A hint with a zero or non-finite figure cannot drive the rate scan.
    pub fn is_usable(&self) -> bool {
        self.bitrate.is_finite()
            && self.bitrate > 0.0
            && self.duration_ms.is_finite()
            && self.duration_ms > 0.0
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms / 1000.0
    }
}

impl From<BitrateDuration> for StreamTiming {
    fn from(b: BitrateDuration) -> Self {
        Self {
            bitrate: b.bitrate,
            duration_ms: b.duration_ms,
            source: TimingSource::Pcr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Listed in the PMT
    Elementary,
    /// Carries the program clock but is not listed as a stream
    PcrOnly,
}

/// One PID of a program with its measured rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEntry {
    pub pid: u16,
    pub kind: StreamKind,
    pub stream_type: Option<u8>,
    pub type_name: Option<&'static str>,
    pub carries_pcr: bool,
    /// `None` when the PID never appeared in the rate scan
    pub packet_count: Option<u64>,
    /// Bits per second averaged over the whole duration
    pub mean_bitrate: Option<f64>,
    pub max_bitrate: Option<f64>,
    /// Only set for audio streams
    pub pts_cadence: Option<PtsCadence>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramIndex {
    pub program_number: u16,
    pub pmt_pid: u16,
    pub pcr_pid: u16,
    pub streams: Vec<StreamEntry>,
}

/// Everything learned about one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamIndex {
    pub path: PathBuf,
    pub timing: Option<StreamTiming>,
    pub transport_stream_id: Option<u16>,
    pub network_pid: Option<u16>,
    pub pat_complete: bool,
    pub programs: Vec<ProgramIndex>,
    /// PMT PIDs announced by the PAT whose table never completed
    pub missing_pmts: Vec<u16>,
}

/// Resolves the file timing, preferring a usable hint over the PCR scan.
///
/// Missing or degenerate PCRs are not fatal here: the index is still built,
/// just without rate figures.
fn resolve_timing(
    path: &Path,
    config: &IndexConfig,
    hint: Option<StreamTiming>,
) -> Result<Option<StreamTiming>> {
    if let Some(hint) = hint {
        if hint.is_usable() {
            return Ok(Some(hint));
        }
        info!("ignoring timing hint {:?}, measuring from PCR", hint);
    }
    match estimate_bitrate_and_duration(path, config.pcr_lookback_bytes) {
        Ok(estimate) => Ok(estimate.map(StreamTiming::from)),
        Err(e @ (TsIndexError::PcrNotFound { .. } | TsIndexError::DegeneratePcrSpan { .. })) => {
            warn!("{}: no timing, {}", path.display(), e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Indexes one file: timing, programs, per-PID rates and audio PTS cadence.
pub fn index_file<P: AsRef<Path>>(
    path: P,
    config: &IndexConfig,
    hint: Option<StreamTiming>,
) -> Result<StreamIndex> {
    let path = path.as_ref();
    config.validate()?;

    let timing = resolve_timing(path, config, hint)?;
    let pat = find_and_parse_pat(path)?;
    let pmts = find_and_parse_pmts(path, pat.programs.keys().copied())?;

    let rates = match timing {
        Some(t) => calculate_max_bitrates(path, t.bitrate, config.rate_window_secs)?,
        None => BTreeMap::new(),
    };

    let audio_pids: Vec<u16> = pmts
        .programs
        .values()
        .flat_map(|map| map.pids.iter())
        .filter(|(_, es)| es.is_audio())
        .map(|(&pid, _)| pid)
        .collect();
    let cadences = if config.analyze_audio_pts && !audio_pids.is_empty() {
        analyze_pts_deltas(path, audio_pids)?
    } else {
        BTreeMap::new()
    };

    let programs: Vec<ProgramIndex> = pmts
        .programs
        .iter()
        .map(|(&pmt_pid, map)| {
            let program_number = pat.programs.get(&pmt_pid).copied().unwrap_or(map.program_number);
            build_program(program_number, pmt_pid, map, timing.as_ref(), &rates, &cadences)
        })
        .collect();

    info!(
        "{}: {} programs, {} streams",
        path.display(),
        programs.len(),
        programs.iter().map(|p| p.streams.len()).sum::<usize>()
    );

    Ok(StreamIndex {
        path: path.to_path_buf(),
        timing,
        transport_stream_id: pat.transport_stream_id,
        network_pid: pat.network_pid,
        pat_complete: pat.complete,
        programs,
        missing_pmts: pmts.missing,
    })
}

fn build_program(
    program_number: u16,
    pmt_pid: u16,
    map: &ProgramMap,
    timing: Option<&StreamTiming>,
    rates: &BTreeMap<u16, PidRate>,
    cadences: &BTreeMap<u16, PtsCadence>,
) -> ProgramIndex {
    let entry = |pid: u16, kind: StreamKind, stream_type: Option<u8>, type_name: Option<&'static str>| {
        let rate = rates.get(&pid);
        StreamEntry {
            pid,
            kind,
            stream_type,
            type_name,
            carries_pcr: pid == map.pcr_pid,
            packet_count: rate.map(|r| r.packet_count),
            mean_bitrate: rate
                .zip(timing)
                .map(|(r, t)| r.packet_count as f64 * TS_PACKET_BITS / t.duration_secs()),
            max_bitrate: rate.and_then(|r| r.max_bitrate),
            pts_cadence: cadences.get(&pid).copied(),
        }
    };

    let mut streams = Vec::with_capacity(map.pids.len() + 1);
    if map.pcr_pid != PID_NULL && !map.pids.contains_key(&map.pcr_pid) {
        streams.push(entry(map.pcr_pid, StreamKind::PcrOnly, None, None));
    }
    for (&pid, es) in &map.pids {
        streams.push(entry(
            pid,
            StreamKind::Elementary,
            Some(es.stream_type),
            Some(es.type_name),
        ));
    }

    ProgramIndex {
        program_number,
        pmt_pid,
        pcr_pid: map.pcr_pid,
        streams,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::ElementaryStream;

    #[test]
    fn test_hint_usability() {
        assert!(StreamTiming::hint(1e6, 1000.0).is_usable());
        assert!(!StreamTiming::hint(0.0, 1000.0).is_usable());
        assert!(!StreamTiming::hint(1e6, 0.0).is_usable());
        assert!(!StreamTiming::hint(f64::NAN, 1.0).is_usable());
    }

    #[test]
    fn test_pcr_only_entry_and_missing_rates() {
        let map = ProgramMap {
            program_number: 3,
            pcr_pid: 0x30,
            pids: BTreeMap::from([(0x31, ElementaryStream::new(0x1b))]),
        };
        let rates = BTreeMap::from([(
            0x30,
            PidRate {
                packet_count: 500,
                max_bitrate: Some(800_000.0),
            },
        )]);
        let timing = StreamTiming::hint(1e6, 2000.0);

        let program = build_program(3, 0x1000, &map, Some(&timing), &rates, &BTreeMap::new());
        assert_eq!(program.streams.len(), 2);

        let pcr = &program.streams[0];
        assert_eq!(pcr.kind, StreamKind::PcrOnly);
        assert!(pcr.carries_pcr);
        assert_eq!(pcr.mean_bitrate, Some(500.0 * 1504.0 / 2.0));
        assert_eq!(pcr.max_bitrate, Some(800_000.0));

        let video = &program.streams[1];
        assert_eq!(video.type_name, Some("H.264"));
        assert!(!video.carries_pcr);
        assert_eq!(video.packet_count, None);
        assert_eq!(video.mean_bitrate, None);
    }
}
