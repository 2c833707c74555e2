use crate::error::Result;
use crate::format::ts::pes::MAX_PES_HEADER_SIZE;
use crate::format::ts::types::PTS_MASK;
use crate::format::ts::{PESHeader, PacketReader, TsPacket};
use bytes::BytesMut;
use log::{debug, trace};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Seek};
use std::path::Path;

/// Running PTS delta statistics of one PID.
///
/// A zero PTS counts as unset: no delta is taken across it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtsDeltaState {
    pts: u64,
    delta: u64,
    min_delta: Option<u64>,
    constant: bool,
    observed: u64,
}

impl Default for PtsDeltaState {
    fn default() -> Self {
        Self {
            pts: 0,
            delta: 0,
            min_delta: None,
            constant: true,
            observed: 0,
        }
    }
}

impl PtsDeltaState {
    /// Folds in the next PTS of the stream.
    pub fn observe(&mut self, pts: u64) {
        let last_pts = self.pts;
        let last_delta = self.delta;
        self.pts = pts;
        self.observed += 1;

        if pts > 0 && last_pts > 0 {
            self.delta = pts.wrapping_sub(last_pts) & PTS_MASK;
        }
        if last_delta > 0 && self.delta > 0 && last_delta != self.delta {
            debug!("PTS delta changed from {} to {}", last_delta, self.delta);
            self.constant = false;
        }
        if self.delta > 0 {
            self.min_delta = Some(self.min_delta.map_or(self.delta, |min| min.min(self.delta)));
        }
    }

    pub fn min_delta(&self) -> Option<u64> {
        self.min_delta
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn cadence(&self) -> PtsCadence {
        PtsCadence {
            min_delta: self.min_delta,
            is_constant: self.constant,
            pts_count: self.observed,
        }
    }
}

/// Summary of a PID's PTS spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PtsCadence {
    /// Smallest nonzero delta in 90 kHz ticks, `None` if fewer than two PTS
    pub min_delta: Option<u64>,
    /// No two consecutive nonzero deltas differed
    pub is_constant: bool,
    pub pts_count: u64,
}

#[derive(Debug, Default)]
struct PidTrack {
    fragment: BytesMut,
    state: PtsDeltaState,
}

/// Collects PES header bytes per PID and tracks PTS deltas.
///
/// A fragment is evaluated when the next unit start of its PID arrives, so
/// the final PES of each PID is never counted.
pub struct PesPtsAnalyzer {
    targets: Vec<u16>,
    tracks: HashMap<u16, PidTrack>,
}

impl PesPtsAnalyzer {
    pub fn new<I: IntoIterator<Item = u16>>(pids: I) -> Self {
        Self {
            targets: pids.into_iter().collect(),
            tracks: HashMap::new(),
        }
    }

    pub fn push_packet(&mut self, packet: &TsPacket<'_>) -> Result<()> {
        let pid = packet.pid();
        if !self.targets.contains(&pid) {
            return Ok(());
        }
        let payload: &[u8] = if packet.has_payload() {
            packet.payload()?
        } else {
            &[]
        };
        let track = self.tracks.entry(pid).or_default();

        if packet.unit_start() {
            if !track.fragment.is_empty() {
                match PESHeader::parse(&track.fragment) {
                    Ok(PESHeader { pts: Some(pts), .. }) => track.state.observe(pts),
                    Ok(_) => trace!("PES on pid 0x{:04x} without PTS", pid),
                    Err(e) => trace!("skipping PES on pid 0x{:04x}: {}", pid, e),
                }
            }
            // A unit start without payload leaves the fragment empty, so the
            // continuations of that PES are dropped up to the next unit start.
            track.fragment.clear();
            append_capped(&mut track.fragment, payload);
        } else if !track.fragment.is_empty() {
            append_capped(&mut track.fragment, payload);
        }
        Ok(())
    }

    /// Results for every target PID that appeared in the stream.
    pub fn finish(self) -> BTreeMap<u16, PtsCadence> {
        self.tracks
            .into_iter()
            .map(|(pid, track)| (pid, track.state.cadence()))
            .collect()
    }
}

fn append_capped(fragment: &mut BytesMut, payload: &[u8]) {
    let room = MAX_PES_HEADER_SIZE.saturating_sub(fragment.len());
    fragment.extend_from_slice(&payload[..payload.len().min(room)]);
}

/// Runs a [`PesPtsAnalyzer`] over every validated packet of `reader`.
pub fn analyze_reader<R, I>(reader: &mut PacketReader<R>, pids: I) -> Result<BTreeMap<u16, PtsCadence>>
where
    R: Read + Seek,
    I: IntoIterator<Item = u16>,
{
    let mut analyzer = PesPtsAnalyzer::new(pids);
    while let Some(buf) = reader.read_validated_packet()? {
        if let Err(e) = analyzer.push_packet(&TsPacket::new(&buf)) {
            debug!("skipping packet at {:?}: {}", reader.last_packet_offset(), e);
        }
    }
    Ok(analyzer.finish())
}

/// Opens `path` and analyses the PTS deltas of `pids`.
pub fn analyze_pts_deltas<P, I>(path: P, pids: I) -> Result<BTreeMap<u16, PtsCadence>>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = u16>,
{
    let mut reader = PacketReader::open(path)?;
    analyze_reader(&mut reader, pids)
}
