use super::parser::TsPacket;
use super::reader::PacketReader;
use super::section::{PsiSection, TableCompletion};
use super::types::*;
use crate::error::{Result, TsIndexError};
use crate::utils::Crc32Mpeg2;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Read, Seek};
use std::path::Path;

/// Upper bound on program entries read from one PAT section.
pub const MAX_PAT_ENTRIES: usize = 256;

/// Decoded Program Association Table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgramAssociation {
    /// PMT PID -> program number
    pub programs: BTreeMap<u16, u16>,
    /// PID announced by the program number 0 entry, if any
    pub network_pid: Option<u16>,
    pub transport_stream_id: Option<u16>,
    /// Whether the section with `section_number == last_section_number` was seen
    pub complete: bool,
}

/// Parses the program loop of one PAT section into `pat`.
pub fn parse_pat(section: &PsiSection, pat: &mut ProgramAssociation) -> Result<()> {
    if section.table_id != TABLE_ID_PAT {
        return Err(TsIndexError::MalformedSection(format!(
            "table 0x{:02x} is not a PAT",
            section.table_id
        )));
    }
    pat.transport_stream_id = Some(section.table_id_extension);

    for entry in section.body().chunks_exact(4).take(MAX_PAT_ENTRIES) {
        let program_number = ((entry[0] as u16) << 8) | entry[1] as u16;
        let pid = (((entry[2] & 0x1F) as u16) << 8) | entry[3] as u16;
        if program_number == 0 {
            pat.network_pid = Some(pid);
        } else {
            pat.programs.insert(pid, program_number);
        }
    }
    Ok(())
}

/// Push-style PAT scanner for PID 0.
pub struct PatParser {
    table: TableCompletion,
    crc: Crc32Mpeg2,
    result: ProgramAssociation,
}

impl PatParser {
    pub fn new() -> Self {
        Self {
            table: TableCompletion::new(PID_PAT, TABLE_ID_PAT),
            crc: Crc32Mpeg2::new(),
            result: ProgramAssociation::default(),
        }
    }

    /// Feeds a packet of any PID; returns true once the table is complete.
    pub fn push_packet(&mut self, packet: &TsPacket<'_>) -> Result<bool> {
        if packet.pid() != PID_PAT || self.table.is_complete() {
            return Ok(self.table.is_complete());
        }
        let result = &mut self.result;
        self.table.push_decoded(packet, &self.crc, |section| {
            debug!(
                "PAT section {}/{} with {} bytes of programs",
                section.section_number,
                section.last_section_number,
                section.body().len()
            );
            parse_pat(section, result)
        })?;
        self.result.complete = self.table.is_complete();
        Ok(self.result.complete)
    }

    pub fn is_complete(&self) -> bool {
        self.table.is_complete()
    }

    pub fn finish(self) -> ProgramAssociation {
        self.result
    }
}

impl Default for PatParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Scans packets until the PAT is complete or the input ends.
pub fn scan_pat<R: Read + Seek>(reader: &mut PacketReader<R>) -> Result<ProgramAssociation> {
    let mut parser = PatParser::new();
    while let Some(buf) = reader.read_validated_packet()? {
        let packet = TsPacket::new(&buf);
        match parser.push_packet(&packet) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => debug!("skipping PAT packet at {:?}: {}", reader.last_packet_offset(), e),
        }
    }

    let pat = parser.finish();
    if pat.complete {
        info!("PAT complete with {} programs", pat.programs.len());
    } else {
        warn!("no complete PAT found");
    }
    Ok(pat)
}

/// Opens `path` and reads its Program Association Table.
pub fn find_and_parse_pat<P: AsRef<Path>>(path: P) -> Result<ProgramAssociation> {
    let mut reader = PacketReader::open(path)?;
    scan_pat(&mut reader)
}

/// One elementary stream announced by a PMT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementaryStream {
    pub stream_type: u8,
    pub type_name: &'static str,
}

impl ElementaryStream {
    pub fn new(stream_type: u8) -> Self {
        Self {
            stream_type,
            type_name: stream_type_name(stream_type),
        }
    }

    pub fn is_audio(&self) -> bool {
        is_audio_stream_type(self.stream_type)
    }
}

/// Decoded Program Map Table of one program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgramMap {
    pub program_number: u16,
    pub pcr_pid: u16,
    /// Elementary PID -> stream description
    pub pids: BTreeMap<u16, ElementaryStream>,
}

/// Parses one PMT section, merging its streams into `map`.
pub fn parse_pmt(section: &PsiSection, map: &mut ProgramMap) -> Result<()> {
    if section.table_id != TABLE_ID_PMT {
        return Err(TsIndexError::MalformedSection(format!(
            "table 0x{:02x} is not a PMT",
            section.table_id
        )));
    }
    let data = section.body();
    if data.len() < 4 {
        return Err(TsIndexError::MalformedSection("PMT too short for PCR PID".into()));
    }

    map.program_number = section.table_id_extension;
    map.pcr_pid = (((data[0] & 0x1F) as u16) << 8) | data[1] as u16;
    let program_info_length = (((data[2] & 0x0F) as usize) << 8) | data[3] as usize;
    let mut pos = 4 + program_info_length;
    if pos > data.len() {
        return Err(TsIndexError::MalformedSection("program info overruns PMT".into()));
    }

    while pos + 5 <= data.len() {
        let stream_type = data[pos];
        let elementary_pid = (((data[pos + 1] & 0x1F) as u16) << 8) | data[pos + 2] as u16;
        let es_info_length = (((data[pos + 3] & 0x0F) as usize) << 8) | data[pos + 4] as usize;
        pos += 5 + es_info_length;
        if pos > data.len() {
            return Err(TsIndexError::MalformedSection(format!(
                "ES info of pid 0x{:04x} overruns PMT",
                elementary_pid
            )));
        }
        map.pids.insert(elementary_pid, ElementaryStream::new(stream_type));
    }
    Ok(())
}

/// Result of a PMT scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PmtResult {
    /// PMT PID -> program map, for every program whose table completed
    pub programs: BTreeMap<u16, ProgramMap>,
    /// PMT PIDs whose table never completed
    pub missing: Vec<u16>,
}

/// Push-style scanner for a set of PMT PIDs.
pub struct PmtParser {
    tables: HashMap<u16, TableCompletion>,
    pending: BTreeSet<u16>,
    partial: BTreeMap<u16, ProgramMap>,
    result: PmtResult,
    crc: Crc32Mpeg2,
}

impl PmtParser {
    pub fn new<I: IntoIterator<Item = u16>>(pmt_pids: I) -> Self {
        let pending: BTreeSet<u16> = pmt_pids.into_iter().collect();
        let tables = pending
            .iter()
            .map(|&pid| (pid, TableCompletion::new(pid, TABLE_ID_PMT)))
            .collect();
        Self {
            tables,
            pending,
            partial: BTreeMap::new(),
            result: PmtResult::default(),
            crc: Crc32Mpeg2::new(),
        }
    }

    /// Feeds a packet of any PID; returns true once every PMT is complete.
    pub fn push_packet(&mut self, packet: &TsPacket<'_>) -> Result<bool> {
        let pid = packet.pid();
        if !self.pending.contains(&pid) {
            return Ok(self.is_done());
        }
        let Some(table) = self.tables.get_mut(&pid) else {
            return Ok(self.is_done());
        };

        // Decode into a copy so a section that fails halfway leaves no trace.
        let map = self.partial.entry(pid).or_default();
        table.push_decoded(packet, &self.crc, |section| {
            debug!(
                "PMT 0x{:04x} section {}/{}",
                pid, section.section_number, section.last_section_number
            );
            let mut scratch = map.clone();
            parse_pmt(section, &mut scratch)?;
            *map = scratch;
            Ok(())
        })?;

        if table.is_complete() {
            self.pending.remove(&pid);
            if let Some(map) = self.partial.remove(&pid) {
                self.result.programs.insert(pid, map);
            }
        }
        Ok(self.is_done())
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn finish(mut self) -> PmtResult {
        self.result.missing = self.pending.into_iter().collect();
        self.result
    }
}

/// Scans packets until every requested PMT is complete or the input ends.
pub fn scan_pmts<R, I>(reader: &mut PacketReader<R>, pmt_pids: I) -> Result<PmtResult>
where
    R: Read + Seek,
    I: IntoIterator<Item = u16>,
{
    let mut parser = PmtParser::new(pmt_pids);
    while !parser.is_done() {
        let Some(buf) = reader.read_validated_packet()? else {
            break;
        };
        let packet = TsPacket::new(&buf);
        if let Err(e) = parser.push_packet(&packet) {
            debug!("skipping PMT packet at {:?}: {}", reader.last_packet_offset(), e);
        }
    }

    let result = parser.finish();
    if !result.missing.is_empty() {
        warn!("some PMTs not found: {:04x?}", result.missing);
    }
    Ok(result)
}

/// Opens `path` and reads the PMTs of the given PIDs.
pub fn find_and_parse_pmts<P, I>(path: P, pmt_pids: I) -> Result<PmtResult>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = u16>,
{
    let mut reader = PacketReader::open(path)?;
    scan_pmts(&mut reader, pmt_pids)
}
