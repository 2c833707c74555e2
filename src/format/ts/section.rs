use super::parser::TsPacket;
use super::types::*;
use crate::error::{Result, TsIndexError};
use crate::utils::Crc32Mpeg2;
use bytes::{Bytes, BytesMut};
use log::{debug, trace};

/// Reassembly state of one PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// No unit start seen, or the last section ended in stuffing.
    Empty,
    /// A section has started and is still missing bytes.
    Accumulating,
    /// The last byte received closed a section.
    Complete,
}

/// Collects the PSI payload of one PID into whole sections.
///
/// Sections are self-delimiting through their 12-bit `section_length`, so a
/// partial section interrupted by a new unit start is dropped in favour of the
/// one the pointer field announces.
#[derive(Debug)]
pub struct SectionReassembler {
    pid: u16,
    state: ReassemblyState,
    buffer: BytesMut,
}

impl SectionReassembler {
    pub fn new(pid: u16) -> Self {
        Self {
            pid,
            state: ReassemblyState::Empty,
            buffer: BytesMut::with_capacity(MAX_SECTION_LENGTH + 3),
        }
    }

    pub fn pid(&self) -> u16 {
        self.pid
    }

    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    /// Feeds one packet of this PID, returning every section it completes.
    pub fn push(&mut self, packet: &TsPacket<'_>) -> Result<Vec<Bytes>> {
        let payload = packet.payload()?;
        let mut sections = Vec::new();
        if payload.is_empty() {
            return Ok(sections);
        }

        if packet.unit_start() {
            let pointer = payload[0] as usize;
            let rest = &payload[1..];
            if pointer > rest.len() {
                debug!("pid 0x{:04x}: pointer field {} overruns payload", self.pid, pointer);
                self.reset();
                return Ok(sections);
            }

            // The bytes before the pointer target finish the previous section.
            if self.state == ReassemblyState::Accumulating {
                self.buffer.extend_from_slice(&rest[..pointer]);
                self.drain_sections(&mut sections);
                if self.state == ReassemblyState::Accumulating {
                    trace!("pid 0x{:04x}: dropping {} byte partial section", self.pid, self.buffer.len());
                }
            }

            self.buffer.clear();
            self.buffer.extend_from_slice(&rest[pointer..]);
            self.state = ReassemblyState::Accumulating;
        } else {
            match self.state {
                ReassemblyState::Empty => return Ok(sections),
                ReassemblyState::Complete if payload[0] == 0xFF => return Ok(sections),
                _ => {}
            }
            self.buffer.extend_from_slice(payload);
            self.state = ReassemblyState::Accumulating;
        }

        self.drain_sections(&mut sections);
        Ok(sections)
    }

    fn drain_sections(&mut self, sections: &mut Vec<Bytes>) {
        loop {
            if self.buffer.is_empty() {
                if !sections.is_empty() {
                    self.state = ReassemblyState::Complete;
                }
                return;
            }
            if self.buffer[0] == 0xFF {
                // Stuffing up to the end of the packet.
                self.buffer.clear();
                self.state = if sections.is_empty() {
                    ReassemblyState::Empty
                } else {
                    ReassemblyState::Complete
                };
                return;
            }
            if self.buffer.len() < 3 {
                return;
            }

            let section_length = (((self.buffer[1] & 0x0F) as usize) << 8) | self.buffer[2] as usize;
            if section_length > MAX_SECTION_LENGTH {
                debug!("pid 0x{:04x}: section length {} too large", self.pid, section_length);
                self.reset();
                return;
            }
            let total = 3 + section_length;
            if self.buffer.len() < total {
                return;
            }

            let section = self.buffer.split_to(total).freeze();
            trace!("pid 0x{:04x}: section of {} bytes complete", self.pid, total);
            sections.push(section);
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.state = ReassemblyState::Empty;
    }
}

/// A complete long-form PSI section that passed structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsiSection {
    pub table_id: u8,
    pub table_id_extension: u16,
    pub version_number: u8,
    pub current_next: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    raw: Bytes,
}

impl PsiSection {
    /// Validates a reassembled section: syntax indicator, length and CRC_32.
    pub fn parse(raw: Bytes) -> Result<Self> {
        Self::parse_with(raw, &Crc32Mpeg2::new())
    }

    pub fn parse_with(raw: Bytes, crc: &Crc32Mpeg2) -> Result<Self> {
        if raw.len() < 3 {
            return Err(TsIndexError::MalformedSection("section shorter than its header".into()));
        }
        if raw[1] & 0x80 == 0 {
            return Err(TsIndexError::MalformedSection(format!(
                "table 0x{:02x} is not a long-form section",
                raw[0]
            )));
        }
        let section_length = (((raw[1] & 0x0F) as usize) << 8) | raw[2] as usize;
        if section_length < 9 || raw.len() != 3 + section_length {
            return Err(TsIndexError::MalformedSection(format!(
                "bad section length {} for {} bytes",
                section_length,
                raw.len()
            )));
        }
        if !crc.verify(&raw) {
            return Err(TsIndexError::MalformedSection(format!(
                "CRC mismatch in table 0x{:02x}",
                raw[0]
            )));
        }

        Ok(Self {
            table_id: raw[0],
            table_id_extension: ((raw[3] as u16) << 8) | raw[4] as u16,
            version_number: (raw[5] >> 1) & 0x1F,
            current_next: raw[5] & 0x01 != 0,
            section_number: raw[6],
            last_section_number: raw[7],
            raw,
        })
    }

    /// Table body between the 8-byte header and the CRC_32.
    pub fn body(&self) -> &[u8] {
        &self.raw[8..self.raw.len() - 4]
    }

    pub fn is_last(&self) -> bool {
        self.section_number == self.last_section_number
    }
}

/// Completion tracking for one multi-section table.
///
/// A table is complete once a valid section with
/// `section_number == last_section_number` has been seen after the first unit
/// start of its PID. Sections only leave the reassembler after a unit start,
/// so the second condition holds for every section passed in here.
#[derive(Debug)]
pub struct TableCompletion {
    pid: u16,
    table_id: u8,
    reassembler: SectionReassembler,
    sections_seen: usize,
    complete: bool,
}

impl TableCompletion {
    pub fn new(pid: u16, table_id: u8) -> Self {
        Self {
            pid,
            table_id,
            reassembler: SectionReassembler::new(pid),
            sections_seen: 0,
            complete: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn sections_seen(&self) -> usize {
        self.sections_seen
    }

    /// Feeds a packet and returns the valid sections of the expected table.
    ///
    /// Malformed sections and sections of other tables are logged and
    /// dropped; packets arriving after completion are ignored.
    pub fn push(&mut self, packet: &TsPacket<'_>, crc: &Crc32Mpeg2) -> Result<Vec<PsiSection>> {
        let mut valid = Vec::new();
        self.push_decoded(packet, crc, |section| {
            valid.push(section.clone());
            Ok(())
        })?;
        Ok(valid)
    }

    /// Feeds a packet and hands each valid section of the expected table to
    /// `decode`, returning how many sections it accepted.
    ///
    /// A section rejected by `decode` is dropped like a CRC failure: it does
    /// not count towards completion, so a later good copy can still finish
    /// the table.
    pub fn push_decoded<F>(
        &mut self,
        packet: &TsPacket<'_>,
        crc: &Crc32Mpeg2,
        mut decode: F,
    ) -> Result<usize>
    where
        F: FnMut(&PsiSection) -> Result<()>,
    {
        if self.complete {
            return Ok(0);
        }
        let mut accepted = 0;
        for raw in self.reassembler.push(packet)? {
            let section = match PsiSection::parse_with(raw, crc) {
                Ok(section) => section,
                Err(e) => {
                    debug!("pid 0x{:04x}: {}", self.pid, e);
                    continue;
                }
            };
            if section.table_id != self.table_id {
                trace!("pid 0x{:04x}: skipping table 0x{:02x}", self.pid, section.table_id);
                continue;
            }
            if let Err(e) = decode(&section) {
                debug!(
                    "pid 0x{:04x}: dropping section {}/{}: {}",
                    self.pid, section.section_number, section.last_section_number, e
                );
                continue;
            }
            self.sections_seen += 1;
            accepted += 1;
            if section.is_last() {
                self.complete = true;
                break;
            }
        }
        Ok(accepted)
    }
}
