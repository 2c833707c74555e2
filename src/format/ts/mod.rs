//! # MPEG Transport Stream (TS) Parsing
//!
//! The container-level layer the indexer is built on:
//!
//! - 188-byte packet framing with sync-loss recovery ([`PacketReader`])
//! - Stateless header and adaptation field decoding ([`TsPacket`])
//! - PSI section reassembly and CRC validation ([`SectionReassembler`], [`PsiSection`])
//! - PAT/PMT decoding ([`PatParser`], [`PmtParser`])
//! - PES header and PTS extraction ([`PESHeader`])
//!
//! Payloads are never decoded; only what is needed to find PIDs, PCR and PTS.
//!
//! ## Example Usage
//!
//! ```rust
//! use tsindex::format::ts::{synth, PacketReader, PatParser, TsPacket, PID_PAT};
//! use std::io::Cursor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let packets = synth::section_packets(PID_PAT, &synth::pat_section(&[(1, 0x100)], 0, 0));
//! let mut reader = PacketReader::new(Cursor::new(synth::flatten(&packets)))?;
//!
//! let mut pat = PatParser::new();
//! while let Some(buf) = reader.read_validated_packet()? {
//!     if pat.push_packet(&TsPacket::new(&buf))? {
//!         break;
//!     }
//! }
//! assert_eq!(pat.finish().programs.get(&0x100), Some(&1));
//! # Ok(())
//! # }
//! ```

/// Low-level TS packet field access
pub mod parser;

/// PES header decoding
pub mod pes;

/// PAT and PMT decoding
pub mod psi;

/// Packet framing over seekable byte sources
pub mod reader;

/// PSI section reassembly and table completion
pub mod section;

/// Synthetic stream builders for tests and documentation
pub mod synth;

/// Core TS types and constants
pub mod types;

pub use parser::{AdaptationFieldControl, TsPacket};
pub use pes::PESHeader;
pub use psi::{
    find_and_parse_pat, find_and_parse_pmts, parse_pat, parse_pmt, ElementaryStream,
    PatParser, PmtParser, PmtResult, ProgramAssociation, ProgramMap,
};
pub use reader::PacketReader;
pub use section::{PsiSection, ReassemblyState, SectionReassembler, TableCompletion};
pub use types::{
    is_audio_stream_type, stream_type_name, PacketBuf, Pcr, MAX_PCR, PID_NULL, PID_PAT,
    TS_PACKET_SIZE,
};
