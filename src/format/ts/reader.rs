use super::parser::TsPacket;
use super::types::*;
use crate::error::Result;
use log::{debug, trace};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

/// Sequential 188-byte packet framing over a seekable byte source.
///
/// The reader keeps its own byte position so that scanners can record packet
/// offsets without extra seek calls. End of input, including a trailing
/// partial packet, is reported as `Ok(None)` rather than as an error.
pub struct PacketReader<R: Read + Seek> {
    source: BufReader<R>,
    position: u64,
    last_packet_offset: Option<u64>,
    sync_losses: u64,
}

impl PacketReader<File> {
    /// Opens a file and aligns the reader to its first sync byte.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!("opened {}", path.as_ref().display());
        Self::new(file)
    }
}

impl<R: Read + Seek> PacketReader<R> {
    /// Wraps `source` at its current position and resynchronizes.
    pub fn new(mut source: R) -> Result<Self> {
        let position = source.stream_position()?;
        let mut reader = Self {
            source: BufReader::new(source),
            position,
            last_packet_offset: None,
            sync_losses: 0,
        };
        reader.resync()?;
        Ok(reader)
    }

    /// Current byte offset of the cursor.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Start offset of the most recently returned validated packet.
    pub fn last_packet_offset(&self) -> Option<u64> {
        self.last_packet_offset
    }

    /// Number of packets that failed validation and triggered a resync.
    pub fn sync_losses(&self) -> u64 {
        self.sync_losses
    }

    /// Advances to the next 0x47 byte, leaving the cursor on it.
    ///
    /// Returns `false` when the source ends first; the cursor is then at end
    /// of input.
    pub fn resync(&mut self) -> Result<bool> {
        loop {
            let buf = match self.source.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if buf.is_empty() {
                trace!("no sync byte before end of input at {}", self.position);
                return Ok(false);
            }
            match buf.iter().position(|&b| b == TS_SYNC_BYTE) {
                Some(skip) => {
                    self.source.consume(skip);
                    self.position += skip as u64;
                    if skip > 0 {
                        debug!("found sync byte at {}", self.position);
                    }
                    return Ok(true);
                }
                None => {
                    let len = buf.len();
                    self.source.consume(len);
                    self.position += len as u64;
                }
            }
        }
    }

    /// Reads the next 188 bytes without validating them.
    pub fn next_packet(&mut self) -> Result<Option<PacketBuf>> {
        let mut packet = [0u8; TS_PACKET_SIZE];
        let read = self.fill(&mut packet)?;
        if read < TS_PACKET_SIZE {
            if read > 0 {
                trace!("dropping {} trailing bytes at end of input", read);
            }
            return Ok(None);
        }
        Ok(Some(packet))
    }

    /// Reads the next packet that passes structural validation.
    ///
    /// A failing packet costs one sync loss: the cursor moves back to one byte
    /// past the failed packet start and resynchronizes from there, so every
    /// retry advances at least one byte.
    pub fn read_validated_packet(&mut self) -> Result<Option<PacketBuf>> {
        loop {
            let start = self.position;
            let Some(packet) = self.next_packet()? else {
                return Ok(None);
            };
            if TsPacket::new(&packet).validate() {
                self.last_packet_offset = Some(start);
                return Ok(Some(packet));
            }

            self.sync_losses += 1;
            debug!("sync lost at offset {}", start);
            self.seek_to(start + 1)?;
            if !self.resync()? {
                return Ok(None);
            }
        }
    }

    /// Repositions to `lookback` bytes before end of input (or the start for
    /// shorter sources) and resynchronizes.
    pub fn seek_tail(&mut self, lookback: u64) -> Result<bool> {
        let len = self.source.seek(SeekFrom::End(0))?;
        self.position = len;
        self.seek_to(len.saturating_sub(lookback))?;
        self.resync()
    }

    /// Iterator over validated packets.
    pub fn packets(&mut self) -> Packets<'_, R> {
        Packets { reader: self }
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        let delta = offset as i64 - self.position as i64;
        self.source.seek_relative(delta)?;
        self.position = offset;
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.position += filled as u64;
        Ok(filled)
    }
}

/// Iterator returned by [`PacketReader::packets`].
pub struct Packets<'a, R: Read + Seek> {
    reader: &'a mut PacketReader<R>,
}

impl<R: Read + Seek> Iterator for Packets<'_, R> {
    type Item = Result<PacketBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_validated_packet().transpose()
    }
}
