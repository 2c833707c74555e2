use super::types::*;
use crate::error::{Result, TsIndexError};
use crate::utils::BitReader;
use std::time::Duration;

/// Fixed part of a PES header: start code, stream id, length and the two
/// flag bytes plus `PES_header_data_length`.
pub const PES_FIXED_HEADER_SIZE: usize = 9;

/// Largest PES header: fixed part plus 255 bytes of optional fields.
pub const MAX_PES_HEADER_SIZE: usize = PES_FIXED_HEADER_SIZE + 255;

/// Packetized Elementary Stream (PES) header
///
/// Only the fields the indexer needs are decoded: stream id, length,
/// the timestamp flags and the PTS/DTS values themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PESHeader {
    /// Stream identifier indicating content type (video/audio/etc.)
    pub stream_id: u8,
    /// Length of the PES packet after this field, 0 for unbounded video
    pub packet_length: u16,
    /// Control field for scrambling mode
    pub scrambling_control: u8,
    /// Data alignment indicator
    pub data_alignment: bool,
    /// Flags indicating presence of PTS/DTS fields (2 bits)
    pub pts_dts_flags: u8,
    /// Length of the header data following this field
    pub header_data_length: u8,
    /// Presentation Time Stamp (33 bits, 90 kHz)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits, 90 kHz)
    pub dts: Option<u64>,
}

/// Stream ids whose PES packets carry no optional header.
fn has_optional_header(stream_id: u8) -> bool {
    !matches!(stream_id, 0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF)
}

impl PESHeader {
    /// Decodes the header at the start of a (possibly partial) PES packet.
    ///
    /// Fails on a missing start code, a header that does not fit in `data`,
    /// or timestamp fields whose prefix or marker bits are wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 6 {
            return Err(TsIndexError::InvalidData("PES packet too short".into()));
        }
        if data[..3] != [0x00, 0x00, 0x01] {
            return Err(TsIndexError::InvalidData("missing PES start code".into()));
        }

        let stream_id = data[3];
        let mut header = PESHeader {
            stream_id,
            packet_length: ((data[4] as u16) << 8) | data[5] as u16,
            scrambling_control: 0,
            data_alignment: false,
            pts_dts_flags: 0,
            header_data_length: 0,
            pts: None,
            dts: None,
        };
        if !has_optional_header(stream_id) {
            return Ok(header);
        }

        if data.len() < PES_FIXED_HEADER_SIZE {
            return Err(TsIndexError::InvalidData("PES header truncated".into()));
        }
        if data[6] & 0xC0 != 0x80 {
            return Err(TsIndexError::InvalidData(format!(
                "bad PES header marker bits 0x{:02x}",
                data[6]
            )));
        }
        header.scrambling_control = (data[6] >> 4) & 0x03;
        header.data_alignment = data[6] & 0x04 != 0;
        header.pts_dts_flags = data[7] >> 6;
        header.header_data_length = data[8];

        let optional_end = PES_FIXED_HEADER_SIZE + header.header_data_length as usize;
        if data.len() < optional_end {
            return Err(TsIndexError::InvalidData("PES optional fields truncated".into()));
        }
        let optional = &data[PES_FIXED_HEADER_SIZE..optional_end];

        match header.pts_dts_flags {
            0b10 => {
                header.pts = Some(read_timestamp(optional, 0b0010)?);
            }
            0b11 => {
                header.pts = Some(read_timestamp(optional, 0b0011)?);
                let dts = optional.get(5..).unwrap_or_default();
                header.dts = Some(read_timestamp(dts, 0b0001)?);
            }
            0b01 => {
                return Err(TsIndexError::InvalidData("forbidden PTS_DTS_flags value".into()));
            }
            _ => {}
        }

        Ok(header)
    }

    pub fn has_pts(&self) -> bool {
        self.pts.is_some()
    }

    pub fn pts_time(&self) -> Option<Duration> {
        self.pts.map(pts_to_time)
    }
}

/// Reads a 5-byte PTS/DTS field, checking its 4-bit prefix and marker bits.
fn read_timestamp(data: &[u8], prefix: u32) -> Result<u64> {
    if data.len() < 5 {
        return Err(TsIndexError::InvalidData("timestamp field truncated".into()));
    }
    let mut reader = BitReader::new(&data[..5]);
    let found = reader.read_bits(4)?;
    if found != prefix {
        return Err(TsIndexError::InvalidData(format!(
            "timestamp prefix {:04b}, expected {:04b}",
            found, prefix
        )));
    }
    let high = reader.read_bits_u64(3)?;
    reader.expect_marker()?;
    let mid = reader.read_bits_u64(15)?;
    reader.expect_marker()?;
    let low = reader.read_bits_u64(15)?;
    reader.expect_marker()?;
    Ok((high << 30) | (mid << 15) | low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::synth::pes_header;

    #[test]
    fn test_parse_pts() {
        let pts = 0x1_2345_6789 & PTS_MASK;
        let data = pes_header(0xC0, Some(pts));
        let header = PESHeader::parse(&data).unwrap();

        assert_eq!(header.stream_id, 0xC0);
        assert_eq!(header.pts_dts_flags, 0b10);
        assert_eq!(header.header_data_length, 5);
        assert_eq!(header.pts, Some(pts));
        assert_eq!(header.dts, None);
    }

    #[test]
    fn test_pts_and_dts() {
        let data = [
            0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, // start code, video, unbounded
            0x80, 0xC0, 0x0A, // PTS + DTS, 10 bytes of optional fields
            0x31, 0x00, 0x05, 0xD6, 0x97, // PTS = 90000 + 3003
            0x11, 0x00, 0x05, 0xBF, 0x21, // DTS = 90000
        ];
        let header = PESHeader::parse(&data).unwrap();
        assert_eq!(header.pts, Some(93_003));
        assert_eq!(header.dts, Some(90_000));
        assert_eq!(header.pts_time(), Some(Duration::from_nanos(1_033_366_666)));
    }

    #[test]
    fn test_no_pts() {
        let header = PESHeader::parse(&pes_header(0xC0, None)).unwrap();
        assert!(!header.has_pts());
    }

    #[test]
    fn test_rejects_bad_markers() {
        let mut data = pes_header(0xC0, Some(3003));
        data[13] &= 0xFE; // clear last marker bit
        assert!(PESHeader::parse(&data).is_err());

        let mut data = pes_header(0xC0, Some(3003));
        data[2] = 0x02;
        assert!(PESHeader::parse(&data).is_err());

        let data = pes_header(0xC0, Some(3003));
        assert!(PESHeader::parse(&data[..11]).is_err());
    }

    #[test]
    fn test_padding_stream_has_no_optional_header() {
        let data = [0x00, 0x00, 0x01, 0xBE, 0x00, 0x10];
        let header = PESHeader::parse(&data).unwrap();
        assert_eq!(header.packet_length, 16);
        assert!(!header.has_pts());
    }
}
