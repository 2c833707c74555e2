use super::types::*;
use crate::error::{Result, TsIndexError};
use crate::utils::BitReader;

/// Adaptation field control values (2 bits of header byte 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptationFieldControl {
    Reserved,
    PayloadOnly,
    AdaptationOnly,
    AdaptationAndPayload,
}

impl From<u8> for AdaptationFieldControl {
    fn from(bits: u8) -> Self {
        match bits & 0x03 {
            0b01 => AdaptationFieldControl::PayloadOnly,
            0b10 => AdaptationFieldControl::AdaptationOnly,
            0b11 => AdaptationFieldControl::AdaptationAndPayload,
            _ => AdaptationFieldControl::Reserved,
        }
    }
}

/// Field accessor over one 188-byte transport stream packet.
///
/// Nothing is cached: every accessor re-derives its value from the bytes, so
/// a `TsPacket` is just a typed view of the buffer.
#[derive(Debug, Clone, Copy)]
pub struct TsPacket<'a> {
    data: &'a [u8; TS_PACKET_SIZE],
}

impl<'a> TsPacket<'a> {
    pub fn new(data: &'a PacketBuf) -> Self {
        Self { data }
    }

    /// Wraps an arbitrary slice, which must be exactly one packet long.
    pub fn from_slice(data: &'a [u8]) -> Result<Self> {
        let data = data.try_into().map_err(|_| {
            TsIndexError::InvalidData(format!(
                "TS packet must be {} bytes, got {}",
                TS_PACKET_SIZE,
                data.len()
            ))
        })?;
        Ok(Self { data })
    }

    pub fn sync_byte(&self) -> u8 {
        self.data[0]
    }

    pub fn transport_error(&self) -> bool {
        (self.data[1] & 0x80) != 0
    }

    pub fn unit_start(&self) -> bool {
        (self.data[1] & 0x40) != 0
    }

    pub fn pid(&self) -> u16 {
        (((self.data[1] & 0x1F) as u16) << 8) | self.data[2] as u16
    }

    pub fn scrambling_control(&self) -> u8 {
        (self.data[3] >> 6) & 0x03
    }

    pub fn adaptation_field_control(&self) -> AdaptationFieldControl {
        AdaptationFieldControl::from(self.data[3] >> 4)
    }

    pub fn continuity_counter(&self) -> u8 {
        self.data[3] & 0x0F
    }

    pub fn has_adaptation_field(&self) -> bool {
        (self.data[3] & 0x20) != 0
    }

    pub fn has_payload(&self) -> bool {
        (self.data[3] & 0x10) != 0
    }

    /// Adaptation field length byte, or 0 when no adaptation field is present.
    pub fn adaptation_field_length(&self) -> usize {
        if self.has_adaptation_field() {
            self.data[TS_HEADER_SIZE] as usize
        } else {
            0
        }
    }

    pub fn has_pcr(&self) -> bool {
        self.adaptation_field_length() > 0 && (self.data[TS_HEADER_SIZE + 1] & 0x10) != 0
    }

    /// Decodes the PCR of the adaptation field, if flagged.
    pub fn pcr(&self) -> Result<Option<Pcr>> {
        if !self.has_pcr() {
            return Ok(None);
        }
        // flags byte + 6 PCR bytes
        if self.adaptation_field_length() < 7 {
            return Err(TsIndexError::InvalidData(format!(
                "adaptation field of {} bytes cannot hold a PCR",
                self.adaptation_field_length()
            )));
        }

        let pos = TS_HEADER_SIZE + 2;
        let mut reader = BitReader::new(&self.data[pos..pos + 6]);
        let base = reader.read_bits_u64(33)?;
        reader.skip_bits(6)?;
        let extension = reader.read_bits(9)? as u16;
        Ok(Some(Pcr::from_parts(base, extension)))
    }

    /// Offset of the first payload byte.
    ///
    /// Fails when the adaptation field length points past the end of the
    /// packet instead of silently truncating.
    pub fn payload_offset(&self) -> Result<usize> {
        if !self.has_adaptation_field() {
            return Ok(TS_HEADER_SIZE);
        }
        let offset = TS_HEADER_SIZE + 1 + self.adaptation_field_length();
        if offset > TS_PACKET_SIZE {
            return Err(TsIndexError::InvalidData(format!(
                "adaptation field length {} overruns packet of pid 0x{:04x}",
                self.adaptation_field_length(),
                self.pid()
            )));
        }
        Ok(offset)
    }

    /// Payload bytes, empty when the packet carries none.
    pub fn payload(&self) -> Result<&'a [u8]> {
        let offset = self.payload_offset()?;
        if !self.has_payload() {
            return Ok(&[]);
        }
        Ok(&self.data[offset..])
    }

    /// Structural check used by the packet reader to detect misalignment.
    pub fn validate(&self) -> bool {
        self.sync_byte() == TS_SYNC_BYTE
            && self.adaptation_field_control() != AdaptationFieldControl::Reserved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::synth::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_parse_ts_header() {
        let mut data = [0xFFu8; TS_PACKET_SIZE];
        data[..4].copy_from_slice(&[
            0x47, // Sync byte
            0x41, // Payload unit start indicator + PID high bits
            0x00, // PID low bits
            0x1A, // Payload only, continuity counter 10
        ]);

        let packet = TsPacket::new(&data);
        assert_eq!(packet.sync_byte(), 0x47);
        assert!(packet.unit_start());
        assert!(!packet.transport_error());
        assert_eq!(packet.pid(), 0x100);
        assert_eq!(packet.continuity_counter(), 10);
        assert_eq!(
            packet.adaptation_field_control(),
            AdaptationFieldControl::PayloadOnly
        );
        assert_eq!(packet.payload_offset().unwrap(), 4);
        assert_eq!(packet.payload().unwrap().len(), 184);
        assert!(!packet.has_pcr());
        assert!(packet.validate());
    }

    #[test]
    fn test_pcr_extraction() {
        let pcr = Pcr::from_parts(0x1_2345_6789, 123);
        let data = pcr_packet(0x31, pcr);
        let packet = TsPacket::new(&data);

        assert!(packet.has_adaptation_field());
        assert!(packet.has_pcr());
        assert_eq!(packet.adaptation_field_length(), 183);
        assert_eq!(packet.pcr().unwrap(), Some(pcr));
        assert_eq!(packet.payload().unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_adaptation_length_overrun_is_fault() {
        let mut data = [0xFFu8; TS_PACKET_SIZE];
        data[..5].copy_from_slice(&[0x47, 0x00, 0x31, 0x30, 190]);
        let packet = TsPacket::new(&data);
        assert!(packet.payload_offset().is_err());
        assert!(packet.payload().is_err());
    }

    #[test]
    fn test_short_adaptation_field_with_pcr_flag() {
        let mut data = [0xFFu8; TS_PACKET_SIZE];
        data[..6].copy_from_slice(&[0x47, 0x00, 0x31, 0x30, 0x01, 0x10]);
        let packet = TsPacket::new(&data);
        assert!(packet.has_pcr());
        assert!(packet.pcr().is_err());
    }

    #[test]
    fn test_reserved_adaptation_control_fails_validation() {
        let mut data = [0xFFu8; TS_PACKET_SIZE];
        data[..4].copy_from_slice(&[0x47, 0x00, 0x31, 0x00]);
        assert!(!TsPacket::new(&data).validate());
        assert!(TsPacket::from_slice(&data[..100]).is_err());
    }

    #[quickcheck]
    fn prop_pid_ignores_payload(header: (u8, u8, u8), payload: Vec<u8>) -> bool {
        let mut a = [0u8; TS_PACKET_SIZE];
        a[0] = TS_SYNC_BYTE;
        a[1] = header.0;
        a[2] = header.1;
        a[3] = header.2;
        let mut b = a;
        for (dst, src) in b[TS_HEADER_SIZE..].iter_mut().zip(payload.iter()) {
            *dst = *src;
        }

        let packet = TsPacket::new(&a);
        let (once, twice) = (packet.pid(), packet.pid());
        once == twice && once == TsPacket::new(&b).pid() && once <= PID_MAX
    }
}
