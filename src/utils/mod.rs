//! # Utility Functions and Types
//!
//! Helpers shared by the transport stream parsers:
//!
//! - Bit-level reads for fields that straddle byte boundaries (PCR, PTS)
//! - MPEG-2 CRC32 calculation and section validation
//!
//! ```rust
//! use tsindex::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//!
//! // Read specific number of bits
//! let value = reader.read_bits(3)?; // Reads first 3 bits (101)
//! assert_eq!(value, 0b101);
//! # Ok(())
//! # }
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

pub use bits::BitReader;
pub use crc::Crc32Mpeg2;
