// Record-level format implementation.
//
// # Modules
//
// - `checksum` - one's/two's complement record checksums
// - `format`   - format parameters and the record-type table
// - `frame`    - record body construction and text-line framing

pub mod checksum;
pub mod format;
pub mod frame;

use std::fmt;

pub use checksum::ChecksumKind;
pub use format::{AddressWidth, Format, FormatParams, RecordLayout, RecordType, Role};
pub use frame::{FrameError, Framer, encode_record};

/// One decoded (or to-be-encoded) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub address: u32,
    pub kind: RecordType,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(kind: RecordType, address: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            kind,
            payload: payload.into(),
        }
    }

    #[inline]
    pub fn is_data(&self) -> bool {
        self.kind.is_data()
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.kind.format()
    }

    /// First address past this record's payload, without wrap-around.
    #[inline]
    pub fn end_address(&self) -> u64 {
        u64::from(self.address) + self.payload.len() as u64
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.kind.address_width().bytes() * 2;
        write!(
            f,
            "Address: 0x{:0digits$X}, Type: {}, Length: {}",
            self.address,
            self.kind.name(),
            self.payload.len(),
        )
    }
}
