// Format parameters and the record-type table.
//
// Both record families go through one framing engine. Everything that
// differs between them lives here as data: the per-format `FormatParams` and
// the per-type `RecordLayout` table. New record types are added to `LAYOUTS`
// only.

use std::fmt;

use super::checksum::ChecksumKind;

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

/// A record text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Intel HEX (`:LLAAAATT…CC`).
    IntelHex,
    /// Motorola S-record (`STLLAA…CC`).
    SRecord,
}

/// Framing parameters of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatParams {
    /// First character of every line.
    pub marker: char,
    pub checksum: ChecksumKind,
    /// The type discriminator is a body byte after the address (Intel HEX)
    /// rather than a decimal digit right after the marker (S-record).
    pub type_in_body: bool,
    /// The length byte also counts the address and checksum bytes.
    pub length_counts_overhead: bool,
    /// Payload bytes per full data record when the caller does not choose.
    pub default_width: usize,
}

const INTEL_HEX: FormatParams = FormatParams {
    marker: ':',
    checksum: ChecksumKind::TwosComplement,
    type_in_body: true,
    length_counts_overhead: false,
    default_width: 16,
};

const SRECORD: FormatParams = FormatParams {
    marker: 'S',
    checksum: ChecksumKind::OnesComplement,
    type_in_body: false,
    length_counts_overhead: true,
    default_width: 10,
};

impl Format {
    pub const ALL: [Format; 2] = [Format::IntelHex, Format::SRecord];

    #[inline]
    pub fn params(self) -> &'static FormatParams {
        match self {
            Self::IntelHex => &INTEL_HEX,
            Self::SRecord => &SRECORD,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::IntelHex => "Intel HEX",
            Self::SRecord => "S-record",
        }
    }

    /// Look up a record type by its discriminator code.
    pub fn record_type(self, code: u8) -> Option<RecordType> {
        LAYOUTS
            .iter()
            .find(|l| l.format == self && l.code == code)
            .map(|l| l.kind)
    }

    /// Data record type used for a given address width.
    ///
    /// Intel HEX data records always carry a 16-bit address.
    pub fn data_type(self, width: AddressWidth) -> Option<RecordType> {
        self.find(Role::Data, width)
    }

    /// Start-address record type emitted as a trailer.
    ///
    /// S-records put the start address in the address field of S9/S8/S7.
    /// Intel HEX uses a Start Linear Address record with a 32-bit payload.
    pub fn start_type(self, width: AddressWidth) -> Option<RecordType> {
        match self {
            Self::IntelHex => Some(RecordType::StartLinearAddress),
            Self::SRecord => self.find(Role::Start, width),
        }
    }

    /// Smallest count record able to hold `count`.
    pub fn count_type(self, count: u64) -> Option<RecordType> {
        LAYOUTS
            .iter()
            .filter(|l| l.format == self && l.role == Role::Count)
            .filter(|l| count <= l.address.max_value())
            .min_by_key(|l| l.address)
            .map(|l| l.kind)
    }

    fn find(self, role: Role, width: AddressWidth) -> Option<RecordType> {
        LAYOUTS
            .iter()
            .find(|l| l.format == self && l.role == role && l.address == width)
            .map(|l| l.kind)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Address widths
// ---------------------------------------------------------------------------

/// Width of a record's address field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressWidth {
    Bits16,
    Bits24,
    Bits32,
}

impl AddressWidth {
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Bits16 => 2,
            Self::Bits24 => 3,
            Self::Bits32 => 4,
        }
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Largest address the field can hold.
    #[inline]
    pub const fn max_value(self) -> u64 {
        (1u64 << self.bits()) - 1
    }

    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            16 => Some(Self::Bits16),
            24 => Some(Self::Bits24),
            32 => Some(Self::Bits32),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// What a record type is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Data,
    Header,
    Count,
    Start,
    EndOfFile,
    ExtendedAddress,
}

/// Every record type of both formats.
///
/// The discriminant doubles as the index into `LAYOUTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    // Intel HEX
    Data,
    EndOfFile,
    ExtendedSegmentAddress,
    StartSegmentAddress,
    ExtendedLinearAddress,
    StartLinearAddress,
    // S-record
    Header,
    Data16,
    Data24,
    Data32,
    Count16,
    Count24,
    Start32,
    Start24,
    Start16,
}

/// Table entry describing one record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub kind: RecordType,
    pub format: Format,
    /// Intel HEX type byte or S-record type digit.
    pub code: u8,
    pub address: AddressWidth,
    pub role: Role,
    pub name: &'static str,
}

const fn layout(
    kind: RecordType,
    format: Format,
    code: u8,
    address: AddressWidth,
    role: Role,
    name: &'static str,
) -> RecordLayout {
    RecordLayout {
        kind,
        format,
        code,
        address,
        role,
        name,
    }
}

use AddressWidth::{Bits16, Bits24, Bits32};
use Format::{IntelHex, SRecord};

static LAYOUTS: [RecordLayout; 15] = [
    layout(RecordType::Data, IntelHex, 0x00, Bits16, Role::Data, "Data"),
    layout(RecordType::EndOfFile, IntelHex, 0x01, Bits16, Role::EndOfFile, "EOF"),
    layout(
        RecordType::ExtendedSegmentAddress,
        IntelHex,
        0x02,
        Bits16,
        Role::ExtendedAddress,
        "Extended Segment Address",
    ),
    layout(
        RecordType::StartSegmentAddress,
        IntelHex,
        0x03,
        Bits16,
        Role::Start,
        "Start Segment Address",
    ),
    layout(
        RecordType::ExtendedLinearAddress,
        IntelHex,
        0x04,
        Bits16,
        Role::ExtendedAddress,
        "Extended Linear Address",
    ),
    layout(
        RecordType::StartLinearAddress,
        IntelHex,
        0x05,
        Bits16,
        Role::Start,
        "Start Linear Address",
    ),
    layout(RecordType::Header, SRecord, 0, Bits16, Role::Header, "S0"),
    layout(RecordType::Data16, SRecord, 1, Bits16, Role::Data, "S1"),
    layout(RecordType::Data24, SRecord, 2, Bits24, Role::Data, "S2"),
    layout(RecordType::Data32, SRecord, 3, Bits32, Role::Data, "S3"),
    layout(RecordType::Count16, SRecord, 5, Bits16, Role::Count, "S5"),
    layout(RecordType::Count24, SRecord, 6, Bits24, Role::Count, "S6"),
    layout(RecordType::Start32, SRecord, 7, Bits32, Role::Start, "S7"),
    layout(RecordType::Start24, SRecord, 8, Bits24, Role::Start, "S8"),
    layout(RecordType::Start16, SRecord, 9, Bits16, Role::Start, "S9"),
];

impl RecordType {
    #[inline]
    pub fn layout(self) -> &'static RecordLayout {
        &LAYOUTS[self as usize]
    }

    #[inline]
    pub fn format(self) -> Format {
        self.layout().format
    }

    #[inline]
    pub fn address_width(self) -> AddressWidth {
        self.layout().address
    }

    #[inline]
    pub fn role(self) -> Role {
        self.layout().role
    }

    #[inline]
    pub fn is_data(self) -> bool {
        self.role() == Role::Data
    }

    #[inline]
    pub fn code(self) -> u8 {
        self.layout().code
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.layout().name
    }

    /// Largest payload a single framed record of this type can carry.
    pub fn max_payload(self) -> usize {
        let params = self.format().params();
        if params.length_counts_overhead {
            usize::from(u8::MAX) - self.address_width().bytes() - 1
        } else {
            usize::from(u8::MAX)
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_discriminant() {
        for (ix, entry) in LAYOUTS.iter().enumerate() {
            assert_eq!(entry.kind as usize, ix, "{:?}", entry.kind);
            assert_eq!(entry.kind.layout(), entry);
        }
    }

    #[test]
    fn codes_are_unique_per_format() {
        for entry in &LAYOUTS {
            assert_eq!(entry.format.record_type(entry.code), Some(entry.kind));
        }
    }

    #[test]
    fn srecord_has_no_s4() {
        assert_eq!(Format::SRecord.record_type(4), None);
        assert_eq!(Format::IntelHex.record_type(6), None);
    }

    #[test]
    fn data_types_per_width() {
        assert_eq!(
            Format::SRecord.data_type(AddressWidth::Bits16),
            Some(RecordType::Data16)
        );
        assert_eq!(
            Format::SRecord.data_type(AddressWidth::Bits24),
            Some(RecordType::Data24)
        );
        assert_eq!(
            Format::SRecord.data_type(AddressWidth::Bits32),
            Some(RecordType::Data32)
        );
        assert_eq!(
            Format::IntelHex.data_type(AddressWidth::Bits16),
            Some(RecordType::Data)
        );
        assert_eq!(Format::IntelHex.data_type(AddressWidth::Bits32), None);
    }

    #[test]
    fn start_types_mirror_data_widths() {
        assert_eq!(
            Format::SRecord.start_type(AddressWidth::Bits16),
            Some(RecordType::Start16)
        );
        assert_eq!(
            Format::SRecord.start_type(AddressWidth::Bits24),
            Some(RecordType::Start24)
        );
        assert_eq!(
            Format::SRecord.start_type(AddressWidth::Bits32),
            Some(RecordType::Start32)
        );
        assert_eq!(
            Format::IntelHex.start_type(AddressWidth::Bits16),
            Some(RecordType::StartLinearAddress)
        );
    }

    #[test]
    fn count_type_grows_with_count() {
        assert_eq!(Format::SRecord.count_type(0), Some(RecordType::Count16));
        assert_eq!(Format::SRecord.count_type(65_535), Some(RecordType::Count16));
        assert_eq!(Format::SRecord.count_type(65_536), Some(RecordType::Count24));
        assert_eq!(
            Format::SRecord.count_type(0xFF_FFFF),
            Some(RecordType::Count24)
        );
        assert_eq!(Format::SRecord.count_type(0x100_0000), None);
        assert_eq!(Format::IntelHex.count_type(1), None);
    }

    #[test]
    fn max_payload_accounts_for_overhead() {
        assert_eq!(RecordType::Data.max_payload(), 255);
        assert_eq!(RecordType::Data16.max_payload(), 252);
        assert_eq!(RecordType::Data24.max_payload(), 251);
        assert_eq!(RecordType::Data32.max_payload(), 250);
        assert_eq!(RecordType::Header.max_payload(), 252);
    }

    #[test]
    fn address_width_limits() {
        assert_eq!(AddressWidth::Bits16.max_value(), 0xFFFF);
        assert_eq!(AddressWidth::Bits24.max_value(), 0xFF_FFFF);
        assert_eq!(AddressWidth::Bits32.max_value(), 0xFFFF_FFFF);
        assert_eq!(AddressWidth::from_bits(24), Some(AddressWidth::Bits24));
        assert_eq!(AddressWidth::from_bits(20), None);
    }
}
