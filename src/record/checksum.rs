// Record checksums.
//
// Both formats sum every body byte (length, address, type, payload) modulo
// 256. Intel HEX stores the two's complement of that sum, S-records store the
// one's complement.

/// Checksum combination rule of a record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumKind {
    /// `-(sum) mod 256`; body + checksum sums to 0x00.
    TwosComplement,
    /// `!(sum)`; body + checksum sums to 0xFF.
    OnesComplement,
}

impl ChecksumKind {
    /// Value that `sum(body) + checksum` must equal for a valid record.
    #[inline]
    pub const fn residue(self) -> u8 {
        match self {
            Self::TwosComplement => 0x00,
            Self::OnesComplement => 0xFF,
        }
    }
}

/// Byte sum modulo 256.
#[inline]
pub fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Compute the checksum byte for a record body.
#[inline]
pub fn checksum(kind: ChecksumKind, body: &[u8]) -> u8 {
    let s = sum(body);
    match kind {
        ChecksumKind::TwosComplement => s.wrapping_neg(),
        ChecksumKind::OnesComplement => !s,
    }
}

/// Check `expected` against the body it was stored with.
#[inline]
pub fn verify(kind: ChecksumKind, body: &[u8], expected: u8) -> bool {
    sum(body).wrapping_add(expected) == kind.residue()
}
