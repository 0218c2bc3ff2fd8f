// Record line parser.
//
// Each line is validated in a fixed order:
//   1. non-empty, starts with the format marker
//   2. hex body decodes
//   3. checksum matches
//   4. record type is known, declared length matches the bytes present
//
// Readers stop at the first bad line; there is no partial-success mode.

use std::io::BufRead;

use log::{debug, trace};

use crate::record::checksum;
use crate::record::{Format, Record};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty record")]
    EmptyRecord,
    #[error("record does not start with '{expected}'")]
    MissingMarker { expected: char },
    #[error("malformed hex: {0}")]
    MalformedHex(#[from] hex::FromHexError),
    #[error("checksum mismatch: record has {expected:#04X}, computed {computed:#04X}")]
    ChecksumMismatch { expected: u8, computed: u8 },
    #[error("truncated record: expected {expected} bytes, found {actual}")]
    TruncatedRecord { expected: usize, actual: usize },
    #[error("unknown {format} record type {code}")]
    UnknownRecordType { format: Format, code: String },
    #[error("I/O error: {0}")]
    Source(#[from] std::io::Error),
}

/// A decode failure tagged with the 1-based line it occurred on.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {error}")]
pub struct ReadError {
    pub line: usize,
    #[source]
    pub error: DecodeError,
}

// ---------------------------------------------------------------------------
// Single line
// ---------------------------------------------------------------------------

/// Decode one record line. `line` must not carry its line terminator.
pub fn decode_line(format: Format, line: &str) -> Result<Record, DecodeError> {
    if line.is_empty() {
        return Err(DecodeError::EmptyRecord);
    }

    let params = format.params();
    let rest = line
        .strip_prefix(params.marker)
        .ok_or(DecodeError::MissingMarker {
            expected: params.marker,
        })?;

    // S-records carry the type as a digit in front of the hex body.
    let (digit, rest) = if params.type_in_body {
        (None, rest)
    } else {
        let mut chars = rest.chars();
        let digit = chars.next().ok_or(DecodeError::TruncatedRecord {
            expected: 1,
            actual: 0,
        })?;
        (Some(digit), chars.as_str())
    };

    let mut body = hex::decode(rest)?;
    let stored = body.pop().ok_or(DecodeError::TruncatedRecord {
        expected: 1,
        actual: 0,
    })?;

    if !checksum::verify(params.checksum, &body, stored) {
        return Err(DecodeError::ChecksumMismatch {
            expected: stored,
            computed: checksum::checksum(params.checksum, &body),
        });
    }

    // Intel HEX: len, addr hi, addr lo, type
    let code = match digit {
        Some(d) => d
            .to_digit(10)
            .and_then(|d| u8::try_from(d).ok())
            .ok_or_else(|| DecodeError::UnknownRecordType {
                format,
                code: d.to_string(),
            })?,
        None => *body.get(3).ok_or(DecodeError::TruncatedRecord {
            expected: 4,
            actual: body.len(),
        })?,
    };
    let kind = format
        .record_type(code)
        .ok_or_else(|| DecodeError::UnknownRecordType {
            format,
            code: match digit {
                Some(d) => d.to_string(),
                None => format!("{code:02X}"),
            },
        })?;

    let addr_len = kind.address_width().bytes();
    let header_len = 1 + addr_len + usize::from(params.type_in_body);
    if body.len() < header_len {
        return Err(DecodeError::TruncatedRecord {
            expected: header_len,
            actual: body.len(),
        });
    }

    // S-record length counts address, payload and checksum; the stripped
    // checksum and the length byte itself cancel out.
    let declared = usize::from(body[0]);
    let expected = if params.length_counts_overhead {
        declared
    } else {
        header_len + declared
    };
    if expected != body.len() {
        return Err(DecodeError::TruncatedRecord {
            expected,
            actual: body.len(),
        });
    }

    let address = body[1..1 + addr_len]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    body.drain(..header_len);

    Ok(Record {
        address,
        kind,
        payload: body,
    })
}

// ---------------------------------------------------------------------------
// Whole streams
// ---------------------------------------------------------------------------

/// Decode every non-empty line in order.
///
/// Trailing whitespace (including `\r`) is ignored. The first bad line aborts
/// the read.
pub fn read_all<I, S>(format: Format, lines: I) -> Result<Vec<Record>, ReadError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records = Vec::new();
    for (ix, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim_end();
        if line.is_empty() {
            continue;
        }
        let record = decode_line(format, line).map_err(|error| ReadError {
            line: ix + 1,
            error,
        })?;
        trace!("line {}: {}", ix + 1, record);
        records.push(record);
    }
    debug!("decoded {} {} records", records.len(), format);
    Ok(records)
}

/// Decode a whole in-memory file.
pub fn read_str(format: Format, text: &str) -> Result<Vec<Record>, ReadError> {
    read_all(format, text.lines())
}

/// Decode from a buffered reader, line by line.
pub fn read_from<R: BufRead>(format: Format, reader: R) -> Result<Vec<Record>, ReadError> {
    let mut lines = RecordReader::new(format, reader);
    let records = lines.by_ref().collect::<Result<Vec<_>, _>>()?;
    debug!(
        "decoded {} {} records from {} lines",
        records.len(),
        format,
        lines.line()
    );
    Ok(records)
}

/// Streaming iterator over the records of a `BufRead` source.
///
/// Yields at most one error, after which it is exhausted.
pub struct RecordReader<R> {
    format: Format,
    reader: R,
    line: usize,
    buf: String,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(format: Format, reader: R) -> Self {
        Self {
            format,
            reader,
            line: 0,
            buf: String::new(),
            done: false,
        }
    }

    /// Number of lines consumed so far.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            let read = self.reader.read_line(&mut self.buf);
            if !matches!(read, Ok(0)) {
                self.line += 1;
            }
            let result = match read {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {
                    let text = self.buf.trim_end();
                    if text.is_empty() {
                        continue;
                    }
                    decode_line(self.format, text)
                }
                Err(e) => Err(DecodeError::Source(e)),
            };
            return Some(result.map_err(|error| {
                self.done = true;
                ReadError {
                    line: self.line,
                    error,
                }
            }));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;

    const BULK_SREC: &str = "\
S00F000068656C6C6F202020202000003C
S11F00007C0802A6900100049421FFF07C6C1B787C8C23783C6000003863000026
S11F001C4BFFFFE5398000007D83637880010014382100107C0803A64E800020E9
S111003848656C6C6F20776F726C642E0A0042
S5030003F9
S9030000FC
";

    #[test]
    fn reads_reference_srecord_file() {
        let recs = read_str(Format::SRecord, BULK_SREC).unwrap();
        assert_eq!(recs.len(), 6);

        assert_eq!(recs[0].kind, RecordType::Header);
        assert_eq!(recs[0].payload, b"hello     \0\0");

        assert_eq!(recs[1].kind, RecordType::Data16);
        assert_eq!(recs[1].address, 0x0000);
        assert_eq!(recs[1].payload.len(), 28);
        assert_eq!(recs[2].address, 0x001C);
        assert_eq!(recs[3].address, 0x0038);
        assert_eq!(recs[3].payload, b"Hello world.\n\0");

        assert_eq!(recs[4].kind, RecordType::Count16);
        assert_eq!(recs[4].address, 3);
        assert!(recs[4].payload.is_empty());
        assert_eq!(recs[5].kind, RecordType::Start16);
        assert_eq!(recs[5].address, 0);
    }

    #[test]
    fn reads_intel_records() {
        let text = ":020000040012E8\n:02345600AABB0F\n:00000001FF\n";
        let recs = read_str(Format::IntelHex, text).unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].kind, RecordType::ExtendedLinearAddress);
        assert_eq!(recs[0].payload, [0x00, 0x12]);
        assert_eq!(recs[1].kind, RecordType::Data);
        assert_eq!(recs[1].address, 0x3456);
        assert_eq!(recs[1].payload, [0xAA, 0xBB]);
        assert_eq!(recs[2].kind, RecordType::EndOfFile);
    }

    #[test]
    fn lower_case_hex_accepted() {
        let rec = decode_line(Format::IntelHex, ":02345600aabb0f").unwrap();
        assert_eq!(rec.payload, [0xAA, 0xBB]);
    }

    #[test]
    fn empty_line_is_error_for_decode_line() {
        assert!(matches!(
            decode_line(Format::SRecord, ""),
            Err(DecodeError::EmptyRecord)
        ));
    }

    #[test]
    fn missing_marker() {
        assert!(matches!(
            decode_line(Format::IntelHex, "00000001FF"),
            Err(DecodeError::MissingMarker { expected: ':' })
        ));
        assert!(matches!(
            decode_line(Format::SRecord, ":00000001FF"),
            Err(DecodeError::MissingMarker { expected: 'S' })
        ));
    }

    #[test]
    fn malformed_hex() {
        assert!(matches!(
            decode_line(Format::IntelHex, ":0000000G1FF"),
            Err(DecodeError::MalformedHex(_))
        ));
        assert!(matches!(
            decode_line(Format::IntelHex, ":00000001F"),
            Err(DecodeError::MalformedHex(_))
        ));
    }

    #[test]
    fn checksum_mismatch() {
        let err = decode_line(Format::SRecord, "S9030000FD").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::ChecksumMismatch {
                expected: 0xFD,
                computed: 0xFC
            }
        ));
    }

    #[test]
    fn unknown_record_types() {
        // S4 with a valid checksum.
        assert!(matches!(
            decode_line(Format::SRecord, "S4030000FC"),
            Err(DecodeError::UnknownRecordType { code, .. }) if code == "4"
        ));
        // Intel type 06.
        assert!(matches!(
            decode_line(Format::IntelHex, ":00000006FA"),
            Err(DecodeError::UnknownRecordType { code, .. }) if code == "06"
        ));
    }

    #[test]
    fn declared_length_must_match() {
        // Intel: declares 2 data bytes, carries 1.
        assert!(matches!(
            decode_line(Format::IntelHex, ":02000000AA54"),
            Err(DecodeError::TruncatedRecord {
                expected: 6,
                actual: 5
            })
        ));
        // S1: count 4 but only address + checksum present.
        assert!(matches!(
            decode_line(Format::SRecord, "S1040000FB"),
            Err(DecodeError::TruncatedRecord {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn body_shorter_than_header() {
        // Only a checksum byte.
        assert!(matches!(
            decode_line(Format::IntelHex, ":00"),
            Err(DecodeError::TruncatedRecord { .. })
        ));
        assert!(matches!(
            decode_line(Format::SRecord, "S1"),
            Err(DecodeError::TruncatedRecord { .. })
        ));
        assert!(matches!(
            decode_line(Format::SRecord, "S"),
            Err(DecodeError::TruncatedRecord { .. })
        ));
    }

    #[test]
    fn first_error_wins_with_line_number() {
        let text = "S9030000FC\n\nS9030000FD\nS4030000FC\n";
        let err = read_str(Format::SRecord, text).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.error, DecodeError::ChecksumMismatch { .. }));
        assert!(err.to_string().starts_with("line 3: checksum mismatch"));
    }

    #[test]
    fn crlf_and_blank_lines_ignored() {
        let text = "\r\n:00000001FF\r\n\r\n";
        let recs = read_str(Format::IntelHex, text).unwrap();
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn reader_matches_read_str() {
        let from_reader = read_from(Format::SRecord, BULK_SREC.as_bytes()).unwrap();
        let from_str = read_str(Format::SRecord, BULK_SREC).unwrap();
        assert_eq!(from_reader, from_str);
    }

    #[test]
    fn reader_stops_after_error() {
        let text = "S9030000FC\nbogus\nS9030000FC\n";
        let mut it = RecordReader::new(Format::SRecord, text.as_bytes());
        assert!(it.next().unwrap().is_ok());
        assert_eq!(it.line(), 1);
        let err = it.next().unwrap().unwrap_err();
        assert_eq!(err.line, 2);
        assert!(it.next().is_none());
        assert_eq!(it.line(), 2);
    }

    #[test]
    fn reader_counts_blank_lines() {
        let text = "S9030000FC


S9030000FC
";
        let mut it = RecordReader::new(Format::SRecord, text.as_bytes());
        assert_eq!(it.by_ref().count(), 2);
        assert_eq!(it.line(), 4);
    }

    #[test]
    fn reader_reports_invalid_utf8_as_source_error() {
        let bytes: &[u8] = b":00000001FF\n\xFF\xFE\n";
        let err = read_from(Format::IntelHex, bytes).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(err.error, DecodeError::Source(_)));
    }
}
