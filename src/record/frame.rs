// Record framing shared by the writer and anything that re-emits records.
//
//   body = length | address (big-endian, table width) | [type byte] | payload
//   line = marker [type digit] HEX(body | checksum) '\n'
//
// The type byte is part of the body for Intel HEX; S-records carry the type
// as a digit after the marker instead.

use super::Record;
use super::checksum;
use super::format::RecordType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("{kind} payload of {len} bytes exceeds the {max}-byte record limit")]
    PayloadTooLong {
        kind: RecordType,
        len: usize,
        max: usize,
    },
}

/// Reusable scratch buffers for framing many records.
#[derive(Debug, Default)]
pub struct Framer {
    body: Vec<u8>,
    line: String,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame one record and return the text line, newline included.
    ///
    /// `address` is truncated to the address field of `kind`.
    pub fn frame(
        &mut self,
        kind: RecordType,
        address: u32,
        payload: &[u8],
    ) -> Result<&str, FrameError> {
        encode_body(kind, address, payload, &mut self.body)?;

        let layout = kind.layout();
        let params = layout.format.params();
        let cs = checksum::checksum(params.checksum, &self.body);
        self.body.push(cs);

        self.line.clear();
        self.line.push(params.marker);
        if !params.type_in_body {
            self.line.push(char::from(b'0' + layout.code));
        }
        self.line.push_str(&hex::encode_upper(&self.body));
        self.line.push('\n');
        Ok(&self.line)
    }
}

/// Build the checksummed part of a record (everything but the checksum).
pub fn encode_body(
    kind: RecordType,
    address: u32,
    payload: &[u8],
    body: &mut Vec<u8>,
) -> Result<(), FrameError> {
    let max = kind.max_payload();
    if payload.len() > max {
        return Err(FrameError::PayloadTooLong {
            kind,
            len: payload.len(),
            max,
        });
    }

    let layout = kind.layout();
    let params = layout.format.params();
    let addr_len = layout.address.bytes();
    let length = if params.length_counts_overhead {
        payload.len() + addr_len + 1
    } else {
        payload.len()
    };

    body.clear();
    body.reserve(payload.len() + addr_len + 3);
    body.push(length as u8);
    body.extend_from_slice(&address.to_be_bytes()[4 - addr_len..]);
    if params.type_in_body {
        body.push(layout.code);
    }
    body.extend_from_slice(payload);
    Ok(())
}

/// Frame a single record as a newline-terminated text line.
pub fn encode_record(record: &Record) -> Result<String, FrameError> {
    let mut framer = Framer::new();
    framer
        .frame(record.kind, record.address, &record.payload)
        .map(str::to_owned)
}
