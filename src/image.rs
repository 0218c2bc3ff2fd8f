// Flat memory images built from decoded record streams.
//
// Intel HEX data addresses are relative to the most recent extended linear
// (`upper << 16`) or extended segment (`segment << 4`) address record.
// S-record data addresses are already absolute.

use log::{debug, warn};

use crate::record::{Record, RecordType};

/// Largest image `Image::from_records` will allocate.
pub const MAX_IMAGE_SIZE: u64 = 256 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image spans {size} bytes, limit is {max}")]
    TooLarge { size: u64, max: u64 },
}

/// A block of data at an absolute address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub address: u32,
    pub data: Vec<u8>,
}

impl Segment {
    pub fn end(&self) -> u64 {
        u64::from(self.address) + self.data.len() as u64
    }
}

fn be_u16(payload: &[u8]) -> Option<u16> {
    <[u8; 2]>::try_from(payload).ok().map(u16::from_be_bytes)
}

fn be_u32(payload: &[u8]) -> Option<u32> {
    <[u8; 4]>::try_from(payload).ok().map(u32::from_be_bytes)
}

/// Absolute-addressed data blocks in stream order, contiguous blocks merged.
pub fn segments(records: &[Record]) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();
    let mut offset = 0u32;

    for record in records {
        match record.kind {
            RecordType::ExtendedLinearAddress => match be_u16(&record.payload) {
                Some(upper) => offset = u32::from(upper) << 16,
                None => warn!("ignoring malformed record: {record}"),
            },
            RecordType::ExtendedSegmentAddress => match be_u16(&record.payload) {
                Some(segment) => offset = u32::from(segment) << 4,
                None => warn!("ignoring malformed record: {record}"),
            },
            _ if record.is_data() => {
                let address = offset.wrapping_add(record.address);
                match out.last_mut() {
                    Some(last) if last.end() == u64::from(address) => {
                        last.data.extend_from_slice(&record.payload);
                    }
                    _ => out.push(Segment {
                        address,
                        data: record.payload.clone(),
                    }),
                }
            }
            _ => {}
        }
    }
    out
}

/// Start address carried by the stream; the last start record wins.
pub fn start_address(records: &[Record]) -> Option<u32> {
    let mut start = None;
    for record in records {
        match record.kind {
            RecordType::Start16 | RecordType::Start24 | RecordType::Start32 => {
                start = Some(record.address);
            }
            RecordType::StartLinearAddress => match be_u32(&record.payload) {
                Some(eip) => start = Some(eip),
                None => warn!("ignoring malformed record: {record}"),
            },
            RecordType::StartSegmentAddress => match be_u32(&record.payload) {
                Some(csip) => {
                    let cs = csip >> 16;
                    let ip = csip & 0xFFFF;
                    start = Some((cs << 4) + ip);
                }
                None => warn!("ignoring malformed record: {record}"),
            },
            _ => {}
        }
    }
    start
}

/// A contiguous memory image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    /// Address of `bytes[0]`.
    pub base: u32,
    pub bytes: Vec<u8>,
    pub start_address: Option<u32>,
}

impl Image {
    /// Lay all data out between the lowest and highest address, gaps filled
    /// with `fill`. Later bytes overwrite earlier ones.
    pub fn from_records(records: &[Record], fill: u8) -> Result<Self, ImageError> {
        let segments = segments(records);
        let start_address = start_address(records);

        let Some(lo) = segments.iter().map(|s| s.address).min() else {
            return Ok(Self {
                start_address,
                ..Self::default()
            });
        };
        let hi = segments.iter().map(Segment::end).max().unwrap_or(u64::from(lo));

        let size = hi - u64::from(lo);
        if size > MAX_IMAGE_SIZE {
            return Err(ImageError::TooLarge {
                size,
                max: MAX_IMAGE_SIZE,
            });
        }

        let mut bytes = vec![fill; size as usize];
        for segment in &segments {
            let at = (segment.address - lo) as usize;
            bytes[at..at + segment.data.len()].copy_from_slice(&segment.data);
        }

        debug!(
            "image: {} segments, {} bytes at {:#x}",
            segments.len(),
            bytes.len(),
            lo
        );
        Ok(Self {
            base: lo,
            bytes,
            start_address,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// First address past the image.
    pub fn end(&self) -> u64 {
        u64::from(self.base) + self.bytes.len() as u64
    }
}
