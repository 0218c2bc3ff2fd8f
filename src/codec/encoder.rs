// Streaming record writer.
//
// Writer accepts arbitrary-length byte payloads and turns them into framed
// text records on any `Write` sink:
//   - Caller bytes are appended to a holding buffer
//   - Every full `width` bytes become one data record immediately
//   - `flush()` emits the remainder as a single runt record
//   - `close()` flushes and emits the trailer records
//
// Intel HEX data addresses are 16 bits wide. The writer keeps the full 32-bit
// cursor and emits an Extended Linear Address record whenever its upper half
// changes; no data record crosses a 64 KiB boundary.
//
// The sink itself is never closed; `close()` only flushes it.

use std::io::{self, Write};

use bitflags::bitflags;
use log::{debug, trace};

use crate::record::{AddressWidth, Format, FrameError, Framer, RecordType};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

bitflags! {
    /// Trailer records emitted by `close()`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Trailers: u8 {
        /// S5/S6 record holding the number of data records (S-record only).
        const COUNT = 1 << 0;
        /// Start-address record (S9/S8/S7, or Intel HEX type 05).
        const START = 1 << 1;
    }
}

/// Configuration for a record writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    pub format: Format,
    /// Payload bytes per full data record.
    pub width: usize,
    /// Address field of data and start records.
    pub address_width: AddressWidth,
    /// S0 header contents (S-record only).
    pub header: Option<Vec<u8>>,
    pub trailers: Trailers,
    /// Address carried by the start-address trailer.
    pub start_address: u32,
    /// Initial address cursor.
    pub base_address: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::intel_hex()
    }
}

impl WriterOptions {
    /// Intel HEX with 16-byte data records.
    pub fn intel_hex() -> Self {
        Self::for_format(Format::IntelHex, AddressWidth::Bits16)
    }

    /// S-records with 10-byte data records at the given address width.
    pub fn srecord(address_width: AddressWidth) -> Self {
        Self::for_format(Format::SRecord, address_width)
    }

    fn for_format(format: Format, address_width: AddressWidth) -> Self {
        Self {
            format,
            width: format.params().default_width,
            address_width,
            header: None,
            trailers: Trailers::empty(),
            start_address: 0,
            base_address: 0,
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_header(mut self, header: impl Into<Vec<u8>>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_base_address(mut self, address: u32) -> Self {
        self.base_address = address;
        self
    }

    /// Emit a start-address trailer carrying `address`.
    pub fn with_start_address(mut self, address: u32) -> Self {
        self.start_address = address;
        self.trailers |= Trailers::START;
        self
    }

    /// Emit a data-record count trailer.
    pub fn with_count(mut self) -> Self {
        self.trailers |= Trailers::COUNT;
        self
    }

    /// Check the option combination and resolve the data record type.
    pub fn validate(&self) -> Result<RecordType, EncodeError> {
        let format = self.format;
        let data_type =
            format
                .data_type(self.address_width)
                .ok_or(EncodeError::Unsupported {
                    format,
                    what: "this data address width",
                })?;

        let max = data_type.max_payload();
        if self.width == 0 || self.width > max {
            return Err(EncodeError::InvalidWidth {
                width: self.width,
                max,
            });
        }

        if let Some(header) = &self.header {
            if format != Format::SRecord {
                return Err(EncodeError::Unsupported {
                    format,
                    what: "header records",
                });
            }
            let max = RecordType::Header.max_payload();
            if header.len() > max {
                return Err(FrameError::PayloadTooLong {
                    kind: RecordType::Header,
                    len: header.len(),
                    max,
                }
                .into());
            }
        }

        if self.trailers.contains(Trailers::COUNT) && format != Format::SRecord {
            return Err(EncodeError::Unsupported {
                format,
                what: "count records",
            });
        }

        Ok(data_type)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("writer already closed")]
    WriterClosed,
    #[error("I/O error: {0}")]
    Sink(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("record width {width} outside 1..={max}")]
    InvalidWidth { width: usize, max: usize },
    #[error("{format} does not support {what}")]
    Unsupported {
        format: Format,
        what: &'static str,
    },
    #[error("{0} data records do not fit a count record")]
    CountOverflow(u64),
    #[error("address {0:#x} outside the current 64 KiB segment")]
    SegmentOverflow(u32),
}

// ---------------------------------------------------------------------------
// Record sink
// ---------------------------------------------------------------------------

/// Output half of the writer: the caller's sink plus framing scratch space.
struct RecordSink<W: Write> {
    inner: W,
    framer: Framer,
}

impl<W: Write> RecordSink<W> {
    fn emit(&mut self, kind: RecordType, address: u32, payload: &[u8]) -> Result<(), EncodeError> {
        let line = self.framer.frame(kind, address, payload)?;
        trace!(
            "emit {} @ {:#x}, {} bytes",
            kind.name(),
            address,
            payload.len()
        );
        self.inner.write_all(line.as_bytes())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Streaming Intel HEX / S-record writer.
///
/// # Example
/// ```
/// use hexrec::codec::encoder::{Writer, WriterOptions};
///
/// let mut out = Vec::new();
/// let mut w = Writer::new(&mut out, WriterOptions::intel_hex()).unwrap();
/// w.write(b"hello").unwrap();
/// w.close().unwrap();
/// drop(w);
/// assert_eq!(
///     String::from_utf8(out).unwrap(),
///     ":0500000068656C6C6FE7\n:00000001FF\n"
/// );
/// ```
pub struct Writer<W: Write> {
    out: RecordSink<W>,
    opts: WriterOptions,
    data_type: RecordType,
    address: u32,
    pending: Vec<u8>,
    data_records: u64,
    header_emitted: bool,
    /// Upper address half the reader currently applies (Intel HEX). `None`
    /// after an Extended Segment Address record.
    linear_upper: Option<u16>,
    /// Trailers already written by an interrupted `close()`.
    trailers_emitted: Trailers,
    eof_emitted: bool,
    closed: bool,
}

impl<W: Write> Writer<W> {
    /// Create a writer, rejecting invalid option combinations.
    pub fn new(sink: W, opts: WriterOptions) -> Result<Self, EncodeError> {
        let data_type = opts.validate()?;
        Ok(Self {
            out: RecordSink {
                inner: sink,
                framer: Framer::new(),
            },
            address: opts.base_address,
            pending: Vec::with_capacity(opts.width),
            opts,
            data_type,
            data_records: 0,
            header_emitted: false,
            linear_upper: Some(0),
            trailers_emitted: Trailers::empty(),
            eof_emitted: false,
            closed: false,
        })
    }

    pub fn options(&self) -> &WriterOptions {
        &self.opts
    }

    /// Address the next data record will carry.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Number of data records emitted so far.
    pub fn data_records(&self) -> u64 {
        self.data_records
    }

    /// Bytes held back waiting for a full record.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_ref(&self) -> &W {
        &self.out.inner
    }

    /// Return the underlying sink. Buffered bytes that were never flushed
    /// are dropped.
    pub fn into_inner(self) -> W {
        self.out.inner
    }

    /// Move the address cursor.
    ///
    /// S-record writers flush pending bytes first so a record never spans
    /// two addresses. Intel HEX writers only replace the cursor.
    pub fn set_address(&mut self, address: u32) -> Result<(), EncodeError> {
        self.ensure_open()?;
        if self.opts.format == Format::SRecord {
            self.flush_pending()?;
        }
        self.address = address;
        Ok(())
    }

    /// Buffer `buf` and emit every full-width data record it completes.
    ///
    /// Always returns `buf.len()` on success. If the sink fails, the bytes
    /// that were not emitted stay buffered.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, EncodeError> {
        self.ensure_open()?;
        self.emit_header()?;

        self.pending.extend_from_slice(buf);
        self.drain_pending(self.opts.width).map(|()| buf.len())
    }

    /// Emit buffered bytes as one runt data record. No-op when nothing is
    /// buffered.
    pub fn flush(&mut self) -> Result<(), EncodeError> {
        self.ensure_open()?;
        self.flush_pending()
    }

    /// Flush, emit the trailer records and mark the writer closed.
    ///
    /// A second call fails with `WriterClosed`. The sink is flushed but
    /// stays open. After a sink failure `close()` may be called again; it
    /// resumes with the first record that was not written.
    pub fn close(&mut self) -> Result<(), EncodeError> {
        if self.closed {
            return Err(EncodeError::WriterClosed);
        }
        self.flush_pending()?;
        self.emit_header()?;

        let remaining = self.opts.trailers - self.trailers_emitted;
        if remaining.contains(Trailers::COUNT) {
            self.emit_count()?;
            self.trailers_emitted |= Trailers::COUNT;
        }
        if remaining.contains(Trailers::START) {
            self.emit_start()?;
            self.trailers_emitted |= Trailers::START;
        }
        if self.opts.format == Format::IntelHex && !self.eof_emitted {
            self.out.emit(RecordType::EndOfFile, 0, &[])?;
            self.eof_emitted = true;
        }
        self.out.inner.flush()?;

        self.closed = true;
        debug!(
            "closed {} writer: {} data records, cursor {:#x}",
            self.opts.format, self.data_records, self.address
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Intel HEX metadata records
    // -----------------------------------------------------------------------

    /// Emit an Extended Segment Address record (type 02).
    ///
    /// Segment addressing is left to the caller: until the next Extended
    /// Linear Address record, data must stay inside the first 64 KiB of the
    /// cursor or writes fail with `SegmentOverflow`.
    pub fn write_extended_segment_address(&mut self, segment: u16) -> Result<(), EncodeError> {
        self.write_metadata(RecordType::ExtendedSegmentAddress, &segment.to_be_bytes())?;
        self.linear_upper = None;
        Ok(())
    }

    /// Emit a Start Segment Address record (type 03) with 80x86 CS:IP.
    pub fn write_start_segment_address(&mut self, cs: u16, ip: u16) -> Result<(), EncodeError> {
        let mut payload = [0u8; 4];
        payload[..2].copy_from_slice(&cs.to_be_bytes());
        payload[2..].copy_from_slice(&ip.to_be_bytes());
        self.write_metadata(RecordType::StartSegmentAddress, &payload)
    }

    /// Emit an Extended Linear Address record (type 04) holding the upper
    /// 16 bits of later data addresses. The cursor moves into that range.
    pub fn write_extended_linear_address(&mut self, upper: u16) -> Result<(), EncodeError> {
        self.write_metadata(RecordType::ExtendedLinearAddress, &upper.to_be_bytes())?;
        self.linear_upper = Some(upper);
        self.address = (u32::from(upper) << 16) | (self.address & 0xFFFF);
        Ok(())
    }

    /// Emit a Start Linear Address record (type 05).
    pub fn write_start_linear_address(&mut self, eip: u32) -> Result<(), EncodeError> {
        self.write_metadata(RecordType::StartLinearAddress, &eip.to_be_bytes())
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Fails once the writer is closed or has started writing trailers.
    fn ensure_open(&self) -> Result<(), EncodeError> {
        if self.closed || self.eof_emitted || !self.trailers_emitted.is_empty() {
            Err(EncodeError::WriterClosed)
        } else {
            Ok(())
        }
    }

    fn flush_pending(&mut self) -> Result<(), EncodeError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.emit_header()?;
        self.drain_pending(1)
    }

    /// Emit data records from the holding buffer while at least `min` bytes
    /// remain. Emitted bytes are dropped from the buffer even on failure.
    fn drain_pending(&mut self, min: usize) -> Result<(), EncodeError> {
        let width = self.opts.width;
        let mut consumed = 0usize;
        let mut result = Ok(());
        while self.pending.len() - consumed >= min.max(1) {
            let len = width.min(self.pending.len() - consumed);
            match self.emit_data(consumed, len) {
                Ok(n) => consumed += n,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.pending.drain(..consumed);
        result
    }

    /// Emit one data record from `pending[from..from + len]` and return how
    /// many bytes it carried. Intel HEX records stop at the next 64 KiB
    /// boundary.
    fn emit_data(&mut self, from: usize, len: usize) -> Result<usize, EncodeError> {
        let mut len = len;
        if self.opts.format == Format::IntelHex {
            let upper = (self.address >> 16) as u16;
            match self.linear_upper {
                Some(current) if current == upper => {}
                Some(_) => {
                    debug!("extended linear address {upper:#06x}");
                    self.out
                        .emit(RecordType::ExtendedLinearAddress, 0, &upper.to_be_bytes())?;
                    self.linear_upper = Some(upper);
                }
                None if upper != 0 => return Err(EncodeError::SegmentOverflow(self.address)),
                None => {}
            }

            let room = 0x1_0000 - (self.address & 0xFFFF) as usize;
            if len > room {
                if self.linear_upper.is_none() {
                    return Err(EncodeError::SegmentOverflow(
                        self.address.wrapping_add(room as u32),
                    ));
                }
                len = room;
            }
        }

        self.out
            .emit(self.data_type, self.address, &self.pending[from..from + len])?;
        self.address = self.address.wrapping_add(len as u32);
        self.data_records += 1;
        Ok(len)
    }

    fn emit_header(&mut self) -> Result<(), EncodeError> {
        if self.header_emitted {
            return Ok(());
        }
        if let Some(header) = &self.opts.header {
            self.out.emit(RecordType::Header, 0, header)?;
        }
        self.header_emitted = true;
        Ok(())
    }

    fn emit_count(&mut self) -> Result<(), EncodeError> {
        let count = self.data_records;
        let kind = self
            .opts
            .format
            .count_type(count)
            .ok_or(EncodeError::CountOverflow(count))?;
        self.out.emit(kind, count as u32, &[])
    }

    fn emit_start(&mut self) -> Result<(), EncodeError> {
        let format = self.opts.format;
        let kind = format
            .start_type(self.opts.address_width)
            .ok_or(EncodeError::Unsupported {
                format,
                what: "start records at this address width",
            })?;
        let start = self.opts.start_address;
        if format.params().type_in_body {
            self.out.emit(kind, 0, &start.to_be_bytes())
        } else {
            self.out.emit(kind, start, &[])
        }
    }

    fn write_metadata(&mut self, kind: RecordType, payload: &[u8]) -> Result<(), EncodeError> {
        self.ensure_open()?;
        if kind.format() != self.opts.format {
            return Err(EncodeError::Unsupported {
                format: self.opts.format,
                what: kind.name(),
            });
        }
        self.flush_pending()?;
        self.out.emit(kind, 0, payload)
    }
}

// ---------------------------------------------------------------------------
// Convenience function
// ---------------------------------------------------------------------------

/// Encode `data` in one call and return the writer's sink.
pub fn encode_all<W: Write>(sink: W, data: &[u8], opts: WriterOptions) -> Result<W, EncodeError> {
    let mut writer = Writer::new(sink, opts)?;
    writer.write(data)?;
    writer.close()?;
    Ok(writer.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
