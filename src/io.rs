// File-level I/O helpers.
//
// `encode_file()` streams a binary file through a record writer and
// `decode_file()` turns a record file into a flat binary image. Both use
// buffered I/O and, with the `file-io` feature, report SHA-256 digests of the
// binary side.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::codec::coalesce::coalesce;
use crate::codec::decoder::{ReadError, read_from};
use crate::codec::encoder::{EncodeError, Writer, WriterOptions};
use crate::image::{Image, ImageError};
use crate::record::{Format, Record};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `encode_file()`.
#[derive(Debug, Clone)]
pub struct EncodeStats {
    /// Binary input size in bytes.
    pub input_size: u64,
    /// Data records emitted.
    pub data_records: u64,
    /// Record text size in bytes.
    pub output_size: u64,
    /// SHA-256 of the binary input (if `file-io` feature is enabled).
    pub input_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `decode_file()`.
#[derive(Debug, Clone)]
pub struct DecodeStats {
    /// Records decoded from the input.
    pub records: u64,
    /// Records left after coalescing.
    pub coalesced_records: u64,
    /// Address of the first image byte.
    pub base_address: u32,
    /// Start address carried by the input, if any.
    pub start_address: Option<u32>,
    /// Binary output size in bytes.
    pub output_size: u64,
    /// SHA-256 of the binary output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Read(#[from] ReadError),
    #[error("image error: {0}")]
    Image(#[from] ImageError),
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Decode every record of a file.
pub fn read_file(format: Format, path: &Path) -> Result<Vec<Record>, IoError> {
    let file = File::open(path)?;
    Ok(read_from(format, BufReader::with_capacity(BUF_SIZE, file))?)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Stream `input` through a record writer into `output`.
///
/// `output` is flushed but not closed.
pub fn encode_stream<R: Read, W: Write>(
    mut input: R,
    output: W,
    opts: WriterOptions,
) -> Result<EncodeStats, IoError> {
    let mut writer = Writer::new(CountingWriter::new(output), opts)?;

    #[cfg(feature = "file-io")]
    let mut hasher = sha2::Sha256::new();

    let mut input_size = 0u64;
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        #[cfg(feature = "file-io")]
        {
            hasher.update(&buf[..n]);
        }
        writer.write(&buf[..n])?;
        input_size += n as u64;
    }
    writer.close()?;

    let data_records = writer.data_records();
    let output_size = writer.get_ref().count;

    #[cfg(feature = "file-io")]
    let input_sha256 = Some(hasher.finalize().into());
    #[cfg(not(feature = "file-io"))]
    let input_sha256: Option<[u8; 32]> = None;

    Ok(EncodeStats {
        input_size,
        data_records,
        output_size,
        input_sha256,
    })
}

/// Encode a binary file as records, writing to `output_path`.
pub fn encode_file(
    input_path: &Path,
    output_path: &Path,
    opts: WriterOptions,
) -> Result<EncodeStats, IoError> {
    let input = BufReader::with_capacity(BUF_SIZE, File::open(input_path)?);
    let output = BufWriter::with_capacity(BUF_SIZE, File::create(output_path)?);
    encode_stream(input, output, opts)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode records from `input` and write the flat image to `output`.
///
/// Gaps between data blocks are filled with `fill`.
pub fn decode_stream<R: BufRead, W: Write>(
    format: Format,
    input: R,
    mut output: W,
    fill: u8,
) -> Result<DecodeStats, IoError> {
    let records = read_from(format, input)?;
    let merged = coalesce(&records);
    let image = Image::from_records(&merged, fill)?;

    output.write_all(&image.bytes)?;
    output.flush()?;

    #[cfg(feature = "file-io")]
    let output_sha256 = Some(sha2::Sha256::digest(&image.bytes).into());
    #[cfg(not(feature = "file-io"))]
    let output_sha256: Option<[u8; 32]> = None;

    Ok(DecodeStats {
        records: records.len() as u64,
        coalesced_records: merged.len() as u64,
        base_address: image.base,
        start_address: image.start_address,
        output_size: image.len() as u64,
        output_sha256,
    })
}

/// Decode a record file into a flat binary at `output_path`.
pub fn decode_file(
    format: Format,
    input_path: &Path,
    output_path: &Path,
    fill: u8,
) -> Result<DecodeStats, IoError> {
    let input = BufReader::with_capacity(BUF_SIZE, File::open(input_path)?);
    let output = BufWriter::with_capacity(BUF_SIZE, File::create(output_path)?);
    decode_stream(format, input, output, fill)
}

// ---------------------------------------------------------------------------
// Counting writer
// ---------------------------------------------------------------------------

struct CountingWriter<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AddressWidth;
    use tempfile::tempdir;

    #[test]
    fn encode_decode_file_roundtrip() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let hex = dir.path().join("out.hex");
        let output = dir.path().join("out.bin");

        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        std::fs::write(&input, &data).unwrap();

        let enc = encode_file(&input, &hex, WriterOptions::intel_hex()).unwrap();
        assert_eq!(enc.input_size, 5000);
        assert_eq!(enc.data_records, 5000_u64.div_ceil(16));
        assert_eq!(enc.output_size, std::fs::metadata(&hex).unwrap().len());

        let dec = decode_file(Format::IntelHex, &hex, &output, 0xFF).unwrap();
        assert_eq!(dec.records, enc.data_records + 1);
        assert_eq!(dec.coalesced_records, 2);
        assert_eq!(dec.base_address, 0);
        assert_eq!(dec.output_size, 5000);
        assert_eq!(std::fs::read(&output).unwrap(), data);
    }

    #[test]
    fn srecord_base_address_survives_roundtrip() {
        let opts = WriterOptions::srecord(AddressWidth::Bits32)
            .with_base_address(0x0800_0000)
            .with_start_address(0x0800_0100)
            .with_count();
        let mut text = Vec::new();
        encode_stream(&b"firmware bytes"[..], &mut text, opts).unwrap();

        let mut bin = Vec::new();
        let dec = decode_stream(Format::SRecord, &text[..], &mut bin, 0).unwrap();
        assert_eq!(dec.base_address, 0x0800_0000);
        assert_eq!(dec.start_address, Some(0x0800_0100));
        assert_eq!(bin, b"firmware bytes");
    }

    #[test]
    fn intel_base_address_survives_roundtrip() {
        let opts = WriterOptions::intel_hex()
            .with_base_address(0x0800_0000)
            .with_start_address(0x0800_0100);
        let mut text = Vec::new();
        encode_stream(&b"firmware"[..], &mut text, opts).unwrap();

        let mut bin = Vec::new();
        let dec = decode_stream(Format::IntelHex, &text[..], &mut bin, 0).unwrap();
        assert_eq!(dec.base_address, 0x0800_0000);
        assert_eq!(dec.start_address, Some(0x0800_0100));
        assert_eq!(bin, b"firmware");
    }

    #[test]
    fn read_file_reports_line_of_first_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.hex");
        std::fs::write(&path, ":00000001FF\n:00000001FE\n").unwrap();
        match read_file(Format::IntelHex, &path) {
            Err(IoError::Read(e)) => assert_eq!(e.line, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_input_is_io_error() {
        let dir = tempdir().unwrap();
        let err = encode_file(
            &dir.path().join("nope.bin"),
            &dir.path().join("out.hex"),
            WriterOptions::intel_hex(),
        )
        .unwrap_err();
        assert!(matches!(err, IoError::Io(_)));
    }

    #[cfg(feature = "file-io")]
    #[test]
    fn sha256_matches_across_roundtrip() {
        let data = b"checksummed payload".repeat(40);
        let mut text = Vec::new();
        let enc = encode_stream(&data[..], &mut text, WriterOptions::intel_hex()).unwrap();
        let mut bin = Vec::new();
        let dec = decode_stream(Format::IntelHex, &text[..], &mut bin, 0).unwrap();
        assert!(enc.input_sha256.is_some());
        assert_eq!(enc.input_sha256, dec.output_sha256);
    }
}
