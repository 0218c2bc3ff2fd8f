//! hexrec: Intel HEX and Motorola S-record encoding/decoding in Rust.
//!
//! The crate provides:
//! - Record framing, checksums and the record-type table (`record`)
//! - A streaming writer, line decoder and data-record coalescer (`codec`)
//! - Flat memory images built from record streams (`image`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use hexrec::codec::{coalesce, encode_all, read_str};
//! use hexrec::record::{AddressWidth, Format};
//! use hexrec::WriterOptions;
//!
//! let firmware: Vec<u8> = (0..100).collect();
//!
//! let text = encode_all(Vec::new(), &firmware, WriterOptions::srecord(AddressWidth::Bits24)).unwrap();
//! let text = String::from_utf8(text).unwrap();
//!
//! let records = read_str(Format::SRecord, &text).unwrap();
//! assert_eq!(records.len(), 10);
//!
//! let merged = coalesce(&records);
//! assert_eq!(merged.len(), 1);
//! assert_eq!(merged[0].payload, firmware);
//! ```

pub mod codec;
pub mod image;
pub mod io;
pub mod record;

#[cfg(feature = "cli")]
pub mod cli;

pub use codec::{DecodeError, EncodeError, ReadError, Trailers, Writer, WriterOptions};
pub use image::Image;
pub use record::{AddressWidth, Format, Record, RecordType};
