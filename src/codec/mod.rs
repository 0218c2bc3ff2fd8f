// Record stream codec.
//
// # Modules
//
// - `encoder`  - streaming writer: bytes in, framed records out
// - `decoder`  - line parser and whole-stream readers
// - `coalesce` - merging of address-contiguous data records

pub mod coalesce;
pub mod decoder;
pub mod encoder;

pub use coalesce::coalesce;
pub use decoder::{DecodeError, ReadError, RecordReader, decode_line, read_all, read_from, read_str};
pub use encoder::{EncodeError, Trailers, Writer, WriterOptions, encode_all};
