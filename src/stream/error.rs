use thiserror::Error;

use super::config::Format;
use super::StreamState;
use crate::deflate::decoder::DeflateReadError;
use crate::gzip::GzipReadError;
use crate::zlib::ZlibReadError;

/// Broad classes of failure, for callers that do not care about the details.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
  /// The first bytes of a member are neither gzip nor zlib.
  Detection,
  Header,
  /// A dynamic block's Huffman code description is unusable.
  Table,
  Block,
  StoredBlock,
  Distance,
  Checksum,
  /// Input ended inside a member.
  Truncated,
  /// The decoder was already closed.
  Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
  #[error("Unrecognized container magic bytes {:02x} {:02x}", .0, .1)]
  UnknownMagic(u8, u8),
  #[error("Expected {:?} data, but the magic bytes were {:02x} {:02x}", .0, .1, .2)]
  FormatMismatch(Format, u8, u8),
  #[error("Data after the end of a raw DEFLATE stream")]
  TrailingData,
  #[error("gzip: {0}")]
  Gzip(#[from] GzipReadError),
  #[error("zlib: {0}")]
  Zlib(#[from] ZlibReadError),
  #[error("DEFLATE: {0}")]
  Deflate(#[from] DeflateReadError),
  #[error("Input ended in the {0:?} state")]
  Truncated(StreamState),
  #[error("The decoder is closed")]
  Closed,
}

impl StreamError {
  pub fn kind(&self) -> ErrorKind {
    use DeflateReadError::*;
    match self {
      StreamError::UnknownMagic(..) | StreamError::FormatMismatch(..) => ErrorKind::Detection,
      StreamError::TrailingData => ErrorKind::Detection,
      StreamError::Gzip(e) => match e {
        GzipReadError::CRC32Mismatch(..)
        | GzipReadError::IsizeMismatch(..)
        | GzipReadError::HeaderCrcMismatch(..) => ErrorKind::Checksum,
        _ => ErrorKind::Header,
      },
      StreamError::Zlib(e) => match e {
        ZlibReadError::Adler32Mismatch(..) => ErrorKind::Checksum,
        _ => ErrorKind::Header,
      },
      StreamError::Deflate(e) => match e {
        TooManyLengthCodes(_)
        | HuffTreeError(_)
        | InvalidCodeLengthCode
        | RepeatWithoutPrevious
        | RepeatOverflow(..)
        | MissingEndOfBlock => ErrorKind::Table,
        ReservedValueUsed | InvalidLiteralLength => ErrorKind::Block,
        InvalidDistanceCode | BackrefPastStart(..) => ErrorKind::Distance,
        LenNlenMismatch(..) => ErrorKind::StoredBlock,
      },
      StreamError::Truncated(_) => ErrorKind::Truncated,
      StreamError::Closed => ErrorKind::Closed,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::huff_tree::TableError;

  #[test]
  fn kinds() {
    assert_eq!(StreamError::UnknownMagic(0, 0).kind(), ErrorKind::Detection);
    assert_eq!(
      StreamError::from(DeflateReadError::from(TableError::OverSubscribed(3))).kind(),
      ErrorKind::Table
    );
    assert_eq!(
      StreamError::from(DeflateReadError::LenNlenMismatch(1, 1)).kind(),
      ErrorKind::StoredBlock
    );
    assert_eq!(
      StreamError::from(DeflateReadError::BackrefPastStart(2, 1)).kind(),
      ErrorKind::Distance
    );
    assert_eq!(
      StreamError::from(GzipReadError::CRC32Mismatch(1, 2)).kind(),
      ErrorKind::Checksum
    );
    assert_eq!(
      StreamError::from(ZlibReadError::MissingDictionary(7)).kind(),
      ErrorKind::Header
    );
  }

  #[test]
  fn messages() {
    assert_eq!(
      StreamError::UnknownMagic(0xab, 0x01).to_string(),
      "Unrecognized container magic bytes ab 01"
    );
    assert_eq!(
      StreamError::from(DeflateReadError::LenNlenMismatch(5, 0)).to_string(),
      "DEFLATE: The LEN and NLEN fields of an uncompressed block mismatched: 5, 0"
    );
  }
}
