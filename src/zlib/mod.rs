/*! zlib (RFC 1950) stream headers and trailers.

```text
      0   1
    +---+---+
    |CMF|FLG|   (more-->)
    +---+---+

    (if FLG.FDICT set)

      0   1   2   3
    +---+---+---+---+
    |     DICTID    |   (more-->)
    +---+---+---+---+

    +=====================+---+---+---+---+
    |...compressed data...|    ADLER32    |
    +=====================+---+---+---+---+
```

Multi-byte fields are big-endian, unlike gzip.
*/

use log::debug;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;
use std::convert::{TryFrom, TryInto};
use thiserror::Error;

pub const ZLIB_CM_DEFLATE: u8 = 8;
/// Largest CINFO, for a 32 KiB window.
pub const MAX_CINFO: u8 = 7;
pub const TRAILER_LEN: usize = 4;
const FDICT: u8 = 0b1 << 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZlibReadError {
  #[error("zlib compression method invalid. Expected 8, got {0}")]
  InvalidMethod(u8),
  #[error("zlib window size exponent {0} is larger than 7")]
  InvalidWindow(u8),
  #[error("zlib header check bits are wrong: {:04x} is not a multiple of 31", .0)]
  HeaderChecksum(u16),
  #[error("Stream needs preset dictionary {:08x}, but none was configured", .0)]
  MissingDictionary(u32),
  #[error("Stream needs preset dictionary {:08x}, but the configured one is {:08x}", .0, .1)]
  DictionaryMismatch(u32, u32),
  #[error("Adler-32 mismatch: record says {:x}, but calculated {:x}", .0, .1)]
  Adler32Mismatch(u32, u32),
}

/// FLEVEL: a hint about how hard the compressor tried.
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone, Serialize)]
#[repr(u8)]
pub enum CompressionLevel {
  Fastest = 0,
  Fast = 1,
  Default = 2,
  Maximum = 3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZlibHeader {
  pub level: CompressionLevel,
  /// LZ77 window size in bytes, `2^(CINFO + 8)`.
  pub window_size: usize,
  /// Adler-32 of the preset dictionary, if the stream needs one.
  pub dictionary_id: Option<u32>,
}

/// True if the two bytes could start a zlib stream: DEFLATE method and valid
/// check bits.
pub fn is_header_magic(cmf: u8, flg: u8) -> bool {
  cmf & 0x0f == ZLIB_CM_DEFLATE && u16::from_be_bytes([cmf, flg]) % 31 == 0
}

impl ZlibHeader {
  /// Parse a header from the front of `data`. Returns the header and its
  /// length, or `None` if it is not all there yet.
  pub fn parse(data: &[u8]) -> Result<Option<(Self, usize)>, ZlibReadError> {
    if data.len() < 2 {
      return Ok(None);
    }
    let (cmf, flg) = (data[0], data[1]);
    if cmf & 0x0f != ZLIB_CM_DEFLATE {
      return Err(ZlibReadError::InvalidMethod(cmf & 0x0f));
    }
    let check = u16::from_be_bytes([cmf, flg]);
    if check % 31 != 0 {
      return Err(ZlibReadError::HeaderChecksum(check));
    }
    let cinfo = cmf >> 4;
    if cinfo > MAX_CINFO {
      return Err(ZlibReadError::InvalidWindow(cinfo));
    }
    let (dictionary_id, len) = if flg & FDICT != 0 {
      if data.len() < 6 {
        return Ok(None);
      }
      (Some(u32::from_be_bytes([data[2], data[3], data[4], data[5]])), 6)
    } else {
      (None, 2)
    };
    let header = Self {
      level: CompressionLevel::try_from(flg >> 6).unwrap_or(CompressionLevel::Default),
      window_size: 1 << (cinfo + 8),
      dictionary_id,
    };
    debug!("zlib header: {:?}", header);
    Ok(Some((header, len)))
  }
}

/// The Adler-32 of the uncompressed data that ends a zlib stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct ZlibTrailer {
  pub adler32: u32,
}

impl ZlibTrailer {
  pub fn parse(data: &[u8]) -> Option<Self> {
    let bytes: [u8; TRAILER_LEN] = data.get(..TRAILER_LEN)?.try_into().ok()?;
    Some(Self {
      adler32: u32::from_be_bytes(bytes),
    })
  }

  pub fn verify(&self, adler32: u32) -> Result<(), ZlibReadError> {
    if adler32 != self.adler32 {
      return Err(ZlibReadError::Adler32Mismatch(self.adler32, adler32));
    }
    Ok(())
  }
}

/// Adler-32 of a preset dictionary, as carried in DICTID.
pub fn dictionary_id(dictionary: &[u8]) -> u32 {
  adler32::RollingAdler32::from_buffer(dictionary).hash()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_header() {
    assert!(is_header_magic(0x78, 0x9c));
    let (header, len) = ZlibHeader::parse(&[0x78, 0x9c]).unwrap().unwrap();
    assert_eq!(len, 2);
    assert_eq!(header.window_size, 32 * 1024);
    assert_eq!(header.level, CompressionLevel::Default);
    assert_eq!(header.dictionary_id, None);
  }

  #[test]
  fn small_window_best_speed() {
    // CINFO = 1, FLEVEL = 0
    let (header, _) = ZlibHeader::parse(&[0x18, 0x19]).unwrap().unwrap();
    assert_eq!(header.window_size, 512);
    assert_eq!(header.level, CompressionLevel::Fastest);
  }

  #[test]
  fn dictionary_id_waits_for_all_bytes() {
    let data = [0x78, 0xbb, 0x12, 0x34, 0x56, 0x78];
    assert!(is_header_magic(data[0], data[1]));
    assert_eq!(ZlibHeader::parse(&data[..5]), Ok(None));
    let (header, len) = ZlibHeader::parse(&data).unwrap().unwrap();
    assert_eq!(len, 6);
    assert_eq!(header.dictionary_id, Some(0x12345678));
  }

  #[test]
  fn bad_fields() {
    assert!(!is_header_magic(0x1f, 0x8b));
    assert_eq!(ZlibHeader::parse(&[0x79, 0x00]), Err(ZlibReadError::InvalidMethod(9)));
    assert_eq!(
      ZlibHeader::parse(&[0x78, 0x9d]),
      Err(ZlibReadError::HeaderChecksum(0x789d))
    );
    // CINFO = 8 with valid check bits
    assert!(is_header_magic(0x88, 0x1c));
    assert_eq!(ZlibHeader::parse(&[0x88, 0x1c]), Err(ZlibReadError::InvalidWindow(8)));
  }

  #[test]
  fn trailer_is_big_endian() {
    let trailer = ZlibTrailer::parse(&[0x06, 0x2c, 0x02, 0x15]).unwrap();
    assert_eq!(trailer.adler32, 0x062c0215);
    assert!(trailer.verify(dictionary_id(b"hello world")).is_err());
    assert_eq!(ZlibTrailer::parse(&[0x06, 0x2c, 0x02]), None);
  }

  #[test]
  fn adler_of_known_text() {
    assert_eq!(dictionary_id(b"Wikipedia"), 0x11e60398);
  }
}
