/*! gzip (RFC 1952) member headers and trailers.

Header parsing is resumable: `reader::HeaderParser` is handed the buffered
bytes from the start of the member each time more arrive, and remembers how
far it got. Nothing is consumed until the whole header is present, so the
header CRC can be computed over the original bytes.
*/

pub mod reader;

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Serialize, Serializer};
use std::convert::TryInto;
use std::num::NonZeroU32;

pub use reader::{GzipReadError, HeaderParser};

/* Structure from RFC 1952

Header
   +---+---+---+---+---+---+---+---+---+---+
   |ID1|ID2|CM |FLG|     MTIME     |XFL|OS | (more-->)
   +---+---+---+---+---+---+---+---+---+---+
(if FLG.FEXTRA set)

   +---+---+=================================+
   | XLEN  |...XLEN bytes of "extra field"...| (more-->)
   +---+---+=================================+

(if FLG.FNAME set)

   +=========================================+
   |...original file name, zero-terminated...| (more-->)
   +=========================================+

(if FLG.FCOMMENT set)

   +===================================+
   |...file comment, zero-terminated...| (more-->)
   +===================================+

(if FLG.FHCRC set)

   +---+---+
   | CRC16 |
   +---+---+

   +=======================+
   |...compressed blocks...| (more-->)
   +=======================+

     0   1   2   3   4   5   6   7
   +---+---+---+---+---+---+---+---+
   |     CRC32     |     ISIZE     |
   +---+---+---+---+---+---+---+---+
*/

pub const GZIP_ID1: u8 = 0x1f;
pub const GZIP_ID2: u8 = 0x8b;
/// CM value for DEFLATE, the only method RFC 1952 defines.
pub const GZIP_CM_DEFLATE: u8 = 8;
pub const TRAILER_LEN: usize = 8;

bitflags! {
    /** The bitfields corresponding to FLG in RFC 1952 */
    #[derive(Default)]
    pub struct GZFlags: u8 {
        const FTEXT     = 0b1 << 0;
        const FHCRC     = 0b1 << 1;
        const FEXTRA    = 0b1 << 2;
        const FNAME     = 0b1 << 3;
        const FCOMMENT  = 0b1 << 4;
        const RESERVED1 = 0b1 << 5;
        const RESERVED2 = 0b1 << 6;
        const RESERVED3 = 0b1 << 7;
    }
}
bitflags! {
    #[derive(Default)]
    /** The bitfields corresponding to XFL in RFC 1952 */
    pub struct GZXFlags: u8 {
        const XFL_NO_FLAGS = 0;
        const XFL_MAX_COMPRESSION = 2;
        const XFL_MAX_SPEED = 4;
    }
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone, Serialize)]
#[repr(u8)]
pub enum OSType {
  FatFS = 0,
  Amiga = 1,
  VMS = 2,
  Unix = 3,
  VMorCMS = 4,
  AtariTOS = 5,
  HpfsFS = 6,
  Macintosh = 7,
  ZSystem = 8,
  CPM = 9,
  Tops20 = 10,
  NtfsFS = 11,
  Qds = 12,
  AcornRISC = 13,
  Unknown = 255,
}

impl GZFlags {
  pub fn is_valid(&self) -> bool {
    let all_invalid_bits = GZFlags::from_bits_truncate(0b11100000);
    !self.intersects(all_invalid_bits)
  }
}

fn serialize_flags<S: Serializer>(flags: &GZFlags, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_u8(flags.bits())
}

fn serialize_xflags<S: Serializer>(flags: &GZXFlags, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_u8(flags.bits())
}

/// One subfield of the FEXTRA field: a two-byte id and its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraField {
  pub id: [u8; 2],
  pub data: Vec<u8>,
}

/// A parsed gzip member header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GzipHeader {
  #[serde(serialize_with = "serialize_flags")]
  pub flags: GZFlags,
  /// `None` when the member carries no timestamp (MTIME = 0).
  pub mtime: Option<NonZeroU32>,
  #[serde(serialize_with = "serialize_xflags")]
  pub xfl: GZXFlags,
  pub os: OSType,
  pub extra: Option<Vec<ExtraField>>,
  /// Original file name. RFC 1952 names are ISO 8859-1.
  pub name: Option<String>,
  pub comment: Option<String>,
  pub header_crc: Option<u16>,
}

impl GzipHeader {
  /// True if the compressor flagged the payload as probably text.
  pub fn is_text(&self) -> bool {
    self.flags.contains(GZFlags::FTEXT)
  }

  /// The first extra subfield with the given id.
  pub fn extra_field(&self, id: [u8; 2]) -> Option<&[u8]> {
    self
      .extra
      .as_ref()?
      .iter()
      .find(|field| field.id == id)
      .map(|field| field.data.as_slice())
  }
}

/// The CRC32/ISIZE trailer that ends every gzip member.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct GzipTrailer {
  pub crc32: u32,
  /// Uncompressed size modulo 2^32.
  pub isize: u32,
}

impl GzipTrailer {
  /// Parse a trailer from the front of `data`, or `None` if it is not all
  /// there yet.
  pub fn parse(data: &[u8]) -> Option<Self> {
    if data.len() < TRAILER_LEN {
      return None;
    }
    let crc32 = u32::from_le_bytes(data[0..4].try_into().ok()?);
    let isize = u32::from_le_bytes(data[4..8].try_into().ok()?);
    Some(Self { crc32, isize })
  }

  /// Check the decoded member's CRC32 and length against this trailer.
  pub fn verify(&self, crc32: u32, size: u32) -> Result<(), GzipReadError> {
    if crc32 != self.crc32 {
      return Err(GzipReadError::CRC32Mismatch(self.crc32, crc32));
    }
    if size != self.isize {
      return Err(GzipReadError::IsizeMismatch(self.isize, size));
    }
    Ok(())
  }
}

pub fn calc_crc32(data: &[u8]) -> u32 {
  let mut hasher = crc32fast::Hasher::new();
  hasher.update(data);
  hasher.finalize()
}

/// Decode an ISO 8859-1 string. Every byte maps to the code point of the same
/// value, so this cannot fail.
pub fn latin1_to_string(bytes: &[u8]) -> String {
  bytes.iter().map(|&b| b as char).collect()
}
