use super::{
  latin1_to_string, ExtraField, GZFlags, GZXFlags, GzipHeader, OSType, GZIP_CM_DEFLATE, GZIP_ID1,
  GZIP_ID2,
};
use log::debug;
use std::convert::TryFrom;
use std::num::NonZeroU32;
use thiserror::Error;

const FIXED_HEADER_LEN: usize = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GzipReadError {
  #[error("gzip magic bytes invalid. Expected 1F 8B, got {:x} {:x}", .0, .1)]
  InvalidMagicBytes(u8, u8),
  #[error("gzip compression byte invalid. Expected 8, got {0}")]
  InvalidCMByte(u8),
  #[error("Reserved bits on GZFlags were set: {:b}", .0)]
  InvalidFLGs(GZFlags),
  #[error("Extra subfield overruns XLEN at offset {0}")]
  ExtraFieldOverrun(usize),
  #[error("Header longer than the {0} byte limit")]
  HeaderTooLarge(usize),
  #[error("Header CRC16 mismatch: record says {:x}, but calculated {:x}", .0, .1)]
  HeaderCrcMismatch(u16, u16),
  #[error("CRC32 mismatch: record says {:x}, but calculated {:x}", .0, .1)]
  CRC32Mismatch(u32, u32),
  #[error("Data size mismatch: record says {} bytes, but data has {} bytes", .0, .1)]
  IsizeMismatch(u32, u32),
}

/// The part of the header the parser is waiting for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
  Fixed,
  ExtraLen,
  Extra(usize),
  Name,
  Comment,
  HeaderCrc,
}

/// Resumable gzip header parser.
///
/// Each call to `parse` gets every buffered byte from the start of the member.
/// Parsed fields are kept between calls, so each byte is only examined once.
#[derive(Debug, Clone)]
pub struct HeaderParser {
  phase: Phase,
  /// Start of the first unparsed field.
  pos: usize,
  /// How far the current NUL-terminated field has been searched.
  scanned: usize,
  header: GzipHeader,
  verify_crc: bool,
  max_len: usize,
}

impl HeaderParser {
  pub fn new(verify_crc: bool, max_len: usize) -> Self {
    Self {
      phase: Phase::Fixed,
      pos: 0,
      scanned: 0,
      header: GzipHeader {
        flags: GZFlags::empty(),
        mtime: None,
        xfl: GZXFlags::empty(),
        os: OSType::Unknown,
        extra: None,
        name: None,
        comment: None,
        header_crc: None,
      },
      verify_crc,
      max_len,
    }
  }

  /// Parse as much of the header as `data` holds. Returns the header and its
  /// length in bytes once complete, `None` while more bytes are needed.
  pub fn parse(&mut self, data: &[u8]) -> Result<Option<(GzipHeader, usize)>, GzipReadError> {
    loop {
      let done = match self.phase {
        Phase::Fixed => self.parse_fixed(data)?,
        Phase::ExtraLen => self.parse_extra_len(data),
        Phase::Extra(xlen) => self.parse_extra(data, xlen)?,
        Phase::Name => self.parse_string(data, Phase::Comment),
        Phase::Comment => self.parse_string(data, Phase::HeaderCrc),
        Phase::HeaderCrc => self.parse_header_crc(data)?,
      };
      match done {
        Parsed::Advanced => continue,
        Parsed::Incomplete => {
          if data.len() > self.max_len {
            return Err(GzipReadError::HeaderTooLarge(self.max_len));
          }
          return Ok(None);
        }
        Parsed::Complete => {
          if self.pos > self.max_len {
            return Err(GzipReadError::HeaderTooLarge(self.max_len));
          }
          debug!(
            "gzip header: {} bytes, flags {:?}, name {:?}",
            self.pos, self.header.flags, self.header.name
          );
          return Ok(Some((self.header.clone(), self.pos)));
        }
      }
    }
  }

  /// Move on to the first optional field at or after `from` that is present.
  fn next_phase(&mut self, from: Phase) -> Parsed {
    let flags = self.header.flags;
    let order = [
      (Phase::ExtraLen, GZFlags::FEXTRA),
      (Phase::Name, GZFlags::FNAME),
      (Phase::Comment, GZFlags::FCOMMENT),
      (Phase::HeaderCrc, GZFlags::FHCRC),
    ];
    let start = order
      .iter()
      .position(|(phase, _)| *phase == from)
      .unwrap_or(order.len());
    match order[start..].iter().find(|(_, flag)| flags.contains(*flag)) {
      Some((phase, _)) => {
        self.phase = *phase;
        self.scanned = self.pos;
        Parsed::Advanced
      }
      None => Parsed::Complete,
    }
  }

  fn parse_fixed(&mut self, data: &[u8]) -> Result<Parsed, GzipReadError> {
    if data.len() < FIXED_HEADER_LEN {
      return Ok(Parsed::Incomplete);
    }
    let (id1, id2, cm) = (data[0], data[1], data[2]);
    if id1 != GZIP_ID1 || id2 != GZIP_ID2 {
      return Err(GzipReadError::InvalidMagicBytes(id1, id2));
    }
    if cm != GZIP_CM_DEFLATE {
      return Err(GzipReadError::InvalidCMByte(cm));
    }
    let flags = GZFlags::from_bits_truncate(data[3]);
    if !flags.is_valid() {
      return Err(GzipReadError::InvalidFLGs(flags));
    }
    let mtime = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    self.header.flags = flags;
    self.header.mtime = NonZeroU32::new(mtime);
    self.header.xfl = GZXFlags::from_bits_truncate(data[8]);
    self.header.os = OSType::try_from(data[9]).unwrap_or(OSType::Unknown);
    self.pos = FIXED_HEADER_LEN;
    Ok(self.next_phase(Phase::ExtraLen))
  }

  fn parse_extra_len(&mut self, data: &[u8]) -> Parsed {
    if data.len() < self.pos + 2 {
      return Parsed::Incomplete;
    }
    let xlen = u16::from_le_bytes([data[self.pos], data[self.pos + 1]]);
    self.pos += 2;
    self.phase = Phase::Extra(xlen as usize);
    Parsed::Advanced
  }

  fn parse_extra(&mut self, data: &[u8], xlen: usize) -> Result<Parsed, GzipReadError> {
    if data.len() < self.pos + xlen {
      return Ok(Parsed::Incomplete);
    }
    let mut fields = Vec::new();
    let mut rest = &data[self.pos..self.pos + xlen];
    while !rest.is_empty() {
      let offset = xlen - rest.len();
      if rest.len() < 4 {
        return Err(GzipReadError::ExtraFieldOverrun(offset));
      }
      let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
      if rest.len() - 4 < len {
        return Err(GzipReadError::ExtraFieldOverrun(offset));
      }
      fields.push(ExtraField {
        id: [rest[0], rest[1]],
        data: rest[4..4 + len].to_vec(),
      });
      rest = &rest[4 + len..];
    }
    self.header.extra = Some(fields);
    self.pos += xlen;
    Ok(self.next_phase(Phase::Name))
  }

  /// FNAME or FCOMMENT, whichever the current phase is.
  fn parse_string(&mut self, data: &[u8], next: Phase) -> Parsed {
    let nul = match data[self.scanned..].iter().position(|&b| b == 0) {
      Some(i) => self.scanned + i,
      None => {
        self.scanned = data.len();
        return Parsed::Incomplete;
      }
    };
    let text = latin1_to_string(&data[self.pos..nul]);
    if self.phase == Phase::Name {
      self.header.name = Some(text);
    } else {
      self.header.comment = Some(text);
    }
    self.pos = nul + 1;
    self.next_phase(next)
  }

  fn parse_header_crc(&mut self, data: &[u8]) -> Result<Parsed, GzipReadError> {
    if data.len() < self.pos + 2 {
      return Ok(Parsed::Incomplete);
    }
    let recorded = u16::from_le_bytes([data[self.pos], data[self.pos + 1]]);
    if self.verify_crc {
      let calculated = (super::calc_crc32(&data[..self.pos]) & 0xffff) as u16;
      if calculated != recorded {
        return Err(GzipReadError::HeaderCrcMismatch(recorded, calculated));
      }
    }
    self.header.header_crc = Some(recorded);
    self.pos += 2;
    Ok(Parsed::Complete)
  }
}

enum Parsed {
  Advanced,
  Incomplete,
  Complete,
}

/// Parse a complete gzip header held in `data`.
pub fn parse_header(data: &[u8]) -> Result<Option<(GzipHeader, usize)>, GzipReadError> {
  HeaderParser::new(true, usize::MAX).parse(data)
}
