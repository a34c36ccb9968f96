use adler32::RollingAdler32;
use crc32fast::Hasher;

use crate::gzip::{GzipReadError, GzipTrailer};
use crate::zlib::{ZlibReadError, ZlibTrailer};

/// Running checksum over the uncompressed data of the current member.
#[derive(Clone)]
pub enum Integrity {
  None,
  Crc32 { hasher: Hasher, size: u32 },
  Adler32(RollingAdler32),
}

impl Integrity {
  pub fn crc32() -> Self {
    Integrity::Crc32 {
      hasher: Hasher::new(),
      size: 0,
    }
  }

  pub fn adler32() -> Self {
    Integrity::Adler32(RollingAdler32::new())
  }

  pub fn update(&mut self, data: &[u8]) {
    if data.is_empty() {
      return;
    }
    match self {
      Integrity::None => {}
      Integrity::Crc32 { hasher, size } => {
        hasher.update(data);
        *size = size.wrapping_add(data.len() as u32);
      }
      Integrity::Adler32(adler) => adler.update_buffer(data),
    }
  }

  pub fn verify_gzip(&self, trailer: &GzipTrailer) -> Result<(), GzipReadError> {
    match self {
      Integrity::Crc32 { hasher, size } => trailer.verify(hasher.clone().finalize(), *size),
      _ => Ok(()),
    }
  }

  pub fn verify_zlib(&self, trailer: &ZlibTrailer) -> Result<(), ZlibReadError> {
    match self {
      Integrity::Adler32(adler) => trailer.verify(adler.hash()),
      _ => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn crc_and_size_accumulate_across_updates() {
    let mut integrity = Integrity::crc32();
    integrity.update(b"Hel");
    integrity.update(b"");
    integrity.update(b"lo!\n");
    let trailer = GzipTrailer {
      crc32: 0xb042d89e,
      isize: 7,
    };
    assert_eq!(integrity.verify_gzip(&trailer), Ok(()));
  }

  #[test]
  fn adler_mismatch() {
    let mut integrity = Integrity::adler32();
    integrity.update(b"Wikipedia");
    assert_eq!(integrity.verify_zlib(&ZlibTrailer { adler32: 0x11e60398 }), Ok(()));
    assert_eq!(
      integrity.verify_zlib(&ZlibTrailer { adler32: 1 }),
      Err(ZlibReadError::Adler32Mismatch(1, 0x11e60398))
    );
  }
}
