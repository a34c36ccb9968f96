/*! The a dynamically-encoded DEFLATE stream block is preceded by a header which
contains the following information:

  - 5 bits: HLIT, # of length/literal codes - 257
  - 5 bits: HDIST, # of distance codes - 1
  - 4 bits: HCLEN, # of Code Length codes - 4
  - (HCLEN + 4) * 3 bits of code lengths for the code alphabet specified by HCLEN,
    given in the order 16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15

  HLIT + 257 code lengths, encoded using the code length alphabet
  HDIST + 1 distance lengths, encoded with the code length alphabet
  From these code lengths, it is possible to construct the canonical Huffman
  codes used for the distance and length/lit trees, and thus to decode the
  DEFLATE payload.

  The header can be split across input chunks at any bit, so it is read in
  three resumable pieces: the sizes, the code length code, and the code
  lengths themselves. Each piece reads one indivisible unit at a time and
  reports whether it ran out of input.
*/

/* From RFC 1951:

      0 - 15: Represent code lengths of 0 - 15
          16: Copy the previous code length 3 - 6 times.
              The next 2 bits indicate repeat length
                    (0 = 3, ... , 3 = 6)
                 Example:  Codes 8, 16 (+2 bits 11),
                           16 (+2 bits 10) will expand to
                           12 code lengths of 8 (1 + 6 + 5)
          17: Repeat a code length of 0 for 3 - 10 times.
              (3 bits of length)
          18: Repeat a code length of 0 for 11 - 138 times
              (7 bits of length)
*/

use log::trace;

use crate::bits::BitReader;
use crate::deflate::codepoints::EOF_CODE;
use crate::deflate::decoder::DeflateReadError;
use crate::huff_tree::{
  HuffmanTable, Op, CODE_LENGTH_ALPHABET, DIST_ALPHABET, LITLEN_ALPHABET,
};

const RAW_CODE_ORDER: [usize; 19] = [
  16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Largest HLIT the format allows (286 literal/length codes).
const MAX_HLIT: u32 = 29;
const MAX_LENS: usize = 288 + 32;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum CodeLengthCodepoint {
  Length(u8),       // A Number of bits, 0-15
  ValueRepeat(u8),  // Valid values: 3-6
  ShortZeroRep(u8), // Valid values: 3-10
  LongZeroRep(u8),  // Valid values: 11-138
}

impl CodeLengthCodepoint {
  /// Decode one codepoint and its repeat bits, or nothing if they are not all
  /// buffered yet.
  fn read_from_bitstream(
    bits: &mut BitReader,
    table: &HuffmanTable,
  ) -> Result<Option<Self>, DeflateReadError> {
    bits.refill();
    let (entry, used) = match table.lookup(bits.acc(), bits.bits_in_acc()) {
      Some(found) => found,
      None => return Ok(None),
    };
    if entry.op != Op::Literal {
      return Err(DeflateReadError::InvalidCodeLengthCode);
    }
    let (extra, base) = match entry.val {
      16 => (2, 3),
      17 => (3, 3),
      18 => (7, 11),
      _ => (0, 0),
    };
    if used + extra > bits.bits_in_acc() {
      return Ok(None);
    }
    bits.consume(used);
    let count = base + bits.peek(extra) as u8;
    bits.consume(extra);
    Ok(Some(match entry.val {
      16 => Self::ValueRepeat(count),
      17 => Self::ShortZeroRep(count),
      18 => Self::LongZeroRep(count),
      n => Self::Length(n as u8),
    }))
  }
}

/// A dynamic block header that is being read.
#[derive(Debug, Clone)]
pub struct DynamicHeader {
  nlen: usize,
  ndist: usize,
  ncode: usize,
  /// Lengths read so far, for whichever piece is in progress.
  have: usize,
  code_lengths: [u8; 19],
  lengths: [u8; MAX_LENS],
  code_length_table: Option<HuffmanTable>,
}

impl DynamicHeader {
  /// Read the 14 bits of HLIT/HDIST/HCLEN.
  pub fn read_sizes(bits: &mut BitReader) -> Result<Option<Self>, DeflateReadError> {
    let sizes = match bits.read(14) {
      Some(sizes) => sizes,
      None => return Ok(None),
    };
    let hlit = sizes & 0x1f;
    let hdist = (sizes >> 5) & 0x1f;
    let hclen = sizes >> 10;
    if hlit > MAX_HLIT {
      return Err(DeflateReadError::TooManyLengthCodes(257 + hlit as usize));
    }
    trace!("hlit: {}, hdist: {}, hclen: {}", hlit, hdist, hclen);
    Ok(Some(Self {
      nlen: 257 + hlit as usize,
      ndist: 1 + hdist as usize,
      ncode: 4 + hclen as usize,
      have: 0,
      code_lengths: [0; 19],
      lengths: [0; MAX_LENS],
      code_length_table: None,
    }))
  }

  /// Read the 3-bit code length code lengths and build their table. Returns
  /// false if input ran out first.
  pub fn read_code_length_code(&mut self, bits: &mut BitReader) -> Result<bool, DeflateReadError> {
    if self.code_length_table.is_some() {
      return Ok(true);
    }
    while self.have < self.ncode {
      match bits.read(3) {
        Some(len) => self.code_lengths[RAW_CODE_ORDER[self.have]] = len as u8,
        None => return Ok(false),
      }
      self.have += 1;
    }
    let table = HuffmanTable::from_lengths(&self.code_lengths, &CODE_LENGTH_ALPHABET)?;
    trace!("size codes: {:?}", self.code_lengths);
    self.code_length_table = Some(table);
    self.have = 0;
    Ok(true)
  }

  /// Read the literal/length and distance code lengths. Returns false if
  /// input ran out first.
  pub fn read_code_lengths(&mut self, bits: &mut BitReader) -> Result<bool, DeflateReadError> {
    let table = match self.code_length_table.take() {
      Some(table) => table,
      None => return Ok(false),
    };
    let res = self.read_code_lengths_with(bits, &table);
    self.code_length_table = Some(table);
    res
  }

  fn read_code_lengths_with(
    &mut self,
    bits: &mut BitReader,
    table: &HuffmanTable,
  ) -> Result<bool, DeflateReadError> {
    while self.have < self.nlen + self.ndist {
      match CodeLengthCodepoint::read_from_bitstream(bits, table)? {
        Some(codepoint) => self.apply(codepoint)?,
        None => return Ok(false),
      }
    }
    Ok(true)
  }

  /// Expand a codepoint into the lengths array. Repeats may run from the
  /// literal/length lengths into the distance lengths, but not past the end.
  fn apply(&mut self, codepoint: CodeLengthCodepoint) -> Result<(), DeflateReadError> {
    let total = self.nlen + self.ndist;
    let (value, count) = match codepoint {
      CodeLengthCodepoint::Length(n) => (n, 1),
      CodeLengthCodepoint::ValueRepeat(count) => {
        if self.have == 0 {
          return Err(DeflateReadError::RepeatWithoutPrevious);
        }
        (self.lengths[self.have - 1], count)
      }
      CodeLengthCodepoint::ShortZeroRep(count) | CodeLengthCodepoint::LongZeroRep(count) => {
        (0, count)
      }
    };
    let count = count as usize;
    if self.have + count > total {
      return Err(DeflateReadError::RepeatOverflow(count, total - self.have));
    }
    for len in &mut self.lengths[self.have..self.have + count] {
      *len = value;
    }
    self.have += count;
    Ok(())
  }

  /// Build the literal/length and distance tables from the completed lengths.
  pub fn build_tables(&self) -> Result<(HuffmanTable, HuffmanTable), DeflateReadError> {
    if self.lengths[EOF_CODE as usize] == 0 {
      return Err(DeflateReadError::MissingEndOfBlock);
    }
    let litlen = HuffmanTable::from_lengths(&self.lengths[..self.nlen], &LITLEN_ALPHABET)?;
    let dist = HuffmanTable::from_lengths(
      &self.lengths[self.nlen..self.nlen + self.ndist],
      &DIST_ALPHABET,
    )?;
    Ok((litlen, dist))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn header(nlen: usize, ndist: usize) -> DynamicHeader {
    DynamicHeader {
      nlen,
      ndist,
      ncode: 19,
      have: 0,
      code_lengths: [0; 19],
      lengths: [0; MAX_LENS],
      code_length_table: None,
    }
  }

  #[test]
  fn rfc_repeat_example() {
    // Codes 8, 16 (+2 bits 11), 16 (+2 bits 10) expand to 12 lengths of 8
    let mut h = header(257, 1);
    h.apply(CodeLengthCodepoint::Length(8)).unwrap();
    h.apply(CodeLengthCodepoint::ValueRepeat(6)).unwrap();
    h.apply(CodeLengthCodepoint::ValueRepeat(5)).unwrap();
    assert_eq!(h.have, 12);
    assert!(h.lengths[..12].iter().all(|&l| l == 8));
  }

  #[test]
  fn repeat_needs_a_previous_length() {
    let mut h = header(257, 1);
    assert_eq!(
      h.apply(CodeLengthCodepoint::ValueRepeat(3)),
      Err(DeflateReadError::RepeatWithoutPrevious)
    );
  }

  #[test]
  fn repeat_may_not_overrun() {
    let mut h = header(257, 1);
    h.apply(CodeLengthCodepoint::LongZeroRep(138)).unwrap();
    h.apply(CodeLengthCodepoint::LongZeroRep(118)).unwrap();
    assert_eq!(
      h.apply(CodeLengthCodepoint::ShortZeroRep(3)),
      Err(DeflateReadError::RepeatOverflow(3, 2))
    );
  }

  #[test]
  fn end_of_block_must_have_a_code() {
    let mut h = header(257, 1);
    h.apply(CodeLengthCodepoint::Length(1)).unwrap();
    h.apply(CodeLengthCodepoint::Length(1)).unwrap();
    assert_eq!(h.build_tables().err(), Some(DeflateReadError::MissingEndOfBlock));
  }

  #[test]
  fn oversized_hlit_is_rejected() {
    let mut bits = BitReader::new();
    // HLIT = 30, HDIST = 0, HCLEN = 0
    bits.push(&[30, 0]);
    assert_eq!(
      DynamicHeader::read_sizes(&mut bits).err(),
      Some(DeflateReadError::TooManyLengthCodes(287))
    );
  }

  #[test]
  fn sizes_wait_for_fourteen_bits() {
    let mut bits = BitReader::new();
    bits.push(&[0xff]);
    assert!(DynamicHeader::read_sizes(&mut bits).unwrap().is_none());
    assert_eq!(bits.available_bits(), 8);
  }
}
