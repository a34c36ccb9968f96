/*! Canonical Huffman decode tables for DEFLATE-style codes.

Huffman codes in DEFLATE carry two constraints that let a whole code be
specified by the code length of each symbol:
 - Symbols with the same length are listed in lexicographical order
 - Shorter codes lexicographically precede longer codes.

From the lengths we build a flat lookup table indexed by the next `root_bits`
bits of input. Codes no longer than the root width are replicated into every
slot they prefix. Longer codes hang off a link entry in the root table that
points at a sub-table indexed by the bits following the root. Each entry says
what it decodes to (`Op`), how many bits it spans at its level, and a value
(the literal, a base length/distance, or a sub-table offset).

Every alphabet DEFLATE uses fits in two levels because codes are at most 15
bits long.
*/

use log::trace;
use thiserror::Error;

use crate::deflate::codepoints::{Codepoint, DIST_CODEPOINTS, LENGTH_CODEPOINTS};

pub const MAX_CODE_LEN: usize = 15;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
  #[error("Code length {0} is outside of 0-15")]
  CodeLengthOutOfRange(u8),
  #[error("Code lengths are over-subscribed at {0} bits")]
  OverSubscribed(usize),
  #[error("Lookup table needs {0} entries but at most {1} are allowed")]
  TooLarge(usize, usize),
}

/// What a table entry decodes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Op {
  /// `val` is the symbol itself.
  Literal,
  /// `val` is a base value to which the given number of extra bits is added.
  Base(u8),
  /// `val` is the offset of a sub-table indexed by the given number of bits.
  Link(u8),
  EndOfBlock,
  /// No code maps here, or the symbol is not allowed in this alphabet.
  Invalid,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Entry {
  pub op: Op,
  /// Bits spanned by this entry at its own table level.
  pub bits: u8,
  pub val: u16,
}

impl Entry {
  const fn invalid(bits: u8) -> Self {
    Self {
      op: Op::Invalid,
      bits,
      val: 0,
    }
  }
}

/// Describes how the symbols of an alphabet map onto table entries.
///
/// Symbols below `simple` decode to themselves. The optional end-of-block
/// symbol comes next, and every symbol after that takes its base value and
/// extra-bit count from `codepoints`. Symbols past the end of `codepoints` are
/// invalid even if the stream assigns them a code.
#[derive(Debug, Clone, Copy)]
pub struct Alphabet {
  simple: usize,
  end_of_block: Option<usize>,
  codepoints: &'static [Codepoint],
  root_bits: u8,
  capacity: usize,
}

/// The 19-symbol alphabet that dynamic blocks use to send their code lengths.
pub const CODE_LENGTH_ALPHABET: Alphabet = Alphabet {
  simple: 19,
  end_of_block: None,
  codepoints: &[],
  root_bits: 7,
  capacity: 128,
};

/// Literals 0-255, end-of-block, then length codes 257-285.
pub const LITLEN_ALPHABET: Alphabet = Alphabet {
  simple: 256,
  end_of_block: Some(256),
  codepoints: &LENGTH_CODEPOINTS,
  root_bits: 9,
  capacity: 852,
};

/// Distance codes 0-29.
pub const DIST_ALPHABET: Alphabet = Alphabet {
  simple: 0,
  end_of_block: None,
  codepoints: &DIST_CODEPOINTS,
  root_bits: 6,
  capacity: 592,
};

impl Alphabet {
  fn entry_for(&self, sym: usize, bits: u8) -> Entry {
    if sym < self.simple {
      return Entry {
        op: Op::Literal,
        bits,
        val: sym as u16,
      };
    }
    let mut coded = sym - self.simple;
    if let Some(eob) = self.end_of_block {
      if sym == eob {
        return Entry {
          op: Op::EndOfBlock,
          bits,
          val: sym as u16,
        };
      }
      coded -= 1;
    }
    match self.codepoints.get(coded) {
      Some(pt) => Entry {
        op: Op::Base(pt.extra_bits()),
        bits,
        val: pt.base(),
      },
      None => Entry::invalid(bits),
    }
  }
}

/// Reverse the low `len` bits of `code`. Canonical codes are defined MSB-first
/// but arrive LSB-first, so table indices use the reversed form.
fn reverse_bits(code: u32, len: usize) -> u32 {
  code.reverse_bits() >> (32 - len)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
  entries: Vec<Entry>,
  root_bits: u8,
}

impl HuffmanTable {
  /// A table in which every lookup is invalid. Used when an alphabet has no
  /// codes at all, e.g. the distance code of a block made only of literals.
  pub fn empty() -> Self {
    Self {
      entries: vec![Entry::invalid(1); 2],
      root_bits: 1,
    }
  }

  /// Build the decode table for the given per-symbol code lengths.
  pub fn from_lengths(lengths: &[u8], alphabet: &Alphabet) -> Result<Self, TableError> {
    let mut bl_count = [0usize; MAX_CODE_LEN + 1];
    for &len in lengths {
      if len as usize > MAX_CODE_LEN {
        return Err(TableError::CodeLengthOutOfRange(len));
      }
      bl_count[len as usize] += 1;
    }
    bl_count[0] = 0;

    let max_len = match (1..=MAX_CODE_LEN).rev().find(|&l| bl_count[l] != 0) {
      Some(l) => l,
      None => return Ok(Self::empty()),
    };
    let min_len = (1..=max_len).find(|&l| bl_count[l] != 0).unwrap_or(max_len);

    // Over-subscribed sets cannot be decoded. Under-subscribed ones leave
    // holes that stay invalid.
    let mut left: isize = 1;
    for (len, &count) in bl_count.iter().enumerate().skip(1) {
      left <<= 1;
      left -= count as isize;
      if left < 0 {
        return Err(TableError::OverSubscribed(len));
      }
    }

    let root = (alphabet.root_bits as usize).min(max_len).max(min_len);

    // Smallest code for each length
    let mut next_code = [0u32; MAX_CODE_LEN + 1];
    let mut code = 0u32;
    for bits in 1..=MAX_CODE_LEN {
      code = (code + bl_count[bits - 1] as u32) << 1;
      next_code[bits] = code;
    }

    let mut codes = Vec::with_capacity(lengths.len());
    for &len in lengths {
      let len = len as usize;
      if len == 0 {
        codes.push(0);
        continue;
      }
      codes.push(reverse_bits(next_code[len], len));
      next_code[len] += 1;
    }

    // Size a sub-table for every root prefix shared by codes longer than root
    let root_size = 1usize << root;
    let root_mask = (root_size - 1) as u32;
    let mut sub_bits = vec![0u8; root_size];
    for (sym, &len) in lengths.iter().enumerate() {
      let len = len as usize;
      if len > root {
        let prefix = (codes[sym] & root_mask) as usize;
        sub_bits[prefix] = sub_bits[prefix].max((len - root) as u8);
      }
    }

    let mut entries = vec![Entry::invalid(root as u8); root_size];
    let mut sub_offset = vec![0usize; root_size];
    for prefix in 0..root_size {
      let bits = sub_bits[prefix];
      if bits == 0 {
        continue;
      }
      sub_offset[prefix] = entries.len();
      entries[prefix] = Entry {
        op: Op::Link(bits),
        bits: root as u8,
        val: entries.len() as u16,
      };
      entries.resize(entries.len() + (1 << bits), Entry::invalid(bits));
    }
    if entries.len() > alphabet.capacity {
      return Err(TableError::TooLarge(entries.len(), alphabet.capacity));
    }

    for (sym, &len) in lengths.iter().enumerate() {
      let len = len as usize;
      if len == 0 {
        continue;
      }
      let rev = codes[sym] as usize;
      if len <= root {
        let entry = alphabet.entry_for(sym, len as u8);
        for slot in (rev..root_size).step_by(1 << len) {
          entries[slot] = entry;
        }
      } else {
        let prefix = rev & root_mask as usize;
        let level_len = len - root;
        let table_size = 1usize << sub_bits[prefix];
        let entry = alphabet.entry_for(sym, level_len as u8);
        for slot in ((rev >> root)..table_size).step_by(1 << level_len) {
          entries[sub_offset[prefix] + slot] = entry;
        }
      }
    }

    trace!(
      "built {}-entry table, root {} bits, codes {}-{} bits{}",
      entries.len(),
      root,
      min_len,
      max_len,
      if left > 0 { ", incomplete" } else { "" }
    );

    Ok(Self {
      entries,
      root_bits: root as u8,
    })
  }

  pub fn root_bits(&self) -> u8 {
    self.root_bits
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.iter().all(|e| e.op == Op::Invalid)
  }

  /// Decode the symbol at the front of `bits`, of which only the low
  /// `available` are real input.
  ///
  /// Returns the final entry and the total number of bits the code spans, or
  /// `None` if the code may extend past the available bits. Sub-table links
  /// are followed here, so the returned entry is never `Op::Link`.
  #[inline]
  pub fn lookup(&self, bits: u64, available: u32) -> Option<(Entry, u32)> {
    let root = self.root_bits as u32;
    let entry = self.entries[(bits & ((1 << root) - 1)) as usize];
    if entry.bits as u32 > available {
      return None;
    }
    match entry.op {
      Op::Link(sub) => {
        let index = entry.val as usize + ((bits >> root) & ((1 << sub) - 1)) as usize;
        let entry = self.entries[index];
        let total = root + entry.bits as u32;
        if total > available {
          None
        } else {
          Some((entry, total))
        }
      }
      _ => Some((entry, entry.bits as u32)),
    }
  }
}

fn fixed_litlen_lengths() -> [u8; 288] {
  let mut lengths = [0u8; 288];
  for (sym, len) in lengths.iter_mut().enumerate() {
    *len = match sym {
      0..=143 => 8,
      144..=255 => 9,
      256..=279 => 7,
      _ => 8,
    };
  }
  lengths
}

/// The literal/length and distance tables for fixed-Huffman blocks (RFC 1951
/// 3.2.6).
#[derive(Debug)]
pub struct FixedTables {
  pub litlen: HuffmanTable,
  pub dist: HuffmanTable,
}

impl FixedTables {
  fn build() -> Result<Self, TableError> {
    Ok(Self {
      litlen: HuffmanTable::from_lengths(&fixed_litlen_lengths(), &LITLEN_ALPHABET)?,
      dist: HuffmanTable::from_lengths(&[5u8; 32], &DIST_ALPHABET)?,
    })
  }
}

lazy_static::lazy_static! {
  pub static ref FIXED_TABLES: FixedTables =
    FixedTables::build().expect("fixed Huffman code lengths form complete codes");
}
