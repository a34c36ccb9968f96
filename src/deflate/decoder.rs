use log::{debug, trace};
use thiserror::Error;

use super::dynamic_header::DynamicHeader;
use super::{BlockState, Step};
use crate::bits::BitReader;
use crate::huff_tree::{HuffmanTable, Op, TableError, FIXED_TABLES};
use crate::window::OutputWindow;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeflateReadError {
  #[error("A reserved value was used in the block type")]
  ReservedValueUsed,
  #[error("Too many length/literal codes: {0}")]
  TooManyLengthCodes(usize),
  #[error("Huffman table construction error: {0}")]
  HuffTreeError(#[from] TableError),
  #[error("Invalid code in the code length code")]
  InvalidCodeLengthCode,
  #[error("Asked to repeat the previous code length, but there is none")]
  RepeatWithoutPrevious,
  #[error("Code length repeat of {0} overruns the {1} lengths left")]
  RepeatOverflow(usize, usize),
  #[error("The literal/length code has no end-of-block symbol")]
  MissingEndOfBlock,
  #[error("Invalid literal/length code")]
  InvalidLiteralLength,
  #[error("Invalid distance code")]
  InvalidDistanceCode,
  #[error("Tried to go back {0} symbols, but the stream is only {1} large")]
  BackrefPastStart(usize, usize),
  #[error("The LEN and NLEN fields of an uncompressed block mismatched: {0}, {1}")]
  LenNlenMismatch(u16, u16),
}

#[derive(Debug, Clone)]
struct DynamicTables {
  litlen: HuffmanTable,
  dist: HuffmanTable,
}

#[derive(Debug, Clone)]
enum ActiveTables {
  Fixed,
  Dynamic(Box<DynamicTables>),
}

impl ActiveTables {
  fn litlen(&self) -> &HuffmanTable {
    match self {
      Self::Fixed => &FIXED_TABLES.litlen,
      Self::Dynamic(tables) => &tables.litlen,
    }
  }

  fn dist(&self) -> &HuffmanTable {
    match self {
      Self::Fixed => &FIXED_TABLES.dist,
      Self::Dynamic(tables) => &tables.dist,
    }
  }
}

/// Decoding state of one DEFLATE stream.
#[derive(Debug, Clone)]
pub struct InflateState {
  state: BlockState,
  last_block: bool,
  tables: ActiveTables,
  dynamic: Option<Box<DynamicHeader>>,
  blocks: u64,
}

impl Default for InflateState {
  fn default() -> Self {
    Self::new()
  }
}

impl InflateState {
  pub fn new() -> Self {
    Self {
      state: BlockState::BlockHeader,
      last_block: false,
      tables: ActiveTables::Fixed,
      dynamic: None,
      blocks: 0,
    }
  }

  pub fn state(&self) -> BlockState {
    self.state
  }

  /// Number of blocks completed so far.
  pub fn blocks(&self) -> u64 {
    self.blocks
  }

  /// Make one unit of progress.
  ///
  /// Bits are only consumed once everything the unit needs is buffered, so on
  /// `Step::NeedMoreData` the reader is where it was before the call and the
  /// step can be retried once more input has been pushed.
  pub fn step(
    &mut self,
    bits: &mut BitReader,
    out: &mut OutputWindow,
  ) -> Result<Step, DeflateReadError> {
    match self.state {
      BlockState::BlockHeader => self.block_header(bits),
      BlockState::DynamicTableSizes => self.dynamic_table_sizes(bits),
      BlockState::DynamicTree => self.dynamic_tree(bits),
      BlockState::Data => self.data(bits, out),
      BlockState::DataDistance { length } => self.data_distance(length, bits, out),
      BlockState::StoredImage { remaining } => self.stored_image(remaining, bits, out),
    }
  }

  fn block_header(&mut self, bits: &mut BitReader) -> Result<Step, DeflateReadError> {
    let header = match bits.read(3) {
      Some(header) => header,
      None => return Ok(Step::NeedMoreData),
    };
    self.last_block = header & 1 == 1;
    let kind = match header >> 1 {
      0b00 => {
        bits.align_to_byte();
        self.state = BlockState::StoredImage { remaining: None };
        "stored"
      }
      0b01 => {
        self.tables = ActiveTables::Fixed;
        self.state = BlockState::Data;
        "fixed"
      }
      0b10 => {
        self.dynamic = None;
        self.state = BlockState::DynamicTableSizes;
        "dynamic"
      }
      _ => return Err(DeflateReadError::ReservedValueUsed),
    };
    debug!(
      "Block {}: {}{}",
      self.blocks,
      kind,
      if self.last_block { " (final)" } else { "" }
    );
    Ok(Step::Progress)
  }

  fn dynamic_table_sizes(&mut self, bits: &mut BitReader) -> Result<Step, DeflateReadError> {
    if self.dynamic.is_none() {
      match DynamicHeader::read_sizes(bits)? {
        Some(header) => self.dynamic = Some(Box::new(header)),
        None => return Ok(Step::NeedMoreData),
      }
    }
    if let Some(header) = self.dynamic.as_mut() {
      if !header.read_code_length_code(bits)? {
        return Ok(Step::NeedMoreData);
      }
    }
    self.state = BlockState::DynamicTree;
    Ok(Step::Progress)
  }

  fn dynamic_tree(&mut self, bits: &mut BitReader) -> Result<Step, DeflateReadError> {
    let header = match self.dynamic.as_mut() {
      Some(header) => header,
      None => {
        self.state = BlockState::DynamicTableSizes;
        return Ok(Step::Progress);
      }
    };
    if !header.read_code_lengths(bits)? {
      return Ok(Step::NeedMoreData);
    }
    let (litlen, dist) = header.build_tables()?;
    trace!("litlen table {} entries, dist table {} entries", litlen.len(), dist.len());
    self.tables = ActiveTables::Dynamic(Box::new(DynamicTables { litlen, dist }));
    self.dynamic = None;
    self.state = BlockState::Data;
    Ok(Step::Progress)
  }

  fn data(&mut self, bits: &mut BitReader, out: &mut OutputWindow) -> Result<Step, DeflateReadError> {
    loop {
      if out.needs_flush() {
        return Ok(Step::Flush);
      }
      bits.refill();
      let (entry, used) = match self.tables.litlen().lookup(bits.acc(), bits.bits_in_acc()) {
        Some(found) => found,
        None => return Ok(Step::NeedMoreData),
      };
      match entry.op {
        Op::Literal => {
          bits.consume(used);
          out.push(entry.val as u8);
        }
        Op::Base(extra) => {
          // The length code and its extra bits go together
          let extra = extra as u32;
          if used + extra > bits.bits_in_acc() {
            return Ok(Step::NeedMoreData);
          }
          bits.consume(used);
          let length = entry.val + bits.peek(extra) as u16;
          bits.consume(extra);
          self.state = BlockState::DataDistance { length };
          if self.data_distance(length, bits, out)? == Step::NeedMoreData {
            return Ok(Step::NeedMoreData);
          }
        }
        Op::EndOfBlock => {
          bits.consume(used);
          return Ok(self.end_block());
        }
        Op::Link(_) | Op::Invalid => return Err(DeflateReadError::InvalidLiteralLength),
      }
    }
  }

  fn data_distance(
    &mut self,
    length: u16,
    bits: &mut BitReader,
    out: &mut OutputWindow,
  ) -> Result<Step, DeflateReadError> {
    bits.refill();
    let (entry, used) = match self.tables.dist().lookup(bits.acc(), bits.bits_in_acc()) {
      Some(found) => found,
      None => return Ok(Step::NeedMoreData),
    };
    let extra = match entry.op {
      Op::Base(extra) => extra as u32,
      _ => return Err(DeflateReadError::InvalidDistanceCode),
    };
    if used + extra > bits.bits_in_acc() {
      return Ok(Step::NeedMoreData);
    }
    bits.consume(used);
    let distance = entry.val as usize + bits.peek(extra) as usize;
    bits.consume(extra);
    out.copy_back(distance, length as usize)?;
    self.state = BlockState::Data;
    Ok(Step::Progress)
  }

  fn stored_image(
    &mut self,
    remaining: Option<u16>,
    bits: &mut BitReader,
    out: &mut OutputWindow,
  ) -> Result<Step, DeflateReadError> {
    match remaining {
      None => {
        let header = bits.bytes();
        if header.len() < 4 {
          return Ok(Step::NeedMoreData);
        }
        let len = u16::from_le_bytes([header[0], header[1]]);
        let nlen = u16::from_le_bytes([header[2], header[3]]);
        if len != !nlen {
          return Err(DeflateReadError::LenNlenMismatch(len, nlen));
        }
        bits.advance(4);
        trace!("stored block of {} bytes", len);
        self.state = BlockState::StoredImage {
          remaining: Some(len),
        };
        Ok(Step::Progress)
      }
      Some(0) => Ok(self.end_block()),
      Some(left) => {
        if out.needs_flush() {
          return Ok(Step::Flush);
        }
        let avail = bits.bytes();
        if avail.is_empty() {
          return Ok(Step::NeedMoreData);
        }
        let take = avail.len().min(left as usize);
        out.extend(&avail[..take]);
        bits.advance(take);
        self.state = BlockState::StoredImage {
          remaining: Some(left - take as u16),
        };
        Ok(Step::Progress)
      }
    }
  }

  /// True when the decoder stopped cleanly between blocks rather than inside
  /// one.
  pub fn is_between_blocks(&self) -> bool {
    self.state == BlockState::BlockHeader
  }

  fn end_block(&mut self) -> Step {
    self.state = BlockState::BlockHeader;
    self.blocks += 1;
    Step::BlockEnd {
      last: self.last_block,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::window::DEFAULT_FLUSH_WATERMARK;

  /// Run the decoder over `data` until the final block ends.
  fn inflate(data: &[u8]) -> Result<Vec<u8>, DeflateReadError> {
    let mut bits = BitReader::new();
    let mut out = OutputWindow::new(DEFAULT_FLUSH_WATERMARK);
    let mut state = InflateState::new();
    bits.push(data);
    let mut decoded = Vec::new();
    loop {
      match state.step(&mut bits, &mut out)? {
        Step::BlockEnd { last: true } => break,
        Step::NeedMoreData => panic!("ran out of input"),
        Step::Flush => out.mark_flushed(),
        _ => {}
      }
      decoded.extend(out.read(None));
    }
    decoded.extend(out.read(None));
    Ok(decoded)
  }

  #[test]
  fn fixed_huffman_hello() {
    let data = [0xf3, 0x48, 0xcd, 0xc9, 0xc9, 0xe7, 0x2, 0x0];
    assert_eq!(inflate(&data).unwrap(), b"Hello\n");
  }

  #[test]
  fn dynamic_huffman_hello() {
    let data = [
      0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0xcf, 0x80, 0x13, 0x5c, 0x19, 0xa3, 0x7c, 0xaa, 0xf2, 0x01,
    ];
    let expected = "hellohellohello\n".repeat(22);
    assert_eq!(inflate(&data).unwrap(), expected.as_bytes());
  }

  #[test]
  fn stored_block() {
    let data = [0x01, 0x05, 0x00, 0xfa, 0xff, b'h', b'e', b'l', b'l', b'o'];
    assert_eq!(inflate(&data).unwrap(), b"hello");
  }

  #[test]
  fn empty_stored_block() {
    let data = [0x01, 0x00, 0x00, 0xff, 0xff];
    assert_eq!(inflate(&data).unwrap(), b"");
  }

  #[test]
  fn stored_len_nlen_mismatch() {
    let data = [0x01, 0x05, 0x00, 0x00, 0x00, b'h'];
    assert_eq!(
      inflate(&data),
      Err(DeflateReadError::LenNlenMismatch(5, 0))
    );
  }

  #[test]
  fn reserved_block_type() {
    assert_eq!(inflate(&[0x07]), Err(DeflateReadError::ReservedValueUsed));
  }

  #[test]
  fn byte_at_a_time() {
    let data = [
      0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0xcf, 0x80, 0x13, 0x5c, 0x19, 0xa3, 0x7c, 0xaa, 0xf2, 0x01,
    ];
    let mut bits = BitReader::new();
    let mut out = OutputWindow::new(DEFAULT_FLUSH_WATERMARK);
    let mut state = InflateState::new();
    let mut fed = 0;
    loop {
      match state.step(&mut bits, &mut out).unwrap() {
        Step::BlockEnd { last: true } => break,
        Step::NeedMoreData => {
          bits.push(&data[fed..fed + 1]);
          fed += 1;
        }
        _ => {}
      }
    }
    assert_eq!(out.read(None), "hellohellohello\n".repeat(22).as_bytes());
    assert!(state.is_between_blocks());
  }

  #[test]
  fn flush_interrupts_long_blocks() {
    let data = [
      0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0xcf, 0x80, 0x13, 0x5c, 0x19, 0xa3, 0x7c, 0xaa, 0xf2, 0x01,
    ];
    let mut bits = BitReader::new();
    let mut out = OutputWindow::new(64);
    let mut state = InflateState::new();
    bits.push(&data);
    let mut flushes = 0;
    loop {
      match state.step(&mut bits, &mut out).unwrap() {
        Step::BlockEnd { last: true } => break,
        Step::Flush => {
          flushes += 1;
          out.mark_flushed();
        }
        _ => {}
      }
    }
    assert!(flushes >= 1);
    assert_eq!(out.read(None).len(), 16 * 22);
  }
}
