/*! An LSB-first bit cursor over a growable buffer of compressed bytes.

Compressed input arrives in arbitrary chunks, so the reader owns the bytes it
has been handed and only releases them once they have been fully folded into
the accumulator (see `compact`). Bits are consumed from the low end of the
accumulator, which is the order RFC 1951 packs them in:

```text
    +--------+--------+
    |76543210|76543210|   <- bit 0 of byte 0 is read first
    +--------+--------+
```

The reader never discards bits on its own. Callers peek, decide whether the
bits they need are present, and only then `consume` them, so a step that runs
out of input leaves the cursor exactly where it found it.
*/

/// Width of the bit accumulator.
const ACC_BITS: u32 = 64;

#[derive(Debug, Default, Clone)]
pub struct BitReader {
  buf: Vec<u8>,
  pos: usize,
  acc: u64,
  nbits: u32,
  consumed: u64,
}

#[inline]
fn mask(n: u32) -> u64 {
  if n >= ACC_BITS {
    u64::MAX
  } else {
    (1u64 << n) - 1
  }
}

impl BitReader {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a chunk of compressed input.
  pub fn push(&mut self, bytes: &[u8]) {
    self.buf.extend_from_slice(bytes);
  }

  /// Number of input bytes not yet folded into the accumulator.
  pub fn unread_bytes(&self) -> usize {
    self.buf.len() - self.pos
  }

  /// Bits held in the accumulator plus every unread input byte.
  pub fn available_bits(&self) -> usize {
    self.nbits as usize + self.unread_bytes() * 8
  }

  /// Bits currently held in the accumulator.
  pub fn bits_in_acc(&self) -> u32 {
    self.nbits
  }

  /// Raw accumulator contents. Only the low `bits_in_acc()` bits are valid;
  /// everything above them reads as zero.
  pub fn acc(&self) -> u64 {
    self.acc
  }

  /// Top the accumulator up to at least `n` bits by folding in whole bytes.
  ///
  /// Returns the number of bytes folded in, or `None` if the reader cannot
  /// supply `n` bits at all. In that case nothing is consumed.
  pub fn fill(&mut self, n: u32) -> Option<usize> {
    debug_assert!(n <= ACC_BITS - 8);
    if self.available_bits() < n as usize {
      return None;
    }
    let mut folded = 0;
    while self.nbits < n {
      self.fold_byte();
      folded += 1;
    }
    Some(folded)
  }

  /// Fold in as many bytes as fit in the accumulator.
  pub fn refill(&mut self) -> usize {
    let mut folded = 0;
    while self.nbits <= ACC_BITS - 8 && self.pos < self.buf.len() {
      self.fold_byte();
      folded += 1;
    }
    folded
  }

  #[inline]
  fn fold_byte(&mut self) {
    self.acc |= (self.buf[self.pos] as u64) << self.nbits;
    self.pos += 1;
    self.nbits += 8;
    self.consumed += 1;
  }

  /// The next `n` bits of the accumulator, without consuming them.
  #[inline]
  pub fn peek(&self, n: u32) -> u32 {
    debug_assert!(n <= 32);
    (self.acc & mask(n)) as u32
  }

  /// Drop `n` bits from the accumulator.
  #[inline]
  pub fn consume(&mut self, n: u32) {
    debug_assert!(n <= self.nbits);
    self.acc = if n >= ACC_BITS { 0 } else { self.acc >> n };
    self.nbits -= n;
  }

  /// Read `n` bits if they are available, leaving the cursor alone otherwise.
  pub fn read(&mut self, n: u32) -> Option<u32> {
    self.fill(n)?;
    let val = self.peek(n);
    self.consume(n);
    Some(val)
  }

  /// Skip to the next byte boundary and hand any whole bytes still sitting in
  /// the accumulator back to the byte stream.
  pub fn align_to_byte(&mut self) {
    let partial = self.nbits % 8;
    self.consume(partial);
    let whole = (self.nbits / 8) as usize;
    self.pos -= whole;
    self.consumed -= whole as u64;
    self.acc = 0;
    self.nbits = 0;
  }

  /// Unread bytes, for byte-aligned parsing. The accumulator must be empty.
  pub fn bytes(&self) -> &[u8] {
    debug_assert_eq!(self.nbits, 0, "byte access while bits are buffered");
    &self.buf[self.pos..]
  }

  /// Mark `n` unread bytes as consumed.
  pub fn advance(&mut self, n: usize) {
    debug_assert!(n <= self.unread_bytes());
    self.pos += n;
    self.consumed += n as u64;
  }

  /// Release input bytes that can no longer be handed back. Whole bytes that
  /// still back the accumulator are kept so `align_to_byte` can return them.
  pub fn compact(&mut self) {
    let keep = (self.nbits / 8) as usize;
    let drop_to = self.pos - keep;
    if drop_to > 0 {
      self.buf.drain(..drop_to);
      self.pos = keep;
    }
  }

  /// Total input bytes consumed so far.
  pub fn total_consumed(&self) -> u64 {
    self.consumed
  }

  /// True when neither the accumulator nor the byte buffer holds anything.
  pub fn is_empty(&self) -> bool {
    self.nbits == 0 && self.unread_bytes() == 0
  }

  /// Forget all buffered input and bits.
  pub fn clear(&mut self) {
    self.buf.clear();
    self.pos = 0;
    self.acc = 0;
    self.nbits = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_lsb_first() {
    let mut bits = BitReader::new();
    bits.push(&[0b1010_1100, 0b0000_0001]);
    assert_eq!(bits.read(3), Some(0b100));
    assert_eq!(bits.read(5), Some(0b10101));
    assert_eq!(bits.read(1), Some(1));
    assert_eq!(bits.available_bits(), 7);
  }

  #[test]
  fn fill_reports_shortfall_without_consuming() {
    let mut bits = BitReader::new();
    bits.push(&[0xff]);
    assert_eq!(bits.fill(9), None);
    assert_eq!(bits.unread_bytes(), 1);
    assert_eq!(bits.bits_in_acc(), 0);
    bits.push(&[0x01]);
    assert_eq!(bits.fill(9), Some(2));
    assert_eq!(bits.peek(9), 0x1ff);
  }

  #[test]
  fn read_across_chunks() {
    let mut bits = BitReader::new();
    bits.push(&[0b0000_0011]);
    assert_eq!(bits.read(2), Some(0b11));
    assert_eq!(bits.read(12), None);
    bits.push(&[0xab]);
    assert_eq!(bits.read(12), Some((0xab << 6) & 0xfff));
    assert_eq!(bits.read(2), Some(0b10));
  }

  #[test]
  fn align_returns_whole_bytes() {
    let mut bits = BitReader::new();
    bits.push(&[0x05, 0x11, 0x22, 0x33]);
    bits.refill();
    assert_eq!(bits.read(3), Some(0x5));
    bits.align_to_byte();
    assert_eq!(bits.bytes(), &[0x11, 0x22, 0x33]);
    assert_eq!(bits.total_consumed(), 1);
  }

  #[test]
  fn compact_keeps_bytes_backing_the_accumulator() {
    let mut bits = BitReader::new();
    bits.push(&[1, 2, 3, 4, 5]);
    bits.refill();
    bits.consume(12);
    bits.compact();
    bits.align_to_byte();
    assert_eq!(bits.bytes(), &[3, 4, 5]);
  }

  #[test]
  fn refill_stops_at_capacity() {
    let mut bits = BitReader::new();
    bits.push(&[0u8; 16]);
    assert_eq!(bits.refill(), 8);
    assert_eq!(bits.bits_in_acc(), 64);
    assert_eq!(bits.available_bits(), 128);
  }
}
