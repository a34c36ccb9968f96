/*! Decoded output, doubling as the LZ77 back-reference window.

The buffer is append-only while decoding. The consumer pulls bytes from a read
offset; bytes that have been read *and* fall outside the current window can
be dropped, which happens lazily on read so that dropping stays amortized.

A zlib preset dictionary lives in the same buffer so back-references can
reach it, but it is hidden from readers and from the checksum.
*/

use std::collections::VecDeque;
use std::ops::Range;

use crate::deflate::decoder::DeflateReadError;

/// Largest window DEFLATE can address.
pub const MAX_WINDOW_SIZE: usize = 32 * 1024;
pub const DEFAULT_FLUSH_WATERMARK: usize = 40 * 1024;

#[derive(Debug, Clone)]
pub struct OutputWindow {
  buf: Vec<u8>,
  read_pos: usize,
  hidden: VecDeque<Range<usize>>,
  hashed: usize,
  flushed: usize,
  window_size: usize,
  history: usize,
  watermark: usize,
  total_out: u64,
}

impl OutputWindow {
  pub fn new(watermark: usize) -> Self {
    Self {
      buf: Vec::new(),
      read_pos: 0,
      hidden: VecDeque::new(),
      hashed: 0,
      flushed: 0,
      window_size: MAX_WINDOW_SIZE,
      history: 0,
      watermark: watermark.max(1),
      total_out: 0,
    }
  }

  /// Begin a new member: back-references may not reach earlier output.
  pub fn start_member(&mut self, window_size: usize) {
    self.window_size = window_size.min(MAX_WINDOW_SIZE);
    self.history = 0;
  }

  pub fn window_size(&self) -> usize {
    self.window_size
  }

  /// Preload a preset dictionary. Its bytes can be referenced but are never
  /// returned by `read` nor reported by `take_unhashed`.
  pub fn prime(&mut self, dictionary: &[u8]) {
    let dictionary = &dictionary[dictionary.len().saturating_sub(self.window_size)..];
    if dictionary.is_empty() {
      return;
    }
    let start = self.buf.len();
    self.buf.extend_from_slice(dictionary);
    self.hidden.push_back(start..self.buf.len());
    self.hashed = self.buf.len();
    self.flushed = self.buf.len();
    self.history += dictionary.len();
  }

  #[inline]
  pub fn push(&mut self, byte: u8) {
    self.buf.push(byte);
    self.history += 1;
    self.total_out += 1;
  }

  pub fn extend(&mut self, bytes: &[u8]) {
    self.buf.extend_from_slice(bytes);
    self.history += bytes.len();
    self.total_out += bytes.len() as u64;
  }

  /// Append `length` bytes copied from `distance` bytes back. The source may
  /// overlap the bytes being produced, repeating the last `distance` bytes.
  pub fn copy_back(&mut self, distance: usize, length: usize) -> Result<(), DeflateReadError> {
    let reach = self.history.min(self.window_size);
    if distance == 0 || distance > reach {
      return Err(DeflateReadError::BackrefPastStart(distance, reach));
    }
    let start = self.buf.len() - distance;
    if length <= distance {
      self.buf.extend_from_within(start..start + length);
    } else {
      // Each pass can copy at most `distance` bytes that already exist
      let mut copied = 0;
      while copied < length {
        let chunk = (length - copied).min(distance);
        let from = start + copied;
        self.buf.extend_from_within(from..from + chunk);
        copied += chunk;
      }
    }
    self.history += length;
    self.total_out += length as u64;
    Ok(())
  }

  /// Bytes decoded but not yet read.
  pub fn pending(&self) -> usize {
    let hidden: usize = self.hidden.iter().map(|r| r.len()).sum();
    self.buf.len() - self.read_pos - hidden
  }

  /// Bytes produced since the last `mark_flushed`.
  pub fn unflushed(&self) -> usize {
    self.buf.len() - self.flushed
  }

  /// True once enough output has piled up to warrant telling the consumer
  /// before the block ends.
  pub fn needs_flush(&self) -> bool {
    self.unflushed() >= self.watermark
  }

  pub fn mark_flushed(&mut self) {
    self.flushed = self.buf.len();
  }

  /// Output produced since the previous call, for running checksums.
  pub fn take_unhashed(&mut self) -> &[u8] {
    let from = self.hashed;
    self.hashed = self.buf.len();
    &self.buf[from..]
  }

  fn skip_hidden(&mut self) {
    while let Some(range) = self.hidden.front() {
      if range.start > self.read_pos {
        break;
      }
      self.read_pos = self.read_pos.max(range.end);
      self.hidden.pop_front();
    }
  }

  /// End of the readable run starting at the read offset.
  fn readable_end(&self) -> usize {
    self.hidden.front().map_or(self.buf.len(), |r| r.start)
  }

  /// Copy out up to `max` pending bytes (all of them when `None`).
  pub fn read(&mut self, max: Option<usize>) -> Vec<u8> {
    let limit = max.unwrap_or(usize::MAX);
    let mut out = Vec::with_capacity(self.pending().min(limit));
    loop {
      self.skip_hidden();
      let end = self.readable_end();
      if self.read_pos >= end || out.len() >= limit {
        break;
      }
      let take = (end - self.read_pos).min(limit - out.len());
      out.extend_from_slice(&self.buf[self.read_pos..self.read_pos + take]);
      self.read_pos += take;
    }
    self.skip_hidden();
    self.compact();
    out
  }

  /// `read` into a caller-provided buffer. Returns the number of bytes copied.
  pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
    let mut filled = 0;
    loop {
      self.skip_hidden();
      let end = self.readable_end();
      if self.read_pos >= end || filled == dst.len() {
        break;
      }
      let take = (end - self.read_pos).min(dst.len() - filled);
      dst[filled..filled + take].copy_from_slice(&self.buf[self.read_pos..self.read_pos + take]);
      self.read_pos += take;
      filled += take;
    }
    self.skip_hidden();
    self.compact();
    filled
  }

  /// Drop read bytes that no back-reference can reach any more.
  fn compact(&mut self) {
    let reachable_from = self.buf.len().saturating_sub(self.window_size);
    let cut = self.read_pos.min(reachable_from);
    if cut < self.window_size.max(MAX_WINDOW_SIZE) {
      return;
    }
    self.buf.drain(..cut);
    self.read_pos -= cut;
    self.hashed = self.hashed.saturating_sub(cut);
    self.flushed = self.flushed.saturating_sub(cut);
    for range in self.hidden.iter_mut() {
      *range = range.start - cut..range.end - cut;
    }
  }

  /// Bytes currently held, read or not.
  pub fn retained(&self) -> usize {
    self.buf.len()
  }

  pub fn total_out(&self) -> u64 {
    self.total_out
  }

  /// Forget everything, including unread output.
  pub fn clear(&mut self) {
    self.buf = Vec::new();
    self.read_pos = 0;
    self.hidden.clear();
    self.hashed = 0;
    self.flushed = 0;
    self.history = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn overlapping_copy_repeats_the_pattern() {
    let mut win = OutputWindow::new(DEFAULT_FLUSH_WATERMARK);
    win.extend(b"ab");
    win.copy_back(2, 7).unwrap();
    assert_eq!(win.read(None), b"ababababa");
  }

  #[test]
  fn run_length_copy() {
    let mut win = OutputWindow::new(DEFAULT_FLUSH_WATERMARK);
    win.push(b'z');
    win.copy_back(1, 258).unwrap();
    assert_eq!(win.read(None), vec![b'z'; 259]);
  }

  #[test]
  fn backref_before_member_start_is_rejected() {
    let mut win = OutputWindow::new(DEFAULT_FLUSH_WATERMARK);
    win.extend(b"previous member");
    win.start_member(MAX_WINDOW_SIZE);
    win.extend(b"abc");
    assert_eq!(
      win.copy_back(4, 3),
      Err(DeflateReadError::BackrefPastStart(4, 3))
    );
  }

  #[test]
  fn bounded_reads_advance() {
    let mut win = OutputWindow::new(DEFAULT_FLUSH_WATERMARK);
    win.extend(b"hello world");
    assert_eq!(win.read(Some(5)), b"hello");
    assert_eq!(win.pending(), 6);
    let mut rest = [0u8; 16];
    assert_eq!(win.read_into(&mut rest), 6);
    assert_eq!(&rest[..6], b" world");
    assert_eq!(win.read(None), b"");
  }

  #[test]
  fn reading_trims_but_keeps_the_window() {
    let mut win = OutputWindow::new(DEFAULT_FLUSH_WATERMARK);
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    win.extend(&data);
    assert_eq!(win.read(None).len(), data.len());
    assert_eq!(win.retained(), MAX_WINDOW_SIZE);
    // The whole window is still addressable
    win.copy_back(MAX_WINDOW_SIZE, 3).unwrap();
    let tail = &data[data.len() - MAX_WINDOW_SIZE..][..3];
    assert_eq!(win.read(None), tail);
  }

  #[test]
  fn unread_output_is_never_trimmed() {
    let mut win = OutputWindow::new(DEFAULT_FLUSH_WATERMARK);
    win.extend(&vec![7u8; 100_000]);
    assert_eq!(win.read(Some(10)).len(), 10);
    assert_eq!(win.pending(), 99_990);
    win.extend(&vec![8u8; 100_000]);
    assert_eq!(win.read(Some(99_990)), vec![7u8; 99_990]);
    assert_eq!(win.read(None), vec![8u8; 100_000]);
  }

  #[test]
  fn dictionary_is_referenced_but_not_read() {
    let mut win = OutputWindow::new(DEFAULT_FLUSH_WATERMARK);
    win.extend(b"unread");
    win.start_member(MAX_WINDOW_SIZE);
    win.take_unhashed();
    win.prime(b"dictionary");
    win.copy_back(10, 4).unwrap();
    assert_eq!(win.take_unhashed(), b"dict");
    assert_eq!(win.pending(), 10);
    assert_eq!(win.read(None), b"unreaddict");
  }

  #[test]
  fn watermark_tracks_unflushed_output() {
    let mut win = OutputWindow::new(4);
    win.extend(b"abc");
    assert!(!win.needs_flush());
    win.push(b'd');
    assert!(win.needs_flush());
    win.mark_flushed();
    assert!(!win.needs_flush());
    assert_eq!(win.total_out(), 4);
  }
}
