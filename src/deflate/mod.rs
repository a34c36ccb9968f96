/*! A resumable DEFLATE (RFC 1951, https://tools.ietf.org/html/rfc1951)
decoder.

Compressed data may arrive split at any bit. The decoder is a state machine
that only commits to a step once every bit that step needs is buffered, so it
can stop on any input boundary and pick up again when more bytes arrive.
*/

pub mod codepoints;
pub mod decoder;
mod dynamic_header;

/// Where the block decoder is within the current block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockState {
  /// Expecting the 3-bit BFINAL/BTYPE header.
  BlockHeader,
  /// Expecting HLIT/HDIST/HCLEN and the code length code lengths.
  DynamicTableSizes,
  /// Expecting the literal/length and distance code lengths.
  DynamicTree,
  /// Decoding Huffman-coded symbols.
  Data,
  /// A length was decoded; its distance has not been.
  DataDistance { length: u16 },
  /// Inside a stored block. `None` until LEN/NLEN have been read.
  StoredImage { remaining: Option<u16> },
}

/// Outcome of a single decoder step.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Step {
  /// Some state changed; call again.
  Progress,
  /// Not enough buffered input to make progress.
  NeedMoreData,
  /// Output crossed the flush watermark mid-block.
  Flush,
  /// A block ended. `last` is set if it was the final block of the stream.
  BlockEnd { last: bool },
}
