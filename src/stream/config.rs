use serde::{Deserialize, Serialize};

use crate::window::DEFAULT_FLUSH_WATERMARK;

/// Which container the decoder expects.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
  /// Sniff gzip or zlib from the first two bytes of each member.
  Auto,
  Gzip,
  Zlib,
  /// Headerless DEFLATE: one stream, no trailer.
  Raw,
}

impl Default for Format {
  fn default() -> Self {
    Format::Auto
  }
}

pub const DEFAULT_MAX_HEADER_SIZE: usize = 128 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
  pub format: Format,
  /// Unflushed output that triggers `DataAvailable` before a block ends.
  pub flush_watermark: usize,
  /// Check CRC32/ISIZE, Adler-32 and the gzip header CRC.
  pub verify_checksums: bool,
  /// Largest gzip header accepted, counting extra field, name and comment.
  pub max_header_size: usize,
  /// zlib preset dictionary. Also primes the window for raw streams.
  pub dictionary: Option<Vec<u8>>,
}

impl Default for DecoderConfig {
  fn default() -> Self {
    Self {
      format: Format::Auto,
      flush_watermark: DEFAULT_FLUSH_WATERMARK,
      verify_checksums: true,
      max_header_size: DEFAULT_MAX_HEADER_SIZE,
      dictionary: None,
    }
  }
}

impl DecoderConfig {
  pub fn with_format(mut self, format: Format) -> Self {
    self.format = format;
    self
  }

  pub fn with_dictionary(mut self, dictionary: &[u8]) -> Self {
    self.dictionary = Some(dictionary.to_vec());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_fields_take_defaults() {
    let config: DecoderConfig = serde_json::from_str(r#"{"format": "zlib"}"#).unwrap();
    assert_eq!(config.format, Format::Zlib);
    assert_eq!(config.flush_watermark, 40 * 1024);
    assert!(config.verify_checksums);
    assert_eq!(config.dictionary, None);
  }

  #[test]
  fn round_trips_through_json() {
    let config = DecoderConfig::default()
      .with_format(Format::Raw)
      .with_dictionary(b"abc");
    let json = serde_json::to_string(&config).unwrap();
    let back: DecoderConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
  }
}
