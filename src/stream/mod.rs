/*! The container driver: turns chunks of gzip, zlib or raw DEFLATE input into
decompressed output and a stream of `Event`s.

```text
    Detect -> Header -> Compressed -> Footer -> Detect -> ...
```

Detect runs again after every member, so concatenated members decode as one
stream. All state lives in `StreamDecoder`; `consume` runs the state machine
until it needs more input and then returns, so the caller is never blocked.

Errors are terminal. The decoder discards its state, emits
`Event::Closed { error: true }` and rejects further input.
*/

pub mod checksum;
pub mod config;
pub mod error;
pub mod event;

use log::{debug, warn};
use std::collections::VecDeque;
use std::io;

use crate::bits::BitReader;
use crate::deflate::decoder::InflateState;
use crate::deflate::Step;
use crate::gzip::{self, GzipTrailer, HeaderParser};
use crate::window::{OutputWindow, MAX_WINDOW_SIZE};
use crate::zlib::{self, ZlibHeader, ZlibReadError, ZlibTrailer};

use checksum::Integrity;
pub use config::{DecoderConfig, Format};
pub use error::{ErrorKind, StreamError};
pub use event::{Container, Event, EventSink, FnSink, Header, NullSink, Trailer};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamState {
  Detect,
  Header,
  Compressed,
  Footer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Progress {
  Continue,
  NeedMoreData,
}

pub struct StreamDecoder<S: EventSink = VecDeque<Event>> {
  config: DecoderConfig,
  sink: S,
  bits: BitReader,
  window: OutputWindow,
  inflate: InflateState,
  state: StreamState,
  container: Container,
  gzip_header: Option<HeaderParser>,
  integrity: Integrity,
  read_interest: bool,
  closed: bool,
  members: u64,
  total_in: u64,
}

impl StreamDecoder<VecDeque<Event>> {
  /// A decoder that queues its events for `poll_event`.
  pub fn new(config: DecoderConfig) -> Self {
    Self::with_sink(config, VecDeque::new())
  }

  pub fn poll_event(&mut self) -> Option<Event> {
    self.sink.pop_front()
  }

  pub fn drain_events(&mut self) -> Vec<Event> {
    self.sink.drain(..).collect()
  }
}

impl Default for StreamDecoder<VecDeque<Event>> {
  fn default() -> Self {
    Self::new(DecoderConfig::default())
  }
}

impl<S: EventSink> StreamDecoder<S> {
  pub fn with_sink(config: DecoderConfig, sink: S) -> Self {
    let window = OutputWindow::new(config.flush_watermark);
    Self {
      config,
      sink,
      bits: BitReader::new(),
      window,
      inflate: InflateState::new(),
      state: StreamState::Detect,
      container: Container::None,
      gzip_header: None,
      integrity: Integrity::None,
      read_interest: true,
      closed: false,
      members: 0,
      total_in: 0,
    }
  }

  pub fn config(&self) -> &DecoderConfig {
    &self.config
  }

  pub fn sink(&self) -> &S {
    &self.sink
  }

  pub fn sink_mut(&mut self) -> &mut S {
    &mut self.sink
  }

  pub fn into_sink(self) -> S {
    self.sink
  }

  pub fn state(&self) -> StreamState {
    self.state
  }

  /// Container of the member being decoded.
  pub fn container(&self) -> Container {
    self.container
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }

  /// Compressed bytes accepted so far.
  pub fn total_in(&self) -> u64 {
    self.total_in
  }

  /// Decompressed bytes produced so far, read or not.
  pub fn total_out(&self) -> u64 {
    self.window.total_out()
  }

  /// Members decoded to completion.
  pub fn members(&self) -> u64 {
    self.members
  }

  /// Decompressed bytes waiting to be read.
  pub fn pending(&self) -> usize {
    self.window.pending()
  }

  /// Feed the next chunk of compressed input and decode as far as it allows.
  pub fn consume(&mut self, input: &[u8]) -> Result<(), StreamError> {
    if self.closed {
      return Err(StreamError::Closed);
    }
    self.total_in += input.len() as u64;
    self.bits.push(input);
    match self.run() {
      Ok(()) => {
        self.bits.compact();
        Ok(())
      }
      Err(e) => {
        self.fail(&e);
        Err(e)
      }
    }
  }

  /// Declare the input complete. Fails if it stopped inside a member.
  pub fn finish(&mut self) -> Result<(), StreamError> {
    if self.closed {
      return Err(StreamError::Closed);
    }
    let complete = match self.state {
      StreamState::Detect => match self.config.format {
        Format::Raw => self.members > 0,
        _ => self.bits.unread_bytes() == 0,
      },
      _ => false,
    };
    if complete {
      return Ok(());
    }
    let e = StreamError::Truncated(self.state);
    self.fail(&e);
    Err(e)
  }

  /// Take up to `max` bytes of output, or all of it when `None`.
  pub fn read(&mut self, max: Option<usize>) -> Vec<u8> {
    let out = self.window.read(max);
    self.notify_data();
    out
  }

  /// `read` into a caller-provided buffer.
  pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
    let n = self.window.read_into(dst);
    self.notify_data();
    n
  }

  /// Whether `DataAvailable` should be raised. Turning interest on with
  /// output pending raises it straight away.
  pub fn set_read_interest(&mut self, interested: bool) {
    self.read_interest = interested;
    self.notify_data();
  }

  /// Discard everything and stop. Only the first call emits `Closed`.
  pub fn close(&mut self) {
    if self.closed {
      return;
    }
    debug!("Closing decoder after {} members", self.members);
    self.shut_down();
    self.sink.emit(Event::Closed { error: false });
  }

  fn fail(&mut self, e: &StreamError) {
    warn!("Closing decoder after error: {}", e);
    self.shut_down();
    self.sink.emit(Event::Closed { error: true });
  }

  fn shut_down(&mut self) {
    self.closed = true;
    self.bits.clear();
    self.window.clear();
    self.inflate = InflateState::new();
    self.gzip_header = None;
    self.integrity = Integrity::None;
    self.container = Container::None;
    self.state = StreamState::Detect;
  }

  fn notify_data(&mut self) {
    if self.read_interest && !self.closed && self.window.pending() > 0 {
      self.sink.emit(Event::DataAvailable);
    }
  }

  fn run(&mut self) -> Result<(), StreamError> {
    loop {
      let progress = match self.state {
        StreamState::Detect => self.detect()?,
        StreamState::Header => self.header()?,
        StreamState::Compressed => self.compressed()?,
        StreamState::Footer => self.footer()?,
      };
      if progress == Progress::NeedMoreData {
        return Ok(());
      }
    }
  }

  fn start_member(&mut self, container: Container) {
    debug!("Detected {:?} member {}", container, self.members);
    self.container = container;
    self.inflate = InflateState::new();
    self.window.start_member(MAX_WINDOW_SIZE);
    self.sink.emit(Event::ContainerDetected(container));
  }

  fn detect(&mut self) -> Result<Progress, StreamError> {
    if self.config.format == Format::Raw {
      if self.members > 0 {
        if self.bits.unread_bytes() > 0 {
          return Err(StreamError::TrailingData);
        }
        return Ok(Progress::NeedMoreData);
      }
      self.start_member(Container::Raw);
      if let Some(dictionary) = &self.config.dictionary {
        self.window.prime(dictionary);
      }
      self.integrity = Integrity::None;
      self.state = StreamState::Compressed;
      return Ok(Progress::Continue);
    }

    let magic = self.bits.bytes();
    if magic.len() < 2 {
      return Ok(Progress::NeedMoreData);
    }
    let (b0, b1) = (magic[0], magic[1]);
    let container = if b0 == gzip::GZIP_ID1 && b1 == gzip::GZIP_ID2 {
      Container::Gzip
    } else if zlib::is_header_magic(b0, b1) {
      Container::Zlib
    } else {
      return Err(StreamError::UnknownMagic(b0, b1));
    };
    match (self.config.format, container) {
      (Format::Auto, _) | (Format::Gzip, Container::Gzip) | (Format::Zlib, Container::Zlib) => {}
      (format, _) => return Err(StreamError::FormatMismatch(format, b0, b1)),
    }
    self.start_member(container);
    self.state = StreamState::Header;
    Ok(Progress::Continue)
  }

  fn header(&mut self) -> Result<Progress, StreamError> {
    let header = match self.container {
      Container::Gzip => {
        let config = &self.config;
        let parser = self
          .gzip_header
          .get_or_insert_with(|| HeaderParser::new(config.verify_checksums, config.max_header_size));
        let (header, len) = match parser.parse(self.bits.bytes())? {
          Some(parsed) => parsed,
          None => return Ok(Progress::NeedMoreData),
        };
        self.bits.advance(len);
        self.gzip_header = None;
        self.integrity = Integrity::crc32();
        Header::Gzip(header)
      }
      Container::Zlib => {
        let (header, len) = match ZlibHeader::parse(self.bits.bytes())? {
          Some(parsed) => parsed,
          None => return Ok(Progress::NeedMoreData),
        };
        self.bits.advance(len);
        self.window.start_member(header.window_size);
        if let Some(id) = header.dictionary_id {
          let dictionary = match &self.config.dictionary {
            Some(dictionary) => dictionary,
            None => return Err(ZlibReadError::MissingDictionary(id).into()),
          };
          let actual = zlib::dictionary_id(dictionary);
          if actual != id {
            return Err(ZlibReadError::DictionaryMismatch(id, actual).into());
          }
          self.window.prime(dictionary);
        }
        self.integrity = Integrity::adler32();
        Header::Zlib(header)
      }
      Container::Raw | Container::None => {
        self.state = StreamState::Compressed;
        return Ok(Progress::Continue);
      }
    };
    if !self.config.verify_checksums {
      self.integrity = Integrity::None;
    }
    self.sink.emit(Event::HeaderReady(header));
    self.state = StreamState::Compressed;
    Ok(Progress::Continue)
  }

  fn compressed(&mut self) -> Result<Progress, StreamError> {
    loop {
      let step = self.inflate.step(&mut self.bits, &mut self.window)?;
      self.integrity.update(self.window.take_unhashed());
      match step {
        Step::Progress => {}
        Step::NeedMoreData => return Ok(Progress::NeedMoreData),
        Step::Flush => {
          self.window.mark_flushed();
          self.notify_data();
        }
        Step::BlockEnd { last } => {
          self.sink.emit(Event::BlockReady { last });
          if self.window.unflushed() > 0 {
            self.window.mark_flushed();
            self.notify_data();
          }
          if last {
            // The trailer starts at the next byte boundary
            self.bits.align_to_byte();
            self.state = StreamState::Footer;
            return Ok(Progress::Continue);
          }
        }
      }
    }
  }

  fn footer(&mut self) -> Result<Progress, StreamError> {
    let trailer = match self.container {
      Container::Gzip => {
        let trailer = match GzipTrailer::parse(self.bits.bytes()) {
          Some(trailer) => trailer,
          None => return Ok(Progress::NeedMoreData),
        };
        self.bits.advance(gzip::TRAILER_LEN);
        self.integrity.verify_gzip(&trailer)?;
        Trailer::Gzip(trailer)
      }
      Container::Zlib => {
        let trailer = match ZlibTrailer::parse(self.bits.bytes()) {
          Some(trailer) => trailer,
          None => return Ok(Progress::NeedMoreData),
        };
        self.bits.advance(zlib::TRAILER_LEN);
        self.integrity.verify_zlib(&trailer)?;
        Trailer::Zlib(trailer)
      }
      Container::Raw | Container::None => Trailer::Raw,
    };
    self.members += 1;
    debug!(
      "Finished member {} after {} blocks, {} bytes out so far",
      self.members,
      self.inflate.blocks(),
      self.window.total_out()
    );
    self.sink.emit(Event::ContainerFinished(trailer));
    self.container = Container::None;
    self.integrity = Integrity::None;
    self.state = StreamState::Detect;
    Ok(Progress::Continue)
  }
}

/// Compressed bytes written in are decoded straight away.
impl<S: EventSink> io::Write for StreamDecoder<S> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self
      .consume(buf)
      .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// Reads return `Ok(0)` whenever no output is pending, which need not mean
/// the stream has ended.
impl<S: EventSink> io::Read for StreamDecoder<S> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    Ok(self.read_into(buf))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // A gzip file with filename "simplehello.txt" containing the text "Hello!\n"
  const SIMPLE_HELLO: [u8; 43] = [
    0x1f, 0x8b, 0x08, 0x08, 0xcf, 0x01, 0x69, 0x5f, 0x02, 0x03, 0x73, 0x69, 0x6d, 0x70, 0x6c,
    0x65, 0x68, 0x65, 0x6c, 0x6c, 0x6f, 0x2e, 0x74, 0x78, 0x74, 0x00, 0xf3, 0x48, 0xcd, 0xc9,
    0xc9, 0x57, 0xe4, 0x02, 0x00, 0x9e, 0xd8, 0x42, 0xb0, 0x07, 0x00, 0x00, 0x00u8,
  ];

  #[test]
  fn decoder_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<StreamDecoder>();
  }

  #[test]
  fn decode_compressed_hello() {
    let mut decoder = StreamDecoder::default();
    decoder.consume(&SIMPLE_HELLO).unwrap();
    decoder.finish().unwrap();
    assert_eq!(decoder.read(None), b"Hello!\n");
    assert_eq!(decoder.members(), 1);
    assert_eq!(decoder.total_in(), 43);
    assert_eq!(decoder.total_out(), 7);

    let events = decoder.drain_events();
    assert_eq!(events[0], Event::ContainerDetected(Container::Gzip));
    match &events[1] {
      Event::HeaderReady(Header::Gzip(header)) => {
        assert_eq!(header.name.as_deref(), Some("simplehello.txt"))
      }
      other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(events[2], Event::BlockReady { last: true });
    assert_eq!(events[3], Event::DataAvailable);
    assert_eq!(
      events[4],
      Event::ContainerFinished(Trailer::Gzip(GzipTrailer {
        crc32: 0xb042d89e,
        isize: 7
      }))
    );
    assert_eq!(events.len(), 5);
  }

  #[test]
  fn every_split_point() {
    for split in 0..=SIMPLE_HELLO.len() {
      let mut decoder = StreamDecoder::default();
      decoder.consume(&SIMPLE_HELLO[..split]).unwrap();
      decoder.consume(&SIMPLE_HELLO[split..]).unwrap();
      decoder.finish().unwrap();
      assert_eq!(decoder.read(None), b"Hello!\n", "split at {}", split);
    }
  }

  #[test]
  fn raw_deflate() {
    let config = DecoderConfig::default().with_format(Format::Raw);
    let mut decoder = StreamDecoder::new(config);
    decoder
      .consume(&[0xf3, 0x48, 0xcd, 0xc9, 0xc9, 0xe7, 0x2, 0x0])
      .unwrap();
    decoder.finish().unwrap();
    assert_eq!(decoder.read(None), b"Hello\n");
    assert_eq!(decoder.consume(&[0]), Err(StreamError::TrailingData));
    assert!(decoder.is_closed());
  }

  #[test]
  fn corrupt_crc_closes_with_error() {
    let mut data = SIMPLE_HELLO;
    data[35] ^= 0xff;
    let mut decoder = StreamDecoder::default();
    let err = decoder.consume(&data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Checksum);
    assert_eq!(decoder.read(None), b"");
    let events = decoder.drain_events();
    assert_eq!(events.last(), Some(&Event::Closed { error: true }));
    assert!(!events
      .iter()
      .any(|e| matches!(e, Event::ContainerFinished(_))));
    assert_eq!(decoder.consume(&[]), Err(StreamError::Closed));
  }

  #[test]
  fn unchecked_crc_is_accepted() {
    let mut data = SIMPLE_HELLO;
    data[35] ^= 0xff;
    let config = DecoderConfig {
      verify_checksums: false,
      ..DecoderConfig::default()
    };
    let mut decoder = StreamDecoder::new(config);
    decoder.consume(&data).unwrap();
    assert_eq!(decoder.read(None), b"Hello!\n");
  }

  #[test]
  fn truncated_member() {
    let mut decoder = StreamDecoder::default();
    decoder.consume(&SIMPLE_HELLO[..30]).unwrap();
    assert_eq!(
      decoder.finish(),
      Err(StreamError::Truncated(StreamState::Compressed))
    );
    assert!(decoder.is_closed());
  }

  #[test]
  fn close_is_idempotent() {
    let mut decoder = StreamDecoder::default();
    decoder.consume(&SIMPLE_HELLO[..20]).unwrap();
    decoder.close();
    decoder.close();
    let closes = decoder
      .drain_events()
      .into_iter()
      .filter(|e| matches!(e, Event::Closed { .. }))
      .count();
    assert_eq!(closes, 1);
    assert_eq!(decoder.consume(&SIMPLE_HELLO[20..]), Err(StreamError::Closed));
  }

  #[test]
  fn forced_format_rejects_the_other_container() {
    let config = DecoderConfig::default().with_format(Format::Zlib);
    let mut decoder = StreamDecoder::new(config);
    let err = decoder.consume(&SIMPLE_HELLO).unwrap_err();
    assert_eq!(err, StreamError::FormatMismatch(Format::Zlib, 0x1f, 0x8b));
    assert_eq!(err.kind(), ErrorKind::Detection);
  }

  #[test]
  fn read_interest_gates_notifications() {
    let mut decoder = StreamDecoder::default();
    decoder.set_read_interest(false);
    decoder.consume(&SIMPLE_HELLO).unwrap();
    assert!(!decoder
      .drain_events()
      .contains(&Event::DataAvailable));
    decoder.set_read_interest(true);
    assert_eq!(decoder.poll_event(), Some(Event::DataAvailable));
    assert_eq!(decoder.read(Some(3)), b"Hel");
    assert_eq!(decoder.poll_event(), Some(Event::DataAvailable));
    assert_eq!(decoder.read(None), b"lo!\n");
    assert_eq!(decoder.poll_event(), None);
  }
}
