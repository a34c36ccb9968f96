/*! An incremental gzip (RFC 1952), zlib (RFC 1950) and raw DEFLATE
(RFC 1951) decompressor.

Compressed input is pushed in chunks of any size; decompressed output is
pulled out whenever the caller likes. Nothing blocks and nothing waits for the
whole payload.

```
use decompressor::{DecoderConfig, Event, StreamDecoder};

// gzip of "Hello!\n", stored under the name "simplehello.txt"
let gz = [
  0x1f, 0x8b, 0x08, 0x08, 0xcf, 0x01, 0x69, 0x5f, 0x02, 0x03, 0x73, 0x69, 0x6d, 0x70, 0x6c,
  0x65, 0x68, 0x65, 0x6c, 0x6c, 0x6f, 0x2e, 0x74, 0x78, 0x74, 0x00, 0xf3, 0x48, 0xcd, 0xc9,
  0xc9, 0x57, 0xe4, 0x02, 0x00, 0x9e, 0xd8, 0x42, 0xb0, 0x07, 0x00, 0x00, 0x00,
];
let mut decoder = StreamDecoder::new(DecoderConfig::default());
for chunk in gz.chunks(5) {
  decoder.consume(chunk)?;
}
decoder.finish()?;
assert_eq!(decoder.read(None), b"Hello!\n");
assert!(decoder.drain_events().contains(&Event::DataAvailable));
# Ok::<(), decompressor::StreamError>(())
```
*/

pub mod bits;
pub mod deflate;
pub mod gzip;
pub mod huff_tree;
pub mod stream;
pub mod window;
pub mod zlib;

pub use stream::{
  Container, DecoderConfig, ErrorKind, Event, EventSink, FnSink, Format, Header, NullSink,
  StreamDecoder, StreamError, StreamState, Trailer,
};
