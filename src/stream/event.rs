/*! Notifications from the decoder to whoever is driving it.

Events are pushed into an `EventSink` owned by the decoder. A queue is the
default; a channel or a closure works as well.
*/

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::mpsc::{Sender, SyncSender};

use crate::gzip::{GzipHeader, GzipTrailer};
use crate::zlib::{ZlibHeader, ZlibTrailer};

/// The wrapper around the DEFLATE data of a member.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Container {
  /// Between members, or nothing detected yet.
  None,
  Gzip,
  Zlib,
  /// Headerless DEFLATE.
  Raw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Header {
  Gzip(GzipHeader),
  Zlib(ZlibHeader),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Trailer {
  Gzip(GzipTrailer),
  Zlib(ZlibTrailer),
  /// Raw DEFLATE has no trailer.
  Raw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Event {
  ContainerDetected(Container),
  HeaderReady(Header),
  BlockReady { last: bool },
  ContainerFinished(Trailer),
  /// Unread output is waiting. Raised again while it stays unread.
  DataAvailable,
  Closed { error: bool },
}

pub trait EventSink {
  fn emit(&mut self, event: Event);
}

impl EventSink for VecDeque<Event> {
  fn emit(&mut self, event: Event) {
    self.push_back(event);
  }
}

impl EventSink for Vec<Event> {
  fn emit(&mut self, event: Event) {
    self.push(event);
  }
}

/// Events sent after the receiver hangs up are dropped.
impl EventSink for Sender<Event> {
  fn emit(&mut self, event: Event) {
    let _ = self.send(event);
  }
}

impl EventSink for SyncSender<Event> {
  fn emit(&mut self, event: Event) {
    let _ = self.send(event);
  }
}

/// Hand every event to a closure.
pub struct FnSink<F>(pub F);

impl<F: FnMut(Event)> EventSink for FnSink<F> {
  fn emit(&mut self, event: Event) {
    (self.0)(event)
  }
}

/// Drop every event.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullSink;

impl EventSink for NullSink {
  fn emit(&mut self, _event: Event) {}
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::mpsc::channel;

  #[test]
  fn sinks_deliver_in_order() {
    let mut queue = VecDeque::new();
    queue.emit(Event::DataAvailable);
    queue.emit(Event::Closed { error: false });
    assert_eq!(queue.pop_front(), Some(Event::DataAvailable));

    let (mut tx, rx) = channel();
    tx.emit(Event::BlockReady { last: true });
    assert_eq!(rx.recv().unwrap(), Event::BlockReady { last: true });
    drop(rx);
    tx.emit(Event::DataAvailable);

    let mut seen = 0;
    let mut sink = FnSink(|_: Event| seen += 1);
    sink.emit(Event::DataAvailable);
    sink.emit(Event::DataAvailable);
    drop(sink);
    assert_eq!(seen, 2);
  }

  #[test]
  fn events_serialize() {
    let json = serde_json::to_string(&Event::ContainerDetected(Container::Gzip)).unwrap();
    assert_eq!(json, r#"{"ContainerDetected":"Gzip"}"#);
  }
}
