//! The event stream: event variants, stream traits and the look-ahead queue.
//!
//! Consumers pull [Event]s one at a time with [`GisInputStream::read`];
//! `Ok(None)` signals end of stream. Output streams mirror this with
//! [`GisOutputStream::write`] called in the order events should appear.
//!
//! ```md
//! bytes ----> format reader ----> Event Event Event ... ----> consumer
//!                                  read() read() read()
//! ```

use crate::error::Result;
use crate::feature::{
    AtomHeader, ContainerEnd, ContainerStart, Element, Feature, NetworkLinkControl, Row, Schema,
    Style, StyleMap,
};
use std::collections::VecDeque;

/// Source document format, carried by [`Event::DocumentStart`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DocumentFormat {
    Kml,
    Shapefile,
    Csv,
    Atom,
    Gdb,
}

#[derive(Clone, PartialEq, Debug)]
pub struct DocumentStart {
    pub format: DocumentFormat,
}

/// A single object of the unified sequential model, in document order.
#[derive(Clone, PartialEq, Debug)]
pub enum Event {
    DocumentStart(DocumentStart),
    ContainerStart(ContainerStart),
    ContainerEnd(ContainerEnd),
    Feature(Box<Feature>),
    Row(Row),
    Schema(Schema),
    Style(Style),
    StyleMap(StyleMap),
    AtomHeader(AtomHeader),
    /// Foreign-namespace XML encountered at document level.
    Element(Element),
    NetworkLinkControl(NetworkLinkControl),
    Comment(String),
}

/// Pull side of the stream.
///
/// Implementations are single-threaded and cooperative: each `read()`
/// advances the underlying byte source just far enough to produce one
/// event. A stream instance is not safe for concurrent use.
pub trait GisInputStream {
    /// Returns the next event, or `None` at end of stream. After a fatal
    /// error the stream state is unspecified and it must be closed.
    fn read(&mut self) -> Result<Option<Event>>;

    /// Inserts an event to be returned by the next `read()`.
    fn pushback(&mut self, event: Event);

    /// Releases the underlying resources. Idempotent; `read()` after
    /// `close()` fails with `StreamClosed`.
    fn close(&mut self);

    /// The schemas surfaced so far, in emission order.
    fn schemas(&self) -> &[Schema];
}

/// Push side of the stream.
pub trait GisOutputStream {
    /// Serializes one event. Events must arrive in the order they should
    /// appear in the output document.
    fn write(&mut self, event: &Event) -> Result<()>;

    /// Flushes and balances any open scopes. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Buffered deque of look-ahead events.
///
/// Parsers append events they have already produced but must emit in a
/// different order: [`push_front`](EventQueue::push_front) schedules an
/// event before everything buffered (a Style found inside a Placemark is
/// emitted before the Placemark), [`push_back`](EventQueue::push_back)
/// after. Every `read()` drains this queue before touching the byte
/// source.
#[derive(Debug, Default)]
pub struct EventQueue {
    saved: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue::default()
    }

    pub fn push_front(&mut self, event: Event) {
        self.saved.push_front(event);
    }

    pub fn push_back(&mut self, event: Event) {
        self.saved.push_back(event);
    }

    pub fn has_saved(&self) -> bool {
        !self.saved.is_empty()
    }

    pub fn read_saved(&mut self) -> Option<Event> {
        self.saved.pop_front()
    }

    pub fn clear(&mut self) {
        self.saved.clear();
    }
}
