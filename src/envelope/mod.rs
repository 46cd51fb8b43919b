//! Canonical envelope model and wire codec
//!
//! Wraps each parsed upstream frame into the record published to the bus,
//! and derives the stream name a frame belongs to.

mod clock;
mod codec;
mod types;

pub use clock::MonotonicClock;
pub use codec::derive_stream;
pub use types::{Envelope, EnvelopeError, TraceInjector, ENVELOPE_SOURCE, ENVELOPE_VERSION};
