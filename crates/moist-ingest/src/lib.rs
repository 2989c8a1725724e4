//! moist-ingest: the single ingestion path plus the collaborator fan-out
//!
//! One [`Ingestor`] composes decode and record behind the registry's
//! explicit read-write lock, then hands the already-recorded packet to a
//! queue feeding zero or more [`PacketSink`] collaborators. Sinks may block
//! on network I/O and retry; the queue keeps any of that from ever stalling
//! the next `ingest` call from the serial source.

mod sink;
pub use sink::{JsonLogSink, PacketSink, RetryPolicy, SinkError};

mod fanout;
pub use fanout::FanOut;

mod pipeline;
pub use pipeline::{Ingestor, SharedRegistry};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::MockSink;
