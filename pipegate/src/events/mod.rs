//! Observability events emitted during a run.
//!
//! Sinks are injected through the run context; there is no global sink, so
//! independent concurrent runs never share observability state.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
