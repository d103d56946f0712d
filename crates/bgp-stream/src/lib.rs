//! Streaming ingestion: the Stream Consumer (real-time conflict checks,
//! durable storage) and the Feature Sink (online/offline feature store).

#![warn(missing_docs)]

pub mod consumer;
pub mod feature;
pub mod source;

pub use consumer::{parse_message, StreamConsumer};
pub use feature::{FeatureRow, FeatureSink};
pub use source::{BgpEventSource, InMemoryEventSource};
