//! External service clients: config analyzer, live state poller, and
//! prefix-origin validator. Every call is wrapped in a circuit breaker,
//! bounded semaphore, and retry-with-backoff via `bgp-resilience`.

pub mod cache;
pub mod config_analyzer;
pub mod live_state;
pub mod prefix_origin;

pub use cache::PrefixOriginCache;
pub use config_analyzer::{AnalyzerFindings, ConfigAnalyzerClient};
pub use live_state::{LiveSessionRecord, LiveStatePollerClient};
pub use prefix_origin::{DisabledPrefixOriginValidator, HttpPrefixOriginValidator, OriginValidation, PrefixOriginValidator};
