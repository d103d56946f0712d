//! Thin HTTP boundary over the peering catalog and anomaly query path.
//! Every handler maps domain errors onto the shared [`error::ApiError`]
//! status/body contract; routing and wiring live in [`handlers`].

#![warn(missing_docs)]

pub mod error;
pub mod handlers;

pub use error::ApiError;
pub use handlers::{router, AppState};
