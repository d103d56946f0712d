//! Shared types for the BGP orchestrator and conflict detector.
//!
//! This crate carries the ambient stack every other crate in the workspace
//! depends on: the domain model (`Peering`, `Conflict`, `Anomaly`,
//! `BgpUpdateEvent`), the closed `BgpError` taxonomy, field validators, and
//! process configuration loaded once from the environment at startup.

#![warn(missing_docs)]

pub mod config;
pub mod domain;
pub mod error;
pub mod validators;

pub use config::Config;
pub use domain::*;
pub use error::{BgpError, BgpResult};
