//! Transforms detected conflicts and anomalies into typed alerts and
//! fans them out to independent on-call and chat channels, with dedup
//! and auto-acknowledge on remediation.

#![warn(missing_docs)]

pub mod channels;
pub mod dispatcher;

pub use channels::{HttpOnCallChannel, WebhookChatChannel};
pub use dispatcher::{Alert, ChatChannel, Incident, IncidentDispatcher, IncidentStatus, OnCallChannel, TimelineEntry};
