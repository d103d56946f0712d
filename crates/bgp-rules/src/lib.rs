//! Concurrent rule registry and the five conflict-detection rules.
//!
//! Rules are pure, stateless, and run concurrently with per-rule deadlines;
//! a rule that panics or times out is absorbed by the evaluator (fail-open)
//! rather than blocking the other rules or the caller.

pub mod evaluator;
pub mod rules;

pub use evaluator::{Rule, RuleEvaluator};
pub use rules::{
    AsnCollisionRule, PrefixSanityRule, RoutingLoopRule, RpkiValidationRule, SessionOverlapRule,
};
