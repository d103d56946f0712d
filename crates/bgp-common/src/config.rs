//! Process-wide configuration, loaded once from the environment at
//! startup and threaded through a context struct rather than read back
//! from globals at each call site.

use std::env;
use std::time::Duration;

/// Timing knobs and external-service toggles for the orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-rule deadline for the conflict evaluator. `RULE_TIMEOUT_SECONDS`, default 5.
    pub rule_timeout: Duration,
    /// Consecutive failures before a circuit breaker opens. `CB_FAILURE_THRESHOLD`, default 5.
    pub cb_failure_threshold: u32,
    /// Cooldown before a half-open probe is admitted. `CB_RECOVERY_SECONDS`, default 60.
    pub cb_recovery: Duration,
    /// Max retry attempts for a transient external-client failure. Default 3.
    pub cb_max_retries: u32,
    /// Bounded connection semaphore per external client. Default 8.
    pub cb_semaphore_permits: usize,
    /// How often the feature materializer copies offline rows to the online store. `MATERIALIZE_INTERVAL_MIN`, default 5.
    pub materialize_interval: Duration,
    /// TTL for the prefix-origin validator's memoized result cache. Default 300s.
    pub prefix_origin_cache_ttl: Duration,

    /// `BROKER_BOOTSTRAP` — event bus connection string for the stream consumer.
    pub broker_bootstrap: Option<String>,
    /// `BROKER_TOPICS` — comma-separated topic list.
    pub broker_topics: Vec<String>,
    /// `BROKER_GROUP_ID` — logical consumer group identity.
    pub broker_group_id: String,

    /// `ANALYZER_ENDPOINT` — config analyzer base URL.
    pub analyzer_endpoint: Option<String>,
    /// `LIVE_STATE_ENDPOINT` — live state poller base URL.
    pub live_state_endpoint: Option<String>,
    /// `PREFIX_ORIGIN_ENABLED` — whether to consult the prefix-origin validator.
    pub prefix_origin_enabled: bool,

    /// `FEATURE_STORE_ENABLED`
    pub feature_store_enabled: bool,

    /// `ONCALL_ENABLED`
    pub oncall_enabled: bool,
    /// `ONCALL_URL`
    pub oncall_url: Option<String>,
    /// `ONCALL_TOKEN`
    pub oncall_token: Option<String>,
    /// `CHAT_WEBHOOK_URL`
    pub chat_webhook_url: Option<String>,

    /// `LOG_LEVEL` — passed straight through to `tracing_subscriber::EnvFilter`.
    pub log_level: String,

    /// `API_HOST`
    pub api_host: String,
    /// `API_PORT`
    pub api_port: u16,

    /// `AUDIT_HMAC_KEY` — signing key for audit log rows. Falls back to an
    /// insecure development default so the service still boots without it;
    /// production deployments must set this explicitly.
    pub audit_hmac_key: String,
    /// `STREAM_SHARD_COUNT` — number of ordered per-peer worker shards.
    pub stream_shard_count: usize,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from the process environment, applying the
    /// documented defaults for every knob that is not essential at startup.
    pub fn from_env() -> Self {
        Self {
            rule_timeout: Duration::from_secs(env_u64("RULE_TIMEOUT_SECONDS", 5)),
            cb_failure_threshold: env_u32("CB_FAILURE_THRESHOLD", 5),
            cb_recovery: Duration::from_secs(env_u64("CB_RECOVERY_SECONDS", 60)),
            cb_max_retries: env_u32("CB_MAX_RETRIES", 3),
            cb_semaphore_permits: env_u32("CB_SEMAPHORE_PERMITS", 8) as usize,
            materialize_interval: Duration::from_secs(env_u64("MATERIALIZE_INTERVAL_MIN", 5) * 60),
            prefix_origin_cache_ttl: Duration::from_secs(env_u64("PREFIX_ORIGIN_CACHE_TTL_SECONDS", 300)),

            broker_bootstrap: env_opt_string("BROKER_BOOTSTRAP"),
            broker_topics: env_opt_string("BROKER_TOPICS")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            broker_group_id: env_string("BROKER_GROUP_ID", "bgp-orchestrator-consumer"),

            analyzer_endpoint: env_opt_string("ANALYZER_ENDPOINT"),
            live_state_endpoint: env_opt_string("LIVE_STATE_ENDPOINT"),
            prefix_origin_enabled: env_bool("PREFIX_ORIGIN_ENABLED", false),

            feature_store_enabled: env_bool("FEATURE_STORE_ENABLED", true),

            oncall_enabled: env_bool("ONCALL_ENABLED", false),
            oncall_url: env_opt_string("ONCALL_URL"),
            oncall_token: env_opt_string("ONCALL_TOKEN"),
            chat_webhook_url: env_opt_string("CHAT_WEBHOOK_URL"),

            log_level: env_string("LOG_LEVEL", "info"),

            api_host: env_string("API_HOST", "0.0.0.0"),
            api_port: env_u32("API_PORT", 8000) as u16,

            audit_hmac_key: env_string("AUDIT_HMAC_KEY", "dev-only-insecure-audit-key"),
            stream_shard_count: env_u32("STREAM_SHARD_COUNT", 8) as usize,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_timing_knobs() {
        // SAFETY(test): no other test in this process mutates these keys concurrently.
        for key in ["RULE_TIMEOUT_SECONDS", "CB_FAILURE_THRESHOLD", "CB_RECOVERY_SECONDS", "MATERIALIZE_INTERVAL_MIN"] {
            env::remove_var(key);
        }
        let cfg = Config::from_env();
        assert_eq!(cfg.rule_timeout, Duration::from_secs(5));
        assert_eq!(cfg.cb_failure_threshold, 5);
        assert_eq!(cfg.cb_recovery, Duration::from_secs(60));
        assert_eq!(cfg.materialize_interval, Duration::from_secs(300));
    }
}
