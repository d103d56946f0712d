//! Prefix-Origin Validator client: checks whether an ASN is the
//! legitimate origin for a prefix against recently observed announcements
//! (typically backed by an RPKI validator).

use crate::cache::PrefixOriginCache;
use async_trait::async_trait;
use bgp_common::BgpError;
use bgp_resilience::ResilientClient;
use std::time::Duration;

/// Outcome of an origin check. A validator that is down reports
/// `NotDetermined`, never `Invalid` — unavailability must not be
/// downgraded into a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginValidation {
    Valid,
    Invalid,
    NotDetermined,
}

/// Boundary the RPKI detection rule consults. Kept as a trait so the rule
/// is testable without a live HTTP dependency.
#[async_trait]
pub trait PrefixOriginValidator: Send + Sync {
    /// Checks whether `origin_asn` is authorized to originate `prefix`.
    async fn check(&self, prefix: &str, origin_asn: u32) -> OriginValidation;
}

/// HTTP-backed validator with a memoized result cache and circuit breaker.
pub struct HttpPrefixOriginValidator {
    endpoint: Option<String>,
    http: reqwest::Client,
    resilient: ResilientClient,
    cache: PrefixOriginCache,
}

impl HttpPrefixOriginValidator {
    /// Builds a validator pointed at `endpoint` (if configured).
    pub fn new(
        endpoint: Option<String>,
        failure_threshold: u32,
        recovery: Duration,
        semaphore_permits: usize,
        max_retries: u32,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            endpoint,
            http: reqwest::Client::new(),
            resilient: ResilientClient::new(
                "prefix-origin-validator",
                failure_threshold,
                recovery,
                semaphore_permits,
                max_retries,
                Duration::from_secs(30),
            ),
            cache: PrefixOriginCache::new(cache_ttl),
        }
    }
}

#[async_trait]
impl PrefixOriginValidator for HttpPrefixOriginValidator {
    async fn check(&self, prefix: &str, origin_asn: u32) -> OriginValidation {
        if let Some(valid) = self.cache.get(prefix, origin_asn) {
            return if valid { OriginValidation::Valid } else { OriginValidation::Invalid };
        }

        let Some(endpoint) = self.endpoint.clone() else {
            return OriginValidation::NotDetermined;
        };
        let prefix_owned = prefix.to_string();

        #[derive(serde::Deserialize)]
        struct Response {
            valid: bool,
        }

        let result = self
            .resilient
            .call(|| {
                let endpoint = endpoint.clone();
                let prefix = prefix_owned.clone();
                let http = self.http.clone();
                async move {
                    let resp = http
                        .get(format!("{endpoint}/validate"))
                        .query(&[("prefix", prefix), ("origin_asn", origin_asn.to_string())])
                        .send()
                        .await
                        .map_err(|e| e.to_string())?;
                    resp.json::<Response>().await.map_err(|e| e.to_string())
                }
            })
            .await;

        match result {
            Ok(Response { valid }) => {
                self.cache.insert(prefix, origin_asn, valid);
                if valid {
                    OriginValidation::Valid
                } else {
                    OriginValidation::Invalid
                }
            }
            Err(BgpError::Unavailable(reason)) => {
                tracing::warn!(%reason, prefix, origin_asn, "prefix-origin validator unavailable, treating as not determined");
                OriginValidation::NotDetermined
            }
            Err(_) => OriginValidation::NotDetermined,
        }
    }
}

/// Validator that always reports `NotDetermined`; used when
/// `PREFIX_ORIGIN_ENABLED` is off so the RPKI rule's "pluggable" contract
/// still has something to call.
pub struct DisabledPrefixOriginValidator;

#[async_trait]
impl PrefixOriginValidator for DisabledPrefixOriginValidator {
    async fn check(&self, _prefix: &str, _origin_asn: u32) -> OriginValidation {
        OriginValidation::NotDetermined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_validator_never_determines() {
        let validator = DisabledPrefixOriginValidator;
        assert_eq!(validator.check("10.0.0.0/8", 65000).await, OriginValidation::NotDetermined);
    }
}
