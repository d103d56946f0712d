//! Process entrypoint: loads configuration, assembles the shared context,
//! starts the HTTP API and background tasks, and waits for `ctrl_c` to
//! drive a cooperative shutdown.

use bgp_anomaly::AnomalyDetector;
use bgp_api::AppState;
use bgp_catalog::{AuditLogTable, InMemoryPeeringStore};
use bgp_clients::{DisabledPrefixOriginValidator, HttpPrefixOriginValidator, PrefixOriginValidator};
use bgp_common::Config;
use bgp_incident::{HttpOnCallChannel, IncidentDispatcher, WebhookChatChannel};
use bgp_rules::{AsnCollisionRule, PrefixSanityRule, RoutingLoopRule, RpkiValidationRule, RuleEvaluator, SessionOverlapRule};
use bgp_stream::{FeatureSink, InMemoryEventSource, StreamConsumer};
use std::sync::Arc;
use tokio::sync::watch;

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_evaluator(config: &Config, prefix_origin: Arc<dyn PrefixOriginValidator>) -> Arc<RuleEvaluator> {
    let evaluator = Arc::new(RuleEvaluator::new(config.rule_timeout));
    evaluator.register(Arc::new(AsnCollisionRule));
    evaluator.register(Arc::new(SessionOverlapRule));
    evaluator.register(Arc::new(RoutingLoopRule));
    evaluator.register(Arc::new(PrefixSanityRule));
    evaluator.register(Arc::new(RpkiValidationRule::new(prefix_origin)));
    evaluator
}

fn build_incident_dispatcher(config: &Config) -> Arc<IncidentDispatcher> {
    let on_call = if config.oncall_enabled {
        match (&config.oncall_url, &config.oncall_token) {
            (Some(url), Some(token)) => Some(Arc::new(HttpOnCallChannel::new(url.clone(), token.clone())) as Arc<_>),
            _ => {
                tracing::warn!("ONCALL_ENABLED is set but ONCALL_URL/ONCALL_TOKEN are missing; on-call channel disabled");
                None
            }
        }
    } else {
        None
    };

    let chat = config.chat_webhook_url.clone().map(|url| Arc::new(WebhookChatChannel::new(url)) as Arc<_>);

    Arc::new(IncidentDispatcher::new(on_call, chat))
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config.log_level);

    tracing::info!(api_host = %config.api_host, api_port = config.api_port, "starting bgp-orchestratord");

    let prefix_origin: Arc<dyn PrefixOriginValidator> = if config.prefix_origin_enabled {
        Arc::new(HttpPrefixOriginValidator::new(
            config.analyzer_endpoint.clone(),
            config.cb_failure_threshold,
            config.cb_recovery,
            config.cb_semaphore_permits,
            config.cb_max_retries,
            config.prefix_origin_cache_ttl,
        ))
    } else {
        Arc::new(DisabledPrefixOriginValidator)
    };

    let evaluator = build_evaluator(&config, prefix_origin);
    let audit = Arc::new(AuditLogTable::new(config.audit_hmac_key.clone().into_bytes()));
    let catalog = Arc::new(InMemoryPeeringStore::new(evaluator.clone(), audit));
    let catalog_dyn: Arc<dyn bgp_catalog::Storage> = catalog;

    let anomalies = Arc::new(AnomalyDetector::new(3.0, bgp_anomaly::SeasonalityMode::Additive));
    let dispatcher = build_incident_dispatcher(&config);
    let feature_sink = Arc::new(FeatureSink::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer = Arc::new(StreamConsumer::new(
        catalog_dyn.clone(),
        evaluator.clone(),
        dispatcher.clone(),
        feature_sink.clone(),
    ));

    // No broker-backed BgpEventSource is implemented yet (see DESIGN.md).
    // Starting the consumer against an in-memory source nothing ever feeds
    // means C5 runs with zero live throughput; log that plainly against the
    // broker settings an operator actually configured, rather than staying
    // silent about the gap.
    if let Some(bootstrap) = &config.broker_bootstrap {
        tracing::warn!(
            broker_bootstrap = %bootstrap,
            broker_topics = ?config.broker_topics,
            broker_group_id = %config.broker_group_id,
            "BROKER_BOOTSTRAP is configured but no broker-backed BgpEventSource is implemented; \
             the stream consumer is starting with an unfed in-memory source and will process no live events"
        );
    } else {
        tracing::info!("BROKER_BOOTSTRAP not set; stream consumer starting with no live event source");
    }
    let (event_source, _event_sender) = InMemoryEventSource::channel(1024);
    let stream_handle = {
        let consumer = consumer.clone();
        let shard_count = config.stream_shard_count;
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { consumer.run(event_source, shard_count, shutdown_rx).await })
    };

    let materializer_handle = {
        let feature_sink = feature_sink.clone();
        let interval = config.materialize_interval;
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let moved = feature_sink.materialize(chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::minutes(5)));
                        tracing::debug!(moved, "feature materializer ran");
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    };

    let state = Arc::new(AppState { catalog: catalog_dyn, anomalies });
    let app = bgp_api::router(state);
    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("bind API listener");
    tracing::info!(%addr, "API listening");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("API server failed");
    });

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl_c");
    tracing::info!("shutdown signal received, draining background tasks");
    let _ = shutdown_tx.send(true);

    server_handle.abort();
    let _ = stream_handle.await;
    let _ = materializer_handle.await;

    tracing::info!("bgp-orchestratord shut down cleanly");
}
