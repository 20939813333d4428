use crate::cache::{RefreshReport, SnapshotCache};
use crate::config::GatewayConfig;
use crate::dispatch::{subject_for, Transport};
use crate::router::{RouteDecision, Router};
use crate::snapshot::RoutingSnapshot;
use crate::source::RegistrySource;
use chrono::{DateTime, Utc};
use delayline_common::{BrokerError, Message, Result};
use metrics::counter;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Everything a gateway needs from its host process, passed in explicitly
#[derive(Clone)]
pub struct GatewayContext {
    pub config: GatewayConfig,
    pub registry: Arc<dyn RegistrySource>,
    pub transport: Arc<dyn Transport>,
}

impl GatewayContext {
    pub fn new(
        config: GatewayConfig,
        registry: Arc<dyn RegistrySource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            registry,
            transport,
        }
    }
}

/// Ingestion node: accepts messages and hands each one to a delay tier or
/// a pusher
pub struct Gateway {
    context: GatewayContext,
    cache: Arc<SnapshotCache>,
    router: Router,
}

impl Gateway {
    pub fn new(context: GatewayContext) -> Result<Self> {
        context.config.validate()?;

        let cache = Arc::new(SnapshotCache::new(context.registry.clone()));
        let router = Router::new(context.config.immediate_dispatch_threshold);

        Ok(Self {
            context,
            cache,
            router,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.context.config
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.cache.snapshot()
    }

    pub async fn refresh(&self, token: &CancellationToken) -> Result<RefreshReport> {
        self.cache.refresh_all(token).await
    }

    /// Route and publish one message. A dropped message is `Ok`; only
    /// transport failures are errors.
    pub async fn consume(&self, message: &Message) -> Result<RouteDecision> {
        self.consume_at(message, Utc::now()).await
    }

    #[instrument(skip(self, message), fields(message_id = %message.id, routing_key = %message.routing_key))]
    pub async fn consume_at(&self, message: &Message, now: DateTime<Utc>) -> Result<RouteDecision> {
        // One snapshot for the whole decision
        let snapshot = self.cache.snapshot();
        let decision = self.router.decide(&snapshot, message, now);

        let Some(subject) = subject_for(&decision) else {
            warn!(
                "Dropping message: no storage tier or routing rule matched (generation {})",
                snapshot.generation
            );
            counter!("gateway.messages.dropped").increment(1);
            return Ok(decision);
        };

        let payload = serde_json::to_vec(message)?;
        let timeout = self.context.config.dispatch_timeout;

        let published =
            tokio::time::timeout(timeout, self.context.transport.publish(&subject, payload)).await;
        match published {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(BrokerError::Transport {
                    subject,
                    message: format!("publish timed out after {:?}", timeout),
                })
            }
        }

        debug!("Dispatched to {}", subject);
        counter!("gateway.messages.routed", "target" => decision.kind()).increment(1);
        Ok(decision)
    }

    /// Load the first snapshot, register this gateway and spawn the refresh
    /// and heartbeat loops. Both loops stop when `token` is cancelled.
    pub async fn start(self: &Arc<Self>, token: CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        let config = &self.context.config;
        info!("Starting gateway: id={}, address={}", config.gateway_id, config.address);

        let report = self.cache.refresh_all(&token).await?;
        if !report.is_complete() {
            warn!("Initial routing snapshot is incomplete: {:?}", report.failed);
        }

        match self
            .context
            .registry
            .register_gateway(&config.gateway_id, &config.address)
            .await
        {
            Ok(()) => info!("Registered gateway '{}'", config.gateway_id),
            Err(e) if e.is_already_exists() => {
                info!("Gateway '{}' already registered, resuming heartbeats", config.gateway_id)
            }
            Err(e) => return Err(e),
        }

        let refresh = self
            .cache
            .spawn_refresh_loop(config.refresh_period, token.clone());
        let heartbeat = self.spawn_heartbeat_loop(token);

        Ok(vec![refresh, heartbeat])
    }

    fn spawn_heartbeat_loop(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let gateway = self.clone();
        tokio::spawn(async move {
            let config = &gateway.context.config;
            let registry = &gateway.context.registry;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(config.heartbeat_period) => {}
                }

                match registry.heartbeat_gateway(&config.gateway_id).await {
                    Ok(()) => tracing::trace!("Heartbeat sent: gateway_id={}", config.gateway_id),
                    Err(e) if e.is_not_found() => {
                        warn!("Gateway '{}' missing from registry, re-registering", config.gateway_id);
                        if let Err(e) = registry
                            .register_gateway(&config.gateway_id, &config.address)
                            .await
                        {
                            warn!("Failed to re-register gateway: {}", e);
                        }
                    }
                    Err(e) => warn!("Heartbeat failed: {}", e),
                }
            }

            info!("Gateway heartbeat loop stopped");
        })
    }
}
