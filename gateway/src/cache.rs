use crate::snapshot::RoutingSnapshot;
use crate::source::RegistrySource;
use chrono::Utc;
use delayline_common::{BrokerError, Result};
use metrics::counter;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A resource family whose fetch failed during a refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFetch {
    pub family: &'static str,
    pub error: String,
}

/// Outcome of one published refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub generation: u64,
    /// Families that kept their previous data
    pub failed: Vec<FailedFetch>,
    /// Regex rules that failed to compile and will never match
    pub invalid_rules: Vec<String>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-node cache of routing data.
///
/// Readers take an `Arc` to the current snapshot and keep using it for the
/// whole decision. Refreshers build the next snapshot off to the side and
/// swap the pointer; the write lock is held only for the swap.
pub struct SnapshotCache {
    source: Arc<dyn RegistrySource>,
    current: RwLock<Arc<RoutingSnapshot>>,
    refresh_lock: Mutex<()>,
}

impl SnapshotCache {
    pub fn new(source: Arc<dyn RegistrySource>) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(RoutingSnapshot::empty())),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.current.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Fetch storages, pushers and rules concurrently and publish a new
    /// snapshot.
    ///
    /// A family whose fetch fails keeps its previous data. If every fetch
    /// fails nothing is published. Cancellation leaves the current snapshot
    /// untouched.
    pub async fn refresh_all(&self, token: &CancellationToken) -> Result<RefreshReport> {
        let _guard = self.refresh_lock.lock().await;

        let fetch = async {
            tokio::join!(
                self.source.list_storages(),
                self.source.list_pushers(),
                self.source.list_routing_rules(),
            )
        };

        let (storages, pushers, rules) = tokio::select! {
            _ = token.cancelled() => {
                debug!("Routing snapshot refresh cancelled");
                return Err(BrokerError::unavailable("refresh cancelled"));
            }
            fetched = fetch => fetched,
        };

        let previous = self.snapshot();
        let mut failed = Vec::new();
        let mut last_error = None;

        let storages = match storages {
            Ok(storages) => Arc::new(storages),
            Err(e) => {
                record_failure(&mut failed, "storages", &e);
                last_error = Some(e);
                previous.storages.clone()
            }
        };

        let pushers = match pushers {
            Ok(pushers) => Arc::new(pushers),
            Err(e) => {
                record_failure(&mut failed, "pushers", &e);
                last_error = Some(e);
                previous.pushers.clone()
            }
        };

        let rules = match rules {
            Ok(rules) => Arc::new(RoutingSnapshot::compile_rules(rules)),
            Err(e) => {
                record_failure(&mut failed, "routing_rules", &e);
                last_error = Some(e);
                previous.rules.clone()
            }
        };

        if failed.len() == 3 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let next = RoutingSnapshot {
            generation: previous.generation + 1,
            refreshed_at: Some(Utc::now()),
            storages,
            pushers,
            rules,
        };

        let report = RefreshReport {
            generation: next.generation,
            failed,
            invalid_rules: next.invalid_rule_ids(),
        };

        debug!(
            "Publishing routing snapshot: generation={}, storages={}, pushers={}, rules={}",
            next.generation,
            next.storages.len(),
            next.pushers.len(),
            next.rules.len()
        );
        *self.current.write() = Arc::new(next);
        counter!("gateway.refresh.completed").increment(1);

        Ok(report)
    }

    /// Refresh every `period` until cancelled
    pub fn spawn_refresh_loop(
        self: &Arc<Self>,
        period: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            info!("Starting routing snapshot refresh loop: period={:?}", period);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }

                match cache.refresh_all(&token).await {
                    Ok(report) if !report.is_complete() => {
                        warn!(
                            "Routing snapshot generation {} is partially stale: {:?}",
                            report.generation, report.failed
                        );
                    }
                    Ok(_) => {}
                    Err(e) if token.is_cancelled() => {
                        debug!("Refresh stopped: {}", e);
                    }
                    Err(e) => {
                        warn!("Routing snapshot refresh failed, keeping previous snapshot: {}", e);
                    }
                }
            }

            info!("Routing snapshot refresh loop stopped");
        })
    }
}

fn record_failure(failed: &mut Vec<FailedFetch>, family: &'static str, error: &BrokerError) {
    warn!("Failed to refresh {}, keeping previous data: {}", family, error);
    counter!("gateway.refresh.failures", "family" => family).increment(1);
    failed.push(FailedFetch {
        family,
        error: error.to_string(),
    });
}
