//! Latency gauge store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use netlag_core::{LatencyMeasurement, SeriesKey};

/// Receives latency measurements from monitor tasks.
#[async_trait]
pub trait LatencySink: Send + Sync {
    /// Record a measurement. Idempotent per series; last write wins.
    async fn publish(&self, measurement: &LatencyMeasurement);

    /// Drop every series towards `to_address`. Called once the peer is
    /// no longer monitored.
    async fn forget(&self, _to_address: &str) {}
}

/// In-memory gauges rendered on scrape.
#[derive(Clone, Default)]
pub struct LatencyGauges {
    series: Arc<RwLock<BTreeMap<SeriesKey, LatencyMeasurement>>>,
}

impl LatencyGauges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of every series, ordered by key.
    pub async fn samples(&self) -> Vec<LatencyMeasurement> {
        self.series.read().await.values().cloned().collect()
    }

    /// Latest value for one destination address, if any.
    pub async fn latest_for(&self, to_address: &str) -> Option<LatencyMeasurement> {
        self.series
            .read()
            .await
            .values()
            .find(|m| m.to_address == to_address)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.series.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.series.read().await.is_empty()
    }
}

#[async_trait]
impl LatencySink for LatencyGauges {
    async fn publish(&self, measurement: &LatencyMeasurement) {
        let key = measurement.series_key();
        self.series.write().await.insert(key, measurement.clone());
        debug!(to_ip = %measurement.to_address, "latency gauges updated");
    }

    async fn forget(&self, to_address: &str) {
        let mut series = self.series.write().await;
        let before = series.len();
        series.retain(|key, _| key.to_address != to_address);
        if series.len() != before {
            debug!(to_ip = %to_address, "latency gauges removed");
        }
    }
}
