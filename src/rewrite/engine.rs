// Storage engine passes - legacy cache eviction counter and engine info

use async_trait::async_trait;

use super::{RewriteInput, RewritePass};
use crate::client::DatabaseClient;
use crate::flatten::coerce::coerce;
use crate::sample::{Labels, MetricKind, MetricSample};

const EVICTED_PATH: [&str; 3] = ["wiredTiger", "cache", "modified pages evicted"];

/// Republishes the nested eviction counter under its historical flat name.
pub struct CacheEvicted;

#[async_trait]
impl RewritePass for CacheEvicted {
    fn name(&self) -> &'static str {
        "cache_evicted"
    }

    async fn rewrite(
        &self,
        input: &RewriteInput<'_>,
        _client: &dyn DatabaseClient,
        labels: &Labels,
    ) -> Vec<MetricSample> {
        let Some(value) = input
            .server_status
            .and_then(|ss| ss.walk(&EVICTED_PATH))
            .and_then(coerce)
        else {
            return Vec::new();
        };

        vec![MetricSample::new(
            "mongodb_mongod_wiredtiger_cache_evicted_total",
            MetricKind::Untyped,
            labels.clone(),
            value,
        )
        .with_help("serverStatus.wiredTiger.cache.modified pages evicted")]
    }
}

/// Exposes the active storage engine as an info-style gauge.
pub struct StorageEngine;

#[async_trait]
impl RewritePass for StorageEngine {
    fn name(&self) -> &'static str {
        "storage_engine"
    }

    async fn rewrite(
        &self,
        input: &RewriteInput<'_>,
        _client: &dyn DatabaseClient,
        labels: &Labels,
    ) -> Vec<MetricSample> {
        let Some(engine) = input
            .server_status
            .and_then(|ss| ss.get_document("storageEngine"))
            .and_then(|se| se.get_str("name"))
        else {
            return Vec::new();
        };

        let mut labels = labels.clone();
        labels.insert("engine".to_string(), engine.to_string());
        vec![
            MetricSample::new("mongodb_mongod_storage_engine", MetricKind::Gauge, labels, 1.0)
                .with_help("serverStatus.storageEngine.name"),
        ]
    }
}
