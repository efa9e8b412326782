// Router statistics - sharding metadata only visible through a mongos
//
// Each metric comes from one query against the `config` database. A failing
// query drops only its own metric.

use async_trait::async_trait;
use bson::{doc, Document as BsonDocument};
use tracing::warn;

use super::{RewriteContext, RewriteInput, RewritePass};
use crate::client::DatabaseClient;
use crate::document::{Document, Value};
use crate::sample::{Labels, MetricKind, MetricSample};
use crate::topology::NodeRole;

const CONFIG_DB: &str = "config";

struct CountQuery {
    name: &'static str,
    collection: &'static str,
    filter: fn() -> BsonDocument,
    label: Option<(&'static str, &'static str)>,
}

fn everything() -> BsonDocument {
    doc! {}
}

fn draining() -> BsonDocument {
    doc! { "draining": true }
}

fn partitioned() -> BsonDocument {
    doc! { "partitioned": true }
}

fn unpartitioned() -> BsonDocument {
    doc! { "partitioned": { "$ne": true } }
}

const COUNTS: [CountQuery; 5] = [
    CountQuery {
        name: "mongodb_mongos_sharding_shards_total",
        collection: "shards",
        filter: everything,
        label: None,
    },
    CountQuery {
        name: "mongodb_mongos_sharding_shards_draining_total",
        collection: "shards",
        filter: draining,
        label: None,
    },
    CountQuery {
        name: "mongodb_mongos_sharding_databases_total",
        collection: "databases",
        filter: partitioned,
        label: Some(("type", "partitioned")),
    },
    CountQuery {
        name: "mongodb_mongos_sharding_databases_total",
        collection: "databases",
        filter: unpartitioned,
        label: Some(("type", "unpartitioned")),
    },
    CountQuery {
        name: "mongodb_mongos_sharding_chunks_total",
        collection: "chunks",
        filter: everything,
        label: None,
    },
];

pub struct RouterStats;

impl RouterStats {
    async fn balancer_enabled(client: &dyn DatabaseClient, labels: &Labels) -> Option<MetricSample> {
        let settings = match client
            .find_one(CONFIG_DB, "settings", doc! { "_id": "balancer" })
            .await
        {
            Ok(settings) => settings.map(Document::from),
            Err(e) => {
                warn!("Cannot read balancer settings: {}", e);
                return None;
            }
        };

        let stopped = matches!(
            settings.as_ref().and_then(|s| s.get("stopped")),
            Some(Value::Bool(true))
        );
        let value = if stopped { 0.0 } else { 1.0 };

        Some(
            MetricSample::new(
                "mongodb_mongos_sharding_balancer_enabled",
                MetricKind::Gauge,
                labels.clone(),
                value,
            )
            .with_help("config.settings.balancer.stopped"),
        )
    }
}

#[async_trait]
impl RewritePass for RouterStats {
    fn name(&self) -> &'static str {
        "router_stats"
    }

    fn requires_role(&self) -> bool {
        true
    }

    fn applies(&self, ctx: &RewriteContext) -> bool {
        ctx.mode.is_compatible() && ctx.role == Some(NodeRole::Router)
    }

    async fn rewrite(
        &self,
        _input: &RewriteInput<'_>,
        client: &dyn DatabaseClient,
        labels: &Labels,
    ) -> Vec<MetricSample> {
        let mut out = Vec::new();

        for query in &COUNTS {
            match client
                .count_documents(CONFIG_DB, query.collection, (query.filter)())
                .await
            {
                Ok(n) => {
                    let mut labels = labels.clone();
                    if let Some((k, v)) = query.label {
                        labels.insert(k.to_string(), v.to_string());
                    }
                    out.push(
                        MetricSample::new(query.name, MetricKind::Gauge, labels, n as f64)
                            .with_help(format!("{}.{}", CONFIG_DB, query.collection)),
                    );
                }
                Err(e) => {
                    warn!("Cannot compute {}: {}", query.name, e);
                }
            }
        }

        out.extend(RouterStats::balancer_enabled(client, labels).await);
        out
    }
}
