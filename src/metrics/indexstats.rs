// Index statistics collector
//
// Runs `$indexStats` on every target. Only the access counter and the build
// flag are exposed per index; everything else in the reply is index
// internals. The prefix combines database, collection and index name so the
// same fields of different indexes never share a name.

use async_trait::async_trait;
use bson::doc;
use tracing::{debug, error, warn};

use super::{Collector, CollectorContext};
use crate::discovery::resolve_targets;
use crate::document::{Document, Value};
use crate::flatten::coerce::coerce;
use crate::sample::{MetricSink, SampleBatch, UniqueSink};

pub struct IndexStatsCollector {
    ctx: CollectorContext,
    seed: Vec<String>,
    discovering: bool,
}

impl IndexStatsCollector {
    pub fn new(ctx: CollectorContext, seed: Vec<String>, discovering: bool) -> Self {
        IndexStatsCollector {
            ctx,
            seed,
            discovering,
        }
    }
}

/// Keeps `accesses.ops` (0 when absent) and `building` when numeric.
fn project(stats: &Document) -> Document {
    let ops = stats
        .walk(&["accesses", "ops"])
        .and_then(coerce)
        .unwrap_or(0.0);

    let mut accesses = Document::new();
    accesses.insert("ops", Value::Float64(ops));

    let mut projected = Document::new();
    projected.insert("accesses", Value::Document(accesses));
    if let Some(building) = stats.get("building").and_then(coerce) {
        projected.insert("building", Value::Float64(building));
    }
    projected
}

#[async_trait]
impl Collector for IndexStatsCollector {
    fn name(&self) -> &str {
        "indexstats"
    }

    async fn collect(&self, sink: &mut dyn MetricSink) {
        let targets = resolve_targets(&self.seed, self.discovering, self.ctx.client.as_ref()).await;
        let mut sink = UniqueSink::new(sink);

        for target in &targets {
            let namespace = target.namespace();
            let stats = match self
                .ctx
                .client
                .aggregate(
                    &target.database,
                    &target.collection,
                    vec![doc! { "$indexStats": {} }],
                )
                .await
            {
                Ok(stats) => stats,
                Err(e) => {
                    error!("cannot get $indexStats for collection {}: {}", namespace, e);
                    continue;
                }
            };

            debug!("$indexStats returned {} index(es) for {}", stats.len(), namespace);

            let mut batch = SampleBatch::new();
            for raw in stats {
                let stats = Document::from(raw);
                let Some(index) = stats.get_str("name") else {
                    warn!("skipping $indexStats entry without a name in {}", namespace);
                    continue;
                };

                let prefix = format!(
                    "mongodb_{}_{}_{}",
                    target.database, target.collection, index
                );
                let mut labels = self.ctx.labels.base_labels();
                labels.insert("namespace".to_string(), namespace.clone());
                labels.insert("key_name".to_string(), index.to_string());
                if let Some(shard) = stats.get_str("shard") {
                    labels.insert("shard".to_string(), shard.to_string());
                }

                batch.extend(self.ctx.flattener.samples(&project(&stats), &prefix, &labels));
            }
            batch.drain_into(&mut sink);
        }

        if sink.dropped() > 0 {
            debug!("$indexStats dropped {} duplicate sample(s)", sink.dropped());
        }
    }
}
