// Collection statistics collector
//
// Runs `$collStats` on every target (re-discovered each scrape in discovery
// mode). Storage engine internals and per-index details are projected away
// server-side. Every collection reports the same fields, so each target gets
// its own name prefix; the labels are there for filtering.

use async_trait::async_trait;
use bson::{doc, Document as BsonDocument};
use tracing::{debug, error};

use super::{Collector, CollectorContext};
use crate::discovery::{resolve_targets, Target};
use crate::document::Document;
use crate::sample::{Labels, MetricSink, SampleBatch, UniqueSink};

pub struct CollStatsCollector {
    ctx: CollectorContext,
    seed: Vec<String>,
    discovering: bool,
}

impl CollStatsCollector {
    pub fn new(ctx: CollectorContext, seed: Vec<String>, discovering: bool) -> Self {
        CollStatsCollector {
            ctx,
            seed,
            discovering,
        }
    }

    fn pipeline() -> Vec<BsonDocument> {
        vec![
            doc! {
                "$collStats": {
                    "latencyStats": { "histograms": true },
                    "storageStats": { "scale": 1 },
                },
            },
            doc! {
                "$project": {
                    "storageStats.wiredTiger": 0,
                    "storageStats.indexDetails": 0,
                },
            },
        ]
    }

    fn target_labels(&self, target: &Target, stats: &Document) -> Labels {
        let mut labels = self.ctx.labels.base_labels();
        labels.insert("database".to_string(), target.database.clone());
        labels.insert("collection".to_string(), target.collection.clone());
        if let Some(shard) = stats.get_str("shard") {
            labels.insert("shard".to_string(), shard.to_string());
        }
        labels
    }
}

#[async_trait]
impl Collector for CollStatsCollector {
    fn name(&self) -> &str {
        "collstats"
    }

    async fn collect(&self, sink: &mut dyn MetricSink) {
        let targets = resolve_targets(&self.seed, self.discovering, self.ctx.client.as_ref()).await;
        let mut sink = UniqueSink::new(sink);

        for target in &targets {
            let stats = match self
                .ctx
                .client
                .aggregate(&target.database, &target.collection, Self::pipeline())
                .await
            {
                Ok(stats) => stats,
                Err(e) => {
                    error!("cannot get $collStats for collection {}: {}", target.namespace(), e);
                    continue;
                }
            };

            debug!("$collStats returned {} document(s) for {}", stats.len(), target.namespace());
            let prefix = format!("mongodb_{}", target.namespace());

            // a finished target is handed over before the next one starts
            let mut batch = SampleBatch::new();
            for raw in stats {
                let stats = Document::from(raw);
                let labels = self.target_labels(target, &stats);
                batch.extend(self.ctx.flattener.samples(&stats, &prefix, &labels));
            }
            batch.drain_into(&mut sink);
        }

        if sink.dropped() > 0 {
            debug!("$collStats dropped {} duplicate sample(s)", sink.dropped());
        }
    }
}
