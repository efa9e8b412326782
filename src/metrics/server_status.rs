// Server status collector
//
// Runs `serverStatus` against the admin database and flattens the whole
// reply under the `mongodb_ss` prefix. In compatible mode the lock, cache
// eviction and storage engine passes run on the same reply.

use async_trait::async_trait;
use bson::doc;
use tracing::{debug, error};

use super::{Collector, CollectorContext};
use crate::document::Document;
use crate::rewrite::{RewriteContext, RewriteInput, RewritePipeline};
use crate::sample::{MetricSink, SampleBatch, UniqueSink};

const PREFIX: &str = "mongodb_ss";

pub struct ServerStatusCollector {
    ctx: CollectorContext,
    rewrites: RewritePipeline,
}

impl ServerStatusCollector {
    pub fn new(ctx: CollectorContext) -> Self {
        ServerStatusCollector {
            ctx,
            rewrites: RewritePipeline::for_server_status(),
        }
    }
}

#[async_trait]
impl Collector for ServerStatusCollector {
    fn name(&self) -> &str {
        "server_status"
    }

    async fn collect(&self, sink: &mut dyn MetricSink) {
        let reply = match self
            .ctx
            .client
            .run_command("admin", doc! { "serverStatus": 1 })
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!("cannot run serverStatus: {}", e);
                return;
            }
        };

        debug!("serverStatus result: {}", reply);
        let status = Document::from(reply);
        let labels = self.ctx.labels.base_labels();

        let mut sink = UniqueSink::new(sink);
        let mut batch = SampleBatch::new();
        batch.extend(self.ctx.flattener.samples(&status, PREFIX, &labels));
        debug!("serverStatus flattened into {} sample(s)", batch.len());
        batch.drain_into(&mut sink);

        let input = RewriteInput {
            server_status: Some(&status),
            repl_set_status: None,
        };
        let rewrite_ctx = RewriteContext {
            mode: self.ctx.flattener.mode(),
            role: None,
        };
        let rewritten = self
            .rewrites
            .run(&input, &rewrite_ctx, self.ctx.client.as_ref(), &labels)
            .await;
        for sample in rewritten {
            sink.emit(sample);
        }
    }
}
