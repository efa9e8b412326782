// Diagnostic data collector
//
// `getDiagnosticData` returns `{ data: { serverStatus: .., replSetGetStatus: ..,
// local.oplog.rs.stats: .., systemMetrics: .. }, ok: 1 }`. The `data` payload
// is flattened under the `mongodb` prefix. In compatible mode the rewrite
// passes run on the same payload; the router statistics additionally need
// the node role, which costs one `isMaster` per scrape.

use async_trait::async_trait;
use bson::doc;
use tracing::{debug, error};

use super::{Collector, CollectorContext};
use crate::client::ClientError;
use crate::document::{Document, Value};
use crate::rewrite::{RewriteContext, RewriteInput, RewritePipeline};
use crate::sample::{MetricSink, SampleBatch, UniqueSink};
use crate::topology;

const PREFIX: &str = "mongodb";

pub struct DiagnosticDataCollector {
    ctx: CollectorContext,
    rewrites: RewritePipeline,
}

impl DiagnosticDataCollector {
    pub fn new(ctx: CollectorContext) -> Self {
        DiagnosticDataCollector {
            ctx,
            rewrites: RewritePipeline::for_diagnostic_data(),
        }
    }

    async fn rewrite_context(&self) -> RewriteContext {
        let mode = self.ctx.flattener.mode();
        let mut role = None;

        if mode.is_compatible() && self.rewrites.needs_role() {
            match topology::classify(self.ctx.client.as_ref()).await {
                Ok(r) => role = Some(r),
                Err(e) => {
                    error!("Cannot get node type to check if this is a mongos: {}", e);
                }
            }
        }

        RewriteContext { mode, role }
    }
}

/// Extracts the `data` payload from a `getDiagnosticData` reply.
fn payload(reply: bson::Document) -> Result<Document, ClientError> {
    match Document::from(reply).get("data") {
        Some(Value::Document(data)) => Ok(data.clone()),
        Some(other) => Err(ClientError::Decode(format!(
            "'data' is not a document: {:?}",
            other
        ))),
        None => Err(ClientError::Decode("reply has no 'data' field".to_string())),
    }
}

#[async_trait]
impl Collector for DiagnosticDataCollector {
    fn name(&self) -> &str {
        "diagnostic_data"
    }

    async fn collect(&self, sink: &mut dyn MetricSink) {
        let reply = match self
            .ctx
            .client
            .run_command("admin", doc! { "getDiagnosticData": 1 })
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!("cannot run getDiagnosticData: {}", e);
                return;
            }
        };

        let data = match payload(reply) {
            Ok(data) => data,
            Err(e) => {
                error!("cannot decode getDiagnosticData: {}", e);
                return;
            }
        };

        debug!("getDiagnosticData returned {} section(s)", data.len());
        let labels = self.ctx.labels.base_labels();

        let mut sink = UniqueSink::new(sink);
        let mut batch = SampleBatch::new();
        batch.extend(self.ctx.flattener.samples(&data, PREFIX, &labels));
        debug!("getDiagnosticData flattened into {} sample(s)", batch.len());
        batch.drain_into(&mut sink);

        let rewrite_ctx = self.rewrite_context().await;
        let input = RewriteInput {
            server_status: data.get_document("serverStatus"),
            repl_set_status: data.get_document("replSetGetStatus"),
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
