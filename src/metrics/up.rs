// Liveness collector
//
// Emits `mongodb_up`: 1 when the server answers a ping, 0 otherwise.
// Always produces exactly one sample, whatever the other collectors do.

use async_trait::async_trait;
use tracing::{debug, error};

use super::{Collector, CollectorContext};
use crate::sample::{MetricKind, MetricSample, MetricSink};

pub struct UpCollector {
    ctx: CollectorContext,
}

impl UpCollector {
    pub fn new(ctx: CollectorContext) -> Self {
        UpCollector { ctx }
    }
}

#[async_trait]
impl Collector for UpCollector {
    fn name(&self) -> &str {
        "up"
    }

    async fn collect(&self, sink: &mut dyn MetricSink) {
        let value = match self.ctx.client.ping().await {
            Ok(()) => {
                debug!("MongoDB ping succeeded");
                1.0
            }
            Err(e) => {
                error!("error while checking mongodb connection: {}. mongodb_up is set to 0", e);
                0.0
            }
        };

        sink.emit(
            MetricSample::new("mongodb_up", MetricKind::Gauge, self.ctx.labels.base_labels(), value)
                .with_help("Whether MongoDB is up."),
        );
    }
}
