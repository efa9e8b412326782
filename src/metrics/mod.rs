// Metrics module - the collector abstraction and the collector registry
//
// Each collector owns one command or aggregation, turns the reply into
// samples and hands them to the sink. Collectors never fail: errors are
// logged and the scrape simply carries fewer samples.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::client::DatabaseClient;
use crate::config::ExporterSettings;
use crate::flatten::Flattener;
use crate::sample::{LabelSource, MetricSink};

pub mod collstats;
pub mod diagnostic_data;
pub mod indexstats;
pub mod replset_status;
pub mod server_status;
pub mod up;

/// Core trait that all collectors implement.
///
/// A call to `collect` is one scrape: it runs to completion (or is dropped
/// by the caller's deadline) and leaves no state behind.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Short identifier used in logs and self-monitoring labels.
    fn name(&self) -> &str;

    /// Runs one scrape and emits its samples.
    async fn collect(&self, sink: &mut dyn MetricSink);
}

/// Dependencies shared by every collector of one exporter instance.
#[derive(Clone)]
pub struct CollectorContext {
    pub client: Arc<dyn DatabaseClient>,
    pub labels: Arc<dyn LabelSource>,
    pub flattener: Flattener,
}

impl CollectorContext {
    pub fn new(
        client: Arc<dyn DatabaseClient>,
        labels: Arc<dyn LabelSource>,
        flattener: Flattener,
    ) -> Self {
        CollectorContext {
            client,
            labels,
            flattener,
        }
    }
}

/// Instantiates every collector enabled by the settings.
///
/// The liveness collector is always present. Per-collection collectors are
/// created only when they have something to scan.
///
/// In compatible mode the diagnostic payload already carries `serverStatus`
/// and `replSetGetStatus`, and the legacy renames give them the same
/// `mongodb_ss` / `mongodb_rs` names the standalone collectors use, so those
/// two are left out whenever diagnostic data is collected.
pub fn create_all_collectors(
    settings: &ExporterSettings,
    ctx: CollectorContext,
) -> Vec<Box<dyn Collector>> {
    let mut collectors: Vec<Box<dyn Collector>> = vec![Box::new(up::UpCollector::new(ctx.clone()))];
    let toggles = &settings.collectors;
    let covered = toggles.diagnostic_data && settings.naming_mode.is_compatible();

    if covered && (toggles.server_status || toggles.replset_status) {
        info!("Compatible mode: serverStatus and replSetGetStatus are read from getDiagnosticData");
    }

    if toggles.server_status && !covered {
        collectors.push(Box::new(server_status::ServerStatusCollector::new(ctx.clone())));
    }
    if toggles.diagnostic_data {
        collectors.push(Box::new(diagnostic_data::DiagnosticDataCollector::new(ctx.clone())));
    }
    if toggles.replset_status && !covered {
        collectors.push(Box::new(replset_status::ReplSetStatusCollector::new(ctx.clone())));
    }
    if !settings.collstats_collections.is_empty() {
        collectors.push(Box::new(collstats::CollStatsCollector::new(
            ctx.clone(),
            settings.collstats_collections.clone(),
            settings.discovering_mode,
        )));
    }
    if !settings.indexstats_collections.is_empty() {
        collectors.push(Box::new(indexstats::IndexStatsCollector::new(
            ctx,
            settings.indexstats_collections.clone(),
            settings.discovering_mode,
        )));
    }

    collectors
}
