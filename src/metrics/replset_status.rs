// Replica set status collector
//
// Runs `replSetGetStatus` and flattens the reply under `mongodb_rs`.
// Standalone nodes answer with "not running with --replSet" (76) or, before
// initiation, "no replset config" (94): both are a valid configuration and
// produce an empty, silent result.

use async_trait::async_trait;
use bson::doc;
use tracing::{debug, error};

use super::{Collector, CollectorContext};
use crate::document::Document;
use crate::sample::{MetricSink, SampleBatch};

const PREFIX: &str = "mongodb_rs";

const REPLICATION_NOT_ENABLED: i32 = 76;
const REPLICATION_NOT_YET_INITIALIZED: i32 = 94;

pub struct ReplSetStatusCollector {
    ctx: CollectorContext,
}

impl ReplSetStatusCollector {
    pub fn new(ctx: CollectorContext) -> Self {
        ReplSetStatusCollector { ctx }
    }
}

#[async_trait]
impl Collector for ReplSetStatusCollector {
    fn name(&self) -> &str {
        "replset_status"
    }

    async fn collect(&self, sink: &mut dyn MetricSink) {
        let reply = match self
            .ctx
            .client
            .run_command("admin", doc! { "replSetGetStatus": 1 })
            .await
        {
            Ok(reply) => reply,
            Err(e)
                if matches!(
                    e.code(),
                    Some(REPLICATION_NOT_ENABLED | REPLICATION_NOT_YET_INITIALIZED)
                ) =>
            {
                debug!("replication is not configured on this node: {}", e);
                return;
            }
            Err(e) => {
                error!("cannot get replSetGetStatus: {}", e);
                return;
            }
        };

        debug!("replSetGetStatus result: {}", reply);
        let status = Document::from(reply);
        let labels = self.ctx.labels.base_labels();

        let mut batch = SampleBatch::new();
        batch.extend(self.ctx.flattener.samples(&status, PREFIX, &labels));
        batch.drain_into(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterSettings;
    use crate::sample::MetricSample;
    use crate::testing::{base_labels, capture_logs, FakeClient};
    use std::sync::Arc;

    async fn scrape(client: FakeClient) -> Vec<MetricSample> {
        let ctx = CollectorContext::new(
            Arc::new(client),
            Arc::new(base_labels()),
            ExporterSettings::default().flattener(),
        );
        let mut out = Vec::new();
        ReplSetStatusCollector::new(ctx).collect(&mut out).await;
        out
    }

    #[tokio::test]
    async fn test_members_are_flattened_by_index() {
        let client = FakeClient::new().with_command(
            "replSetGetStatus",
            doc! {
                "set": "rs0",
                "myState": 1_i32,
                "members": [
                    { "name": "a:27017", "health": 1_i32, "state": 1_i32 },
                    { "name": "b:27017", "health": 0_i32, "state": 8_i32 },
                ],
            },
        );

        let out = scrape(client).await;
        let value = |name: &str| out.iter().find(|s| s.name == name).map(|s| s.value);

        assert_eq!(value("mongodb_rs_mystate"), Some(1.0));
        assert_eq!(value("mongodb_rs_members_1_health"), Some(0.0));
        assert_eq!(value("mongodb_rs_members_1_state"), Some(8.0));
    }

    #[tokio::test]
    async fn test_replication_not_enabled_is_silent() {
        for code in [REPLICATION_NOT_ENABLED, REPLICATION_NOT_YET_INITIALIZED] {
            let (logs, _guard) = capture_logs();
            let client = FakeClient::new().with_command_error("replSetGetStatus", code);

            let out = scrape(client).await;

            assert!(out.is_empty());
            assert!(!logs.has_level("ERROR"), "code {} logged an error", code);
        }
    }

    #[tokio::test]
    async fn test_other_errors_are_logged() {
        let (logs, _guard) = capture_logs();
        let client = FakeClient::new().with_command_error("replSetGetStatus", 13);

        let out = scrape(client).await;

        assert!(out.is_empty());
        assert!(logs.has_level("ERROR"));
    }
}
