// Replica set member state - own state and last applied optime

use async_trait::async_trait;

use super::{RewriteInput, RewritePass};
use crate::client::DatabaseClient;
use crate::flatten::coerce::{coerce, coerce_with, Coercion};
use crate::sample::{Labels, MetricKind, MetricSample};

const APPLIED_OPTIME: [&str; 3] = ["optimes", "appliedOpTime", "ts"];

pub struct MemberState;

#[async_trait]
impl RewritePass for MemberState {
    fn name(&self) -> &'static str {
        "replset_member_state"
    }

    async fn rewrite(
        &self,
        input: &RewriteInput<'_>,
        _client: &dyn DatabaseClient,
        labels: &Labels,
    ) -> Vec<MetricSample> {
        let Some(status) = input.repl_set_status else {
            return Vec::new();
        };

        let mut labels = labels.clone();
        if let Some(set) = status.get_str("set") {
            labels.insert("set".to_string(), set.to_string());
        }

        let mut out = Vec::new();
        if let Some(state) = status.get("myState").and_then(coerce) {
            out.push(
                MetricSample::new(
                    "mongodb_mongod_replset_my_state",
                    MetricKind::Gauge,
                    labels.clone(),
                    state,
                )
                .with_help("replSetGetStatus.myState"),
            );
        }
        if let Some(seconds) = status
            .walk(&APPLIED_OPTIME)
            .and_then(|v| coerce_with(v, Coercion::Temporal))
        {
            out.push(
                MetricSample::new(
                    "mongodb_mongod_replset_my_optime_seconds",
                    MetricKind::Gauge,
                    labels,
                    seconds,
                )
                .with_help("replSetGetStatus.optimes.appliedOpTime.ts"),
            );
        }
        out
    }
}
