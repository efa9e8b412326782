// Rewrite module - special-case passes over raw diagnostic documents
//
// The generic flattener names every leaf after its path. A few parts of the
// server's diagnostics need a different treatment to stay usable (lock
// statistics keyed by type and mode) or to stay compatible with names that
// dashboards already rely on. Each of those is an independent pass that
// reads the raw document, declares when it applies, and produces its own
// samples. A collector composes the passes it needs into a pipeline.

pub mod engine;
pub mod locks;
pub mod replset;
pub mod router;

use async_trait::async_trait;
use tracing::debug;

use crate::client::DatabaseClient;
use crate::document::Document;
use crate::flatten::naming::NamingMode;
use crate::sample::{Labels, MetricSample};
use crate::topology::NodeRole;

/// What a pass may base its applicability on.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext {
    pub mode: NamingMode,
    /// `None` when classification was not attempted or failed.
    pub role: Option<NodeRole>,
}

/// Raw sections a pass can read.
#[derive(Debug, Default, Clone, Copy)]
pub struct RewriteInput<'a> {
    pub server_status: Option<&'a Document>,
    pub repl_set_status: Option<&'a Document>,
}

#[async_trait]
pub trait RewritePass: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the pass needs the node role to decide applicability.
    fn requires_role(&self) -> bool {
        false
    }

    fn applies(&self, ctx: &RewriteContext) -> bool {
        ctx.mode.is_compatible()
    }

    /// Produces the pass's samples. Missing input means no samples.
    async fn rewrite(
        &self,
        input: &RewriteInput<'_>,
        client: &dyn DatabaseClient,
        labels: &Labels,
    ) -> Vec<MetricSample>;
}

/// Ordered list of passes run after generic flattening.
pub struct RewritePipeline {
    passes: Vec<Box<dyn RewritePass>>,
}

impl RewritePipeline {
    pub fn new(passes: Vec<Box<dyn RewritePass>>) -> Self {
        RewritePipeline { passes }
    }

    /// Passes applied to a plain `serverStatus` reply.
    pub fn for_server_status() -> Self {
        RewritePipeline::new(vec![
            Box::new(locks::LockStats),
            Box::new(engine::CacheEvicted),
            Box::new(engine::StorageEngine),
        ])
    }

    /// Passes applied to the `getDiagnosticData` payload.
    pub fn for_diagnostic_data() -> Self {
        RewritePipeline::new(vec![
            Box::new(locks::LockStats),
            Box::new(engine::CacheEvicted),
            Box::new(engine::StorageEngine),
            Box::new(replset::MemberState),
            Box::new(router::RouterStats),
        ])
    }

    /// True when some pass depends on the node role; the caller then pays
    /// for one classification command per scrape.
    pub fn needs_role(&self) -> bool {
        self.passes.iter().any(|p| p.requires_role())
    }

    pub async fn run(
        &self,
        input: &RewriteInput<'_>,
        ctx: &RewriteContext,
        client: &dyn DatabaseClient,
        labels: &Labels,
    ) -> Vec<MetricSample> {
        let mut out = Vec::new();
        for pass in &self.passes {
            if !pass.applies(ctx) {
                debug!("Rewrite pass '{}' does not apply, skipping", pass.name());
                continue;
            }
            let samples = pass.rewrite(input, client, labels).await;
            debug!("Rewrite pass '{}' produced {} sample(s)", pass.name(), samples.len());
            out.extend(samples);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeClient;
    use bson::doc;

    fn server_status() -> Document {
        Document::from(doc! {
            "storageEngine": { "name": "wiredTiger" },
            "wiredTiger": { "cache": { "modified pages evicted": 9_i64 } },
            "locks": { "Global": { "acquireCount": { "r": 2_i64 } } },
        })
    }

    #[tokio::test]
    async fn test_hierarchical_mode_runs_no_pass() {
        let status = server_status();
        let input = RewriteInput {
            server_status: Some(&status),
            repl_set_status: None,
        };
        let ctx = RewriteContext {
            mode: NamingMode::Hierarchical,
            role: None,
        };
        let client = FakeClient::new();

        let out = RewritePipeline::for_server_status()
            .run(&input, &ctx, &client, &Labels::new())
            .await;

        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_compatible_mode_runs_every_applicable_pass() {
        let status = server_status();
        let input = RewriteInput {
            server_status: Some(&status),
            repl_set_status: None,
        };
        let ctx = RewriteContext {
            mode: NamingMode::Compatible,
            role: Some(NodeRole::Standalone),
        };
        let client = FakeClient::new();

        let out = RewritePipeline::for_diagnostic_data()
            .run(&input, &ctx, &client, &Labels::new())
            .await;

        let names: Vec<&str> = out.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "mongodb_ss_locks_acquirecount",
                "mongodb_mongod_wiredtiger_cache_evicted_total",
                "mongodb_mongod_storage_engine",
            ]
        );
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_only_diagnostic_pipeline_needs_role() {
        assert!(RewritePipeline::for_diagnostic_data().needs_role());
        assert!(!RewritePipeline::for_server_status().needs_role());
    }
}
