// Topology module - node role classification and base topology labels

use bson::doc;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::client::{ClientError, DatabaseClient};
use crate::document::Document;
use crate::sample::{LabelSource, Labels};

/// Reply marker identifying a query router.
const ROUTER_MSG: &str = "isdbgrid";

/// Role of the monitored node in its deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    ReplicaMember,
    Router,
    Standalone,
}

impl NodeRole {
    /// Classifies a node from its `isMaster` reply.
    pub fn from_is_master(reply: &Document) -> NodeRole {
        if reply.get_str("msg") == Some(ROUTER_MSG) {
            NodeRole::Router
        } else if reply.get_str("setName").is_some() {
            NodeRole::ReplicaMember
        } else {
            NodeRole::Standalone
        }
    }

    pub fn as_label(self) -> &'static str {
        match self {
            NodeRole::ReplicaMember => "replset",
            NodeRole::Router => "mongos",
            NodeRole::Standalone => "standalone",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

async fn is_master<C>(client: &C) -> Result<Document, ClientError>
where
    C: DatabaseClient + ?Sized,
{
    let reply = client.run_command("admin", doc! { "isMaster": 1 }).await?;
    Ok(Document::from(reply))
}

/// Issues the lightweight role check.
pub async fn classify<C>(client: &C) -> Result<NodeRole, ClientError>
where
    C: DatabaseClient + ?Sized,
{
    let reply = is_master(client).await?;
    Ok(NodeRole::from_is_master(&reply))
}

async fn query_labels<C>(client: &C) -> Result<Labels, ClientError>
where
    C: DatabaseClient + ?Sized,
{
    let reply = is_master(client).await?;
    let role = NodeRole::from_is_master(&reply);

    let mut labels = Labels::new();
    labels.insert("cl_role".to_string(), role.as_label().to_string());
    if let Some(set) = reply.get_str("setName") {
        labels.insert("rs_nm".to_string(), set.to_string());
    }
    info!("Detected node role: {}", role);
    Ok(labels)
}

/// Base labels describing the monitored node (`cl_role`, `rs_nm`).
///
/// Empty until one `isMaster` call succeeds; until then every `refresh`
/// asks again, so an exporter started while the server was down picks the
/// labels up once it becomes reachable. After that they never change.
pub struct TopologyLabels {
    client: Arc<dyn DatabaseClient>,
    labels: RwLock<Option<Labels>>,
}

impl TopologyLabels {
    pub fn new(client: Arc<dyn DatabaseClient>) -> Self {
        TopologyLabels {
            client,
            labels: RwLock::new(None),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.labels.read().map(|l| l.is_some()).unwrap_or(false)
    }

    /// Asks the server for the labels unless they are already known.
    pub async fn refresh(&self) {
        if self.is_resolved() {
            return;
        }

        match query_labels(self.client.as_ref()).await {
            Ok(labels) => {
                if let Ok(mut slot) = self.labels.write() {
                    *slot = Some(labels);
                }
            }
            Err(e) => {
                warn!("Cannot determine topology labels, retrying on the next scrape: {}", e);
            }
        }
    }
}

impl LabelSource for TopologyLabels {
    fn base_labels(&self) -> Labels {
        match self.labels.read() {
            Ok(labels) => (*labels).clone().unwrap_or_default(),
            Err(_) => Labels::new(),
        }
    }
}
