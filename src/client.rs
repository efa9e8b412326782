// Client module - the database capability used by all collectors
//
// Collectors never touch the driver directly. They depend on the narrow
// `DatabaseClient` trait so that a scrape can be exercised against canned
// documents, and so that driver errors are normalised into `ClientError`
// (in particular, server command errors keep their numeric code).

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::error::ErrorKind;
use mongodb::Client;
use thiserror::Error;
use tracing::{debug, info};

/// Errors surfaced by the database capability
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("command '{command}' failed with code {code}: {message}")]
    Command {
        command: String,
        code: i32,
        message: String,
    },

    #[error("MongoDB request failed: {0}")]
    Driver(#[from] mongodb::error::Error),

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl ClientError {
    /// Server error code, when the server rejected a command.
    pub fn code(&self) -> Option<i32> {
        match self {
            ClientError::Command { code, .. } => Some(*code),
            _ => None,
        }
    }

    fn from_driver(command: &str, err: mongodb::error::Error) -> Self {
        let rejected = match err.kind.as_ref() {
            ErrorKind::Command(ce) => Some((ce.code, ce.message.clone())),
            _ => None,
        };
        match rejected {
            Some((code, message)) => ClientError::Command {
                command: command.to_string(),
                code,
                message,
            },
            None => ClientError::Driver(err),
        }
    }
}

/// Enumerates the collections of one database.
#[async_trait]
pub trait CollectionLister: Send + Sync {
    async fn list_collection_names(&self, database: &str) -> Result<Vec<String>, ClientError>;
}

/// Read-only command execution against the monitored server.
///
/// Shared by every collector; implementations must be safe to call
/// concurrently.
#[async_trait]
pub trait DatabaseClient: CollectionLister {
    /// Connectivity check.
    async fn ping(&self) -> Result<(), ClientError>;

    /// Runs an administrative command and returns its reply document.
    async fn run_command(&self, database: &str, command: Document)
        -> Result<Document, ClientError>;

    /// Runs an aggregation pipeline and drains the cursor.
    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, ClientError>;

    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64, ClientError>;

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, ClientError>;
}

/// `DatabaseClient` backed by the official driver's pooled client.
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    /// Parses the URI and builds the pooled client.
    ///
    /// No round trip is made here; the liveness collector reports whether
    /// the server is actually reachable.
    pub async fn connect(uri: &str) -> Result<Self, ClientError> {
        let client = Client::with_uri_str(uri).await?;
        info!("MongoDB client initialised");
        Ok(MongoClient { client })
    }
}

fn command_name(command: &Document) -> String {
    command
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "<empty>".to_string())
}

#[async_trait]
impl CollectionLister for MongoClient {
    async fn list_collection_names(&self, database: &str) -> Result<Vec<String>, ClientError> {
        self.client
            .database(database)
            .list_collection_names(None)
            .await
            .map_err(|e| ClientError::from_driver("listCollections", e))
    }
}

#[async_trait]
impl DatabaseClient for MongoClient {
    async fn ping(&self) -> Result<(), ClientError> {
        self.run_command("admin", doc! { "ping": 1 }).await.map(|_| ())
    }

    async fn run_command(
        &self,
        database: &str,
        command: Document,
    ) -> Result<Document, ClientError> {
        let name = command_name(&command);
        debug!("Running command '{}' against '{}'", name, database);

        self.client
            .database(database)
            .run_command(command, None)
            .await
            .map_err(|e| ClientError::from_driver(&name, e))
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, ClientError> {
        let coll = self
            .client
            .database(database)
            .collection::<Document>(collection);

        let cursor = coll
            .aggregate(pipeline, None)
            .await
            .map_err(|e| ClientError::from_driver("aggregate", e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| ClientError::from_driver("getMore", e))
    }

    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64, ClientError> {
        self.client
            .database(database)
            .collection::<Document>(collection)
            .count_documents(filter, None)
            .await
            .map_err(|e| ClientError::from_driver("count", e))
    }

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, ClientError> {
        self.client
            .database(database)
            .collection::<Document>(collection)
            .find_one(filter, None)
            .await
            .map_err(|e| ClientError::from_driver("find", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_exposes_code() {
        let err = ClientError::Command {
            command: "replSetGetStatus".to_string(),
            code: 76,
            message: "not running with --replSet".to_string(),
        };

        assert_eq!(err.code(), Some(76));
        assert!(err.to_string().contains("replSetGetStatus"));
        assert_eq!(ClientError::Decode("x".to_string()).code(), None);
    }

    #[test]
    fn test_command_name_is_first_key() {
        assert_eq!(command_name(&doc! { "serverStatus": 1, "repl": 0 }), "serverStatus");
        assert_eq!(command_name(&doc! {}), "<empty>");
    }
}
