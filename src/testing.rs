// Test support - an in-memory database capability and log capture

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bson::Document;
use tracing_subscriber::fmt::MakeWriter;

use crate::client::{ClientError, CollectionLister, DatabaseClient};
use crate::sample::{labels_from, LabelSource, Labels};

/// Canned answers keyed by command name / namespace. `Err(code)` becomes a
/// server command error with that code.
#[derive(Default)]
pub struct FakeClient {
    reachable: bool,
    commands: HashMap<String, Result<Document, i32>>,
    aggregates: HashMap<String, Result<Vec<Document>, i32>>,
    listings: HashMap<String, Result<Vec<String>, i32>>,
    counts: HashMap<String, Result<u64, i32>>,
    found: HashMap<String, Option<Document>>,
    stalled: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

fn rejected(command: &str, code: i32) -> ClientError {
    ClientError::Command {
        command: command.to_string(),
        code,
        message: format!("canned failure {}", code),
    }
}

fn count_key(database: &str, collection: &str, filter: &Document) -> String {
    format!("{}.{}:{}", database, collection, filter)
}

impl FakeClient {
    pub fn new() -> Self {
        FakeClient {
            reachable: true,
            ..FakeClient::default()
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn with_command(mut self, name: &str, reply: Document) -> Self {
        self.commands.insert(name.to_string(), Ok(reply));
        self
    }

    pub fn with_command_error(mut self, name: &str, code: i32) -> Self {
        self.commands.insert(name.to_string(), Err(code));
        self
    }

    pub fn with_aggregate(mut self, namespace: &str, docs: Vec<Document>) -> Self {
        self.aggregates.insert(namespace.to_string(), Ok(docs));
        self
    }

    pub fn with_aggregate_error(mut self, namespace: &str, code: i32) -> Self {
        self.aggregates.insert(namespace.to_string(), Err(code));
        self
    }

    /// The command never completes.
    pub fn with_stalled_command(mut self, name: &str) -> Self {
        self.stalled.insert(format!("command:{}", name));
        self
    }

    /// The aggregation on `namespace` never completes.
    pub fn with_stalled_aggregate(mut self, namespace: &str) -> Self {
        self.stalled.insert(namespace.to_string());
        self
    }

    pub fn with_collections(mut self, database: &str, names: &[&str]) -> Self {
        let names = names.iter().map(|s| s.to_string()).collect();
        self.listings.insert(database.to_string(), Ok(names));
        self
    }

    pub fn with_listing_error(mut self, database: &str, code: i32) -> Self {
        self.listings.insert(database.to_string(), Err(code));
        self
    }

    pub fn with_count(mut self, database: &str, collection: &str, filter: Document, n: u64) -> Self {
        self.counts.insert(count_key(database, collection, &filter), Ok(n));
        self
    }

    pub fn with_count_error(
        mut self,
        database: &str,
        collection: &str,
        filter: Document,
        code: i32,
    ) -> Self {
        self.counts.insert(count_key(database, collection, &filter), Err(code));
        self
    }

    pub fn with_found(mut self, database: &str, collection: &str, filter: Document, doc: Document) -> Self {
        self.found.insert(count_key(database, collection, &filter), Some(doc));
        self
    }

    /// Calls made so far, formatted as `kind:target`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl CollectionLister for FakeClient {
    async fn list_collection_names(&self, database: &str) -> Result<Vec<String>, ClientError> {
        self.record(format!("list:{}", database));
        match self.listings.get(database) {
            Some(Ok(names)) => Ok(names.clone()),
            Some(Err(code)) => Err(rejected("listCollections", *code)),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl DatabaseClient for FakeClient {
    async fn ping(&self) -> Result<(), ClientError> {
        self.record("ping".to_string());
        if self.reachable {
            Ok(())
        } else {
            Err(ClientError::Decode("server selection timeout".to_string()))
        }
    }

    async fn run_command(&self, database: &str, command: Document) -> Result<Document, ClientError> {
        let name = command.keys().next().cloned().unwrap_or_default();
        self.record(format!("command:{}.{}", database, name));
        if self.stalled.contains(&format!("command:{}", name)) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match self.commands.get(&name) {
            Some(Ok(reply)) => Ok(reply.clone()),
            Some(Err(code)) => Err(rejected(&name, *code)),
            None => Err(rejected(&name, 59)),
        }
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        _pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, ClientError> {
        let namespace = format!("{}.{}", database, collection);
        self.record(format!("aggregate:{}", namespace));
        if self.stalled.contains(&namespace) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match self.aggregates.get(&namespace) {
            Some(Ok(docs)) => Ok(docs.clone()),
            Some(Err(code)) => Err(rejected("aggregate", *code)),
            None => Ok(Vec::new()),
        }
    }

    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64, ClientError> {
        let key = count_key(database, collection, &filter);
        self.record(format!("count:{}", key));
        match self.counts.get(&key) {
            Some(Ok(n)) => Ok(*n),
            Some(Err(code)) => Err(rejected("count", *code)),
            None => Ok(0),
        }
    }

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, ClientError> {
        let key = count_key(database, collection, &filter);
        self.record(format!("find:{}", key));
        Ok(self.found.get(&key).cloned().flatten())
    }
}

/// Label source with a fixed label set.
pub struct StaticLabels(Labels);

impl LabelSource for StaticLabels {
    fn base_labels(&self) -> Labels {
        self.0.clone()
    }
}

pub fn base_labels() -> StaticLabels {
    StaticLabels(labels_from([("rs_nm", "rs0")]))
}

/// Shared buffer receiving formatted log lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }

    pub fn has_level(&self, level: &str) -> bool {
        self.contents().lines().any(|line| line.contains(level))
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut inner) = self.0.lock() {
            inner.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Routes this thread's log events into a buffer until the guard drops.
///
/// Works with `#[tokio::test]`, which polls on the current thread.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
