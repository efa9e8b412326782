// Discovery module - expands a seed list of namespaces into live collections
//
// Only the database part of each seed entry matters in discovery mode: every
// distinct database is listed once and the result replaces the seed
// wholesale. Nothing is cached between scrapes.

use tracing::{debug, warn};

use crate::client::CollectionLister;

/// A `database.collection` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub database: String,
    pub collection: String,
}

impl Target {
    /// Splits on the first `.`; collection names may themselves contain dots.
    pub fn parse(namespace: &str) -> Option<Target> {
        let (database, collection) = namespace.split_once('.')?;
        if database.is_empty() || collection.is_empty() {
            return None;
        }
        Some(Target {
            database: database.to_string(),
            collection: collection.to_string(),
        })
    }

    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }
}

fn database_of(entry: &str) -> &str {
    entry.split_once('.').map_or(entry, |(db, _)| db)
}

/// Replaces `seed` with every collection currently present in the databases
/// it names, in first-seen database order.
///
/// A listing failure empties that database only.
pub async fn discover<L>(seed: &[String], lister: &L) -> Vec<String>
where
    L: CollectionLister + ?Sized,
{
    let mut databases: Vec<&str> = Vec::new();
    for entry in seed {
        let db = database_of(entry);
        if !db.is_empty() && !databases.contains(&db) {
            databases.push(db);
        }
    }

    let mut discovered = Vec::new();
    for db in databases {
        match lister.list_collection_names(db).await {
            Ok(collections) => {
                debug!("Discovered {} collection(s) in '{}'", collections.len(), db);
                discovered.extend(collections.into_iter().map(|c| format!("{}.{}", db, c)));
            }
            Err(e) => {
                warn!("Cannot list collections of database '{}': {}", db, e);
            }
        }
    }
    discovered
}

/// Target list for one scrape: the discovered set in discovery mode, the
/// configured list otherwise.
pub async fn resolve_targets<L>(seed: &[String], discovering: bool, lister: &L) -> Vec<Target>
where
    L: CollectionLister + ?Sized,
{
    let namespaces = if discovering {
        discover(seed, lister).await
    } else {
        seed.to_vec()
    };

    namespaces
        .iter()
        .filter_map(|ns| {
            let target = Target::parse(ns);
            if target.is_none() {
                debug!("Skipping malformed namespace '{}'", ns);
            }
            target
        })
        .collect()
}
