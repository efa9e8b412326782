// Lock statistics - one series per (lock type, lock mode) and counter
//
// serverStatus.locks looks like
//   { Global: { acquireCount: { r: 10, w: 3 }, timeAcquiringMicros: { W: 5 } },
//     Database: { ... }, Collection: { ... } }
// Lock type and mode become labels instead of name segments.

use async_trait::async_trait;

use super::{RewriteInput, RewritePass};
use crate::client::DatabaseClient;
use crate::document::{Document, Value};
use crate::flatten::coerce::coerce;
use crate::flatten::naming::sanitize;
use crate::sample::{Labels, MetricKind, MetricSample};

const PREFIX: &str = "mongodb_ss_locks";

pub struct LockStats;

impl LockStats {
    fn samples(locks: &Document, labels: &Labels) -> Vec<MetricSample> {
        let mut out = Vec::new();

        for (lock_type, counters) in locks.iter() {
            let Value::Document(counters) = counters else {
                continue;
            };
            for (counter, modes) in counters.iter() {
                let Value::Document(modes) = modes else {
                    continue;
                };
                let name = format!("{}_{}", PREFIX, sanitize(counter));
                for (mode, value) in modes.iter() {
                    let Some(value) = coerce(value) else {
                        continue;
                    };
                    let mut labels = labels.clone();
                    labels.insert("lock_type".to_string(), lock_type.to_string());
                    labels.insert("lock_mode".to_string(), mode.to_string());
                    out.push(
                        MetricSample::new(name.clone(), MetricKind::Untyped, labels, value)
                            .with_help(format!("serverStatus.locks.*.{}.*", counter)),
                    );
                }
            }
        }
        out
    }
}

#[async_trait]
impl RewritePass for LockStats {
    fn name(&self) -> &'static str {
        "locks"
    }

    async fn rewrite(
        &self,
        input: &RewriteInput<'_>,
        _client: &dyn DatabaseClient,
        labels: &Labels,
    ) -> Vec<MetricSample> {
        input
            .server_status
            .and_then(|ss| ss.get_document("locks"))
            .map(|locks| LockStats::samples(locks, labels))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_lock_type_and_mode_become_labels() {
        let locks = Document::from(doc! {
            "Global": {
                "acquireCount": { "r": 10_i64, "w": 3_i64 },
                "timeAcquiringMicros": { "W": 5_i64 },
            },
            "Database": { "acquireCount": { "r": 4_i32 } },
            "ParallelBatchWriterMode": "unexpected",
            "Collection": { "acquireCount": { "R": "bogus" }, "note": 1_i32 },
        });
        let base: Labels = [("rs_nm".to_string(), "rs0".to_string())].into();

        let out = LockStats::samples(&locks, &base);

        assert_eq!(out.len(), 4);
        assert_eq!(out[0].name, "mongodb_ss_locks_acquirecount");
        assert_eq!(out[0].labels.get("lock_type").map(String::as_str), Some("Global"));
        assert_eq!(out[0].labels.get("lock_mode").map(String::as_str), Some("r"));
        assert_eq!(out[0].labels.get("rs_nm").map(String::as_str), Some("rs0"));
        assert_eq!(out[0].value, 10.0);
        assert_eq!(out[2].name, "mongodb_ss_locks_timeacquiringmicros");
        assert_eq!(out[3].labels.get("lock_type").map(String::as_str), Some("Database"));
    }

    #[test]
    fn test_label_sets_are_unique_per_name() {
        let locks = Document::from(doc! {
            "Global": { "acquireCount": { "r": 1_i32, "w": 2_i32 } },
            "Database": { "acquireCount": { "r": 3_i32, "w": 4_i32 } },
        });

        let out = LockStats::samples(&locks, &Labels::new());
        let mut identities: Vec<(String, Labels)> =
            out.into_iter().map(|s| (s.name, s.labels)).collect();
        let before = identities.len();
        identities.sort();
        identities.dedup();

        assert_eq!(identities.len(), before);
    }
}
