// Sample module - the unit of output produced by every collector
//
// Collectors push `MetricSample`s into a `MetricSink`. The sink is the only
// outbound surface; how the samples are exposed (text file, registry, test
// buffer) is decided by whoever owns the sink.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Ordered label set. Keys are unique by construction.
pub type Labels = BTreeMap<String, String>;

/// Exposition type of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Untyped,
}

/// One named numeric observation with its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    /// Document path the value was read from; used as exposition help text.
    pub help: String,
    pub kind: MetricKind,
    pub labels: Labels,
    pub value: f64,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, kind: MetricKind, labels: Labels, value: f64) -> Self {
        let name = name.into();
        MetricSample {
            help: name.clone(),
            name,
            kind,
            labels,
            value,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }
}

/// Destination for samples produced during one scrape.
pub trait MetricSink: Send {
    fn emit(&mut self, sample: MetricSample);
}

impl MetricSink for Vec<MetricSample> {
    fn emit(&mut self, sample: MetricSample) {
        self.push(sample);
    }
}

/// Supplies the identity/topology labels every sample starts from.
pub trait LabelSource: Send + Sync {
    fn base_labels(&self) -> Labels;
}

/// Per-scrape accumulator that keeps (name, labels) unique.
///
/// A later sample with the same identity overwrites the earlier one but keeps
/// its position, so emission order stays stable.
#[derive(Debug, Default)]
pub struct SampleBatch {
    samples: Vec<MetricSample>,
    index: HashMap<(String, Labels), usize>,
}

impl SampleBatch {
    pub fn new() -> Self {
        SampleBatch::default()
    }

    pub fn push(&mut self, sample: MetricSample) {
        let key = (sample.name.clone(), sample.labels.clone());
        match self.index.get(&key) {
            Some(&pos) => self.samples[pos] = sample,
            None => {
                self.index.insert(key, self.samples.len());
                self.samples.push(sample);
            }
        }
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = MetricSample>) {
        for sample in samples {
            self.push(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Hands every accumulated sample to the sink, in insertion order.
    pub fn drain_into(self, sink: &mut dyn MetricSink) {
        for sample in self.samples {
            sink.emit(sample);
        }
    }
}

/// Forwards samples to another sink, dropping any (name, labels) identity
/// that was already forwarded. Samples reach the inner sink immediately, so
/// a scrape cut short by its deadline keeps everything forwarded so far.
pub struct UniqueSink<'a> {
    inner: &'a mut dyn MetricSink,
    seen: HashSet<(String, Labels)>,
    dropped: usize,
}

impl<'a> UniqueSink<'a> {
    pub fn new(inner: &'a mut dyn MetricSink) -> Self {
        UniqueSink {
            inner,
            seen: HashSet::new(),
            dropped: 0,
        }
    }

    /// Samples rejected as duplicates so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl MetricSink for UniqueSink<'_> {
    fn emit(&mut self, sample: MetricSample) {
        if self.seen.insert((sample.name.clone(), sample.labels.clone())) {
            self.inner.emit(sample);
        } else {
            self.dropped += 1;
        }
    }
}

/// Builds a label set from string pairs.
#[cfg(test)]
pub fn labels_from<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
