// Exposition module - renders a scrape in the Prometheus text format
//
// Samples are grouped into metric families by name (first-seen order).
// Gauge families are encoded with the `prometheus` crate; its text encoder
// has no untyped support, so untyped families are written here in the same
// format. The result is written to a textfile
// that a node exporter textfile collector, or any static file server, can
// expose. The write goes through a temporary file and a rename so readers
// never see a half-written scrape.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType, Untyped};
use prometheus::{Encoder, TextEncoder};
use thiserror::Error;
use tracing::{debug, error};

use crate::sample::{MetricKind, MetricSample};

/// Errors that can occur while exposing a scrape
#[derive(Error, Debug)]
pub enum ExpositionError {
    #[error("Prometheus encoding failed: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("textfile write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoded output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

fn metric_type(kind: MetricKind) -> MetricType {
    match kind {
        MetricKind::Gauge => MetricType::GAUGE,
        MetricKind::Untyped => MetricType::UNTYPED,
    }
}

fn to_metric(sample: &MetricSample) -> Metric {
    let pairs: Vec<LabelPair> = sample
        .labels
        .iter()
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.clone());
            pair.set_value(value.clone());
            pair
        })
        .collect();

    let mut metric = Metric::default();
    metric.set_label(pairs.into());
    match sample.kind {
        MetricKind::Gauge => {
            let mut gauge = Gauge::default();
            gauge.set_value(sample.value);
            metric.set_gauge(gauge);
        }
        MetricKind::Untyped => {
            let mut untyped = Untyped::default();
            untyped.set_value(sample.value);
            metric.set_untyped(untyped);
        }
    }
    metric
}

/// Groups samples into families. A family takes kind and help text from its
/// first sample; later samples of a different kind are dropped.
pub fn families(samples: &[MetricSample]) -> Vec<MetricFamily> {
    let mut out: Vec<MetricFamily> = Vec::new();
    let mut kinds: Vec<MetricKind> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for sample in samples {
        let pos = match index.get(sample.name.as_str()) {
            Some(&pos) => pos,
            None => {
                let mut family = MetricFamily::default();
                family.set_name(sample.name.clone());
                family.set_help(sample.help.clone());
                family.set_field_type(metric_type(sample.kind));
                index.insert(sample.name.as_str(), out.len());
                out.push(family);
                kinds.push(sample.kind);
                out.len() - 1
            }
        };

        if kinds[pos] != sample.kind {
            debug!("Dropping {:?} sample of {:?} family {}", sample.kind, kinds[pos], sample.name);
            continue;
        }
        out[pos].mut_metric().push(to_metric(sample));
    }
    out
}

fn escape(raw: &str, quotes: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' if quotes => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// Writes one untyped family in the text format.
fn write_untyped(family: &MetricFamily, out: &mut String) {
    let name = family.get_name();
    if !family.get_help().is_empty() {
        let _ = writeln!(out, "# HELP {} {}", name, escape(family.get_help(), false));
    }
    let _ = writeln!(out, "# TYPE {} untyped", name);

    for metric in family.get_metric() {
        out.push_str(name);
        let labels = metric.get_label();
        if !labels.is_empty() {
            let pairs: Vec<String> = labels
                .iter()
                .map(|lp| format!("{}=\"{}\"", lp.get_name(), escape(lp.get_value(), true)))
                .collect();
            let _ = write!(out, "{{{}}}", pairs.join(","));
        }
        let _ = writeln!(out, " {}", metric.get_untyped().get_value());
    }
}

/// Encodes samples in the text exposition format.
pub fn render(samples: &[MetricSample]) -> Result<String, ExpositionError> {
    let encoder = TextEncoder::new();
    let mut out = String::new();

    for family in families(samples) {
        if family.get_field_type() == MetricType::UNTYPED {
            write_untyped(&family, &mut out);
        } else {
            let mut buffer = Vec::new();
            encoder.encode(std::slice::from_ref(&family), &mut buffer)?;
            out.push_str(&String::from_utf8(buffer)?);
        }
    }
    Ok(out)
}

/// Atomically replaces a textfile with the latest scrape.
pub struct TextfileWriter {
    path: PathBuf,
}

impl TextfileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TextfileWriter { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    pub async fn write(&self, samples: &[MetricSample]) -> Result<(), ExpositionError> {
        let body = render(samples)?;
        let temp = self.temp_path();

        tokio::fs::write(&temp, body.as_bytes()).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(
            "Wrote {} sample(s), {} bytes to {}",
            samples.len(),
            body.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Like `write`, but logs failures instead of returning them; the next
    /// scrape simply tries again.
    pub async fn write_safe(&self, samples: &[MetricSample]) {
        if let Err(e) = self.write(samples).await {
            error!("Failed to expose scrape at {}: {}", self.path.display(), e);
        }
    }
}
