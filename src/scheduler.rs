// Scheduler module - drives periodic scrapes
//
// One scrape first makes sure the topology labels are known, then runs every
// collector concurrently against the shared client, each under the scrape
// deadline. A collector that overruns is dropped (its in-flight database
// calls are cancelled with it) and contributes whatever it had already
// emitted. The combined samples, with (name, labels) unique across
// collectors, are then exposed through the textfile writer.
//
// # Architecture
// - Tokio interval timer for the scrape cadence
// - Collectors of one scrape run as concurrent futures, not spawned tasks
// - A slow or failing collector never delays the next scrape beyond its deadline

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ExporterSettings;
use crate::exposition::TextfileWriter;
use crate::metrics::Collector;
use crate::sample::{LabelSource, Labels, MetricKind, MetricSample, MetricSink, UniqueSink};
use crate::topology::TopologyLabels;

/// Periodic scrape driver.
pub struct ScrapeScheduler {
    collectors: Vec<Box<dyn Collector>>,
    topology: Arc<TopologyLabels>,
    writer: TextfileWriter,
    interval: Duration,
    deadline: Duration,
}

impl ScrapeScheduler {
    pub fn new(
        collectors: Vec<Box<dyn Collector>>,
        topology: Arc<TopologyLabels>,
        settings: &ExporterSettings,
    ) -> Self {
        ScrapeScheduler {
            collectors,
            topology,
            writer: TextfileWriter::new(settings.textfile_path.clone()),
            interval: settings.scrape_interval(),
            deadline: settings.scrape_timeout(),
        }
    }

    /// Runs one collector under the deadline.
    ///
    /// Always returns the collector's samples followed by one duration sample
    /// for self-monitoring.
    async fn run_collector(
        collector: &dyn Collector,
        deadline: Duration,
        base: &Labels,
    ) -> Vec<MetricSample> {
        let mut samples: Vec<MetricSample> = Vec::new();
        let started = Instant::now();

        if timeout(deadline, collector.collect(&mut samples)).await.is_err() {
            warn!(
                "Collector '{}' exceeded the {:?} scrape deadline; keeping {} sample(s)",
                collector.name(),
                deadline,
                samples.len()
            );
        }

        let elapsed = started.elapsed();
        debug!(
            "Collector '{}' produced {} sample(s) in {:?}",
            collector.name(),
            samples.len(),
            elapsed
        );

        let mut labels = base.clone();
        labels.insert("collector".to_string(), collector.name().to_string());
        samples.push(
            MetricSample::new(
                "mongodb_exporter_collector_scrape_duration_seconds",
                MetricKind::Gauge,
                labels,
                elapsed.as_secs_f64(),
            )
            .with_help("Time spent by one collector in the last scrape."),
        );
        samples
    }

    /// Runs every collector once and returns the combined samples.
    ///
    /// When two collectors report the same (name, labels), the one listed
    /// first wins.
    pub async fn scrape_once(&self) -> Vec<MetricSample> {
        if timeout(self.deadline, self.topology.refresh()).await.is_err() {
            warn!("Topology lookup exceeded the {:?} scrape deadline", self.deadline);
        }
        let base = self.topology.base_labels();

        let runs = self
            .collectors
            .iter()
            .map(|c| Self::run_collector(c.as_ref(), self.deadline, &base));
        let results = join_all(runs).await;

        let mut out = Vec::new();
        let mut unique = UniqueSink::new(&mut out);
        for sample in results.into_iter().flatten() {
            unique.emit(sample);
        }
        if unique.dropped() > 0 {
            debug!("Dropped {} sample(s) already reported by another collector", unique.dropped());
        }
        out
    }

    /// Single scrape followed by a textfile write.
    pub async fn run_once(&self) -> usize {
        let samples = self.scrape_once().await;
        self.writer.write_safe(&samples).await;
        info!(
            "Scrape complete: {} sample(s) written to {}",
            samples.len(),
            self.writer.path().display()
        );
        samples.len()
    }

    /// Scrapes forever at the configured interval.
    pub async fn start(self) {
        info!(
            "Starting scrape loop: {} collector(s), every {:?} (deadline {:?})",
            self.collectors.len(),
            self.interval,
            self.deadline
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let samples = self.scrape_once().await;
            self.writer.write_safe(&samples).await;
            debug!("Scrape exposed {} sample(s)", samples.len());
        }
    }
}
