//! Per-source scrape → translate → send loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::SourceConfig;
use crate::model::TimeSeriesPoint;
use crate::scraper::Scrape;
use crate::sender::BatchSender;
use crate::tracker::CounterStateTracker;
use crate::translator::Translator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Scraping,
    Translating,
    Sending,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerPhase::Idle => "idle",
            WorkerPhase::Scraping => "scraping",
            WorkerPhase::Translating => "translating",
            WorkerPhase::Sending => "sending",
        };
        f.write_str(s)
    }
}

/// Summary of one cycle, mostly for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// False when the scrape failed and the cycle ended early.
    pub scraped: bool,
    pub families: usize,
    pub skipped_lines: usize,
    pub skipped_families: usize,
    pub skipped_points: usize,
    pub resets: usize,
    pub points: Vec<TimeSeriesPoint>,
    pub batches: usize,
    pub points_sent: usize,
    pub points_dropped: usize,
}

/// Drives one source. Owns its counter state, so two cycles of the same
/// source can never run at the same time.
pub struct SourceWorker {
    source: SourceConfig,
    scraper: Arc<dyn Scrape>,
    translator: Arc<Translator>,
    sender: Arc<BatchSender>,
    tracker: CounterStateTracker,
    phase: WorkerPhase,
    cycles: u64,
}

impl SourceWorker {
    pub fn new(
        source: SourceConfig,
        scraper: Arc<dyn Scrape>,
        translator: Arc<Translator>,
        sender: Arc<BatchSender>,
    ) -> Self {
        Self {
            source,
            scraper,
            translator,
            sender,
            tracker: CounterStateTracker::new(),
            phase: WorkerPhase::Idle,
            cycles: 0,
        }
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    pub fn tracker(&self) -> &CounterStateTracker {
        &self.tracker
    }

    fn enter(&mut self, phase: WorkerPhase) {
        tracing::trace!(source = %self.source.name, cycle = self.cycles, %phase, "phase change");
        self.phase = phase;
    }

    /// Runs a single Idle → Scraping → Translating → Sending → Idle pass.
    /// Errors are logged here and never returned.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            ..Default::default()
        };

        self.enter(WorkerPhase::Scraping);
        let scraped = match self.scraper.scrape(&self.source).await {
            Ok(scraped) => scraped,
            Err(e) => {
                tracing::warn!(
                    source = %self.source.name,
                    cycle = self.cycles,
                    "scrape failed: {e:?}"
                );
                self.enter(WorkerPhase::Idle);
                return report;
            }
        };
        report.scraped = true;
        report.families = scraped.families.len();
        report.skipped_lines = scraped.skipped_lines;

        self.enter(WorkerPhase::Translating);
        let translation =
            self.translator
                .translate(&self.source, &scraped.families, &mut self.tracker);
        report.skipped_families = translation.skipped_families;
        report.skipped_points = translation.skipped_points;
        report.resets = translation.resets;
        if report.skipped_lines + report.skipped_families + report.skipped_points > 0 {
            tracing::info!(
                source = %self.source.name,
                cycle = self.cycles,
                skipped_lines = report.skipped_lines,
                skipped_families = report.skipped_families,
                skipped_points = report.skipped_points,
                "skipped unusable metrics"
            );
        }
        if translation.resets > 0 {
            tracing::info!(
                source = %self.source.name,
                cycle = self.cycles,
                resets = translation.resets,
                "counter reset detected"
            );
        }

        self.enter(WorkerPhase::Sending);
        let sent = self.sender.send(&translation.points).await;
        report.batches = sent.batches;
        report.points_sent = sent.points_sent;
        report.points_dropped = sent.points_dropped();
        for failure in &sent.failures {
            tracing::warn!(
                source = %self.source.name,
                cycle = self.cycles,
                status = ?failure.current_context().status(),
                points = failure.current_context().points(),
                "failed to deliver batch: {failure:?}"
            );
        }
        report.points = translation.points;

        tracing::debug!(
            source = %self.source.name,
            cycle = self.cycles,
            families = report.families,
            points = report.points.len(),
            sent = report.points_sent,
            "cycle finished"
        );
        self.enter(WorkerPhase::Idle);
        report
    }

    /// Runs cycles every `period` until `token` is cancelled. A cycle in
    /// progress is allowed to finish.
    pub async fn run(mut self, period: Duration, token: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            source = %self.source.name,
            url = %self.source.url(),
            "starting source worker with period {:?}",
            period
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!(source = %self.source.name, "source worker shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
            }
        }

        tracing::info!(
            source = %self.source.name,
            cycles = self.cycles,
            "source worker stopped"
        );
    }
}
