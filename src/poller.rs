use std::sync::Arc;

use tracing::{info, warn};

use crate::browser::{PageDriver, SessionProvider};
use crate::clock::Clock;
use crate::config::{Selectors, Timing};
use crate::error::Result;
use crate::odds::capture_totals;
use crate::store::SnapshotWriter;
use crate::types::{format_ts, OddsSnapshot, PollJob, TotalsOutcome};

/// Characters of the totals string echoed to the log per tick.
const LOG_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Waiting,
    Polling,
    Done,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub ticks: usize,
    pub failed_ticks: usize,
    pub unsaved_rows: usize,
}

/// Samples one match's totals between `job.start` and `job.end`.
///
/// Owns a private browser session (opened lazily, reopened after a failed
/// tick) and the match's snapshot series. Each tick appends exactly one row,
/// failures included. Runs once; nothing restarts it.
pub struct PollingWorker<P: SessionProvider> {
    job: PollJob,
    provider: P,
    page: Option<P::Page>,
    writer: SnapshotWriter,
    clock: Arc<dyn Clock>,
    selectors: Selectors,
    timing: Timing,
    phase: PollPhase,
}

impl<P: SessionProvider> PollingWorker<P> {
    pub fn new(
        job: PollJob,
        provider: P,
        writer: SnapshotWriter,
        clock: Arc<dyn Clock>,
        selectors: Selectors,
        timing: Timing,
    ) -> Self {
        Self {
            job,
            provider,
            page: None,
            writer,
            clock,
            selectors,
            timing,
            phase: PollPhase::Waiting,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub async fn run(mut self) -> PollSummary {
        info!(url = %self.job.url, "Waiting for start at {}", format_ts(self.job.start));
        while self.clock.now() < self.job.start {
            self.clock.sleep(self.timing.wait_check).await;
        }

        self.phase = PollPhase::Polling;
        info!(
            url = %self.job.url,
            file = %self.writer.path().display(),
            "Parsing started from {} to {} every {}s",
            format_ts(self.job.start),
            format_ts(self.job.end),
            self.timing.poll_interval.as_secs(),
        );

        let mut summary = PollSummary::default();
        while self.clock.now() <= self.job.end {
            let snapshot = self.tick(&mut summary).await;

            let preview: String = snapshot.totals.chars().take(LOG_PREVIEW_CHARS).collect();
            info!(url = %self.job.url, "[{}] Saving: {}...", snapshot.timestamp, preview);
            if let Err(e) = self.writer.append(&snapshot) {
                summary.unsaved_rows += 1;
                warn!(url = %self.job.url, "Error writing snapshot: {e}");
            }

            self.clock.sleep(self.timing.poll_interval).await;
        }

        self.phase = PollPhase::Done;
        if let Some(mut page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Closing polling session failed: {e}");
            }
        }
        info!(
            url = %self.job.url,
            ticks = summary.ticks,
            failed = summary.failed_ticks,
            unsaved = summary.unsaved_rows,
            phase = ?self.phase(),
            "Finished at {}",
            format_ts(self.clock.now()),
        );
        summary
    }

    /// One capture. Page errors become a failure row and drop the session.
    async fn tick(&mut self, summary: &mut PollSummary) -> OddsSnapshot {
        let captured_at = self.clock.now();
        summary.ticks += 1;
        let outcome = match self.capture().await {
            Ok(outcome) => outcome,
            Err(e) => {
                summary.failed_ticks += 1;
                if let Some(mut page) = self.page.take() {
                    if let Err(close_err) = page.close().await {
                        warn!(url = %self.job.url, "Closing failed polling session: {close_err}");
                    }
                }
                TotalsOutcome::Failed(e.first_line())
            }
        };
        OddsSnapshot::capture(captured_at, &self.job.url, &outcome)
    }

    async fn capture(&mut self) -> Result<TotalsOutcome> {
        let page = match self.page.take() {
            Some(page) => self.page.insert(page),
            None => self.page.insert(self.provider.open().await?),
        };
        capture_totals(
            page,
            &self.job.url,
            &self.selectors,
            &self.timing,
            self.clock.as_ref(),
        )
        .await
    }
}
