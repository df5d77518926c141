use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::Timing;
use crate::discovery::Discovery;
use crate::error::{AppError, Result};
use crate::store::MatchRegistry;
use crate::types::{format_ts, MatchStatus, PollJob};

// ---------------------------------------------------------------------------
// Launching
// ---------------------------------------------------------------------------

/// Receipt for a started polling worker. Nothing awaits it today; it is the
/// hook for supervision (restart on crash, completion callbacks).
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub url: String,
    pub pid: Option<u32>,
    pub launched_at: NaiveDateTime,
}

pub trait Launcher: Send + Sync {
    /// Start a worker for `job` and return once the start is confirmed.
    fn launch(&self, job: &PollJob) -> Result<JobHandle>;
}

/// Starts each worker as its own OS process: `<program> poll --url .. --start .. --end ..`.
pub struct ProcessLauncher {
    program: PathBuf,
    clock: Arc<dyn Clock>,
}

impl ProcessLauncher {
    pub fn new(program: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self { program, clock }
    }

    /// Re-executes the running binary unless `program` overrides it.
    pub fn from_config(program: Option<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let program = match program {
            Some(p) => p,
            None => std::env::current_exe()?,
        };
        Ok(Self::new(program, clock))
    }

    pub fn args(job: &PollJob) -> Vec<String> {
        vec![
            "poll".to_string(),
            "--url".to_string(),
            job.url.clone(),
            "--start".to_string(),
            format_ts(job.start),
            "--end".to_string(),
            format_ts(job.end),
        ]
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, job: &PollJob) -> Result<JobHandle> {
        // The child is never awaited; tokio reaps it once it exits.
        let child = Command::new(&self.program)
            .args(Self::args(job))
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| AppError::LaunchFailure {
                url: job.url.clone(),
                reason: e.to_string(),
            })?;

        Ok(JobHandle {
            url: job.url.clone(),
            pid: child.id(),
            launched_at: self.clock.now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub loaded: usize,
    pub scheduled: usize,
    pub skipped_unparseable: usize,
    pub launch_failures: usize,
    pub persisted: bool,
}

/// Top-level control loop: discover, then launch one polling worker per
/// eligible match and persist the status flips.
///
/// A status flips only after its launch is confirmed, and the registry is
/// written once per cycle after every flip is decided. A crash between a
/// launch and that write re-launches the match next cycle (at-least-once).
/// Discovery and the registry write run in the same loop iteration, so the
/// registry needs no locking; any parallelism here must add it.
pub struct SchedulingOrchestrator<D: Discovery, L: Launcher> {
    discovery: D,
    launcher: L,
    registry: MatchRegistry,
    timing: Timing,
    clock: Arc<dyn Clock>,
}

impl<D: Discovery, L: Launcher> SchedulingOrchestrator<D, L> {
    pub fn new(
        discovery: D,
        launcher: L,
        registry: MatchRegistry,
        timing: Timing,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { discovery, launcher, registry, timing, clock }
    }

    pub async fn run(self) {
        loop {
            info!("Start processing matches");
            if let Err(e) = self.cycle().await {
                error!("Scheduling cycle failed: {e}");
            }
            info!(
                "Sleeping for {}s before next cycle",
                self.timing.cycle_interval.as_secs()
            );
            self.clock.sleep(self.timing.cycle_interval).await;
        }
    }

    /// Discovery followed by scheduling. A failed discovery pass ends the
    /// cycle before the registry is read.
    pub async fn cycle(&self) -> Result<CycleReport> {
        match self.discovery.run_pass().await {
            Ok(stats) => info!(added = stats.added, "Successfully parsed new matches"),
            Err(e) => {
                error!("Error while parsing matches: {e}");
                return Ok(CycleReport::default());
            }
        }
        self.schedule_pending()
    }

    /// Launch workers for every eligible match with a readable start time.
    pub fn schedule_pending(&self) -> Result<CycleReport> {
        let mut matches = match self.registry.load_all() {
            Ok(m) => m,
            Err(AppError::StoreMissing(path)) => {
                info!("Registry {} not found, nothing to schedule", path.display());
                return Ok(CycleReport::default());
            }
            Err(e) => return Err(e),
        };

        let mut report = CycleReport {
            loaded: matches.len(),
            ..CycleReport::default()
        };
        info!("Loaded {} matches", matches.len());

        for m in matches.iter_mut().filter(|m| m.status.is_eligible()) {
            let Some(start) = m.schedule.start() else {
                debug!(url = %m.url, schedule = %m.schedule, "Unreadable schedule, left for follow-up");
                report.skipped_unparseable += 1;
                continue;
            };

            let job = PollJob::for_start(
                &m.url,
                start,
                self.timing.pre_roll,
                self.timing.event_duration,
            );
            match self.launcher.launch(&job) {
                Ok(handle) => {
                    info!(
                        url = %handle.url,
                        pid = ?handle.pid,
                        launched_at = %format_ts(handle.launched_at),
                        "Process created: {} (start {}, end {})",
                        handle.url,
                        format_ts(job.start),
                        format_ts(job.end),
                    );
                    m.status = MatchStatus::Scheduled;
                    report.scheduled += 1;
                }
                Err(e) => {
                    warn!(url = %m.url, "Error processing match: {e}");
                    report.launch_failures += 1;
                }
            }
        }

        if report.scheduled == 0 {
            info!("No matches were updated");
            return Ok(report);
        }

        self.registry.rewrite_all(&matches)?;
        report.persisted = true;
        info!(scheduled = report.scheduled, "Registry {} updated", self.registry.path().display());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::discovery::DiscoveryStats;
    use crate::types::{parse_ts, Match, Schedule};

    /// Appends a fixed batch each pass, or fails.
    struct StubDiscovery {
        registry: MatchRegistry,
        batch: Vec<Match>,
        fail: bool,
    }

    #[async_trait]
    impl Discovery for StubDiscovery {
        async fn run_pass(&self) -> Result<DiscoveryStats> {
            if self.fail {
                return Err(AppError::RenderTimeout {
                    locator: "category".to_string(),
                    timeout_ms: 20_000,
                });
            }
            let added = self.registry.append_new(&self.batch)?;
            Ok(DiscoveryStats { added, ..DiscoveryStats::default() })
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        jobs: Mutex<Vec<PollJob>>,
        refuse: HashSet<String>,
    }

    impl Launcher for &RecordingLauncher {
        fn launch(&self, job: &PollJob) -> Result<JobHandle> {
            if self.refuse.contains(&job.url) {
                return Err(AppError::LaunchFailure {
                    url: job.url.clone(),
                    reason: "No such file or directory".to_string(),
                });
            }
            self.jobs.lock().unwrap().push(job.clone());
            Ok(JobHandle {
                url: job.url.clone(),
                pid: Some(4242),
                launched_at: job.start,
            })
        }
    }

    fn m(url: &str, schedule: &str) -> Match {
        Match::discovered("A vs B".into(), url.into(), Schedule::from(schedule.to_string()))
    }

    fn orchestrator<'a>(
        dir: &tempfile::TempDir,
        batch: Vec<Match>,
        fail: bool,
        launcher: &'a RecordingLauncher,
    ) -> SchedulingOrchestrator<StubDiscovery, &'a RecordingLauncher> {
        let registry = MatchRegistry::new(dir.path().join("matches.csv"));
        let clock = Arc::new(ManualClock::at(parse_ts("2024-03-10 08:00:00").unwrap()));
        SchedulingOrchestrator::new(
            StubDiscovery { registry: registry.clone(), batch, fail },
            launcher,
            registry,
            Timing::default(),
            clock,
        )
    }

    #[tokio::test]
    async fn schedules_eligible_matches_once() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        let orch = orchestrator(
            &dir,
            vec![m("https://x/1", "2024-03-10 19:30:00"), m("https://x/2", "unknown")],
            false,
            &launcher,
        );

        let report = orch.cycle().await.unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.skipped_unparseable, 1);
        assert!(report.persisted);

        let jobs = launcher.jobs.lock().unwrap().clone();
        assert_eq!(
            jobs,
            vec![PollJob {
                url: "https://x/1".into(),
                start: parse_ts("2024-03-10 19:20:00").unwrap(),
                end: parse_ts("2024-03-10 20:50:00").unwrap(),
            }]
        );

        // Later cycles neither relaunch nor promote the unreadable one.
        for _ in 0..3 {
            let report = orch.cycle().await.unwrap();
            assert_eq!(report.scheduled, 0);
            assert!(!report.persisted);
        }
        assert_eq!(launcher.jobs.lock().unwrap().len(), 1);

        let stored = orch.registry.load_all().unwrap();
        assert_eq!(stored[0].status, MatchStatus::Scheduled);
        assert_eq!(stored[1].status, MatchStatus::Undetermined);
        assert_eq!(stored[1].schedule.to_string(), "unknown");
    }

    #[tokio::test]
    async fn failed_launch_stays_eligible() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = RecordingLauncher::default();
        launcher.refuse.insert("https://x/1".to_string());
        let orch = orchestrator(
            &dir,
            vec![m("https://x/1", "2024-03-10 19:30:00"), m("https://x/2", "2024-03-10 21:00:00")],
            false,
            &launcher,
        );

        let report = orch.cycle().await.unwrap();
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.launch_failures, 1);

        let stored = orch.registry.load_all().unwrap();
        assert_eq!(stored[0].status, MatchStatus::Undetermined);
        assert_eq!(stored[1].status, MatchStatus::Scheduled);
    }

    #[tokio::test]
    async fn discovery_failure_leaves_registry_alone() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        let orch = orchestrator(&dir, vec![m("https://x/1", "2024-03-10 19:30:00")], true, &launcher);

        let report = orch.cycle().await.unwrap();
        assert_eq!(report, CycleReport::default());
        assert!(!dir.path().join("matches.csv").exists());
        assert!(launcher.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn past_start_is_still_scheduled() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        let orch = orchestrator(&dir, vec![m("https://x/old", "2020-01-01 12:00:00")], false, &launcher);

        assert_eq!(orch.cycle().await.unwrap().scheduled, 1);
        assert_eq!(
            launcher.jobs.lock().unwrap()[0].end,
            parse_ts("2020-01-01 13:20:00").unwrap()
        );
    }

    #[tokio::test]
    async fn failed_rewrite_ends_cycle_without_flipping_status() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        let orch = orchestrator(&dir, vec![m("https://x/1", "2024-03-10 19:30:00")], false, &launcher);
        // The temp file cannot be created, so the atomic rewrite fails.
        std::fs::create_dir(dir.path().join("matches.csv.tmp")).unwrap();

        let err = orch.cycle().await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable { .. }), "got {err}");
        assert_eq!(launcher.jobs.lock().unwrap().len(), 1);

        let stored = orch.registry.load_all().unwrap();
        assert_eq!(stored[0].status, MatchStatus::Undetermined);
    }

    #[test]
    fn unreadable_registry_propagates_and_launches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        let orch = orchestrator(&dir, vec![], false, &launcher);
        std::fs::write(
            dir.path().join("matches.csv"),
            "title,url,schedule,status\nA vs B,https://x/1\n",
        )
        .unwrap();

        let err = orch.schedule_pending().unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable { .. }), "got {err}");
        assert!(launcher.jobs.lock().unwrap().is_empty());
    }

    #[test]
    fn handled_statuses_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = RecordingLauncher::default();
        let orch = orchestrator(&dir, vec![], false, &launcher);
        let mut done = m("https://x/5", "2024-03-10 19:30:00");
        done.status = MatchStatus::Other("Finished".to_string());
        orch.registry.rewrite_all(&[done]).unwrap();

        let report = orch.schedule_pending().unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.scheduled, 0);
        assert!(launcher.jobs.lock().unwrap().is_empty());
    }

    #[test]
    fn worker_arguments_follow_launch_contract() {
        let job = PollJob::for_start(
            "https://x/1",
            parse_ts("2024-03-10 19:30:00").unwrap(),
            chrono::Duration::minutes(10),
            chrono::Duration::minutes(80),
        );
        assert_eq!(
            ProcessLauncher::args(&job),
            [
                "poll",
                "--url",
                "https://x/1",
                "--start",
                "2024-03-10 19:20:00",
                "--end",
                "2024-03-10 20:50:00",
            ]
        );
    }
}
