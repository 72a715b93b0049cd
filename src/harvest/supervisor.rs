//! Worker pool over browser sessions.
//!
//! The supervisor is pure control flow: sessions come from a
//! [`SessionFactory`], authentication from an [`Authenticator`], and the
//! per-page work from a [`PageHarvester`].

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::PageHarvester;
use crate::browser::{BrowserSession, SessionFactory};
use crate::config::SupervisorConfig;
use crate::models::TargetPage;
use crate::session::Authenticator;

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub pages: usize,
    pub harvested: usize,
    pub failed: usize,
    /// Pages never attempted because their worker could not authenticate.
    pub abandoned: usize,
    /// Pages retried after a session-fatal failure.
    pub retried: usize,
    /// Posts inserted across all pages.
    pub appended: usize,
}

impl RunSummary {
    fn absorb(&mut self, other: &RunSummary) {
        self.pages += other.pages;
        self.harvested += other.harvested;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
        self.retried += other.retried;
        self.appended += other.appended;
    }
}

/// Observable state of the supervisor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunState {
    pub running: bool,
    pub runs: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_summary: Option<RunSummary>,
    /// Set when the last run ended without producing a summary.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

fn lock_state(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    // A poisoned lock still holds a usable state.
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Holds the running flag for the duration of a run. Dropping it, on
/// success, error or panic, clears the flag.
struct RunGuard {
    state: Arc<Mutex<RunState>>,
    summary: Option<RunSummary>,
}

impl RunGuard {
    fn acquire(state: &Arc<Mutex<RunState>>) -> Option<Self> {
        let mut current = lock_state(state);
        if current.running {
            return None;
        }
        current.running = true;
        current.runs += 1;
        current.started_at = Some(Utc::now());
        current.finished_at = None;
        drop(current);

        Some(Self {
            state: Arc::clone(state),
            summary: None,
        })
    }

    fn complete(&mut self, summary: RunSummary) {
        self.summary = Some(summary);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut state = lock_state(&self.state);
        state.running = false;
        state.finished_at = Some(Utc::now());
        match self.summary.take() {
            Some(summary) => {
                state.last_summary = Some(summary);
                state.last_error = None;
            }
            None => state.last_error = Some("run aborted before completion".to_string()),
        }
    }
}

/// Runs target pages across a pool of authenticated browser sessions.
pub struct WorkerSupervisor {
    factory: Arc<dyn SessionFactory>,
    authenticator: Arc<dyn Authenticator>,
    harvester: Arc<dyn PageHarvester>,
    config: SupervisorConfig,
    targets: Vec<TargetPage>,
    state: Arc<Mutex<RunState>>,
}

impl WorkerSupervisor {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        authenticator: Arc<dyn Authenticator>,
        harvester: Arc<dyn PageHarvester>,
        config: SupervisorConfig,
        targets: Vec<TargetPage>,
    ) -> Self {
        Self {
            factory,
            authenticator,
            harvester,
            config,
            targets,
            state: Arc::new(Mutex::new(RunState::default())),
        }
    }

    /// Snapshot of the current run state.
    pub fn state(&self) -> RunState {
        lock_state(&self.state).clone()
    }

    pub fn is_running(&self) -> bool {
        lock_state(&self.state).running
    }

    /// Start a run in the background unless one is in progress.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        let Some(guard) = RunGuard::acquire(&self.state) else {
            info!("Harvest already running, trigger ignored");
            return TriggerOutcome::AlreadyRunning;
        };

        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor.execute(guard).await;
        });
        TriggerOutcome::Started
    }

    /// Run to completion. Returns `None` if a run is already in progress.
    pub async fn run(&self) -> Option<RunSummary> {
        let guard = RunGuard::acquire(&self.state)?;
        Some(self.execute(guard).await)
    }

    /// Split targets round-robin into at most `workers` disjoint subsets.
    fn partition(&self) -> Vec<Vec<TargetPage>> {
        let workers = self.config.workers.max(1).min(self.targets.len());
        let mut subsets = vec![Vec::new(); workers];
        for (i, target) in self.targets.iter().enumerate() {
            subsets[i % workers].push(target.clone());
        }
        subsets
    }

    async fn execute(&self, mut guard: RunGuard) -> RunSummary {
        let subsets = self.partition();
        info!(
            pages = self.targets.len(),
            workers = subsets.len(),
            "Harvest run starting"
        );

        let mut handles = Vec::with_capacity(subsets.len());
        for (id, pages) in subsets.into_iter().enumerate() {
            let worker = Worker {
                id,
                factory: self.factory.clone(),
                authenticator: self.authenticator.clone(),
                harvester: self.harvester.clone(),
                config: self.config.clone(),
            };
            let assigned = pages.len();
            handles.push((assigned, tokio::spawn(worker.run(pages))));
        }

        let mut summary = RunSummary::default();
        for (id, (assigned, handle)) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(report) => summary.absorb(&report),
                Err(e) => {
                    error!(worker = id, "Worker crashed: {}", e);
                    summary.pages += assigned;
                    summary.failed += assigned;
                }
            }
        }

        info!(
            pages = summary.pages,
            harvested = summary.harvested,
            failed = summary.failed,
            abandoned = summary.abandoned,
            appended = summary.appended,
            "Harvest run finished"
        );
        guard.complete(summary.clone());
        summary
    }
}

/// One task driving one browser session over its pages.
struct Worker {
    id: usize,
    factory: Arc<dyn SessionFactory>,
    authenticator: Arc<dyn Authenticator>,
    harvester: Arc<dyn PageHarvester>,
    config: SupervisorConfig,
}

impl Worker {
    async fn run(self, pages: Vec<TargetPage>) -> RunSummary {
        let mut report = RunSummary {
            pages: pages.len(),
            ..Default::default()
        };

        let Some(mut session) = self.open_authenticated().await else {
            error!(worker = self.id, pages = pages.len(), "Authentication failed, abandoning pages");
            report.abandoned = pages.len();
            return report;
        };
        let mut since_open = 0usize;

        for (i, page) in pages.iter().enumerate() {
            if since_open >= self.config.recycle_every.max(1) {
                debug!(worker = self.id, "Recycling browser session");
                match self.reopen(session).await {
                    Some(fresh) => session = fresh,
                    None => {
                        report.abandoned += pages.len() - i;
                        return report;
                    }
                }
                since_open = 0;
            }
            since_open += 1;

            match self.harvester.harvest(session.as_ref(), page).await {
                Ok(page_report) => {
                    report.harvested += 1;
                    report.appended += page_report.scan.persisted;
                    continue;
                }
                Err(e) if !e.is_session_fatal() => {
                    warn!(worker = self.id, page = %page.url, "Page failed: {}", e);
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!(worker = self.id, page = %page.url, "Session lost: {}, retrying page", e);
                }
            }

            let Some(fresh) = self.reopen(session).await else {
                report.failed += 1;
                report.abandoned += pages.len() - i - 1;
                return report;
            };
            session = fresh;
            since_open = 1;
            report.retried += 1;

            match self.harvester.harvest(session.as_ref(), page).await {
                Ok(page_report) => {
                    report.harvested += 1;
                    report.appended += page_report.scan.persisted;
                }
                Err(e) => {
                    warn!(worker = self.id, page = %page.url, "Retry failed: {}", e);
                    report.failed += 1;
                    if e.is_session_fatal() {
                        // Force a fresh session before the next page.
                        since_open = usize::MAX;
                    }
                }
            }
        }

        close(self.id, session).await;
        report
    }

    /// Open a session and authenticate it, with linear backoff.
    async fn open_authenticated(&self) -> Option<Box<dyn BrowserSession>> {
        let attempts = self.config.auth_attempts.max(1);
        for attempt in 1..=attempts {
            match self.factory.open().await {
                Ok(session) => match self.authenticator.authenticate(session.as_ref()).await {
                    Ok(true) => {
                        debug!(worker = self.id, attempt, "Session authenticated");
                        return Some(session);
                    }
                    Ok(false) => {
                        warn!(worker = self.id, attempt, "Session not authenticated");
                        close(self.id, session).await;
                    }
                    Err(e) => {
                        warn!(worker = self.id, attempt, "Authentication error: {}", e);
                        close(self.id, session).await;
                    }
                },
                Err(e) => warn!(worker = self.id, attempt, "Could not open session: {}", e),
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.auth_backoff() * attempt).await;
            }
        }
        None
    }

    async fn reopen(&self, session: Box<dyn BrowserSession>) -> Option<Box<dyn BrowserSession>> {
        close(self.id, session).await;
        self.open_authenticated().await
    }
}

async fn close(worker: usize, session: Box<dyn BrowserSession>) {
    if let Err(e) = session.close().await {
        debug!(worker, "Session close failed: {}", e);
    }
}
