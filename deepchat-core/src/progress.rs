//! Deep-analysis progress tracking.
//!
//! [`AnalysisTracker`] owns the analysis state of one session view. While the
//! remote job runs, a spawned task polls the status endpoint on a fixed
//! interval and publishes [`AnalysisSnapshot`]s on a `watch` channel. The task
//! is controlled through a [`PollHandle`]: it stops on a terminal status, on
//! [`PollHandle::cancel`], or when the handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::AnalysisBackend;
use crate::error::DeepchatError;
use crate::models::{AnalysisPhase, AnalysisStatus};
use crate::notify::Notifier;

/// Progress shown while there is no KPI breakdown yet.
pub const NOMINAL_PROGRESS: f64 = 10.0;

/// Ceiling for KPI-derived progress; the rest is reserved for completion.
pub const KPI_PROGRESS_CAP: f64 = 90.0;

pub const COMPLETE_PROGRESS: f64 = 100.0;

/// Coarse progress percentage for a status.
///
/// No status or no KPI list gives [`NOMINAL_PROGRESS`]; a completed job gives
/// 100; otherwise `min(90, completed / total * 90)`.
pub fn estimate_progress(status: Option<&AnalysisStatus>) -> f64 {
    let Some(status) = status else {
        return NOMINAL_PROGRESS;
    };
    if status.phase() == AnalysisPhase::Complete {
        return COMPLETE_PROGRESS;
    }
    if status.kpi_list.is_empty() {
        return NOMINAL_PROGRESS;
    }

    let completed = status.completed_kpis() as f64;
    let total = status.kpi_list.len() as f64;
    (completed / total * KPI_PROGRESS_CAP).min(KPI_PROGRESS_CAP)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSnapshot {
    pub phase: AnalysisPhase,
    pub status: Option<AnalysisStatus>,
    pub progress: f64,
}

impl AnalysisSnapshot {
    fn not_started() -> Self {
        Self {
            phase: AnalysisPhase::NotStarted,
            status: None,
            progress: 0.0,
        }
    }

    fn from_status(status: AnalysisStatus) -> Self {
        Self {
            phase: status.phase(),
            progress: estimate_progress(Some(&status)),
            status: Some(status),
        }
    }

    pub fn report_url(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.report_url.as_deref())
    }
}

// ============================================================================
// PollHandle
// ============================================================================

/// Handle to a running poll task. Dropping it cancels the task.
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop polling. No status request starts after this returns.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the task to exit (terminal status or cancellation).
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Analysis poll task ended abnormally");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ============================================================================
// AnalysisTracker
// ============================================================================

pub struct AnalysisTracker {
    backend: Arc<dyn AnalysisBackend>,
    notifier: Arc<dyn Notifier>,
    session_id: String,
    poll_interval: Duration,
    state: Arc<watch::Sender<AnalysisSnapshot>>,
}

impl AnalysisTracker {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        notifier: Arc<dyn Notifier>,
        session_id: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        let (tx, _rx) = watch::channel(AnalysisSnapshot::not_started());
        Self {
            backend,
            notifier,
            session_id: session_id.into(),
            poll_interval,
            state: Arc::new(tx),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.state.subscribe()
    }

    /// View load: look for an existing analysis. A non-terminal one puts the
    /// tracker into Running and starts polling. Lookup errors are treated as
    /// "no analysis yet".
    pub async fn resume(&self) -> Option<PollHandle> {
        let status = match self.backend.analysis_status(&self.session_id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                tracing::debug!(session_id = %self.session_id, "No existing analysis");
                return None;
            }
            Err(e) => {
                tracing::debug!(session_id = %self.session_id, error = %e, "Existing analysis lookup failed");
                return None;
            }
        };

        let snapshot = AnalysisSnapshot::from_status(status);
        let running = !snapshot.phase.is_terminal();
        self.state.send_replace(snapshot);

        running.then(|| self.spawn_poller())
    }

    /// Explicit start. Notifies on success and on failure.
    pub async fn start(&self) -> Result<PollHandle, DeepchatError> {
        if let Err(e) = self.backend.start_analysis(&self.session_id).await {
            tracing::warn!(session_id = %self.session_id, error = %e, "Failed to start deep analysis");
            self.notifier
                .error(&e.user_message("Failed to start deep analysis"));
            return Err(e);
        }

        self.state.send_replace(AnalysisSnapshot {
            phase: AnalysisPhase::Running,
            status: None,
            progress: NOMINAL_PROGRESS,
        });
        self.notifier.success("Deep analysis started!");
        tracing::info!(session_id = %self.session_id, "Deep analysis started");

        Ok(self.spawn_poller())
    }

    fn spawn_poller(&self) -> PollHandle {
        let token = CancellationToken::new();
        let poller = Poller {
            backend: self.backend.clone(),
            notifier: self.notifier.clone(),
            session_id: self.session_id.clone(),
            poll_interval: self.poll_interval,
            state: self.state.clone(),
            token: token.clone(),
        };
        let task = tokio::spawn(poller.run());
        PollHandle {
            token,
            task: Some(task),
        }
    }
}

/// State moved into the spawned poll task.
struct Poller {
    backend: Arc<dyn AnalysisBackend>,
    notifier: Arc<dyn Notifier>,
    session_id: String,
    poll_interval: Duration,
    state: Arc<watch::Sender<AnalysisSnapshot>>,
    token: CancellationToken,
}

impl Poller {
    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            session_id = %self.session_id,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Analysis polling started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                res = self.backend.analysis_status(&self.session_id) => res,
            };

            let status = match fetched {
                Ok(Some(status)) => status,
                Ok(None) => continue,
                Err(e) => {
                    // Transient; the next tick tries again.
                    tracing::debug!(session_id = %self.session_id, error = %e, "Analysis poll failed");
                    continue;
                }
            };

            let snapshot = AnalysisSnapshot::from_status(status);
            let phase = snapshot.phase;
            self.state.send_replace(snapshot);

            match phase {
                AnalysisPhase::Complete => {
                    self.notifier.success("Deep analysis completed successfully!");
                    tracing::info!(session_id = %self.session_id, "Deep analysis complete");
                    self.token.cancel();
                    break;
                }
                AnalysisPhase::Failed => {
                    self.notifier.error("Deep analysis failed. Please try again.");
                    tracing::warn!(session_id = %self.session_id, "Deep analysis failed");
                    self.token.cancel();
                    break;
                }
                AnalysisPhase::Running | AnalysisPhase::NotStarted => {}
            }
        }

        tracing::debug!(session_id = %self.session_id, "Analysis polling stopped");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::{STATUS_COMPLETE, STATUS_FAILED};
    use crate::models::KpiState;
    use crate::notify::RecordingNotifier;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const TICK: Duration = Duration::from_millis(10);

    fn status(label: &str, kpis: &[(&str, i64)]) -> AnalysisStatus {
        AnalysisStatus {
            status: label.to_string(),
            kpi_list: kpis.iter().map(|(n, _)| n.to_string()).collect(),
            kpi_status: kpis
                .iter()
                .map(|(n, s)| (n.to_string(), KpiState::from(*s)))
                .collect::<HashMap<_, _>>(),
            report_url: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Backend replaying a scripted sequence of status responses; the last
    /// entry repeats once the script runs out.
    struct ScriptedBackend {
        start_result: Mutex<Option<DeepchatError>>,
        script: Mutex<VecDeque<Result<Option<AnalysisStatus>, DeepchatError>>>,
        last: Mutex<Option<AnalysisStatus>>,
        status_calls: AtomicUsize,
        start_calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<Option<AnalysisStatus>, DeepchatError>>) -> Arc<Self> {
            Arc::new(Self {
                start_result: Mutex::new(None),
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                status_calls: AtomicUsize::new(0),
                start_calls: AtomicUsize::new(0),
            })
        }

        fn failing_start(err: DeepchatError) -> Arc<Self> {
            let backend = Self::new(vec![]);
            *backend.start_result.lock().unwrap() = Some(err);
            backend
        }

        fn status_calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalysisBackend for ScriptedBackend {
        async fn start_analysis(&self, _session_id: &str) -> Result<(), DeepchatError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            match self.start_result.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn analysis_status(
            &self,
            _session_id: &str,
        ) -> Result<Option<AnalysisStatus>, DeepchatError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(s)) => {
                    *self.last.lock().unwrap() = s.clone();
                    Ok(s)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }
    }

    fn tracker(backend: Arc<ScriptedBackend>, notifier: Arc<RecordingNotifier>) -> AnalysisTracker {
        AnalysisTracker::new(backend, notifier, "s-1", TICK)
    }

    // --- estimate_progress ---

    #[test]
    fn test_progress_nominal_without_kpis() {
        assert_eq!(estimate_progress(None), 10.0);
        let empty = status("Deep Analysis Started", &[]);
        assert_eq!(estimate_progress(Some(&empty)), 10.0);
    }

    #[test]
    fn test_progress_scales_with_completed_kpis() {
        let s = status(
            "Deep Analysis KPI List Generated",
            &[("a", 1), ("b", -1), ("c", 0), ("d", 0)],
        );
        assert_eq!(estimate_progress(Some(&s)), 45.0);

        let none_done = status("Deep Analysis KPI List Generated", &[("a", 0), ("b", 0)]);
        assert_eq!(estimate_progress(Some(&none_done)), 0.0);
    }

    #[test]
    fn test_progress_caps_at_90_until_complete() {
        let all_done = status("Deep Analysis KPI List Generated", &[("a", 1), ("b", 1)]);
        assert_eq!(estimate_progress(Some(&all_done)), 90.0);

        let complete = status(STATUS_COMPLETE, &[("a", 0), ("b", 0)]);
        assert_eq!(estimate_progress(Some(&complete)), 100.0);

        let complete_no_kpis = status(STATUS_COMPLETE, &[]);
        assert_eq!(estimate_progress(Some(&complete_no_kpis)), 100.0);
    }

    // --- tracker ---

    #[tokio::test]
    async fn test_start_notifies_and_polls_until_complete() {
        let backend = ScriptedBackend::new(vec![
            Ok(Some(status("Deep Analysis Started", &[]))),
            Ok(Some(status("Deep Analysis KPI List Generated", &[("a", 1), ("b", 0)]))),
            Ok(Some(status(STATUS_COMPLETE, &[("a", 1), ("b", 1)]))),
        ]);
        let notifier = Arc::new(RecordingNotifier::new());
        let tracker = tracker(backend.clone(), notifier.clone());

        let handle = tracker.start().await.unwrap();
        assert_eq!(tracker.snapshot().phase, AnalysisPhase::Running);
        assert_eq!(tracker.snapshot().progress, NOMINAL_PROGRESS);

        handle.finished().await;

        let snap = tracker.snapshot();
        assert_eq!(snap.phase, AnalysisPhase::Complete);
        assert_eq!(snap.progress, 100.0);
        assert_eq!(backend.status_calls(), 3);
        assert_eq!(
            notifier.successes(),
            vec![
                "Deep analysis started!".to_string(),
                "Deep analysis completed successfully!".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_poll_errors_are_silent() {
        let backend = ScriptedBackend::new(vec![
            Err(DeepchatError::Api {
                status: 502,
                detail: None,
            }),
            Ok(None),
            Err(DeepchatError::Validation("boom".to_string())),
            Ok(Some(status(STATUS_FAILED, &[]))),
        ]);
        let notifier = Arc::new(RecordingNotifier::new());
        let tracker = tracker(backend.clone(), notifier.clone());

        tracker.start().await.unwrap().finished().await;

        assert_eq!(tracker.snapshot().phase, AnalysisPhase::Failed);
        assert_eq!(backend.status_calls(), 4);
        assert_eq!(
            notifier.errors(),
            vec!["Deep analysis failed. Please try again.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_start_notifies_and_does_not_poll() {
        let backend = ScriptedBackend::failing_start(DeepchatError::Api {
            status: 404,
            detail: Some("Session not found".to_string()),
        });
        let notifier = Arc::new(RecordingNotifier::new());
        let tracker = tracker(backend.clone(), notifier.clone());

        assert!(tracker.start().await.is_err());
        tokio::time::sleep(TICK * 5).await;

        assert_eq!(tracker.snapshot().phase, AnalysisPhase::NotStarted);
        assert_eq!(backend.status_calls(), 0);
        assert_eq!(notifier.errors(), vec!["Session not found".to_string()]);
    }

    #[tokio::test]
    async fn test_resume_running_analysis_starts_polling() {
        let backend = ScriptedBackend::new(vec![
            Ok(Some(status("Deep Analysis KPI List Generated", &[("a", 1), ("b", 0)]))),
            Ok(Some(status(STATUS_COMPLETE, &[("a", 1), ("b", 1)]))),
        ]);
        let notifier = Arc::new(RecordingNotifier::new());
        let tracker = tracker(backend.clone(), notifier.clone());

        let handle = tracker.resume().await.expect("running analysis resumes polling");
        assert_eq!(tracker.snapshot().phase, AnalysisPhase::Running);
        assert_eq!(tracker.snapshot().progress, 45.0);

        handle.finished().await;
        assert_eq!(tracker.snapshot().phase, AnalysisPhase::Complete);
    }

    #[tokio::test]
    async fn test_resume_freshly_uploaded_analysis_with_null_kpis() {
        let early: AnalysisStatus = serde_json::from_value(serde_json::json!({
            "status": "Deep Analysis File Uploaded",
            "kpi_list": null,
            "report_url": null
        }))
        .unwrap();
        let backend = ScriptedBackend::new(vec![
            Ok(Some(early)),
            Ok(Some(status(STATUS_COMPLETE, &[("a", 1)]))),
        ]);
        let notifier = Arc::new(RecordingNotifier::new());
        let tracker = tracker(backend.clone(), notifier.clone());

        let handle = tracker
            .resume()
            .await
            .expect("a job with no KPIs yet is still running");
        let snap = tracker.snapshot();
        assert_eq!(snap.phase, AnalysisPhase::Running);
        assert_eq!(snap.progress, NOMINAL_PROGRESS);

        handle.finished().await;
        assert_eq!(tracker.snapshot().phase, AnalysisPhase::Complete);
    }

    #[tokio::test]
    async fn test_resume_terminal_or_missing_does_not_poll() {
        let done = ScriptedBackend::new(vec![Ok(Some(status(STATUS_COMPLETE, &[])))]);
        let tracker_done = tracker(done.clone(), Arc::new(RecordingNotifier::new()));
        assert!(tracker_done.resume().await.is_none());
        assert_eq!(tracker_done.snapshot().phase, AnalysisPhase::Complete);

        let missing = ScriptedBackend::new(vec![Ok(None)]);
        let tracker_missing = tracker(missing.clone(), Arc::new(RecordingNotifier::new()));
        assert!(tracker_missing.resume().await.is_none());
        assert_eq!(tracker_missing.snapshot().phase, AnalysisPhase::NotStarted);

        tokio::time::sleep(TICK * 5).await;
        assert_eq!(done.status_calls(), 1);
        assert_eq!(missing.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_further_polls() {
        let backend = ScriptedBackend::new(vec![Ok(Some(status("Deep Analysis Started", &[])))]);
        let notifier = Arc::new(RecordingNotifier::new());
        let tracker = tracker(backend.clone(), notifier.clone());

        let handle = tracker.start().await.unwrap();
        tokio::time::sleep(TICK * 4).await;
        handle.cancel();
        assert!(handle.is_cancelled());
        handle.finished().await;

        let calls = backend.status_calls();
        assert!(calls >= 1, "expected at least one poll before cancel");
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(backend.status_calls(), calls);
        assert_eq!(tracker.snapshot().phase, AnalysisPhase::Running);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_polling() {
        let backend = ScriptedBackend::new(vec![Ok(Some(status("Deep Analysis Started", &[])))]);
        let tracker = tracker(backend.clone(), Arc::new(RecordingNotifier::new()));

        let handle = tracker.start().await.unwrap();
        drop(handle);
        tokio::time::sleep(TICK * 5).await;

        assert_eq!(backend.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_progress_updates() {
        let backend = ScriptedBackend::new(vec![
            Ok(Some(status("Deep Analysis KPI List Generated", &[("a", 1), ("b", 0)]))),
            Ok(Some(status(STATUS_COMPLETE, &[("a", 1), ("b", 1)]))),
        ]);
        let tracker = tracker(backend, Arc::new(RecordingNotifier::new()));
        let mut rx = tracker.subscribe();

        let handle = tracker.start().await.unwrap();
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let snap = rx.borrow_and_update().clone();
            seen.push(snap.progress);
            if snap.phase.is_terminal() {
                break;
            }
        }
        handle.finished().await;

        assert_eq!(seen.last().copied(), Some(100.0));
        assert!(seen.iter().all(|p| *p <= 100.0));
    }
}
