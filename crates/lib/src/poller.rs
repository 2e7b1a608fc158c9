//! Fixed-interval status polling.
//!
//! The poller owns its tokio task: dropping it aborts the loop, so no poll fires
//! against a front end that has gone away. Each tick replaces the published report.

use crate::api::Backend;
use crate::status::StatusReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Background status poller. Polls once immediately, then every `interval`, until dropped.
pub struct StatusPoller {
    task: JoinHandle<()>,
    updates: watch::Receiver<StatusReport>,
}

impl StatusPoller {
    /// Start polling. Must be called from within a tokio runtime.
    pub fn spawn(backend: Arc<dyn Backend>, interval: Duration) -> Self {
        let (tx, updates) = watch::channel(StatusReport::initial());
        log::debug!("status poller: starting, interval {:?}", interval);
        let task = tokio::spawn(async move {
            run_poll_loop(backend, interval, tx).await;
        });
        Self { task, updates }
    }

    /// Most recent report (the initial "checking" report until the first poll lands).
    pub fn latest(&self) -> StatusReport {
        self.updates.borrow().clone()
    }

    /// The latest report if a poll has landed since the previous call, else None.
    pub fn take_update(&mut self) -> Option<StatusReport> {
        match self.updates.has_changed() {
            Ok(true) => Some(self.updates.borrow_and_update().clone()),
            _ => None,
        }
    }

    /// Wait for the next poll to land. Returns None if the loop has stopped.
    pub async fn wait_for_update(&mut self) -> Option<StatusReport> {
        self.updates.changed().await.ok()?;
        Some(self.updates.borrow_and_update().clone())
    }

    /// Stop polling now. Dropping the poller does the same.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.task.abort();
        log::debug!("status poller: stopped");
    }
}

/// One status request. Any failure becomes the local "cannot connect" fallback.
pub async fn poll_once(backend: &dyn Backend) -> StatusReport {
    match backend.status().await {
        Ok(snapshot) => StatusReport::reached(snapshot),
        Err(e) => {
            log::debug!("status poll failed: {}", e);
            StatusReport::unreachable()
        }
    }
}

async fn run_poll_loop(
    backend: Arc<dyn Backend>,
    interval: Duration,
    tx: watch::Sender<StatusReport>,
) {
    // First tick completes immediately.
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let report = poll_once(backend.as_ref()).await;
        tx.send_replace(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BackendError, ChatResponse, WhoAmI};
    use crate::status::{BackendState, StatusSnapshot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves queued status results in order, then repeats the last one.
    struct ScriptedStatus {
        script: Mutex<Vec<Result<StatusSnapshot, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedStatus {
        fn new(script: Vec<Result<StatusSnapshot, String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Backend for ScriptedStatus {
        async fn status(&self) -> Result<StatusSnapshot, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            next.map_err(BackendError::Api)
        }

        async fn whoami(&self) -> Result<WhoAmI, BackendError> {
            Err(BackendError::Api("unused".to_string()))
        }

        async fn chat(&self, _prompt: &str) -> Result<ChatResponse, BackendError> {
            Err(BackendError::Api("unused".to_string()))
        }
    }

    fn ready() -> StatusSnapshot {
        StatusSnapshot {
            ready: true,
            state: BackendState::Ready,
            message: "Ollama is ready".to_string(),
            backend_instance_id: Some("web-1".to_string()),
            model: Some("gemma:2b".to_string()),
        }
    }

    #[tokio::test]
    async fn poll_once_maps_failure_to_fallback() {
        let backend = ScriptedStatus::new(vec![Err("connection refused".to_string())]);
        let report = poll_once(backend.as_ref()).await;
        assert_eq!(report, StatusReport::unreachable());
        assert_eq!(report.snapshot.message, "Cannot connect to backend.");
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_on_interval() {
        let backend = ScriptedStatus::new(vec![Ok(ready())]);
        let mut poller = StatusPoller::spawn(backend.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.calls(), 1);
        let first = poller.take_update().expect("first poll published");
        assert!(first.reached);
        assert!(poller.take_update().is_none());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.calls(), 2);
        assert!(poller.take_update().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_does_not_stop_polling() {
        let backend = ScriptedStatus::new(vec![Err("down".to_string()), Ok(ready())]);
        let poller = StatusPoller::spawn(backend.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(poller.latest(), StatusReport::unreachable());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.calls(), 2);
        let latest = poller.latest();
        assert!(latest.reached);
        assert_eq!(latest.snapshot, ready());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_poller_cancels_the_timer() {
        let backend = ScriptedStatus::new(vec![Ok(ready())]);
        let poller = StatusPoller::spawn(backend.clone(), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.calls(), 1);

        drop(poller);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.calls(), 1);
    }
}
