//! Self-rescheduling periodic task.

use core::{future::Future, time::Duration};

use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, debug, warn};

/// Runs an async task repeatedly with a fixed gap between the end of one run and the
/// start of the next, so runs of the same task never overlap.
///
/// Stopping prevents any further runs but never interrupts one that is in progress.
/// Dropping the handle stops the loop as well.
#[derive(Debug)]
pub struct RepeatingTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTask {
    /// Schedules the first run `delay` after now.
    pub fn spawn<F, Fut>(delay: Duration, mut task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => break,
                        () = sleep(delay) => {}
                    }
                    task().await;
                }
                debug!("repeating task stopped");
            }
            .in_current_span(),
        );
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops the loop and waits for a run in progress to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = handle.await {
            warn!(error = %e, "repeating task ended abnormally");
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::*;

    #[derive(Debug, Default)]
    struct Runs {
        started: Vec<Instant>,
        finished: usize,
    }

    fn recording_task(
        runs: &Arc<Mutex<Runs>>,
        work: Duration,
    ) -> impl FnMut() -> core::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + 'static {
        let runs = Arc::clone(runs);
        move || {
            let runs = Arc::clone(&runs);
            Box::pin(async move {
                runs.lock().unwrap().started.push(Instant::now());
                sleep(work).await;
                runs.lock().unwrap().finished += 1;
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn next_run_is_scheduled_after_previous_completes() {
        let origin = Instant::now();
        let runs = Arc::new(Mutex::new(Runs::default()));
        let task = RepeatingTask::spawn(
            Duration::from_secs(10),
            recording_task(&runs, Duration::from_secs(3)),
        );

        sleep(Duration::from_secs(40)).await;
        task.shutdown().await;

        let runs = runs.lock().unwrap();
        let offsets: Vec<u64> = runs
            .started
            .iter()
            .map(|s| s.duration_since(origin).as_secs())
            .collect();
        assert_eq!(offsets, [10, 23, 36]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_run_prevents_all_runs() {
        let runs = Arc::new(Mutex::new(Runs::default()));
        let task = RepeatingTask::spawn(
            Duration::from_secs(5),
            recording_task(&runs, Duration::ZERO),
        );
        task.stop();
        assert!(task.is_stopped(), "stop marks the task");

        sleep(Duration::from_secs(60)).await;
        assert!(runs.lock().unwrap().started.is_empty(), "no run after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_does_not_interrupt_run_in_progress() {
        let runs = Arc::new(Mutex::new(Runs::default()));
        let task = RepeatingTask::spawn(
            Duration::from_secs(1),
            recording_task(&runs, Duration::from_secs(5)),
        );

        // inside the first run
        sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.lock().unwrap().started.len(), 1);
        task.shutdown().await;

        let runs = runs.lock().unwrap();
        assert_eq!(runs.started.len(), 1, "no new run after stop");
        assert_eq!(runs.finished, 1, "in-flight run completed");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_loop() {
        let runs = Arc::new(Mutex::new(Runs::default()));
        let task = RepeatingTask::spawn(
            Duration::from_secs(1),
            recording_task(&runs, Duration::ZERO),
        );
        sleep(Duration::from_millis(1500)).await;
        drop(task);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.lock().unwrap().started.len(), 1);
    }
}
