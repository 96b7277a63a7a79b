use std::time::{Duration, Instant};

use crate::client::{OcrClient, TaskState};

// ---------------------------------------------------------------------------
// TaskMonitor — polls a task and measures its timing phases
// ---------------------------------------------------------------------------

/// Terminal result of monitoring a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Completed,
    Failed,
    TimedOut,
}

/// Timing breakdown observed while waiting for one task to finish.
///
/// `queue_wait_time` is only known when the monitor saw the
/// `pending/queued -> processing` transition; `processing_time` additionally
/// requires the task to complete. Either may be `None` when the service
/// skipped past a phase between two polls.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub status: OutcomeStatus,
    /// Complete wall-clock time from the start of monitoring, seconds.
    pub total_time: f64,
    pub queue_wait_time: Option<f64>,
    pub processing_time: Option<f64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Number of status polls issued.
    pub attempts: u32,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }
}

/// Polls task status on an interval and derives the queue-wait and
/// processing phases from observed status transitions.
pub struct TaskMonitor<'a> {
    client: &'a OcrClient,
    poll_interval: Duration,
}

impl<'a> TaskMonitor<'a> {
    pub fn new(client: &'a OcrClient) -> Self {
        Self {
            client,
            poll_interval: Duration::from_secs(3),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait for the task to reach a terminal state, or until `timeout`
    /// elapses. Poll errors are tolerated (the task may still be running);
    /// they only surface indirectly as a timeout.
    pub async fn wait_for_completion(&self, task_id: &str, timeout: Duration) -> TaskOutcome {
        let start = Instant::now();
        let mut last_state: Option<TaskState> = None;
        let mut processing_started: Option<Instant> = None;
        let mut queue_wait_time: Option<f64> = None;
        let mut attempts: u32 = 0;

        while start.elapsed() < timeout {
            attempts += 1;
            match self.client.task_status(task_id).await {
                Ok(status) => {
                    if Some(status.status) != last_state {
                        // Queue wait ends when we first observe processing
                        // after a waiting state.
                        if matches!(last_state, Some(TaskState::Pending | TaskState::Queued))
                            && status.status == TaskState::Processing
                        {
                            processing_started = Some(Instant::now());
                            queue_wait_time = Some(start.elapsed().as_secs_f64());
                        }
                        tracing::debug!(
                            "Task {task_id}: {:?} -> {:?} after {:.1}s",
                            last_state,
                            status.status,
                            start.elapsed().as_secs_f64()
                        );
                        last_state = Some(status.status);
                    }

                    match status.status {
                        TaskState::Completed => {
                            return TaskOutcome {
                                status: OutcomeStatus::Completed,
                                total_time: start.elapsed().as_secs_f64(),
                                queue_wait_time,
                                processing_time: processing_started
                                    .map(|t| t.elapsed().as_secs_f64()),
                                result: status.result,
                                error: None,
                                attempts,
                            };
                        }
                        TaskState::Failed => {
                            return TaskOutcome {
                                status: OutcomeStatus::Failed,
                                total_time: start.elapsed().as_secs_f64(),
                                queue_wait_time,
                                processing_time: None,
                                result: None,
                                error: status
                                    .error
                                    .or_else(|| Some("Unknown error".to_string())),
                                attempts,
                            };
                        }
                        TaskState::Pending | TaskState::Queued | TaskState::Processing => {}
                    }
                }
                Err(err) => {
                    tracing::debug!("Status poll for {task_id} failed: {err}");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        TaskOutcome {
            status: OutcomeStatus::TimedOut,
            total_time: start.elapsed().as_secs_f64(),
            queue_wait_time,
            processing_time: None,
            result: None,
            error: Some(format!("Timeout after {}s", timeout.as_secs())),
            attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::OcrClient;

    #[test]
    fn outcome_success_only_for_completed() {
        let completed = TaskOutcome {
            status: OutcomeStatus::Completed,
            total_time: 10.0,
            queue_wait_time: Some(2.0),
            processing_time: Some(8.0),
            result: None,
            error: None,
            attempts: 4,
        };
        assert!(completed.is_success());

        let failed = TaskOutcome {
            status: OutcomeStatus::Failed,
            ..completed.clone()
        };
        assert!(!failed.is_success());

        let timed_out = TaskOutcome {
            status: OutcomeStatus::TimedOut,
            ..completed
        };
        assert!(!timed_out.is_success());
    }

    #[tokio::test]
    async fn unreachable_deployment_times_out() {
        // Nothing listens on this port; every poll errors and the monitor
        // reports a timeout instead of propagating.
        let client = OcrClient::builder("http://127.0.0.1:1")
            .timeout(Duration::from_millis(50))
            .build()
            .expect("build");
        let monitor = TaskMonitor::new(&client).with_poll_interval(Duration::from_millis(10));
        let outcome = monitor
            .wait_for_completion("nonexistent", Duration::from_millis(120))
            .await;
        assert_eq!(outcome.status, OutcomeStatus::TimedOut);
        assert!(outcome.attempts >= 1);
        assert!(outcome.queue_wait_time.is_none());
        assert!(outcome.processing_time.is_none());
        assert!(outcome.error.is_some());
    }
}
