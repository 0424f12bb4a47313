//! Rate-limited request scheduler.
//!
//! A single dispatcher task drains a FIFO queue one task at a time, keeping
//! at least `1000 / rps` ms (jittered) between dispatches. A task failing
//! with [`UpstreamError::RateLimited`] goes back to the tail of the queue
//! with an exponential, jittered backoff until its attempt budget runs out,
//! after which the error is returned to the submitter.
//!
//! The dispatcher is the only admission point for upstream traffic: there is
//! no parallel dispatch.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::UpstreamError;

/// Type-erased unit of work. One `attempt` per dispatch; the result is
/// delivered to the submitter by the job itself.
trait Job: Send {
    fn attempt(&mut self) -> BoxFuture<'_, Result<(), UpstreamError>>;
    fn fail(&mut self, err: UpstreamError);
}

struct TypedJob<T, F> {
    make: F,
    reply: Option<oneshot::Sender<Result<T, UpstreamError>>>,
}

impl<T, F, Fut> Job for TypedJob<T, F>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
{
    fn attempt(&mut self) -> BoxFuture<'_, Result<(), UpstreamError>> {
        let fut = (self.make)();
        Box::pin(async move {
            let value = fut.await?;
            if let Some(reply) = self.reply.take() {
                let _ = reply.send(Ok(value));
            }
            Ok(())
        })
    }

    fn fail(&mut self, err: UpstreamError) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(Err(err));
        }
    }
}

struct QueuedTask {
    seq: u64,
    /// Attempts made so far.
    attempts: u32,
    /// Not dispatchable before this instant.
    not_before: Option<Instant>,
    job: Box<dyn Job>,
}

/// Handle to a running dispatcher. Cheap to clone; the dispatcher stops
/// when every handle is dropped or the token is cancelled.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<QueuedTask>,
    cancel: CancellationToken,
    seq: Arc<AtomicU64>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Scheduler {
    /// Spawn the dispatcher on the current tokio runtime.
    pub fn spawn(config: SchedulerConfig, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            config,
            rx,
            queue: VecDeque::new(),
            cancel: cancel.clone(),
            next_slot: None,
        };
        tokio::spawn(dispatcher.run());
        Self {
            tx,
            cancel,
            seq: Default::default(),
        }
    }

    /// Queue `make` and wait for its result. `make` is called once per
    /// attempt, so it must build a fresh request each time.
    pub async fn schedule<T, F, Fut>(&self, make: F) -> Result<T, UpstreamError>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(UpstreamError::Cancelled);
        }
        let (reply, rx) = oneshot::channel();
        let task = QueuedTask {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            attempts: 0,
            not_before: None,
            job: Box::new(TypedJob {
                make,
                reply: Some(reply),
            }),
        };
        self.tx.send(task).map_err(|_| UpstreamError::Cancelled)?;
        // a dropped reply means the dispatcher went away with the task
        rx.await.unwrap_or(Err(UpstreamError::Cancelled))
    }

    /// Stop dispatching. Queued and future tasks fail with
    /// [`UpstreamError::Cancelled`].
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Scale `base` by a random factor in `[1 - jitter, 1 + jitter]`.
pub fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 || base.is_zero() {
        return base;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    base.mul_f64(factor.max(0.0))
}

/// Backoff before retry number `attempt` (1-based): the upstream's hint if
/// any, else `base * 2^attempt`, capped at `max` and then jittered.
pub fn backoff_delay(
    config: &SchedulerConfig,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    let exp = retry_after.unwrap_or_else(|| {
        let factor = 2f64.powi(attempt.min(30) as i32);
        config.base_interval().mul_f64(factor)
    });
    jittered(exp.min(config.max_backoff()), config.jitter)
}

/// Run `op` up to `attempts` times, sleeping between tries while it keeps
/// failing with a rate-limit signal. Any other error is returned at once.
///
/// This sits on top of the scheduler's own retries: an attempt here only
/// fails once the scheduler has exhausted its budget.
pub async fn retry_rate_limited<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_rate_limited() && attempt < attempts => {
                let wait = err.retry_after().unwrap_or(delay);
                debug!(attempt, wait_ms = wait.as_millis() as u64, "retrying after rate limit");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
                attempt += 1;
            }
            other => return other,
        }
    }
}

struct Dispatcher {
    config: SchedulerConfig,
    rx: mpsc::UnboundedReceiver<QueuedTask>,
    queue: VecDeque<QueuedTask>,
    cancel: CancellationToken,
    /// Earliest instant the next dispatch may start.
    next_slot: Option<Instant>,
}

impl Dispatcher {
    async fn run(mut self) {
        info!(
            rps = self.config.rps,
            max_attempts = self.config.max_attempts,
            "scheduler started"
        );
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.drain_inbox();
            let mut task = match self.queue.pop_front() {
                Some(task) => task,
                None => tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    msg = self.rx.recv() => match msg {
                        Some(task) => task,
                        None => break,
                    },
                },
            };

            let ready_at = match (self.next_slot, task.not_before) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            if let Some(at) = ready_at {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        task.job.fail(UpstreamError::Cancelled);
                        break;
                    }
                    _ = sleep_until(at) => {}
                }
            }

            let started = Instant::now();
            self.next_slot =
                Some(started + jittered(self.config.base_interval(), self.config.jitter));
            task.attempts += 1;
            debug!(seq = task.seq, attempt = task.attempts, "dispatching");

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => Err(UpstreamError::Cancelled),
                res = task.job.attempt() => res,
            };
            match outcome {
                Ok(()) => {}
                Err(err) if err.is_rate_limited() && task.attempts < self.config.max_attempts => {
                    let delay = backoff_delay(&self.config, task.attempts, err.retry_after());
                    warn!(
                        seq = task.seq,
                        attempt = task.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, requeueing"
                    );
                    task.not_before = Some(Instant::now() + delay);
                    self.drain_inbox();
                    self.queue.push_back(task);
                }
                Err(err) => {
                    if err.is_rate_limited() {
                        warn!(seq = task.seq, attempts = task.attempts, "attempt budget exhausted");
                    }
                    task.job.fail(err);
                }
            }
        }

        self.rx.close();
        self.drain_inbox();
        let pending = self.queue.len();
        for mut task in self.queue.drain(..) {
            task.job.fail(UpstreamError::Cancelled);
        }
        info!(pending, "scheduler stopped");
    }

    /// Move everything already submitted into the queue, preserving order.
    fn drain_inbox(&mut self) {
        while let Ok(task) = self.rx.try_recv() {
            self.queue.push_back(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jitter: f64) -> SchedulerConfig {
        SchedulerConfig {
            rps: 10.0,
            jitter,
            max_attempts: 5,
            max_backoff_ms: 1_000,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let c = config(0.0);
        assert_eq!(backoff_delay(&c, 1, None), Duration::from_millis(200));
        assert_eq!(backoff_delay(&c, 2, None), Duration::from_millis(400));
        assert_eq!(backoff_delay(&c, 4, None), Duration::from_millis(1_000));
        assert_eq!(
            backoff_delay(&c, 1, Some(Duration::from_millis(700))),
            Duration::from_millis(700)
        );
        assert_eq!(
            backoff_delay(&c, 1, Some(Duration::from_secs(60))),
            Duration::from_millis(1_000)
        );
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let base = Duration::from_millis(1_000);
        for _ in 0..200 {
            let d = jittered(base, 0.2);
            assert!(d >= Duration::from_millis(800) && d <= Duration::from_millis(1_200));
        }
        assert_eq!(jittered(base, 0.0), base);
    }
}
