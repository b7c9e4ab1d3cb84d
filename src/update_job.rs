use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::{CoalescePolicy, ConfigError, JobConfig};
use crate::delay::delay;

/// Error type for a wrapped task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Execution error: {0}")]
    Execution(String),
}

pub type TaskResult = Result<(), TaskError>;

type BoxedTask<T> =
    Box<dyn Fn(T) -> Pin<Box<dyn Future<Output = TaskResult> + Send>> + Send + Sync>;

struct SessionState<T> {
    running: bool,
    pending: bool,
    last_args: Option<T>,
}

struct Inner<T> {
    name: String,
    task: BoxedTask<T>,
    min_interval: Duration,
    policy: CoalescePolicy,
    shutdown: CancellationToken,
    state: Mutex<SessionState<T>>,
}

/// Wraps an async task so that concurrent triggers coalesce instead of
/// running the task simultaneously.
///
/// While a run is in flight, further triggers collapse into at most one
/// trailing run, so a burst of N triggers costs at most two executions.
/// Useful for successive update operations (config refresh, cache rebuild)
/// where re-running once after the burst is as good as running N times.
///
/// # Example
/// ```ignore
/// let job = UpdateJob::new("refresh_routes", |table: String| async move {
///     rebuild_routes(&table).await.map_err(|e| TaskError::Execution(e.to_string()))
/// });
///
/// job.trigger("main".to_string());   // starts a run
/// job.trigger("main".to_string());   // coalesced into one trailing run
/// ```
pub struct UpdateJob<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for UpdateJob<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> UpdateJob<T>
where
    T: Clone + Send + 'static,
{
    /// Create a job with default options: no pacing, first-of-session
    /// argument snapshot.
    pub fn new<F, Fut>(name: impl Into<String>, task: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let task: BoxedTask<T> = Box::new(move |args| Box::pin(task(args)));

        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                task,
                min_interval: Duration::ZERO,
                policy: CoalescePolicy::default(),
                shutdown: CancellationToken::new(),
                state: Mutex::new(SessionState {
                    running: false,
                    pending: false,
                    last_args: None,
                }),
            }),
        }
    }

    /// Create a job from a validated config section.
    pub fn from_config<F, Fut>(
        name: impl Into<String>,
        config: JobConfig,
        task: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let min_interval = config.min_interval()?;
        Ok(Self::new(name, task)
            .min_interval(min_interval)
            .coalesce(config.coalesce))
    }

    /// Set the minimum delay before every run, including the first.
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.mutate(|inner| inner.min_interval = interval);
        self
    }

    /// Set what happens to the arguments of coalesced triggers.
    pub fn coalesce(mut self, policy: CoalescePolicy) -> Self {
        self.mutate(|inner| inner.policy = policy);
        self
    }

    // Builder methods run before the job is shared, so the Arc is still unique.
    fn mutate(&mut self, f: impl FnOnce(&mut Inner<T>)) {
        let inner = Arc::get_mut(&mut self.inner);
        debug_assert!(
            inner.is_some(),
            "builder methods must run before the job is cloned or triggered"
        );
        if let Some(inner) = inner {
            f(inner);
        }
    }

    /// Request a run of the wrapped task "soon". Fire-and-forget: returns
    /// immediately, never blocks, never reports the task's outcome.
    ///
    /// If the job is idle this starts a new session on a spawned tokio task
    /// (so it must be called from within a tokio runtime). If a run is
    /// already in flight the trigger is absorbed into one trailing run.
    pub fn trigger(&self, args: T) {
        let mut state = self.inner.lock_state();

        if state.running {
            debug!(job = %self.inner.name, "update in flight, scheduling trailing run");
            state.pending = true;
            if self.inner.policy == CoalescePolicy::LatestTrigger {
                state.last_args = Some(args);
            }
            return;
        }

        state.running = true;
        state.pending = false;
        state.last_args = Some(args);
        drop(state);

        tokio::spawn(Arc::clone(&self.inner).run_session());
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_state().running
    }

    /// Ask an in-flight session to stop at its next checkpoint (loop top or
    /// pacing delay) and reset to idle. Extension beyond the baseline
    /// contract, intended for daemon shutdown; has no effect on pacing when
    /// unused. A triggered-but-not-yet-run pass is abandoned.
    pub fn cancel(&self) {
        self.inner.shutdown.cancel();
    }
}

impl<T> Inner<T> {
    fn lock_state(&self) -> MutexGuard<'_, SessionState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + 'static,
{
    /// One running session: repeats passes until no trigger is pending after
    /// a completed pass. State is released on every exit path, including task
    /// panic and cancellation, via the guard.
    async fn run_session(self: Arc<Self>) {
        let guard = SessionGuard::arm(Arc::clone(&self));

        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            if !self.min_interval.is_zero() {
                tokio::select! {
                    _ = delay(self.min_interval) => {}
                    _ = self.shutdown.cancelled() => return,
                }
            }

            let args = {
                let state = self.lock_state();
                // last_args is always Some while running
                match state.last_args.clone() {
                    Some(args) => args,
                    None => return,
                }
            };

            if let Err(e) = (self.task)(args).await {
                error!(job = %self.name, error = %e, "update task failed");
            }

            let mut state = self.lock_state();
            if state.pending {
                // Commit the trailing pass: triggers that arrive from here on
                // belong to the pass after it.
                state.pending = false;
                continue;
            }
            // Idle transition happens under the same lock as the pending
            // check, so a trigger racing with it either lands as pending
            // (seen above) or observes an idle job and starts a new session.
            state.running = false;
            state.last_args = None;
            drop(state);
            guard.disarm();
            return;
        }
    }
}

/// Resets session state if the loop unwinds or is cancelled before it could
/// commit the idle transition itself.
struct SessionGuard<T> {
    inner: Arc<Inner<T>>,
    armed: bool,
}

impl<T> SessionGuard<T> {
    fn arm(inner: Arc<Inner<T>>) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T> Drop for SessionGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.lock_state();
            state.running = false;
            state.pending = false;
            state.last_args = None;
        }
    }
}
