use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::config::{ConfigError, JobConfig};
use crate::update_job::{TaskError, UpdateJob};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid job config: {0}")]
    Config(#[from] ConfigError),
}

/// Owner-side registry of update jobs, keyed by name.
///
/// A daemon registers one job per recurring operation at startup and triggers
/// it by name from whatever change events it watches. Handlers take typed
/// arguments; the registry carries them as JSON payloads so jobs of different
/// argument types share one map.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, UpdateJob<Vec<u8>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register an update job. A job registered under an existing name
    /// replaces the previous one; the old job finishes any in-flight session
    /// on its own.
    pub fn register<T, F, Fut>(
        &self,
        name: &str,
        config: JobConfig,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let job = UpdateJob::from_config(name, config, move |payload: Vec<u8>| {
            let handler = Arc::clone(&handler);
            async move {
                let args: T = serde_json::from_slice(&payload)?;
                handler(args).await.map_err(TaskError::Execution)
            }
        })?;

        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(name.to_string(), job);
        debug!(job = name, "update job registered");
        Ok(())
    }

    /// Trigger the named job with the given arguments. Fire-and-forget once
    /// the payload is accepted; coalescing happens inside the job.
    pub fn trigger<T: Serialize>(&self, name: &str, args: &T) -> Result<(), RegistryError> {
        let payload = serde_json::to_vec(args)?;

        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get(name)
            .ok_or_else(|| RegistryError::JobNotFound(name.to_string()))?;

        job.trigger(payload);
        Ok(())
    }

    pub fn is_running(&self, name: &str) -> bool {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(name).is_some_and(UpdateJob::is_running)
    }

    /// List registered job names.
    pub fn job_names(&self) -> Vec<String> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.keys().cloned().collect()
    }

    /// Cancel every registered job. Shutdown path: in-flight sessions stop at
    /// their next checkpoint and pending passes are abandoned.
    pub fn cancel_all(&self) {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        for job in jobs.values() {
            job.cancel();
        }
    }
}
