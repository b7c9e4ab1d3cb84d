mod config;
mod delay;
mod registry;
mod update_job;

pub use config::{CoalescePolicy, ConfigError, JobConfig};
pub use delay::delay;
pub use registry::{JobRegistry, RegistryError};
pub use update_job::{TaskError, TaskResult, UpdateJob};
