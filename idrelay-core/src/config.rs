use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub requests: RequestConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Lifecycle timing of identity requests held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Age after which an in-progress request becomes `Expired`.
    #[serde(rename = "expires_after_secs", default = "default_expires_after", with = "duration_secs")]
    pub expires_after: Duration,

    /// Age after which a request of any status is evicted.
    #[serde(rename = "delete_after_secs", default = "default_delete_after", with = "duration_secs")]
    pub delete_after: Duration,

    #[serde(rename = "sweep_interval_ms", default = "default_sweep_interval", with = "duration_ms")]
    pub sweep_interval: Duration,

    #[serde(default)]
    pub resolve_policy: ResolvePolicy,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            expires_after: default_expires_after(),
            delete_after: default_delete_after(),
            sweep_interval: default_sweep_interval(),
            resolve_policy: ResolvePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(rename = "initial_delay_ms", default = "default_poll_initial_delay", with = "duration_ms")]
    pub initial_delay: Duration,

    #[serde(rename = "interval_ms", default = "default_poll_interval", with = "duration_ms")]
    pub interval: Duration,

    #[serde(default)]
    pub delivery_policy: DeliveryPolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_poll_initial_delay(),
            interval: default_poll_interval(),
            delivery_policy: DeliveryPolicy::default(),
        }
    }
}

/// Runtime that executes polling tasks and the sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name: default_thread_name(),
        }
    }
}

/// What happens when a request that is no longer in progress is resolved again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvePolicy {
    /// The later resolution replaces status and principal.
    #[default]
    Overwrite,
    /// Only the first resolution of an in-progress request is accepted.
    FirstWins,
}

/// When a poll considers its request ready to be delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Fire once the request is `Complete`, `Rejected` or `Expired`.
    #[default]
    Terminal,
    /// Fire on the first successful read, whatever the status.
    FirstReadable,
}

impl IdentityConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::config(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_expires_after() -> Duration {
    Duration::from_secs(10 * 60)
}
fn default_delete_after() -> Duration {
    Duration::from_secs(60 * 60)
}
fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_poll_initial_delay() -> Duration {
    Duration::from_millis(1000)
}
fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}
fn default_worker_threads() -> usize {
    1
}
fn default_thread_name() -> String {
    "identity-request-status-checking".to_string()
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer, ser::Error};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis())
            .map_err(|_| S::Error::custom(format!("{:?} does not fit in u64 milliseconds", duration)))?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
