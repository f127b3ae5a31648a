use std::time::Duration;

pub use showroom_remote::config::ConfigError;
use showroom_remote::config::env_parse;

/// Timing of the status poll loop for one asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between status queries. The first query is immediate.
    pub interval: Duration,
    /// Query budget; the job is failed once it is spent.
    pub max_polls: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_polls: 12,
        }
    }
}

/// Batch pipeline timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Upper bound for each provider call during submission.
    pub submit_timeout: Duration,
    pub poll: PollConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(30),
            poll: PollConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default |
    /// |-----------------------|---------|
    /// | `SUBMIT_TIMEOUT_SECS` | `30`    |
    /// | `POLL_INTERVAL_SECS`  | `5`     |
    /// | `MAX_POLLS`           | `12`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let submit_timeout_secs: u64 = env_parse("SUBMIT_TIMEOUT_SECS", 30)?;
        let poll_interval_secs: u64 = env_parse("POLL_INTERVAL_SECS", 5)?;
        let max_polls: u32 = env_parse("MAX_POLLS", 12)?;

        require_positive("SUBMIT_TIMEOUT_SECS", submit_timeout_secs)?;
        require_positive("POLL_INTERVAL_SECS", poll_interval_secs)?;
        require_positive("MAX_POLLS", u64::from(max_polls))?;

        Ok(Self {
            submit_timeout: Duration::from_secs(submit_timeout_secs),
            poll: PollConfig {
                interval: Duration::from_secs(poll_interval_secs),
                max_polls,
            },
        })
    }
}

fn require_positive(var: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(())
}
