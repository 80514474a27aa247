use std::time::Duration;

use duration_str::deserialize_duration;
use serde::{de, Deserialize, Deserializer};

use crate::defaults::{DEFAULT_RETRY_INITIAL_DELAY, DEFAULT_RETRY_MAX_RETRIES};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    #[default]
    Exponential,
}

impl BackoffStrategy {
    fn delay(&self, tries: usize, initial_delay: Duration) -> Duration {
        match self {
            BackoffStrategy::Fixed => fixed(tries, initial_delay),
            BackoffStrategy::Linear => linear(tries, initial_delay),
            BackoffStrategy::Exponential => exponential(tries, initial_delay),
        }
    }
}

/// Retry policy as read from the configuration file.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case", default)]
pub struct BackoffConfig {
    #[serde(rename = "type")]
    pub strategy: BackoffStrategy,
    #[serde(deserialize_with = "deserialize_duration")]
    pub initial_delay: Duration,
    /// Retries after the first failed attempt, at least 1.
    #[serde(deserialize_with = "deserialize_max_retries")]
    pub max_retries: usize,
}

fn deserialize_max_retries<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let max_retries = usize::deserialize(deserializer)?;
    if max_retries == 0 {
        return Err(de::Error::custom("max-retries must be at least 1"));
    }
    Ok(max_retries)
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            max_retries: DEFAULT_RETRY_MAX_RETRIES,
        }
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        Backoff::new(config.strategy)
            .with_initial_delay(config.initial_delay)
            .with_max_retries(config.max_retries)
    }
}

/// Computes the delays of a bounded retry sequence. The caller decides how to wait them.
#[derive(Debug, Clone)]
pub struct Backoff {
    strategy: BackoffStrategy,
    tries: usize,
    initial_delay: Duration,
    max_retries: usize,
}

impl Backoff {
    pub fn new(strategy: BackoffStrategy) -> Self {
        Self {
            strategy,
            tries: 0,
            initial_delay: Duration::new(1, 0),
            max_retries: DEFAULT_RETRY_MAX_RETRIES,
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Registers a new try and returns how long to wait before it, or `None` once the retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.tries = self.tries.saturating_add(1);

        if self.tries > self.max_retries {
            return None;
        }

        Some(self.strategy.delay(self.tries, self.initial_delay))
    }

    pub fn tries(&self) -> usize {
        self.tries
    }
}

/// fixed returns the same delay for every try
pub fn fixed(_: usize, initial_delay: Duration) -> Duration {
    initial_delay
}

/// linear returns a delay incrementing linearly with the tries
pub fn linear(tries: usize, initial_delay: Duration) -> Duration {
    let tries = u32::try_from(tries).unwrap_or(u32::MAX);
    initial_delay.saturating_mul(tries)
}

/// exponential returns a delay incrementing exponentially in base 2
pub fn exponential(tries: usize, initial_delay: Duration) -> Duration {
    let exponent = u32::try_from(tries.saturating_sub(1)).unwrap_or(u32::MAX);
    initial_delay.saturating_mul(2_u32.saturating_pow(exponent))
}
