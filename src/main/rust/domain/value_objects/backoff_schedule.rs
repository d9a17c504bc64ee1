use std::time::Duration;

use crate::domain::errors::{DomainError, Result};

/// Maximum relative jitter applied to each backoff delay (±10%)
pub const JITTER_FRACTION: f64 = 0.1;

/// Lower bound for a jittered delay
const MIN_DELAY: Duration = Duration::from_millis(100);

/// Upper bound for a single schedule entry, in seconds
const MAX_DELAY_SECS: u64 = 86_400;

/// Ordered retry delays; the last entry repeats once the schedule is exhausted
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    pub fn new(delays: Vec<Duration>) -> Result<Self> {
        if delays.is_empty() {
            return Err(DomainError::EmptyBackoffSchedule);
        }
        let max = Duration::from_secs(MAX_DELAY_SECS);
        if let Some((index, delay)) = delays
            .iter()
            .enumerate()
            .find(|(_, d)| d.is_zero() || **d > max)
        {
            return Err(DomainError::InvalidBackoffEntry {
                index,
                value: delay.as_secs_f64(),
            });
        }

        Ok(Self { delays })
    }

    /// Build from the seconds list found in the config file
    pub fn from_secs(seconds: &[f64]) -> Result<Self> {
        if seconds.is_empty() {
            return Err(DomainError::EmptyBackoffSchedule);
        }

        let mut delays = Vec::with_capacity(seconds.len());
        for (index, &value) in seconds.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(DomainError::InvalidBackoffEntry { index, value });
            }
            let delay = Duration::try_from_secs_f64(value)
                .map_err(|_| DomainError::InvalidBackoffEntry { index, value })?;
            delays.push(delay);
        }

        Self::new(delays)
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.delays.len() - 1
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Base delay for an index, clamped to the last entry
    pub fn delay_at(&self, index: usize) -> Duration {
        self.delays[index.min(self.last_index())]
    }

    /// Base delay scaled by `1 + jitter`, where jitter is clamped to ±JITTER_FRACTION
    pub fn jittered_delay(&self, index: usize, jitter: f64) -> Duration {
        let jitter = jitter.clamp(-JITTER_FRACTION, JITTER_FRACTION);
        let base = self.delay_at(index).as_secs_f64();
        Duration::try_from_secs_f64(base * (1.0 + jitter))
            .unwrap_or(Duration::MAX)
            .max(MIN_DELAY)
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            delays: [1, 2, 5, 10, 30]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
        }
    }
}
