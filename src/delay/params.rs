//! Delay parameters for one event class

use super::Distribution;
use serde::{Deserialize, Serialize};

/// Bounds and distribution used to sample delays for one event class.
///
/// `max_delay_ms >= min_delay_ms` holds for every value published through
/// [`ConfigurationStore`](super::ConfigurationStore).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayParameters {
    pub min_delay_ms: u32,
    pub max_delay_ms: u32,
    pub distribution: Distribution,
    /// Mean of the normal distribution, in milliseconds
    pub mean: f64,
    /// Standard deviation of the normal distribution, in milliseconds
    pub std: f64,
}

impl DelayParameters {
    /// Same delay for every event
    pub fn constant(delay_ms: u32) -> Self {
        Self::linear(delay_ms, delay_ms)
    }

    /// Uniformly distributed delays in `[min, max)`
    pub fn linear(min_delay_ms: u32, max_delay_ms: u32) -> Self {
        Self {
            min_delay_ms,
            max_delay_ms,
            distribution: Distribution::Linear,
            mean: 0.0,
            std: 0.0,
        }
        .clamped()
    }

    /// Normally distributed delays, truncated to `[min, max]`
    pub fn normal(min_delay_ms: u32, max_delay_ms: u32, mean: f64, std: f64) -> Self {
        Self {
            min_delay_ms,
            max_delay_ms,
            distribution: Distribution::Normal,
            mean,
            std,
        }
        .clamped()
    }

    /// Raise `max_delay_ms` to `min_delay_ms` if it is smaller
    pub fn clamped(mut self) -> Self {
        if self.max_delay_ms < self.min_delay_ms {
            self.max_delay_ms = self.min_delay_ms;
        }
        self
    }

    /// Replace the bounds, keeping distribution and std.
    ///
    /// A normal mean outside the new bounds is moved to the nearest bound,
    /// so `min <= mean <= max` holds for the result.
    pub fn with_bounds(self, min_delay_ms: u32, max_delay_ms: u32) -> Self {
        let mut params = Self {
            min_delay_ms,
            max_delay_ms,
            ..self
        }
        .clamped();

        if params.distribution == Distribution::Normal && params.mean.is_finite() {
            params.mean = params.mean.clamp(
                f64::from(params.min_delay_ms),
                f64::from(params.max_delay_ms),
            );
        }
        params
    }

    /// Whether every sample is the same value
    pub fn is_constant(&self) -> bool {
        self.min_delay_ms == self.max_delay_ms
    }

    /// Whether the normal mean lies within the bounds
    pub fn mean_in_bounds(&self) -> bool {
        self.mean >= f64::from(self.min_delay_ms) && self.mean <= f64::from(self.max_delay_ms)
    }
}

impl Default for DelayParameters {
    fn default() -> Self {
        Self::constant(0)
    }
}
