//! Delay sampling
//!
//! Linear mode draws uniformly from `[min, max)`. Normal mode draws from a
//! Gaussian with the configured mean and std (Marsaglia polar method) and
//! rejects samples outside `[min, max]`, up to [`MAX_REJECTIONS`] times.

use super::DelayParameters;
use rand::rngs::ThreadRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on redraws for a single normal sample
pub const MAX_REJECTIONS: u32 = 10_000;

/// Shape of the delay distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// Uniform between min and max
    #[default]
    Linear,
    /// Gaussian around a mean, truncated to the bounds
    Normal,
}

impl Distribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Normal => "normal",
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "normal" => Ok(Self::Normal),
            other => Err(format!(
                "unknown distribution '{}' (expected 'linear' or 'normal')",
                other
            )),
        }
    }
}

/// Standard normal generator using the polar method.
///
/// Each accepted pair yields two values; the second is kept for the next
/// call. Not shared between threads: every owner gets its own cache.
#[derive(Debug, Clone, Default)]
pub struct PolarGaussian {
    cached: Option<f64>,
}

impl PolarGaussian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw from N(0, 1)
    pub fn next_standard<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        if let Some(value) = self.cached.take() {
            return value;
        }

        loop {
            let u1: f64 = rng.gen_range(-1.0..=1.0);
            let u2: f64 = rng.gen_range(-1.0..=1.0);
            let w = u1 * u1 + u2 * u2;
            if w >= 1.0 || w == 0.0 {
                continue;
            }

            let mult = ((-2.0 * w.ln()) / w).sqrt();
            self.cached = Some(u2 * mult);
            return u1 * mult;
        }
    }

    /// Draw from N(mean, std^2)
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R, mean: f64, std: f64) -> f64 {
        mean + std * self.next_standard(rng)
    }
}

/// Produces delay values in milliseconds from [`DelayParameters`]
#[derive(Debug)]
pub struct DelaySampler<R> {
    rng: R,
    gaussian: PolarGaussian,
}

impl DelaySampler<ThreadRng> {
    /// Sampler backed by the calling thread's generator
    pub fn from_thread_rng() -> Self {
        Self::new(rand::thread_rng())
    }
}

impl<R: Rng> DelaySampler<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            gaussian: PolarGaussian::new(),
        }
    }

    /// Sample a delay for `params`.
    ///
    /// Equal bounds always give the bound, whatever the distribution.
    pub fn sample(&mut self, params: &DelayParameters) -> u32 {
        let params = params.clamped();
        let (min, max) = (params.min_delay_ms, params.max_delay_ms);
        if min == max {
            return min;
        }

        match params.distribution {
            // Excludes max itself
            Distribution::Linear => self.rng.gen_range(min..max),
            Distribution::Normal => self.sample_normal(min, max, params.mean, params.std),
        }
    }

    fn sample_normal(&mut self, min: u32, max: u32, mean: f64, std: f64) -> u32 {
        let (low, high) = (f64::from(min), f64::from(max));

        for _ in 0..MAX_REJECTIONS {
            // Whole milliseconds, rounded toward zero
            let value = self.gaussian.sample(&mut self.rng, mean, std).trunc();
            if value >= low && value <= high {
                return value as u32;
            }
        }

        log::warn!(
            "No normal sample within [{}, {}] after {} draws (mean {}, std {}); using clamped mean",
            min,
            max,
            MAX_REJECTIONS,
            mean,
            std
        );
        if mean.is_finite() {
            mean.clamp(low, high).trunc() as u32
        } else {
            min
        }
    }
}

/// Sample one delay with a fresh thread-local sampler
pub fn sample_delay(params: &DelayParameters) -> u32 {
    DelaySampler::from_thread_rng().sample(params)
}
