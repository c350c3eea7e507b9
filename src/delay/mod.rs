//! Delay computation: parameters, sampling, and the live parameter store

mod params;
mod sampler;
mod store;

pub use params::DelayParameters;
pub use sampler::{sample_delay, DelaySampler, Distribution, PolarGaussian, MAX_REJECTIONS};
pub use store::ConfigurationStore;
