//! timing statistics for packet streams
use serde::Serialize;
use std::fmt;

/// running mean/deviation/peak of a stream of time samples (packet interarrival, etc.)
///
/// The window sets how slowly the mean follows new samples.  The peak holds the largest
/// sample and bleeds off slowly so a single late packet stays visible for a while.
#[derive(Debug, Serialize, Clone)]
pub struct StreamTimeStat {
    peak: f64,
    mean: f64,
    sigma: f64,
    window: u64,
}

const PEAK_DECAY: f64 = 0.999;

impl StreamTimeStat {
    pub fn new(window_size: u64) -> StreamTimeStat {
        StreamTimeStat {
            peak: 0.0,
            mean: 0.0,
            sigma: 0.0,
            window: window_size.max(1),
        }
    }
    pub fn clear(&mut self) -> () {
        self.peak = 0.0;
        self.mean = 0.0;
        self.sigma = 0.0;
    }
    pub fn get_peak(&self) -> f64 {
        self.peak
    }
    pub fn get_mean(&self) -> f64 {
        self.mean
    }
    pub fn get_sigma(&self) -> f64 {
        self.sigma
    }

    pub fn add_sample(&mut self, sample: f64) -> () {
        self.peak = f64::max(sample, self.peak * PEAK_DECAY);
        let w = self.window as f64;
        self.mean += (sample - self.mean) / w;
        self.sigma += ((sample - self.mean).abs() - self.sigma) / w;
    }
}

impl fmt::Display for StreamTimeStat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ peak: {:.1}, mean: {:.1}, sigma: {:.1} }}",
            self.peak, self.mean, self.sigma
        )
    }
}
