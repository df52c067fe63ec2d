//! one pole low pass used to settle noisy estimates (network latency, etc.)
use num::{Float, FromPrimitive, Zero};
use std::fmt::{self, Display};

use crate::utils::get_coef;

pub struct SmoothingFilter<T> {
    coef: T,
    last_output: T,
    primed: bool,
}

impl<T: Float + FromPrimitive> SmoothingFilter<T> {
    pub fn build(time_const: T, sample_rate: T) -> SmoothingFilter<T> {
        SmoothingFilter {
            coef: get_coef(time_const, sample_rate),
            last_output: Zero::zero(),
            primed: false,
        }
    }

    /// The first sample after a reset is taken as is so the output does not have to
    /// crawl up from zero.
    pub fn get(&mut self, input: T) -> T {
        if !self.primed {
            self.primed = true;
            self.last_output = input;
            return input;
        }
        let one = T::one();
        self.last_output = input * self.coef + (one - self.coef) * self.last_output;
        self.last_output
    }
    pub fn get_last_output(&self) -> T {
        self.last_output
    }
    pub fn reset(&mut self) -> () {
        self.primed = false;
        self.last_output = Zero::zero();
    }
}

impl<T: Float + FromPrimitive + Display> Display for SmoothingFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ coef: {}, last_output: {} }}",
            self.coef, self.last_output
        )
    }
}
