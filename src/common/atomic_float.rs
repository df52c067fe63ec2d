//! floats shared between threads without locks
//!
//! The value is stored as its bit pattern in an atomic integer.  Every value here has a
//! single writer, so load/store is all that is needed.
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(v: f32) -> AtomicF32 {
        AtomicF32(AtomicU32::new(v.to_bits()))
    }
    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }
    pub fn store(&self, v: f32, order: Ordering) -> () {
        self.0.store(v.to_bits(), order)
    }
}

#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(v: f64) -> AtomicF64 {
        AtomicF64(AtomicU64::new(v.to_bits()))
    }
    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }
    pub fn store(&self, v: f64, order: Ordering) -> () {
        self.0.store(v.to_bits(), order)
    }
}
