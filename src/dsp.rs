//! Modules related to DSP algorithms, ie: SmoothingFilter, ToneOsc

pub mod smoothing_filter;
pub mod tone_osc;
