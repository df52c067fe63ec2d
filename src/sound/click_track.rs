//! metronome clicks, synthesized once at startup
//!
//! The accent (first beat of a bar) is a little higher and louder than the other beats.
//! Both decay quickly so a click is over well before the next beat, even at the
//! fastest tempo.

use crate::{
    common::{
        audio_block::{Sample, STEREO_BLOCK_SIZE},
        SAMPLE_RATE,
    },
    dsp::tone_osc::ToneOsc,
};

/// 100 msec of click
pub const CLICK_FRAMES: usize = 4800;
const CLICK_LEVEL: f64 = 0.25 * i16::MAX as f64;
// time constant of the click decay in seconds
const CLICK_DECAY: f64 = 0.02;

pub struct ClickTrack {
    accent: Vec<Sample>,
    beat: Vec<Sample>,
}

fn synth(freq: f64, amp: f64) -> Vec<Sample> {
    let mut osc: ToneOsc<f64> = ToneOsc::new();
    osc.init(freq, amp, SAMPLE_RATE as f64);
    let mut click = Vec::with_capacity(CLICK_FRAMES * 2);
    for i in 0..CLICK_FRAMES {
        let env = (-(i as f64) / (CLICK_DECAY * SAMPLE_RATE as f64)).exp();
        let v = (osc.get_sample() * env * CLICK_LEVEL) as Sample;
        // same on both sides
        click.push(v);
        click.push(v);
    }
    click
}

impl ClickTrack {
    pub fn new() -> ClickTrack {
        ClickTrack {
            accent: synth(330.0, 1.0),
            beat: synth(300.0, 0.7),
        }
    }
    /// number of stereo blocks one click covers
    pub fn block_count(&self) -> usize {
        (self.beat.len() + STEREO_BLOCK_SIZE - 1) / STEREO_BLOCK_SIZE
    }
    /// copy block `n` of a click, zero padded past its end
    pub fn fill_block(&self, accent: bool, n: usize, out: &mut [Sample]) -> () {
        let click = if accent { &self.accent } else { &self.beat };
        let start = (n * STEREO_BLOCK_SIZE).min(click.len());
        let end = (start + STEREO_BLOCK_SIZE).min(click.len());
        let len = end - start;
        out[..len].copy_from_slice(&click[start..end]);
        out[len..STEREO_BLOCK_SIZE].fill(0);
    }
}
