//! sine oscillator for the metronome clicks and test tones
use num::{Float, FromPrimitive, Zero};

pub struct ToneOsc<T> {
    amp: T,
    phase_inc: T,
    phase: T,
    two_pi: T,
}

impl<T: Float + FromPrimitive> ToneOsc<T> {
    pub fn new() -> ToneOsc<T> {
        ToneOsc {
            amp: T::one(),
            phase_inc: Zero::zero(),
            phase: Zero::zero(),
            two_pi: T::from_f64(std::f64::consts::PI * 2.0).unwrap_or(T::zero()),
        }
    }
    pub fn init(&mut self, freq: T, amp: T, sample_rate: T) -> () {
        self.phase_inc = self.two_pi * freq / sample_rate;
        self.amp = amp;
        self.phase = Zero::zero();
    }
    pub fn get_sample(&mut self) -> T {
        let val = self.amp * T::sin(self.phase);
        self.phase = self.phase + self.phase_inc;
        if self.phase >= self.two_pi {
            self.phase = self.phase - self.two_pi;
        }
        val
    }
}

#[cfg(test)]
pub mod test_tone_osc {
    use super::*;

    #[test]
    fn can_make_waves() {
        let mut osc: ToneOsc<f64> = ToneOsc::new();
        // quarter of the sample rate gives 0, 1, 0, -1
        osc.init(1000.0, 0.5, 4000.0);
        let output: Vec<f64> = (0..8).map(|_| osc.get_sample()).collect();
        assert!(output[0].abs() < 1e-9);
        assert!((output[1] - 0.5).abs() < 1e-9);
        assert!(output[2].abs() < 1e-9);
        assert!((output[3] + 0.5).abs() < 1e-9);
        assert!((output[5] - 0.5).abs() < 1e-9);
    }
}
