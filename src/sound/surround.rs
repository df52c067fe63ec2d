//! Puts a mono voice somewhere in front of the listener
//!
//! Two cues are used.  The ear closer to the singer hears them a bit louder (gain falls
//! off with distance) and a few samples earlier (phase shift).  Everything is integer
//! math so the same input always gives the same output.
use std::f64::consts::PI;

use crate::{
    common::{
        audio_block::{saturate, MonoBlock, Sample, MONO_BLOCK_SIZE},
        BLOCK_FRAMES, SAMPLE_RATE,
    },
    utils::db_to_gain,
};

/// meters between the ears
pub const EARS_DISTANCE: f64 = 0.2;
/// meters per second
pub const SOUND_SPEED: f64 = 343.0;
/// how far away every seat is
pub const SEAT_DISTANCE: f64 = 2.0;
/// Q16 unity
const UNITY: f64 = 65536.0;
const MAX_SHIFT: i32 = BLOCK_FRAMES as i32 - 1;

/// Angle of seat `index` when `count` singers are spread evenly over `arc` radians.
/// Negative is to the left.  A lone singer sits in the middle.
pub fn seat_angle(index: usize, count: usize, arc: f64) -> f64 {
    if count < 2 {
        return 0.0;
    }
    arc * (index as f64 / (count - 1) as f64 - 0.5)
}

pub fn degrees_to_radians(deg: f64) -> f64 {
    deg * PI / 180.0
}

pub struct SurroundPanner {
    phase_shift: i32,
    mult_l: i64,
    mult_r: i64,
    prev: MonoBlock,
}

impl SurroundPanner {
    /// dead center, unity trim
    pub fn new() -> SurroundPanner {
        let mut panner = SurroundPanner {
            phase_shift: 0,
            mult_l: UNITY as i64,
            mult_r: UNITY as i64,
            prev: [0; MONO_BLOCK_SIZE],
        };
        panner.initialize(0.0, 0.0, SEAT_DISTANCE);
        panner
    }

    /// place the source `distance` meters away at `angle` radians (positive is right)
    pub fn initialize(&mut self, gain_db: f64, angle: f64, distance: f64) -> () {
        let a = distance * distance + EARS_DISTANCE * EARS_DISTANCE / 4.0;
        let b = EARS_DISTANCE * distance * angle.sin();
        let dist_l = (a + b).sqrt();
        let dist_r = (a - b).sqrt();
        let gain = db_to_gain(gain_db);
        self.mult_l = (UNITY * gain / dist_l) as i64;
        self.mult_r = (UNITY * gain / dist_r) as i64;
        let shift = ((dist_r - dist_l) / SOUND_SPEED * SAMPLE_RATE as f64) as i32;
        self.phase_shift = shift.clamp(-MAX_SHIFT, MAX_SHIFT);
    }

    /// positive means the left ear hears it first
    pub fn get_phase_shift(&self) -> i32 {
        self.phase_shift
    }
    /// Q16 gains for left and right
    pub fn get_mults(&self) -> (i64, i64) {
        (self.mult_l, self.mult_r)
    }

    /// forget the previous block (new stream)
    pub fn reset(&mut self) -> () {
        self.prev = [0; MONO_BLOCK_SIZE];
    }

    fn tap(&self, mono: &[Sample], idx: i32) -> i64 {
        if idx < 0 {
            self.prev[(MONO_BLOCK_SIZE as i32 + idx) as usize] as i64
        } else {
            mono[idx as usize] as i64
        }
    }

    /// pan one mono block into an interleaved stereo block
    pub fn apply(&mut self, mono: &[Sample], stereo: &mut [Sample]) -> () {
        let mut il = self.phase_shift.min(0);
        let mut ir = il - self.phase_shift;
        for i in 0..MONO_BLOCK_SIZE {
            let l = (self.tap(mono, il) * self.mult_l) >> 16;
            let r = (self.tap(mono, ir) * self.mult_r) >> 16;
            stereo[2 * i] = saturate(l.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
            stereo[2 * i + 1] = saturate(r.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
            il += 1;
            ir += 1;
        }
        self.prev.copy_from_slice(&mono[..MONO_BLOCK_SIZE]);
    }
}

#[cfg(test)]
mod test_surround {
    use super::*;
    use crate::common::audio_block::{StereoBlock, STEREO_BLOCK_SIZE};

    #[test]
    fn center_is_balanced() {
        let panner = SurroundPanner::new();
        let (l, r) = panner.get_mults();
        assert_eq!(l, r);
        assert_eq!(panner.get_phase_shift(), 0);
        // 2m away is about -6 dB
        assert!((l - 32727).abs() < 2);
    }
    #[test]
    fn hard_right() {
        let mut panner = SurroundPanner::new();
        panner.initialize(0.0, PI / 2.0, SEAT_DISTANCE);
        let (l, r) = panner.get_mults();
        assert!(l < r);
        assert_eq!(panner.get_phase_shift(), -27);
        panner.initialize(0.0, -PI / 2.0, SEAT_DISTANCE);
        assert_eq!(panner.get_phase_shift(), 27);
        // a very wide head would be clamped to a block
        panner.initialize(0.0, PI / 2.0, 1000.0);
        assert!(panner.get_phase_shift() >= -MAX_SHIFT);
    }
    #[test]
    fn delayed_ear_reads_previous_block() {
        let mut panner = SurroundPanner::new();
        panner.initialize(0.0, PI / 2.0, SEAT_DISTANCE);
        let mut impulse: MonoBlock = [0; MONO_BLOCK_SIZE];
        impulse[MONO_BLOCK_SIZE - 1] = 20_000;
        let mut out: StereoBlock = [0; STEREO_BLOCK_SIZE];
        panner.apply(&impulse, &mut out);
        // right ear hears it right away
        assert!(out[2 * (MONO_BLOCK_SIZE - 1) + 1] > 0);
        assert_eq!(out[2 * (MONO_BLOCK_SIZE - 1)], 0);
        // left ear hears it 27 samples into the next block
        let quiet: MonoBlock = [0; MONO_BLOCK_SIZE];
        panner.apply(&quiet, &mut out);
        assert!(out[2 * 26] > 0);
        assert_eq!(out[2 * 26 + 1], 0);
        assert_eq!(out.iter().filter(|v| **v != 0).count(), 1);
    }
    #[test]
    fn loud_trim_saturates() {
        let mut panner = SurroundPanner::new();
        panner.initialize(30.0, 0.0, SEAT_DISTANCE);
        let loud: MonoBlock = [i16::MAX; MONO_BLOCK_SIZE];
        let mut out: StereoBlock = [0; STEREO_BLOCK_SIZE];
        panner.apply(&loud, &mut out);
        assert!(out.iter().all(|v| *v == i16::MAX));
    }
    #[test]
    fn seats_spread_over_arc() {
        assert_eq!(seat_angle(0, 1, PI), 0.0);
        assert_eq!(seat_angle(0, 3, PI), -PI / 2.0);
        assert_eq!(seat_angle(1, 3, PI), 0.0);
        assert_eq!(seat_angle(2, 3, PI), PI / 2.0);
        assert!((degrees_to_radians(180.0) - PI).abs() < 1e-12);
    }
}
