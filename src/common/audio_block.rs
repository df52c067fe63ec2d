//! fixed size blocks of audio
//!
//! Everything in the room moves in blocks of [`BLOCK_FRAMES`] frames.  Singers send mono
//! blocks, the server returns interleaved stereo blocks (left, right, left, ...).
use super::BLOCK_FRAMES;

pub type Sample = i16;

pub const MONO_BLOCK_SIZE: usize = BLOCK_FRAMES;
pub const STEREO_BLOCK_SIZE: usize = BLOCK_FRAMES * 2;

pub type MonoBlock = [Sample; MONO_BLOCK_SIZE];
pub type StereoBlock = [Sample; STEREO_BLOCK_SIZE];

/// square of the largest sample magnitude, the 0 dB reference for level stats
pub const MAX_SQUARE: f64 = (1u64 << (2 * 16 - 2)) as f64;

/// saturate a wide accumulator back down to a sample
pub fn saturate(v: i32) -> Sample {
    v.clamp(Sample::MIN as i32, Sample::MAX as i32) as Sample
}

#[cfg(test)]
mod test_audio_block {
    use super::*;

    #[test]
    fn saturates() {
        assert_eq!(saturate(40_000), i16::MAX);
        assert_eq!(saturate(-40_000), i16::MIN);
        assert_eq!(saturate(-12), -12);
    }
}
