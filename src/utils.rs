use num::{Float, FromPrimitive};

use crate::common::audio_block::{Sample, MAX_SQUARE};

// utility functions

/// quietest level we ever report
pub const MIN_DB: f64 = -60.0;

/// coefficient for a one pole filter with the given time constant (in seconds)
pub fn get_coef<T: Float + FromPrimitive>(time_const: T, sample_rate: T) -> T {
    let one = T::one();
    one - (-(one / (time_const * sample_rate))).exp()
}

/// dB to linear gain
pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// mean square of a block of samples
pub fn get_block_power(data: &[Sample]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>() / data.len() as f64
}

/// largest square in a block of samples
pub fn get_block_peak(data: &[Sample]) -> f64 {
    data.iter()
        .map(|v| (*v as f64) * (*v as f64))
        .fold(0.0, f64::max)
}

/// power (mean square of raw samples) to dB relative to full scale
pub fn power_to_db(power: f64) -> f64 {
    if power <= 0.0 {
        return MIN_DB;
    }
    f64::max(MIN_DB, 10.0 * (power / MAX_SQUARE).log10())
}

#[cfg(test)]

mod test_utils {
    use super::*;

    #[test]
    fn coef_is_fraction() {
        let c: f64 = get_coef(0.1, 375.0);
        assert!(c > 0.0 && c < 1.0);
        // a longer time constant moves slower
        assert!(get_coef(1.0, 375.0) < c);
    }
    #[test]
    fn db_math() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-9);
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-9);
        assert_eq!(power_to_db(0.0), MIN_DB);
        assert!(power_to_db(MAX_SQUARE).abs() < 1e-9);
        assert_eq!(power_to_db(1.0), MIN_DB);
    }
    #[test]
    fn block_power() {
        let block = [100 as Sample, -100, 100, -100];
        assert_eq!(get_block_power(&block), 10_000.0);
        assert_eq!(get_block_peak(&[3, -5, 4]), 25.0);
        assert_eq!(get_block_power(&[]), 0.0);
    }
}
