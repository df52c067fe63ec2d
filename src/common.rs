//! These modules are shared among both the client and server sides of the room.
use std::time::{SystemTime, UNIX_EPOCH};

pub mod atomic_float;
pub mod audio_block;
pub mod box_error;
pub mod choir_packet;
pub mod config;
pub mod sock_with_tos;
pub mod status_page;
pub mod stream_time_stat;

/// Sample rate of every stream in the room
pub const SAMPLE_RATE: usize = 48_000;
/// Number of frames in one block (2.667 msec)
pub const BLOCK_FRAMES: usize = 128;
/// Duration of one block in microseconds
pub const BLOCK_MICROS: f64 = BLOCK_FRAMES as f64 * 1_000_000.0 / SAMPLE_RATE as f64;
/// Duration of one block in milliseconds
pub const BLOCK_MSEC: f64 = BLOCK_MICROS / 1000.0;

/// wall clock in microseconds
pub fn get_micro_time() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or(0)
}

/// Signed distance from `b` to `a` on the wrapping 32 bit sequence circle
///
/// positive when `a` is ahead of `b`.
pub fn seq_diff(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

/// convert a duration in msec to a whole number of blocks (rounded down)
pub fn msec_to_blocks(msec: f64) -> i32 {
    (msec / BLOCK_MSEC) as i32
}
