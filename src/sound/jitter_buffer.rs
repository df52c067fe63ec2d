//! Ring buffer that sits between the network and the mixer for each stream
//!
//! Blocks are stored by their sequence index.  The writer (whoever receives the packets)
//! and the reader (the mixer, once per block period) never lock each other out: sample
//! data and slot markers are atomics, and a slot's marker is published with release
//! ordering only after its samples are in place.
//!
//! The reader tries to keep latency as low as the network allows.  Every slot remembers
//! the reader's "read time" when it was filled.  From that the reader can tell how late
//! each block arrived, and when every block in the recent window would still have made
//! it in time with a shorter delay, it skips ahead.  Holes are covered with silence and
//! every discontinuity gets a one block linear fade so it does not click.
use log::debug;
use serde::Serialize;
use std::{
    fmt,
    sync::atomic::{AtomicBool, AtomicI16, AtomicI32, AtomicU32, AtomicU64, Ordering},
};

use crate::{
    common::{atomic_float::AtomicF64, audio_block::Sample, seq_diff, BLOCK_FRAMES},
    utils::{get_block_peak, get_block_power, power_to_db},
};

pub const DEFAULT_CAPACITY: usize = 512;
/// minimum number of reads between two deliberate jumps
pub const DEFAULT_SKIP_PERIOD: u32 = 200;
/// number of filled blocks that have to agree before a skip
pub const DEFAULT_JUMP_WINDOW: u32 = 20;
/// per block decay of the level stats (about 100 msec half life)
pub const LEVEL_DECAY: f64 = 0.9817;

/// Knobs that shape the buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterTuning {
    pub capacity: usize,
    pub skip_period: u32,
    pub jump_window: u32,
}

impl JitterTuning {
    /// capacity is rounded up to a power of two so slot math survives index wrap
    pub fn new(capacity: usize, skip_period: u32, jump_window: u32) -> JitterTuning {
        JitterTuning {
            capacity: capacity.max(4).next_power_of_two(),
            skip_period: skip_period.max(1),
            jump_window: jump_window.max(1),
        }
    }
}

impl Default for JitterTuning {
    fn default() -> Self {
        JitterTuning::new(DEFAULT_CAPACITY, DEFAULT_SKIP_PERIOD, DEFAULT_JUMP_WINDOW)
    }
}

/// Counters since the last snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BufferStats {
    pub played: u64,
    pub lost: u64,
    pub waited: u64,
    pub skipped: u64,
    /// blocks between the read position and the newest block written
    pub delay: i32,
}

/// Loudness of what the reader has been handing out
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelStats {
    pub avg_db: f64,
    pub peak_db: f64,
}

pub struct JitterBuffer<const CHANNELS: usize> {
    tuning: JitterTuning,
    read_pos: AtomicU32,
    write_last_pos: AtomicU32,
    // reader bookkeeping
    read_time: AtomicU32,
    last_jump_time: AtomicU32,
    fade: AtomicBool,
    null_reads: AtomicI32,
    // read_time when the slot was written, 0 means empty
    markers: Vec<AtomicU32>,
    data: Vec<AtomicI16>,
    played: AtomicU64,
    lost: AtomicU64,
    waited: AtomicU64,
    skipped: AtomicU64,
    level_enabled: AtomicBool,
    level_clear: AtomicBool,
    avg_sq: AtomicF64,
    max_sq: AtomicF64,
}

/// what a singer sends
pub type MonoBuffer = JitterBuffer<1>;
/// what a singer hears, also used for the leader track
pub type StereoBuffer = JitterBuffer<2>;

impl<const CHANNELS: usize> JitterBuffer<CHANNELS> {
    /// samples in one block
    pub const BLOCK_SAMPLES: usize = BLOCK_FRAMES * CHANNELS;

    pub fn new(tuning: JitterTuning) -> JitterBuffer<CHANNELS> {
        let tuning = JitterTuning::new(tuning.capacity, tuning.skip_period, tuning.jump_window);
        let buf = JitterBuffer {
            tuning,
            read_pos: AtomicU32::new(0),
            write_last_pos: AtomicU32::new(0),
            read_time: AtomicU32::new(1),
            last_jump_time: AtomicU32::new(0),
            fade: AtomicBool::new(true),
            null_reads: AtomicI32::new(0),
            markers: (0..tuning.capacity).map(|_| AtomicU32::new(0)).collect(),
            data: (0..tuning.capacity * Self::BLOCK_SAMPLES)
                .map(|_| AtomicI16::new(0))
                .collect(),
            played: AtomicU64::new(0),
            lost: AtomicU64::new(0),
            waited: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            level_enabled: AtomicBool::new(false),
            level_clear: AtomicBool::new(false),
            avg_sq: AtomicF64::new(0.0),
            max_sq: AtomicF64::new(0.0),
        };
        buf.clear(0);
        buf
    }
    pub fn capacity(&self) -> usize {
        self.tuning.capacity
    }
    pub fn get_tuning(&self) -> JitterTuning {
        self.tuning
    }
    pub fn read_pos(&self) -> u32 {
        self.read_pos.load(Ordering::Acquire)
    }
    pub fn write_last_pos(&self) -> u32 {
        self.write_last_pos.load(Ordering::Acquire)
    }

    fn slot(&self, pos: u32) -> usize {
        pos as usize & (self.tuning.capacity - 1)
    }

    // marker of a slot, but only if the slot still belongs to the window ending at wlp
    fn marker_within(&self, pos: u32, wlp: u32) -> Option<u32> {
        let back = seq_diff(wlp, pos);
        if back < 0 || back >= self.tuning.capacity as i32 {
            return None;
        }
        match self.markers[self.slot(pos)].load(Ordering::Acquire) {
            0 => None,
            m => Some(m),
        }
    }

    fn filled_within(&self, pos: u32, wlp: u32) -> bool {
        self.marker_within(pos, wlp).is_some()
    }

    /// does the block at `pos` hold data that can still be read
    pub fn is_filled(&self, pos: u32) -> bool {
        self.filled_within(pos, self.write_last_pos())
    }

    /// Reset everything.  Nobody may be reading or writing while this runs.
    pub fn clear(&self, initial_read_pos: u32) -> () {
        self.read_pos.store(initial_read_pos, Ordering::Relaxed);
        self.write_last_pos
            .store(initial_read_pos.wrapping_sub(1), Ordering::Relaxed);
        self.read_time.store(1, Ordering::Relaxed);
        self.last_jump_time.store(0, Ordering::Relaxed);
        self.fade.store(true, Ordering::Relaxed);
        self.null_reads.store(0, Ordering::Relaxed);
        for m in &self.markers {
            m.store(0, Ordering::Relaxed);
        }
        self.played.store(0, Ordering::Relaxed);
        self.lost.store(0, Ordering::Relaxed);
        self.waited.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.level_clear.store(false, Ordering::Relaxed);
        self.avg_sq.store(0.0, Ordering::Relaxed);
        self.max_sq.store(0.0, Ordering::Release);
    }

    /// Store a block at `pos`.  Returns false if the reader is already past it, or if
    /// `pos` is so far behind the newest block that its slot belongs to a newer one.
    ///
    /// With `additive` the block is summed into whatever the slot already holds.
    pub fn write(&self, pos: u32, block: &[Sample], additive: bool) -> bool {
        let wlp = self.write_last_pos.load(Ordering::Relaxed);
        let gap = seq_diff(pos, wlp);
        if gap <= -(self.tuning.capacity as i32) {
            return false;
        }
        if gap > 0 {
            // everything between the old end and pos is now a hole
            let span = (gap as u32).min(self.tuning.capacity as u32);
            let mut p = pos.wrapping_sub(span);
            for _ in 0..span {
                p = p.wrapping_add(1);
                self.markers[self.slot(p)].store(0, Ordering::Relaxed);
            }
            self.write_last_pos.store(pos, Ordering::Release);
        }

        if seq_diff(pos, self.read_pos.load(Ordering::Acquire)) < 0 {
            return false;
        }

        let slot = self.slot(pos);
        let base = slot * Self::BLOCK_SAMPLES;
        let dst = &self.data[base..base + Self::BLOCK_SAMPLES];
        let was_filled = self.markers[slot].load(Ordering::Acquire) != 0;
        if additive && was_filled {
            for (d, s) in dst.iter().zip(block.iter()) {
                let v = d.load(Ordering::Relaxed);
                d.store(v.saturating_add(*s), Ordering::Relaxed);
            }
        } else {
            for (d, s) in dst.iter().zip(block.iter()) {
                d.store(*s, Ordering::Relaxed);
            }
        }
        let stamp = self.read_time.load(Ordering::Relaxed).max(1);
        self.markers[slot].store(stamp, Ordering::Release);
        true
    }

    /// Move the read position forward for a buffer that is only read with
    /// [`JitterBuffer::read_at`].  Never moves it back.
    pub fn advance_read_pos(&self, pos: u32) -> () {
        if seq_diff(pos, self.read_pos.load(Ordering::Relaxed)) > 0 {
            self.read_pos.store(pos, Ordering::Release);
        }
    }

    /// write just after the newest block
    pub fn write_next(&self, block: &[Sample], additive: bool) -> bool {
        self.write(
            self.write_last_pos.load(Ordering::Relaxed).wrapping_add(1),
            block,
            additive,
        )
    }

    fn copy_block(&self, slot: usize, fade_in: bool, fade_out: bool, out: &mut [Sample]) -> () {
        let base = slot * Self::BLOCK_SAMPLES;
        let frames = BLOCK_FRAMES as i32;
        for f in 0..BLOCK_FRAMES {
            let gain = if fade_out {
                frames - f as i32 - 1
            } else if fade_in {
                f as i32
            } else {
                frames
            };
            for c in 0..CHANNELS {
                let idx = f * CHANNELS + c;
                let v = self.data[base + idx].load(Ordering::Relaxed);
                out[idx] = if gain == frames {
                    v
                } else {
                    (v as i32 * gain / frames) as Sample
                };
            }
        }
    }

    /// Random access read with optional fades.  Silence if the block is not there.
    pub fn read_at(&self, pos: u32, fade_in: bool, fade_out: bool, out: &mut [Sample]) -> bool {
        let wlp = self.write_last_pos.load(Ordering::Acquire);
        if (fade_in && fade_out) || !self.filled_within(pos, wlp) {
            out[..Self::BLOCK_SAMPLES].fill(0);
            return false;
        }
        self.copy_block(self.slot(pos), fade_in, fade_out, out);
        true
    }

    // how far the reader can jump ahead without starving on any recent block
    fn find_skip(&self, read_time: u32, read_pos: u32, wlp: u32) -> i32 {
        let period = self.tuning.skip_period;
        let window = self.tuning.jump_window;
        let since_jump = seq_diff(
            read_time,
            self.last_jump_time.load(Ordering::Relaxed).wrapping_add(period),
        );
        if since_jump < 0 {
            return 0;
        }
        let mut skip = (seq_diff(wlp, read_pos) - 1).min(period as i32);
        let mut seen = 0;
        let mut i = wlp;
        while skip > 0 && seq_diff(i.wrapping_add(window), read_pos) > 0 {
            if let Some(marker) = self.marker_within(i, wlp) {
                // the skip this block would have survived
                let allowed = seq_diff(i, read_pos) + read_time.wrapping_sub(marker) as i32 - 2;
                skip = skip.min(allowed);
                seen += 1;
            }
            if seen >= window
                && seq_diff(i.wrapping_add(window), read_pos.wrapping_add(skip as u32)) <= 0
            {
                break;
            }
            i = i.wrapping_sub(1);
        }
        if skip <= 0 {
            return 0;
        }
        let landing = read_pos.wrapping_add(skip as u32);
        if !self.filled_within(landing, wlp) || !self.filled_within(landing.wrapping_add(1), wlp) {
            return 0;
        }
        skip
    }

    /// Hand out the next block, or silence while waiting.  Call once per block period.
    ///
    /// Returns true when real audio was returned.
    pub fn read_next(&self, out: &mut [Sample]) -> bool {
        let mut read_time = self.read_time.load(Ordering::Relaxed).wrapping_add(1);
        if read_time == 0 {
            read_time = 1;
        }
        self.read_time.store(read_time, Ordering::Relaxed);
        let wlp = self.write_last_pos.load(Ordering::Acquire);
        let mut read_pos = self.read_pos.load(Ordering::Relaxed);
        let capacity = self.tuning.capacity as i32;

        if seq_diff(wlp, read_pos) >= capacity {
            // the writer got way ahead, land in the middle of what we have
            read_pos = wlp.wrapping_sub(capacity as u32 / 2);
            self.read_pos.store(read_pos, Ordering::Release);
            self.fade.store(true, Ordering::Relaxed);
            debug!("long jump to {}, write {}", read_pos, wlp);
        }

        let skip = self.find_skip(read_time, read_pos, wlp);

        let mut cur_used = self.filled_within(read_pos, wlp);
        let mut null_reads = self.null_reads.load(Ordering::Relaxed);

        // the previous block was faded out because its successor was missing, so a
        // successor that shows up just in time gets one block of silence in front
        if null_reads == -1 {
            if cur_used && skip == 0 {
                cur_used = false;
            } else {
                null_reads = 0;
            }
        }

        // waited long enough for a lost block, continue after it
        if !cur_used && skip == 0 {
            let mut used = false;
            for i in 0..=null_reads {
                let next = read_pos.wrapping_add(i as u32 + 1);
                if seq_diff(next, wlp) > 0 {
                    break;
                }
                let next_used = self.filled_within(next, wlp);
                if used && next_used {
                    read_pos = read_pos.wrapping_add(i as u32);
                    self.read_pos.store(read_pos, Ordering::Release);
                    cur_used = true;
                    self.lost.fetch_add(i as u64, Ordering::Relaxed);
                    null_reads -= i;
                    if null_reads != 0 {
                        self.last_jump_time.store(read_time, Ordering::Relaxed);
                    }
                    debug!("lost {}, read {}, write {}", i, read_pos, wlp);
                    break;
                }
                used = next_used;
            }
        }

        let fade_out = skip > 0 || !self.filled_within(read_pos.wrapping_add(1), wlp);
        let fade = self.fade.load(Ordering::Relaxed);

        let played = if cur_used && (!fade_out || !fade) {
            self.read_pos
                .store(read_pos.wrapping_add(1), Ordering::Release);
            self.read_at(read_pos, fade, fade_out, out);
            self.fade.store(fade_out, Ordering::Relaxed);
            self.played.fetch_add(1, Ordering::Relaxed);
            self.waited
                .fetch_add(null_reads.max(0) as u64, Ordering::Relaxed);
            null_reads = if fade_out && skip == 0 { -1 } else { 0 };
            true
        } else {
            out[..Self::BLOCK_SAMPLES].fill(0);
            null_reads += 1;
            false
        };

        if skip > 0 {
            let pos = self.read_pos.load(Ordering::Relaxed);
            self.read_pos
                .store(pos.wrapping_add(skip as u32), Ordering::Release);
            self.last_jump_time.store(read_time, Ordering::Relaxed);
            self.waited
                .fetch_add(null_reads.max(0) as u64, Ordering::Relaxed);
            null_reads = 0;
            self.skipped.fetch_add(skip as u64, Ordering::Relaxed);
            debug!("skip {}, read {}, write {}", skip, pos.wrapping_add(skip as u32), wlp);
        }
        self.null_reads.store(null_reads, Ordering::Relaxed);

        if self.level_enabled.load(Ordering::Relaxed) {
            self.update_level(&out[..Self::BLOCK_SAMPLES]);
        }
        played
    }

    fn update_level(&self, block: &[Sample]) -> () {
        let (avg, max) = if self.level_clear.swap(false, Ordering::AcqRel) {
            (0.0, 0.0)
        } else {
            (
                self.avg_sq.load(Ordering::Relaxed),
                self.max_sq.load(Ordering::Relaxed),
            )
        };
        let avg = avg * LEVEL_DECAY + get_block_power(block) * (1.0 - LEVEL_DECAY);
        let max = f64::max(max * LEVEL_DECAY, get_block_peak(block));
        self.avg_sq.store(avg, Ordering::Relaxed);
        self.max_sq.store(max, Ordering::Release);
    }

    /// average and peak level of what has been read
    pub fn level_snapshot(&self) -> LevelStats {
        LevelStats {
            avg_db: power_to_db(self.avg_sq.load(Ordering::Acquire)),
            peak_db: power_to_db(self.max_sq.load(Ordering::Acquire)),
        }
    }

    /// zero the level stats and turn them on or off
    pub fn level_reset(&self, enable: bool) -> () {
        self.level_clear.store(true, Ordering::Release);
        self.level_enabled.store(enable, Ordering::Release);
    }

    /// read and zero the counters
    pub fn stats_snapshot(&self) -> BufferStats {
        BufferStats {
            played: self.played.swap(0, Ordering::Relaxed),
            lost: self.lost.swap(0, Ordering::Relaxed),
            waited: self.waited.swap(0, Ordering::Relaxed),
            skipped: self.skipped.swap(0, Ordering::Relaxed),
            delay: seq_diff(self.write_last_pos(), self.read_pos()) + 1,
        }
    }
}

impl<const CHANNELS: usize> fmt::Display for JitterBuffer<CHANNELS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ read: {}, write: {}, delay: {} }}",
            self.read_pos(),
            self.write_last_pos(),
            seq_diff(self.write_last_pos(), self.read_pos()) + 1
        )
    }
}

#[cfg(test)]
mod test_jitter_buffer {
    use super::*;
    use crate::common::audio_block::{MonoBlock, StereoBlock, MONO_BLOCK_SIZE, STEREO_BLOCK_SIZE};

    fn block(k: u32) -> MonoBlock {
        let mut b = [0; MONO_BLOCK_SIZE];
        for (i, v) in b.iter_mut().enumerate() {
            *v = ((k as usize + 1) * 100 + i) as Sample;
        }
        b
    }
    fn fade_in(b: &MonoBlock) -> MonoBlock {
        let mut out = *b;
        for (i, v) in out.iter_mut().enumerate() {
            *v = (*v as i32 * i as i32 / BLOCK_FRAMES as i32) as Sample;
        }
        out
    }
    fn fade_out(b: &MonoBlock) -> MonoBlock {
        let mut out = *b;
        for (i, v) in out.iter_mut().enumerate() {
            *v = (*v as i32 * (BLOCK_FRAMES - i - 1) as i32 / BLOCK_FRAMES as i32) as Sample;
        }
        out
    }
    fn silence() -> MonoBlock {
        [0; MONO_BLOCK_SIZE]
    }
    fn read(buf: &MonoBuffer) -> MonoBlock {
        let mut out = [1; MONO_BLOCK_SIZE];
        buf.read_next(&mut out);
        out
    }

    #[test]
    fn lockstep_is_one_block_late() {
        let buf = MonoBuffer::new(JitterTuning::default());
        let mut outs = vec![];
        for k in 0..10 {
            assert!(buf.write(k, &block(k), false));
            outs.push(read(&buf));
        }
        assert_eq!(outs[0], silence());
        assert_eq!(outs[1], fade_in(&block(0)));
        for k in 2..10 {
            assert_eq!(outs[k], block(k as u32 - 1));
        }
        let stats = buf.stats_snapshot();
        assert_eq!(stats.played, 9);
        assert_eq!(stats.lost, 0);
        assert_eq!(stats.waited, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.delay, 1);
        // snapshot zeroes the counters
        assert_eq!(buf.stats_snapshot().played, 0);
    }
    #[test]
    fn stream_edge_fades_out() {
        let buf = MonoBuffer::new(JitterTuning::default());
        for k in 0..4 {
            buf.write(k, &block(k), false);
        }
        read(&buf);
        read(&buf);
        read(&buf);
        assert_eq!(read(&buf), fade_out(&block(3)));
        assert_eq!(read(&buf), silence());
    }
    #[test]
    fn recovers_from_lost_block() {
        let buf = MonoBuffer::new(JitterTuning::default());
        let mut outs = vec![];
        for k in 0..10 {
            if k != 5 {
                buf.write(k, &block(k), false);
            }
            outs.push(read(&buf));
        }
        assert_eq!(outs[0], silence());
        assert_eq!(outs[1], fade_in(&block(0)));
        assert_eq!(outs[2], block(1));
        assert_eq!(outs[4], block(3));
        assert_eq!(outs[5], fade_out(&block(4)));
        assert_eq!(outs[6], silence());
        assert_eq!(outs[7], fade_in(&block(6)));
        assert_eq!(outs[8], block(7));
        assert_eq!(outs[9], block(8));
        let stats = buf.stats_snapshot();
        assert_eq!(stats.lost, 1);
        assert_eq!(stats.waited, 1);
        assert_eq!(stats.played, 8);
    }
    #[test]
    fn skips_ahead_after_cooldown() {
        let buf = MonoBuffer::new(JitterTuning::new(512, 20, 4));
        for k in 0..64 {
            buf.write(k, &block(k), false);
        }
        assert_eq!(read(&buf), fade_in(&block(0)));
        for k in 1..18 {
            assert_eq!(read(&buf), block(k));
        }
        assert_eq!(buf.stats_snapshot().skipped, 0);
        // cooldown is over, the last block before the jump is faded out
        assert_eq!(read(&buf), fade_out(&block(18)));
        assert_eq!(buf.stats_snapshot().skipped, 20);
        assert_eq!(read(&buf), fade_in(&block(39)));
        assert_eq!(read(&buf), block(40));
    }
    #[test]
    fn skip_never_lands_in_a_hole() {
        let buf = MonoBuffer::new(JitterTuning::new(512, 20, 4));
        for k in 0..64 {
            if k != 38 {
                buf.write(k, &block(k), false);
            }
        }
        for _ in 0..18 {
            read(&buf);
        }
        assert_eq!(read(&buf), block(18));
        assert_eq!(buf.stats_snapshot().skipped, 0);
    }
    #[test]
    fn long_jump_when_writer_runs_away() {
        let buf = MonoBuffer::new(JitterTuning::default());
        buf.write(0, &block(0), false);
        buf.write(1000, &block(1000), false);
        read(&buf);
        assert_eq!(buf.read_pos(), 1000 - 256);
        assert!(buf.stats_snapshot().delay <= buf.capacity() as i32);
    }
    #[test]
    fn delay_stays_bounded() {
        let buf = MonoBuffer::new(JitterTuning::new(64, 20, 4));
        let mut pos: u32 = 0;
        for step in 0..500u32 {
            // bursts and stalls
            pos = pos.wrapping_add(1 + (step % 7) * (step % 3) * 13);
            buf.write(pos, &block(1), false);
            read(&buf);
            assert!(seq_diff(buf.write_last_pos(), buf.read_pos()) < 64);
        }
    }
    #[test]
    fn late_writes_are_rejected() {
        let buf = MonoBuffer::new(JitterTuning::default());
        buf.clear(100);
        assert!(!buf.write(99, &block(0), false));
        assert!(buf.write(100, &block(0), false));
        assert!(buf.write_next(&block(1), false));
        assert_eq!(buf.write_last_pos(), 101);
        assert!(buf.is_filled(101));
        assert!(!buf.is_filled(102));
    }
    #[test]
    fn stale_write_cannot_take_a_newer_slot() {
        let buf = MonoBuffer::new(JitterTuning::new(8, 200, 4));
        buf.clear(10);
        for k in 16..=20 {
            assert!(buf.write(k, &block(k), false));
        }
        // block 10 shares its slot with block 18
        assert!(!buf.write(10, &[-7777; MONO_BLOCK_SIZE], false));
        let outs: Vec<MonoBlock> = (0..5).map(|_| read(&buf)).collect();
        assert!(outs.iter().all(|b| !b.contains(&-7777)));
        assert!(buf.is_filled(18));
        let mut out = silence();
        assert!(buf.read_at(18, false, false, &mut out));
        assert_eq!(out, block(18));
    }
    #[test]
    fn read_pos_only_moves_forward() {
        let buf = StereoBuffer::new(JitterTuning::default());
        buf.clear(50);
        buf.advance_read_pos(40);
        assert_eq!(buf.read_pos(), 50);
        buf.advance_read_pos(70);
        assert_eq!(buf.read_pos(), 70);
        assert!(!buf.write(69, &[1; STEREO_BLOCK_SIZE], false));
        assert!(buf.write(70, &[1; STEREO_BLOCK_SIZE], false));
    }
    #[test]
    fn survives_index_wrap() {
        let buf = MonoBuffer::new(JitterTuning::default());
        let start = u32::MAX - 4;
        buf.clear(start);
        let mut outs = vec![];
        for k in 0..10u32 {
            buf.write(start.wrapping_add(k), &block(k), false);
            outs.push(read(&buf));
        }
        assert_eq!(outs[1], fade_in(&block(0)));
        assert_eq!(outs[9], block(8));
    }
    #[test]
    fn additive_write_sums() {
        let buf = StereoBuffer::new(JitterTuning::default());
        let a: StereoBlock = [1000; STEREO_BLOCK_SIZE];
        let b: StereoBlock = [32000; STEREO_BLOCK_SIZE];
        buf.write(5, &a, true);
        buf.write(5, &a, true);
        let mut out: StereoBlock = [0; STEREO_BLOCK_SIZE];
        assert!(buf.read_at(5, false, false, &mut out));
        assert!(out.iter().all(|v| *v == 2000));
        // sums saturate
        buf.write(5, &b, true);
        buf.read_at(5, false, false, &mut out);
        assert!(out.iter().all(|v| *v == i16::MAX));
        // plain write overwrites
        buf.write(5, &a, false);
        buf.read_at(5, false, false, &mut out);
        assert!(out.iter().all(|v| *v == 1000));
    }
    #[test]
    fn read_at_fades_both_channels_alike() {
        let buf = StereoBuffer::new(JitterTuning::default());
        let a: StereoBlock = [1280; STEREO_BLOCK_SIZE];
        buf.write(0, &a, false);
        let mut out: StereoBlock = [0; STEREO_BLOCK_SIZE];
        buf.read_at(0, true, false, &mut out);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 0);
        assert_eq!(out[2], 10);
        assert_eq!(out[3], 10);
        // both fades at once is silence
        assert!(!buf.read_at(0, true, true, &mut out));
        assert!(out.iter().all(|v| *v == 0));
        // nothing there
        assert!(!buf.read_at(1, false, false, &mut out));
    }
    #[test]
    fn level_stats() {
        let buf = MonoBuffer::new(JitterTuning::default());
        buf.level_reset(true);
        for k in 0..50 {
            buf.write(k, &silence(), false);
            read(&buf);
        }
        let level = buf.level_snapshot();
        assert_eq!(level.avg_db, -60.0);
        assert_eq!(level.peak_db, -60.0);

        let loud: MonoBlock = [i16::MAX; MONO_BLOCK_SIZE];
        buf.level_reset(true);
        for k in 50..100 {
            buf.write(k, &loud, false);
            read(&buf);
        }
        let level = buf.level_snapshot();
        assert!(level.peak_db > -0.5);
        assert!(level.avg_db > -3.0);
    }
}
