//! The shared timing reference: a metronome or one singer everybody follows
//!
//! Every singer hears the room late by their own round trip.  To have everybody sing
//! in time with the reference, the reference is played to each singer early by that
//! same amount.  It goes into a ring buffer indexed by server block, and each listener
//! reads it at `tick + their delay`.
//!
//! The human leader's audio only exists once it arrives, so it is written `D` blocks
//! ahead, where `D` is the largest delay of any listener.  `D` never shrinks while the
//! source stays on, so no listener ever has to read something that was not written yet.
use log::info;
use std::sync::{
    atomic::{AtomicU32, AtomicU8, Ordering},
    Arc,
};

use crate::{
    common::{
        atomic_float::AtomicF32,
        audio_block::{Sample, StereoBlock, STEREO_BLOCK_SIZE},
        msec_to_blocks, BLOCK_FRAMES, BLOCK_MSEC, SAMPLE_RATE,
    },
    sound::{
        click_track::ClickTrack,
        jitter_buffer::{JitterTuning, StereoBuffer, DEFAULT_CAPACITY},
    },
};

pub const MIN_BPM: f32 = 40.0;
pub const MAX_BPM: f32 = 300.0;
pub const MAX_BEATS_PER_BAR: u32 = 16;
/// how far ahead metronome beats are laid down at the least
pub const METRONOME_LEAD_MSEC: f64 = 200.0;
/// a listener's delay is only moved when it is off by more than this
pub const DELAY_TOLERANCE_MSEC: f64 = 5.0;

#[derive(FromPrimitive, ToPrimitive, PartialEq, Debug, Clone, Copy)]
pub enum LeaderSource {
    Off = 0,
    Metronome,
    Human,
}

/// Knobs the control thread turns and the mixer reads
pub struct LeaderSettings {
    source: AtomicU8,
    bpm: AtomicF32,
    beats_per_bar: AtomicU32,
    generation: AtomicU32,
}

impl LeaderSettings {
    pub fn new(bpm: f32, beats_per_bar: u32) -> LeaderSettings {
        LeaderSettings {
            source: AtomicU8::new(LeaderSource::Off as u8),
            bpm: AtomicF32::new(bpm.clamp(MIN_BPM, MAX_BPM)),
            beats_per_bar: AtomicU32::new(beats_per_bar.min(MAX_BEATS_PER_BAR)),
            generation: AtomicU32::new(0),
        }
    }
    pub fn source(&self) -> LeaderSource {
        num::FromPrimitive::from_u8(self.source.load(Ordering::Acquire)).unwrap_or(LeaderSource::Off)
    }
    /// switching (even to the same source) restarts the reference from scratch
    pub fn set_source(&self, source: LeaderSource) -> () {
        self.source.store(source as u8, Ordering::Release);
        self.generation.fetch_add(1, Ordering::Release);
        info!("leader source now {:?}", source);
    }
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }
    pub fn bpm(&self) -> f32 {
        self.bpm.load(Ordering::Relaxed)
    }
    /// change the tempo unless that would leave the allowed range
    pub fn adjust_bpm(&self, delta: f32) -> f32 {
        let bpm = self.bpm() + delta;
        if bpm >= MIN_BPM && bpm <= MAX_BPM {
            self.bpm.store(bpm, Ordering::Relaxed);
        }
        self.bpm()
    }
    /// 0 means no accent
    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar.load(Ordering::Relaxed)
    }
    pub fn adjust_beats_per_bar(&self, delta: i32) -> u32 {
        let bpb = self.beats_per_bar() as i32 + delta;
        if bpb >= 0 && bpb <= MAX_BEATS_PER_BAR as i32 {
            self.beats_per_bar.store(bpb as u32, Ordering::Relaxed);
        }
        self.beats_per_bar()
    }
}

// one block linear fade of a stereo block, up or down
fn ramp(block: &[Sample], fade_in: bool, out: &mut StereoBlock) -> () {
    let frames = BLOCK_FRAMES as i32;
    for f in 0..BLOCK_FRAMES {
        let gain = if fade_in { f as i32 } else { frames - f as i32 - 1 };
        for c in 0..2 {
            let i = 2 * f + c;
            out[i] = (block[i] as i32 * gain / frames) as Sample;
        }
    }
}

/// Mixer side of the reference.  Owned by the mix thread.
pub struct LeaderSync {
    settings: Arc<LeaderSettings>,
    buffer: StereoBuffer,
    clicks: ClickTrack,
    generation: u32,
    source: LeaderSource,
    delay: i32,
    max_delay: i32,
    fade_next_write: bool,
    // the leader has been laid down at the current delay since the last restart
    written: bool,
    // delay the leader was written at before it last grew, until that stream is closed
    grown_from: Option<i32>,
    // metronome schedule
    started: bool,
    next_beat: u32,
    beat_frac: f64,
    bar_pos: u32,
    scratch: StereoBlock,
}

impl LeaderSync {
    pub fn new(settings: Arc<LeaderSettings>, capacity: usize) -> LeaderSync {
        let buffer = StereoBuffer::new(JitterTuning::new(
            capacity.max(DEFAULT_CAPACITY),
            u32::MAX,
            1,
        ));
        let max_delay = buffer.capacity() as i32 / 2 - 1;
        LeaderSync {
            generation: settings.generation(),
            source: settings.source(),
            settings,
            buffer,
            clicks: ClickTrack::new(),
            delay: 0,
            max_delay,
            fade_next_write: true,
            written: false,
            grown_from: None,
            started: false,
            next_beat: 0,
            beat_frac: 0.0,
            bar_pos: 0,
            scratch: [0; STEREO_BLOCK_SIZE],
        }
    }

    /// Pick up source changes.  Returns true when the reference restarted, in which case
    /// every listener has to forget its delay.
    pub fn begin_tick(&mut self, tick: u32) -> bool {
        let generation = self.settings.generation();
        if generation == self.generation {
            // nobody reads behind the tick, keep writes from wrapping around the reader
            self.buffer.advance_read_pos(tick);
            return false;
        }
        self.generation = generation;
        self.source = self.settings.source();
        self.buffer.clear(tick);
        self.delay = 0;
        self.fade_next_write = true;
        self.written = false;
        self.grown_from = None;
        self.started = false;
        self.bar_pos = 0;
        true
    }

    pub fn source(&self) -> LeaderSource {
        self.source
    }
    pub fn is_active(&self) -> bool {
        self.source != LeaderSource::Off
    }
    /// the composite delay in blocks
    pub fn composite_delay(&self) -> i32 {
        self.delay
    }
    pub fn max_delay(&self) -> i32 {
        self.max_delay
    }

    /// raise the composite delay to cover a listener needing `needed` blocks
    pub fn update_delay(&mut self, needed: i32) -> () {
        let needed = needed.clamp(0, self.max_delay);
        if needed > self.delay {
            if self.written && self.grown_from.is_none() {
                self.grown_from = Some(self.delay);
            }
            self.delay = needed;
            self.fade_next_write = true;
        }
    }

    /// Store the human leader's block for this tick.  Right after the delay grew the
    /// block also goes to the old offset faded out, so the reference ramps down there
    /// and back up at the new offset.
    pub fn write_leader(&mut self, tick: u32, block: &[Sample]) -> () {
        if let Some(old) = self.grown_from.take() {
            ramp(block, false, &mut self.scratch);
            self.buffer
                .write(tick.wrapping_add(old as u32), &self.scratch, false);
        }
        let pos = tick.wrapping_add(self.delay as u32);
        if self.fade_next_write {
            self.fade_next_write = false;
            ramp(block, true, &mut self.scratch);
            self.buffer.write(pos, &self.scratch, false);
        } else {
            self.buffer.write(pos, block, false);
        }
        self.written = true;
    }

    fn beat_period(&self) -> f64 {
        SAMPLE_RATE as f64 / BLOCK_FRAMES as f64 * 60.0 / self.settings.bpm() as f64
    }

    /// Lay down metronome beats far enough ahead for every listener, including the
    /// ones that will read during the next tick.
    pub fn generate_beats(&mut self, tick: u32) -> usize {
        let lead = self.delay.max(msec_to_blocks(METRONOME_LEAD_MSEC)) as u32;
        let horizon = tick.wrapping_add(lead).wrapping_add(1);
        if !self.started {
            self.started = true;
            self.next_beat = horizon;
            self.beat_frac = 0.0;
            self.bar_pos = 0;
        }
        let mut beats = 0;
        while crate::common::seq_diff(self.next_beat, horizon) <= 0 {
            let bpb = self.settings.beats_per_bar();
            let accent = bpb > 0 && self.bar_pos == 0;
            self.bar_pos = if bpb > 0 { (self.bar_pos + 1) % bpb } else { 0 };
            for n in 0..self.clicks.block_count() {
                self.clicks.fill_block(accent, n, &mut self.scratch);
                self.buffer
                    .write(self.next_beat.wrapping_add(n as u32), &self.scratch, true);
            }
            self.beat_frac += self.beat_period();
            let whole = self.beat_frac.floor();
            self.beat_frac -= whole;
            self.next_beat = self.next_beat.wrapping_add(whole as u32);
            beats += 1;
        }
        beats
    }

    /// Block of reference for one listener.  `listener_delay` is the delay this
    /// listener is currently locked to (None until the first read), `wanted` what its
    /// latency asks for right now.  A change beyond the tolerance fades out, and the
    /// next read fades back in at the new delay.
    pub fn read_for(
        &self,
        tick: u32,
        listener_delay: &mut Option<i32>,
        wanted: i32,
        out: &mut [Sample],
    ) -> bool {
        let wanted = wanted.clamp(0, self.max_delay);
        let (delay, fade_in, fade_out) = match *listener_delay {
            None => {
                *listener_delay = Some(wanted);
                (wanted, true, false)
            }
            Some(cur) if (cur - wanted).abs() as f64 * BLOCK_MSEC > DELAY_TOLERANCE_MSEC => {
                *listener_delay = None;
                (cur, false, true)
            }
            Some(cur) => (cur, false, false),
        };
        self.buffer
            .read_at(tick.wrapping_add(delay as u32), fade_in, fade_out, out)
    }

    /// the reference as it is laid down, without any delay
    pub fn read_at(&self, pos: u32, out: &mut [Sample]) -> bool {
        self.buffer.read_at(pos, false, false, out)
    }
}
