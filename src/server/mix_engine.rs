//! The block clock of the room
//!
//! Once per block (128 frames, 2.667 msec) the engine pulls one block out of every
//! client's jitter buffer, places it in the room, and sends each singer the sum of
//! everybody else plus the leader track lined up for their round trip.
//!
//! Nothing in here waits on another thread.  New clients arrive through a channel
//! that is drained at the top of every tick, the recorder gets its blocks with
//! `try_send`, and everything else is atomics.
use log::{debug, info, warn};
use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        mpsc, Arc,
    },
    thread,
    time::{Duration, Instant},
};

#[cfg(test)]
use mockall::automock;

use crate::{
    common::{
        atomic_float::AtomicF32,
        audio_block::{saturate, MonoBlock, StereoBlock, MONO_BLOCK_SIZE, STEREO_BLOCK_SIZE},
        choir_packet::{encode_server_audio, SERVER_DATA_SIZE},
        BLOCK_FRAMES, BLOCK_MICROS, SAMPLE_RATE,
    },
    sound::surround::{SurroundPanner, SEAT_DISTANCE},
};

use super::{
    choir_client::ChoirClient,
    leader_sync::{LeaderSource, LeaderSync},
    recorder::RecorderMessage,
};

/// ticks per load report
pub const REPORT_BLOCKS: u32 = 1000;
/// this far behind the clock we stop trying to catch up
pub const MAX_CATCHUP_BLOCKS: u64 = 100;

/// where the mixed blocks go.  The socket in real life.
#[cfg_attr(test, automock)]
pub trait PacketSender: Send {
    fn send_packet(&self, data: &[u8], addr: &SocketAddr) -> io::Result<usize>;
}

impl PacketSender for UdpSocket {
    fn send_packet(&self, data: &[u8], addr: &SocketAddr) -> io::Result<usize> {
        self.send_to(data, addr)
    }
}

pub enum MixCommand {
    /// start mixing a freshly connected client
    Attach(Arc<ChoirClient>),
}

/// State the mixer publishes for (and takes from) the control thread
pub struct EngineShared {
    block_index: AtomicU32,
    running: AtomicBool,
    recording: AtomicBool,
    recording_start: AtomicU32,
    record_leader: AtomicBool,
    overruns: AtomicU64,
    recorder_drops: AtomicU64,
    load_avg: AtomicF32,
    load_max: AtomicF32,
}

impl EngineShared {
    pub fn new(record_leader: bool) -> EngineShared {
        EngineShared {
            block_index: AtomicU32::new(0),
            running: AtomicBool::new(true),
            recording: AtomicBool::new(false),
            recording_start: AtomicU32::new(0),
            record_leader: AtomicBool::new(record_leader),
            overruns: AtomicU64::new(0),
            recorder_drops: AtomicU64::new(0),
            load_avg: AtomicF32::new(0.0),
            load_max: AtomicF32::new(0.0),
        }
    }
    /// the block the mixer works on next
    pub fn block_index(&self) -> u32 {
        self.block_index.load(Ordering::Acquire)
    }
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
    /// ask the mix loop to end after the current tick
    pub fn stop(&self) -> () {
        self.running.store(false, Ordering::Release);
    }

    /// Called by the recorder once its file is open, so no block can arrive before
    /// there is somewhere to put it.
    pub fn start_recording(&self) -> () {
        self.recording_start
            .store(self.block_index(), Ordering::Relaxed);
        self.recording.store(true, Ordering::Release);
    }
    /// no more blocks for the recorder after this
    pub fn stop_recording(&self) -> () {
        self.recording.store(false, Ordering::Release);
    }
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }
    /// seconds recorded so far
    pub fn recording_secs(&self) -> u32 {
        if !self.is_recording() {
            return 0;
        }
        let blocks = self
            .block_index()
            .wrapping_sub(self.recording_start.load(Ordering::Relaxed));
        (blocks as u64 * BLOCK_FRAMES as u64 / SAMPLE_RATE as u64) as u32
    }
    pub fn record_leader(&self) -> bool {
        self.record_leader.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
    pub fn recorder_drops(&self) -> u64 {
        self.recorder_drops.load(Ordering::Relaxed)
    }
    /// mixer load in percent over the last report window: (average, worst block)
    pub fn load(&self) -> (f32, f32) {
        (
            self.load_avg.load(Ordering::Relaxed),
            self.load_max.load(Ordering::Relaxed),
        )
    }
}

struct MixChannel {
    client: Arc<ChoirClient>,
    panner: SurroundPanner,
    pan_generation: u32,
    mono: MonoBlock,
    panned: StereoBlock,
    accumulated: bool,
    leader_delay: Option<i32>,
}

impl MixChannel {
    fn new(client: Arc<ChoirClient>) -> MixChannel {
        let mut panner = SurroundPanner::new();
        panner.initialize(client.gain_db() as f64, client.seat_angle(), SEAT_DISTANCE);
        MixChannel {
            pan_generation: client.pan_generation(),
            client,
            panner,
            mono: [0; MONO_BLOCK_SIZE],
            panned: [0; STEREO_BLOCK_SIZE],
            accumulated: false,
            leader_delay: None,
        }
    }
}

/// Nanoseconds from the start of the clock to the start of tick `k`
pub fn tick_due_nanos(k: u64) -> u64 {
    k * BLOCK_FRAMES as u64 * 1_000_000_000 / SAMPLE_RATE as u64
}

pub struct MixEngine<S: PacketSender> {
    sender: S,
    shared: Arc<EngineShared>,
    leader: LeaderSync,
    cmd_rx: mpsc::Receiver<MixCommand>,
    recorder_tx: Option<mpsc::SyncSender<RecorderMessage>>,
    channels: Vec<MixChannel>,
    tick: u32,
    mixed: [i32; STEREO_BLOCK_SIZE],
    out: StereoBlock,
    reference: StereoBlock,
    packet: [u8; SERVER_DATA_SIZE],
    send_errors: u64,
    // load accounting for the current report window, in microseconds
    free_sum: f64,
    free_min: f64,
    window_ticks: u32,
}

impl<S: PacketSender> MixEngine<S> {
    pub fn new(
        sender: S,
        shared: Arc<EngineShared>,
        leader: LeaderSync,
        cmd_rx: mpsc::Receiver<MixCommand>,
        recorder_tx: Option<mpsc::SyncSender<RecorderMessage>>,
    ) -> MixEngine<S> {
        MixEngine {
            tick: shared.block_index(),
            sender,
            shared,
            leader,
            cmd_rx,
            recorder_tx,
            channels: vec![],
            mixed: [0; STEREO_BLOCK_SIZE],
            out: [0; STEREO_BLOCK_SIZE],
            reference: [0; STEREO_BLOCK_SIZE],
            packet: [0; SERVER_DATA_SIZE],
            send_errors: 0,
            free_sum: 0.0,
            free_min: f64::MAX,
            window_ticks: 0,
        }
    }

    pub fn get_tick(&self) -> u32 {
        self.tick
    }
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
    pub fn get_sender(&self) -> &S {
        &self.sender
    }

    fn drain_commands(&mut self) -> () {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                MixCommand::Attach(client) => {
                    // a reconnect through the same slot replaces the old channel
                    self.channels.retain(|c| !Arc::ptr_eq(&c.client, &client));
                    self.channels.push(MixChannel::new(client));
                }
            }
        }
        // letting go of the Arc is what allows the registry to reuse the slot
        self.channels.retain(|c| c.client.is_connected());
    }

    /// Run one block period worth of mixing
    pub fn tick(&mut self) -> () {
        self.drain_commands();
        let tick = self.tick;
        if self.leader.begin_tick(tick) {
            for ch in self.channels.iter_mut() {
                ch.leader_delay = None;
            }
        }
        let source = self.leader.source();

        // pull, pan and accumulate
        self.mixed.fill(0);
        let mut leader_idx: Option<usize> = None;
        let mut needed = 0;
        for (idx, ch) in self.channels.iter_mut().enumerate() {
            let generation = ch.client.pan_generation();
            if generation != ch.pan_generation {
                ch.pan_generation = generation;
                ch.panner.initialize(
                    ch.client.gain_db() as f64,
                    ch.client.seat_angle(),
                    SEAT_DISTANCE,
                );
            }
            ch.client.buffer().read_next(&mut ch.mono);
            ch.panner.apply(&ch.mono, &mut ch.panned);
            ch.accumulated = false;
            if source == LeaderSource::Human && ch.client.is_leader() && leader_idx.is_none() {
                leader_idx = Some(idx);
                continue;
            }
            if !ch.client.mute_in() {
                needed = needed.max(ch.client.leader_delay_blocks());
            }
            if ch.client.mute_out() {
                continue;
            }
            for (m, v) in self.mixed.iter_mut().zip(ch.panned.iter()) {
                *m += *v as i32;
            }
            ch.accumulated = true;
        }

        if self.leader.is_active() {
            self.leader.update_delay(needed);
        }
        if let Some(idx) = leader_idx {
            if !self.channels[idx].client.mute_out() {
                self.leader.write_leader(tick, &self.channels[idx].panned);
            }
        }

        // everybody gets the room minus themselves plus their copy of the leader
        let reference_on = self.leader.is_active();
        for (idx, ch) in self.channels.iter_mut().enumerate() {
            if ch.client.mute_in() {
                continue;
            }
            if Some(idx) == leader_idx {
                for (o, m) in self.out.iter_mut().zip(self.mixed.iter()) {
                    *o = saturate(*m);
                }
            } else {
                let have_reference = reference_on
                    && self.leader.read_for(
                        tick,
                        &mut ch.leader_delay,
                        ch.client.leader_delay_blocks(),
                        &mut self.reference,
                    );
                for i in 0..STEREO_BLOCK_SIZE {
                    let mut v = self.mixed[i];
                    if ch.accumulated {
                        v -= ch.panned[i] as i32;
                    }
                    if have_reference {
                        v += self.reference[i] as i32;
                    }
                    self.out[i] = saturate(v);
                }
            }
            let len = encode_server_audio(&mut self.packet, tick, &self.out);
            if let Err(e) = self
                .sender
                .send_packet(&self.packet[..len], &ch.client.address())
            {
                self.send_errors += 1;
                warn!(
                    "send to client {} '{}' failed, dropping it: {}",
                    ch.client.id(),
                    ch.client.name(),
                    e
                );
                ch.client.disconnect();
            }
        }

        if self.shared.is_recording() {
            self.record(tick, source, leader_idx);
        }
        if source == LeaderSource::Metronome {
            self.leader.generate_beats(tick);
        }

        self.tick = tick.wrapping_add(1);
        self.shared.block_index.store(self.tick, Ordering::Release);
    }

    fn record(&mut self, tick: u32, source: LeaderSource, leader_idx: Option<usize>) -> () {
        let tx = match &self.recorder_tx {
            Some(tx) => tx,
            None => return,
        };
        let with_leader = self.shared.record_leader()
            && match source {
                LeaderSource::Human => match leader_idx {
                    Some(idx) => {
                        self.reference.copy_from_slice(&self.channels[idx].panned);
                        true
                    }
                    None => false,
                },
                LeaderSource::Metronome => self.leader.read_at(tick, &mut self.reference),
                LeaderSource::Off => false,
            };
        let mut block: StereoBlock = [0; STEREO_BLOCK_SIZE];
        for i in 0..STEREO_BLOCK_SIZE {
            let mut v = self.mixed[i];
            if with_leader {
                v += self.reference[i] as i32;
            }
            block[i] = saturate(v);
        }
        match tx.try_send(RecorderMessage::Block(block)) {
            Ok(()) => {}
            Err(mpsc::TrySendError::Full(_)) => {
                let drops = self.shared.recorder_drops.fetch_add(1, Ordering::Relaxed) + 1;
                if drops % 100 == 1 {
                    warn!("recorder is behind, {} blocks dropped", drops);
                }
            }
            Err(mpsc::TrySendError::Disconnected(_)) => {
                warn!("recorder went away");
                self.recorder_tx = None;
            }
        }
    }

    // slack is how much of the block period was left after the tick (negative if late)
    fn account(&mut self, slack_us: f64) -> () {
        self.free_sum += slack_us;
        self.free_min = self.free_min.min(slack_us);
        self.window_ticks += 1;
        if self.window_ticks >= REPORT_BLOCKS {
            let total = BLOCK_MICROS * self.window_ticks as f64;
            let avg = (total - self.free_sum) / total * 100.0;
            let max = (BLOCK_MICROS - self.free_min) / BLOCK_MICROS * 100.0;
            self.shared.load_avg.store(avg as f32, Ordering::Relaxed);
            self.shared.load_max.store(max as f32, Ordering::Relaxed);
            self.free_sum = 0.0;
            self.free_min = f64::MAX;
            self.window_ticks = 0;
        }
    }

    /// Tick against the monotonic clock until told to stop.  Sleeps only while ahead,
    /// catches up without sleeping when behind.
    pub fn run(&mut self) -> () {
        info!("mixer running from block {}", self.tick);
        let mut base = Instant::now();
        let mut ticks: u64 = 0;
        while self.shared.is_running() {
            self.tick();
            ticks += 1;
            let due = base + Duration::from_nanos(tick_due_nanos(ticks));
            let now = Instant::now();
            if due > now {
                let slack = due - now;
                self.account(slack.as_micros() as f64);
                thread::sleep(slack);
            } else {
                let late = now - due;
                self.account(-(late.as_micros() as f64));
                let overruns = self.shared.overruns.fetch_add(1, Ordering::Relaxed) + 1;
                if overruns % 1000 == 1 {
                    debug!("mixer overrun {} ({:?} late)", overruns, late);
                }
                if late > Duration::from_nanos(tick_due_nanos(MAX_CATCHUP_BLOCKS)) {
                    warn!("mixer fell {:?} behind, restarting the clock", late);
                    base = now;
                    ticks = 0;
                }
            }
        }
        info!(
            "mixer stopped at block {} ({} send errors)",
            self.tick, self.send_errors
        );
    }
}
