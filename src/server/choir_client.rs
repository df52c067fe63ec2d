//! one singer as seen by the server
//!
//! The control thread and the mixer share a client through an `Arc`.  Everything the
//! control thread can change while the mixer runs is an atomic, so neither side ever
//! waits on the other.  The id, address and name only change while the mixer holds no
//! reference (see [`crate::server::client_registry::ClientRegistry`]).
use std::{
    fmt,
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering},
};

use crate::{
    common::{
        atomic_float::{AtomicF32, AtomicF64},
        choir_packet::ClientHello,
        msec_to_blocks,
    },
    sound::jitter_buffer::{JitterTuning, MonoBuffer},
};

/// what we assume for a sound card that did not report its latency
pub const UNKNOWN_DEVICE_LATENCY: f32 = 20.0;
/// gain trim limits in dB
pub const MAX_GAIN_DB: f32 = 30.0;

pub struct ChoirClient {
    id: u8,
    address: SocketAddr,
    name: String,
    buffer: MonoBuffer,
    connected: AtomicBool,
    device_latency: AtomicF32,
    net_latency_raw: AtomicF32,
    net_latency: AtomicF32,
    gain_db: AtomicF32,
    seat_angle: AtomicF64,
    pan_generation: AtomicU32,
    mute_out: AtomicBool,
    mute_in: AtomicBool,
    leader: AtomicBool,
    last_activity: AtomicU64,
    last_command_seq: AtomicI64,
}

impl ChoirClient {
    pub fn new(id: u8, address: SocketAddr, tuning: JitterTuning) -> ChoirClient {
        ChoirClient {
            id,
            address,
            name: String::new(),
            buffer: MonoBuffer::new(tuning),
            connected: AtomicBool::new(false),
            device_latency: AtomicF32::new(0.0),
            net_latency_raw: AtomicF32::new(0.0),
            net_latency: AtomicF32::new(0.0),
            gain_db: AtomicF32::new(0.0),
            seat_angle: AtomicF64::new(0.0),
            pan_generation: AtomicU32::new(0),
            mute_out: AtomicBool::new(false),
            mute_in: AtomicBool::new(false),
            leader: AtomicBool::new(false),
            last_activity: AtomicU64::new(0),
            last_command_seq: AtomicI64::new(0),
        }
    }

    /// Take over the slot for a new connection.  Needs exclusive access, so the mixer
    /// must have let go of it.
    pub fn reset(&mut self, address: SocketAddr, hello: &ClientHello, now: u128) -> () {
        self.address = address;
        self.name = hello.name.clone();
        self.buffer.clear(0);
        self.buffer.level_reset(true);
        self.device_latency
            .store(hello.device_latency.max(0.0), Ordering::Relaxed);
        self.net_latency_raw.store(0.0, Ordering::Relaxed);
        self.net_latency.store(0.0, Ordering::Relaxed);
        self.gain_db.store(
            hello.gain_db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB),
            Ordering::Relaxed,
        );
        self.mute_out.store(false, Ordering::Relaxed);
        self.mute_in.store(false, Ordering::Relaxed);
        self.leader.store(false, Ordering::Relaxed);
        self.last_activity.store(now as u64, Ordering::Relaxed);
        self.last_command_seq.store(0, Ordering::Relaxed);
        self.pan_generation.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Release);
    }

    pub fn id(&self) -> u8 {
        self.id
    }
    pub fn address(&self) -> SocketAddr {
        self.address
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn buffer(&self) -> &MonoBuffer {
        &self.buffer
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
    /// advisory, the mixer lets go of the client on its next tick
    pub fn disconnect(&self) -> () {
        self.connected.store(false, Ordering::Release);
    }

    pub fn touch(&self, now: u128) -> () {
        self.last_activity.store(now as u64, Ordering::Relaxed);
    }
    pub fn last_activity(&self) -> u128 {
        self.last_activity.load(Ordering::Relaxed) as u128
    }

    /// sound card round trip in msec, 0 if unknown
    pub fn device_latency(&self) -> f32 {
        self.device_latency.load(Ordering::Relaxed)
    }
    pub fn set_net_latency(&self, raw: f32, smoothed: f32) -> () {
        self.net_latency_raw.store(raw, Ordering::Relaxed);
        self.net_latency.store(smoothed, Ordering::Relaxed);
    }
    pub fn net_latency_raw(&self) -> f32 {
        self.net_latency_raw.load(Ordering::Relaxed)
    }
    /// smoothed network round trip (including buffering) in msec
    pub fn net_latency(&self) -> f32 {
        self.net_latency.load(Ordering::Relaxed)
    }
    /// total round trip in blocks, used to line the leader track up for this client
    pub fn leader_delay_blocks(&self) -> i32 {
        let device = match self.device_latency() {
            d if d > 0.0 => d,
            _ => UNKNOWN_DEVICE_LATENCY,
        };
        msec_to_blocks((device + self.net_latency()) as f64).max(0)
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db.load(Ordering::Relaxed)
    }
    /// nudge the gain trim, returns the new value
    pub fn adjust_gain(&self, delta: f32) -> f32 {
        let gain = (self.gain_db() + delta).clamp(-MAX_GAIN_DB, MAX_GAIN_DB);
        self.gain_db.store(gain, Ordering::Relaxed);
        self.pan_generation.fetch_add(1, Ordering::Release);
        gain
    }
    pub fn seat_angle(&self) -> f64 {
        self.seat_angle.load(Ordering::Relaxed)
    }
    pub fn set_seat_angle(&self, angle: f64) -> () {
        self.seat_angle.store(angle, Ordering::Relaxed);
        self.pan_generation.fetch_add(1, Ordering::Release);
    }
    /// bumped every time the seat or the trim changes
    pub fn pan_generation(&self) -> u32 {
        self.pan_generation.load(Ordering::Acquire)
    }

    /// others do not hear this client
    pub fn mute_out(&self) -> bool {
        self.mute_out.load(Ordering::Relaxed)
    }
    pub fn set_mute_out(&self, mute: bool) -> () {
        self.mute_out.store(mute, Ordering::Relaxed);
    }
    /// this client gets no audio
    pub fn mute_in(&self) -> bool {
        self.mute_in.load(Ordering::Relaxed)
    }
    pub fn set_mute_in(&self, mute: bool) -> () {
        self.mute_in.store(mute, Ordering::Relaxed);
    }
    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::Acquire)
    }
    pub fn set_leader(&self, leader: bool) -> () {
        self.leader.store(leader, Ordering::Release);
    }

    /// Commands carry an increasing sequence number.  Returns true (and remembers it)
    /// only if this one is newer than anything accepted so far.
    pub fn accept_command(&self, command_seq: u32) -> bool {
        let seq = command_seq as i64;
        if seq <= self.last_command_seq.load(Ordering::Relaxed) {
            return false;
        }
        self.last_command_seq.store(seq, Ordering::Relaxed);
        true
    }
}

impl fmt::Display for ChoirClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ id: {}, name: {}, address: {}, connected: {} }}",
            self.id,
            self.name,
            self.address,
            self.is_connected()
        )
    }
}
