//! Everybody in the room
//!
//! Clients live in an arena of slots indexed by their id.  A slot is handed to a new
//! connection only once its old client is disconnected and the mixer dropped its
//! reference to it, so the mixer can never see a client change identity under it.
//!
//! The seating order is kept separately from the ids.  Whenever it changes, every seated
//! client gets a new angle, spread evenly over the seating arc from left to right.
use log::{debug, info};
use std::{error::Error, fmt, net::SocketAddr, sync::Arc};

use crate::{
    common::{
        audio_block::Sample, choir_packet::ClientHello, seq_diff,
        stream_time_stat::StreamTimeStat, BLOCK_MSEC,
    },
    dsp::smoothing_filter::SmoothingFilter,
    sound::{jitter_buffer::JitterTuning, surround::seat_angle},
};

use super::choir_client::ChoirClient;

// latency estimate settles over a couple of seconds of packets
const LATENCY_TIME_CONST: f64 = 2.0;
const PACKETS_PER_SECOND: f64 = 1000.0 / BLOCK_MSEC;
const ARRIVAL_WINDOW: u64 = 50;

#[derive(Debug, PartialEq)]
pub enum ConnectError {
    /// no slot free (the limit is in there)
    Full(usize),
    /// an active client (the id) already uses this address
    DuplicateAddress(u8),
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectError::Full(max) => write!(f, "room is full ({} clients)", max),
            ConnectError::DuplicateAddress(id) => {
                write!(f, "address already in use by client {}", id)
            }
        }
    }
}

impl Error for ConnectError {}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SeatMove {
    Up,
    Down,
}

struct Slot {
    client: Arc<ChoirClient>,
    latency: SmoothingFilter<f64>,
    arrivals: StreamTimeStat,
    last_arrival: u128,
}

impl Slot {
    fn new(client: ChoirClient) -> Slot {
        Slot {
            client: Arc::new(client),
            latency: SmoothingFilter::build(LATENCY_TIME_CONST, PACKETS_PER_SECOND),
            arrivals: StreamTimeStat::new(ARRIVAL_WINDOW),
            last_arrival: 0,
        }
    }
    fn restart(&mut self) -> () {
        self.latency.reset();
        self.arrivals.clear();
        self.last_arrival = 0;
    }
}

pub struct ClientRegistry {
    slots: Vec<Slot>,
    seating: Vec<u8>,
    max_clients: usize,
    tuning: JitterTuning,
    seat_arc: f64,
}

impl ClientRegistry {
    /// `seat_arc` in radians
    pub fn new(max_clients: usize, tuning: JitterTuning, seat_arc: f64) -> ClientRegistry {
        ClientRegistry {
            slots: vec![],
            seating: vec![],
            max_clients: max_clients.min(u8::MAX as usize),
            tuning,
            seat_arc,
        }
    }

    /// Admit a new client.  The returned handle has to be given to the mixer.
    pub fn connect(
        &mut self,
        address: SocketAddr,
        hello: &ClientHello,
        now: u128,
    ) -> Result<Arc<ChoirClient>, ConnectError> {
        if let Some(dup) = self.active().find(|c| c.address() == address) {
            return Err(ConnectError::DuplicateAddress(dup.id()));
        }
        let mut chosen: Option<usize> = None;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.client.is_connected() {
                continue;
            }
            // only works once the mixer let go
            if let Some(client) = Arc::get_mut(&mut slot.client) {
                client.reset(address, hello, now);
                slot.restart();
                chosen = Some(idx);
                break;
            }
        }
        let idx = match chosen {
            Some(idx) => idx,
            None => {
                if self.slots.len() >= self.max_clients {
                    return Err(ConnectError::Full(self.max_clients));
                }
                let id = self.slots.len();
                let mut client = ChoirClient::new(id as u8, address, self.tuning);
                client.reset(address, hello, now);
                self.slots.push(Slot::new(client));
                id
            }
        };
        let id = idx as u8;
        self.seating.retain(|s| *s != id);
        self.seating.push(id);
        self.reseat();
        info!("client {} '{}' connected from {}", id, hello.name, address);
        Ok(self.slots[idx].client.clone())
    }

    /// Drop a client from the room.  Returns it if it was connected.
    pub fn disconnect(&mut self, id: u8) -> Option<Arc<ChoirClient>> {
        let client = self.slots.get(id as usize)?.client.clone();
        let was_connected = client.is_connected();
        client.disconnect();
        self.seating.retain(|s| *s != id);
        self.reseat();
        if was_connected {
            info!("client {} '{}' disconnected", id, client.name());
            Some(client)
        } else {
            None
        }
    }

    /// move a client one seat to the left (up) or right (down)
    pub fn reorder(&mut self, id: u8, direction: SeatMove) -> () {
        if let Some(pos) = self.seating.iter().position(|s| *s == id) {
            match direction {
                SeatMove::Up if pos > 0 => self.seating.swap(pos, pos - 1),
                SeatMove::Down if pos + 1 < self.seating.len() => self.seating.swap(pos, pos + 1),
                _ => return,
            }
            self.reseat();
        }
    }

    fn reseat(&self) -> () {
        let count = self.seating.len();
        for (idx, id) in self.seating.iter().enumerate() {
            if let Some(slot) = self.slots.get(*id as usize) {
                slot.client
                    .set_seat_angle(seat_angle(idx, count, self.seat_arc));
            }
        }
    }

    /// Disconnect anybody silent for longer than `timeout` microseconds, and clean up
    /// after clients the mixer dropped.  Returns the clients that went away.
    pub fn timeout_sweep(&mut self, now: u128, timeout: u128) -> Vec<Arc<ChoirClient>> {
        let stale: Vec<u8> = self
            .seating
            .iter()
            .filter_map(|id| self.slots.get(*id as usize))
            .filter(|s| {
                !s.client.is_connected()
                    || now.saturating_sub(s.client.last_activity()) > timeout
            })
            .map(|s| s.client.id())
            .collect();
        let mut gone = vec![];
        for id in stale {
            if let Some(slot) = self.slots.get(id as usize) {
                if slot.client.is_connected() {
                    info!("client {} '{}' timed out", id, slot.client.name());
                } else {
                    debug!("client {} reaped", id);
                }
                gone.push(slot.client.clone());
            }
            self.disconnect(id);
        }
        gone
    }

    /// A connected client, but only if the packet really came from its address
    pub fn find(&self, id: u8, address: &SocketAddr) -> Option<&Arc<ChoirClient>> {
        self.slots
            .get(id as usize)
            .map(|s| &s.client)
            .filter(|c| c.is_connected() && c.address() == *address)
    }

    pub fn get(&self, id: u8) -> Option<&Arc<ChoirClient>> {
        self.slots.get(id as usize).map(|s| &s.client)
    }

    /// connected clients by id
    pub fn active(&self) -> impl Iterator<Item = &Arc<ChoirClient>> {
        self.slots
            .iter()
            .map(|s| &s.client)
            .filter(|c| c.is_connected())
    }

    /// connected clients from left to right
    pub fn seated(&self) -> impl Iterator<Item = &Arc<ChoirClient>> {
        self.seating
            .iter()
            .filter_map(|id| self.slots.get(*id as usize))
            .map(|s| &s.client)
            .filter(|c| c.is_connected())
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Audio from a client: update its latency estimate and buffer the block.
    ///
    /// `server_block` is the block the mixer is working on right now.
    pub fn record_audio(
        &mut self,
        id: u8,
        play_index: u32,
        seq: u32,
        block: &[Sample],
        server_block: u32,
        now: u128,
    ) -> bool {
        let slot = match self.slots.get_mut(id as usize) {
            Some(slot) => slot,
            None => return false,
        };
        let client = &slot.client;
        // server to client and back, buffering included
        let blocks = seq_diff(server_block, play_index) + seq_diff(seq, client.buffer().read_pos());
        let raw = blocks as f64 * BLOCK_MSEC;
        let smoothed = slot.latency.get(raw);
        client.set_net_latency(raw as f32, smoothed as f32);
        if slot.last_arrival != 0 {
            slot.arrivals
                .add_sample(now.saturating_sub(slot.last_arrival) as f64);
        }
        slot.last_arrival = now;
        client.touch(now);
        client.buffer().write(seq, block, false)
    }

    /// packet interarrival stats for a client
    pub fn arrival_stats(&self, id: u8) -> Option<&StreamTimeStat> {
        self.slots.get(id as usize).map(|s| &s.arrivals)
    }
}
