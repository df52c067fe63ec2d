//! A singer's side of the conversation with the room
//!
//! The session knows nothing about sockets or sound cards.  It turns what the singer
//! does into datagrams and what the room sends back into playback audio and status
//! text, so whatever drives it (a sound card loop, a test tone) just moves bytes.
use log::{debug, info};

use crate::{
    common::{
        audio_block::{MonoBlock, Sample},
        box_error::BoxError,
        choir_packet::{ClientHello, ClientPacket, ServerPacket, MAX_PACKET_SIZE, PROTOCOL_VERSION},
        status_page::StatusAssembler,
    },
    server::cmd_message::Command,
    sound::jitter_buffer::{BufferStats, JitterTuning, StereoBuffer},
};

/// what came out of a server packet worth telling the caller about
#[derive(Debug, PartialEq)]
pub enum SessionEvent {
    Connected { client_id: u8, init_index: u32 },
    Status(String),
}

pub struct ChoirSession {
    hello: ClientHello,
    client_id: Option<u8>,
    help: String,
    seq: u32,
    command_seq: u32,
    playback: StereoBuffer,
    status: StatusAssembler,
    buf: [u8; MAX_PACKET_SIZE],
}

impl ChoirSession {
    pub fn new(name: &str, device_latency: f32, gain_db: f32, tuning: JitterTuning) -> ChoirSession {
        ChoirSession {
            hello: ClientHello {
                version: PROTOCOL_VERSION,
                device_latency,
                gain_db,
                name: name.to_string(),
            },
            client_id: None,
            help: String::new(),
            seq: 0,
            command_seq: 0,
            playback: StereoBuffer::new(tuning),
            status: StatusAssembler::new(),
            buf: [0; MAX_PACKET_SIZE],
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client_id.is_some()
    }
    pub fn get_client_id(&self) -> Option<u8> {
        self.client_id
    }
    /// command help the server sent with its hello
    pub fn get_help(&self) -> &str {
        &self.help
    }
    pub fn playback(&self) -> &StereoBuffer {
        &self.playback
    }

    /// The hello datagram.  Send it until the server answers.
    pub fn hello_packet(&mut self) -> &[u8] {
        let len = ClientPacket::Hello(self.hello.clone()).encode(&mut self.buf);
        &self.buf[..len]
    }

    /// Take in a datagram from the server
    pub fn handle_packet(&mut self, data: &[u8]) -> Result<Option<SessionEvent>, BoxError> {
        match ServerPacket::parse(data)? {
            ServerPacket::Hello {
                client_id,
                init_index,
                help,
            } => {
                if self.client_id.is_some() {
                    debug!("repeated hello from server ignored");
                    return Ok(None);
                }
                self.client_id = Some(client_id);
                self.help = help;
                self.seq = 0;
                self.command_seq = 0;
                self.playback.clear(init_index);
                info!("joined the room as client {} at block {}", client_id, init_index);
                Ok(Some(SessionEvent::Connected {
                    client_id,
                    init_index,
                }))
            }
            ServerPacket::AudioData { seq, block } => {
                if self.is_connected() && !self.playback.write(seq, &block, false) {
                    debug!("room block {} came too late", seq);
                }
                Ok(None)
            }
            ServerPacket::StatusText {
                page_index,
                page_count,
                generation,
                text,
            } => Ok(self
                .status
                .add_page(page_index, page_count, generation, &text)
                .map(SessionEvent::Status)),
        }
    }

    /// Stamp a captured block.  Nothing to send before the server said hello.
    pub fn audio_packet(&mut self, block: &MonoBlock) -> Option<&[u8]> {
        let client_id = self.client_id?;
        let packet = ClientPacket::AudioData {
            client_id,
            play_index: self.playback.read_pos(),
            seq: self.seq,
            block: *block,
        };
        self.seq = self.seq.wrapping_add(1);
        let len = packet.encode(&mut self.buf);
        Some(&self.buf[..len])
    }

    pub fn command_packet(&mut self, cmd: Command) -> Option<&[u8]> {
        let client_id = self.client_id?;
        self.command_seq += 1;
        let packet = ClientPacket::KeyPress {
            client_id,
            play_index: self.playback.read_pos(),
            command_seq: self.command_seq,
            key: cmd.key(),
        };
        let len = packet.encode(&mut self.buf);
        Some(&self.buf[..len])
    }

    /// keepalive for when there is nothing to say
    pub fn noop_packet(&mut self) -> Option<&[u8]> {
        let client_id = self.client_id?;
        let len = ClientPacket::Noop { client_id }.encode(&mut self.buf);
        Some(&self.buf[..len])
    }

    /// Next block of the room for the speakers.  Call once per block period.
    pub fn read_playback(&self, out: &mut [Sample]) -> bool {
        self.playback.read_next(out)
    }

    pub fn playback_stats(&self) -> BufferStats {
        self.playback.stats_snapshot()
    }
}
