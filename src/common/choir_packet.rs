//! chunks of bytes that go "on the wire" between singers and the room server
//!
//! Very intentionally simple.  One sample rate, one block size, raw 16 bit samples.
//! The first byte of every datagram says what it is, everything after it is packed
//! tight in network byte order.
//!
//! Clients send [`ClientPacket`]s, the server answers with [`ServerPacket`]s.  Sizes
//! are checked exactly so a truncated or padded datagram never reaches the mixer.
use byteorder::{ByteOrder, NetworkEndian};
use num::FromPrimitive;
use simple_error::bail;
use std::fmt;

use super::{
    audio_block::{MonoBlock, Sample, StereoBlock, MONO_BLOCK_SIZE, STEREO_BLOCK_SIZE},
    box_error::BoxError,
};

pub const PROTOCOL_VERSION: u16 = 2;
/// longest display name we keep (in chars)
pub const NAME_LEN: usize = 16;
/// big enough for any datagram either side sends
pub const MAX_PACKET_SIZE: usize = 1024;
/// number of status lines carried by one status page
pub const STATUS_LINES_PER_PAGE: usize = 4;
/// width of one status line
pub const STATUS_WIDTH: usize = 79;

#[derive(FromPrimitive, ToPrimitive, PartialEq, Debug, Clone, Copy)]
pub enum PacketType {
    Hello = 0,
    AudioData,
    StatusText,
    KeyPress,
    Noop,
}

// type + version + device latency + gain, followed by the name
pub const CLIENT_HELLO_HEADER_SIZE: usize = 1 + 2 + 4 + 4;
// type + id + sequence number, followed by the help text
pub const SERVER_HELLO_HEADER_SIZE: usize = 1 + 1 + 4;
// type + id + play index + sequence number + mono block
pub const CLIENT_DATA_SIZE: usize = 1 + 1 + 4 + 4 + MONO_BLOCK_SIZE * 2;
// type + sequence number + stereo block
pub const SERVER_DATA_SIZE: usize = 1 + 4 + STEREO_BLOCK_SIZE * 2;
// type + page index + page count + generation, followed by the text
pub const STATUS_HEADER_SIZE: usize = 1 + 1 + 1 + 4;
// type + id + play index + command sequence + key
pub const KEY_PRESS_SIZE: usize = 1 + 1 + 4 + 4 + 4;
// type + id
pub const NOOP_SIZE: usize = 1 + 1;

const MAX_HELLO_NAME_BYTES: usize = 4 * NAME_LEN;
const MAX_TEXT_BYTES: usize = MAX_PACKET_SIZE - SERVER_HELLO_HEADER_SIZE;

/// Hello as sent by a singer
#[derive(Debug, Clone, PartialEq)]
pub struct ClientHello {
    pub version: u16,
    /// measured round trip of the local sound card in msec (0 if unknown)
    pub device_latency: f32,
    /// initial gain trim in dB
    pub gain_db: f32,
    pub name: String,
}

/// Everything a singer can send to the room
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    Hello(ClientHello),
    AudioData {
        client_id: u8,
        play_index: u32,
        seq: u32,
        block: MonoBlock,
    },
    KeyPress {
        client_id: u8,
        play_index: u32,
        command_seq: u32,
        key: u32,
    },
    Noop {
        client_id: u8,
    },
}

/// Everything the room sends back to a singer
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    Hello {
        client_id: u8,
        init_index: u32,
        help: String,
    },
    AudioData {
        seq: u32,
        block: StereoBlock,
    },
    StatusText {
        page_index: u8,
        page_count: u8,
        generation: u32,
        text: String,
    },
}

fn read_samples(src: &[u8], dst: &mut [Sample]) -> () {
    NetworkEndian::read_i16_into(&src[..dst.len() * 2], dst);
}

fn write_samples(src: &[Sample], dst: &mut [u8]) -> () {
    NetworkEndian::write_i16_into(src, &mut dst[..src.len() * 2]);
}

fn packet_type(data: &[u8]) -> Result<PacketType, BoxError> {
    if data.is_empty() {
        bail!("empty packet");
    }
    match PacketType::from_u8(data[0]) {
        Some(t) => Ok(t),
        None => bail!("unknown packet type {}", data[0]),
    }
}

fn check_size(t: PacketType, amt: usize, expected: usize) -> Result<(), BoxError> {
    if amt != expected {
        bail!("{:?} packet of {} bytes, expected {}", t, amt, expected);
    }
    Ok(())
}

/// truncate a name to NAME_LEN chars and drop anything after a nul
pub fn clean_name(raw: &str) -> String {
    raw.split('\0')
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_control())
        .take(NAME_LEN)
        .collect()
}

fn copy_text(text: &str, max: usize, dst: &mut [u8]) -> usize {
    // never cut a utf-8 char in half
    let mut end = text.len().min(max).min(dst.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    dst[..end].copy_from_slice(&text.as_bytes()[..end]);
    end
}

/// Encode the block the mixer sends to one singer.  Hot path, so no allocation.
pub fn encode_server_audio(buf: &mut [u8], seq: u32, block: &[Sample]) -> usize {
    buf[0] = PacketType::AudioData as u8;
    NetworkEndian::write_u32(&mut buf[1..5], seq);
    write_samples(&block[..STEREO_BLOCK_SIZE], &mut buf[5..SERVER_DATA_SIZE]);
    SERVER_DATA_SIZE
}

impl ClientPacket {
    /// decode a datagram received by the server
    pub fn parse(data: &[u8]) -> Result<ClientPacket, BoxError> {
        let t = packet_type(data)?;
        let amt = data.len();
        match t {
            PacketType::Hello => {
                if amt < CLIENT_HELLO_HEADER_SIZE {
                    bail!("hello packet too short: {}", amt);
                }
                let name_end = amt.min(CLIENT_HELLO_HEADER_SIZE + MAX_HELLO_NAME_BYTES);
                let name = String::from_utf8_lossy(&data[CLIENT_HELLO_HEADER_SIZE..name_end]);
                Ok(ClientPacket::Hello(ClientHello {
                    version: NetworkEndian::read_u16(&data[1..3]),
                    device_latency: NetworkEndian::read_f32(&data[3..7]),
                    gain_db: NetworkEndian::read_f32(&data[7..11]),
                    name: clean_name(&name),
                }))
            }
            PacketType::AudioData => {
                check_size(t, amt, CLIENT_DATA_SIZE)?;
                let mut block: MonoBlock = [0; MONO_BLOCK_SIZE];
                read_samples(&data[10..], &mut block);
                Ok(ClientPacket::AudioData {
                    client_id: data[1],
                    play_index: NetworkEndian::read_u32(&data[2..6]),
                    seq: NetworkEndian::read_u32(&data[6..10]),
                    block,
                })
            }
            PacketType::KeyPress => {
                check_size(t, amt, KEY_PRESS_SIZE)?;
                Ok(ClientPacket::KeyPress {
                    client_id: data[1],
                    play_index: NetworkEndian::read_u32(&data[2..6]),
                    command_seq: NetworkEndian::read_u32(&data[6..10]),
                    key: NetworkEndian::read_u32(&data[10..14]),
                })
            }
            PacketType::Noop => {
                check_size(t, amt, NOOP_SIZE)?;
                Ok(ClientPacket::Noop { client_id: data[1] })
            }
            PacketType::StatusText => bail!("status packets only go to clients"),
        }
    }

    /// the client id the packet claims to come from (hello has none yet)
    pub fn client_id(&self) -> Option<u8> {
        match self {
            ClientPacket::Hello(_) => None,
            ClientPacket::AudioData { client_id, .. } => Some(*client_id),
            ClientPacket::KeyPress { client_id, .. } => Some(*client_id),
            ClientPacket::Noop { client_id } => Some(*client_id),
        }
    }

    /// encode into buf, returns the number of bytes to send
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        match self {
            ClientPacket::Hello(hello) => {
                buf[0] = PacketType::Hello as u8;
                NetworkEndian::write_u16(&mut buf[1..3], hello.version);
                NetworkEndian::write_f32(&mut buf[3..7], hello.device_latency);
                NetworkEndian::write_f32(&mut buf[7..11], hello.gain_db);
                let name = clean_name(&hello.name);
                CLIENT_HELLO_HEADER_SIZE
                    + copy_text(
                        &name,
                        MAX_HELLO_NAME_BYTES,
                        &mut buf[CLIENT_HELLO_HEADER_SIZE..],
                    )
            }
            ClientPacket::AudioData {
                client_id,
                play_index,
                seq,
                block,
            } => {
                buf[0] = PacketType::AudioData as u8;
                buf[1] = *client_id;
                NetworkEndian::write_u32(&mut buf[2..6], *play_index);
                NetworkEndian::write_u32(&mut buf[6..10], *seq);
                write_samples(block, &mut buf[10..CLIENT_DATA_SIZE]);
                CLIENT_DATA_SIZE
            }
            ClientPacket::KeyPress {
                client_id,
                play_index,
                command_seq,
                key,
            } => {
                buf[0] = PacketType::KeyPress as u8;
                buf[1] = *client_id;
                NetworkEndian::write_u32(&mut buf[2..6], *play_index);
                NetworkEndian::write_u32(&mut buf[6..10], *command_seq);
                NetworkEndian::write_u32(&mut buf[10..14], *key);
                KEY_PRESS_SIZE
            }
            ClientPacket::Noop { client_id } => {
                buf[0] = PacketType::Noop as u8;
                buf[1] = *client_id;
                NOOP_SIZE
            }
        }
    }
}

impl ServerPacket {
    /// decode a datagram received by a singer
    pub fn parse(data: &[u8]) -> Result<ServerPacket, BoxError> {
        let t = packet_type(data)?;
        let amt = data.len();
        match t {
            PacketType::Hello => {
                if amt < SERVER_HELLO_HEADER_SIZE {
                    bail!("hello reply too short: {}", amt);
                }
                Ok(ServerPacket::Hello {
                    client_id: data[1],
                    init_index: NetworkEndian::read_u32(&data[2..6]),
                    help: String::from_utf8_lossy(&data[SERVER_HELLO_HEADER_SIZE..]).to_string(),
                })
            }
            PacketType::AudioData => {
                check_size(t, amt, SERVER_DATA_SIZE)?;
                let mut block: StereoBlock = [0; STEREO_BLOCK_SIZE];
                read_samples(&data[5..], &mut block);
                Ok(ServerPacket::AudioData {
                    seq: NetworkEndian::read_u32(&data[1..5]),
                    block,
                })
            }
            PacketType::StatusText => {
                if amt < STATUS_HEADER_SIZE {
                    bail!("status packet too short: {}", amt);
                }
                let page_index = data[1];
                let page_count = data[2];
                if page_count == 0 || page_index >= page_count {
                    bail!("status page {} of {} makes no sense", page_index, page_count);
                }
                Ok(ServerPacket::StatusText {
                    page_index,
                    page_count,
                    generation: NetworkEndian::read_u32(&data[3..7]),
                    text: String::from_utf8_lossy(&data[STATUS_HEADER_SIZE..]).to_string(),
                })
            }
            PacketType::KeyPress | PacketType::Noop => bail!("{:?} only goes to the server", t),
        }
    }

    /// encode into buf, returns the number of bytes to send
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        match self {
            ServerPacket::Hello {
                client_id,
                init_index,
                help,
            } => {
                buf[0] = PacketType::Hello as u8;
                buf[1] = *client_id;
                NetworkEndian::write_u32(&mut buf[2..6], *init_index);
                SERVER_HELLO_HEADER_SIZE
                    + copy_text(help, MAX_TEXT_BYTES, &mut buf[SERVER_HELLO_HEADER_SIZE..])
            }
            ServerPacket::AudioData { seq, block } => encode_server_audio(buf, *seq, block),
            ServerPacket::StatusText {
                page_index,
                page_count,
                generation,
                text,
            } => {
                buf[0] = PacketType::StatusText as u8;
                buf[1] = *page_index;
                buf[2] = *page_count;
                NetworkEndian::write_u32(&mut buf[3..7], *generation);
                STATUS_HEADER_SIZE
                    + copy_text(
                        text,
                        MAX_PACKET_SIZE - STATUS_HEADER_SIZE,
                        &mut buf[STATUS_HEADER_SIZE..],
                    )
            }
        }
    }
}

impl fmt::Display for ClientPacket {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClientPacket::Hello(h) => write!(
                f,
                "{{ hello: {}, version: {}, latency: {:.1}, gain: {:.1} }}",
                h.name, h.version, h.device_latency, h.gain_db
            ),
            ClientPacket::AudioData {
                client_id,
                play_index,
                seq,
                ..
            } => write!(
                f,
                "{{ audio: {}, play: {}, seq: {} }}",
                client_id, play_index, seq
            ),
            ClientPacket::KeyPress {
                client_id,
                command_seq,
                key,
                ..
            } => write!(
                f,
                "{{ key: {}, client: {}, cmd_seq: {} }}",
                key, client_id, command_seq
            ),
            ClientPacket::Noop { client_id } => write!(f, "{{ noop: {} }}", client_id),
        }
    }
}
