//! A synthetic singer: streams a sine tone into the room and prints what comes back
//!
//! Handy for checking a server without a sound card.  It keeps block time the same way
//! the mixer does, so the room sees a well behaved client.
use log::{debug, info, warn};
use simple_error::bail;
use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    thread,
    time::{Duration, Instant},
};

use crate::{
    common::{
        audio_block::{saturate, MonoBlock, StereoBlock, MONO_BLOCK_SIZE, STEREO_BLOCK_SIZE},
        box_error::BoxError,
        choir_packet::MAX_PACKET_SIZE,
        sock_with_tos, SAMPLE_RATE,
    },
    dsp::tone_osc::ToneOsc,
    server::{cmd_message::Command, mix_engine::tick_due_nanos},
    sound::jitter_buffer::JitterTuning,
};

use super::choir_session::{ChoirSession, SessionEvent};

/// how long to keep saying hello before giving up
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HELLO_RETRY: Duration = Duration::from_millis(500);
/// blocks between two scripted key presses
const KEY_GAP_BLOCKS: u64 = 375;

pub struct ProbeOptions {
    pub server: SocketAddr,
    pub name: String,
    pub frequency: f64,
    /// 0 to 1 of full scale
    pub level: f64,
    pub seconds: u64,
    /// keys to press, one every second, once connected
    pub keys: String,
}

fn drain(sock: &UdpSocket, server: &SocketAddr, session: &mut ChoirSession) -> Result<(), BoxError> {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    loop {
        match sock.recv_from(&mut buf) {
            Ok((amt, src)) => {
                if src != *server {
                    continue;
                }
                match session.handle_packet(&buf[..amt]) {
                    Ok(Some(SessionEvent::Status(text))) => println!("{}", text),
                    Ok(Some(SessionEvent::Connected { client_id, .. })) => {
                        println!("connected as client {}", client_id);
                        println!("{}", session.get_help());
                    }
                    Ok(None) => {}
                    Err(e) => debug!("bad packet from server: {}", e),
                }
            }
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => return Ok(()),
                ErrorKind::ConnectionReset => return Ok(()),
                _ => return Err(e.into()),
            },
        }
    }
}

fn connect(sock: &UdpSocket, opts: &ProbeOptions, session: &mut ChoirSession) -> Result<(), BoxError> {
    let start = Instant::now();
    while !session.is_connected() {
        if start.elapsed() > CONNECT_TIMEOUT {
            bail!("no answer from {}", opts.server);
        }
        sock.send_to(session.hello_packet(), opts.server)?;
        let wait = Instant::now();
        while !session.is_connected() && wait.elapsed() < HELLO_RETRY {
            drain(sock, &opts.server, session)?;
            thread::sleep(Duration::from_millis(5));
        }
    }
    Ok(())
}

/// Run the probe until the time is up
pub fn run(opts: ProbeOptions) -> Result<(), BoxError> {
    let sock = sock_with_tos::new(0, None)?;
    sock.set_nonblocking(true)?;
    let mut session = ChoirSession::new(&opts.name, 0.0, 0.0, JitterTuning::default());
    connect(&sock, &opts, &mut session)?;

    let mut osc: ToneOsc<f64> = ToneOsc::new();
    osc.init(opts.frequency, opts.level.clamp(0.0, 1.0), SAMPLE_RATE as f64);
    let mut keys: Vec<Command> = vec![];
    for c in opts.keys.chars() {
        match Command::from_char(c) {
            Some(cmd) => keys.push(cmd),
            None => warn!("'{}' is not a command key", c),
        }
    }
    keys.reverse();

    let total = opts.seconds * SAMPLE_RATE as u64 / MONO_BLOCK_SIZE as u64;
    let mut tone: MonoBlock = [0; MONO_BLOCK_SIZE];
    let mut room: StereoBlock = [0; STEREO_BLOCK_SIZE];
    let mut heard = 0u64;
    let base = Instant::now();
    for block in 0..total {
        drain(&sock, &opts.server, &mut session)?;
        for s in tone.iter_mut() {
            *s = saturate((osc.get_sample() * i16::MAX as f64) as i32);
        }
        if let Some(packet) = session.audio_packet(&tone) {
            sock.send_to(packet, opts.server)?;
        }
        if block > 0 && block % KEY_GAP_BLOCKS == 0 {
            if let Some(cmd) = keys.pop() {
                info!("pressing {}", cmd);
                if let Some(packet) = session.command_packet(cmd) {
                    sock.send_to(packet, opts.server)?;
                }
            }
        }
        if session.read_playback(&mut room) {
            heard += 1;
        }
        let due = base + Duration::from_nanos(tick_due_nanos(block + 1));
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
    let stats = session.playback_stats();
    info!(
        "{} of {} blocks from the room played, {} lost, {} skipped",
        heard, total, stats.lost, stats.skipped
    );
    Ok(())
}
