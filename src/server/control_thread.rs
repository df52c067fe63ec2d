//! Everything that is not mixing
//!
//! One thread owns the receive side of the socket and the client registry.  It admits
//! singers, feeds their audio into the jitter buffers, carries out key presses, and
//! every so often tells everybody what the room looks like.
use log::{debug, info, warn};
use serde_json::json;
use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    sync::{mpsc, Arc},
};

use crate::{
    common::{
        box_error::BoxError,
        choir_packet::{ClientHello, ClientPacket, ServerPacket, MAX_PACKET_SIZE, PROTOCOL_VERSION},
        config::ServerSettings,
        get_micro_time, seq_diff,
        status_page::StatusPager,
    },
    sound::{jitter_buffer::JitterTuning, surround::degrees_to_radians},
    utils::MIN_DB,
};

use super::{
    choir_client::ChoirClient,
    client_registry::{ClientRegistry, SeatMove},
    cmd_message::{Command, HELP_TEXT},
    leader_sync::{LeaderSettings, LeaderSource},
    mix_engine::{EngineShared, MixCommand, PacketSender},
    recorder::RecorderMessage,
};

/// how often silent clients are looked for
pub const SWEEP_BLOCKS: u32 = 50;
const METER_CELLS: usize = 24;
const NAME_WIDTH: usize = 10;

/// A bar graph of a level, `#` up to the average and `+` up to the peak
pub fn level_meter(avg_db: f64, peak_db: f64) -> String {
    let step = -MIN_DB / METER_CELLS as f64;
    let mut meter = String::with_capacity(METER_CELLS + 2);
    meter.push('[');
    for i in (1..=METER_CELLS).rev() {
        let db = -(i as f64) * step;
        meter.push(if avg_db > db {
            '#'
        } else if peak_db > db {
            '+'
        } else {
            '-'
        });
    }
    meter.push(']');
    meter
}

/// One line of the status picture for a client
pub fn client_line(client: &ChoirClient) -> String {
    let name: String = client.name().chars().take(NAME_WIDTH).collect();
    let device = match client.device_latency() {
        d if d > 0.0 => format!("{:3.0}", d),
        _ => "  ?".to_string(),
    };
    let flags = format!(
        "{}{}{}",
        if client.is_leader() { 'L' } else { ' ' },
        if client.mute_out() { 'o' } else { ' ' },
        if client.mute_in() { 'i' } else { ' ' }
    );
    let level = client.buffer().level_snapshot();
    let gain = client.gain_db() as f64;
    let avg = (level.avg_db + gain).max(MIN_DB);
    let peak = (level.peak_db + gain).max(MIN_DB);
    format!(
        "{:<width$}{}+{:<4.0}ms {} {} {:4.0} dB",
        name,
        device,
        client.net_latency(),
        flags,
        level_meter(avg, peak),
        avg,
        width = NAME_WIDTH
    )
}

pub struct ControlPlane {
    registry: ClientRegistry,
    shared: Arc<EngineShared>,
    leader: Arc<LeaderSettings>,
    mix_tx: mpsc::Sender<MixCommand>,
    recorder_tx: Option<mpsc::SyncSender<RecorderMessage>>,
    recording_dir: String,
    timeout_us: u128,
    status_interval: u32,
    report_interval: u32,
    pager: StatusPager,
    next_status: u32,
    next_report: u32,
    next_sweep: u32,
    out_buf: [u8; MAX_PACKET_SIZE],
}

impl ControlPlane {
    pub fn new(
        settings: &ServerSettings,
        shared: Arc<EngineShared>,
        leader: Arc<LeaderSettings>,
        mix_tx: mpsc::Sender<MixCommand>,
        recorder_tx: Option<mpsc::SyncSender<RecorderMessage>>,
    ) -> ControlPlane {
        let tuning = JitterTuning::new(
            settings.buffer_blocks,
            settings.skip_period,
            settings.jump_window,
        );
        ControlPlane {
            registry: ClientRegistry::new(
                settings.max_clients,
                tuning,
                degrees_to_radians(settings.seat_arc_degrees),
            ),
            shared,
            leader,
            mix_tx,
            recorder_tx,
            recording_dir: settings.recording_dir.clone(),
            timeout_us: settings.client_timeout_ms as u128 * 1000,
            status_interval: settings.status_interval_blocks,
            report_interval: settings.report_interval_blocks,
            pager: StatusPager::new(),
            next_status: 0,
            next_report: settings.report_interval_blocks,
            next_sweep: 0,
            out_buf: [0; MAX_PACKET_SIZE],
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    fn send(&mut self, packet: &ServerPacket, to: &SocketAddr, sender: &impl PacketSender) -> () {
        let len = packet.encode(&mut self.out_buf);
        if let Err(e) = sender.send_packet(&self.out_buf[..len], to) {
            debug!("send to {} failed: {}", to, e);
        }
    }

    /// Deal with one datagram.  Only fails if the mixer is gone.
    pub fn handle_packet(
        &mut self,
        data: &[u8],
        src: SocketAddr,
        now: u128,
        sender: &impl PacketSender,
    ) -> Result<(), BoxError> {
        let packet = match ClientPacket::parse(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("dropped packet from {}: {}", src, e);
                return Ok(());
            }
        };
        match packet {
            ClientPacket::Hello(hello) => self.hello(hello, src, now, sender)?,
            ClientPacket::AudioData {
                client_id,
                play_index,
                seq,
                block,
            } => {
                if self.registry.find(client_id, &src).is_none() {
                    debug!("audio for client {} from stranger {}", client_id, src);
                    return Ok(());
                }
                let server_block = self.shared.block_index();
                if !self
                    .registry
                    .record_audio(client_id, play_index, seq, &block, server_block, now)
                {
                    debug!("late block {} from client {}", seq, client_id);
                }
            }
            ClientPacket::KeyPress {
                client_id,
                command_seq,
                key,
                ..
            } => {
                let client = match self.registry.find(client_id, &src) {
                    Some(client) => client.clone(),
                    None => {
                        debug!("key press for client {} from stranger {}", client_id, src);
                        return Ok(());
                    }
                };
                client.touch(now);
                if !client.accept_command(command_seq) {
                    debug!("stale command {} from client {}", command_seq, client_id);
                    return Ok(());
                }
                match Command::from_key(key) {
                    Ok(cmd) => {
                        info!("{} pressed by '{}'", cmd, client.name());
                        self.command(&client, cmd)?;
                    }
                    Err(e) => debug!("client {}: {}", client_id, e),
                }
            }
            ClientPacket::Noop { client_id } => {
                if let Some(client) = self.registry.find(client_id, &src) {
                    client.touch(now);
                }
            }
        }
        Ok(())
    }

    fn hello(
        &mut self,
        hello: ClientHello,
        src: SocketAddr,
        now: u128,
        sender: &impl PacketSender,
    ) -> Result<(), BoxError> {
        if hello.version != PROTOCOL_VERSION {
            warn!(
                "refused '{}' from {}: protocol {} instead of {}",
                hello.name, src, hello.version, PROTOCOL_VERSION
            );
            return Ok(());
        }
        let client = match self.registry.connect(src, &hello, now) {
            Ok(client) => client,
            Err(e) => {
                warn!("refused '{}' from {}: {}", hello.name, src, e);
                return Ok(());
            }
        };
        let reply = ServerPacket::Hello {
            client_id: client.id(),
            init_index: self.shared.block_index(),
            help: HELP_TEXT.to_string(),
        };
        self.send(&reply, &src, sender);
        self.mix_tx.send(MixCommand::Attach(client))?;
        Ok(())
    }

    /// carry out a key press
    pub fn command(&mut self, client: &Arc<ChoirClient>, cmd: Command) -> Result<(), BoxError> {
        match cmd {
            Command::MoveUp => self.registry.reorder(client.id(), SeatMove::Up),
            Command::MoveDown => self.registry.reorder(client.id(), SeatMove::Down),
            Command::Record => self.toggle_recording()?,
            Command::Metronome => {
                if self.leader.source() == LeaderSource::Metronome {
                    self.leader.set_source(LeaderSource::Off);
                } else {
                    for c in self.registry.active() {
                        c.set_leader(false);
                    }
                    self.leader.set_source(LeaderSource::Metronome);
                }
            }
            Command::SlowDown => {
                self.leader.adjust_bpm(-2.0);
            }
            Command::SpeedUp => {
                self.leader.adjust_bpm(2.0);
            }
            Command::SlowDownBig => {
                self.leader.adjust_bpm(-20.0);
            }
            Command::SpeedUpBig => {
                self.leader.adjust_bpm(20.0);
            }
            Command::FewerBeats => {
                self.leader.adjust_beats_per_bar(-1);
            }
            Command::MoreBeats => {
                self.leader.adjust_beats_per_bar(1);
            }
            Command::Leader => {
                if client.is_leader() {
                    client.set_leader(false);
                    self.leader.set_source(LeaderSource::Off);
                } else {
                    for c in self.registry.active() {
                        c.set_leader(false);
                    }
                    client.set_leader(true);
                    self.leader.set_source(LeaderSource::Human);
                }
            }
            Command::MuteOut => client.set_mute_out(!client.mute_out()),
            Command::MuteIn => client.set_mute_in(!client.mute_in()),
            Command::GainDown => {
                client.adjust_gain(-1.0);
            }
            Command::GainUp => {
                client.adjust_gain(1.0);
            }
        }
        Ok(())
    }

    fn toggle_recording(&mut self) -> Result<(), BoxError> {
        let tx = match &self.recorder_tx {
            Some(tx) => tx,
            None => {
                warn!("recording is not available");
                return Ok(());
            }
        };
        if self.shared.is_recording() {
            // the mixer stops first so the stop is the last thing the recorder sees
            self.shared.stop_recording();
            tx.send(RecorderMessage::Stop)?;
        } else {
            // the recorder turns recording on once its file is open
            tx.send(RecorderMessage::Start(self.recording_dir.clone()))?;
        }
        Ok(())
    }

    fn build_status(&mut self) -> () {
        self.pager.begin();
        self.pager.add_line(None, "---------------------  left");
        let lines: Vec<(u8, String)> = self
            .registry
            .seated()
            .map(|c| (c.id(), client_line(c)))
            .collect();
        for (id, line) in lines {
            self.pager.add_line(Some(id), &line);
        }
        self.pager.add_line(None, "---------------------  right");
        self.pager.add_line(None, "");
        self.pager.add_line(
            None,
            &format!(
                "metronome:        {:>3} {:2} beats per bar, {:3.0} beats per minute",
                if self.leader.source() == LeaderSource::Metronome {
                    "ON"
                } else {
                    "OFF"
                },
                self.leader.beats_per_bar(),
                self.leader.bpm()
            ),
        );
        let leader = match self.leader.source() {
            LeaderSource::Human => self
                .registry
                .active()
                .find(|c| c.is_leader())
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "?".to_string()),
            LeaderSource::Metronome => "metronome".to_string(),
            LeaderSource::Off => "nobody".to_string(),
        };
        self.pager
            .add_line(None, &format!("leader:           {}", leader));
        if self.shared.is_recording() {
            let secs = self.shared.recording_secs();
            self.pager.add_line(
                None,
                &format!("recording:         ON  {:02}:{:02}", secs / 60, secs % 60),
            );
        } else {
            self.pager.add_line(None, "recording:        OFF");
        }
    }

    fn send_status(&mut self, sender: &impl PacketSender) -> () {
        self.build_status();
        let targets: Vec<(u8, SocketAddr)> = self
            .registry
            .active()
            .map(|c| (c.id(), c.address()))
            .collect();
        for (id, addr) in targets {
            for page in self.pager.pages_for(id) {
                self.send(&page, &addr, sender);
            }
        }
    }

    fn report(&self) -> () {
        info!("BLOCKS      play  lost  wait  skip  delay  lead       read    write");
        let lead_on = self.leader.source() != LeaderSource::Off;
        for c in self.registry.seated() {
            let stats = c.buffer().stats_snapshot();
            info!(
                "{:<10} {:5} {:5} {:5} {:5} {:6} {:5}   {:8} {:8}",
                c.name(),
                stats.played,
                stats.lost,
                stats.waited,
                stats.skipped,
                stats.delay,
                if lead_on { c.leader_delay_blocks() } else { 0 },
                c.buffer().read_pos(),
                c.buffer().write_last_pos()
            );
            debug!(
                "{}",
                json!({
                    "client": c.id(),
                    "name": c.name(),
                    "buffer": stats,
                    "net_latency": c.net_latency(),
                    "gain_db": c.gain_db(),
                    "arrivals": self.registry.arrival_stats(c.id()),
                })
            );
        }
        let (avg, max) = self.shared.load();
        info!(
            "mixer load: {:6.2} % avg, {:6.2} % max, {} overruns, {} recorder drops",
            avg,
            max,
            self.shared.overruns(),
            self.shared.recorder_drops()
        );
    }

    fn sweep(&mut self, now: u128) -> () {
        let gone = self.registry.timeout_sweep(now, self.timeout_us);
        for client in gone {
            if client.is_leader() {
                client.set_leader(false);
                if self.leader.source() == LeaderSource::Human {
                    info!("leader '{}' left", client.name());
                    self.leader.set_source(LeaderSource::Off);
                }
            }
        }
    }

    /// The periodic jobs, driven by the mixer's block counter
    pub fn housekeeping(&mut self, block: u32, now: u128, sender: &impl PacketSender) -> () {
        if seq_diff(block, self.next_sweep) >= 0 {
            self.next_sweep = block.wrapping_add(SWEEP_BLOCKS);
            self.sweep(now);
        }
        if seq_diff(block, self.next_status) >= 0 {
            self.next_status = block.wrapping_add(self.status_interval);
            self.send_status(sender);
        }
        if seq_diff(block, self.next_report) >= 0 {
            self.next_report = block.wrapping_add(self.report_interval);
            self.report();
        }
    }

    /// Receive loop.  The socket needs a read timeout so the periodic jobs keep running
    /// when nobody is talking.
    pub fn run(&mut self, sock: &UdpSocket) -> Result<(), BoxError> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        while self.shared.is_running() {
            match sock.recv_from(&mut buf) {
                Ok((amt, src)) => {
                    self.handle_packet(&buf[..amt], src, get_micro_time(), sock)?;
                }
                Err(e) => match e.kind() {
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {}
                    // a previous send bounced (windows reports it here)
                    ErrorKind::ConnectionReset => debug!("connection reset"),
                    _ => return Err(e.into()),
                },
            }
            self.housekeeping(self.shared.block_index(), get_micro_time(), sock);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_control_thread {
    use super::*;
    use crate::common::{
        audio_block::{MonoBlock, MONO_BLOCK_SIZE},
        config::Config,
    };
    use crate::server::mix_engine::MockPacketSender;
    use std::sync::Mutex;

    type Sent = Arc<Mutex<Vec<(SocketAddr, ServerPacket)>>>;

    struct Room {
        plane: ControlPlane,
        mix_rx: mpsc::Receiver<MixCommand>,
        rec_rx: mpsc::Receiver<RecorderMessage>,
        leader: Arc<LeaderSettings>,
        shared: Arc<EngineShared>,
    }

    fn room() -> Room {
        let config = Config::build("no_file.json".to_string(), ServerSettings::defaults()).unwrap();
        let settings = ServerSettings::from_config(&config).unwrap();
        let shared = Arc::new(EngineShared::new(false));
        let leader = Arc::new(LeaderSettings::new(120.0, 4));
        let (mix_tx, mix_rx) = mpsc::channel();
        let (rec_tx, rec_rx) = mpsc::sync_channel(16);
        let plane = ControlPlane::new(
            &settings,
            shared.clone(),
            leader.clone(),
            mix_tx,
            Some(rec_tx),
        );
        Room {
            plane,
            mix_rx,
            rec_rx,
            leader,
            shared,
        }
    }

    fn capture() -> (MockPacketSender, Sent) {
        let sent: Sent = Arc::new(Mutex::new(vec![]));
        let log = sent.clone();
        let mut mock = MockPacketSender::new();
        mock.expect_send_packet().returning(move |data, addr| {
            log.lock()
                .unwrap()
                .push((*addr, ServerPacket::parse(data).unwrap()));
            Ok(data.len())
        });
        (mock, sent)
    }

    fn addr(port: u16) -> SocketAddr {
        format!("10.0.0.1:{}", port).parse().unwrap()
    }

    fn hello_bytes(version: u16, name: &str) -> Vec<u8> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let len = ClientPacket::Hello(ClientHello {
            version,
            device_latency: 10.0,
            gain_db: 0.0,
            name: name.to_string(),
        })
        .encode(&mut buf);
        buf[..len].to_vec()
    }

    fn key_bytes(id: u8, command_seq: u32, key: char) -> Vec<u8> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let len = ClientPacket::KeyPress {
            client_id: id,
            play_index: 0,
            command_seq,
            key: key as u32,
        }
        .encode(&mut buf);
        buf[..len].to_vec()
    }

    fn join(room: &mut Room, sender: &MockPacketSender, port: u16, name: &str) -> () {
        room.plane
            .handle_packet(&hello_bytes(PROTOCOL_VERSION, name), addr(port), 1000, sender)
            .unwrap();
    }

    #[test]
    fn hello_is_answered_and_attached() {
        let mut room = room();
        let (sender, sent) = capture();
        join(&mut room, &sender, 5000, "alto");
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            (to, ServerPacket::Hello { client_id, init_index, help }) => {
                assert_eq!(*to, addr(5000));
                assert_eq!(*client_id, 0);
                assert_eq!(*init_index, 0);
                assert!(help.starts_with("udrmjkJKhlxoi-+"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match room.mix_rx.try_recv() {
            Ok(MixCommand::Attach(client)) => assert_eq!(client.name(), "alto"),
            Err(_) => panic!("client not handed to the mixer"),
        }
    }
    #[test]
    fn wrong_version_gets_no_reply() {
        let mut room = room();
        let mut sender = MockPacketSender::new();
        sender.expect_send_packet().times(0);
        room.plane
            .handle_packet(&hello_bytes(1, "old"), addr(5000), 1000, &sender)
            .unwrap();
        assert!(room.mix_rx.try_recv().is_err());
        assert_eq!(room.plane.registry().active_count(), 0);
    }
    #[test]
    fn second_hello_from_same_address_is_refused() {
        let mut room = room();
        let (sender, sent) = capture();
        join(&mut room, &sender, 5000, "alto");
        join(&mut room, &sender, 5000, "alto again");
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(room.plane.registry().active_count(), 1);
    }
    #[test]
    fn audio_only_from_the_right_address() {
        let mut room = room();
        let (sender, _sent) = capture();
        join(&mut room, &sender, 5000, "alto");
        let block: MonoBlock = [100; MONO_BLOCK_SIZE];
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let len = ClientPacket::AudioData {
            client_id: 0,
            play_index: 0,
            seq: 3,
            block,
        }
        .encode(&mut buf);
        room.plane
            .handle_packet(&buf[..len], addr(6000), 2000, &sender)
            .unwrap();
        let client = room.plane.registry().get(0).unwrap().clone();
        assert!(!client.buffer().is_filled(3));
        room.plane
            .handle_packet(&buf[..len], addr(5000), 2000, &sender)
            .unwrap();
        assert!(client.buffer().is_filled(3));
        assert_eq!(client.last_activity(), 2000);
        // garbage is just dropped
        room.plane
            .handle_packet(&buf[..len - 1], addr(5000), 3000, &sender)
            .unwrap();
        assert_eq!(client.last_activity(), 2000);
    }
    #[test]
    fn leader_and_metronome_keys() {
        let mut room = room();
        let (sender, _sent) = capture();
        join(&mut room, &sender, 5000, "alto");
        join(&mut room, &sender, 5001, "bass");
        let alto = room.plane.registry().get(0).unwrap().clone();
        let bass = room.plane.registry().get(1).unwrap().clone();

        room.plane
            .handle_packet(&key_bytes(0, 1, 'x'), addr(5000), 2000, &sender)
            .unwrap();
        assert!(alto.is_leader());
        assert_eq!(room.leader.source(), LeaderSource::Human);

        room.plane
            .handle_packet(&key_bytes(1, 1, 'x'), addr(5001), 2000, &sender)
            .unwrap();
        assert!(!alto.is_leader());
        assert!(bass.is_leader());

        room.plane
            .handle_packet(&key_bytes(0, 2, 'm'), addr(5000), 2000, &sender)
            .unwrap();
        assert!(!bass.is_leader());
        assert_eq!(room.leader.source(), LeaderSource::Metronome);

        // a replayed command does nothing
        room.plane
            .handle_packet(&key_bytes(0, 2, 'm'), addr(5000), 2000, &sender)
            .unwrap();
        assert_eq!(room.leader.source(), LeaderSource::Metronome);

        room.plane
            .handle_packet(&key_bytes(0, 3, 'K'), addr(5000), 2000, &sender)
            .unwrap();
        assert_eq!(room.leader.bpm(), 140.0);
        room.plane
            .handle_packet(&key_bytes(0, 4, 'h'), addr(5000), 2000, &sender)
            .unwrap();
        assert_eq!(room.leader.beats_per_bar(), 3);
        room.plane
            .handle_packet(&key_bytes(0, 5, 'm'), addr(5000), 2000, &sender)
            .unwrap();
        assert_eq!(room.leader.source(), LeaderSource::Off);
    }
    #[test]
    fn mute_and_gain_keys() {
        let mut room = room();
        let (sender, _sent) = capture();
        join(&mut room, &sender, 5000, "alto");
        let alto = room.plane.registry().get(0).unwrap().clone();
        for (seq, key) in ['o', 'i', '+', '+', '-'].iter().enumerate() {
            room.plane
                .handle_packet(&key_bytes(0, seq as u32 + 1, *key), addr(5000), 2000, &sender)
                .unwrap();
        }
        assert!(alto.mute_out());
        assert!(alto.mute_in());
        assert_eq!(alto.gain_db(), 1.0);
    }
    #[test]
    fn record_key_starts_and_stops_the_recorder() {
        let mut room = room();
        let (sender, _sent) = capture();
        join(&mut room, &sender, 5000, "alto");
        room.plane
            .handle_packet(&key_bytes(0, 1, 'r'), addr(5000), 2000, &sender)
            .unwrap();
        // not on until the recorder has its file
        assert!(!room.shared.is_recording());
        assert!(matches!(room.rec_rx.try_recv(), Ok(RecorderMessage::Start(dir)) if dir == "."));
        room.shared.start_recording();
        room.plane
            .handle_packet(&key_bytes(0, 2, 'r'), addr(5000), 2000, &sender)
            .unwrap();
        assert!(!room.shared.is_recording());
        assert!(matches!(room.rec_rx.try_recv(), Ok(RecorderMessage::Stop)));
    }
    #[test]
    fn recording_into_a_missing_directory_stays_off() {
        let config = Config::build("no_file.json".to_string(), ServerSettings::defaults()).unwrap();
        let mut settings = ServerSettings::from_config(&config).unwrap();
        settings.recording_dir = "/nonexistent/choir/recordings".to_string();
        let shared = Arc::new(EngineShared::new(false));
        let (mix_tx, _mix_rx) = mpsc::channel();
        let (rec_tx, rec_rx) = mpsc::sync_channel(16);
        let rec_shared = shared.clone();
        let recorder = std::thread::spawn(move || crate::server::recorder::run(rec_rx, rec_shared));
        let mut plane = ControlPlane::new(
            &settings,
            shared.clone(),
            Arc::new(LeaderSettings::new(120.0, 4)),
            mix_tx,
            Some(rec_tx),
        );
        let (sender, sent) = capture();
        plane
            .handle_packet(&hello_bytes(PROTOCOL_VERSION, "alto"), addr(5000), 1000, &sender)
            .unwrap();
        plane
            .handle_packet(&key_bytes(0, 1, 'r'), addr(5000), 2000, &sender)
            .unwrap();
        // give the recorder time to try
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(!shared.is_recording());
        plane.send_status(&sender);
        drop(plane);
        recorder.join().unwrap().unwrap();
        let sent = sent.lock().unwrap();
        let status: String = sent
            .iter()
            .filter_map(|(_, p)| match p {
                ServerPacket::StatusText { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert!(!status.contains("recording:         ON"));
    }
    #[test]
    fn status_marks_own_line() {
        let mut room = room();
        let (sender, sent) = capture();
        join(&mut room, &sender, 5000, "alto");
        join(&mut room, &sender, 5001, "bass");
        sent.lock().unwrap().clear();
        room.plane.housekeeping(0, 2000, &sender);
        let sent = sent.lock().unwrap();
        let mut to_alto = String::new();
        for (to, packet) in sent.iter() {
            if let ServerPacket::StatusText { text, .. } = packet {
                if *to == addr(5000) {
                    to_alto.push_str(text);
                }
            }
        }
        let alto_line = to_alto.lines().find(|l| l.contains("alto")).unwrap();
        let bass_line = to_alto.lines().find(|l| l.contains("bass")).unwrap();
        assert!(alto_line.starts_with('*'));
        assert!(bass_line.starts_with(' '));
        assert!(to_alto.contains("recording:        OFF"));
        drop(sent);
        // next picture only after the interval
        let (later, later_sent) = capture();
        room.plane.housekeeping(10, 2000, &later);
        assert!(later_sent.lock().unwrap().is_empty());
        room.plane.housekeeping(100, 2000, &later);
        assert!(!later_sent.lock().unwrap().is_empty());
    }
    #[test]
    fn silent_leader_times_out() {
        let mut room = room();
        let (sender, _sent) = capture();
        join(&mut room, &sender, 5000, "alto");
        room.plane
            .handle_packet(&key_bytes(0, 1, 'x'), addr(5000), 2000, &sender)
            .unwrap();
        assert_eq!(room.leader.source(), LeaderSource::Human);
        // default timeout is one second
        room.plane.housekeeping(0, 2_000_000, &sender);
        assert_eq!(room.plane.registry().active_count(), 0);
        assert_eq!(room.leader.source(), LeaderSource::Off);
    }
    #[test]
    fn meter_shape() {
        assert_eq!(level_meter(-90.0, -90.0), format!("[{}]", "-".repeat(24)));
        assert_eq!(level_meter(0.0, 0.0), format!("[{}]", "#".repeat(24)));
        let m = level_meter(-30.0, -10.0);
        assert_eq!(m.matches('#').count(), 12);
        assert_eq!(m.matches('+').count(), 8);
    }
}
