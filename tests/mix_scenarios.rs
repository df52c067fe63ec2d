//! The room end to end without a network: control plane, mixer and singer sessions
//! talking through an in-memory outbox.
use choir_room::{
    client::choir_session::{ChoirSession, SessionEvent},
    common::{
        audio_block::{MonoBlock, StereoBlock, MONO_BLOCK_SIZE, STEREO_BLOCK_SIZE},
        choir_packet::{ClientHello, ClientPacket, ServerPacket, MAX_PACKET_SIZE, PROTOCOL_VERSION},
        config::{Config, ServerSettings},
    },
    server::{
        control_thread::ControlPlane,
        leader_sync::{LeaderSettings, LeaderSync},
        mix_engine::{EngineShared, MixEngine, PacketSender},
    },
    sound::{
        jitter_buffer::JitterTuning,
        surround::{SurroundPanner, SEAT_DISTANCE},
    },
};
use std::{
    f64::consts::PI,
    io,
    net::SocketAddr,
    sync::{mpsc, Arc, Mutex},
};

#[derive(Clone)]
struct Outbox(Arc<Mutex<Vec<(SocketAddr, Vec<u8>)>>>);

impl Outbox {
    fn take(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl PacketSender for Outbox {
    fn send_packet(&self, data: &[u8], addr: &SocketAddr) -> io::Result<usize> {
        self.0.lock().unwrap().push((*addr, data.to_vec()));
        Ok(data.len())
    }
}

struct Room {
    plane: ControlPlane,
    engine: MixEngine<Outbox>,
    outbox: Outbox,
}

fn room() -> Room {
    let config = Config::build("no_file.json".to_string(), ServerSettings::defaults()).unwrap();
    let settings = ServerSettings::from_config(&config).unwrap();
    let shared = Arc::new(EngineShared::new(false));
    let leader = Arc::new(LeaderSettings::new(120.0, 4));
    let (mix_tx, mix_rx) = mpsc::channel();
    let outbox = Outbox(Arc::new(Mutex::new(vec![])));
    let engine = MixEngine::new(
        outbox.clone(),
        shared.clone(),
        LeaderSync::new(leader.clone(), settings.buffer_blocks),
        mix_rx,
        None,
    );
    let plane = ControlPlane::new(&settings, shared, leader, mix_tx, None);
    Room {
        plane,
        engine,
        outbox,
    }
}

fn addr(port: u16) -> SocketAddr {
    format!("192.168.1.10:{}", port).parse().unwrap()
}

fn encode(packet: ClientPacket) -> Vec<u8> {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    let len = packet.encode(&mut buf);
    buf[..len].to_vec()
}

fn audio_to(sent: &[(SocketAddr, Vec<u8>)], to: SocketAddr) -> Vec<StereoBlock> {
    sent.iter()
        .filter(|(a, _)| *a == to)
        .filter_map(|(_, data)| match ServerPacket::parse(data) {
            Ok(ServerPacket::AudioData { block, .. }) => Some(block),
            _ => None,
        })
        .collect()
}

#[test]
fn each_singer_hears_everybody_but_themselves() {
    let mut room = room();
    for (port, name) in [(6000, "alto"), (6001, "bass")] {
        let hello = encode(ClientPacket::Hello(ClientHello {
            version: PROTOCOL_VERSION,
            device_latency: 10.0,
            gain_db: 0.0,
            name: name.to_string(),
        }));
        room.plane
            .handle_packet(&hello, addr(port), 1000, &room.outbox)
            .unwrap();
    }
    room.outbox.take();

    let alto: MonoBlock = [2000; MONO_BLOCK_SIZE];
    let bass: MonoBlock = [1000; MONO_BLOCK_SIZE];
    for seq in 0..10 {
        for (id, port, block) in [(0u8, 6000, alto), (1u8, 6001, bass)] {
            let data = encode(ClientPacket::AudioData {
                client_id: id,
                play_index: 0,
                seq,
                block,
            });
            room.plane
                .handle_packet(&data, addr(port), 2000, &room.outbox)
                .unwrap();
        }
    }
    for _ in 0..4 {
        room.engine.tick();
    }
    let sent = room.outbox.take();
    let to_alto = audio_to(&sent, addr(6000));
    let to_bass = audio_to(&sent, addr(6001));
    assert_eq!(to_alto.len(), 4);
    assert_eq!(to_bass.len(), 4);

    // bass sits on the far right of a half circle, alto on the far left
    let mut right = SurroundPanner::new();
    right.initialize(0.0, PI / 2.0, SEAT_DISTANCE);
    let (l, r) = right.get_mults();
    let expected_l = ((1000 * l) >> 16) as i16;
    let expected_r = ((1000 * r) >> 16) as i16;
    let last = to_alto[3];
    for f in 0..MONO_BLOCK_SIZE {
        assert_eq!(last[2 * f], expected_l);
        assert_eq!(last[2 * f + 1], expected_r);
    }
    // and the bass hears only the alto, louder on the left
    let last = to_bass[3];
    assert!(last[0] > last[1]);
    assert!(last[1] > 0);
}

#[test]
fn sessions_hear_each_other_through_the_room() {
    let mut room = room();
    let mut sessions = vec![
        (addr(7000), ChoirSession::new("soprano", 5.0, 0.0, JitterTuning::default())),
        (addr(7001), ChoirSession::new("tenor", 5.0, 0.0, JitterTuning::default())),
    ];
    for (from, session) in sessions.iter_mut() {
        let hello = session.hello_packet().to_vec();
        room.plane
            .handle_packet(&hello, *from, 1000, &room.outbox)
            .unwrap();
        for (to, data) in room.outbox.take() {
            assert_eq!(to, *from);
            assert!(matches!(
                session.handle_packet(&data).unwrap(),
                Some(SessionEvent::Connected { .. })
            ));
        }
    }

    let tone: MonoBlock = [4000; MONO_BLOCK_SIZE];
    let silence: MonoBlock = [0; MONO_BLOCK_SIZE];
    let mut heard = [0usize; 2];
    let mut out: StereoBlock = [0; STEREO_BLOCK_SIZE];
    for tick in 0..50u128 {
        // only the soprano sings
        for (idx, (from, session)) in sessions.iter_mut().enumerate() {
            let block = if idx == 0 { &tone } else { &silence };
            let data = session.audio_packet(block).unwrap().to_vec();
            room.plane
                .handle_packet(&data, *from, 2000 + tick * 2667, &room.outbox)
                .unwrap();
        }
        room.engine.tick();
        for (to, data) in room.outbox.take() {
            for (at, session) in sessions.iter_mut() {
                if *at == to {
                    session.handle_packet(&data).unwrap();
                }
            }
        }
        for (idx, (_, session)) in sessions.iter_mut().enumerate() {
            if session.read_playback(&mut out) && out.iter().any(|v| *v != 0) {
                heard[idx] += 1;
            }
        }
    }
    // the tenor hears the soprano, the soprano never gets their own voice back
    assert!(heard[1] > 40);
    assert_eq!(heard[0], 0);
}
