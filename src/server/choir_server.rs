//! entry point called by main to run the rehearsal room
//!
//! This will create some threads to
//! - mix the room once per block at the best priority the OS gives us
//! - write recordings to disk
//!
//! and the calling thread becomes the control thread, receiving packets and keeping the
//! room tidy until the socket fails.
use log::{error, info};
use std::{
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use crate::{
    common::{box_error::BoxError, config::ServerSettings, sock_with_tos},
    server::{
        control_thread::ControlPlane,
        leader_sync::{LeaderSettings, LeaderSync},
        mix_engine::{EngineShared, MixEngine},
        recorder::{self, RECORDER_QUEUE_BLOCKS},
        scheduling,
    },
};

/// how long the control thread waits for a packet before doing its chores
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(10);

/// To start a room, call this function.  Returns only on a fatal error.
pub fn run(settings: ServerSettings) -> Result<(), BoxError> {
    info!("starting room on port {} for {} singers", settings.port, settings.max_clients);
    let sock = sock_with_tos::new(settings.port, Some(RECEIVE_TIMEOUT))?;
    let mix_sock = sock.try_clone()?;

    let shared = Arc::new(EngineShared::new(settings.record_leader));
    let leader_settings = Arc::new(LeaderSettings::new(
        settings.metronome_bpm as f32,
        settings.metronome_beats_per_bar,
    ));

    // recorder
    let (record_tx, record_rx) = mpsc::sync_channel(RECORDER_QUEUE_BLOCKS);
    let recorder_shared = shared.clone();
    let _recorder_handle = thread::Builder::new()
        .name("recorder".to_string())
        .spawn(move || {
            if let Err(e) = recorder::run(record_rx, recorder_shared) {
                error!("recorder exited with error {}", e);
            }
        })?;

    // mixer
    let (mix_tx, mix_rx) = mpsc::channel();
    let leader = LeaderSync::new(leader_settings.clone(), settings.buffer_blocks);
    let mut engine = MixEngine::new(
        mix_sock,
        shared.clone(),
        leader,
        mix_rx,
        Some(record_tx.clone()),
    );
    let mix_handle = scheduling::spawn_realtime("mixer", move |_tier| {
        engine.run();
    })?;

    // and this thread runs the control plane
    let mut control = ControlPlane::new(
        &settings,
        shared.clone(),
        leader_settings,
        mix_tx,
        Some(record_tx),
    );
    let res = control.run(&sock);
    shared.stop();
    if mix_handle.join().is_err() {
        error!("mixer thread panicked");
    }
    res
}
