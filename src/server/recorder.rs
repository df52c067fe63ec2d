//! writes the room mix to disk on its own thread
//!
//! The mixer never touches the file.  It pushes blocks into a bounded channel and if
//! the recorder falls behind the block is dropped (and counted) instead of stalling the
//! mix.  Files are raw little endian 16 bit stereo at 48k, named after the time the
//! recording started.
//!
//! The recorder decides when the room is recording: the mixer only starts handing over
//! blocks once the file is open, and stops as soon as anything goes wrong with it.
use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Local};
use log::{error, info, warn};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
};

use crate::common::{audio_block::StereoBlock, box_error::BoxError};

use super::mix_engine::EngineShared;

/// blocks the channel can hold before the mixer starts dropping (about 2.7 sec)
pub const RECORDER_QUEUE_BLOCKS: usize = 1024;

pub enum RecorderMessage {
    /// start a new file in the given directory
    Start(String),
    Block(StereoBlock),
    Stop,
}

pub fn recording_file_name(when: DateTime<Local>) -> String {
    format!("{}.48000s16le2ch", when.format("rehearsal_%Y-%m-%d_%H-%M-%S"))
}

pub struct Recorder {
    file: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    blocks: u64,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder {
            file: None,
            path: None,
            blocks: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.file.is_some()
    }
    pub fn get_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn start(&mut self, dir: &str) -> Result<PathBuf, BoxError> {
        self.stop()?;
        let path = Path::new(dir).join(recording_file_name(Local::now()));
        let file = File::create(&path)?;
        self.file = Some(BufWriter::new(file));
        self.path = Some(path.clone());
        self.blocks = 0;
        info!("recording to {}", path.display());
        Ok(path)
    }

    pub fn write_block(&mut self, block: &StereoBlock) -> Result<(), BoxError> {
        if let Some(file) = &mut self.file {
            for v in block.iter() {
                file.write_i16::<LittleEndian>(*v)?;
            }
            self.blocks += 1;
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), BoxError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            info!("recording stopped after {} blocks", self.blocks);
        }
        self.path = None;
        Ok(())
    }

    pub fn handle(&mut self, msg: RecorderMessage) -> Result<(), BoxError> {
        match msg {
            RecorderMessage::Start(dir) => {
                self.start(&dir)?;
            }
            RecorderMessage::Block(block) => self.write_block(&block)?,
            RecorderMessage::Stop => self.stop()?,
        }
        Ok(())
    }
}

/// Recorder thread body.  Runs until every sender is gone.
pub fn run(rx: mpsc::Receiver<RecorderMessage>, shared: Arc<EngineShared>) -> Result<(), BoxError> {
    let mut recorder = Recorder::new();
    for msg in rx.iter() {
        let starting = matches!(msg, RecorderMessage::Start(_));
        match recorder.handle(msg) {
            Ok(()) => {
                if starting {
                    shared.start_recording();
                } else if !recorder.is_recording() {
                    shared.stop_recording();
                }
            }
            Err(e) => {
                // a broken file ends this recording but not the thread
                shared.stop_recording();
                error!("recording failed: {}", e);
                if let Err(e) = recorder.stop() {
                    warn!("could not close recording: {}", e);
                }
            }
        }
    }
    shared.stop_recording();
    recorder.stop()
}
