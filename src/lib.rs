//! choir_room - Virtual Choir Rehearsal Room
//!
//! provides library elements to build a rehearsal room server which mixes the
//! voices of every connected singer into a personalized stereo return (everybody but
//! yourself, each voice at its own seat) and a participant session used by the
//! endpoints that capture and play the audio.
#[macro_use]
extern crate num_derive;

pub mod client;
pub mod common;
pub mod dsp;
pub mod server;
pub mod sound;
pub mod utils;
