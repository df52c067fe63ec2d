//! things used to make the rehearsal room server
pub mod choir_client;
pub mod choir_server;
pub mod client_registry;
pub mod cmd_message;
pub mod control_thread;
pub mod leader_sync;
pub mod mix_engine;
pub mod recorder;
pub mod scheduling;
