use choir_room::{
    client::probe::{self, ProbeOptions},
    common::box_error::BoxError,
};
use clap::Parser;
use std::net::{SocketAddr, ToSocketAddrs};
use simple_error::bail;

/// Join a rehearsal room with a test tone and print the room status
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// room server, host:port
    #[arg(short, long, default_value = "127.0.0.1:1234")]
    server: String,

    /// name shown to the others
    #[arg(short, long, default_value = "probe")]
    name: String,

    /// tone frequency in Hz
    #[arg(short, long, default_value_t = 440.0)]
    frequency: f64,

    /// tone level, 0 to 1
    #[arg(short, long, default_value_t = 0.1)]
    level: f64,

    /// how long to stay in the room
    #[arg(short = 't', long, default_value_t = 30)]
    seconds: u64,

    /// command keys to press, one per second
    #[arg(short, long, default_value = "")]
    keys: String,
}

fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let server: SocketAddr = match args.server.to_socket_addrs()?.next() {
        Some(addr) => addr,
        None => bail!("cannot resolve {}", args.server),
    };
    probe::run(ProbeOptions {
        server,
        name: args.name,
        frequency: args.frequency,
        level: args.level,
        seconds: args.seconds,
        keys: args.keys,
    })?;
    Ok(())
}
