use choir_room::{
    common::{box_error::BoxError, config::ServerSettings},
    server::choir_server,
};
use clap::Parser;

/// Virtual choir rehearsal room server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// json settings file (missing file means defaults)
    #[arg(short, long, default_value = "choir_settings.json")]
    config: String,

    /// udp port, overrides the settings file
    #[arg(short, long)]
    port: Option<u32>,
}

fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = ServerSettings::load(&args.config)?;
    if let Some(port) = args.port {
        settings.port = port;
    }
    choir_server::run(settings)?;
    Ok(())
}
