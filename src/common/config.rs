//! Allows configuration stuff to be read from a json settings file
//!
//! Values in the file override the defaults handed to [`Config::build`].  The server
//! pulls everything it needs out of the config once, at startup, into
//! [`ServerSettings`].
use json::JsonValue;
use log::{info, warn};
use regex::Regex;
use std::{error::Error, fmt, io::ErrorKind};

use crate::sound::jitter_buffer::{DEFAULT_JUMP_WINDOW, DEFAULT_SKIP_PERIOD};

#[derive(Debug)]
pub struct MissingConfigError {
    key: String,
}

impl fmt::Display for MissingConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Required configuration value '{}' is missing", self.key)
    }
}

impl Error for MissingConfigError {}

pub struct Config {
    filename: String,
    settings: JsonValue,
    defaults: JsonValue,
}

impl Config {
    pub fn build(filename: String, defaults: JsonValue) -> Result<Config, std::io::Error> {
        // only letters, numbers, underscore, dash, dot and slash, ending in .json
        let filename_regex = Regex::new(r"^[a-zA-Z0-9_\-\./]+\.json$").unwrap();
        if !filename_regex.is_match(&filename) {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid filename '{}' - must end in .json", filename),
            ));
        }

        let mut config = Config {
            filename,
            settings: json::object! {},
            defaults,
        };

        if let Err(err) = config.load_from_file() {
            warn!("Using default settings: {}", err);
        }

        Ok(config)
    }

    fn load_from_file(&mut self) -> std::io::Result<()> {
        let raw_data = std::fs::read_to_string(&self.filename)?;
        match json::parse(&raw_data) {
            Ok(parsed) => {
                self.settings = parsed;
                info!("Loaded settings from {}: {}", self.filename, self.settings.dump());
            }
            Err(err) => {
                warn!("Failed to parse config file {}: {}", self.filename, err);
            }
        }
        Ok(())
    }

    fn lookup<T>(
        &self,
        key: &str,
        default: Option<T>,
        get: impl Fn(&JsonValue) -> Option<T>,
    ) -> Result<T, MissingConfigError> {
        // file first, then an explicit default, then the built in defaults
        if let Some(val) = get(&self.settings[key]) {
            return Ok(val);
        }
        if let Some(def) = default {
            return Ok(def);
        }
        get(&self.defaults[key]).ok_or(MissingConfigError {
            key: key.to_string(),
        })
    }

    pub fn get_str_value(&self, key: &str, default: Option<String>) -> Result<String, MissingConfigError> {
        self.lookup(key, default, |v| v.as_str().map(String::from))
    }

    pub fn get_bool_value(&self, key: &str, default: Option<bool>) -> Result<bool, MissingConfigError> {
        self.lookup(key, default, |v| v.as_bool())
    }

    pub fn get_u32_value(&self, key: &str, default: Option<u32>) -> Result<u32, MissingConfigError> {
        self.lookup(key, default, |v| v.as_u32())
    }

    pub fn get_f64_value(&self, key: &str, default: Option<f64>) -> Result<f64, MissingConfigError> {
        self.lookup(key, default, |v| v.as_f64())
    }

    pub fn set_value(&mut self, key: &str, val: impl Into<JsonValue>) -> Result<(), String> {
        let json_val = val.into();
        match json_val {
            JsonValue::Short(_) | JsonValue::String(_) | JsonValue::Boolean(_) | JsonValue::Number(_) => {
                self.settings[key] = json_val;
                Ok(())
            }
            _ => Err(format!("Unsupported value type for key: {}", key)),
        }
    }
}

/// Everything the room server can be tuned with
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub port: u32,
    pub max_clients: usize,
    pub client_timeout_ms: u32,
    pub buffer_blocks: usize,
    pub skip_period: u32,
    pub jump_window: u32,
    pub seat_arc_degrees: f64,
    pub metronome_bpm: f64,
    pub metronome_beats_per_bar: u32,
    pub recording_dir: String,
    pub record_leader: bool,
    pub status_interval_blocks: u32,
    pub report_interval_blocks: u32,
}

pub const DEFAULT_PORT: u32 = 1234;
/// ids go out on the wire in one byte
pub const MAX_CLIENTS_LIMIT: usize = 255;

impl ServerSettings {
    pub fn defaults() -> JsonValue {
        json::object! {
            "port": DEFAULT_PORT,
            "max_clients": 100,
            "client_timeout_ms": 1000,
            "buffer_blocks": 512,
            "skip_period": DEFAULT_SKIP_PERIOD,
            "jump_window": DEFAULT_JUMP_WINDOW,
            "seat_arc_degrees": 180.0,
            "metronome_bpm": 120.0,
            "metronome_beats_per_bar": 4,
            "recording_dir": ".",
            "record_leader": false,
            "status_interval_blocks": 100,
            "report_interval_blocks": 1000
        }
    }

    /// pull the typed settings out of a config
    pub fn from_config(config: &Config) -> Result<ServerSettings, MissingConfigError> {
        let settings = ServerSettings {
            port: config.get_u32_value("port", None)?,
            max_clients: (config.get_u32_value("max_clients", None)? as usize)
                .clamp(1, MAX_CLIENTS_LIMIT),
            client_timeout_ms: config.get_u32_value("client_timeout_ms", None)?,
            // a power of two keeps the slot math cheap, and we need room for a half jump
            buffer_blocks: (config.get_u32_value("buffer_blocks", None)? as usize)
                .clamp(16, 1 << 16)
                .next_power_of_two(),
            skip_period: config.get_u32_value("skip_period", None)?.max(2),
            jump_window: config.get_u32_value("jump_window", None)?.max(1),
            seat_arc_degrees: config.get_f64_value("seat_arc_degrees", None)?.clamp(0.0, 360.0),
            metronome_bpm: config.get_f64_value("metronome_bpm", None)?,
            metronome_beats_per_bar: config.get_u32_value("metronome_beats_per_bar", None)?,
            recording_dir: config.get_str_value("recording_dir", None)?,
            record_leader: config.get_bool_value("record_leader", None)?,
            status_interval_blocks: config.get_u32_value("status_interval_blocks", None)?.max(1),
            report_interval_blocks: config.get_u32_value("report_interval_blocks", None)?.max(1),
        };
        Ok(settings)
    }

    /// load a settings file (missing file means all defaults)
    pub fn load(filename: &str) -> Result<ServerSettings, crate::common::box_error::BoxError> {
        let config = Config::build(filename.to_string(), Self::defaults())?;
        Ok(Self::from_config(&config)?)
    }
}
