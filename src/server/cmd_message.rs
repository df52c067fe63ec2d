use num::{FromPrimitive, ToPrimitive};
use simple_error::bail;
use std::fmt;

use crate::common::box_error::BoxError;

/// Keys a participant can press.  The discriminant is the ascii code that travels in
/// the KeyPress packet.
#[derive(FromPrimitive, ToPrimitive, PartialEq, Debug, Clone, Copy)]
pub enum Command {
    MoveUp = 0x75,         // u
    MoveDown = 0x64,       // d
    Record = 0x72,         // r
    Metronome = 0x6D,      // m
    SlowDown = 0x6A,       // j
    SpeedUp = 0x6B,        // k
    SlowDownBig = 0x4A,    // J
    SpeedUpBig = 0x4B,     // K
    FewerBeats = 0x68,     // h
    MoreBeats = 0x6C,      // l
    Leader = 0x78,         // x
    MuteOut = 0x6F,        // o
    MuteIn = 0x69,         // i
    GainDown = 0x2D,       // -
    GainUp = 0x2B,         // +
}

/// Sent with the server hello.  The first line lists every key that does something.
pub const HELP_TEXT: &str = "udrmjkJKhlxoi-+\n\
[u/d] move yourself up/down in the choir\n\
[r]   turn recording on/off\n\
[m]   turn metronome on/off\n\
[j/k] decrease/increase beats per minute by 2\n\
[J/K]   ... by 20\n\
[h/l] decrease/increase beats per bar\n\
[x]   become the leader (or stop leading)\n\
[o]   stop/start sending your voice to the others\n\
[i]   stop/start receiving the room\n\
[-/+] decrease/increase your level by 1 dB";

impl Command {
    pub fn from_key(key: u32) -> Result<Command, BoxError> {
        match FromPrimitive::from_u32(key) {
            Some(cmd) => Ok(cmd),
            None => bail!("unknown command key {}", key),
        }
    }
    pub fn from_char(c: char) -> Option<Command> {
        FromPrimitive::from_u32(c as u32)
    }
    pub fn key(&self) -> u32 {
        ToPrimitive::to_u32(self).unwrap_or(0)
    }
    pub fn as_char(&self) -> char {
        char::from_u32(self.key()).unwrap_or('?')
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} '{}'", self, self.as_char())
    }
}

#[cfg(test)]
mod test_cmd_message {
    use super::*;

    #[test]
    fn keys_round_trip() {
        assert_eq!(Command::from_key('u' as u32).unwrap(), Command::MoveUp);
        assert_eq!(Command::from_key('K' as u32).unwrap(), Command::SpeedUpBig);
        assert_eq!(Command::from_key('+' as u32).unwrap(), Command::GainUp);
        assert_eq!(Command::GainDown.key(), '-' as u32);
        assert_eq!(Command::Leader.as_char(), 'x');
        assert!(Command::from_key('q' as u32).is_err());
        assert!(Command::from_char('n').is_none());
    }
    #[test]
    fn help_lists_every_key() {
        let first = HELP_TEXT.lines().next().unwrap();
        for c in first.chars() {
            assert!(Command::from_char(c).is_some(), "{} is not a command", c);
        }
        assert_eq!(first.len(), 15);
    }
    #[test]
    fn display() {
        assert_eq!(format!("{}", Command::Record), "Record 'r'");
    }
}
