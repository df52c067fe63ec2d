//! the singer's end of the room: protocol state and a synthetic test participant
pub mod choir_session;
pub mod probe;
