//! audio plumbing shared by the room and the singers: buffering, placement and clicks
pub mod click_track;
pub mod jitter_buffer;
pub mod surround;
