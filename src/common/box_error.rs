//! type created so that the errors could work multi-threaded.
//!
//! Every thread in the room (mixer, control, recorder) hands its errors back through
//! this one type, so they can be moved across thread boundaries.
pub type BoxError = std::boxed::Box<
    dyn std::error::Error // must implement Error to satisfy ?
        + std::marker::Send // needed for threads
        + std::marker::Sync, // needed for threads
>;
