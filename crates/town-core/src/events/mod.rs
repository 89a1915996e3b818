//! Frame logging.

pub mod logger;

pub use logger::{read_frames, FrameLogger};
