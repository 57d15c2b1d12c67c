//! Common utilities shared across the stream engine

pub mod time;

pub use time::{snap_to_resolution, Clock, MockClock, MonotonicClock};
