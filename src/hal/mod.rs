// src/hal/mod.rs
//! Transport adapter layer: payload decoding, link stamping, reconnects and simulation

pub mod codec;
pub mod link_clock;
pub mod reconnect;
pub mod simulator;
pub mod traits;
pub mod types;

pub use codec::{decode_payload, encode_payload};
pub use link_clock::{LinkClock, LinkStamp};
pub use reconnect::ReconnectPolicy;
pub use simulator::{BurstyLinkSimulator, SimulatorConfig, SimulatorError, SimulatorStats};
pub use traits::SampleTransport;
pub use types::*;
