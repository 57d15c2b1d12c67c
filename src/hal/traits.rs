// src/hal/traits.rs
//! Transport abstraction for sample feeds

use crate::hal::types::TransportEvent;
use async_trait::async_trait;
use std::error::Error;

/// A source of notification payloads and link state changes
#[async_trait]
pub trait SampleTransport: Send {
    type Error: Error + Send + Sync + 'static;

    /// Establish the link
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Tear the link down
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Wait for the next event; `Ok(None)` means the feed has ended
    async fn next_event(&mut self) -> Result<Option<TransportEvent>, Self::Error>;

    fn is_connected(&self) -> bool;
}
