//! Routing envelope.
//!
//! The router never looks inside a payload. An [`Envelope`] carries the
//! event name (for logs), the optional target scope and the frame already
//! serialised once, so fan-out to N connections clones a pointer N times.

use std::sync::Arc;

use grid_types::{ScopeName, ViewerEvent};

use crate::error::HubError;
use crate::lifecycle::Outbound;

/// A serialised event plus where it should go.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Wire name of the event.
    pub event: &'static str,
    /// Target scope; `None` broadcasts to every connection.
    pub scope: Option<ScopeName>,
    /// The `{"event", "data"}` text frame.
    pub frame: Outbound,
}

impl Envelope {
    /// Serialise `event` for delivery to `scope`.
    pub fn from_event(event: &ViewerEvent, scope: Option<ScopeName>) -> Result<Self, HubError> {
        let frame = event.to_frame()?;
        Ok(Self {
            event: event.name(),
            scope,
            frame: Arc::from(frame),
        })
    }
}
