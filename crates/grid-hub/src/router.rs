//! Event Router.
//!
//! Resolves an envelope's recipients from a snapshot of the scope registry
//! (or every live connection for a broadcast) and offers the frame to each
//! with a non-blocking send. A full or closed recipient never delays the
//! others: its frame is dropped and the outcome is reported back so the
//! hub can close it afterwards.

use grid_types::ConnectionId;
use tracing::{trace, warn};

use crate::envelope::Envelope;
use crate::lifecycle::{CloseReason, ConnectionTable, Delivery};
use crate::registry::ScopeRegistry;

/// Outcome of one dispatch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Connections the envelope was addressed to.
    pub recipients: usize,
    /// Frames queued.
    pub delivered: usize,
    /// Frames discarded because a queue was full.
    pub dropped: usize,
    /// Connections that must be closed, and why.
    pub to_close: Vec<(ConnectionId, CloseReason)>,
}

/// Fan-out policy.
#[derive(Debug, Clone, Copy)]
pub struct EventRouter {
    max_dropped: u64,
}

impl EventRouter {
    /// Create a router that closes a connection once it has dropped
    /// `max_dropped` frames. `0` never closes.
    pub const fn new(max_dropped: u64) -> Self {
        Self { max_dropped }
    }

    /// Whether a delivery outcome means the connection must be closed.
    pub const fn close_reason(self, delivery: Delivery) -> Option<CloseReason> {
        match delivery {
            Delivery::Sent => None,
            Delivery::Dropped { total } => {
                if self.max_dropped > 0 && total >= self.max_dropped {
                    Some(CloseReason::SlowConsumer)
                } else {
                    None
                }
            }
            Delivery::Closed => Some(CloseReason::TransportClosed),
        }
    }

    /// Deliver `envelope` to its recipients.
    pub fn dispatch(
        self,
        envelope: &Envelope,
        registry: &ScopeRegistry,
        connections: &mut ConnectionTable,
    ) -> DispatchReport {
        let recipients: Vec<ConnectionId> = match &envelope.scope {
            Some(scope) => registry.members_of(scope).into_iter().collect(),
            None => connections.ids(),
        };

        let mut report = DispatchReport {
            recipients: recipients.len(),
            ..DispatchReport::default()
        };

        for id in recipients {
            let Some(connection) = connections.get_mut(id) else {
                continue;
            };
            let delivery = connection.try_deliver(&envelope.frame);
            match delivery {
                Delivery::Sent => report.delivered = report.delivered.saturating_add(1),
                Delivery::Dropped { total } => {
                    report.dropped = report.dropped.saturating_add(1);
                    warn!(
                        conn_id = %id,
                        event = envelope.event,
                        dropped_total = total,
                        "Outbound queue full, frame dropped"
                    );
                }
                Delivery::Closed => {}
            }
            if let Some(reason) = self.close_reason(delivery) {
                report.to_close.push((id, reason));
            }
        }

        trace!(
            event = envelope.event,
            scope = envelope.scope.as_ref().map(ToString::to_string),
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped,
            "Dispatched"
        );
        report
    }
}
