//! Connection Lifecycle Manager.
//!
//! A viewer connection moves through
//! `Pending -> Authenticated -> Active -> Closed`, or straight from
//! `Pending` to `Closed` when its credential is rejected. Only an
//! [`Admission`] produced by a successful [`Handshake`] can be registered,
//! so a connection object never exists for an unauthenticated peer.
//!
//! The [`ConnectionTable`] is owned by the hub task. Each live connection
//! holds the sending half of its bounded outbound queue and a close
//! signal shared with the transport's [`Outbox`]. Closing a connection
//! fires the signal: the outbox stops yielding at once and anything still
//! queued is discarded.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use grid_types::{ConnectionId, Identity};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::auth::Authenticator;
use crate::error::AuthError;

/// A pre-serialised text frame shared by every recipient of one publish.
pub type Outbound = Arc<str>;

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Where a connection is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Handshake received, credential not yet checked.
    Pending,
    /// Credential verified, not yet registered with the hub.
    Authenticated,
    /// Registered; may join scopes and receive events.
    Active,
    /// Disconnected. Terminal.
    Closed,
}

impl ConnectionPhase {
    /// Whether moving from `self` to `next` is allowed.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Authenticated | Self::Closed)
                | (Self::Authenticated, Self::Active | Self::Closed)
                | (Self::Active, Self::Closed)
        )
    }

    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The viewer sent a close frame.
    ClientClosed,
    /// Reading from or writing to the socket failed.
    TransportError,
    /// The socket or its outbound queue went away without a close frame.
    TransportClosed,
    /// The connection dropped too many frames.
    SlowConsumer,
    /// The hub is shutting down.
    Shutdown,
}

impl core::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let reason = match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::TransportClosed => "transport_closed",
            Self::SlowConsumer => "slow_consumer",
            Self::Shutdown => "shutdown",
        };
        f.write_str(reason)
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// A connection attempt whose credential has not been checked yet.
#[derive(Debug)]
pub struct Handshake {
    phase: ConnectionPhase,
}

impl Handshake {
    /// Start a handshake in the `Pending` phase.
    pub const fn begin() -> Self {
        Self {
            phase: ConnectionPhase::Pending,
        }
    }

    /// Current phase of the attempt.
    pub const fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Verify the presented credential.
    ///
    /// On success the attempt becomes an [`Admission`]; on failure it is
    /// closed and nothing is allocated for it.
    pub fn authenticate(
        mut self,
        authenticator: &Authenticator,
        token: Option<&str>,
    ) -> Result<Admission, AuthError> {
        match authenticator.verify(token) {
            Ok(identity) => {
                self.phase = ConnectionPhase::Authenticated;
                Ok(Admission::new(identity))
            }
            Err(err) => {
                self.phase = ConnectionPhase::Closed;
                warn!(reason = %err, phase = ?self.phase, "Handshake rejected");
                Err(err)
            }
        }
    }
}

/// Proof that a handshake authenticated. Only this crate can build one.
#[derive(Debug, Clone)]
pub struct Admission {
    identity: Identity,
    authenticated_at: DateTime<Utc>,
}

impl Admission {
    pub(crate) fn new(identity: Identity) -> Self {
        Self {
            identity,
            authenticated_at: Utc::now(),
        }
    }

    /// The verified identity.
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// When the credential was accepted.
    pub const fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }
}

/// What the transport receives when the hub admits a connection.
#[derive(Debug)]
pub struct Registration {
    /// Handle for scope requests and disconnect.
    pub id: ConnectionId,
    /// Frames to write to the socket.
    pub outbound: Outbox,
}

/// Receiving end of one connection's outbound queue.
///
/// Once the hub closes the connection, [`Outbox::recv`] returns `None`
/// even if frames are still queued.
#[derive(Debug)]
pub struct Outbox {
    frames: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
}

impl Outbox {
    /// Next frame to write, or `None` once the connection is closed.
    pub async fn recv(&mut self) -> Option<Outbound> {
        if self.closed.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.closed.cancelled() => None,
            frame = self.frames.recv() => frame,
        }
    }

    /// Take a queued frame without waiting.
    pub fn try_recv(&mut self) -> Result<Outbound, TryRecvError> {
        if self.closed.is_cancelled() {
            return Err(TryRecvError::Disconnected);
        }
        self.frames.try_recv()
    }

    /// Whether the hub has closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Signal fired when the hub closes the connection, for racing
    /// socket writes against.
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Result of offering one frame to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the transport.
    Sent,
    /// The queue was full; the frame was discarded.
    Dropped {
        /// Frames this connection has dropped so far.
        total: u64,
    },
    /// The transport side is gone.
    Closed,
}

/// One admitted viewer connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    phase: ConnectionPhase,
    created_at: DateTime<Utc>,
    outbound: Option<mpsc::Sender<Outbound>>,
    closed: CancellationToken,
    dropped: u64,
}

impl Connection {
    /// Connection handle.
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Identity decoded at handshake time.
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current phase.
    pub const fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// When the connection was registered.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Frames dropped because the outbound queue was full.
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Offer a frame without waiting.
    pub fn try_deliver(&mut self, frame: &Outbound) -> Delivery {
        let Some(sender) = self.outbound.as_ref() else {
            return Delivery::Closed;
        };
        match sender.try_send(Arc::clone(frame)) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                self.dropped = self.dropped.saturating_add(1);
                Delivery::Dropped {
                    total: self.dropped,
                }
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Close the connection: fire its close signal and release the
    /// outbound queue, discarding undelivered frames. Returns `false` if
    /// it was already closed.
    pub fn close(&mut self) -> bool {
        if !self.phase.can_transition_to(ConnectionPhase::Closed) {
            return false;
        }
        self.phase = ConnectionPhase::Closed;
        self.closed.cancel();
        self.outbound = None;
        true
    }
}

/// Every live connection, keyed by id.
#[derive(Debug)]
pub struct ConnectionTable {
    connections: BTreeMap<ConnectionId, Connection>,
    outbound_capacity: usize,
}

impl ConnectionTable {
    /// Create an empty table whose connections get queues of
    /// `outbound_capacity` frames.
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Register an admitted connection and move it to `Active`.
    pub fn register(&mut self, admission: Admission) -> Registration {
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        let closed = CancellationToken::new();
        let id = ConnectionId::new();
        let connection = Connection {
            id,
            identity: admission.identity,
            phase: ConnectionPhase::Active,
            created_at: Utc::now(),
            outbound: Some(tx),
            closed: closed.clone(),
            dropped: 0,
        };
        self.connections.insert(id, connection);
        Registration {
            id,
            outbound: Outbox { frames: rx, closed },
        }
    }

    /// Look up a live connection.
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Look up a live connection mutably.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Ids of every live connection.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether there are no live connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Close and remove a connection. `None` if it was already gone.
    pub fn close(&mut self, id: ConnectionId) -> Option<Connection> {
        let mut connection = self.connections.remove(&id)?;
        connection.close();
        Some(connection)
    }

    /// Close and remove every connection.
    pub fn close_all(&mut self) -> Vec<Connection> {
        let drained = core::mem::take(&mut self.connections);
        drained
            .into_values()
            .map(|mut connection| {
                connection.close();
                connection
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::tests::{SECRET, mint};
    use grid_types::Role;

    pub(crate) fn admission() -> Admission {
        Admission::new(Identity {
            user_id: "user-1".to_owned(),
            role: Role::Operator,
            email: "operator@venue.test".to_owned(),
        })
    }

    #[test]
    fn phase_table() {
        use ConnectionPhase::{Active, Authenticated, Closed, Pending};
        assert!(Pending.can_transition_to(Authenticated));
        assert!(Pending.can_transition_to(Closed));
        assert!(!Pending.can_transition_to(Active));
        assert!(Authenticated.can_transition_to(Active));
        assert!(Active.can_transition_to(Closed));
        assert!(!Active.can_transition_to(Pending));
        assert!(!Closed.can_transition_to(Closed));
        assert!(Closed.is_terminal());
    }

    #[test]
    fn handshake_admits_valid_credential() {
        let auth = Authenticator::new(SECRET, 0);
        let handshake = Handshake::begin();
        assert_eq!(handshake.phase(), ConnectionPhase::Pending);

        let token = mint(SECRET, "ANALYST", 600);
        let admission = handshake.authenticate(&auth, Some(&token)).unwrap();
        assert_eq!(admission.identity().role, Role::Analyst);
    }

    #[test]
    fn handshake_refuses_missing_credential() {
        let auth = Authenticator::new(SECRET, 0);
        let result = Handshake::begin().authenticate(&auth, None);
        assert_eq!(result.unwrap_err(), AuthError::MissingToken);
    }

    #[test]
    fn register_activates_connection() {
        let mut table = ConnectionTable::new(4);
        let registration = table.register(admission());
        let conn = table.get(registration.id).unwrap();
        assert_eq!(conn.phase(), ConnectionPhase::Active);
        assert_eq!(conn.identity().user_id, "user-1");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn admission_is_stamped_before_registration() {
        let mut table = ConnectionTable::new(4);
        let admission = admission();
        let authenticated_at = admission.authenticated_at();

        let registration = table.register(admission);
        let conn = table.get(registration.id).unwrap();
        assert!(conn.created_at() >= authenticated_at);
    }

    #[test]
    fn full_queue_drops_newest() {
        let mut table = ConnectionTable::new(1);
        let mut registration = table.register(admission());
        let conn = table.get_mut(registration.id).unwrap();

        let first: Outbound = Arc::from("first");
        let second: Outbound = Arc::from("second");
        assert_eq!(conn.try_deliver(&first), Delivery::Sent);
        assert_eq!(conn.try_deliver(&second), Delivery::Dropped { total: 1 });
        assert_eq!(conn.dropped(), 1);

        assert_eq!(registration.outbound.try_recv().unwrap().as_ref(), "first");
        assert!(registration.outbound.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_reports_closed() {
        let mut table = ConnectionTable::new(4);
        let registration = table.register(admission());
        drop(registration.outbound);

        let conn = table.get_mut(registration.id).unwrap();
        assert_eq!(conn.try_deliver(&Arc::from("x")), Delivery::Closed);
    }

    #[test]
    fn close_is_idempotent() {
        let mut table = ConnectionTable::new(4);
        let registration = table.register(admission());

        let mut closed = table.close(registration.id).unwrap();
        assert_eq!(closed.phase(), ConnectionPhase::Closed);
        assert!(!closed.close());
        assert!(table.close(registration.id).is_none());
        assert!(table.is_empty());
        assert!(registration.outbound.is_closed());
    }

    #[tokio::test]
    async fn close_discards_queued_frames() {
        let mut table = ConnectionTable::new(8);
        let mut registration = table.register(admission());
        let signal = registration.outbound.close_signal();
        let conn = table.get_mut(registration.id).unwrap();
        for frame in ["a", "b", "c"] {
            assert_eq!(conn.try_deliver(&Arc::from(frame)), Delivery::Sent);
        }

        table.close(registration.id).unwrap();

        assert!(signal.is_cancelled());
        assert_eq!(
            registration.outbound.try_recv().unwrap_err(),
            TryRecvError::Disconnected
        );
        assert!(registration.outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn open_outbox_yields_queued_frames_in_order() {
        let mut table = ConnectionTable::new(8);
        let mut registration = table.register(admission());
        let conn = table.get_mut(registration.id).unwrap();
        conn.try_deliver(&Arc::from("first"));
        conn.try_deliver(&Arc::from("second"));

        assert_eq!(registration.outbound.recv().await.unwrap().as_ref(), "first");
        assert_eq!(registration.outbound.recv().await.unwrap().as_ref(), "second");
        assert!(!registration.outbound.is_closed());
    }
}
