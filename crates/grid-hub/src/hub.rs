//! The hub task.
//!
//! One Tokio task owns the [`ScopeRegistry`] and the [`ConnectionTable`]
//! and applies commands from a bounded queue one at a time. Every
//! command runs to completion before the next is taken, so a membership
//! change can never interleave with the snapshot-then-fan-out of a
//! publish, and commands from one caller are applied in the order sent.
//!
//! Callers talk to the task through a cloneable [`HubHandle`]. Once the
//! task has stopped every handle call fails with
//! [`HubError::Unavailable`].

use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::Utc;
use grid_types::{ConnectionId, ControlEvent, ScopeName, ScopeRequest, ViewerEvent};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::envelope::Envelope;
use crate::error::HubError;
use crate::lifecycle::{Admission, CloseReason, ConnectionTable, Delivery, Registration};
use crate::registry::ScopeRegistry;
use crate::router::{DispatchReport, EventRouter};

/// Member count of one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeStats {
    /// Scope name, `session:<id>` or `node:<id>`.
    pub scope: String,
    /// Connections currently joined.
    pub members: usize,
}

/// Point-in-time view of the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Live connections.
    pub connections: usize,
    /// Non-empty scopes, sessions before nodes.
    pub scopes: Vec<ScopeStats>,
}

/// Requests processed by the hub task.
#[derive(Debug)]
enum HubCommand {
    Connect {
        admission: Admission,
        reply: oneshot::Sender<Registration>,
    },
    Scope {
        conn: ConnectionId,
        request: ScopeRequest,
        reply: oneshot::Sender<bool>,
    },
    Disconnect {
        conn: ConnectionId,
        reason: CloseReason,
        reply: oneshot::Sender<bool>,
    },
    Publish {
        envelope: Envelope,
        reply: oneshot::Sender<DispatchReport>,
    },
    MembersOf {
        scope: ScopeName,
        reply: oneshot::Sender<BTreeSet<ConnectionId>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable client of the hub task.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_err| HubError::Unavailable)?;
        response.await.map_err(|_err| HubError::Unavailable)
    }

    /// Register an authenticated connection.
    pub async fn connect(&self, admission: Admission) -> Result<Registration, HubError> {
        self.request(|reply| HubCommand::Connect { admission, reply })
            .await
    }

    /// Apply a join or leave for `conn`. Returns `true` if membership
    /// changed. The connection receives a `scope:joined`/`scope:left`
    /// acknowledgement either way; requests for unknown connections are
    /// ignored.
    pub async fn scope_request(
        &self,
        conn: ConnectionId,
        request: ScopeRequest,
    ) -> Result<bool, HubError> {
        self.request(|reply| HubCommand::Scope {
            conn,
            request,
            reply,
        })
        .await
    }

    /// Add `conn` to `scope`.
    pub async fn join(&self, conn: ConnectionId, scope: ScopeName) -> Result<bool, HubError> {
        self.scope_request(conn, ScopeRequest::Join(scope)).await
    }

    /// Remove `conn` from `scope`.
    pub async fn leave(&self, conn: ConnectionId, scope: ScopeName) -> Result<bool, HubError> {
        self.scope_request(conn, ScopeRequest::Leave(scope)).await
    }

    /// Close `conn` and drop all its memberships. Returns `false` if it
    /// was already closed.
    pub async fn disconnect(
        &self,
        conn: ConnectionId,
        reason: CloseReason,
    ) -> Result<bool, HubError> {
        self.request(|reply| HubCommand::Disconnect {
            conn,
            reason,
            reply,
        })
        .await
    }

    /// Fan an envelope out to its scope, or to everyone.
    pub async fn publish(&self, envelope: Envelope) -> Result<DispatchReport, HubError> {
        self.request(|reply| HubCommand::Publish { envelope, reply })
            .await
    }

    /// Serialise `event` on the caller's task, then publish it.
    pub async fn publish_event(
        &self,
        event: &ViewerEvent,
        scope: Option<ScopeName>,
    ) -> Result<DispatchReport, HubError> {
        let envelope = Envelope::from_event(event, scope)?;
        self.publish(envelope).await
    }

    /// Current members of `scope`.
    pub async fn members_of(&self, scope: ScopeName) -> Result<BTreeSet<ConnectionId>, HubError> {
        self.request(|reply| HubCommand::MembersOf { scope, reply })
            .await
    }

    /// Connection and scope counts.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.request(|reply| HubCommand::Stats { reply }).await
    }

    /// Close every connection, clear the registry and stop the task.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.request(|reply| HubCommand::Shutdown { reply }).await
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// State owned by the hub task.
#[derive(Debug)]
pub struct Hub {
    registry: ScopeRegistry,
    connections: ConnectionTable,
    router: EventRouter,
}

impl Hub {
    /// Create the hub state from configuration.
    pub fn new(config: &HubConfig) -> Self {
        Self {
            registry: ScopeRegistry::new(),
            connections: ConnectionTable::new(config.outbound_capacity),
            router: EventRouter::new(config.max_dropped_messages),
        }
    }

    /// Start the hub task.
    pub fn spawn(config: &HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_capacity.max(1));
        let hub = Self::new(config);
        let task = tokio::spawn(hub.run(rx));
        (HubHandle { commands: tx }, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<HubCommand>) {
        info!("Realtime hub started");
        while let Some(command) = commands.recv().await {
            if self.handle(command).is_break() {
                break;
            }
        }
        self.teardown();
        info!("Realtime hub stopped");
    }

    fn handle(&mut self, command: HubCommand) -> ControlFlow<()> {
        match command {
            HubCommand::Connect { admission, reply } => {
                let registration = self.connect(admission);
                if let Err(orphan) = reply.send(registration) {
                    // Caller went away before learning its id.
                    self.close_connection(orphan.id, CloseReason::TransportClosed);
                }
            }
            HubCommand::Scope {
                conn,
                request,
                reply,
            } => {
                let changed = self.apply_scope_request(conn, request);
                let _ = reply.send(changed);
            }
            HubCommand::Disconnect {
                conn,
                reason,
                reply,
            } => {
                let closed = self.close_connection(conn, reason);
                let _ = reply.send(closed);
            }
            HubCommand::Publish { envelope, reply } => {
                let report = self.publish(&envelope);
                let _ = reply.send(report);
            }
            HubCommand::MembersOf { scope, reply } => {
                let _ = reply.send(self.registry.members_of(&scope));
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            HubCommand::Shutdown { reply } => {
                self.teardown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn connect(&mut self, admission: Admission) -> Registration {
        let authenticated_at = admission.authenticated_at();
        let registration = self.connections.register(admission);
        if let Some(conn) = self.connections.get(registration.id) {
            let identity = conn.identity();
            info!(
                conn_id = %registration.id,
                user_id = %identity.user_id,
                email = %identity.email,
                role = %identity.role,
                %authenticated_at,
                connections = self.connections.len(),
                "Viewer connected"
            );
        }
        registration
    }

    fn apply_scope_request(&mut self, conn: ConnectionId, request: ScopeRequest) -> bool {
        if self.connections.get(conn).is_none() {
            debug!(conn_id = %conn, ?request, "Scope request for unknown connection ignored");
            return false;
        }

        let (changed, ack) = match request {
            ScopeRequest::Join(scope) => {
                let changed = self.registry.join(conn, scope.clone());
                debug!(conn_id = %conn, %scope, changed, "Joined scope");
                (changed, ControlEvent::ScopeJoined { scope })
            }
            ScopeRequest::Leave(scope) => {
                let changed = self.registry.leave(conn, &scope);
                debug!(conn_id = %conn, %scope, changed, "Left scope");
                (changed, ControlEvent::ScopeLeft { scope })
            }
        };

        self.send_control(conn, &ack);
        changed
    }

    fn send_control(&mut self, conn: ConnectionId, event: &ControlEvent) {
        let frame = match event.to_frame() {
            Ok(frame) => Arc::<str>::from(frame),
            Err(err) => {
                warn!(conn_id = %conn, error = %err, "Failed to encode control frame");
                return;
            }
        };
        let Some(connection) = self.connections.get_mut(conn) else {
            return;
        };
        let delivery = connection.try_deliver(&frame);
        if let Delivery::Dropped { total } = delivery {
            warn!(
                conn_id = %conn,
                event = event.name(),
                dropped_total = total,
                "Outbound queue full, frame dropped"
            );
        }
        if let Some(reason) = self.router.close_reason(delivery) {
            self.close_connection(conn, reason);
        }
    }

    fn publish(&mut self, envelope: &Envelope) -> DispatchReport {
        let report = self
            .router
            .dispatch(envelope, &self.registry, &mut self.connections);
        for (conn, reason) in &report.to_close {
            self.close_connection(*conn, *reason);
        }
        report
    }

    fn close_connection(&mut self, conn: ConnectionId, reason: CloseReason) -> bool {
        let Some(connection) = self.connections.close(conn) else {
            return false;
        };
        let scopes = self.registry.remove_connection(conn);
        let age = Utc::now().signed_duration_since(connection.created_at());
        let identity = connection.identity();

        if reason == CloseReason::SlowConsumer {
            warn!(
                conn_id = %conn,
                user_id = %identity.user_id,
                dropped = connection.dropped(),
                "Closing slow consumer"
            );
        }
        info!(
            conn_id = %conn,
            user_id = %identity.user_id,
            email = %identity.email,
            role = %identity.role,
            %reason,
            scopes = scopes.len(),
            age_secs = age.num_seconds(),
            connections = self.connections.len(),
            "Viewer disconnected"
        );
        true
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            scopes: self
                .registry
                .scope_sizes()
                .into_iter()
                .map(|(scope, members)| ScopeStats {
                    scope: scope.to_string(),
                    members,
                })
                .collect(),
        }
    }

    /// Drop every connection and membership.
    fn teardown(&mut self) {
        let closed = self.connections.close_all();
        self.registry.clear();
        if !closed.is_empty() {
            info!(
                connections = closed.len(),
                reason = %CloseReason::Shutdown,
                "Closed all viewer connections"
            );
        }
    }
}
