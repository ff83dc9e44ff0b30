//! Viewer `WebSocket` endpoint.
//!
//! `GET /ws` authenticates the handshake before upgrading: a missing or
//! invalid credential is answered with 401 and the hub never hears about
//! the attempt. An admitted socket is registered with the hub and then
//! driven by one `select!` loop that
//!
//! - writes frames from the connection's outbound queue,
//! - turns `subscribe:*` / `unsubscribe:*` frames into scope requests,
//! - answers pings and sends periodic heartbeats.
//!
//! When the hub closes the connection (slow consumer, shutdown) the loop
//! ends at once: frames still queued are discarded and a write blocked on
//! a stalled peer is abandoned. Whatever ends the loop, the hub is told to
//! disconnect the connection; a repeated disconnect is harmless.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use grid_hub::{Admission, CloseReason, Handshake, HubError, Registration, credential_from};
use grid_types::{ClientMessage, ConnectionId, ControlEvent};
use serde::Deserialize;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::state::AppState;

/// How long a closing socket may spend delivering its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Bearer credential, used when no `Authorization` header is sent.
    pub token: Option<String>,
}

/// Authenticate, then upgrade to a viewer socket.
///
/// # Route
///
/// `GET /ws`
pub async fn viewer_socket(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, GatewayError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token = credential_from(authorization, query.token.as_deref());
    let admission = Handshake::begin().authenticate(&state.authenticator, token)?;

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };
    Ok(upgrade.on_upgrade(move |socket| run_socket(socket, state, admission)))
}

/// Drive one admitted socket until either side goes away.
async fn run_socket(mut socket: WebSocket, state: Arc<AppState>, admission: Admission) {
    let Registration { id, mut outbound } = match state.hub.connect(admission).await {
        Ok(registration) => registration,
        Err(e) => {
            warn!(error = %e, "Hub refused viewer connection");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let closed = outbound.close_signal();
    let mut heartbeat = state.heartbeat.map(heartbeat_timer);

    let reason = loop {
        let written = tokio::select! {
            // Frame queued by the hub for this connection.
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    debug!(conn_id = %id, "Hub closed connection");
                    let farewell = socket.send(Message::Close(None));
                    let _ = tokio::time::timeout(CLOSE_GRACE, farewell).await;
                    break CloseReason::TransportClosed;
                };
                write(&mut socket, &closed, Message::Text(String::from(&*frame).into())).await
            }
            // Frame from the viewer.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match handle_client_frame(&state, id, text.as_str()).await {
                            Ok(None) => Ok(()),
                            Ok(Some(reply)) => send_control(&mut socket, &closed, &reply).await,
                            Err(_) => break CloseReason::Shutdown,
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write(&mut socket, &closed, Message::Pong(data)).await
                    }
                    Some(Ok(Message::Close(_))) => break CloseReason::ClientClosed,
                    None => break CloseReason::TransportClosed,
                    Some(Err(e)) => {
                        debug!(conn_id = %id, error = %e, "WebSocket error");
                        break CloseReason::TransportError;
                    }
                    Some(Ok(Message::Binary(_) | Message::Pong(_))) => Ok(()),
                }
            }
            // Keep idle connections alive through proxies.
            () = tick(heartbeat.as_mut()) => {
                write(&mut socket, &closed, Message::Ping(axum::body::Bytes::new())).await
            }
        };
        if let Err(reason) = written {
            if reason == CloseReason::TransportClosed {
                debug!(conn_id = %id, "Hub closed connection during write");
            }
            break reason;
        }
    };

    if let Err(e) = state.hub.disconnect(id, reason).await {
        debug!(conn_id = %id, error = %e, "Disconnect after hub shutdown");
    }
}

/// Apply one client frame. Returns a control frame to send back directly
/// when the frame could not be understood.
async fn handle_client_frame(
    state: &AppState,
    id: ConnectionId,
    text: &str,
) -> Result<Option<ControlEvent>, HubError> {
    let request = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message.into_scope_request(),
        Err(e) => {
            debug!(conn_id = %id, error = %e, "Unrecognised client frame");
            return Ok(Some(ControlEvent::Error {
                message: format!("unrecognised message: {e}"),
            }));
        }
    };

    match request {
        Ok(request) => {
            state.hub.scope_request(id, request).await?;
            Ok(None)
        }
        Err(e) => Ok(Some(ControlEvent::Error {
            message: format!("invalid scope: {e}"),
        })),
    }
}

/// Write one message unless the hub closes the connection first.
///
/// The error is the reason the socket loop should end with.
async fn write(
    socket: &mut WebSocket,
    closed: &CancellationToken,
    message: Message,
) -> Result<(), CloseReason> {
    tokio::select! {
        biased;
        () = closed.cancelled() => Err(CloseReason::TransportClosed),
        sent = socket.send(message) => sent.map_err(|_err| CloseReason::TransportError),
    }
}

async fn send_control(
    socket: &mut WebSocket,
    closed: &CancellationToken,
    event: &ControlEvent,
) -> Result<(), CloseReason> {
    match event.to_frame() {
        Ok(frame) => write(socket, closed, Message::Text(frame.into())).await,
        Err(e) => {
            warn!(error = %e, "Failed to encode control frame");
            Ok(())
        }
    }
}

fn heartbeat_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval fires immediately; start one period out.
    timer.reset();
    timer
}

/// Wait for the next heartbeat, or forever when heartbeats are off.
async fn tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
