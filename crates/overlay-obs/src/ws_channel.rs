//! [`ControlChannel`] over a real obs-websocket v5 connection.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::channel::{ChannelEvent, ChannelEvents, ControlChannel};
use crate::errors::{ObsError, RemoteCallError};
use crate::protocol::{self, op, Envelope, EventMessage, Hello, Identified, Identify, Request, RequestResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reply slot for an in-flight request.
type PendingTx = oneshot::Sender<Result<Value, RemoteCallError>>;

const EVENT_QUEUE: usize = 256;
const COMMAND_QUEUE: usize = 64;
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// WebSocket-backed control channel.
pub struct WsChannel {
    request_timeout: Duration,
    link: parking_lot::Mutex<Option<Link>>,
}

/// The live connection: command queue into the handler task.
struct Link {
    cmd_tx: mpsc::Sender<Command>,
    handler: JoinHandle<()>,
}

struct Command {
    request_type: String,
    data: Option<Value>,
    response_tx: PendingTx,
}

impl WsChannel {
    /// `request_timeout` bounds both the handshake and each request.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            link: parking_lot::Mutex::new(None),
        }
    }

    async fn close_link(&self) {
        let link = self.link.lock().take();
        if let Some(Link { cmd_tx, mut handler }) = link {
            drop(cmd_tx);
            if tokio::time::timeout(CLOSE_GRACE, &mut handler).await.is_err() {
                handler.abort();
            }
        }
    }
}

impl Default for WsChannel {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ControlChannel for WsChannel {
    async fn connect(&self, address: &str, credential: Option<&str>) -> Result<ChannelEvents, ObsError> {
        self.close_link().await;

        let ws = tokio::time::timeout(self.request_timeout, handshake(address, credential))
            .await
            .map_err(|_| ObsError::Connection(format!("handshake with {address} timed out")))??;

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let handler = tokio::spawn(handler_loop(ws, cmd_rx, events_tx));

        let previous = self.link.lock().replace(Link { cmd_tx, handler });
        if let Some(stale) = previous {
            stale.handler.abort();
        }
        Ok(events_rx)
    }

    async fn call(&self, request_type: &str, data: Option<Value>) -> Result<Value, ObsError> {
        let cmd_tx = self
            .link
            .lock()
            .as_ref()
            .map(|link| link.cmd_tx.clone())
            .ok_or_else(|| ObsError::not_connected(request_type))?;

        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(Command {
                request_type: request_type.to_string(),
                data,
                response_tx: tx,
            })
            .await
            .map_err(|_| ObsError::remote(request_type, RemoteCallError::ChannelClosed))?;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Err(_) => Err(ObsError::remote(request_type, RemoteCallError::Timeout(self.request_timeout))),
            Ok(Err(_)) => Err(ObsError::remote(request_type, RemoteCallError::ChannelClosed)),
            Ok(Ok(reply)) => reply.map_err(|kind| ObsError::remote(request_type, kind)),
        }
    }

    async fn disconnect(&self) {
        self.close_link().await;
    }
}

/// Open the socket and run Hello → Identify → Identified.
async fn handshake(address: &str, credential: Option<&str>) -> Result<WsStream, ObsError> {
    let (mut ws, _) = connect_async(address)
        .await
        .map_err(|e| ObsError::Connection(format!("{address}: {e}")))?;

    let hello = read_envelope(&mut ws).await?;
    if hello.op != op::HELLO {
        return Err(ObsError::Connection(format!("expected Hello, got opcode {}", hello.op)));
    }
    let hello: Hello =
        serde_json::from_value(hello.d).map_err(|e| ObsError::Connection(format!("malformed Hello: {e}")))?;
    if hello.rpc_version < protocol::RPC_VERSION {
        return Err(ObsError::Connection(format!(
            "unsupported rpc version {}",
            hello.rpc_version
        )));
    }
    tracing::debug!(server_version = ?hello.obs_web_socket_version, "Received Hello");

    let authentication = match (&hello.authentication, credential) {
        (Some(auth), Some(password)) => Some(protocol::auth_response(password, &auth.salt, &auth.challenge)),
        (Some(_), None) => {
            return Err(ObsError::Connection("server requires a password".into()));
        }
        (None, _) => None,
    };

    let identify = Identify {
        rpc_version: protocol::RPC_VERSION,
        authentication,
        event_subscriptions: protocol::subscription::CLIENT_DEFAULT,
    };
    send_envelope(&mut ws, op::IDENTIFY, &identify).await?;

    let reply = read_envelope(&mut ws).await?;
    if reply.op != op::IDENTIFIED {
        return Err(ObsError::Connection(format!("expected Identified, got opcode {}", reply.op)));
    }
    let identified: Identified =
        serde_json::from_value(reply.d).map_err(|e| ObsError::Connection(format!("malformed Identified: {e}")))?;
    tracing::debug!(rpc_version = identified.negotiated_rpc_version, "Identified");

    Ok(ws)
}

async fn send_envelope(ws: &mut WsStream, opcode: u8, payload: &impl serde::Serialize) -> Result<(), ObsError> {
    let envelope = Envelope::new(opcode, payload).map_err(|e| ObsError::Connection(e.to_string()))?;
    let text = serde_json::to_string(&envelope).map_err(|e| ObsError::Connection(e.to_string()))?;
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|e| ObsError::Connection(e.to_string()))
}

/// Next protocol envelope during the handshake. A close frame is reported
/// with the server's reason.
async fn read_envelope(ws: &mut WsStream) -> Result<Envelope, ObsError> {
    loop {
        let msg = ws
            .next()
            .await
            .ok_or_else(|| ObsError::Connection("closed during handshake".into()))?
            .map_err(|e| ObsError::Connection(e.to_string()))?;
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text)
                    .map_err(|e| ObsError::Connection(format!("malformed message: {e}")));
            }
            Message::Close(frame) => {
                let reason = frame.map_or("connection closed", |f| protocol::describe_close_code(u16::from(f.code)));
                return Err(ObsError::Connection(reason.to_string()));
            }
            _ => {}
        }
    }
}

async fn handler_loop(ws: WsStream, mut cmd_rx: mpsc::Receiver<Command>, events_tx: mpsc::Sender<ChannelEvent>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<String, PendingTx> = HashMap::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    let _ = ws_tx.close().await;
                    break;
                };
                let request_id = Uuid::now_v7().to_string();
                let request = Request {
                    request_type: &cmd.request_type,
                    request_id: &request_id,
                    request_data: cmd.data,
                };
                let text = match Envelope::new(op::REQUEST, &request).and_then(|env| serde_json::to_string(&env)) {
                    Ok(text) => text,
                    Err(e) => {
                        let _ = cmd.response_tx.send(Err(RemoteCallError::InvalidResponse(e.to_string())));
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    let _ = cmd.response_tx.send(Err(RemoteCallError::ChannelClosed));
                    break;
                }
                let _ = pending.insert(request_id, cmd.response_tx);
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_text(&text, &mut pending, &events_tx),
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        tracing::info!(?code, reason = code.map_or("", protocol::describe_close_code), "OBS closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = events_tx.try_send(ChannelEvent::Error(e.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    // Dropping `pending` fails every outstanding call with ChannelClosed;
    // dropping `events_tx` tells the client the connection is gone.
}

fn handle_text(text: &str, pending: &mut HashMap<String, PendingTx>, events_tx: &mpsc::Sender<ChannelEvent>) {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed OBS message");
            return;
        }
    };

    match envelope.op {
        op::EVENT => {
            let Ok(event) = serde_json::from_value::<EventMessage>(envelope.d) else {
                tracing::warn!("Ignoring malformed OBS event");
                return;
            };
            let forwarded = ChannelEvent::Event {
                event_type: event.event_type,
                data: event.event_data,
            };
            if let Err(mpsc::error::TrySendError::Full(_)) = events_tx.try_send(forwarded) {
                tracing::warn!("Event queue full, dropping OBS event");
            }
        }
        op::REQUEST_RESPONSE => {
            let response: RequestResponse = match serde_json::from_value(envelope.d) {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed request response");
                    return;
                }
            };
            let Some(tx) = pending.remove(&response.request_id) else {
                tracing::debug!(request_id = %response.request_id, "Reply for unknown request");
                return;
            };
            let reply = if response.request_status.result {
                Ok(response.response_data)
            } else {
                Err(RemoteCallError::Failed {
                    code: response.request_status.code,
                    comment: response.request_status.comment.unwrap_or_default(),
                })
            };
            tracing::trace!(request = %response.request_type, ok = reply.is_ok(), "Request completed");
            let _ = tx.send(reply);
        }
        other => tracing::trace!(op = other, "Ignoring OBS opcode"),
    }
}
