//! WebSocket front end for the [`MemoryStore`].
//!
//! Each connection gets a writer task fed by an unbounded channel and a
//! reader loop that decodes [`ClientFrame`]s, runs them against the shared
//! store and queues exactly one [`ServerFrame::Response`] per request.
//! Subscriptions are forwarded by one task each, pushing
//! [`ServerFrame::Snapshot`]s into the same writer channel. When the
//! connection ends every subscription it opened is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use pairplan_proto::wire::{self, ClientFrame, ServerFrame, StoreFault, StoreRequest, StoreResponse};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::engine::MemoryStore;

/// Default maximum inbound frame size in bytes (256 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

type Subscriptions = Arc<parking_lot::Mutex<HashMap<u64, JoinHandle<()>>>>;

/// Shared server state: the store plus the live connection table.
pub struct ServerState {
    /// The document engine every connection operates on.
    pub store: Arc<MemoryStore>,
    connections: RwLock<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    next_connection: AtomicU64,
    max_frame_size: usize,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Creates state around a fresh store with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Arc::new(MemoryStore::new()), DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates state around an existing store with a custom frame limit.
    #[must_use]
    pub fn with_config(store: Arc<MemoryStore>, max_frame_size: usize) -> Self {
        Self {
            store,
            connections: RwLock::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
            max_frame_size,
        }
    }

    async fn register(&self, tx: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        self.connections.write().await.insert(id, tx);
        id
    }

    async fn unregister(&self, id: u64) {
        self.connections.write().await.remove(&id);
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Sends a Close frame to every connected client.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (conn_id, sender) in conns.iter() {
            tracing::info!(conn_id, "sending close frame");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// Handles one upgraded WebSocket connection until either side closes.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn_id = state.register(tx.clone()).await;
    tracing::info!(conn_id, "client connected");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id, "WebSocket write failed");
                break;
            }
        }
    });

    let subscriptions: Subscriptions = Arc::default();
    let reader_state = Arc::clone(&state);
    let reader_subs = Arc::clone(&subscriptions);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(conn_id, &data, &reader_state, &tx, &reader_subs);
                }
                Message::Close(_) => {
                    tracing::info!(conn_id, "received close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let opened: Vec<_> = subscriptions.lock().drain().collect();
    for (subscription_id, forwarder) in opened {
        state.store.unsubscribe(subscription_id);
        forwarder.abort();
    }
    state.unregister(conn_id).await;
    tracing::info!(conn_id, "client disconnected");
}

fn handle_binary_message(
    conn_id: u64,
    data: &[u8],
    state: &ServerState,
    tx: &mpsc::UnboundedSender<Message>,
    subscriptions: &Subscriptions,
) {
    if data.len() > state.max_frame_size {
        tracing::warn!(
            conn_id,
            size = data.len(),
            max = state.max_frame_size,
            "frame exceeds size limit"
        );
        let fault = StoreFault::FrameTooLarge {
            len: data.len(),
            max: state.max_frame_size,
        };
        let frame = match wire::peek_request_id(data) {
            Some(request_id) => ServerFrame::Response {
                request_id,
                response: StoreResponse::Error(fault),
            },
            None => ServerFrame::Error {
                reason: fault.to_string(),
            },
        };
        queue(tx, &frame);
        return;
    }

    let frame = match wire::decode_client(data) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(conn_id, error = %e, "failed to decode frame");
            queue(
                tx,
                &ServerFrame::Error {
                    reason: format!("malformed frame: {e}"),
                },
            );
            return;
        }
    };
    let ClientFrame {
        request_id,
        request,
    } = frame;

    let response = match request {
        StoreRequest::Get { path } => match state.store.get(&path) {
            Ok(doc) => StoreResponse::Document(doc),
            Err(fault) => StoreResponse::Error(fault),
        },
        StoreRequest::Commit { writes } => {
            tracing::debug!(conn_id, writes = writes.len(), "commit");
            match state.store.commit(writes) {
                Ok(version) => StoreResponse::Committed { version },
                Err(fault) => StoreResponse::Error(fault),
            }
        }
        StoreRequest::List { collection, filter } => {
            match state.store.list(&collection, filter.as_ref()) {
                Ok(docs) => StoreResponse::Documents(docs),
                Err(fault) => StoreResponse::Error(fault),
            }
        }
        StoreRequest::Subscribe { collection } => match state.store.subscribe(&collection) {
            Ok((subscription_id, mut snapshots)) => {
                // The response must precede the first snapshot on the wire.
                queue(
                    tx,
                    &ServerFrame::Response {
                        request_id,
                        response: StoreResponse::Subscribed { subscription_id },
                    },
                );
                let forward_tx = tx.clone();
                let forwarder = tokio::spawn(async move {
                    while let Some(documents) = snapshots.recv().await {
                        let frame = ServerFrame::Snapshot {
                            subscription_id,
                            documents,
                        };
                        if !queue(&forward_tx, &frame) {
                            break;
                        }
                    }
                });
                subscriptions.lock().insert(subscription_id, forwarder);
                tracing::info!(conn_id, subscription_id, path = %collection, "subscription opened");
                return;
            }
            Err(fault) => StoreResponse::Error(fault),
        },
        StoreRequest::Unsubscribe { subscription_id } => {
            if let Some(forwarder) = subscriptions.lock().remove(&subscription_id) {
                state.store.unsubscribe(subscription_id);
                forwarder.abort();
                tracing::info!(conn_id, subscription_id, "subscription closed");
            }
            StoreResponse::Unsubscribed
        }
    };

    queue(
        tx,
        &ServerFrame::Response {
            request_id,
            response,
        },
    );
}

/// Encodes a frame onto the writer channel. Returns `false` once the
/// connection's writer is gone.
fn queue(tx: &mpsc::UnboundedSender<Message>, frame: &ServerFrame) -> bool {
    match wire::encode_server(frame) {
        Ok(bytes) => tx.send(Message::Binary(bytes.into())).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode server frame");
            true
        }
    }
}

/// Starts the server on `addr` with a fresh store.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new())).await
}

/// Starts the server with a pre-configured [`ServerState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "document store server error");
        }
    });

    Ok((bound_addr, handle))
}

async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
