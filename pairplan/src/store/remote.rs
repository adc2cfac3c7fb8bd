//! WebSocket client for a `pairplan-docstore` server.
//!
//! Requests are correlated with responses by `request_id`. A background
//! reader task resolves pending requests and routes subscription snapshots
//! to their feeds; a writer task owns the sink half of the socket so that
//! cancellation (which is synchronous) can still send an `Unsubscribe`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pairplan_proto::wire::{
    self, ClientFrame, FieldFilter, ServerFrame, StoreRequest, StoreResponse, StoredDocument,
    Write,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{DocumentStore, SnapshotFeed, StoreError};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// Request id used for frames whose response nobody waits for.
const FIRE_AND_FORGET: u64 = 0;

struct Reply {
    response: StoreResponse,
    snapshots: Option<mpsc::UnboundedReceiver<Vec<StoredDocument>>>,
}

struct Shared {
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    subscriptions: Mutex<HashMap<u64, mpsc::UnboundedSender<Vec<StoredDocument>>>>,
    connected: AtomicBool,
}

/// [`DocumentStore`] backed by a remote document store server.
///
/// Created via [`RemoteStore::connect`]. Dropping it closes the connection
/// and ends every open [`SnapshotFeed`].
pub struct RemoteStore {
    url: String,
    outgoing: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
    next_request: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl RemoteStore {
    /// Connects to a store server at a `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Transport`] if the URL is invalid or the handshake fails.
    /// - [`StoreError::Timeout`] if the connection is not up within
    ///   `connect_timeout`.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| StoreError::Transport(format!("invalid store url {url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(StoreError::Transport(format!(
                "store url must use ws:// or wss://, got {}://",
                parsed.scheme()
            )));
        }

        let (ws_stream, _response) = tokio::time::timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                tracing::warn!(url, "store connect timed out");
                StoreError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url, error = %e, "store connect failed");
                map_connect_error(e)
            })?;

        let (mut sink, stream) = ws_stream.split();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
        });

        let (outgoing, mut rx) = mpsc::unbounded_channel::<Message>();
        let writer_shared = Arc::clone(&shared);
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    tracing::warn!(error = %e, "store write failed");
                    break;
                }
            }
            writer_shared.connected.store(false, Ordering::Release);
        });
        let reader = tokio::spawn(reader_loop(stream, Arc::clone(&shared), outgoing.clone()));

        tracing::info!(url, "connected to document store");
        Ok(Self {
            url: url.to_string(),
            outgoing,
            shared,
            next_request: AtomicU64::new(FIRE_AND_FORGET + 1),
            request_timeout,
            reader,
            writer,
        })
    }

    /// The server URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the connection is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    async fn request(&self, request: StoreRequest) -> Result<Reply, StoreError> {
        if !self.is_connected() {
            return Err(StoreError::Closed);
        }
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let bytes = wire::encode_client(&ClientFrame {
            request_id,
            request,
        })
        .map_err(|e| StoreError::Protocol(e.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared.pending.lock().insert(request_id, reply_tx);
        if self.outgoing.send(Message::Binary(bytes.into())).is_err() {
            self.shared.pending.lock().remove(&request_id);
            return Err(StoreError::Closed);
        }

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(StoreError::Closed),
            Err(_) => {
                self.shared.pending.lock().remove(&request_id);
                tracing::warn!(request_id, "store request timed out");
                Err(StoreError::Timeout)
            }
        }
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
        self.shared.connected.store(false, Ordering::Release);
        self.shared.pending.lock().clear();
        self.shared.subscriptions.lock().clear();
    }
}

fn unexpected(response: StoreResponse) -> StoreError {
    match response {
        StoreResponse::Error(fault) => StoreError::Rejected(fault),
        other => StoreError::Protocol(format!("{other:?}")),
    }
}

impl DocumentStore for RemoteStore {
    async fn get(&self, path: &str) -> Result<Option<StoredDocument>, StoreError> {
        let reply = self
            .request(StoreRequest::Get {
                path: path.to_string(),
            })
            .await?;
        match reply.response {
            StoreResponse::Document(doc) => Ok(doc),
            other => Err(unexpected(other)),
        }
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<u64, StoreError> {
        let reply = self.request(StoreRequest::Commit { writes }).await?;
        match reply.response {
            StoreResponse::Committed { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<FieldFilter>,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let reply = self
            .request(StoreRequest::List {
                collection: collection.to_string(),
                filter,
            })
            .await?;
        match reply.response {
            StoreResponse::Documents(docs) => Ok(docs),
            other => Err(unexpected(other)),
        }
    }

    async fn subscribe(&self, collection: &str) -> Result<SnapshotFeed, StoreError> {
        let reply = self
            .request(StoreRequest::Subscribe {
                collection: collection.to_string(),
            })
            .await?;
        let subscription_id = match reply.response {
            StoreResponse::Subscribed { subscription_id } => subscription_id,
            other => return Err(unexpected(other)),
        };
        let Some(rx) = reply.snapshots else {
            return Err(StoreError::Protocol(
                "subscription reply without a snapshot channel".into(),
            ));
        };

        let shared = Arc::clone(&self.shared);
        let outgoing = self.outgoing.clone();
        Ok(SnapshotFeed::new(rx, move || {
            shared.subscriptions.lock().remove(&subscription_id);
            send_unsubscribe(&outgoing, subscription_id);
        }))
    }
}

fn send_unsubscribe(outgoing: &mpsc::UnboundedSender<Message>, subscription_id: u64) {
    let frame = ClientFrame {
        request_id: FIRE_AND_FORGET,
        request: StoreRequest::Unsubscribe { subscription_id },
    };
    match wire::encode_client(&frame) {
        Ok(bytes) => {
            let _ = outgoing.send(Message::Binary(bytes.into()));
        }
        Err(e) => tracing::error!(error = %e, "failed to encode unsubscribe"),
    }
}

/// Reads server frames until the socket closes.
///
/// Malformed frames are logged and skipped. On exit every pending request
/// fails with [`StoreError::Closed`] and every feed ends.
async fn reader_loop(
    mut ws_reader: WsReader,
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Message>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match wire::decode_server(&data) {
                Ok(frame) => dispatch(frame, &shared, &outgoing),
                Err(e) => tracing::warn!(error = %e, "malformed store frame, skipping"),
            },
            Ok(Message::Close(_)) => {
                tracing::info!("store connection closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "store read error");
                break;
            }
        }
    }
    shared.connected.store(false, Ordering::Release);
    shared.pending.lock().clear();
    shared.subscriptions.lock().clear();
    tracing::info!("store reader task exiting");
}

fn dispatch(frame: ServerFrame, shared: &Shared, outgoing: &mpsc::UnboundedSender<Message>) {
    match frame {
        ServerFrame::Response {
            request_id,
            response,
        } => {
            let Some(reply_tx) = shared.pending.lock().remove(&request_id) else {
                tracing::debug!(request_id, "response without a waiting request");
                return;
            };
            // Register before the reader moves on: the first snapshot is
            // the very next frame.
            let snapshots = if let StoreResponse::Subscribed { subscription_id } = &response {
                let (tx, rx) = mpsc::unbounded_channel();
                shared.subscriptions.lock().insert(*subscription_id, tx);
                Some(rx)
            } else {
                None
            };
            let _ = reply_tx.send(Reply {
                response,
                snapshots,
            });
        }
        ServerFrame::Snapshot {
            subscription_id,
            documents,
        } => {
            let mut subscriptions = shared.subscriptions.lock();
            let Some(tx) = subscriptions.get(&subscription_id) else {
                tracing::debug!(subscription_id, "snapshot for closed subscription");
                return;
            };
            if tx.send(documents).is_err() {
                subscriptions.remove(&subscription_id);
                drop(subscriptions);
                send_unsubscribe(outgoing, subscription_id);
            }
        }
        ServerFrame::Error { reason } => {
            tracing::warn!(reason = %reason, "store server reported an error");
        }
    }
}

fn map_connect_error(err: tokio_tungstenite::tungstenite::Error) -> StoreError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Http(response) => {
            StoreError::Transport(format!("store HTTP error: status {}", response.status()))
        }
        other => StoreError::Transport(other.to_string()),
    }
}
