//! DevTools WebSocket connection
//!
//! One connection per attached target. Commands are correlated to responses
//! through an id map; unsolicited notifications fan out to subscribers. The
//! socket is split so the reader task never contends with writers.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::types::{CdpNotification, CdpRequest, CdpRpcResponse};
use crate::{Error, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingMap = HashMap<u64, oneshot::Sender<CdpRpcResponse>>;

/// WebSocket connection to one DevTools target.
#[derive(Debug)]
pub struct CdpConnection {
    url: String,
    sink: Mutex<WsSink>,
    next_id: AtomicU64,
    pending: Arc<Mutex<PendingMap>>,
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<CdpNotification>>>>,
    alive: Arc<AtomicBool>,
    command_timeout: std::time::Duration,
}

impl CdpConnection {
    /// Connect to a DevTools WebSocket URL and start the reader task.
    pub async fn connect(url: &str, command_timeout: std::time::Duration) -> Result<Arc<Self>> {
        debug!("Connecting to DevTools target {}", url);

        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::websocket(format!("Failed to connect to {}: {}", url, e)))?;
        let (sink, source) = stream.split();

        let connection = Arc::new(Self {
            url: url.to_string(),
            sink: Mutex::new(sink),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            alive: Arc::new(AtomicBool::new(true)),
            command_timeout,
        });

        tokio::spawn(Self::read_loop(
            source,
            connection.pending.clone(),
            connection.subscribers.clone(),
            connection.alive.clone(),
        ));

        Ok(connection)
    }

    async fn read_loop(
        mut source: WsSource,
        pending: Arc<Mutex<PendingMap>>,
        subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<CdpNotification>>>>,
        alive: Arc<AtomicBool>,
    ) {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Ok(response) = serde_json::from_str::<CdpRpcResponse>(&text) {
                        let sender = pending.lock().await.remove(&response.id);
                        match sender {
                            Some(sender) => {
                                let _ = sender.send(response);
                            }
                            None => warn!("Response for unknown command id {}", response.id),
                        }
                    } else if let Ok(event) = serde_json::from_str::<CdpNotification>(&text) {
                        let mut subs = subscribers.lock().await;
                        subs.retain(|sender| sender.send(event.clone()).is_ok());
                    } else {
                        warn!("Unrecognized DevTools frame: {}", text);
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }

        alive.store(false, Ordering::SeqCst);
        // Unblock everyone still waiting on a response.
        pending.lock().await.clear();
        debug!("DevTools reader loop ended");
    }

    /// Send a command and wait for its response.
    pub async fn send_command(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if !self.is_alive() {
            return Err(Error::session_crashed(format!(
                "connection to {} is gone",
                self.url
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.to_string(),
            params: if params.is_null() { None } else { Some(params) },
        };
        let json = serde_json::to_string(&request)?;

        let (sender, receiver) = oneshot::channel();
        self.pending.lock().await.insert(id, sender);

        {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(json))
                .await
                .map_err(|e| Error::websocket(format!("Failed to send command: {}", e)))?;
        }

        let response = match tokio::time::timeout(self.command_timeout, receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(Error::session_crashed(format!(
                    "connection dropped while {} was in flight",
                    method
                )))
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(Error::timeout(format!("{} timed out", method)));
            }
        };

        if let Some(error) = response.error {
            return Err(Error::cdp(format!(
                "{} failed: {} (code {})",
                method, error.message, error.code
            )));
        }
        Ok(response.result)
    }

    /// Subscribe to event notifications from this target.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<CdpNotification> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(sender);
        receiver
    }

    /// Close the socket.
    pub async fn close(&self) -> Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        let mut sink = self.sink.lock().await;
        sink.send(Message::Close(None))
            .await
            .map_err(|e| Error::websocket(format!("Failed to close: {}", e)))?;
        Ok(())
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}
