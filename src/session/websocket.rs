//! Websocket implementation of [`SessionTransport`] over tokio-tungstenite.
//!
//! The async socket lives on its own runtime thread; inbound frames and
//! connection lifecycle are forwarded to the session's crossbeam event
//! channel in arrival order, and outbound sends go through an unbounded
//! tokio channel drained into the socket sink. The synchronous session core
//! never touches the runtime.

use crate::error::{LensliveError, Result};
use crate::protocol::ClientMessage;
use crate::session::transport::{SessionTransport, TransportEvent};
use crossbeam_channel::Sender;
use futures_util::{SinkExt, StreamExt};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_tungstenite::{connect_async, tungstenite};

/// Websocket transport to the assistant backend.
pub struct WebsocketTransport {
    url: String,
    headers: Vec<(String, String)>,
    event_tx: Sender<TransportEvent>,
    outbound_tx: Option<UnboundedSender<String>>,
    thread: Option<JoinHandle<()>>,
}

impl WebsocketTransport {
    /// Creates a transport targeting `url`. Events are delivered on
    /// `event_tx` once `open` is called.
    pub fn new(url: &str, event_tx: Sender<TransportEvent>) -> Self {
        Self {
            url: url.to_string(),
            headers: Vec::new(),
            event_tx,
            outbound_tx: None,
            thread: None,
        }
    }

    /// Adds a header to the connection handshake (API keys and the like).
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn build_request(&self) -> Result<tungstenite::http::Request<()>> {
        let uri: tungstenite::http::Uri =
            self.url.parse().map_err(|e| LensliveError::Transport {
                message: format!("invalid websocket url: {}", e),
            })?;
        let host = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .ok_or_else(|| LensliveError::Transport {
                message: "websocket url has no host".to_string(),
            })?;

        let mut request = tungstenite::http::Request::builder()
            .uri(uri)
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            );

        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        request.body(()).map_err(|e| LensliveError::Transport {
            message: format!("failed to build request: {}", e),
        })
    }
}

impl SessionTransport for WebsocketTransport {
    fn open(&mut self) -> Result<()> {
        if self.outbound_tx.is_some() {
            return Err(LensliveError::Transport {
                message: "transport already open".to_string(),
            });
        }

        let request = self.build_request()?;
        let (outbound_tx, outbound_rx) = unbounded_channel();
        let event_tx = self.event_tx.clone();

        self.outbound_tx = Some(outbound_tx);
        self.thread = Some(thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = event_tx.send(TransportEvent::Error(format!(
                        "failed to start websocket runtime: {}",
                        e
                    )));
                    return;
                }
            };
            runtime.block_on(run_connection(request, outbound_rx, event_tx));
        }));
        Ok(())
    }

    fn send(&self, message: &ClientMessage) -> Result<()> {
        let payload = message.to_json()?;
        let outbound_tx = self
            .outbound_tx
            .as_ref()
            .ok_or_else(|| LensliveError::Transport {
                message: "transport not open".to_string(),
            })?;
        outbound_tx
            .send(payload)
            .map_err(|_| LensliveError::Transport {
                message: "connection task is gone".to_string(),
            })
    }

    fn close(&mut self) {
        // Dropping the outbound sender tells the connection task to close
        // the socket; it emits the Close event itself.
        self.outbound_tx = None;
        // The connection thread dies with the socket; no join needed.
        self.thread = None;
    }
}

async fn run_connection(
    request: tungstenite::http::Request<()>,
    mut outbound_rx: UnboundedReceiver<String>,
    event_tx: Sender<TransportEvent>,
) {
    let ws_stream = match connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let _ = event_tx.send(TransportEvent::Error(format!("connect failed: {}", e)));
            return;
        }
    };

    let _ = event_tx.send(TransportEvent::Open);
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Some(payload) => {
                    if let Err(e) = ws_tx.send(tungstenite::Message::Text(payload.into())).await {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                None => {
                    let _ = ws_tx.close().await;
                    let _ = event_tx.send(TransportEvent::Close("client closed".to_string()));
                    break;
                }
            },
            inbound = ws_rx.next() => match inbound {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    let _ = event_tx.send(TransportEvent::Message(text.to_string()));
                }
                // The backend may frame JSON payloads as binary.
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    if let Ok(text) = String::from_utf8(data.to_vec()) {
                        let _ = event_tx.send(TransportEvent::Message(text));
                    }
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "closed by server".to_string());
                    let _ = event_tx.send(TransportEvent::Close(reason));
                    break;
                }
                // Ping/pong is answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => {
                    let _ = event_tx.send(TransportEvent::Close("connection ended".to_string()));
                    break;
                }
            }
        }
    }
}
