//! WebSocket transport for the chat connection
//!
//! Each connection runs in its own Tokio task that owns the socket. The task
//! forwards text frames to the session through an [`EventSink`] and writes
//! whatever the [`WsLink`] queues. Dropping or closing the link shuts the
//! task down, and the task always reports `Closed` on the way out.
//!
//! Inbound messages larger than the configured limit are refused by the
//! socket itself before they are buffered; that ends the connection.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::core::ProtocolError;

use super::connection::{ConnectRequest, ConnectionEvent, ConnectionLink, Connector, EventSink};

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

pub struct WsLink {
    send_tx: mpsc::UnboundedSender<String>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl ConnectionLink for WsLink {
    fn send(&self, frame: String) -> Result<()> {
        self.send_tx
            .send(frame)
            .map_err(|_| anyhow::anyhow!("WebSocket send failed: connection task has ended"))
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Connector for WsConnector {
    fn connect(&self, request: ConnectRequest, events: EventSink) -> Result<Box<dyn ConnectionLink>> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("WebSocket connect requires a Tokio runtime")?;

        let (send_tx, send_rx) = mpsc::unbounded_channel::<String>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        runtime.spawn(run_connection(request, events, send_rx, shutdown_rx));

        Ok(Box::new(WsLink {
            send_tx,
            shutdown: Some(shutdown_tx),
        }))
    }
}

async fn run_connection(
    request: ConnectRequest,
    events: EventSink,
    mut send_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let generation = events.generation();
    let connect = tokio_tungstenite::connect_async_with_config(
        request.url.as_str(),
        Some(socket_config(request.max_frame_bytes)),
        false,
    );

    // Closing while the handshake is still running abandons it
    let mut ws_stream = tokio::select! {
        _ = &mut shutdown_rx => {
            events.emit(ConnectionEvent::Closed { reason: "closed before open".to_string() });
            return;
        }
        result = connect => match result {
            Ok((stream, _response)) => stream,
            Err(err) => {
                tracing::warn!(generation, "WebSocket handshake failed: {}", err);
                events.emit(ConnectionEvent::Closed { reason: err.to_string() });
                return;
            }
        }
    };

    events.emit(ConnectionEvent::Opened);

    let reason = loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                let _ = ws_stream.close(None).await;
                break "closed by client".to_string();
            }
            outbound = send_rx.recv() => {
                let Some(text) = outbound else {
                    let _ = ws_stream.close(None).await;
                    break "closed by client".to_string();
                };
                if let Err(err) = ws_stream.send(Message::Text(text)).await {
                    break format!("send failed: {}", err);
                }
            }
            inbound = ws_stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => events.emit(ConnectionEvent::Frame(text)),
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .as_ref()
                            .map(|f| format!("close:{} {}", f.code, f.reason))
                            .unwrap_or_else(|| "closed".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break read_error_reason(generation, err),
                    None => break "eof".to_string(),
                }
            }
        }
    };

    events.emit(ConnectionEvent::Closed { reason });
}

/// Inbound messages over `max_frame_bytes` are refused while being read
fn socket_config(max_frame_bytes: usize) -> WebSocketConfig {
    WebSocketConfig {
        max_message_size: Some(max_frame_bytes),
        max_frame_size: Some(max_frame_bytes),
        ..Default::default()
    }
}

fn read_error_reason(generation: u64, err: WsError) -> String {
    match err {
        WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            let err = ProtocolError::FrameTooLarge {
                size,
                limit: max_size,
            };
            tracing::warn!(generation, "closing chat connection: {}", err);
            err.to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::{ConnectionState, Identity};
    use crate::transport::connection::{ConnectionEvents, ConnectionManager};
    use crate::transport::protocol::OutboundEvent;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Accept one WebSocket client on a local port and hand it to `script`
    async fn serve<F, Fut>(script: F) -> Config
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            script(ws).await;
        });

        let mut config = Config::default();
        config.server.base_url = format!("http://{}", addr);
        config
    }

    /// Drain until the server hangs up
    async fn read_to_end(
        ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    ) {
        while let Some(Ok(_)) = ws.next().await {}
    }

    async fn next_event(
        manager: &mut ConnectionManager,
        rx: &mut ConnectionEvents,
    ) -> ConnectionEvent {
        loop {
            let envelope = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for connection event")
                .expect("event channel closed");
            if let Some(event) = manager.accept(envelope) {
                return event;
            }
        }
    }

    fn open(config: Config) -> (ConnectionManager, ConnectionEvents) {
        let (mut manager, rx) = ConnectionManager::new(Arc::new(WsConnector::new()), config);
        manager.open(&Identity::new("u1", "tok"));
        (manager, rx)
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let config = serve(|mut ws| async move {
            let Some(Ok(Message::Text(turn))) = ws.next().await else {
                panic!("expected a user turn");
            };
            assert_eq!(turn, r#"{"content":"hi"}"#);
            ws.send(Message::Text(r#"{"type":"TOKEN","content":"Hel"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            read_to_end(&mut ws).await;
        })
        .await;
        let (mut manager, mut rx) = open(config);

        assert_eq!(next_event(&mut manager, &mut rx).await, ConnectionEvent::Opened);
        assert_eq!(manager.state(), ConnectionState::Open);
        manager.send(&OutboundEvent::user_turn("hi")).unwrap();

        assert_eq!(
            next_event(&mut manager, &mut rx).await,
            ConnectionEvent::Frame(r#"{"type":"TOKEN","content":"Hel"}"#.into())
        );
        assert!(matches!(
            next_event(&mut manager, &mut rx).await,
            ConnectionEvent::Closed { .. }
        ));
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_oversized_message_ends_connection() {
        let mut config = serve(|mut ws| async move {
            ws.send(Message::Text("x".repeat(1000))).await.unwrap();
            read_to_end(&mut ws).await;
        })
        .await;
        config.chat.max_frame_bytes = 64;
        let (mut manager, mut rx) = open(config);

        assert_eq!(next_event(&mut manager, &mut rx).await, ConnectionEvent::Opened);
        let ConnectionEvent::Closed { reason } = next_event(&mut manager, &mut rx).await else {
            panic!("oversized message must not be delivered");
        };
        assert!(reason.contains("exceeds limit of 64 bytes"), "reason: {}", reason);
    }

    #[tokio::test]
    async fn test_client_close_reports_closed() {
        let config = serve(|mut ws| async move {
            read_to_end(&mut ws).await;
        })
        .await;
        let (mut manager, mut rx) = open(config);
        assert_eq!(next_event(&mut manager, &mut rx).await, ConnectionEvent::Opened);

        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closing);

        assert_eq!(
            next_event(&mut manager, &mut rx).await,
            ConnectionEvent::Closed {
                reason: "closed by client".into()
            }
        );
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_refused_handshake_reports_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = Config::default();
        config.server.base_url = format!("http://{}", addr);
        let (mut manager, mut rx) = open(config);

        assert!(matches!(
            next_event(&mut manager, &mut rx).await,
            ConnectionEvent::Closed { .. }
        ));
        assert_eq!(manager.state(), ConnectionState::Closed);
    }
}
