//! WebSocket transport for the lobby streaming connection.
//!
//! [`WebSocketTransport`] shuttles the protocol's JSON text frames over a
//! `tokio-tungstenite` stream; [`WebSocketConnector`] builds the
//! `/lobby/<key>` URL (lobby parameters and the API key travel as query
//! parameters, since this transport cannot carry headers) and implements the
//! [`Connector`] seam the supervisor reconnects through.
//!
//! Both `ws://` and `wss://` URLs are supported; TLS is handled via
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream). Only available
//! with the `transport-websocket` feature (enabled by default).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::WordRaceError;
use crate::supervisor::{ConnectParams, Connector};
use crate::transport::Transport;

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before
/// completion loses no frames, so it is safe inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::Io`] if the URL is invalid or the connection
    /// cannot be established. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); other errors map to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, WordRaceError> {
        tracing::debug!(url = %url, "connecting to lobby");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            WordRaceError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "lobby connection established");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Like [`connect`](Self::connect), failing with
    /// [`WordRaceError::Timeout`] if the connection is not established
    /// within the given duration.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::Timeout`] if the deadline elapses, or any
    /// error [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, WordRaceError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| WordRaceError::Timeout)?
    }

    /// Wrap an already-established WebSocket stream.
    ///
    /// Useful for custom TLS configuration or any other setup
    /// [`connect`](Self::connect) does not expose.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), WordRaceError> {
        if self.closed {
            return Err(WordRaceError::TransportClosed);
        }
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| WordRaceError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, WordRaceError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(WordRaceError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite answers pings itself; pongs carry nothing.
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    // Never produced by the read half; kept for exhaustiveness.
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), WordRaceError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| WordRaceError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// [`Connector`] that opens [`WebSocketTransport`]s against the lobby
/// endpoint, rebuilding the same URL on every retry.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    ws_url: String,
    api_key: String,
}

impl WebSocketConnector {
    pub fn new(ws_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Build the `/lobby/<key>` URL with the session query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::Io`] if the configured base URL is invalid.
    pub fn lobby_url(&self, params: &ConnectParams) -> Result<url::Url, WordRaceError> {
        let raw = format!(
            "{}/lobby/{}",
            self.ws_url.trim_end_matches('/'),
            params.lobby_key
        );
        let mut url = url::Url::parse(&raw).map_err(|e| {
            WordRaceError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        url.query_pairs_mut()
            .append_pair("display_name", &params.display_name)
            .append_pair(
                "weighted_words",
                if params.weighted_words { "true" } else { "false" },
            )
            .append_pair("num_rounds", &params.total_rounds.to_string())
            .append_pair("api_key", &self.api_key);
        Ok(url)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Conn = WebSocketTransport;

    async fn connect(&self, params: &ConnectParams) -> Result<Self::Conn, WordRaceError> {
        let url = self.lobby_url(params)?;
        WebSocketTransport::connect(url.as_str()).await
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn params() -> ConnectParams {
        ConnectParams {
            lobby_key: "4821".into(),
            display_name: "Alice Smith".into(),
            weighted_words: true,
            total_rounds: 5,
        }
    }

    #[test]
    fn lobby_url_carries_session_query_parameters() {
        let connector = WebSocketConnector::new("ws://localhost:8000", "wr_key");
        let url = connector.lobby_url(&params()).unwrap();

        assert_eq!(url.path(), "/lobby/4821");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("display_name".to_string(), "Alice Smith".to_string()),
                ("weighted_words".to_string(), "true".to_string()),
                ("num_rounds".to_string(), "5".to_string()),
                ("api_key".to_string(), "wr_key".to_string()),
            ]
        );
    }

    #[test]
    fn lobby_url_encodes_display_name() {
        let connector = WebSocketConnector::new("ws://localhost:8000/", "k");
        let url = connector.lobby_url(&params()).unwrap();
        assert!(url.as_str().contains("display_name=Alice+Smith"));
    }

    #[test]
    fn lobby_url_rejects_invalid_base() {
        let connector = WebSocketConnector::new("not a url", "k");
        let err = connector.lobby_url(&params()).unwrap_err();
        assert!(matches!(err, WordRaceError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let result = WebSocketTransport::connect("ws://127.0.0.1:1").await;
        assert!(matches!(result.unwrap_err(), WordRaceError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable address to guarantee a timeout.
        let result = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            std::time::Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result.unwrap_err(), WordRaceError::Timeout));
    }

    /// Start a local WebSocket server running `handler` on the accepted
    /// connection; returns the URL to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_receives_text_frames_in_order() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":1,"status":"waiting"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":2,"player":"Bob","message":"hi"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let first = transport.recv().await.unwrap().unwrap();
        assert!(first.contains("waiting"));
        let second = transport.recv().await.unwrap().unwrap();
        assert!(second.contains("Bob"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, "after_binary");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        // Second close is idempotent.
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, WordRaceError::TransportClosed));
    }

    #[tokio::test]
    async fn send_round_trip() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"{"type":2,"message":"echo"}"#.to_string())
            .await
            .unwrap();

        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"{"type":2,"message":"echo"}"#);
    }
}
