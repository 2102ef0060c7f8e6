//! Relay channel adapter.
//!
//! Owns the WebSocket connection to the relay on a background thread:
//! `connect` never blocks the caller, inbound frames are decoded on the
//! socket thread and surfaced through `poll`, outbound events are
//! fire-and-forget commands. The adapter never reconnects on its own; a
//! failed or closed channel goes back to `Disconnected` and stays there
//! until the next `connect`.

use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tungstenite::{Message, connect};
use url::Url;

use crate::events::RoomEvent;

/// Errors from the relay channel adapter.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),
    #[error("unsupported URL scheme `{0}` (expected ws or wss)")]
    UnsupportedScheme(String),
    #[error("channel already connected")]
    AlreadyConnected,
    #[error("channel not connected")]
    NotConnected,
    #[error("event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Connection lifecycle of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// What the socket thread reports back to the dispatch thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Handshake completed; the room stream is live.
    Opened,
    /// Channel closed, whether remotely, locally or by transport failure.
    Closed,
    /// A replicated room event arrived.
    Event(RoomEvent),
    /// Connecting to or talking to the relay failed.
    Error { message: String },
}

/// The relay's two entry points.
///
/// Hosting asks the relay to allocate a fresh room; joining names an
/// existing room by code. A display name rides along as a query
/// parameter either way.
#[derive(Debug, Clone)]
pub struct RelayEndpoints {
    base: Url,
}

impl RelayEndpoints {
    /// Validate and store the relay base URL (`ws://` or `wss://`).
    pub fn new(base: &str) -> ChannelResult<Self> {
        let base = Url::parse(base).map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;
        if base.scheme() != "ws" && base.scheme() != "wss" {
            return Err(ChannelError::UnsupportedScheme(base.scheme().to_string()));
        }
        Ok(Self { base })
    }

    /// Endpoint that allocates a fresh room.
    pub fn host_url(&self, name: &str) -> Url {
        self.endpoint(&["host"], name)
    }

    /// Endpoint that joins an existing room by code.
    pub fn join_url(&self, code: &str, name: &str) -> Url {
        self.endpoint(&["join", code], name)
    }

    fn endpoint(&self, segments: &[&str], name: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        if !name.is_empty() {
            url.query_pairs_mut().append_pair("name", name);
        }
        url
    }
}

/// Commands sent to the socket thread.
enum WsCommand {
    /// Send an encoded frame.
    Send(String),
    /// Close the connection gracefully.
    Close,
}

/// Client side of the relay channel.
///
/// Events are collected on the socket thread and must be polled via
/// [`EventChannel::poll`].
pub struct EventChannel {
    state: ConnectionState,
    pending: Vec<ChannelEvent>,
    /// Channel to send commands to the socket thread.
    cmd_tx: Option<Sender<WsCommand>>,
    /// Channel to receive events from the socket thread.
    event_rx: Option<Receiver<ChannelEvent>>,
    /// Handle to the socket thread.
    _thread: Option<JoinHandle<()>>,
}

impl EventChannel {
    /// Create a new disconnected channel.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            pending: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Open the channel to `url` on a background thread.
    ///
    /// Returns immediately with the channel in `Connecting`; the outcome
    /// arrives later as an [`ChannelEvent::Opened`] or
    /// [`ChannelEvent::Error`] from `poll`.
    pub fn connect(&mut self, url: &Url) -> ChannelResult<()> {
        if self.cmd_tx.is_some() {
            return Err(ChannelError::AlreadyConnected);
        }

        self.state = ConnectionState::Connecting;

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<ChannelEvent>();

        let url = url.to_string();

        let handle = thread::spawn(move || {
            log::info!("channel thread: connecting to {}", url);

            match connect(&url) {
                Ok((mut socket, response)) => {
                    log::info!("channel connected, status: {}", response.status());
                    let _ = event_tx.send(ChannelEvent::Opened);

                    // Short read timeout on the TCP stream keeps the command
                    // queue responsive without busy-waiting.
                    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
                        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                    }

                    loop {
                        // Check for commands (non-blocking)
                        match cmd_rx.try_recv() {
                            Ok(WsCommand::Send(frame)) => {
                                log::debug!("channel sending {} bytes", frame.len());
                                if let Err(e) = socket.send(Message::Text(frame)) {
                                    log::error!("channel send error: {}", e);
                                    break;
                                }
                            }
                            Ok(WsCommand::Close) => {
                                log::info!("channel close requested");
                                let _ = socket.close(None);
                                break;
                            }
                            Err(TryRecvError::Disconnected) => {
                                log::info!("channel command side dropped");
                                break;
                            }
                            Err(TryRecvError::Empty) => {}
                        }

                        // Check for incoming frames (with timeout)
                        match socket.read() {
                            Ok(Message::Text(frame)) => match RoomEvent::decode(&frame) {
                                Ok(event) => {
                                    let _ = event_tx.send(ChannelEvent::Event(event));
                                }
                                Err(e) => {
                                    // Unknown tags and malformed payloads are
                                    // dropped; the stream itself stays up.
                                    log::warn!(
                                        "channel dropping undecodable frame ({} bytes): {}",
                                        frame.len(),
                                        e
                                    );
                                }
                            },
                            Ok(Message::Ping(data)) => {
                                let _ = socket.send(Message::Pong(data));
                            }
                            Ok(Message::Close(_)) => {
                                log::info!("channel received close frame");
                                break;
                            }
                            Ok(_) => {} // Ignore binary, pong
                            Err(tungstenite::Error::Io(ref e))
                                if e.kind() == std::io::ErrorKind::WouldBlock
                                    || e.kind() == std::io::ErrorKind::TimedOut =>
                            {
                                continue;
                            }
                            Err(e) => {
                                log::error!("channel read error: {}", e);
                                break;
                            }
                        }
                    }

                    log::info!("channel thread exiting");
                    let _ = event_tx.send(ChannelEvent::Closed);
                }
                Err(e) => {
                    log::error!("channel connection failed: {}", e);
                    let _ = event_tx.send(ChannelEvent::Error {
                        message: format!("connection failed: {}", e),
                    });
                }
            }
        });

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);

        Ok(())
    }

    /// Ask the socket thread to close the connection.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Serialize and queue one event for the relay; fire-and-forget.
    pub fn send(&self, event: &RoomEvent) -> ChannelResult<()> {
        self.send_frame(event.encode()?)
    }

    /// Queue an already-encoded frame for the relay.
    pub fn send_frame(&self, frame: String) -> ChannelResult<()> {
        match &self.cmd_tx {
            Some(tx) => tx
                .send(WsCommand::Send(frame))
                .map_err(|_| ChannelError::NotConnected),
            None => Err(ChannelError::NotConnected),
        }
    }

    /// Poll for pending channel events (non-blocking).
    ///
    /// Tracks the connection lifecycle as a side effect: `Opened` moves the
    /// adapter to `Connected`; `Closed` and `Error` tear the channel down,
    /// which makes the adapter eligible for a fresh `connect`.
    pub fn poll(&mut self) -> Vec<ChannelEvent> {
        if let Some(rx) = &self.event_rx {
            while let Ok(event) = rx.try_recv() {
                self.pending.push(event);
            }
        }

        let events = std::mem::take(&mut self.pending);
        for event in &events {
            match event {
                ChannelEvent::Opened => self.state = ConnectionState::Connected,
                ChannelEvent::Closed | ChannelEvent::Error { .. } => self.teardown(),
                ChannelEvent::Event(_) => {}
            }
        }
        events
    }

    /// Drop the thread handles; the socket thread exits on its own once the
    /// command side is gone.
    fn teardown(&mut self) {
        self.cmd_tx = None;
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_build_host_and_join_urls() {
        let endpoints = RelayEndpoints::new("ws://localhost:3030").unwrap();

        assert_eq!(
            endpoints.host_url("ada").as_str(),
            "ws://localhost:3030/host?name=ada"
        );
        assert_eq!(
            endpoints.join_url("ABCD", "grace").as_str(),
            "ws://localhost:3030/join/ABCD?name=grace"
        );
    }

    #[test]
    fn test_endpoints_without_name() {
        let endpoints = RelayEndpoints::new("wss://relay.example.com").unwrap();
        assert_eq!(
            endpoints.host_url("").as_str(),
            "wss://relay.example.com/host"
        );
    }

    #[test]
    fn test_endpoints_encode_query_name() {
        let endpoints = RelayEndpoints::new("ws://localhost:3030").unwrap();
        assert_eq!(
            endpoints.join_url("ABCD", "ada lovelace").as_str(),
            "ws://localhost:3030/join/ABCD?name=ada+lovelace"
        );
    }

    #[test]
    fn test_endpoints_reject_http_scheme() {
        assert!(matches!(
            RelayEndpoints::new("http://localhost:3030"),
            Err(ChannelError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            RelayEndpoints::new("not a url"),
            Err(ChannelError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_send_requires_connection() {
        let channel = EventChannel::new();
        assert!(matches!(
            channel.send(&RoomEvent::UndoStroke),
            Err(ChannelError::NotConnected)
        ));
    }

    #[test]
    fn test_connect_is_nonblocking_and_exclusive() {
        let mut channel = EventChannel::new();
        assert_eq!(channel.state(), ConnectionState::Disconnected);

        // Nothing listens on this port; the failure surfaces later via poll.
        let url = Url::parse("ws://127.0.0.1:9/").unwrap();
        channel.connect(&url).unwrap();
        assert_eq!(channel.state(), ConnectionState::Connecting);

        assert!(matches!(
            channel.connect(&url),
            Err(ChannelError::AlreadyConnected)
        ));
    }

    #[test]
    fn test_failed_connect_reports_error_and_resets() {
        let mut channel = EventChannel::new();
        let url = Url::parse("ws://127.0.0.1:9/").unwrap();
        channel.connect(&url).unwrap();

        // The refused connection surfaces as an Error event, after which the
        // adapter is eligible for a fresh connect.
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let mut saw_error = false;
        while std::time::Instant::now() < deadline {
            for event in channel.poll() {
                if matches!(event, ChannelEvent::Error { .. }) {
                    saw_error = true;
                }
            }
            if saw_error {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        assert!(saw_error);
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert!(channel.connect(&url).is_ok());
    }
}
