//! Doodleroom relay server.
//!
//! Fans drawing events out to every participant of a room except their
//! author, and keeps the room's authoritative state by folding the same
//! events through the same reducer the clients run.
//!
//! ## Protocol
//!
//! Connect to `ws://host:port/host` to open a fresh room (the relay
//! allocates the code) or `ws://host:port/join/{code}` for an existing one;
//! a display name rides along as `?name=`. Every frame is one JSON room
//! event, `{"type": "NEW_STROKE", "payload": {...}}` and friends. The first
//! frame the relay sends is a personalized `INITIAL_STATE` snapshot:
//! assigned role, room code, roster, status and the strokes drawn so far.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::{DashMap, mapref::entry::Entry};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use doodleroom_core::events::{RoomEvent, StatePatch};
use doodleroom_core::room::{Player, Role, RoomState, RoomStatus, RoomStore};

const DEFAULT_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3030);
const CHANNEL_CAPACITY: usize = 256;

/// Room codes: four letters, skipping the digit lookalikes I and O.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const CODE_LEN: usize = 4;

/// Author id used for frames the relay itself originates. Peer ids are
/// always random v4 UUIDs, so the nil id is never filtered out by the
/// author check and relay frames reach everyone.
const RELAY_AUTHOR: Uuid = Uuid::nil();

/// One live room.
struct Room {
    /// Broadcast channel for this room; payloads carry their author.
    tx: broadcast::Sender<(Uuid, RoomEvent)>,
    /// Authoritative room state, maintained through the client reducer.
    store: RoomStore,
}

impl Room {
    fn new(code: &str) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let mut store = RoomStore::new();
        store.dispatch(&RoomEvent::InitialState(StatePatch {
            code: Some(code.to_string()),
            ..StatePatch::default()
        }));
        Self { tx, store }
    }
}

/// Shared application state.
struct AppState {
    /// Active rooms by code.
    rooms: DashMap<String, Room>,
}

impl AppState {
    fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Allocate an unused code and open its room with `host` enrolled.
    fn host_room(
        &self,
        host: Player,
    ) -> (String, broadcast::Receiver<(Uuid, RoomEvent)>, StatePatch) {
        loop {
            let code = generate_code();
            match self.rooms.entry(code.clone()) {
                // Collision with a live room, roll again.
                Entry::Occupied(_) => continue,
                Entry::Vacant(vacant) => {
                    let mut room = Room::new(&code);
                    room.store
                        .dispatch(&RoomEvent::InitialState(StatePatch::roster(vec![
                            host.clone(),
                        ])));
                    let rx = room.tx.subscribe();
                    let snapshot = snapshot_of(room.store.state(), Role::Host);
                    vacant.insert(room);
                    return (code, rx, snapshot);
                }
            }
        }
    }

    /// Enroll a guest into an existing room; `None` when the code names no
    /// live room.
    fn join_room(
        &self,
        code: &str,
        guest: Player,
    ) -> Option<(broadcast::Receiver<(Uuid, RoomEvent)>, StatePatch)> {
        let mut room = self.rooms.get_mut(code)?;
        let guest_id = guest.id;

        let mut players = room.store.state().players.clone();
        players.push(guest);
        room.store
            .dispatch(&RoomEvent::InitialState(StatePatch::roster(players.clone())));

        let rx = room.tx.subscribe();
        let snapshot = snapshot_of(room.store.state(), Role::Guest);

        // The sitting participants learn the new roster; the joiner's own
        // snapshot already carries it, and the author check keeps this
        // frame from coming back to them.
        let _ = room
            .tx
            .send((guest_id, RoomEvent::InitialState(StatePatch::roster(players))));

        Some((rx, snapshot))
    }

    /// Drop a participant from the roster; the last one out closes the room.
    fn leave_room(&self, code: &str, peer_id: Uuid) {
        let mut empty = false;
        if let Some(mut room) = self.rooms.get_mut(code) {
            let mut players = room.store.state().players.clone();
            players.retain(|p| p.id != peer_id);

            if players.is_empty() {
                empty = true;
            } else {
                room.store
                    .dispatch(&RoomEvent::InitialState(StatePatch::roster(players.clone())));
                let _ = room
                    .tx
                    .send((peer_id, RoomEvent::InitialState(StatePatch::roster(players))));
            }
        }
        if empty {
            self.rooms.remove(code);
            info!("room {} closed", code);
        }
    }

    /// Fold a client frame into the room and fan it out.
    fn apply_event(&self, code: &str, author: Uuid, event: RoomEvent) {
        let Some(mut room) = self.rooms.get_mut(code) else {
            return;
        };

        match &event {
            // Only the relay may author these; a client injecting them
            // could hijack roles or wipe rooms it does not own.
            RoomEvent::InitialState(_) | RoomEvent::ClearState => {
                warn!("dropping relay-authoritative {} from {}", event.tag(), author);
            }
            RoomEvent::StartGame(options) => {
                info!(
                    "room {}: game started ({} rounds, {}s each)",
                    code, options.rounds, options.time_limit
                );
                let _ = room.tx.send((author, event.clone()));

                // The status change is relay-driven state: it goes out as a
                // patch addressed to everyone, the author included.
                let patch = StatePatch::status(RoomStatus::InProgress);
                room.store.dispatch(&RoomEvent::InitialState(patch.clone()));
                let _ = room.tx.send((RELAY_AUTHOR, RoomEvent::InitialState(patch)));
            }
            _ => {
                room.store.dispatch(&event);
                let _ = room.tx.send((author, event));
            }
        }
    }

    /// Fresh personalized snapshot of a live room.
    fn snapshot_for(&self, code: &str, role: Role) -> Option<StatePatch> {
        let room = self.rooms.get(code)?;
        Some(snapshot_of(room.store.state(), role))
    }
}

/// Full personalized snapshot: everything a participant needs to replace
/// their local state with the room's.
fn snapshot_of(state: &RoomState, role: Role) -> StatePatch {
    StatePatch {
        role: Some(role),
        code: Some(state.code.clone()),
        players: Some(state.players.clone()),
        status: Some(state.status),
        game: Some(state.game.clone()),
    }
}

/// Four letters of UUID entropy.
fn generate_code() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(CODE_LEN)
        .map(|b| CODE_ALPHABET[*b as usize % CODE_ALPHABET.len()] as char)
        .collect()
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doodleroom_relay=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/host", get(host_handler))
        .route("/join/{code}", get(join_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::env::var("DOODLEROOM_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(DEFAULT_ADDR));

    info!("doodleroom relay listening on {}", addr);
    info!("host a room at ws://{}/host, join at ws://{}/join/{{code}}", addr, addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Index page
async fn index() -> &'static str {
    "doodleroom relay - host via WebSocket at /host, join at /join/{code}"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct EntryParams {
    name: Option<String>,
}

/// Upgrade handler for hosting a fresh room.
async fn host_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<EntryParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, None, params.name))
}

/// Upgrade handler for joining an existing room by code.
async fn join_handler(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    Query(params): Query<EntryParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Some(code), params.name))
}

/// Drive one participant's connection for its whole lifetime.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    join_code: Option<String>,
    name: Option<String>,
) {
    let peer_id = Uuid::new_v4();
    let name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "anonymous".to_string());
    let player = Player::new(peer_id, name);

    let (mut sender, mut receiver) = socket.split();

    let (code, mut room_rx, snapshot, role) = match join_code {
        None => {
            let (code, rx, snapshot) = state.host_room(player);
            (code, rx, snapshot, Role::Host)
        }
        Some(code) => {
            let code = code.to_uppercase();
            match state.join_room(&code, player) {
                Some((rx, snapshot)) => (code, rx, snapshot, Role::Guest),
                None => {
                    warn!("{} tried to join unknown room {}", peer_id, code);
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::POLICY,
                            reason: "unknown room".into(),
                        })))
                        .await;
                    return;
                }
            }
        }
    };

    info!("{} entered room {} as {:?}", peer_id, code, role);

    // The first frame a participant ever sees is their snapshot.
    let hello = serde_json::to_string(&RoomEvent::InitialState(snapshot)).unwrap();
    if sender.send(Message::Text(hello.into())).await.is_err() {
        state.leave_room(&code, peer_id);
        return;
    }

    loop {
        tokio::select! {
            // Frames from this participant
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match RoomEvent::decode(&text) {
                            Ok(event) => state.apply_event(&code, peer_id, event),
                            Err(e) => warn!("undecodable frame from {}: {}", peer_id, e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary, ping/pong
                    Some(Err(e)) => {
                        warn!("socket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            // Frames from the rest of the room
            result = room_rx.recv() => {
                match result {
                    Ok((author, event)) => {
                        // Never echo a frame back to its author.
                        if author == peer_id {
                            continue;
                        }
                        let frame = serde_json::to_string(&event).unwrap();
                        if sender.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // A fresh snapshot heals whatever the lag skipped.
                        warn!("{} lagged {} frames in room {}, resyncing", peer_id, skipped, code);
                        if let Some(patch) = state.snapshot_for(&code, role) {
                            let frame =
                                serde_json::to_string(&RoomEvent::InitialState(patch)).unwrap();
                            if sender.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    state.leave_room(&code, peer_id);
    info!("{} left room {}", peer_id, code);
}
