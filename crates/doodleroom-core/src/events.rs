//! Replicated room events and their wire encoding.
//!
//! Every frame on the relay channel is one JSON-encoded [`RoomEvent`]:
//! `{"type": "<TAG>", "payload": ...}`, with the payload omitted for unit
//! variants. The same type is both the wire format and the reducer input,
//! so a peer's frame and a local action are indistinguishable by the time
//! they reach the state.

use serde::{Deserialize, Serialize};

use crate::room::{GameState, Player, Role, RoomStatus};
use crate::stroke::{Point, Stroke};

/// Options announced by the host when starting a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOptions {
    pub rounds: u32,
    pub time_limit: u32,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            rounds: 5,
            time_limit: 60,
        }
    }
}

/// Partial room state delivered by the relay.
///
/// Fields that are present replace the receiver's value wholesale; absent
/// fields keep their current value. The merge is shallow on purpose: the
/// relay always sends complete values for the fields it wants to change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<Player>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RoomStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<GameState>,
}

impl StatePatch {
    /// Patch carrying only a status change.
    pub fn status(status: RoomStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch carrying only a roster change.
    pub fn roster(players: Vec<Player>) -> Self {
        Self {
            players: Some(players),
            ..Self::default()
        }
    }
}

/// The unit of state mutation and replication.
///
/// `StrokePoint` deliberately carries a bare point: the high-frequency
/// drawing path never re-sends stroke metadata, the point always extends
/// the most recently created stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEvent {
    /// Begin a stroke with fixed color, width and first point.
    NewStroke(Stroke),
    /// Extend the most recent stroke by one point.
    StrokePoint(Point),
    /// Host requests the game to start.
    StartGame(GameOptions),
    /// Relay-authored snapshot or partial update.
    InitialState(StatePatch),
    /// Reset the whole room to its defaults.
    ClearState,
    /// Wipe the canvas, keep the room.
    ClearStrokes,
    /// Remove the most recent stroke.
    UndoStroke,
}

impl RoomEvent {
    /// Wire tag of this event, for logs; payloads can be large.
    pub fn tag(&self) -> &'static str {
        match self {
            RoomEvent::NewStroke(_) => "NEW_STROKE",
            RoomEvent::StrokePoint(_) => "STROKE_POINT",
            RoomEvent::StartGame(_) => "START_GAME",
            RoomEvent::InitialState(_) => "INITIAL_STATE",
            RoomEvent::ClearState => "CLEAR_STATE",
            RoomEvent::ClearStrokes => "CLEAR_STROKES",
            RoomEvent::UndoStroke => "UNDO_STROKE",
        }
    }

    /// Serialize for the relay channel.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a relay frame. Unknown tags and malformed payloads are errors;
    /// callers drop the frame and keep the stream alive.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}
