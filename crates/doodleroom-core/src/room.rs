//! Room state and the deterministic event reducer.
//!
//! All mutation flows through [`RoomState::reduce`]: one event in, next
//! state out, no hidden inputs. Replicas that fold the same event sequence
//! land on equal states, which is the entire consistency story of the
//! protocol.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{RoomEvent, StatePatch};
use crate::stroke::Stroke;

/// This participant's relationship to the room, assigned by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

/// Coarse room lifecycle, driven by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    #[default]
    Waiting,
    InProgress,
    Finished,
}

/// A participant as reported by the relay roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
}

impl Player {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// The drawing surface portion of the room: stroke history in z-order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub strokes: Vec<Stroke>,
}

/// Shared room state, replicated to every participant.
///
/// [`RoomState::default`] is the canonical empty room: no role, no code,
/// no players, `WAITING`, empty canvas. Leaving a room always returns to
/// exactly this value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomState {
    pub role: Option<Role>,
    pub code: String,
    pub players: Vec<Player>,
    pub status: RoomStatus,
    pub game: GameState,
}

impl RoomState {
    /// Apply one event, returning the next state.
    ///
    /// Pure: `self` is never mutated and no clocks, randomness or I/O are
    /// consulted. `Cow::Borrowed` is returned for the no-op arms (a stroke
    /// point or undo with no stroke history, an empty wire stroke, and
    /// `StartGame`, which only the relay acts on); consumers may use it to
    /// skip change propagation. `ClearState` and `ClearStrokes` always
    /// build a fresh state.
    pub fn reduce(&self, event: &RoomEvent) -> Cow<'_, RoomState> {
        match event {
            RoomEvent::NewStroke(stroke) => {
                if stroke.is_empty() {
                    // A pointless stroke can only arrive off the wire;
                    // absorbing it keeps later StrokePoint appends sound.
                    return Cow::Borrowed(self);
                }
                let mut next = self.clone();
                next.game.strokes.push(stroke.clone());
                Cow::Owned(next)
            }
            RoomEvent::StrokePoint(point) => {
                if self.game.strokes.is_empty() {
                    // Point frame raced ahead of its stroke (or outlived a
                    // clear); there is nothing to extend.
                    return Cow::Borrowed(self);
                }
                let mut next = self.clone();
                if let Some(last) = next.game.strokes.last_mut() {
                    last.append(*point);
                }
                Cow::Owned(next)
            }
            RoomEvent::StartGame(_) => Cow::Borrowed(self),
            RoomEvent::InitialState(patch) => Cow::Owned(self.merged(patch)),
            RoomEvent::ClearState => Cow::Owned(RoomState::default()),
            RoomEvent::ClearStrokes => {
                let mut next = self.clone();
                next.game.strokes.clear();
                Cow::Owned(next)
            }
            RoomEvent::UndoStroke => {
                if self.game.strokes.is_empty() {
                    return Cow::Borrowed(self);
                }
                let mut next = self.clone();
                next.game.strokes.pop();
                Cow::Owned(next)
            }
        }
    }

    /// Shallow merge: fields present in the patch win wholesale, absent
    /// fields keep their current value.
    fn merged(&self, patch: &StatePatch) -> RoomState {
        let mut next = self.clone();
        if let Some(role) = patch.role {
            next.role = Some(role);
        }
        if let Some(code) = &patch.code {
            next.code = code.clone();
        }
        if let Some(players) = &patch.players {
            next.players = players.clone();
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(game) = &patch.game {
            next.game = game.clone();
        }
        next
    }
}

/// Owns the committed room state for one replica.
///
/// There is exactly one store per participant and one writer thread by
/// construction. The revision counter moves only when a dispatch actually
/// changed the state, so render layers can compare revisions instead of
/// diffing states.
#[derive(Debug, Clone, Default)]
pub struct RoomStore {
    state: RoomState,
    revision: u64,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce one event into the committed state.
    ///
    /// Returns whether the state changed.
    pub fn dispatch(&mut self, event: &RoomEvent) -> bool {
        let next = match self.state.reduce(event) {
            Cow::Borrowed(_) => return false,
            Cow::Owned(next) => next,
        };
        self.state = next;
        self.revision += 1;
        true
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}
