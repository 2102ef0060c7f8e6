//! Doodleroom Core Library
//!
//! Deterministic room-state replication for a shared freehand canvas: the
//! stroke model, the room event reducer, and the relay channel adapter.

pub mod channel;
pub mod client;
pub mod events;
pub mod input;
pub mod repaint;
pub mod room;
pub mod session;
pub mod stroke;
pub mod tools;

pub use channel::{ChannelError, ChannelEvent, ConnectionState, EventChannel, RelayEndpoints};
pub use client::RoomClient;
pub use events::{GameOptions, RoomEvent, StatePatch};
pub use input::{CANVAS_SCALE, InputTracker, PointerButton};
pub use repaint::{Repaint, RepaintTracker};
pub use room::{GameState, Player, Role, RoomState, RoomStatus, RoomStore};
pub use session::{Notice, RoomSession, room_code_from_url};
pub use stroke::{Point, Stroke};
pub use tools::{Tool, ToolAction, ToolSettings};
