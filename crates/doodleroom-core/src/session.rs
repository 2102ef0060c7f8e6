//! Room session: optimistic local dispatch plus relay replication.
//!
//! Locally-originated events are applied to the store first and then queued
//! for the relay, so the author's canvas never waits on the network. Events
//! arriving from the relay are applied only; the relay never echoes a frame
//! back to its author, so nothing is applied twice. Events dispatched before
//! the room snapshot lands are staged and replayed on top of it, so a stroke
//! drawn during the handshake survives the snapshot merge.

use url::Url;

use crate::channel::ChannelEvent;
use crate::events::RoomEvent;
use crate::repaint::{Repaint, RepaintTracker};
use crate::room::{RoomState, RoomStore};

/// User-facing connection notices.
///
/// The session never retries on its own; these tell the presentation layer
/// what happened so it can say so.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Handshake completed; the room stream is live.
    Connected,
    /// The channel went away and the room state has been reset.
    Disconnected,
    /// Could not reach, or keep talking to, the relay.
    ConnectFailed(String),
}

/// One participant's view of a room.
#[derive(Debug, Default)]
pub struct RoomSession {
    store: RoomStore,
    /// Encoded frames waiting to go out over the channel.
    outgoing: Vec<String>,
    /// Events dispatched before the room snapshot arrived.
    staged: Vec<RoomEvent>,
    /// Whether the relay's snapshot has been applied yet.
    synced: bool,
    /// Damage from dispatched events, local and remote alike.
    repaint: RepaintTracker,
}

impl RoomSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RoomState {
        self.store.state()
    }

    pub fn revision(&self) -> u64 {
        self.store.revision()
    }

    /// Dispatch a locally-originated event: apply it to the store, then
    /// queue the encoded frame for the relay. Apply-before-send keeps the
    /// local canvas ahead of the network.
    ///
    /// Until the room snapshot has been applied, events are staged instead
    /// of queued: the snapshot would erase them locally while the relay
    /// kept them. They are replayed on top of it and released together.
    pub fn dispatch(&mut self, event: &RoomEvent) {
        let changed = self.store.dispatch(event);
        self.repaint.note(event, changed);
        if !self.synced {
            self.staged.push(event.clone());
            return;
        }
        match event.encode() {
            Ok(frame) => self.outgoing.push(frame),
            Err(e) => log::error!("dropping unencodable event: {}", e),
        }
    }

    /// Apply a relay-originated channel event.
    ///
    /// Returns a [`Notice`] when the presentation layer should tell the
    /// user something.
    pub fn handle_channel_event(&mut self, event: ChannelEvent) -> Option<Notice> {
        match event {
            ChannelEvent::Opened => Some(Notice::Connected),
            ChannelEvent::Event(event) => {
                let changed = self.store.dispatch(&event);
                self.repaint.note(&event, changed);
                if !self.synced && matches!(event, RoomEvent::InitialState(_)) {
                    self.synced = true;
                    self.release_staged();
                }
                None
            }
            ChannelEvent::Closed => {
                // Whatever was still queued or staged has nowhere to go, and
                // a frame held over into some future room would be wrong
                // anyway.
                self.outgoing.clear();
                self.staged.clear();
                self.synced = false;
                let changed = self.store.dispatch(&RoomEvent::ClearState);
                self.repaint.note(&RoomEvent::ClearState, changed);
                Some(Notice::Disconnected)
            }
            ChannelEvent::Error { message } => Some(Notice::ConnectFailed(message)),
        }
    }

    /// Replay staged events on top of the freshly applied snapshot and
    /// queue them for the relay. Nothing of ours has been sent yet, so the
    /// snapshot cannot already contain a staged event.
    fn release_staged(&mut self) {
        for event in std::mem::take(&mut self.staged) {
            self.dispatch(&event);
        }
    }

    /// Take the damage accumulated since the last call; the render layer
    /// calls this once per frame.
    pub fn take_repaint(&mut self) -> Repaint {
        self.repaint.take()
    }

    /// Force the next frame to redraw everything (viewport resize, raster
    /// loss).
    pub fn invalidate_repaint(&mut self) {
        self.repaint.invalidate()
    }

    /// Take all queued outbound frames, leaving the queue empty.
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are outbound frames waiting.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Shareable invite link: `page` with `room=<code>` set.
    ///
    /// `None` until the relay has assigned a code.
    pub fn invite_link(&self, page: &Url) -> Option<Url> {
        let code = &self.store.state().code;
        if code.is_empty() {
            return None;
        }
        Some(with_room_param(page, code))
    }
}

/// Extract the room code from a shared link (`?room=<code>`).
///
/// This is the join-versus-host decision: a present code means join that
/// room, an absent one means host a fresh room.
pub fn room_code_from_url(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "room")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Return `url` with `room=<code>` set, replacing any previous value.
pub fn with_room_param(url: &Url, code: &str) -> Url {
    let mut out = strip_room_param(url);
    out.query_pairs_mut().append_pair("room", code);
    out
}

/// Return `url` without its `room` parameter.
///
/// The inverse of [`with_room_param`]: an embedding shell calls this when
/// the channel closes, so a dead room's code is not rejoined on the next
/// load.
pub fn strip_room_param(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "room")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut out = url.clone();
    out.set_query(None);
    if !kept.is_empty() {
        let mut pairs = out.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StatePatch;
    use crate::room::{GameState, RoomStatus};
    use crate::stroke::{Point, Stroke};

    /// A session that has already applied its room snapshot.
    fn synced_session() -> RoomSession {
        let mut session = RoomSession::new();
        session.handle_channel_event(ChannelEvent::Event(RoomEvent::InitialState(
            StatePatch::default(),
        )));
        session
    }

    #[test]
    fn test_local_dispatch_applies_then_queues() {
        let mut session = synced_session();
        let event = RoomEvent::NewStroke(Stroke::new("#000000", 8.0, Point::new(0.0, 0.0)));

        session.dispatch(&event);

        // Applied locally before any network round trip.
        assert_eq!(session.state().game.strokes.len(), 1);

        // And queued verbatim for the relay.
        let frames = session.take_outgoing();
        assert_eq!(frames.len(), 1);
        assert_eq!(RoomEvent::decode(&frames[0]).unwrap(), event);
        assert!(!session.has_outgoing());
    }

    #[test]
    fn test_noop_events_are_still_sent() {
        let mut session = synced_session();
        let revision = session.revision();

        // StartGame never changes local state but must reach the relay.
        session.dispatch(&RoomEvent::StartGame(Default::default()));
        assert_eq!(session.revision(), revision);
        assert_eq!(session.take_outgoing().len(), 1);
    }

    #[test]
    fn test_events_before_snapshot_are_staged_and_replayed() {
        let mut session = RoomSession::new();
        let drawn = RoomEvent::NewStroke(Stroke::new("#000000", 8.0, Point::new(0.0, 0.0)));

        // Drawn while the handshake is still in flight: visible at once,
        // but nothing goes out yet.
        session.dispatch(&drawn);
        assert_eq!(session.state().game.strokes.len(), 1);
        assert!(!session.has_outgoing());

        // The snapshot carries the pre-join canvas; the staged stroke is
        // replayed on top of it instead of being erased by the merge.
        session.handle_channel_event(ChannelEvent::Event(RoomEvent::InitialState(StatePatch {
            code: Some("ABCD".to_string()),
            game: Some(GameState {
                strokes: vec![Stroke::new("#ff0000", 4.0, Point::new(9.0, 9.0))],
            }),
            ..StatePatch::default()
        })));
        assert_eq!(session.state().game.strokes.len(), 2);
        assert_eq!(session.state().game.strokes[0].color, "#ff0000");
        assert_eq!(session.state().game.strokes[1].color, "#000000");

        // And only now released to the relay.
        let frames = session.take_outgoing();
        assert_eq!(frames.len(), 1);
        assert_eq!(RoomEvent::decode(&frames[0]).unwrap(), drawn);
    }

    #[test]
    fn test_close_discards_staged_events() {
        let mut session = RoomSession::new();

        session.dispatch(&RoomEvent::NewStroke(Stroke::new(
            "#000000",
            8.0,
            Point::new(0.0, 0.0),
        )));
        session.handle_channel_event(ChannelEvent::Closed);

        // A later session's snapshot must not inherit the dead room's
        // staged events.
        session.handle_channel_event(ChannelEvent::Event(RoomEvent::InitialState(
            StatePatch::default(),
        )));
        assert!(!session.has_outgoing());
        assert!(session.state().game.strokes.is_empty());
    }

    #[test]
    fn test_remote_events_are_not_requeued() {
        let mut session = RoomSession::new();
        let event = RoomEvent::NewStroke(Stroke::new("#000000", 8.0, Point::new(0.0, 0.0)));

        let notice = session.handle_channel_event(ChannelEvent::Event(event));
        assert_eq!(notice, None);
        assert_eq!(session.state().game.strokes.len(), 1);
        assert!(!session.has_outgoing());
    }

    #[test]
    fn test_open_and_error_notices() {
        let mut session = RoomSession::new();

        assert_eq!(
            session.handle_channel_event(ChannelEvent::Opened),
            Some(Notice::Connected)
        );
        assert_eq!(
            session.handle_channel_event(ChannelEvent::Error {
                message: "connection refused".to_string()
            }),
            Some(Notice::ConnectFailed("connection refused".to_string()))
        );
    }

    #[test]
    fn test_close_resets_state_and_queue() {
        let mut session = RoomSession::new();

        session.handle_channel_event(ChannelEvent::Event(RoomEvent::InitialState(StatePatch {
            code: Some("ABCD".to_string()),
            status: Some(RoomStatus::InProgress),
            ..StatePatch::default()
        })));
        session.dispatch(&RoomEvent::NewStroke(Stroke::new(
            "#000000",
            8.0,
            Point::new(0.0, 0.0),
        )));
        assert!(session.has_outgoing());

        let notice = session.handle_channel_event(ChannelEvent::Closed);
        assert_eq!(notice, Some(Notice::Disconnected));
        assert_eq!(*session.state(), crate::room::RoomState::default());
        assert!(!session.has_outgoing());
    }

    #[test]
    fn test_repaint_tracks_both_directions() {
        let mut session = RoomSession::new();
        assert_eq!(session.take_repaint(), Repaint::Everything);

        // Local append damage stays incremental.
        session.dispatch(&RoomEvent::NewStroke(Stroke::new(
            "#000000",
            8.0,
            Point::new(0.0, 0.0),
        )));
        session.dispatch(&RoomEvent::StrokePoint(Point::new(1.0, 1.0)));
        assert_eq!(session.take_repaint(), Repaint::LastStroke);

        // A remote point extends the same tail stroke.
        session.handle_channel_event(ChannelEvent::Event(RoomEvent::StrokePoint(Point::new(
            2.0, 2.0,
        ))));
        assert_eq!(session.take_repaint(), Repaint::LastStroke);

        // A remote undo means the raster can no longer be trusted.
        session.handle_channel_event(ChannelEvent::Event(RoomEvent::UndoStroke));
        assert_eq!(session.take_repaint(), Repaint::Everything);

        // No-op dispatches leave no damage behind.
        session.handle_channel_event(ChannelEvent::Event(RoomEvent::UndoStroke));
        assert_eq!(session.take_repaint(), Repaint::None);
    }

    #[test]
    fn test_invite_link_follows_room_code() {
        let mut session = RoomSession::new();
        let page = Url::parse("https://doodle.example/play?tab=canvas").unwrap();

        assert_eq!(session.invite_link(&page), None);

        session.handle_channel_event(ChannelEvent::Event(RoomEvent::InitialState(StatePatch {
            code: Some("WXYZ".to_string()),
            ..StatePatch::default()
        })));

        let link = session.invite_link(&page).unwrap();
        assert_eq!(
            link.as_str(),
            "https://doodle.example/play?tab=canvas&room=WXYZ"
        );

        session.handle_channel_event(ChannelEvent::Closed);
        assert_eq!(session.invite_link(&page), None);
    }

    #[test]
    fn test_invite_link_replaces_stale_code() {
        let mut session = RoomSession::new();
        session.handle_channel_event(ChannelEvent::Event(RoomEvent::InitialState(StatePatch {
            code: Some("WXYZ".to_string()),
            ..StatePatch::default()
        })));

        // The page may still carry the previous visit's code.
        let stale = Url::parse("https://doodle.example/play?room=OLD1").unwrap();
        assert_eq!(
            session.invite_link(&stale).unwrap().as_str(),
            "https://doodle.example/play?room=WXYZ"
        );
    }

    #[test]
    fn test_room_code_from_url() {
        let url = Url::parse("https://doodle.example/play?room=ABCD").unwrap();
        assert_eq!(room_code_from_url(&url), Some("ABCD".to_string()));

        let no_room = Url::parse("https://doodle.example/play").unwrap();
        assert_eq!(room_code_from_url(&no_room), None);

        let empty = Url::parse("https://doodle.example/play?room=").unwrap();
        assert_eq!(room_code_from_url(&empty), None);
    }

    #[test]
    fn test_with_room_param_replaces_existing() {
        let url = Url::parse("https://doodle.example/play?room=OLD1&tab=canvas").unwrap();
        let updated = with_room_param(&url, "NEW2");
        assert_eq!(
            updated.as_str(),
            "https://doodle.example/play?tab=canvas&room=NEW2"
        );
    }

    #[test]
    fn test_strip_room_param_keeps_others() {
        let url = Url::parse("https://doodle.example/play?room=ABCD&tab=canvas").unwrap();
        assert_eq!(
            strip_room_param(&url).as_str(),
            "https://doodle.example/play?tab=canvas"
        );

        let only_room = Url::parse("https://doodle.example/play?room=ABCD").unwrap();
        assert_eq!(
            strip_room_param(&only_room).as_str(),
            "https://doodle.example/play"
        );
    }
}
