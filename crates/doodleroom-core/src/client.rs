//! Room client: explicit composition of session, channel and endpoints.
//!
//! Everything the client touches is a plain owned field handed over at
//! construction; there is no ambient registry to reach into, so tests can
//! drive a [`crate::session::RoomSession`] or [`crate::channel::EventChannel`]
//! on their own.

use url::Url;

use crate::channel::{ChannelEvent, ChannelResult, ConnectionState, EventChannel, RelayEndpoints};
use crate::events::RoomEvent;
use crate::repaint::Repaint;
use crate::room::RoomState;
use crate::session::{Notice, RoomSession, room_code_from_url};

/// One participant's connection to a room.
///
/// Drive it from a single thread: `dispatch` for local actions, `poll` once
/// per tick for everything the relay sent back.
pub struct RoomClient {
    endpoints: RelayEndpoints,
    channel: EventChannel,
    session: RoomSession,
}

impl RoomClient {
    pub fn new(endpoints: RelayEndpoints) -> Self {
        Self {
            endpoints,
            channel: EventChannel::new(),
            session: RoomSession::new(),
        }
    }

    /// Host a fresh room; the relay allocates the code.
    pub fn host(&mut self, name: &str) -> ChannelResult<()> {
        let url = self.endpoints.host_url(name);
        self.channel.connect(&url)
    }

    /// Join an existing room by code.
    pub fn join(&mut self, code: &str, name: &str) -> ChannelResult<()> {
        let url = self.endpoints.join_url(code, name);
        self.channel.connect(&url)
    }

    /// Join when the page URL carries a room code, host otherwise.
    pub fn enter(&mut self, page: &Url, name: &str) -> ChannelResult<()> {
        match room_code_from_url(page) {
            Some(code) => self.join(&code, name),
            None => self.host(name),
        }
    }

    /// Dispatch a locally-originated event: optimistic apply, then send.
    pub fn dispatch(&mut self, event: &RoomEvent) {
        self.session.dispatch(event);
        self.flush();
    }

    /// Pump the channel once: apply inbound events, flush outbound frames,
    /// collect user-facing notices.
    pub fn poll(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        for event in self.channel.poll() {
            if let Some(notice) = self.session.handle_channel_event(event) {
                notices.push(notice);
            }
        }
        self.flush();
        notices
    }

    /// Close the channel and reset the room to its canonical default.
    ///
    /// The reset happens here rather than on a later `poll`: disconnecting
    /// drops the event side of the channel, so the socket thread's close
    /// event has no way back. A self-initiated close also needs no notice.
    pub fn leave(&mut self) {
        self.channel.disconnect();
        let _ = self.session.handle_channel_event(ChannelEvent::Closed);
    }

    pub fn state(&self) -> &RoomState {
        self.session.state()
    }

    pub fn revision(&self) -> u64 {
        self.session.revision()
    }

    pub fn connection(&self) -> ConnectionState {
        self.channel.state()
    }

    /// Take the repaint damage accumulated since the last frame.
    pub fn take_repaint(&mut self) -> Repaint {
        self.session.take_repaint()
    }

    /// Shareable invite link for the current room, if any.
    pub fn invite_link(&self, page: &Url) -> Option<Url> {
        self.session.invite_link(page)
    }

    fn flush(&mut self) {
        match self.channel.state() {
            // Fire-and-forget: with no channel there is nobody to deliver
            // to, and holding frames for a future room would replay stale
            // history into it.
            ConnectionState::Disconnected => {
                let dropped = self.session.take_outgoing();
                if !dropped.is_empty() {
                    log::debug!("dropping {} undeliverable frame(s)", dropped.len());
                }
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                for frame in self.session.take_outgoing() {
                    if let Err(e) = self.channel.send_frame(frame) {
                        log::warn!("relay send failed: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{Point, Stroke};

    fn client() -> RoomClient {
        RoomClient::new(RelayEndpoints::new("ws://127.0.0.1:9").unwrap())
    }

    #[test]
    fn test_new_client_is_disconnected_and_default() {
        let client = client();
        assert_eq!(client.connection(), ConnectionState::Disconnected);
        assert_eq!(*client.state(), RoomState::default());
        assert_eq!(client.revision(), 0);
    }

    #[test]
    fn test_offline_dispatch_applies_locally() {
        let mut client = client();
        client.dispatch(&RoomEvent::NewStroke(Stroke::new(
            "#000000",
            8.0,
            Point::new(0.0, 0.0),
        )));

        // Optimistic apply happened even with no channel; the event stays
        // staged in the session until a room snapshot arrives.
        assert_eq!(client.state().game.strokes.len(), 1);
        assert_eq!(client.revision(), 1);
    }

    #[test]
    fn test_enter_prefers_join_when_url_names_a_room() {
        let mut client = client();
        let page = Url::parse("https://doodle.example/play?room=ABCD").unwrap();

        // Either way the channel starts connecting; which endpoint was used
        // is covered by the endpoint tests.
        client.enter(&page, "ada").unwrap();
        assert_eq!(client.connection(), ConnectionState::Connecting);
    }

    #[test]
    fn test_leave_resets_room_state() {
        let mut client = client();
        client.dispatch(&RoomEvent::NewStroke(Stroke::new(
            "#000000",
            8.0,
            Point::new(0.0, 0.0),
        )));
        assert_eq!(client.state().game.strokes.len(), 1);

        client.leave();
        assert_eq!(*client.state(), RoomState::default());
        assert_eq!(client.connection(), ConnectionState::Disconnected);
    }
}
