//! Repaint planning: redraw only what the last state changes touched.
//!
//! Point appends arrive many times per second; clearing and redrawing the
//! whole stroke history for each one is the one thing a renderer must not
//! do. The tracker accumulates damage between frames: append-only changes
//! stay at "draw the tail stroke over the raster", anything that removed or
//! replaced history escalates to a full redraw.

use crate::events::RoomEvent;

/// What a renderer must redraw for the frame being prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Repaint {
    /// Nothing changed.
    #[default]
    None,
    /// The history only grew at the tail: draw the most recent stroke over
    /// the existing raster.
    LastStroke,
    /// History shrank or was replaced: clear and draw every stroke.
    Everything,
}

/// Accumulates damage from dispatched events until the renderer takes it.
///
/// Feed it every dispatch outcome via [`RepaintTracker::note`]; call
/// [`RepaintTracker::take`] once per frame. A fresh tracker starts fully
/// damaged so the first frame paints the whole history.
#[derive(Debug, Clone, Copy)]
pub struct RepaintTracker {
    damage: Repaint,
}

impl RepaintTracker {
    pub fn new() -> Self {
        Self {
            damage: Repaint::Everything,
        }
    }

    /// Record one dispatched event and whether it changed the state.
    pub fn note(&mut self, event: &RoomEvent, changed: bool) {
        if !changed {
            return;
        }
        match event {
            RoomEvent::NewStroke(_) => {
                // A second tail-touching change this frame means drawing the
                // final tail stroke alone would miss the previous one.
                self.damage = if self.damage == Repaint::None {
                    Repaint::LastStroke
                } else {
                    Repaint::Everything
                };
            }
            RoomEvent::StrokePoint(_) => {
                self.damage = self.damage.max(Repaint::LastStroke);
            }
            RoomEvent::UndoStroke
            | RoomEvent::ClearStrokes
            | RoomEvent::ClearState
            | RoomEvent::InitialState(_) => {
                self.damage = Repaint::Everything;
            }
            RoomEvent::StartGame(_) => {}
        }
    }

    /// Force the next frame to redraw everything (first frame, viewport
    /// resize, raster loss).
    pub fn invalidate(&mut self) {
        self.damage = Repaint::Everything;
    }

    /// Take the accumulated damage, resetting it for the next frame.
    pub fn take(&mut self) -> Repaint {
        std::mem::take(&mut self.damage)
    }
}

impl Default for RepaintTracker {
    fn default() -> Self {
        Self::new()
    }
}
