//! Pointer input: turns capture-surface gestures into room events.

use crate::events::RoomEvent;
use crate::stroke::{Point, Stroke};
use crate::tools::ToolSettings;

/// Backing-store resolution relative to the pointer coordinate space.
/// Pointer coordinates are multiplied by this before entering a stroke.
pub const CANVAS_SCALE: f64 = 2.0;

/// Pointer buttons we distinguish; only the primary one draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Auxiliary,
}

/// Translates pointer gestures into replicated drawing events.
///
/// Pointer-down with the primary button begins a stroke under the current
/// tool settings; pointer-move while the button stays held extends it one
/// point at a time. A move event can only extend a stroke this tracker
/// started, so a drag that began outside the canvas never appends to some
/// other participant's stroke.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputTracker {
    drawing: bool,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer pressed at surface coordinates `(x, y)`.
    pub fn pointer_down(
        &mut self,
        x: f64,
        y: f64,
        button: PointerButton,
        settings: &ToolSettings,
    ) -> Option<RoomEvent> {
        if button != PointerButton::Primary {
            return None;
        }
        self.drawing = true;
        let stroke = Stroke::new(
            settings.effective_color(),
            settings.stroke_width,
            scaled(x, y),
        );
        Some(RoomEvent::NewStroke(stroke))
    }

    /// Pointer moved to surface coordinates `(x, y)`.
    ///
    /// Emits a point only while the primary button is held on a stroke this
    /// tracker began. Only the point travels; stroke metadata was already
    /// sent with the pointer-down.
    pub fn pointer_move(&mut self, x: f64, y: f64, primary_held: bool) -> Option<RoomEvent> {
        if !primary_held {
            self.drawing = false;
            return None;
        }
        if !self.drawing {
            return None;
        }
        Some(RoomEvent::StrokePoint(scaled(x, y)))
    }

    /// Pointer released: the stroke is finished. Nothing travels; the next
    /// pointer-down implicitly closes it.
    pub fn pointer_up(&mut self) {
        self.drawing = false;
    }

    /// Check if a stroke is in progress.
    pub fn is_drawing(&self) -> bool {
        self.drawing
    }
}

/// Map surface coordinates into canvas space.
fn scaled(x: f64, y: f64) -> Point {
    Point::new(x * CANVAS_SCALE, y * CANVAS_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{BACKGROUND_COLOR, Tool, ToolAction};

    #[test]
    fn test_primary_down_begins_a_scaled_stroke() {
        let mut tracker = InputTracker::new();
        let settings = ToolSettings::default();

        let event = tracker
            .pointer_down(10.0, 20.0, PointerButton::Primary, &settings)
            .unwrap();

        match event {
            RoomEvent::NewStroke(stroke) => {
                assert_eq!(stroke.color, "#000000");
                assert_eq!(stroke.width, 18.0);
                assert_eq!(stroke.points(), &[Point::new(20.0, 40.0)]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(tracker.is_drawing());
    }

    #[test]
    fn test_secondary_button_does_not_draw() {
        let mut tracker = InputTracker::new();
        let settings = ToolSettings::default();

        assert!(
            tracker
                .pointer_down(0.0, 0.0, PointerButton::Secondary, &settings)
                .is_none()
        );
        assert!(!tracker.is_drawing());
    }

    #[test]
    fn test_move_extends_only_while_held() {
        let mut tracker = InputTracker::new();
        let settings = ToolSettings::default();

        // Move before any press does nothing.
        assert!(tracker.pointer_move(1.0, 1.0, true).is_none());

        tracker.pointer_down(0.0, 0.0, PointerButton::Primary, &settings);
        let event = tracker.pointer_move(5.0, 5.0, true).unwrap();
        assert_eq!(event, RoomEvent::StrokePoint(Point::new(10.0, 10.0)));

        // Releasing the button stops the stroke.
        assert!(tracker.pointer_move(6.0, 6.0, false).is_none());
        assert!(!tracker.is_drawing());
        assert!(tracker.pointer_move(7.0, 7.0, true).is_none());
    }

    #[test]
    fn test_pointer_up_finishes_the_stroke() {
        let mut tracker = InputTracker::new();
        let settings = ToolSettings::default();

        tracker.pointer_down(0.0, 0.0, PointerButton::Primary, &settings);
        tracker.pointer_up();
        assert!(!tracker.is_drawing());
        assert!(tracker.pointer_move(1.0, 1.0, true).is_none());
    }

    #[test]
    fn test_eraser_strokes_carry_background_color() {
        let mut tracker = InputTracker::new();
        let settings = ToolSettings::default().reduce(&ToolAction::ChangeTool(Tool::Eraser));

        let event = tracker
            .pointer_down(0.0, 0.0, PointerButton::Primary, &settings)
            .unwrap();

        match event {
            RoomEvent::NewStroke(stroke) => assert_eq!(stroke.color, BACKGROUND_COLOR),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
