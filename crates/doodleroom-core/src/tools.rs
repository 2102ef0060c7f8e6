//! Local drawing tool settings.
//!
//! Tool state feeds new strokes but is never replicated; peers only ever
//! see the color and width baked into a stroke.

/// Active drawing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
}

/// Canvas background color; the eraser paints with it.
pub const BACKGROUND_COLOR: &str = "#ffffff";

/// Per-client brush configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSettings {
    pub color: String,
    pub stroke_width: f64,
    pub tool: Tool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            color: "#000000".to_string(),
            stroke_width: 18.0,
            tool: Tool::Brush,
        }
    }
}

/// Local-only settings mutations, mirror of the room event shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    ChangeColor(String),
    ChangeStrokeWidth(f64),
    ChangeTool(Tool),
}

impl ToolSettings {
    /// Apply one settings action, returning the next settings.
    pub fn reduce(&self, action: &ToolAction) -> ToolSettings {
        let mut next = self.clone();
        match action {
            ToolAction::ChangeColor(color) => next.color = color.clone(),
            ToolAction::ChangeStrokeWidth(width) => next.stroke_width = *width,
            ToolAction::ChangeTool(tool) => next.tool = *tool,
        }
        next
    }

    /// Color a new stroke should carry. The eraser draws in the background
    /// color, which keeps erasing an append-only stroke like any other.
    pub fn effective_color(&self) -> &str {
        match self.tool {
            Tool::Brush => &self.color,
            Tool::Eraser => BACKGROUND_COLOR,
        }
    }
}
