//! Map detector boxes onto the displayed video element.

use crate::types::BoundingBox;
use serde::{Deserialize, Serialize};

/// Height reserved above a box for its name tag, in display pixels.
const LABEL_HEIGHT: f32 = 24.0;

/// How the video frame is fitted into the display area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Fill the display, cropping the overflowing axis (CSS `object-fit: cover`).
    #[default]
    Cover,
    /// Fit entirely inside the display, padding the short axis.
    Contain,
}

/// Source frame size, display size and presentation options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub frame_width: u32,
    pub frame_height: u32,
    pub display_width: u32,
    pub display_height: u32,
    #[serde(default)]
    pub fit: Fit,
    /// Flip horizontally, as for a user-facing camera preview.
    #[serde(default)]
    pub mirrored: bool,
}

/// Scale and offset from frame pixels to display pixels.
struct Placement {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl DisplayGeometry {
    fn placement(&self) -> Option<Placement> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return None;
        }
        let fw = self.frame_width as f32;
        let fh = self.frame_height as f32;
        let dw = self.display_width as f32;
        let dh = self.display_height as f32;

        let scale_w = dw / fw;
        let scale_h = dh / fh;
        let scale = match self.fit {
            Fit::Cover => scale_w.max(scale_h),
            Fit::Contain => scale_w.min(scale_h),
        };

        // Negative offsets mean the frame is cropped on that axis.
        Some(Placement {
            scale,
            offset_x: (dw - fw * scale) / 2.0,
            offset_y: (dh - fh * scale) / 2.0,
        })
    }

    /// Map a box to display pixels, clamped to the display.
    ///
    /// Returns `None` if the box lands entirely outside the visible area.
    pub fn map_box(&self, bbox: &BoundingBox) -> Option<Rect> {
        let p = self.placement()?;
        let dw = self.display_width as f32;
        let dh = self.display_height as f32;

        let mut x = bbox.x * p.scale + p.offset_x;
        let y = bbox.y * p.scale + p.offset_y;
        let w = bbox.width * p.scale;
        let h = bbox.height * p.scale;

        if self.mirrored {
            x = dw - (x + w);
        }

        let x0 = x.clamp(0.0, dw);
        let y0 = y.clamp(0.0, dh);
        let x1 = (x + w).clamp(0.0, dw);
        let y1 = (y + h).clamp(0.0, dh);

        if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
            return None;
        }
        Some(Rect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Known,
    Unknown,
    Warning,
}

impl Tone {
    /// Stroke colour for the box and name tag.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Known => "#a3e635",
            Self::Unknown => "#ef4444",
            Self::Warning => "#f59e0b",
        }
    }
}

/// A box plus its name tag, ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub rect: Rect,
    pub text: String,
    pub tone: Tone,
    pub label_x: f32,
    pub label_y: f32,
}

impl Overlay {
    /// Anchor the tag above the box, or inside its top edge when there is no room.
    pub fn new(rect: Rect, text: impl Into<String>, tone: Tone) -> Self {
        let label_y = if rect.y >= LABEL_HEIGHT {
            rect.y - LABEL_HEIGHT
        } else {
            rect.y
        };
        Self {
            rect,
            text: text.into(),
            tone,
            label_x: rect.x,
            label_y,
        }
    }
}
