//! Viewfinder layout computed from the viewport size alone
//!
//! Everything here is a pure function of its inputs: the same viewport and
//! config always produce bit-identical layouts, which keeps the renderer
//! free of geometry decisions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Viewport in device pixels, as reported on each layout pass.
pub type ViewportRect = Size;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub top_left: Point,
    pub size: Size,
}

impl Rect {
    pub fn left(&self) -> f32 {
        self.top_left.x
    }

    pub fn top(&self) -> f32 {
        self.top_left.y
    }

    pub fn right(&self) -> f32 {
        self.top_left.x + self.size.width
    }

    pub fn bottom(&self) -> f32 {
        self.top_left.y + self.size.height
    }

    pub fn center_x(&self) -> f32 {
        self.top_left.x + self.size.width / 2.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];
}

/// Two segments per corner, each starting at the corner point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CornerBrackets {
    /// Indexed in [`Corner::ALL`] order, horizontal arm first.
    pub segments: [Segment; 8],
}

impl CornerBrackets {
    /// (horizontal, vertical) arms of one corner
    pub fn corner(&self, corner: Corner) -> (Segment, Segment) {
        let i = corner as usize * 2;
        (self.segments[i], self.segments[i + 1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionLayout {
    /// Box occupied by the caption text
    pub text: Rect,
    pub baseline: f32,
    pub icon: Option<Rect>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverlayLayout {
    pub viewport: Size,
    /// The cutout; the border is stroked along its edge
    pub scan_window: Rect,
    pub corner_radius: f32,
    pub stroke_width: f32,
    pub corners: CornerBrackets,
    pub caption: Option<CaptionLayout>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowShape {
    /// Width-driven 4:3 window placed at a fixed offset from the top
    #[default]
    Rectangle,
    /// Square sized from the short side, centred vertically
    Square,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub shape: WindowShape,
    pub width_ratio: f32,
    pub square_ratio: f32,
    /// Window height as a fraction of its width in rectangle mode
    pub aspect_ratio: f32,
    pub top_offset_ratio: f32,
    pub cap_length: f32,
    pub stroke_width: f32,
    pub corner_radius: f32,
    pub caption: Option<CaptionConfig>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            shape: WindowShape::Rectangle,
            width_ratio: 0.9,
            square_ratio: 0.8,
            aspect_ratio: 0.75,
            top_offset_ratio: 0.3,
            cap_length: 32.0,
            stroke_width: 2.0,
            corner_radius: 24.0,
            caption: None,
        }
    }
}

/// Caption above the window. Text is measured by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub text: String,
    pub text_size: Size,
    /// Distance from the baseline to the top of the window
    pub margin: f32,
    pub icon: Option<Size>,
    pub icon_gap: f32,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            text: String::new(),
            text_size: Size::new(0.0, 0.0),
            margin: 16.0,
            icon: None,
            icon_gap: 8.0,
        }
    }
}

pub fn compute_layout(viewport: ViewportRect, config: &OverlayConfig) -> OverlayLayout {
    let vw = non_negative(viewport.width);
    let vh = non_negative(viewport.height);
    if vw == 0.0 || vh == 0.0 {
        return OverlayLayout {
            viewport: Size::new(vw, vh),
            ..Default::default()
        };
    }

    let (mut width, mut height) = match config.shape {
        WindowShape::Rectangle => {
            let width = vw * unit(config.width_ratio);
            let aspect = if config.aspect_ratio.is_finite() && config.aspect_ratio > 0.0 {
                config.aspect_ratio
            } else {
                0.75
            };
            (width, width * aspect)
        }
        WindowShape::Square => {
            let side = vw.min(vh) * unit(config.square_ratio);
            (side, side)
        }
    };

    // Too tall for the viewport: shrink, keeping the aspect ratio
    if height > vh {
        width *= vh / height;
        height = vh;
    }

    let x = ((vw - width) / 2.0).max(0.0);
    let y = match config.shape {
        WindowShape::Rectangle => (vh * unit(config.top_offset_ratio)).min(vh - height),
        WindowShape::Square => (vh - height) / 2.0,
    }
    .max(0.0);

    let scan_window = Rect {
        top_left: Point::new(x, y),
        size: Size::new(width, height),
    };
    let stroke_width = non_negative(config.stroke_width);
    let corner_radius = non_negative(config.corner_radius).min(width.min(height) / 2.0);

    OverlayLayout {
        viewport: Size::new(vw, vh),
        scan_window,
        corner_radius,
        stroke_width,
        corners: corner_brackets(&scan_window, non_negative(config.cap_length), stroke_width),
        caption: config
            .caption
            .as_ref()
            .map(|caption| caption_layout(vw, &scan_window, caption)),
    }
}

fn corner_brackets(window: &Rect, cap_length: f32, stroke_width: f32) -> CornerBrackets {
    let arm_x = cap_length.min(window.size.width / 2.0);
    let arm_y = cap_length.min(window.size.height / 2.0);

    // Brackets sit just outside the window
    let offset = stroke_width / 2.0;
    let left = window.left() - offset;
    let right = window.right() + offset;
    let top = window.top() - offset;
    let bottom = window.bottom() + offset;

    let mut segments = [Segment::default(); 8];
    for corner in Corner::ALL {
        let (cx, cy, dx, dy) = match corner {
            Corner::TopLeft => (left, top, arm_x, arm_y),
            Corner::TopRight => (right, top, -arm_x, arm_y),
            Corner::BottomRight => (right, bottom, -arm_x, -arm_y),
            Corner::BottomLeft => (left, bottom, arm_x, -arm_y),
        };
        let origin = Point::new(cx, cy);
        let i = corner as usize * 2;
        segments[i] = Segment {
            start: origin,
            end: Point::new(cx + dx, cy),
        };
        segments[i + 1] = Segment {
            start: origin,
            end: Point::new(cx, cy + dy),
        };
    }

    CornerBrackets { segments }
}

fn caption_layout(viewport_width: f32, window: &Rect, caption: &CaptionConfig) -> CaptionLayout {
    let text_width = non_negative(caption.text_size.width);
    let text_height = non_negative(caption.text_size.height);
    let baseline = window.top() - non_negative(caption.margin);

    let text = Rect {
        top_left: Point::new(viewport_width / 2.0 - text_width / 2.0, baseline - text_height),
        size: Size::new(text_width, text_height),
    };

    let icon = caption.icon.map(|icon| {
        let icon_width = non_negative(icon.width);
        let icon_height = non_negative(icon.height);
        Rect {
            top_left: Point::new(
                text.right() + non_negative(caption.icon_gap),
                text.top() + (text_height - icon_height) / 2.0,
            ),
            size: Size::new(icon_width, icon_height),
        }
    });

    CaptionLayout {
        text,
        baseline,
        icon,
    }
}

fn non_negative(v: f32) -> f32 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

fn unit(v: f32) -> f32 {
    non_negative(v).min(1.0)
}
