//! Viewfinder overlay: pure layout plus a software preview renderer

mod geometry;
mod raster;

pub use geometry::{
    compute_layout, CaptionConfig, CaptionLayout, Corner, CornerBrackets, OverlayConfig,
    OverlayLayout, Point, Rect, Segment, Size, ViewportRect, WindowShape,
};
pub use raster::{render_overlay, OverlayStyle};
