//! Software rendering of an overlay layout, for previews and debugging

use image::{Rgba, RgbaImage};

use super::geometry::{OverlayLayout, Point, Rect, Segment, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStyle {
    pub scrim: Rgba<u8>,
    pub outline: Rgba<u8>,
    pub brackets: Rgba<u8>,
    /// Placeholder fill for the caption and icon boxes
    pub caption: Rgba<u8>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            scrim: Rgba([0, 0, 0, 0x99]),
            outline: Rgba([255, 255, 255, 255]),
            brackets: Rgba([255, 255, 255, 255]),
            caption: Rgba([255, 255, 255, 0x40]),
        }
    }
}

/// Draw the scrim with the rounded cutout, its outline, the corner brackets
/// and the caption boxes.
pub fn render_overlay(layout: &OverlayLayout, style: &OverlayStyle) -> RgbaImage {
    let width = (layout.viewport.width.ceil() as u32).max(1);
    let height = (layout.viewport.height.ceil() as u32).max(1);
    let mut image = RgbaImage::new(width, height);

    let window = layout.scan_window;
    let half_stroke = layout.stroke_width / 2.0;
    let has_window = window.size.width > 0.0 && window.size.height > 0.0;

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
        let distance = if has_window {
            rounded_rect_distance(&window, layout.corner_radius, px, py)
        } else {
            f32::INFINITY
        };

        *pixel = if distance.abs() <= half_stroke {
            style.outline
        } else if distance < 0.0 {
            Rgba([0, 0, 0, 0])
        } else {
            style.scrim
        };
    }

    if !has_window {
        return image;
    }

    let thickness = layout.stroke_width.max(1.0) * 2.0;
    for segment in &layout.corners.segments {
        fill_rect(&mut image, &segment_bounds(segment, thickness), style.brackets);
    }

    if let Some(caption) = &layout.caption {
        fill_rect(&mut image, &caption.text, style.caption);
        if let Some(icon) = &caption.icon {
            fill_rect(&mut image, icon, style.caption);
        }
    }

    image
}

// Signed distance to the rounded rectangle outline, negative inside
fn rounded_rect_distance(rect: &Rect, radius: f32, px: f32, py: f32) -> f32 {
    let half_w = rect.size.width / 2.0;
    let half_h = rect.size.height / 2.0;
    let cx = rect.left() + half_w;
    let cy = rect.top() + half_h;

    let qx = (px - cx).abs() - (half_w - radius);
    let qy = (py - cy).abs() - (half_h - radius);
    let outside = qx.max(0.0).hypot(qy.max(0.0));
    outside + qx.max(qy).min(0.0) - radius
}

fn segment_bounds(segment: &Segment, thickness: f32) -> Rect {
    let half = thickness / 2.0;
    let left = segment.start.x.min(segment.end.x) - half;
    let top = segment.start.y.min(segment.end.y) - half;
    let right = segment.start.x.max(segment.end.x) + half;
    let bottom = segment.start.y.max(segment.end.y) + half;
    Rect {
        top_left: Point::new(left, top),
        size: Size::new(right - left, bottom - top),
    }
}

fn fill_rect(image: &mut RgbaImage, rect: &Rect, color: Rgba<u8>) {
    let clamp_x = |v: f32| (v.round().max(0.0) as u32).min(image.width());
    let clamp_y = |v: f32| (v.round().max(0.0) as u32).min(image.height());
    let (x0, x1) = (clamp_x(rect.left()), clamp_x(rect.right()));
    let (y0, y1) = (clamp_y(rect.top()), clamp_y(rect.bottom()));

    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::geometry::{compute_layout, Corner, OverlayConfig};

    #[test]
    fn cutout_is_clear_and_scrim_covers_the_rest() {
        let layout = compute_layout(Size::new(200.0, 400.0), &OverlayConfig::default());
        let style = OverlayStyle::default();
        let image = render_overlay(&layout, &style);

        assert_eq!(image.dimensions(), (200, 400));
        assert_eq!(*image.get_pixel(5, 5), style.scrim);

        let w = layout.scan_window;
        let centre = image.get_pixel(w.center_x() as u32, (w.top() + w.size.height / 2.0) as u32);
        assert_eq!(centre.0[3], 0);
    }

    #[test]
    fn brackets_are_drawn_at_the_corners() {
        let layout = compute_layout(Size::new(200.0, 400.0), &OverlayConfig::default());
        let style = OverlayStyle::default();
        let image = render_overlay(&layout, &style);

        let (h, _) = layout.corners.corner(Corner::TopLeft);
        let x = (h.start.x + 4.0) as u32;
        let y = h.start.y as u32;
        assert_eq!(*image.get_pixel(x, y), style.brackets);
    }

    #[test]
    fn empty_layout_is_all_scrim() {
        let layout = compute_layout(Size::new(0.0, 0.0), &OverlayConfig::default());
        let style = OverlayStyle::default();
        let image = render_overlay(&layout, &style);
        assert_eq!(image.dimensions(), (1, 1));
        assert_eq!(*image.get_pixel(0, 0), style.scrim);
    }
}
