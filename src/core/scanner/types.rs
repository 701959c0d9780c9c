//! Geometry and payload types shared by the detector, decoder and pipeline.

use serde::{Deserialize, Serialize};

/// Integer pixel coordinate. May lie slightly outside the frame when it comes
/// from a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in frame pixels. `width`/`height` count pixels, so a
/// single pixel has a 1x1 box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest box containing every point; negative coordinates clamp to 0.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        let min_x = min_x.max(0);
        let min_y = min_y.max(0);
        if max_x < min_x || max_y < min_y {
            return None;
        }

        Some(Self {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        })
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// `max(w/h, h/w)`, or `None` for a degenerate box.
    pub fn aspect_ratio(&self) -> Option<f32> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let w = self.width as f32;
        let h = self.height as f32;
        Some((w / h).max(h / w))
    }

    /// Grow by `margin` on every side, clamped to a `frame_width` x `frame_height` frame.
    pub fn expand(&self, margin: u32, frame_width: u32, frame_height: u32) -> Self {
        let x = self.x.saturating_sub(margin);
        let y = self.y.saturating_sub(margin);
        let right = (self.right() + margin).min(frame_width);
        let bottom = (self.bottom() + margin).min(frame_height);
        Self {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }
}

/// A bright candidate area found by the region detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub bounds: BoundingBox,
    /// Mean luminance (0-255) inside `bounds`.
    pub brightness: f32,
}

/// Where a decoded code sits in the image it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGeometry {
    pub polygon: Vec<Point>,
    pub bounds: BoundingBox,
}

impl CodeGeometry {
    pub fn from_polygon(polygon: Vec<Point>) -> Self {
        let bounds = BoundingBox::from_points(&polygon).unwrap_or_default();
        Self { polygon, bounds }
    }

    pub fn translated(&self, dx: u32, dy: u32) -> Self {
        let polygon = self
            .polygon
            .iter()
            .map(|p| Point::new(p.x + dx as i32, p.y + dy as i32))
            .collect();
        let bounds = BoundingBox {
            x: self.bounds.x + dx,
            y: self.bounds.y + dy,
            ..self.bounds
        };
        Self { polygon, bounds }
    }
}

/// Text read from one code plus its outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedPayload {
    pub text: String,
    pub geometry: CodeGeometry,
}

impl DecodedPayload {
    pub fn new(text: impl Into<String>, geometry: CodeGeometry) -> Self {
        Self {
            text: text.into(),
            geometry,
        }
    }

    /// Same payload with its geometry moved from crop space into frame space.
    pub fn translated(&self, dx: u32, dy: u32) -> Self {
        Self {
            text: self.text.clone(),
            geometry: self.geometry.translated(dx, dy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_from_points_is_inclusive() {
        let points = [
            Point::new(10, 20),
            Point::new(59, 20),
            Point::new(59, 69),
            Point::new(10, 69),
        ];
        let bounds = BoundingBox::from_points(&points).unwrap();
        assert_eq!(bounds, BoundingBox::new(10, 20, 50, 50));
        assert_eq!(bounds.aspect_ratio(), Some(1.0));
    }

    #[test]
    fn test_degenerate_box_has_no_aspect_ratio() {
        assert_eq!(BoundingBox::new(5, 5, 0, 10).aspect_ratio(), None);
        assert_eq!(BoundingBox::from_points(&[]), None);
    }

    #[test]
    fn test_expand_clamps_to_frame() {
        let bounds = BoundingBox::new(4, 50, 20, 20);
        let expanded = bounds.expand(10, 100, 75);
        assert_eq!(expanded, BoundingBox::new(0, 40, 34, 35));
    }

    #[test]
    fn test_translated_payload_is_a_new_value() {
        let geometry = CodeGeometry::from_polygon(vec![
            Point::new(0, 0),
            Point::new(9, 0),
            Point::new(9, 9),
            Point::new(0, 9),
        ]);
        let payload = DecodedPayload::new("abc", geometry);
        let moved = payload.translated(100, 50);

        assert_eq!(moved.text, "abc");
        assert_eq!(moved.geometry.polygon[2], Point::new(109, 59));
        assert_eq!(moved.geometry.bounds, BoundingBox::new(100, 50, 10, 10));
        assert_eq!(payload.geometry.bounds.x, 0);
    }
}
