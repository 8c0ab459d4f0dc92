use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    /// Intersection over union, 0 when the union is empty.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x_a = self.x.max(other.x);
        let y_a = self.y.max(other.y);
        let x_b = (self.x + self.width).min(other.x + other.width);
        let y_b = (self.y + self.height).min(other.y + other.height);
        let inter = (x_b - x_a).max(0.0) * (y_b - y_a).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    /// Distance between centres divided by the diagonal of `reference`,
    /// capped at 1.
    pub fn center_drift(&self, reference: &BoundingBox) -> f64 {
        let (cx1, cy1) = self.center();
        let (cx2, cy2) = reference.center();
        let distance = (cx1 - cx2).hypot(cy1 - cy2);
        let mut diagonal = reference.width.hypot(reference.height);
        if diagonal <= 0.0 {
            diagonal = 1.0;
        }
        (distance / diagonal).min(1.0)
    }
}
