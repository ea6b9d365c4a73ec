//! Bounding box of lon/lat geometries.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Degenerate box around a single position.
    pub fn from_position(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Grow the box to include a position.
    pub fn expand(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Width of the bounding box in degrees.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in degrees.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand() {
        let mut bbox = BoundingBox::from_position(10.0, 20.0);
        bbox.expand(-5.0, 25.0);
        bbox.expand(12.0, 18.0);
        assert_eq!(bbox, BoundingBox::new(-5.0, 18.0, 12.0, 25.0));
        assert_eq!(bbox.width(), 17.0);
        assert_eq!(bbox.height(), 7.0);
    }

    #[test]
    fn test_union() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(-1.0, 0.5, 0.5, 2.0);
        assert_eq!(a.union(&b), BoundingBox::new(-1.0, 0.0, 1.0, 2.0));
    }

    #[test]
    fn test_display() {
        let bbox = BoundingBox::new(-97.5, 35.0, -97.0, 35.5);
        assert_eq!(bbox.to_string(), "-97.5,35,-97,35.5");
    }
}
