//! Normalized-space geometry shared by detections, tracking and rendering.
//!
//! Coordinates are fractions of the capture frame: `(0, 0)` is the top-left
//! corner, `(1, 1)` the bottom-right.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

impl std::ops::Add for Point2 {
    type Output = Point2;
    fn add(self, rhs: Point2) -> Point2 {
        Point2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point2 {
    type Output = Point2;
    fn sub(self, rhs: Point2) -> Point2 {
        Point2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Point2 {
    type Output = Point2;
    fn mul(self, rhs: f32) -> Point2 {
        Point2::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned box stored by centre and size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub const fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }

    pub fn center(&self) -> Point2 {
        Point2::new(self.cx, self.cy)
    }

    pub fn left(&self) -> f32 {
        self.cx - self.w / 2.0
    }

    pub fn right(&self) -> f32 {
        self.cx + self.w / 2.0
    }

    pub fn top(&self) -> f32 {
        self.cy - self.h / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.cy + self.h / 2.0
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn with_center(&self, center: Point2) -> BBox {
        BBox::new(center.x, center.y, self.w, self.h)
    }

    /// Smallest box enclosing `points`, or `None` for an empty set.
    pub fn enclosing(points: impl IntoIterator<Item = Point2>) -> Option<BBox> {
        let mut min = Point2::new(f32::MAX, f32::MAX);
        let mut max = Point2::new(f32::MIN, f32::MIN);
        let mut any = false;
        for p in points {
            if !p.is_finite() {
                continue;
            }
            any = true;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        any.then(|| BBox::new((min.x + max.x) / 2.0, (min.y + max.y) / 2.0, max.x - min.x, max.y - min.y))
    }
}

/// Intersection over union of two boxes, in `[0, 1]`.
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let x1 = a.left().max(b.left());
    let y1 = a.top().max(b.top());
    let x2 = a.right().min(b.right());
    let y2 = a.bottom().min(b.bottom());

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        (inter / union).min(1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_boxes() {
        let a = BBox::new(0.5, 0.5, 0.2, 0.1);
        assert_eq!(iou(&a, &a), 1.0);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = BBox::new(0.2, 0.2, 0.1, 0.1);
        let b = BBox::new(0.8, 0.8, 0.1, 0.1);
        assert_eq!(iou(&a, &b), 0.0);
        assert_eq!(iou(&b, &a), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BBox::new(0.5, 0.5, 0.2, 0.2);
        let b = BBox::new(0.6, 0.5, 0.2, 0.2);
        // intersection 0.1 x 0.2, union 0.06
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_enclosing() {
        let points = [Point2::new(0.1, 0.4), Point2::new(0.3, 0.2), Point2::new(f32::NAN, 0.9)];
        let bbox = BBox::enclosing(points).unwrap();
        assert!((bbox.cx - 0.2).abs() < 1e-6);
        assert!((bbox.cy - 0.3).abs() < 1e-6);
        assert!((bbox.w - 0.2).abs() < 1e-6);
        assert!(BBox::enclosing(Vec::new()).is_none());
    }
}
