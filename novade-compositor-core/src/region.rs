//! Rectangles and rectangle sets used for window shapes and damage.
//!
//! A [`Region`] is a list of rectangles. Adding a rectangle merges it with any
//! rectangle it overlaps or exactly abuts, which keeps the list short at the
//! price of slightly over-approximating the covered area. Damage is the main
//! consumer, where repainting a few extra pixels is always safe.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in screen or window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Covered area in pixels, zero for empty rectangles.
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn intersects(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.x < other.right() && self.right() > other.x && self.y < other.bottom() && self.bottom() > other.y
    }

    pub fn contains(&self, other: &Self) -> bool {
        !other.is_empty()
            && self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    /// Smallest rectangle covering both.
    pub fn bounding_union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Overlapping part, or an empty rectangle.
    pub fn intersection(&self, other: &Self) -> Self {
        if !self.intersects(other) {
            return Self::default();
        }
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    fn abuts(&self, other: &Self) -> bool {
        let vertical = self.x == other.x
            && self.width == other.width
            && (self.y == other.bottom() || self.bottom() == other.y);
        let horizontal = self.y == other.y
            && self.height == other.height
            && (self.x == other.right() || self.right() == other.x);
        vertical || horizontal
    }
}

/// A set of rectangles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rectangles: Vec<Rectangle>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rectangle(rect: Rectangle) -> Self {
        let mut region = Self::new();
        region.add(rect);
        region
    }

    pub fn from_rectangles<I: IntoIterator<Item = Rectangle>>(rects: I) -> Self {
        let mut region = Self::new();
        for rect in rects {
            region.add(rect);
        }
        region
    }

    pub fn rectangles(&self) -> &[Rectangle] {
        &self.rectangles
    }

    pub fn is_empty(&self) -> bool {
        self.rectangles.is_empty()
    }

    pub fn clear(&mut self) {
        self.rectangles.clear();
    }

    /// Bounding box of the whole region.
    pub fn extents(&self) -> Rectangle {
        self.rectangles
            .iter()
            .fold(Rectangle::default(), |acc, r| acc.bounding_union(r))
    }

    pub fn intersects(&self, rect: &Rectangle) -> bool {
        self.rectangles.iter().any(|r| r.intersects(rect))
    }

    pub fn contains_rectangle(&self, rect: &Rectangle) -> bool {
        self.rectangles.iter().any(|r| r.contains(rect))
    }

    // Pairwise merge of overlapping or abutting rectangles until a fixpoint.
    fn simplify(rects: &mut Vec<Rectangle>) {
        rects.retain(|r| !r.is_empty());
        let mut i = 0;
        while i < rects.len() {
            let mut merged = false;
            let mut j = i + 1;
            while j < rects.len() {
                if rects[i].intersects(&rects[j]) || rects[i].abuts(&rects[j]) {
                    rects[i] = rects[i].bounding_union(&rects[j]);
                    rects.remove(j);
                    merged = true;
                } else {
                    j += 1;
                }
            }
            if merged {
                i = 0;
            } else {
                i += 1;
            }
        }
    }

    /// Adds `rect`; empty rectangles are ignored.
    pub fn add(&mut self, rect: Rectangle) {
        if rect.is_empty() || self.contains_rectangle(&rect) {
            return;
        }
        self.rectangles.push(rect);
        Self::simplify(&mut self.rectangles);
    }

    pub fn union(&mut self, other: &Region) {
        for rect in &other.rectangles {
            self.add(*rect);
        }
    }

    /// Removes `rect`, splitting the rectangles it partially covers.
    pub fn subtract(&mut self, rect: Rectangle) {
        if rect.is_empty() || self.rectangles.is_empty() {
            return;
        }
        let mut remaining = Vec::with_capacity(self.rectangles.len());
        for existing in &self.rectangles {
            if !existing.intersects(&rect) {
                remaining.push(*existing);
                continue;
            }
            if rect.contains(existing) {
                continue;
            }
            if existing.y < rect.y {
                remaining.push(Rectangle::new(existing.x, existing.y, existing.width, rect.y - existing.y));
            }
            if existing.bottom() > rect.bottom() {
                remaining.push(Rectangle::new(
                    existing.x,
                    rect.bottom(),
                    existing.width,
                    existing.bottom() - rect.bottom(),
                ));
            }
            let top = existing.y.max(rect.y);
            let bottom = existing.bottom().min(rect.bottom());
            if existing.x < rect.x {
                remaining.push(Rectangle::new(existing.x, top, rect.x - existing.x, bottom - top));
            }
            if existing.right() > rect.right() {
                remaining.push(Rectangle::new(rect.right(), top, existing.right() - rect.right(), bottom - top));
            }
        }
        self.rectangles = remaining;
        Self::simplify(&mut self.rectangles);
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        for rect in &mut self.rectangles {
            *rect = rect.translate(dx, dy);
        }
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Region {
        let mut region = self.clone();
        region.translate(dx, dy);
        region
    }

    /// Restricts the region to `clip`.
    pub fn intersect_rectangle(&mut self, clip: &Rectangle) {
        let clipped: Vec<Rectangle> = self.rectangles.iter().map(|r| r.intersection(clip)).collect();
        self.rectangles = clipped;
        Self::simplify(&mut self.rectangles);
    }
}

impl From<Rectangle> for Region {
    fn from(rect: Rectangle) -> Self {
        Region::from_rectangle(rect)
    }
}
