//! Axis-aligned boxes in XYXY order.

use std::fmt;

use super::coord::{Coord, Normalized, Pixel};

/// An axis-aligned bounding box `(xmin, ymin, xmax, ymax)`.
///
/// Construction never checks `min <= max`; annotation tools do produce
/// inverted boxes and the validation pass is where those get reported.
#[derive(Clone, Copy, PartialEq)]
pub struct BBoxXYXY<TSpace> {
    pub min: Coord<TSpace>,
    pub max: Coord<TSpace>,
}

impl<TSpace> BBoxXYXY<TSpace> {
    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            min: Coord::new(xmin, ymin),
            max: Coord::new(xmax, ymax),
        }
    }

    #[inline]
    pub fn xmin(&self) -> f64 {
        self.min.x
    }

    #[inline]
    pub fn ymin(&self) -> f64 {
        self.min.y
    }

    #[inline]
    pub fn xmax(&self) -> f64 {
        self.max.x
    }

    #[inline]
    pub fn ymax(&self) -> f64 {
        self.max.y
    }

    /// Returns true if `min <= max` on both axes.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y
    }

    /// Returns true if the box has strictly positive width and height.
    #[inline]
    pub fn has_area(&self) -> bool {
        self.max.x > self.min.x && self.max.y > self.min.y
    }
}

impl BBoxXYXY<Pixel> {
    /// Returns true if every corner lies inside a `width` x `height` image.
    pub fn is_within(&self, width: f64, height: f64) -> bool {
        self.min.x >= 0.0
            && self.min.y >= 0.0
            && self.max.x <= width
            && self.max.y <= height
    }

    /// Divides x by `image_width` and y by `image_height`.
    ///
    /// A box lying inside the image maps into `[0, 1]`; anything outside
    /// is carried through unclamped.
    pub fn to_normalized(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Normalized> {
        BBoxXYXY::from_xyxy(
            self.min.x / image_width,
            self.min.y / image_height,
            self.max.x / image_width,
            self.max.y / image_height,
        )
    }
}

impl<TSpace> fmt::Debug for BBoxXYXY<TSpace> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BBoxXYXY")
            .field("xmin", &self.min.x)
            .field("ymin", &self.min.y)
            .field("xmax", &self.max.x)
            .field("ymax", &self.max.y)
            .finish()
    }
}
