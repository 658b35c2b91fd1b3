//! Box geometry in pixel and normalized coordinate spaces.
//!
//! Annotations arrive in pixel space (upper-left origin). Training records
//! carry the same boxes divided by the decoded image size. The space is a
//! type parameter so the two cannot be mixed by accident.

mod bbox;
mod coord;

pub use bbox::BBoxXYXY;
pub use coord::{Coord, Normalized, Pixel};
