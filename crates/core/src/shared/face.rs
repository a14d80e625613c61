use crate::shared::orientation::Orientation;
use crate::shared::photo::Photo;

/// Pixel rectangle inside a photo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceBounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBounds {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Maps bounds measured on the upright view of a photo back onto its
    /// stored pixels.
    ///
    /// `source_width`/`source_height` are the stored (not upright) dimensions.
    pub fn to_source(&self, orientation: Orientation, source_width: u32, source_height: u32) -> Self {
        let w = source_width as i32;
        let h = source_height as i32;
        let map = |u: i32, v: i32| -> (i32, i32) {
            match orientation {
                Orientation::Up => (u, v),
                Orientation::UpMirrored => (w - u, v),
                Orientation::Down => (w - u, h - v),
                Orientation::DownMirrored => (u, h - v),
                Orientation::Right => (v, h - u),
                Orientation::Left => (w - v, u),
                Orientation::LeftMirrored => (v, u),
                Orientation::RightMirrored => (w - v, h - u),
            }
        };

        let (ax, ay) = map(self.x, self.y);
        let (bx, by) = map(self.x + self.width, self.y + self.height);
        FaceBounds {
            x: ax.min(bx),
            y: ay.min(by),
            width: (ax - bx).abs(),
            height: (ay - by).abs(),
        }
    }
}

/// A face cropped out of a photo.
///
/// `image` holds the stored (not upright) pixels of the crop and carries the
/// source photo's orientation tag; `bounds` locate the crop in the source.
#[derive(Clone, Debug, PartialEq)]
pub struct Face {
    pub index: usize,
    pub image: Photo,
    pub bounds: FaceBounds,
    pub confidence: f32,
}

impl Face {
    pub fn new(index: usize, image: Photo, bounds: FaceBounds, confidence: f32) -> Self {
        Self {
            index,
            image,
            bounds,
            confidence,
        }
    }
}
