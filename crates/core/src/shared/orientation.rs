use std::fmt;
use std::str::FromStr;

use image::imageops;
use image::RgbImage;

/// How the stored pixels must be transformed to appear upright.
///
/// Variants follow the eight EXIF orientation states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    Up,
    Down,
    Left,
    Right,
    UpMirrored,
    DownMirrored,
    LeftMirrored,
    RightMirrored,
}

impl Orientation {
    /// Ordinal order used by camera/gallery image metadata on mobile platforms.
    pub const ALL: [Orientation; 8] = [
        Orientation::Up,
        Orientation::Down,
        Orientation::Left,
        Orientation::Right,
        Orientation::UpMirrored,
        Orientation::DownMirrored,
        Orientation::LeftMirrored,
        Orientation::RightMirrored,
    ];

    /// Maps a platform orientation ordinal (see [`Orientation::ALL`]).
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Maps an EXIF `Orientation` tag value. Unknown values fall back to `Up`.
    pub fn from_exif(value: u16) -> Self {
        match value {
            2 => Orientation::UpMirrored,
            3 => Orientation::Down,
            4 => Orientation::DownMirrored,
            5 => Orientation::LeftMirrored,
            6 => Orientation::Right,
            7 => Orientation::RightMirrored,
            8 => Orientation::Left,
            _ => Orientation::Up,
        }
    }

    /// Returns a copy of `img` rotated/flipped into upright position.
    pub fn apply(self, img: &RgbImage) -> RgbImage {
        match self {
            Orientation::Up => img.clone(),
            Orientation::UpMirrored => imageops::flip_horizontal(img),
            Orientation::Down => imageops::rotate180(img),
            Orientation::DownMirrored => imageops::flip_vertical(img),
            Orientation::LeftMirrored => imageops::flip_horizontal(&imageops::rotate90(img)),
            Orientation::Right => imageops::rotate90(img),
            Orientation::RightMirrored => imageops::flip_horizontal(&imageops::rotate270(img)),
            Orientation::Left => imageops::rotate270(img),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orientation::Up => "up",
            Orientation::Down => "down",
            Orientation::Left => "left",
            Orientation::Right => "right",
            Orientation::UpMirrored => "up-mirrored",
            Orientation::DownMirrored => "down-mirrored",
            Orientation::LeftMirrored => "left-mirrored",
            Orientation::RightMirrored => "right-mirrored",
        };
        f.write_str(name)
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|o| o.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("Unknown orientation '{s}'"))
    }
}
