//! The panel's fixed 7-color palette.
//!
//! Palette order is the wire encoding: each color's position is the 4-bit
//! value the controller expects for it. Indices 7-15 are never valid.

use std::str::FromStr;

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Squared Euclidean distance in RGB space.
    #[inline]
    pub fn distance_sq(&self, r: u8, g: u8, b: u8) -> u32 {
        let dr = self.r as i32 - r as i32;
        let dg = self.g as i32 - g as i32;
        let db = self.b as i32 - b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }
}

/// Palette colors in wire order.
pub const PALETTE: [Color; 7] = [
    Color::new(0, 0, 0),
    Color::new(255, 255, 255),
    Color::new(0, 255, 0),
    Color::new(0, 0, 255),
    Color::new(255, 0, 0),
    Color::new(255, 255, 0),
    Color::new(255, 128, 0),
];

/// One of the seven colors the panel can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PaletteColor {
    Black = 0x0,
    #[default]
    White = 0x1,
    Green = 0x2,
    Blue = 0x3,
    Red = 0x4,
    Yellow = 0x5,
    Orange = 0x6,
}

impl PaletteColor {
    /// All colors in wire order.
    pub const ALL: [PaletteColor; 7] = [
        PaletteColor::Black,
        PaletteColor::White,
        PaletteColor::Green,
        PaletteColor::Blue,
        PaletteColor::Red,
        PaletteColor::Yellow,
        PaletteColor::Orange,
    ];

    /// Returns the 4-bit wire index.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Looks up a color by wire index.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Returns the RGB value of this color.
    pub fn color(self) -> Color {
        PALETTE[self as usize]
    }

    /// Returns the palette color closest to the given RGB value.
    ///
    /// Ties go to the lowest index so the mapping is deterministic.
    pub fn nearest(r: u8, g: u8, b: u8) -> Self {
        let mut best = PaletteColor::Black;
        let mut best_distance = u32::MAX;
        for candidate in Self::ALL {
            let distance = candidate.color().distance_sq(r, g, b);
            if distance < best_distance {
                best = candidate;
                best_distance = distance;
            }
        }
        best
    }
}

impl FromStr for PaletteColor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "black" => Ok(PaletteColor::Black),
            "white" => Ok(PaletteColor::White),
            "green" => Ok(PaletteColor::Green),
            "blue" => Ok(PaletteColor::Blue),
            "red" => Ok(PaletteColor::Red),
            "yellow" => Ok(PaletteColor::Yellow),
            "orange" => Ok(PaletteColor::Orange),
            _ => Err(format!(
                "Invalid color: {}. Use: black, white, green, blue, red, yellow, orange",
                s
            )),
        }
    }
}

impl std::fmt::Display for PaletteColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaletteColor::Black => write!(f, "black"),
            PaletteColor::White => write!(f, "white"),
            PaletteColor::Green => write!(f, "green"),
            PaletteColor::Blue => write!(f, "blue"),
            PaletteColor::Red => write!(f, "red"),
            PaletteColor::Yellow => write!(f, "yellow"),
            PaletteColor::Orange => write!(f, "orange"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_order() {
        assert_eq!(PaletteColor::Black.index(), 0);
        assert_eq!(PaletteColor::White.index(), 1);
        assert_eq!(PaletteColor::Orange.index(), 6);
        assert_eq!(PaletteColor::from_index(3), Some(PaletteColor::Blue));
        assert_eq!(PaletteColor::from_index(7), None);
        assert_eq!(PaletteColor::Orange.color(), Color::new(255, 128, 0));
    }

    #[test]
    fn test_nearest() {
        assert_eq!(PaletteColor::nearest(10, 10, 10), PaletteColor::Black);
        assert_eq!(PaletteColor::nearest(250, 250, 240), PaletteColor::White);
        assert_eq!(PaletteColor::nearest(250, 120, 10), PaletteColor::Orange);
        assert_eq!(PaletteColor::nearest(20, 30, 200), PaletteColor::Blue);
    }

    #[test]
    fn test_nearest_tie_prefers_lowest_index() {
        // (255, 64, 0) sits exactly between red and orange.
        let red = PaletteColor::Red.color().distance_sq(255, 64, 0);
        let orange = PaletteColor::Orange.color().distance_sq(255, 64, 0);
        assert_eq!(red, orange);
        assert_eq!(PaletteColor::nearest(255, 64, 0), PaletteColor::Red);
        assert_eq!(PaletteColor::nearest(255, 65, 0), PaletteColor::Orange);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("White".parse::<PaletteColor>(), Ok(PaletteColor::White));
        assert_eq!("orange".parse::<PaletteColor>(), Ok(PaletteColor::Orange));
        assert!("purple".parse::<PaletteColor>().is_err());
        assert_eq!(PaletteColor::Yellow.to_string(), "yellow");
    }
}
