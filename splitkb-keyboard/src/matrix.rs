//! Key positions and per-variant matrix dimensions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use splitkb_transport::Half;

/// One physical key: a half plus its scan-matrix address
///
/// Two string forms are derived from it:
/// - `"left-2-3"`, the store key (`Display` / `FromStr`, serde)
/// - `"L2R3"`, the matrix id (`matrix_id`), which carries no half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPosition {
    pub half: Half,
    pub row: u8,
    pub col: u8,
}

impl KeyPosition {
    pub const fn new(half: Half, row: u8, col: u8) -> Self {
        Self { half, row, col }
    }

    pub fn matrix_id(&self) -> String {
        format!("L{}R{}", self.row, self.col)
    }

    /// Parse an `"L{row}R{col}"` matrix id for the given half
    pub fn from_matrix_id(half: Half, id: &str) -> Option<Self> {
        let (row, col) = id.strip_prefix('L')?.split_once('R')?;
        Some(Self::new(half, row.parse().ok()?, col.parse().ok()?))
    }
}

impl fmt::Display for KeyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.half, self.row, self.col)
    }
}

impl FromStr for KeyPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        let (Some(half), Some(row), Some(col)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("invalid key position: \"{s}\""));
        };
        let half = half.parse::<Half>()?;
        let row = row
            .parse()
            .map_err(|_| format!("invalid row in key position: \"{s}\""))?;
        let col = col
            .parse()
            .map_err(|_| format!("invalid column in key position: \"{s}\""))?;
        Ok(Self::new(half, row, col))
    }
}

impl Serialize for KeyPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Rows x columns of one half's scan matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixDims {
    pub rows: u8,
    pub cols: u8,
}

impl MatrixDims {
    pub const fn new(rows: u8, cols: u8) -> Self {
        Self { rows, cols }
    }

    pub fn contains(&self, row: u8, col: u8) -> bool {
        row < self.rows && col < self.cols
    }

    pub fn key_count(&self) -> usize {
        usize::from(self.rows) * usize::from(self.cols)
    }

    /// Every (row, col) in row-major order
    pub fn positions(self) -> impl Iterator<Item = (u8, u8)> {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| (row, col)))
    }
}

/// Physical build of the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyboardVariant {
    /// Full split board: 6x7 left, 6x9 right
    #[default]
    Main,
    /// 4x5 per half test build
    Protoboard,
}

impl KeyboardVariant {
    pub fn dims(self, half: Half) -> MatrixDims {
        match (self, half) {
            (KeyboardVariant::Main, Half::Left) => MatrixDims::new(6, 7),
            (KeyboardVariant::Main, Half::Right) => MatrixDims::new(6, 9),
            (KeyboardVariant::Protoboard, _) => MatrixDims::new(4, 5),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyboardVariant::Main => "main",
            KeyboardVariant::Protoboard => "protoboard",
        }
    }
}

impl fmt::Display for KeyboardVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyboardVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(KeyboardVariant::Main),
            "protoboard" | "proto" => Ok(KeyboardVariant::Protoboard),
            _ => Err(format!("unknown keyboard variant: \"{s}\"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_key_position_string_forms() {
        let pos = KeyPosition::new(Half::Right, 2, 8);
        assert_eq!(pos.to_string(), "right-2-8");
        assert_eq!(pos.matrix_id(), "L2R8");
        assert_eq!("right-2-8".parse::<KeyPosition>(), Ok(pos));
        assert_eq!(KeyPosition::from_matrix_id(Half::Right, "L2R8"), Some(pos));
    }

    #[test]
    fn test_key_position_rejects_garbage() {
        assert!("left-2".parse::<KeyPosition>().is_err());
        assert!("middle-0-0".parse::<KeyPosition>().is_err());
        assert!("left-x-0".parse::<KeyPosition>().is_err());
        assert!("left-0-0-0".parse::<KeyPosition>().is_err());
        assert_eq!(KeyPosition::from_matrix_id(Half::Left, "R2L3"), None);
    }

    #[test]
    fn test_key_position_as_json_map_key() {
        let mut map = BTreeMap::new();
        map.insert(KeyPosition::new(Half::Left, 0, 1), "KC_F1".to_string());
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"left-0-1":"KC_F1"}"#);
        let back: BTreeMap<KeyPosition, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_positions_are_row_major() {
        let dims = MatrixDims::new(2, 3);
        let order: Vec<_> = dims.positions().collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
        assert_eq!(dims.key_count(), 6);
        assert!(dims.contains(1, 2));
        assert!(!dims.contains(2, 0));
    }

    #[test]
    fn test_variant_dims() {
        assert_eq!(KeyboardVariant::Main.dims(Half::Left), MatrixDims::new(6, 7));
        assert_eq!(KeyboardVariant::Main.dims(Half::Right), MatrixDims::new(6, 9));
        assert_eq!(
            KeyboardVariant::Protoboard.dims(Half::Right),
            MatrixDims::new(4, 5)
        );
        assert_eq!("Protoboard".parse(), Ok(KeyboardVariant::Protoboard));
    }
}
