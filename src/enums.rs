use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The three medical slicing axes, in display order.
///
/// After the display transform the volume is laid out as
/// (depth, height, width), so axial slices run along axis 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    /// The array axis this orientation slices through.
    pub fn axis(self) -> usize {
        match self {
            Orientation::Axial => 0,
            Orientation::Coronal => 1,
            Orientation::Sagittal => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Axial => "axial",
            Orientation::Coronal => "coronal",
            Orientation::Sagittal => "sagittal",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown orientation '{0}', expected axial, coronal or sagittal")]
pub struct ParseOrientationError(String);

impl FromStr for Orientation {
    type Err = ParseOrientationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "axial" => Ok(Orientation::Axial),
            "coronal" => Ok(Orientation::Coronal),
            "sagittal" => Ok(Orientation::Sagittal),
            _ => Err(ParseOrientationError(s.to_owned())),
        }
    }
}

/// How samples are taken when a volume is moved onto another grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    /// Picks the closest source voxel. Never invents values, so it is the
    /// only mode allowed for label volumes.
    #[default]
    Nearest,
    Trilinear,
}

/// Ordering key for the slices of a DICOM series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_parses_case_insensitively() {
        assert_eq!("Axial".parse::<Orientation>().ok(), Some(Orientation::Axial));
        assert_eq!(
            "SAGITTAL".parse::<Orientation>().ok(),
            Some(Orientation::Sagittal)
        );
        assert!("oblique".parse::<Orientation>().is_err());
    }

    #[test]
    fn orientation_axes_are_distinct() {
        let axes: Vec<_> = Orientation::ALL.iter().map(|o| o.axis()).collect();
        assert_eq!(axes, vec![0, 1, 2]);
    }
}
