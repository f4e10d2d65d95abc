use std::fmt;

use image::{GrayImage, ImageBuffer, Luma};
use ndarray::{Array3, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::enums::{Interpolation, Orientation};
use crate::interpolator::Interpolator;

/// Sampling geometry of a volume: where each voxel sits in world space.
///
/// Rotations are not modelled. A voxel at `index` lies at
/// `origin + index * spacing * direction` along each axis. World axes follow
/// the array axes, so a reoriented volume's grid lists world coordinates in
/// display order; grids are only comparable under the same display transform.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    pub shape: (usize, usize, usize),
    pub spacing: [f32; 3],
    pub origin: [f32; 3],
    pub direction: [f32; 3],
}

impl Grid {
    const TOLERANCE: f32 = 1e-4;

    pub fn dims(&self) -> [usize; 3] {
        [self.shape.0, self.shape.1, self.shape.2]
    }

    pub fn index_to_world(&self, index: [f32; 3]) -> [f32; 3] {
        std::array::from_fn(|a| {
            (index[a] * self.spacing[a]).mul_add(self.direction[a], self.origin[a])
        })
    }

    /// Continuous voxel index of a world position. May lie outside the grid.
    pub fn world_to_index(&self, world: [f32; 3]) -> [f32; 3] {
        std::array::from_fn(|a| (world[a] - self.origin[a]) / (self.spacing[a] * self.direction[a]))
    }

    /// Equal shape, and geometry equal within a small relative tolerance.
    pub fn approx_eq(&self, other: &Grid) -> bool {
        let close = |a: f32, b: f32| (a - b).abs() <= Self::TOLERANCE * a.abs().max(b.abs()).max(1.0);
        self.shape == other.shape
            && (0..3).all(|a| {
                close(self.spacing[a], other.spacing[a])
                    && close(self.origin[a], other.origin[a])
                    && self.direction[a] == other.direction[a]
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("display axes {0:?} are not a permutation of [0, 1, 2]")]
    NotAPermutation([usize; 3]),
    #[error("flip axis {0} is out of range, expected 0, 1 or 2")]
    FlipOutOfRange(usize),
}

/// Axis reordering and flip that bring a volume from file order (x, y, z)
/// into display order.
///
/// Output axis `i` is input axis `axes[i]`; `flip` then reverses one output
/// axis. The default `(2, 1, 0)` with axis 0 flipped yields
/// (depth, height, width) with the superior slice first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DisplayTransformFields", into = "DisplayTransformFields")]
pub struct DisplayTransform {
    axes: [usize; 3],
    flip: Option<usize>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct DisplayTransformFields {
    axes: [usize; 3],
    #[serde(default)]
    flip: Option<usize>,
}

impl TryFrom<DisplayTransformFields> for DisplayTransform {
    type Error = TransformError;

    fn try_from(fields: DisplayTransformFields) -> Result<Self, Self::Error> {
        DisplayTransform::new(fields.axes, fields.flip)
    }
}

impl From<DisplayTransform> for DisplayTransformFields {
    fn from(transform: DisplayTransform) -> Self {
        Self {
            axes: transform.axes,
            flip: transform.flip,
        }
    }
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self {
            axes: [2, 1, 0],
            flip: Some(0),
        }
    }
}

impl DisplayTransform {
    pub fn new(axes: [usize; 3], flip: Option<usize>) -> Result<Self, TransformError> {
        let mut seen = [false; 3];
        for &axis in &axes {
            if axis > 2 || seen[axis] {
                return Err(TransformError::NotAPermutation(axes));
            }
            seen[axis] = true;
        }
        if let Some(axis) = flip.filter(|&axis| axis > 2) {
            return Err(TransformError::FlipOutOfRange(axis));
        }
        Ok(Self { axes, flip })
    }

    /// Leaves the volume in file order.
    pub fn identity() -> Self {
        Self {
            axes: [0, 1, 2],
            flip: None,
        }
    }

    pub fn axes(&self) -> [usize; 3] {
        self.axes
    }

    pub fn flip(&self) -> Option<usize> {
        self.flip
    }

    fn permute<T: Copy>(&self, values: [T; 3]) -> [T; 3] {
        self.axes.map(|axis| values[axis])
    }
}

/// A scalar 3D image with its sampling geometry.
///
/// Volumes are immutable once built; every transformation returns a new
/// volume.
#[derive(Clone, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
    spacing: [f32; 3],
    origin: [f32; 3],
    direction: [f32; 3],
    window: (f32, f32),
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("dim", &self.data.dim())
            .field("spacing", &self.spacing)
            .field("origin", &self.origin)
            .field("direction", &self.direction)
            .field("window", &self.window)
            .finish()
    }
}

impl Volume {
    /// A volume at the world origin with positive axis directions.
    pub fn new(data: Array3<f32>, spacing: [f32; 3]) -> Self {
        Self::with_geometry(data, spacing, [0.0; 3], [1.0; 3])
    }

    pub fn with_geometry(
        data: Array3<f32>,
        spacing: [f32; 3],
        origin: [f32; 3],
        direction: [f32; 3],
    ) -> Self {
        let window = Self::intensity_window(&data);
        Self {
            data,
            spacing,
            origin,
            direction,
            window,
        }
    }

    /// Get the dimensions of the volume (depth, height, width) in display order
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Physical voxel size along each array axis.
    pub fn spacing(&self) -> [f32; 3] {
        self.spacing
    }

    /// Smallest and largest finite intensity, used to scale slices to 8 bits.
    pub fn window(&self) -> (f32, f32) {
        self.window
    }

    pub fn grid(&self) -> Grid {
        Grid {
            shape: self.data.dim(),
            spacing: self.spacing,
            origin: self.origin,
            direction: self.direction,
        }
    }

    /// Applies a display transform, keeping every voxel at its world position.
    pub fn reoriented(self, transform: &DisplayTransform) -> Self {
        let mut data = self.data.permuted_axes(transform.axes());
        let spacing = transform.permute(self.spacing);
        let mut origin = transform.permute(self.origin);
        let mut direction = transform.permute(self.direction);

        if let Some(axis) = transform.flip() {
            let last = data.len_of(Axis(axis)).saturating_sub(1) as f32;
            data.invert_axis(Axis(axis));
            origin[axis] += last * spacing[axis] * direction[axis];
            direction[axis] = -direction[axis];
        }

        Self {
            data: data.as_standard_layout().into_owned(),
            spacing,
            origin,
            direction,
            window: self.window,
        }
    }

    /// Samples this volume on another grid. World positions outside this
    /// volume read as zero.
    pub fn resampled_onto(&self, grid: &Grid, interpolation: Interpolation) -> Self {
        let data = match interpolation {
            Interpolation::Nearest => {
                Interpolator::resample_nearest(&self.data, &self.grid(), grid, 0.0)
            }
            Interpolation::Trilinear => {
                Interpolator::resample_trilinear(&self.data, &self.grid(), grid, 0.0)
            }
        };
        Self::with_geometry(data, grid.spacing, grid.origin, grid.direction)
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        let axis = Axis(orientation.axis());
        (index < self.data.len_of(axis)).then(|| self.data.index_axis(axis, index))
    }

    /// Renders one slice as an 8-bit grayscale image scaled by [`Volume::window`].
    pub fn slice_image(&self, index: usize, orientation: Orientation) -> Option<GrayImage> {
        let slice = self.get_slice_from_axis(index, orientation)?;
        let (height, width) = slice.dim();
        let (low, high) = self.window;
        let pixel_data: Vec<u8> = slice
            .iter()
            .map(|&v| Self::normalize_to_u8(v, low, high))
            .collect();
        ImageBuffer::<Luma<u8>, _>::from_raw(width as u32, height as u32, pixel_data)
    }

    #[inline]
    fn normalize_to_u8(value: f32, low: f32, high: f32) -> u8 {
        if high <= low || !value.is_finite() {
            return 0;
        }
        (((value - low) / (high - low)) * 255.0).clamp(0.0, 255.0) as u8
    }

    fn intensity_window(data: &Array3<f32>) -> (f32, f32) {
        let (low, high) = data
            .par_iter()
            .filter(|v| v.is_finite())
            .fold(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |(low, high), &v| (low.min(v), high.max(v)),
            )
            .reduce(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |a, b| (a.0.min(b.0), a.1.max(b.1)),
            );
        if low > high { (0.0, 0.0) } else { (low, high) }
    }
}
