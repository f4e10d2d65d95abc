use ndarray::{Array3, ArrayView2, Axis, Zip};

use crate::volume::Grid;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Resamples `source` (laid out on `from`) onto `onto` by picking the
    /// closest source voxel. Reference voxels that map outside the source
    /// receive `background`.
    pub(crate) fn resample_nearest<T>(
        source: &Array3<T>,
        from: &Grid,
        onto: &Grid,
        background: T,
    ) -> Array3<T>
    where
        T: Copy + Send + Sync,
    {
        let mut output = Array3::from_elem(onto.shape, background);
        Zip::indexed(&mut output).par_for_each(|(i, j, k), value| {
            let world = onto.index_to_world([i as f32, j as f32, k as f32]);
            if let Some(index) = Self::nearest_index(from.world_to_index(world), from.dims()) {
                *value = source[index];
            }
        });
        output
    }

    /// Like [`Interpolator::resample_nearest`], blending the eight closest
    /// source voxels.
    pub(crate) fn resample_trilinear(
        source: &Array3<f32>,
        from: &Grid,
        onto: &Grid,
        background: f32,
    ) -> Array3<f32> {
        let dims = from.dims();
        let mut output = Array3::from_elem(onto.shape, background);
        Zip::indexed(&mut output).par_for_each(|(i, j, k), value| {
            let world = onto.index_to_world([i as f32, j as f32, k as f32]);
            let index = from.world_to_index(world);
            if Self::inside(index, dims) {
                let [z, y, x] = std::array::from_fn(|a| index[a].clamp(0.0, (dims[a] - 1) as f32));
                *value = Self::trilinear_interpolate(source, z, y, x);
            }
        });
        output
    }

    /// A continuous index is inside a grid when it lies within half a voxel
    /// of the outermost voxel centres.
    #[inline]
    fn inside(index: [f32; 3], dims: [usize; 3]) -> bool {
        (0..3).all(|a| dims[a] > 0 && index[a] >= -0.5 && index[a] < dims[a] as f32 - 0.5)
    }

    #[inline]
    fn nearest_index(index: [f32; 3], dims: [usize; 3]) -> Option<[usize; 3]> {
        if !Self::inside(index, dims) {
            return None;
        }
        Some(std::array::from_fn(|a| {
            ((index[a] + 0.5).floor() as usize).min(dims[a] - 1)
        }))
    }

    #[inline]
    pub(crate) fn trilinear_interpolate(volume: &Array3<f32>, z: f32, y: f32, x: f32) -> f32 {
        let depth = volume.len_of(Axis(0));
        let z0 = z.floor() as usize;
        let z1 = (z0 + 1).min(depth - 1);
        let dz = z - z0 as f32;

        let v0 = Self::bilinear_interpolate(&volume.index_axis(Axis(0), z0), y, x);
        let v1 = Self::bilinear_interpolate(&volume.index_axis(Axis(0), z1), y, x);

        v0.mul_add(1.0 - dz, v1 * dz)
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(shape: (usize, usize, usize), spacing: f32) -> Grid {
        Grid {
            shape,
            spacing: [spacing; 3],
            origin: [0.0; 3],
            direction: [1.0; 3],
        }
    }

    #[test]
    fn nearest_on_identical_grid_is_identity() {
        let source = Array3::from_shape_fn((3, 4, 5), |(z, y, x)| (z * 20 + y * 5 + x) as u8);
        let g = grid((3, 4, 5), 1.5);
        let output = Interpolator::resample_nearest(&source, &g, &g, 0);
        assert_eq!(output, source);
    }

    #[test]
    fn nearest_upsampling_repeats_labels() {
        let source = Array3::from_shape_fn((2, 2, 2), |(z, _, _)| z as u8 + 1);
        let from = grid((2, 2, 2), 2.0);
        let mut onto = grid((4, 4, 4), 1.0);
        onto.origin = [-0.5; 3];
        let output = Interpolator::resample_nearest(&source, &from, &onto, 0);

        assert_eq!(output.dim(), (4, 4, 4));
        // Each source voxel covers two output voxels along every axis.
        let column: Vec<u8> = (0..4).map(|z| output[[z, 0, 0]]).collect();
        assert_eq!(column, vec![1, 1, 2, 2]);
    }

    #[test]
    fn nearest_outside_source_reads_background() {
        let source = Array3::from_elem((2, 2, 2), 9u8);
        let from = grid((2, 2, 2), 1.0);
        let mut onto = grid((2, 2, 2), 1.0);
        onto.origin = [5.0, 0.0, 0.0];
        let output = Interpolator::resample_nearest(&source, &from, &onto, 0);
        assert!(output.iter().all(|&v| v == 0));
    }

    #[test]
    fn trilinear_blends_between_slices() {
        let source = Array3::from_shape_fn((2, 1, 1), |(z, _, _)| z as f32 * 10.0);
        assert_eq!(Interpolator::trilinear_interpolate(&source, 0.5, 0.0, 0.0), 5.0);
        assert_eq!(Interpolator::trilinear_interpolate(&source, 1.0, 0.0, 0.0), 10.0);
    }

    #[test]
    fn trilinear_on_identical_grid_is_identity() {
        let source = Array3::from_shape_fn((3, 3, 3), |(z, y, x)| (z * 9 + y * 3 + x) as f32);
        let g = grid((3, 3, 3), 1.0);
        let output = Interpolator::resample_trilinear(&source, &g, &g, 0.0);
        assert_eq!(output, source);
    }
}
