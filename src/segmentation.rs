use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::debug;
use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::Orientation;
use crate::interpolator::Interpolator;
use crate::volume::Volume;
use crate::volume_loader::{LoadError, VolumeLoader};

#[derive(Debug, Error)]
pub enum AlignError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(
        "{}: resampled shape {actual:?} does not match reference shape {expected:?}",
        .path.display()
    )]
    ShapeMismatch {
        path: PathBuf,
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
}

/// A label volume sampled on the grid of one reference [`Volume`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segmentation {
    labels: Array3<u8>,
}

impl Segmentation {
    pub fn new(labels: Array3<u8>) -> Self {
        Self { labels }
    }

    /// The "no overlay" placeholder: all background, shaped like `reference`.
    pub fn empty_like(reference: &Volume) -> Self {
        Self::new(Array3::zeros(reference.dim()))
    }

    pub fn labels(&self) -> &Array3<u8> {
        &self.labels
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.labels.dim()
    }

    /// Distinct label values present, in ascending order.
    pub fn label_values(&self) -> BTreeSet<u8> {
        let mut present = [false; 256];
        self.labels.iter().for_each(|&l| present[l as usize] = true);
        (0..=u8::MAX).filter(|&l| present[l as usize]).collect()
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, u8>> {
        let axis = Axis(orientation.axis());
        (index < self.labels.len_of(axis)).then(|| self.labels.index_axis(axis, index))
    }
}

/// One label substitution, `from` becomes `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMapping {
    pub from: u8,
    pub to: u8,
}

/// Opt-in label substitutions applied after resampling.
///
/// Each voxel is mapped by its resampled value only, so chains such as
/// `3 -> 1, 1 -> 2` do not turn a 3 into a 2. When a source label appears
/// more than once the first mapping wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelRemap(Vec<LabelMapping>);

impl LabelRemap {
    pub fn new(mappings: impl IntoIterator<Item = LabelMapping>) -> Self {
        Self(mappings.into_iter().collect())
    }

    pub fn is_identity(&self) -> bool {
        self.0.iter().all(|m| m.from == m.to)
    }

    pub fn mappings(&self) -> &[LabelMapping] {
        &self.0
    }

    fn lookup_table(&self) -> [u8; 256] {
        let mut table: [u8; 256] = std::array::from_fn(|l| l as u8);
        let mut assigned = [false; 256];
        for mapping in &self.0 {
            let from = mapping.from as usize;
            if !assigned[from] {
                table[from] = mapping.to;
                assigned[from] = true;
            }
        }
        table
    }

    pub fn apply(&self, labels: &mut Array3<u8>) {
        if self.is_identity() {
            return;
        }
        let table = self.lookup_table();
        labels.par_mapv_inplace(|l| table[l as usize]);
    }
}

/// Loads label volumes and resamples them onto a reference grid.
#[derive(Clone, Debug, Default)]
pub struct SegmentationAligner {
    loader: VolumeLoader,
    remap: LabelRemap,
}

impl SegmentationAligner {
    pub fn new(loader: VolumeLoader) -> Self {
        Self {
            loader,
            remap: LabelRemap::default(),
        }
    }

    pub fn with_remap(mut self, remap: LabelRemap) -> Self {
        self.remap = remap;
        self
    }

    /// Load the label volume at `path` and align it to `reference`
    ///
    /// # Errors
    ///
    /// Propagates [`LoadError`]s, and reports [`AlignError::ShapeMismatch`]
    /// if the aligned labels do not have the reference shape.
    pub fn align(
        &self,
        path: impl AsRef<Path>,
        reference: &Volume,
    ) -> Result<Segmentation, AlignError> {
        let path = path.as_ref();
        let labels = self.loader.load(path)?;
        let segmentation = self.align_volume(&labels, reference);

        if segmentation.dim() != reference.dim() {
            return Err(AlignError::ShapeMismatch {
                path: path.to_owned(),
                expected: reference.dim(),
                actual: segmentation.dim(),
            });
        }
        debug!(
            "aligned {} to {:?}, labels {:?}",
            path.display(),
            reference.dim(),
            segmentation.label_values()
        );
        Ok(segmentation)
    }

    /// Nearest-neighbour resampling of an already loaded label volume.
    pub fn align_volume(&self, labels: &Volume, reference: &Volume) -> Segmentation {
        let cast = labels.data().mapv(Self::to_label);
        let mut aligned =
            Interpolator::resample_nearest(&cast, &labels.grid(), &reference.grid(), 0u8);
        self.remap.apply(&mut aligned);
        Segmentation::new(aligned)
    }

    /// Rounds to the nearest label; negative and NaN become background,
    /// values above 255 saturate.
    #[inline]
    fn to_label(value: f32) -> u8 {
        value.round() as u8
    }
}
