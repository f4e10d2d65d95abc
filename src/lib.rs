//! # Volume overlay viewer
//!
//! Prepares MRI volumes and tumor segmentations for side-by-side slice
//! viewing, and serves them from a small local web page.
//!
//! A case is a set of co-registered modality volumes (T1, T1ce, T2, FLAIR,
//! ...) plus one or more label volumes, typically one per rater. At startup
//! every file is:
//!
//!  - read from NIfTI (`.nii`, `.nii.gz`) or from a directory of DICOM slices
//!  - reordered into display convention (depth, height, width) with the
//!    depth axis flipped
//!  - for label volumes, resampled onto the reference volume's grid with
//!    nearest-neighbour interpolation so label values are never blended
//!
//! The prepared data lives in an [`AppContext`] that is never mutated
//! afterwards. The viewer reads slices from it through an
//! [`OverlaySelector`], whose keys are validated when it is built.
//!
//! Label remapping (for example collapsing label 3 into label 1) is opt-in
//! through [`LabelRemap`].
//!
//! # Examples
//!
//! ## Aligning a segmentation to a reference volume
//!
//! ```no_run
//! # use volume_overlay::{SegmentationAligner, VolumeLoader};
//! let loader = VolumeLoader::default();
//! let t1 = loader
//!     .load("data/C3L-00016/t1.nii.gz")
//!     .expect("should have loaded the reference volume");
//! let consensus = SegmentationAligner::new(loader)
//!     .align("data/C3L-00016/tumor-seg-consensus.nii.gz", &t1)
//!     .expect("should have aligned the segmentation");
//! assert_eq!(consensus.dim(), t1.dim());
//! ```

pub mod collection;
pub mod config;
pub mod context;
pub mod enums;
mod interpolator;
pub mod overlay;
pub mod segmentation;
pub mod server;
pub mod volume;
pub mod volume_loader;

pub use collection::NamedCollection;
pub use config::CaseConfig;
pub use context::AppContext;
pub use overlay::{ColorTable, OverlayData, OverlayKey, OverlaySelector};
pub use segmentation::{LabelMapping, LabelRemap, Segmentation, SegmentationAligner};
pub use volume::{DisplayTransform, Volume};
pub use volume_loader::{LoadError, VolumeLoader};
