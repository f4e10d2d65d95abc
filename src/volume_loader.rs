use crate::{
    enums::SortBy,
    volume::{DisplayTransform, Volume},
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use log::{debug, warn};
use ndarray::{Array2, Array3, Axis, Ix3, s};
use nifti::{NiftiHeader, NiftiObject, ReaderOptions, volume::ndarray::IntoNdArray};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Reasons a volume could not be read. Every variant names the offending path.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{}: no such file or directory", .path.display())]
    NotFound { path: PathBuf },

    #[error("{}: unsupported volume format, expected .nii, .nii.gz or a DICOM directory", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: invalid NIfTI volume: {source}", .path.display())]
    Nifti {
        path: PathBuf,
        #[source]
        source: nifti::NiftiError,
    },

    #[error("{}: expected a 3D volume, found {ndim} dimension(s)", .path.display())]
    NotVolumetric { path: PathBuf, ndim: usize },

    #[error("{}: no valid DICOM images found", .path.display())]
    NoValidImages { path: PathBuf },

    #[error("{}: inconsistent image dimensions", .path.display())]
    InconsistentDimensions { path: PathBuf },

    #[error("{}: missing spacing information", .path.display())]
    MissingSpacing { path: PathBuf },

    #[error("{}: invalid DICOM file: {source}", .path.display())]
    Dicom {
        path: PathBuf,
        #[source]
        source: dicom::object::ReadError,
    },
}

impl LoadError {
    /// The file or directory that failed to load.
    pub fn path(&self) -> &Path {
        match self {
            LoadError::NotFound { path }
            | LoadError::UnsupportedFormat { path }
            | LoadError::Io { path, .. }
            | LoadError::Nifti { path, .. }
            | LoadError::NotVolumetric { path, .. }
            | LoadError::NoValidImages { path }
            | LoadError::InconsistentDimensions { path }
            | LoadError::MissingSpacing { path }
            | LoadError::Dicom { path, .. } => path,
        }
    }
}

/// Reads volumes from disk and brings them into display orientation.
///
/// NIfTI files (`.nii`, `.nii.gz`) are read directly; a directory is read as
/// a series of `.dcm` slices.
#[derive(Clone, Debug, Default)]
pub struct VolumeLoader {
    transform: DisplayTransform,
    sort_by: SortBy,
}

impl VolumeLoader {
    pub fn new(transform: DisplayTransform) -> Self {
        Self {
            transform,
            sort_by: SortBy::default(),
        }
    }

    /// Slice ordering used for DICOM directories.
    pub fn with_sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn transform(&self) -> &DisplayTransform {
        &self.transform
    }

    /// Load a volume and apply the display transform
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] naming `path` if it is missing, unreadable or
    /// not a 3D volume.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Volume, LoadError> {
        let path = path.as_ref();
        let volume = self.load_in_file_order(path)?;
        debug!(
            "loaded {} with shape {:?} and spacing {:?}",
            path.display(),
            volume.dim(),
            volume.spacing()
        );
        Ok(volume.reoriented(&self.transform))
    }

    /// Load a volume with axes in file order (x, y, z)
    pub fn load_in_file_order(&self, path: &Path) -> Result<Volume, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound {
                path: path.to_owned(),
            });
        }
        if path.is_dir() {
            return Self::load_dicom_directory(path, self.sort_by);
        }
        if Self::is_nifti(path) {
            return Self::load_nifti(path);
        }
        Err(LoadError::UnsupportedFormat {
            path: path.to_owned(),
        })
    }

    fn is_nifti(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_ascii_lowercase())
            .is_some_and(|name| name.ends_with(".nii") || name.ends_with(".nii.gz"))
    }

    fn load_nifti(path: &Path) -> Result<Volume, LoadError> {
        let nifti_error = |source| LoadError::Nifti {
            path: path.to_owned(),
            source,
        };
        let object = ReaderOptions::new().read_file(path).map_err(nifti_error)?;

        let header = object.header();
        let ndim = header.dim[0] as usize;
        if ndim < 3 {
            return Err(LoadError::NotVolumetric {
                path: path.to_owned(),
                ndim,
            });
        }
        let spacing =
            Self::sanitize_spacing(path, [header.pixdim[1], header.pixdim[2], header.pixdim[3]]);
        let (origin, direction) = Self::nifti_geometry(header);

        let mut array = object
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(nifti_error)?;
        // Time series and vector volumes: keep the first frame.
        while array.ndim() > 3 {
            let last = array.ndim() - 1;
            array = array.index_axis_move(Axis(last), 0);
        }
        let data = array
            .into_dimensionality::<Ix3>()
            .map_err(|_| LoadError::NotVolumetric {
                path: path.to_owned(),
                ndim,
            })?;

        Ok(Volume::with_geometry(
            data.as_standard_layout().into_owned(),
            spacing,
            origin,
            direction,
        ))
    }

    /// Axis-aligned origin and step signs. Rotations in the header are ignored.
    fn nifti_geometry(header: &NiftiHeader) -> ([f32; 3], [f32; 3]) {
        let sign = |v: f32| if v < 0.0 { -1.0 } else { 1.0 };
        if header.sform_code > 0 {
            let rows = [header.srow_x, header.srow_y, header.srow_z];
            let origin = rows.map(|row| row[3]);
            let direction = std::array::from_fn(|a| sign(rows[a][a]));
            (origin, direction)
        } else if header.qform_code > 0 {
            let origin = [header.quatern_x, header.quatern_y, header.quatern_z];
            (origin, [1.0, 1.0, sign(header.pixdim[0])])
        } else {
            ([0.0; 3], [1.0; 3])
        }
    }

    fn sanitize_spacing(path: &Path, spacing: [f32; 3]) -> [f32; 3] {
        spacing.map(|s| {
            if s.is_finite() && s > 0.0 {
                s
            } else {
                warn!("{}: invalid voxel size {s}, using 1.0", path.display());
                1.0
            }
        })
    }

    /// Load a volume from a directory containing .dcm files
    fn load_dicom_directory(path: &Path, sort_by: SortBy) -> Result<Volume, LoadError> {
        let io_error = |source| LoadError::Io {
            path: path.to_owned(),
            source,
        };
        let paths: Vec<_> = fs::read_dir(path)
            .map_err(io_error)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(LoadError::NoValidImages {
                path: path.to_owned(),
            });
        }

        let objects = paths
            .par_iter()
            .map(|file| {
                open_file(file).map_err(|source| LoadError::Dicom {
                    path: file.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::load_dicom_objects(path, &objects, sort_by)
    }

    fn load_dicom_objects(
        path: &Path,
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Volume, LoadError> {
        let mut slices: Vec<_> = dicom_objects
            .par_iter()
            .filter_map(|dicom_object| Self::extract_slice(dicom_object, &sort_by))
            .collect();

        if slices.is_empty() {
            return Err(LoadError::NoValidImages {
                path: path.to_owned(),
            });
        }

        Self::sort_slices(&mut slices, sort_by);
        Self::validate_dimensions(path, &slices)?;

        let geometry = Self::dicom_geometry(dicom_objects, &slices).ok_or_else(|| {
            LoadError::MissingSpacing {
                path: path.to_owned(),
            }
        })?;
        // Slices stack as (z, y, x); bring them into file order.
        let data = Self::build_volume_array(&slices)
            .permuted_axes([2, 1, 0])
            .as_standard_layout()
            .into_owned();

        Ok(Volume::with_geometry(
            data,
            Self::sanitize_spacing(path, geometry.spacing),
            geometry.origin,
            geometry.direction,
        ))
    }

    fn extract_slice(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<DicomSlice> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let image = Self::decode_image(dicom_object)?;
        Some(DicomSlice {
            order,
            position: Self::image_position(dicom_object),
            image,
        })
    }

    fn image_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<[f32; 3]> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float32()
            .ok()?;
        Some([*pos.first()?, *pos.get(1)?, *pos.get(2)?])
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                Self::image_position(dicom_object).map(|pos| Some(pos[2]))
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    /// Stored values with the modality rescale applied, no VOI windowing.
    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    /// Ascending sort key; slices without a key keep their relative order.
    fn sort_slices(slices: &mut [DicomSlice], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    fn validate_dimensions(path: &Path, slices: &[DicomSlice]) -> Result<(), LoadError> {
        let first_dim = slices[0].image.dim();
        if slices.iter().any(|slice| slice.image.dim() != first_dim) {
            return Err(LoadError::InconsistentDimensions {
                path: path.to_owned(),
            });
        }
        Ok(())
    }

    fn build_volume_array(slices: &[DicomSlice]) -> Array3<f32> {
        let (height, width) = slices[0].image.dim();
        let depth = slices.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&slice.image);
        }

        volume
    }

    /// Axis-aligned geometry in file order (x = column, y = row, z = slice).
    ///
    /// Patient coordinates (LPS) are mapped to the NIfTI world frame (RAS).
    /// The slice step is the distance between the first and last
    /// ImagePositionPatient, falling back to SliceThickness.
    fn dicom_geometry(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        slices: &[DicomSlice],
    ) -> Option<DicomGeometry> {
        let pixel_spacing = dicom_objects.iter().find_map(|dicom_object| {
            dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float32()
                .ok()
        })?;
        let (row_spacing, column_spacing) = (*pixel_spacing.first()?, *pixel_spacing.get(1)?);

        let sign = |v: f32| if v < 0.0 { -1.0 } else { 1.0 };
        let in_plane = dicom_objects
            .iter()
            .find_map(|dicom_object| {
                let cosines = dicom_object
                    .element(tags::IMAGE_ORIENTATION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some([sign(*cosines.first()?), sign(*cosines.get(4)?)])
            })
            .unwrap_or([1.0, 1.0]);

        let first = slices.first().and_then(|slice| slice.position);
        let last = slices.last().and_then(|slice| slice.position);
        let step = match (first, last) {
            (Some(first), Some(last)) if slices.len() > 1 && last[2] != first[2] => {
                let extent = last[2] - first[2];
                Some((extent.abs() / (slices.len() - 1) as f32, sign(extent)))
            }
            _ => None,
        };
        let (slice_spacing, slice_direction) = match step {
            Some(step) => step,
            None => {
                let thickness = dicom_objects.iter().find_map(|dicom_object| {
                    dicom_object
                        .element(tags::SLICE_THICKNESS)
                        .ok()?
                        .to_float32()
                        .ok()
                })?;
                (thickness, 1.0)
            }
        };

        let origin = first.map_or([0.0; 3], |[x, y, z]| [-x, -y, z]);
        Some(DicomGeometry {
            spacing: [column_spacing, row_spacing, slice_spacing],
            origin,
            direction: [-in_plane[0], -in_plane[1], slice_direction],
        })
    }
}

struct DicomSlice {
    order: Option<f32>,
    position: Option<[f32; 3]>,
    image: Array2<f32>,
}

struct DicomGeometry {
    spacing: [f32; 3],
    origin: [f32; 3],
    direction: [f32; 3],
}
