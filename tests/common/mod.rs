#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::tags;
use flate2::Compression;
use flate2::write::GzEncoder;
use ndarray::{Array2, Array3};

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;
const DT_FLOAT32: i16 = 16;

const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

/// Writes a single-file NIfTI-1 volume of `f32` voxels.
///
/// `data` is indexed in file order (x, y, z). With an `origin` the header
/// carries an axis-aligned sform; without one, no orientation is stored.
/// Paths ending in `.gz` are gzip compressed.
pub fn write_nifti(path: &Path, data: &Array3<f32>, spacing: [f32; 3], origin: Option<[f32; 3]>) {
    let mut header = nifti_header(data.dim(), 1, spacing);

    if let Some(origin) = origin {
        put(&mut header, 254, &1i16.to_le_bytes());
        for row in 0..3 {
            let mut values = [0.0f32; 4];
            values[row] = spacing[row];
            values[3] = origin[row];
            for (i, v) in values.iter().enumerate() {
                put(&mut header, 280 + row * 16 + i * 4, &v.to_le_bytes());
            }
        }
    }

    write_volume(path, header, &[data]);
}

/// Writes a volume whose only orientation is a qform with identity rotation,
/// offset `origin` and slice direction `qfac`.
pub fn write_nifti_qform(
    path: &Path,
    data: &Array3<f32>,
    spacing: [f32; 3],
    origin: [f32; 3],
    qfac: f32,
) {
    let mut header = nifti_header(data.dim(), 1, spacing);
    put(&mut header, 76, &qfac.to_le_bytes());
    put(&mut header, 252, &1i16.to_le_bytes());
    for (i, v) in origin.iter().enumerate() {
        put(&mut header, 268 + i * 4, &v.to_le_bytes());
    }
    write_volume(path, header, &[data]);
}

/// Writes a 4D time series, one frame per entry.
pub fn write_nifti_frames(path: &Path, frames: &[Array3<f32>], spacing: [f32; 3]) {
    let header = nifti_header(frames[0].dim(), frames.len(), spacing);
    let frames: Vec<_> = frames.iter().collect();
    write_volume(path, header, &frames);
}

fn put(header: &mut [u8; HEADER_SIZE], offset: usize, bytes: &[u8]) {
    header[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn nifti_header(
    (nx, ny, nz): (usize, usize, usize),
    frames: usize,
    spacing: [f32; 3],
) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    put(&mut header, 0, &(HEADER_SIZE as i32).to_le_bytes());

    let ndim = if frames > 1 { 4 } else { 3 };
    let dim: [i16; 8] = [ndim, nx as i16, ny as i16, nz as i16, frames as i16, 1, 1, 1];
    for (i, d) in dim.iter().enumerate() {
        put(&mut header, 40 + i * 2, &d.to_le_bytes());
    }

    put(&mut header, 70, &DT_FLOAT32.to_le_bytes());
    put(&mut header, 72, &32i16.to_le_bytes());

    let pixdim: [f32; 8] = [1.0, spacing[0], spacing[1], spacing[2], 1.0, 1.0, 1.0, 1.0];
    for (i, p) in pixdim.iter().enumerate() {
        put(&mut header, 76 + i * 4, &p.to_le_bytes());
    }

    put(&mut header, 108, &(VOX_OFFSET as f32).to_le_bytes());
    put(&mut header, 112, &1.0f32.to_le_bytes());
    put(&mut header, 116, &0.0f32.to_le_bytes());
    put(&mut header, 344, b"n+1\0");
    header
}

fn write_volume(path: &Path, header: [u8; HEADER_SIZE], frames: &[&Array3<f32>]) {
    let mut bytes = Vec::with_capacity(VOX_OFFSET + frames.len() * frames[0].len() * 4);
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&[0u8; VOX_OFFSET - HEADER_SIZE]);
    for data in frames {
        let (nx, ny, nz) = data.dim();
        // x varies fastest on disk
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    bytes.extend_from_slice(&data[[x, y, z]].to_le_bytes());
                }
            }
        }
    }

    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes).expect("gzip in memory");
        bytes = encoder.finish().expect("gzip in memory");
    }
    fs::write(path, bytes).expect("should have written fixture");
}

/// One uncompressed 16-bit MR slice for a DICOM series fixture.
pub struct DicomSlice<'a> {
    pub pixels: &'a Array2<u16>,
    pub position: [f32; 3],
    pub instance: i32,
    pub pixel_spacing: [f32; 2],
    pub thickness: f32,
}

/// Writes `slice` as an explicit VR little endian DICOM file.
pub fn write_dicom_slice(path: &Path, slice: &DicomSlice<'_>) {
    let (rows, columns) = slice.pixels.dim();
    let mut object = InMemDicomObject::new_empty();
    object.put(DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(MR_IMAGE_STORAGE)));
    object.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(instance_uid(slice.instance)),
    ));
    object.put(DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("MR")));
    object.put(DataElement::new(
        tags::INSTANCE_NUMBER,
        VR::IS,
        PrimitiveValue::from(slice.instance.to_string()),
    ));
    object.put(DataElement::new(tags::IMAGE_POSITION_PATIENT, VR::DS, ds(&slice.position)));
    object.put(DataElement::new(
        tags::IMAGE_ORIENTATION_PATIENT,
        VR::DS,
        ds(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
    ));
    object.put(DataElement::new(tags::PIXEL_SPACING, VR::DS, ds(&slice.pixel_spacing)));
    object.put(DataElement::new(tags::SLICE_THICKNESS, VR::DS, ds(&[slice.thickness])));
    object.put(DataElement::new(tags::RESCALE_INTERCEPT, VR::DS, ds(&[0.0])));
    object.put(DataElement::new(tags::RESCALE_SLOPE, VR::DS, ds(&[1.0])));
    object.put(DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, us(1)));
    object.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from("MONOCHROME2"),
    ));
    object.put(DataElement::new(tags::ROWS, VR::US, us(rows as u16)));
    object.put(DataElement::new(tags::COLUMNS, VR::US, us(columns as u16)));
    object.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, us(16)));
    object.put(DataElement::new(tags::BITS_STORED, VR::US, us(16)));
    object.put(DataElement::new(tags::HIGH_BIT, VR::US, us(15)));
    object.put(DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, us(0)));
    object.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OW,
        PrimitiveValue::U16(slice.pixels.iter().copied().collect()),
    ));

    let file = object
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(MR_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(instance_uid(slice.instance)),
        )
        .expect("valid file meta");
    file.write_to_file(path).expect("should have written DICOM fixture");
}

fn ds(values: &[f32]) -> PrimitiveValue {
    PrimitiveValue::Strs(values.iter().map(f32::to_string).collect())
}

fn us(value: u16) -> PrimitiveValue {
    PrimitiveValue::from(value)
}

fn instance_uid(instance: i32) -> String {
    format!("1.2.826.0.1.3680043.2.1125.{instance}")
}

/// Labels 0..=3 arranged in slabs along x, so every label is present.
pub fn label_slabs(shape: (usize, usize, usize)) -> Array3<f32> {
    Array3::from_shape_fn(shape, |(x, _, _)| ((x * 4) / shape.0) as f32)
}

/// Smoothly varying intensities.
pub fn intensity_ramp(shape: (usize, usize, usize)) -> Array3<f32> {
    Array3::from_shape_fn(shape, |(x, y, z)| (x + 2 * y + 3 * z) as f32)
}

/// Writes a complete case under `dir`: a T1 reference, a coarser T2, and
/// consensus and rater segmentations. Returns the case directory.
pub fn write_case(dir: &Path, shape: (usize, usize, usize)) -> PathBuf {
    let half = (shape.0 / 2, shape.1 / 2, shape.2 / 2);
    write_nifti(&dir.join("t1.nii.gz"), &intensity_ramp(shape), [1.0; 3], None);
    write_nifti(&dir.join("t2.nii"), &intensity_ramp(half), [2.0; 3], None);
    write_nifti(
        &dir.join("tumor-seg-consensus.nii.gz"),
        &label_slabs(shape),
        [1.0; 3],
        None,
    );
    write_nifti(
        &dir.join("tumor-seg-rudie.nii.gz"),
        &label_slabs(half),
        [2.0; 3],
        None,
    );
    dir.to_owned()
}
