use std::sync::Arc;

use log::info;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::collection::{DuplicateName, NamedCollection};
use crate::config::CaseConfig;
use crate::enums::Interpolation;
use crate::overlay::{ColorTable, OverlayError, OverlayKey, OverlaySelector};
use crate::segmentation::{AlignError, Segmentation, SegmentationAligner};
use crate::volume::Volume;
use crate::volume_loader::{LoadError, VolumeLoader};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("reference '{0}' is not one of the configured modalities")]
    UnknownReference(String),

    #[error("default overlay '{0}' is not one of the overlay options")]
    UnknownDefaultOverlay(String),

    #[error(transparent)]
    DuplicateName(#[from] DuplicateName),

    #[error("failed to load modality '{name}'")]
    Modality {
        name: String,
        #[source]
        source: LoadError,
    },

    #[error("failed to prepare segmentation '{name}'")]
    Segmentation {
        name: String,
        #[source]
        source: AlignError,
    },

    #[error(transparent)]
    Overlay(#[from] OverlayError),
}

/// Everything the viewer serves, prepared once at startup and read-only
/// afterwards.
///
/// All modalities share the reference grid, and every overlay option has
/// the reference shape.
#[derive(Debug)]
pub struct AppContext {
    volumes: NamedCollection<Arc<Volume>>,
    reference_name: String,
    reference: Arc<Volume>,
    overlays: OverlaySelector,
    default_overlay: OverlayKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeSummary {
    pub name: String,
    pub shape: [usize; 3],
    pub spacing: [f32; 3],
}

/// What the page needs to build its controls.
#[derive(Debug, Clone, Serialize)]
pub struct CaseSummary {
    pub reference: String,
    pub volumes: Vec<VolumeSummary>,
    pub overlays: Vec<String>,
    pub default_overlay: String,
    pub colors: ColorTable,
}

impl AppContext {
    /// Loads and aligns every file a case names
    ///
    /// Modalities and segmentations are read in parallel. Modalities whose
    /// grid differs from the reference are resampled onto it trilinearly.
    pub fn load(config: &CaseConfig) -> Result<Self, ContextError> {
        let loader = VolumeLoader::new(config.display).with_sort_by(config.dicom_sort);

        let names = NamedCollection::try_from(
            config
                .modalities
                .iter()
                .map(|entry| (entry.name.clone(), ()))
                .collect::<Vec<_>>(),
        )?;
        let reference = names
            .position(&config.reference)
            .ok_or_else(|| ContextError::UnknownReference(config.reference.clone()))?;

        let loaded = config
            .modalities
            .par_iter()
            .map(|entry| {
                let path = config.resolve(&entry.file);
                info!("loading modality {} from {}", entry.name, path.display());
                loader
                    .load(&path)
                    .map(|volume| (entry.name.clone(), volume))
                    .map_err(|source| ContextError::Modality {
                        name: entry.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let reference_volume = &loaded[reference].1;

        let aligner =
            SegmentationAligner::new(loader.clone()).with_remap(config.label_remap.clone());
        let aligned = config
            .segmentations
            .par_iter()
            .map(|entry| {
                let path = config.resolve(&entry.file);
                info!("aligning segmentation {} from {}", entry.name, path.display());
                aligner
                    .align(&path, reference_volume)
                    .map(|segmentation| (entry.name.clone(), segmentation))
                    .map_err(|source| ContextError::Segmentation {
                        name: entry.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut segmentations = NamedCollection::new();
        if let Some(none) = &config.none_option {
            segmentations.push(none.clone(), Segmentation::empty_like(reference_volume))?;
        }
        for (name, segmentation) in aligned {
            segmentations.push(name, segmentation)?;
        }

        Self::from_parts(
            NamedCollection::try_from(loaded)?,
            &config.reference,
            segmentations,
            config.colors.clone(),
            config.default_overlay.as_deref(),
        )
    }

    /// Builds a context from volumes already in memory.
    ///
    /// Volumes off the reference grid are resampled onto it.
    pub fn from_parts(
        volumes: NamedCollection<Volume>,
        reference: &str,
        segmentations: NamedCollection<Segmentation>,
        colors: ColorTable,
        default_overlay: Option<&str>,
    ) -> Result<Self, ContextError> {
        let grid = volumes
            .get(reference)
            .map(Volume::grid)
            .ok_or_else(|| ContextError::UnknownReference(reference.to_owned()))?;

        let volumes = volumes.map(|name, volume| {
            Arc::new(if volume.grid().approx_eq(&grid) {
                volume
            } else {
                info!(
                    "resampling modality {name} from {:?} onto reference grid {:?}",
                    volume.dim(),
                    grid.shape
                );
                volume.resampled_onto(&grid, Interpolation::Trilinear)
            })
        });
        let reference_volume = volumes
            .get(reference)
            .cloned()
            .ok_or_else(|| ContextError::UnknownReference(reference.to_owned()))?;

        let overlays = OverlaySelector::new(segmentations, colors)?;
        if overlays.shape() != grid.shape {
            return Err(OverlayError::ShapeMismatch {
                name: overlays.names().next().unwrap_or_default().to_owned(),
                expected: grid.shape,
                actual: overlays.shape(),
            }
            .into());
        }

        let default_overlay = match default_overlay {
            Some(name) => overlays
                .key(name)
                .ok_or_else(|| ContextError::UnknownDefaultOverlay(name.to_owned()))?,
            None => overlays
                .options()
                .next()
                .map(|(key, _)| key)
                .ok_or(OverlayError::Empty)?,
        };

        Ok(Self {
            volumes,
            reference_name: reference.to_owned(),
            reference: reference_volume,
            overlays,
            default_overlay,
        })
    }

    pub fn volumes(&self) -> &NamedCollection<Arc<Volume>> {
        &self.volumes
    }

    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes.get(name).map(Arc::as_ref)
    }

    pub fn reference_name(&self) -> &str {
        &self.reference_name
    }

    pub fn reference(&self) -> &Volume {
        &self.reference
    }

    pub fn overlays(&self) -> &OverlaySelector {
        &self.overlays
    }

    pub fn default_overlay(&self) -> OverlayKey {
        self.default_overlay
    }

    pub fn summary(&self) -> CaseSummary {
        CaseSummary {
            reference: self.reference_name().to_owned(),
            volumes: self
                .volumes
                .iter()
                .map(|(name, volume)| {
                    let (d, h, w) = volume.dim();
                    VolumeSummary {
                        name: name.to_owned(),
                        shape: [d, h, w],
                        spacing: volume.spacing(),
                    }
                })
                .collect(),
            overlays: self.overlays.names().map(str::to_owned).collect(),
            default_overlay: self
                .overlays
                .name(self.default_overlay)
                .unwrap_or_default()
                .to_owned(),
            colors: self.overlays.colors().clone(),
        }
    }
}
