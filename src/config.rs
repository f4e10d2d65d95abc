//! Case manifest: which files make up a case and how they are prepared.
//!
//! Every field has a default, so an empty JSON object (or no manifest at
//! all) describes the bundled `data/C3L-00016` layout.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::SortBy;
use crate::overlay::ColorTable;
use crate::segmentation::LabelRemap;
use crate::volume::DisplayTransform;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: invalid case manifest: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A named file inside the case directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeEntry {
    pub name: String,
    pub file: PathBuf,
}

impl VolumeEntry {
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaseConfig {
    /// Directory relative file names are resolved against.
    pub data_dir: PathBuf,
    /// Modality whose grid every other volume is aligned to.
    pub reference: String,
    pub modalities: Vec<VolumeEntry>,
    pub segmentations: Vec<VolumeEntry>,
    /// Name of the all-background overlay option, listed first. `None`
    /// leaves it out.
    pub none_option: Option<String>,
    /// Overlay shown on page load; the first option when unset.
    pub default_overlay: Option<String>,
    pub label_remap: LabelRemap,
    pub colors: ColorTable,
    pub display: DisplayTransform,
    pub dicom_sort: SortBy,
}

impl Default for CaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/C3L-00016"),
            reference: "T1".to_owned(),
            modalities: vec![
                VolumeEntry::new("T1", "t1.nii.gz"),
                VolumeEntry::new("T1ce", "t1ce.nii.gz"),
                VolumeEntry::new("T2", "t2.nii.gz"),
                VolumeEntry::new("FLAIR", "flair.nii.gz"),
            ],
            segmentations: vec![
                VolumeEntry::new("Consensus", "tumor-seg-consensus.nii.gz"),
                VolumeEntry::new("Seibert", "tumor-seg-seibert.nii.gz"),
                VolumeEntry::new("Rudie", "tumor-seg-rudie.nii.gz"),
                VolumeEntry::new("Ziseen", "tumor-seg-ziseen.nii.gz"),
            ],
            none_option: Some("None".to_owned()),
            default_overlay: Some("Consensus".to_owned()),
            label_remap: LabelRemap::default(),
            colors: ColorTable::default(),
            display: DisplayTransform::default(),
            dicom_sort: SortBy::default(),
        }
    }
}

impl CaseConfig {
    /// Reads a JSON manifest. A relative `data_dir` is taken relative to
    /// the manifest's own directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut config: CaseConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?;

        if config.data_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.data_dir = parent.join(&config.data_dir);
            }
        }
        Ok(config)
    }

    /// Absolute files are used as-is; relative ones live under `data_dir`.
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_owned()
        } else {
            self.data_dir.join(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::LabelMapping;

    #[test]
    fn empty_manifest_uses_defaults() {
        let config: CaseConfig = serde_json::from_str("{}").expect("valid manifest");
        assert_eq!(config, CaseConfig::default());
        assert!(config.label_remap.is_identity());
    }

    #[test]
    fn manifest_overrides_selected_fields() {
        let config: CaseConfig = serde_json::from_str(
            r#"{
                "reference": "FLAIR",
                "modalities": [{"name": "FLAIR", "file": "flair.nii.gz"}],
                "segmentations": [{"name": "Rater A", "file": "a.nii.gz"}],
                "none_option": null,
                "label_remap": [{"from": 3, "to": 1}],
                "colors": [[0, 255, 0, 80]],
                "display": {"axes": [0, 1, 2]}
            }"#,
        )
        .expect("valid manifest");

        assert_eq!(config.reference, "FLAIR");
        assert_eq!(config.none_option, None);
        assert_eq!(config.label_remap.mappings(), &[LabelMapping { from: 3, to: 1 }]);
        assert_eq!(config.colors.colors(), &[[0, 255, 0, 80]]);
        assert_eq!(config.display, DisplayTransform::identity());
        assert_eq!(config.data_dir, PathBuf::from("data/C3L-00016"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<CaseConfig, _> = serde_json::from_str(r#"{"refrence": "T1"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn relative_files_resolve_under_data_dir() {
        let config = CaseConfig::default();
        assert_eq!(
            config.resolve(Path::new("t1.nii.gz")),
            PathBuf::from("data/C3L-00016/t1.nii.gz")
        );
    }
}
