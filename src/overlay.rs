//! Segmentation overlays and the selector that hands them to the viewer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::{ImageBuffer, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collection::NamedCollection;
use crate::enums::Orientation;
use crate::segmentation::Segmentation;

/// Semi-transparent yellow for label 1, red for label 2.
pub const DEFAULT_OVERLAY_COLORS: [[u8; 4]; 2] = [[255, 255, 0, 50], [255, 0, 0, 100]];

/// RGBA colors for labels `1..`. Label 0 is always transparent; labels past
/// the end of the table wrap around.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorTable(Vec<[u8; 4]>);

impl Default for ColorTable {
    fn default() -> Self {
        Self(DEFAULT_OVERLAY_COLORS.to_vec())
    }
}

impl ColorTable {
    pub fn new(colors: Vec<[u8; 4]>) -> Self {
        Self(colors)
    }

    pub fn colors(&self) -> &[[u8; 4]] {
        &self.0
    }

    pub fn color_for(&self, label: u8) -> Rgba<u8> {
        if label == 0 || self.0.is_empty() {
            return Rgba([0, 0, 0, 0]);
        }
        Rgba(self.0[(label as usize - 1) % self.0.len()])
    }

    fn lookup_table(&self) -> [Rgba<u8>; 256] {
        std::array::from_fn(|l| self.color_for(l as u8))
    }
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("an overlay selector needs at least one segmentation")]
    Empty,

    #[error("segmentation '{name}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
}

/// Handle to one overlay option, issued by an [`OverlaySelector`].
///
/// A key remembers which selector issued it; any other selector rejects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OverlayKey {
    selector: u64,
    index: usize,
}

/// Overlay payload for the renderer: one segmentation and its colors.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayData {
    segmentation: Arc<Segmentation>,
    colors: ColorTable,
}

impl OverlayData {
    pub fn segmentation(&self) -> &Segmentation {
        &self.segmentation
    }

    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    /// Renders one slice of the overlay as RGBA.
    pub fn slice_image(&self, index: usize, orientation: Orientation) -> Option<RgbaImage> {
        let slice = self.segmentation.get_slice_from_axis(index, orientation)?;
        let (height, width) = slice.dim();
        let lut = self.colors.lookup_table();
        let pixel_data: Vec<u8> = slice
            .iter()
            .flat_map(|&label| lut[label as usize].0)
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }
}

/// Typed lookup from option names to overlay payloads.
///
/// All segmentations are checked to share one shape when the selector is
/// built.
#[derive(Debug)]
pub struct OverlaySelector {
    id: u64,
    entries: Vec<(String, Arc<Segmentation>)>,
    colors: ColorTable,
}

static NEXT_SELECTOR_ID: AtomicU64 = AtomicU64::new(0);

impl OverlaySelector {
    pub fn new(
        segmentations: NamedCollection<Segmentation>,
        colors: ColorTable,
    ) -> Result<Self, OverlayError> {
        let entries: Vec<_> = segmentations
            .into_iter()
            .map(|(name, segmentation)| (name, Arc::new(segmentation)))
            .collect();

        let expected = entries.first().ok_or(OverlayError::Empty)?.1.dim();
        if let Some((name, segmentation)) = entries.iter().find(|(_, s)| s.dim() != expected) {
            return Err(OverlayError::ShapeMismatch {
                name: name.clone(),
                expected,
                actual: segmentation.dim(),
            });
        }

        Ok(Self {
            id: NEXT_SELECTOR_ID.fetch_add(1, Ordering::Relaxed),
            entries,
            colors,
        })
    }

    fn issue(&self, index: usize) -> OverlayKey {
        OverlayKey {
            selector: self.id,
            index,
        }
    }

    fn entry(&self, key: OverlayKey) -> Option<&(String, Arc<Segmentation>)> {
        if key.selector != self.id {
            return None;
        }
        self.entries.get(key.index)
    }

    /// Options in display order.
    pub fn options(&self) -> impl Iterator<Item = (OverlayKey, &str)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (self.issue(i), name.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn key(&self, name: &str) -> Option<OverlayKey> {
        self.entries
            .iter()
            .position(|(n, _)| n == name)
            .map(|index| self.issue(index))
    }

    /// `None` for keys issued by another selector.
    pub fn name(&self, key: OverlayKey) -> Option<&str> {
        self.entry(key).map(|(name, _)| name.as_str())
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.entries[0].1.dim()
    }

    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The overlay payload for `key`. Pure: the same key always yields an
    /// equal payload sharing the same label data. `None` for keys issued by
    /// another selector.
    pub fn select(&self, key: OverlayKey) -> Option<OverlayData> {
        self.entry(key).map(|(_, segmentation)| OverlayData {
            segmentation: Arc::clone(segmentation),
            colors: self.colors.clone(),
        })
    }
}
