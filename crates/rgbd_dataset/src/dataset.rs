//! Indexable RGB-D dataset backed by a CSV manifest.

use crate::manifest::{read_classes, read_manifest, ManifestRow};
use crate::transform::TransformPipeline;
use crate::types::{DatasetError, DatasetResult, Raster, RgbdSample};
use image::DynamicImage;
use std::path::{Path, PathBuf};

pub const DEFAULT_MANIFEST: &str = "train.csv";
pub const DEFAULT_CLASSES: &str = "class.csv";

/// One pipeline per modality.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetTransforms {
    pub render: TransformPipeline,
    pub depth: TransformPipeline,
    pub segmentation: TransformPipeline,
}

impl DatasetTransforms {
    /// Square `size x size` outputs for every modality.
    pub fn for_size(size: usize) -> Self {
        let size = (size, size);
        Self {
            render: TransformPipeline::render(size),
            depth: TransformPipeline::depth(size),
            segmentation: TransformPipeline::segmentation(size),
        }
    }
}

impl Default for DatasetTransforms {
    fn default() -> Self {
        Self::for_size(256)
    }
}

#[derive(Debug, Clone)]
pub struct RgbdDataset {
    root: PathBuf,
    rows: Vec<ManifestRow>,
    labels: Vec<usize>,
    classes: Vec<String>,
    transforms: DatasetTransforms,
}

impl RgbdDataset {
    pub fn open(
        root: &Path,
        manifest_name: &str,
        class_name: &str,
        transforms: DatasetTransforms,
    ) -> DatasetResult<Self> {
        let manifest_path = root.join(manifest_name);
        let classes = read_classes(&root.join(class_name))?;
        let rows = read_manifest(&manifest_path)?;
        if rows.is_empty() {
            return Err(DatasetError::Empty(manifest_path));
        }
        let labels = rows
            .iter()
            .map(|row| resolve_label(&classes, &row.class, &manifest_path))
            .collect::<DatasetResult<Vec<_>>>()?;
        tracing::debug!(
            root = %root.display(),
            samples = rows.len(),
            classes = classes.len(),
            render = %transforms.render.describe(),
            "opened dataset"
        );
        Ok(Self {
            root: root.to_path_buf(),
            rows,
            labels,
            classes,
            transforms,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn transforms(&self) -> &DatasetTransforms {
        &self.transforms
    }

    pub fn get(&self, index: usize) -> DatasetResult<RgbdSample> {
        let row = self.rows.get(index).ok_or(DatasetError::OutOfRange {
            index,
            len: self.rows.len(),
        })?;
        let rgb = self
            .transforms
            .render
            .apply(&self.load_image(&row.render)?)?;
        let depth = self
            .transforms
            .depth
            .apply(&self.load_image(&row.depth)?)?;
        let mask = self
            .transforms
            .segmentation
            .apply(&self.load_image(&row.segmentation)?)?;
        self.check_mask(&mask, &row.segmentation)?;
        Ok(RgbdSample {
            rgb,
            depth,
            label: self.labels[index],
            bbox: row.bbox(),
            mask,
        })
    }

    /// Every mask pixel must name a known class.
    fn check_mask(&self, mask: &Raster, relative: &str) -> DatasetResult<()> {
        let classes = self.classes.len();
        match mask
            .data
            .iter()
            .find(|v| v.round() < 0.0 || v.round() as usize >= classes)
        {
            Some(&value) => Err(DatasetError::MaskIndex {
                path: self.root.join(relative),
                value,
                classes,
            }),
            None => Ok(()),
        }
    }

    fn load_image(&self, relative: &str) -> DatasetResult<DynamicImage> {
        let path = self.root.join(relative);
        image::open(&path).map_err(|source| DatasetError::Image { path, source })
    }
}

/// Class names resolve by position in the class list; bare indices are accepted.
fn resolve_label(classes: &[String], class: &str, manifest: &Path) -> DatasetResult<usize> {
    if let Some(idx) = classes.iter().position(|c| c == class) {
        return Ok(idx);
    }
    match class.parse::<usize>() {
        Ok(idx) if idx < classes.len() => Ok(idx),
        _ => Err(DatasetError::UnknownClass {
            path: manifest.to_path_buf(),
            class: class.to_string(),
            known: classes.len(),
        }),
    }
}
