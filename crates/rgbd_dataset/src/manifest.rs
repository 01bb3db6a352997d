//! CSV manifest and class-list parsing.
//!
//! Manifest columns: `render,depth,segmentation,class,x_min,y_min,x_max,y_max`
//! with image paths relative to the dataset root. The class list has a single
//! `name` column; a class's label is its row index.

use crate::types::{DatasetError, DatasetResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRow {
    pub render: String,
    pub depth: String,
    pub segmentation: String,
    pub class: String,
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl ManifestRow {
    pub fn bbox(&self) -> [f32; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }
}

#[derive(Debug, Deserialize)]
struct ClassRow {
    name: String,
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> DatasetError + '_ {
    move |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

pub fn read_manifest(path: &Path) -> DatasetResult<Vec<ManifestRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err(path))?;
    let rows: DatasetResult<Vec<ManifestRow>> = reader
        .deserialize::<ManifestRow>()
        .map(|row| row.map_err(csv_err(path)))
        .collect();
    rows
}

pub fn read_classes(path: &Path) -> DatasetResult<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err(path))?;
    let classes: DatasetResult<Vec<String>> = reader
        .deserialize::<ClassRow>()
        .map(|row| row.map(|r| r.name).map_err(csv_err(path)))
        .collect();
    classes
}

/// Writes a manifest; used by tooling and tests to stage datasets.
pub fn write_manifest(path: &Path, rows: &[ManifestRow]) -> DatasetResult<()> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_err(path))?;
    for row in rows {
        writer.serialize(row).map_err(csv_err(path))?;
    }
    writer.flush().map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_classes(path: &Path, classes: &[&str]) -> DatasetResult<()> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_err(path))?;
    writer.write_record(["name"]).map_err(csv_err(path))?;
    for class in classes {
        writer.write_record([*class]).map_err(csv_err(path))?;
    }
    writer.flush().map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}
