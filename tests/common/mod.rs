#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};
use volset::{
    DataConfig, ElementKind, FieldSpec, ImageHandle, ImageProperties, Result, TaskSchema,
    VolsetError,
};

/// Spatial extent of every synthetic volume.
pub const SIDE: usize = 3;

/// An image whose voxels all equal the subject number encoded in its file
/// name (`s<N>_<modality>.vol`), one channel per modality.
#[derive(Debug)]
pub struct SyntheticImage {
    pub properties: ImageProperties,
    pub value: f32,
    pub kind: ElementKind,
}

impl ImageHandle for SyntheticImage {
    fn shape(&self) -> Vec<usize> {
        vec![SIDE, SIDE, SIDE, self.properties.file_paths.len()]
    }

    fn element_kind(&self) -> ElementKind {
        self.kind
    }

    fn interp_order(&self) -> &[i32] {
        &self.properties.interp_orders
    }

    fn get_data(&self) -> Result<ArrayD<f32>> {
        Ok(ArrayD::from_elem(IxDyn(&self.shape()), self.value))
    }
}

/// Parses the subject number out of `s<N>_...`.
pub fn subject_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix('s')?.split('_').next()?;
    digits.parse().ok()
}

/// Factory for [`SyntheticImage`]; label-like modalities are unsigned.
pub fn synthetic_factory(properties: ImageProperties) -> Result<Box<dyn ImageHandle>> {
    let first = properties
        .file_paths
        .first()
        .cloned()
        .unwrap_or_default();
    let value = subject_number(&first).ok_or_else(|| VolsetError::Image {
        path: first.clone(),
        message: "not a synthetic volume name".to_string(),
    })?;
    let kind = if properties.modalities.iter().any(|m| m.starts_with("seg")) {
        ElementKind::Unsigned
    } else {
        ElementKind::Float
    };
    Ok(Box::new(SyntheticImage {
        properties,
        value: value as f32,
        kind,
    }))
}

/// Writes one manifest listing `subjects` for `modality`.
pub fn write_manifest(dir: &Path, modality: &str, subjects: &[u32]) -> PathBuf {
    let path = dir.join(format!("{modality}.csv"));
    let mut contents = String::new();
    for s in subjects {
        contents.push_str(&format!("s{s},{}\n", volume_path(dir, *s, modality).display()));
    }
    fs::write(&path, contents).expect("write manifest");
    path
}

pub fn volume_path(dir: &Path, subject: u32, modality: &str) -> PathBuf {
    dir.join(format!("s{subject}_{modality}.vol"))
}

/// A two-field dataset: `image` from T1 + FLAIR, `label` from seg.
pub struct Fixture {
    pub data: DataConfig,
    pub task: TaskSchema,
}

pub fn fixture(dir: &Path, subjects: &[u32]) -> Fixture {
    fixture_with(dir, subjects, subjects, subjects)
}

pub fn fixture_with(dir: &Path, t1: &[u32], flair: &[u32], seg: &[u32]) -> Fixture {
    let mut data = DataConfig::new();
    data.insert(
        "T1".to_string(),
        FieldSpec::new(write_manifest(dir, "T1", t1), 3).with_pixdim(vec![1.0, 1.0, 1.0]),
    );
    data.insert(
        "FLAIR".to_string(),
        FieldSpec::new(write_manifest(dir, "FLAIR", flair), 3),
    );
    data.insert(
        "seg".to_string(),
        FieldSpec::new(write_manifest(dir, "seg", seg), 0).with_axcodes("RAS"),
    );
    let task = TaskSchema::new()
        .with_field("image", ["T1", "FLAIR"])
        .with_field("label", ["seg"]);
    Fixture { data, task }
}

/// Writes a YAML reader configuration next to the manifests.
pub fn write_config(dir: &Path, subjects: &[u32]) -> PathBuf {
    write_manifest(dir, "T1", subjects);
    write_manifest(dir, "seg", subjects);
    let path = dir.join("reader.yaml");
    fs::write(
        &path,
        "modalities:\n  T1: { csv_file: T1.csv, interp_order: 3 }\n  seg: { csv_file: seg.csv, interp_order: 0 }\ntask:\n  image: [T1]\n  label: [seg]\n",
    )
    .expect("write config");
    path
}
