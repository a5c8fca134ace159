//! Reader configuration: per-modality input sections and the task schema.
//!
//! Configuration is read from YAML:
//!
//! ```yaml
//! modalities:
//!   T1:    { csv_file: t1.csv, interp_order: 3, pixdim: [1.0, 1.0, 1.0], axcodes: RAS }
//!   label: { csv_file: seg.csv, interp_order: 0 }
//! task:
//!   image: [T1]
//!   label: [label]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::VolsetError;
use crate::manifest::Manifest;

/// Configuration of one input modality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Manifest listing `subject_id,path` rows for this modality.
    pub csv_file: PathBuf,

    /// Interpolation order used when this modality is resampled.
    #[serde(default)]
    pub interp_order: i32,

    /// Target pixel spacing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixdim: Option<Vec<f64>>,

    /// Target axis orientation code (e.g. "RAS").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axcodes: Option<String>,
}

impl FieldSpec {
    pub fn new(csv_file: impl Into<PathBuf>, interp_order: i32) -> Self {
        Self {
            csv_file: csv_file.into(),
            interp_order,
            pixdim: None,
            axcodes: None,
        }
    }

    pub fn with_pixdim(mut self, pixdim: Vec<f64>) -> Self {
        self.pixdim = Some(pixdim);
        self
    }

    pub fn with_axcodes(mut self, axcodes: impl Into<String>) -> Self {
        self.axcodes = Some(axcodes.into());
        self
    }
}

/// Input sections keyed by modality name.
pub type DataConfig = BTreeMap<String, FieldSpec>;

/// Which modalities feed each logical field, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskSchema {
    fields: Vec<(String, Vec<String>)>,
}

impl TaskSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the modality list of a field.
    pub fn with_field<I, S>(mut self, field: impl Into<String>, modalities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let field = field.into();
        let modalities: Vec<String> = modalities.into_iter().map(Into::into).collect();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = modalities,
            None => self.fields.push((field, modalities)),
        }
        self
    }

    /// Modalities of a field, or `None` if the field is not declared.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, mods)| mods.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(name, mods)| (name.as_str(), mods.as_slice()))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for TaskSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, modalities) in &self.fields {
            map.serialize_entry(field, modalities)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TaskSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TaskVisitor;

        impl<'de> Visitor<'de> for TaskVisitor {
            type Value = TaskSchema;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to modality lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<TaskSchema, A::Error> {
                let mut schema = TaskSchema::new();
                while let Some((field, modalities)) =
                    map.next_entry::<String, Option<ModalityList>>()?
                {
                    let modalities = modalities.map(|m| m.0).unwrap_or_default();
                    schema = schema.with_field(field, modalities);
                }
                Ok(schema)
            }
        }

        deserializer.deserialize_map(TaskVisitor)
    }
}

/// A modality list written either as `[a, b]` or as a single `a`.
struct ModalityList(Vec<String>);

impl<'de> Deserialize<'de> for ModalityList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(name) => ModalityList(vec![name]),
            Raw::Many(names) => ModalityList(names),
        })
    }
}

/// A complete reader configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub modalities: DataConfig,
    #[serde(default)]
    pub task: TaskSchema,
}

impl ReaderConfig {
    /// Reads a YAML configuration file.
    ///
    /// Relative `csv_file` entries are resolved against the directory that
    /// contains the configuration file.
    pub fn from_yaml_path(path: &Path) -> Result<Self, VolsetError> {
        let text = fs::read_to_string(path).map_err(VolsetError::Io)?;
        let mut config: ReaderConfig =
            serde_yaml::from_str(&text).map_err(|source| VolsetError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(base) = path.parent() {
            for spec in config.modalities.values_mut() {
                if spec.csv_file.is_relative() {
                    spec.csv_file = base.join(&spec.csv_file);
                }
            }
        }

        Ok(config)
    }

    /// Parses a YAML configuration from a string; paths are kept as written.
    pub fn from_yaml_str(text: &str) -> Result<Self, VolsetError> {
        serde_yaml::from_str(text).map_err(|source| VolsetError::ConfigParse {
            path: PathBuf::from("<string>"),
            source,
        })
    }

    /// Fields of the task schema that have at least one modality.
    pub fn active_fields(&self) -> Vec<String> {
        self.task
            .iter()
            .filter(|(_, mods)| !mods.is_empty())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Manifests for every modality used by the active fields, in first-use
    /// order.
    pub fn manifests(&self) -> Result<Vec<Manifest>, VolsetError> {
        let names = self.active_fields();
        manifests_for(&names, &self.task, &self.modalities)
    }
}

/// Collects the manifests feeding `fields`, in first-use order.
///
/// Each modality appears once even if several fields share it.
pub(crate) fn manifests_for(
    fields: &[String],
    task: &TaskSchema,
    data: &DataConfig,
) -> Result<Vec<Manifest>, VolsetError> {
    let mut manifests: Vec<Manifest> = Vec::new();
    for field in fields {
        for modality in task.get(field).unwrap_or_default() {
            let spec = data.get(modality).ok_or_else(|| {
                VolsetError::Configuration(format!(
                    "reader field [{}] requires [{}], however it is not specified as a \
                     section in the config, current input section names: [{}]",
                    field,
                    modality,
                    data.keys().cloned().collect::<Vec<_>>().join(", ")
                ))
            })?;
            if !manifests.iter().any(|m| m.modality == *modality) {
                manifests.push(Manifest::new(modality.clone(), spec.csv_file.clone()));
            }
        }
    }
    Ok(manifests)
}
