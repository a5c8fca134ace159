//! The ordered set of multi-field records served by the reader.
//!
//! A catalog is built once (see [`build_catalog`]) and never mutated. The
//! per-field shape and numeric-kind hints are computed from the first record
//! on first use and cached for the catalog's lifetime.
//!
//! The cached shapes are a coarse schema hint: channel and time extents are
//! shared by every record, spatial extents are not (and randomised stages
//! may change them again downstream).

mod builder;

pub use builder::{build_catalog, LogProgress, NoProgress, ProgressSink};

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::{Result, VolsetError};
use crate::image::{ImageHandle, NumericKind};

/// Field-keyed map used throughout the crate.
pub type FieldMap<T> = BTreeMap<String, T>;

/// One multi-field record.
///
/// Field order is fixed by the task schema and identical for every record
/// in a catalog.
#[derive(Debug)]
pub struct Record {
    fields: Vec<(String, Box<dyn ImageHandle>)>,
}

impl Record {
    pub fn new(fields: Vec<(String, Box<dyn ImageHandle>)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&dyn ImageHandle> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, image)| image.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn ImageHandle)> {
        self.fields
            .iter()
            .map(|(name, image)| (name.as_str(), image.as_ref()))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Ordered records plus the subject id of each one.
#[derive(Debug, Default)]
pub struct ImageCatalog {
    field_names: Vec<String>,
    records: Vec<Record>,
    subject_ids: Vec<String>,
    shapes: OnceLock<FieldMap<Vec<usize>>>,
    dtypes: OnceLock<FieldMap<NumericKind>>,
}

impl ImageCatalog {
    /// Creates a catalog from records and their subject ids.
    ///
    /// # Errors
    /// Returns [`VolsetError::Configuration`] if the two lists differ in
    /// length or a record's field names differ from `field_names`.
    pub fn new(
        field_names: Vec<String>,
        records: Vec<Record>,
        subject_ids: Vec<String>,
    ) -> Result<Self> {
        if records.len() != subject_ids.len() {
            return Err(VolsetError::Configuration(format!(
                "{} records but {} subject ids",
                records.len(),
                subject_ids.len()
            )));
        }
        if let Some(index) = records
            .iter()
            .position(|record| !record.field_names().eq(field_names.iter().map(String::as_str)))
        {
            return Err(VolsetError::Configuration(format!(
                "record {} ({}) does not match the field schema [{}]",
                index,
                subject_ids[index],
                field_names.join(", ")
            )));
        }

        Ok(Self {
            field_names,
            records,
            subject_ids,
            shapes: OnceLock::new(),
            dtypes: OnceLock::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn subject_id(&self, index: usize) -> Option<&str> {
        self.subject_ids.get(index).map(String::as_str)
    }

    /// Shape of each field, read from the first record.
    ///
    /// # Errors
    /// Returns [`VolsetError::NotInitialised`] if the catalog is empty.
    pub fn shapes(&self) -> Result<&FieldMap<Vec<usize>>> {
        let first = self.records.first().ok_or(VolsetError::NotInitialised("shapes"))?;
        Ok(self.shapes.get_or_init(|| {
            first
                .iter()
                .map(|(field, image)| (field.to_string(), image.shape()))
                .collect()
        }))
    }

    /// Numeric kind of each field, inferred from the first record.
    ///
    /// # Errors
    /// Returns [`VolsetError::NotInitialised`] if the catalog is empty.
    pub fn dtype_hint(&self) -> Result<&FieldMap<NumericKind>> {
        let first = self
            .records
            .first()
            .ok_or(VolsetError::NotInitialised("dtype_hint"))?;
        Ok(self.dtypes.get_or_init(|| {
            first
                .iter()
                .map(|(field, image)| (field.to_string(), NumericKind::infer(image.element_kind())))
                .collect()
        }))
    }
}

impl<'a> IntoIterator for &'a ImageCatalog {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
