//! The record reader: initialisation, stage management and indexed access.
//!
//! A [`VolumeReader`] goes through a strict two-phase lifecycle:
//!
//! 1. **Construct and fit** (`&mut self`): [`VolumeReader::initialise`]
//!    merges the manifests and builds the catalog, [`VolumeReader::add_stages`]
//!    appends stages and refits the data-dependent ones.
//! 2. **Serve** (`&self`): [`VolumeReader::access`] may be called from any
//!    number of threads.
//!
//! # Access modes
//!
//! | `index`   | `shuffle` | resolved index                     |
//! |-----------|-----------|------------------------------------|
//! | `Some(i)` | any       | `i`                                |
//! | `None`    | `true`    | uniform draw from `0..len`         |
//! | `None`    | `false`   | next value of the sequential cursor |
//!
//! An index outside `0..len` yields `Ok(None)`: the end of data for
//! sequential consumers, an invalid request for explicit ones.
//!
//! The sequential cursor starts at −1 and only ever grows; it is advanced
//! with an atomic increment, so concurrent sequential callers never receive
//! the same index twice, although the order in which they receive indices
//! is unspecified.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::catalog::{build_catalog, FieldMap, ImageCatalog, LogProgress, ProgressSink};
use crate::config::{manifests_for, DataConfig, TaskSchema};
use crate::error::{Result, VolsetError};
use crate::image::{ImageFactory, NumericKind};
use crate::manifest::{merge_manifests, MergeReport};
use crate::pipeline::{FieldData, InterpOrders, Mask, Pipeline, Stage};

/// How a single access picks its record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessRequest {
    /// An explicit index; negative values are always out of range.
    Index(i64),
    /// A uniformly random record.
    Random,
    /// The record after the last sequential access.
    Sequential,
}

impl AccessRequest {
    /// Maps the `(index, shuffle)` call convention onto a request.
    pub fn from_call(index: Option<i64>, shuffle: bool) -> Self {
        match (index, shuffle) {
            (Some(index), _) => AccessRequest::Index(index),
            (None, true) => AccessRequest::Random,
            (None, false) => AccessRequest::Sequential,
        }
    }

    /// Coerces a textual index. Anything that is not an integer becomes the
    /// out-of-range index −1 rather than an error.
    pub fn parse(raw: &str) -> Self {
        AccessRequest::Index(raw.trim().parse().unwrap_or(-1))
    }
}

/// One served record.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Catalog index that was actually served.
    pub index: usize,
    pub subject_id: String,
    /// Field arrays after every pipeline stage.
    pub data: FieldData,
    /// Interpolation orders of each field, as stored in the record.
    pub interp_orders: InterpOrders,
    /// Mask left by the last non-random stage, if any.
    pub mask: Option<Mask>,
}

/// Reads multi-field records and runs them through a stage pipeline.
#[derive(Debug)]
pub struct VolumeReader {
    names: Vec<String>,
    fields: Vec<String>,
    input_sources: Option<FieldMap<Vec<String>>>,
    catalog: Option<ImageCatalog>,
    merge_report: Option<MergeReport>,
    pipeline: Pipeline,
    cursor: AtomicI64,
    seed: Option<u64>,
    accesses: AtomicU64,
}

impl VolumeReader {
    /// Creates a reader for the requested field names (e.g. `["image", "label"]`).
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            fields: Vec::new(),
            input_sources: None,
            catalog: None,
            merge_report: None,
            pipeline: Pipeline::new(),
            cursor: AtomicI64::new(-1),
            seed: None,
            accesses: AtomicU64::new(0),
        }
    }

    /// Makes random index draws and randomised stages reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Merges the manifests of every active field and builds the catalog.
    ///
    /// A field is active if the task schema lists at least one modality for
    /// it. Nothing is changed on failure, except when the pipeline cannot be
    /// refitted against the previous catalog either; the reader is then left
    /// uninitialised.
    ///
    /// # Errors
    /// - [`VolsetError::Configuration`] if no names were requested or a
    ///   required input section is missing
    /// - [`VolsetError::EmptyFieldSet`] if no requested field is active
    /// - any merge, build or fit error
    pub fn initialise(
        &mut self,
        data: &DataConfig,
        task: &TaskSchema,
        factory: &dyn ImageFactory,
    ) -> Result<()> {
        self.initialise_with_progress(data, task, factory, &mut LogProgress::default())
    }

    /// [`initialise`](Self::initialise) with an explicit progress sink.
    pub fn initialise_with_progress(
        &mut self,
        data: &DataConfig,
        task: &TaskSchema,
        factory: &dyn ImageFactory,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        if self.names.is_empty() {
            log::error!("Please specify data names, this should be a subset of the task fields");
            return Err(VolsetError::Configuration(
                "no data names requested".to_string(),
            ));
        }

        let fields: Vec<(String, Vec<String>)> = self
            .names
            .iter()
            .filter_map(|name| {
                task.get(name)
                    .filter(|mods| !mods.is_empty())
                    .map(|mods| (name.clone(), mods.to_vec()))
            })
            .collect();
        if fields.is_empty() {
            return Err(VolsetError::EmptyFieldSet {
                requested: self.names.clone(),
            });
        }

        let active: Vec<String> = fields.iter().map(|(name, _)| name.clone()).collect();
        let manifests = manifests_for(&active, task, data)?;
        let (table, report) = merge_manifests(&manifests)?;
        let catalog = build_catalog(&table, &fields, data, factory, progress)?;

        for (name, modalities) in &fields {
            log::info!(
                "image reader: loading [{}] from {:?} ({})",
                name,
                modalities,
                catalog.len()
            );
        }

        if let Err(err) = self.pipeline.fit(&catalog) {
            self.restore_fit();
            return Err(err);
        }

        self.fields = active;
        self.input_sources = Some(fields.into_iter().collect());
        self.catalog = Some(catalog);
        self.merge_report = Some(report);
        self.reset_cursor();
        Ok(())
    }

    /// Refits the pipeline against the committed catalog after a failed fit.
    fn restore_fit(&mut self) {
        let Some(catalog) = &self.catalog else {
            return;
        };
        if let Err(err) = self.pipeline.fit(catalog) {
            log::error!("image reader: refit on the previous catalog failed: {}", err);
            self.fields.clear();
            self.input_sources = None;
            self.catalog = None;
            self.merge_report = None;
        }
    }

    /// Appends stages (or `None` placeholders) and refits the data-dependent
    /// stages against the catalog, if one has been built.
    ///
    /// On a fit error the appended stages are removed again and the
    /// remaining ones are refitted against the catalog.
    pub fn add_stages<I, S>(&mut self, stages: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<Option<Stage>>,
    {
        let previous = self.pipeline.len();
        self.pipeline.extend(stages.into_iter().map(Into::into));

        if let Some(catalog) = &self.catalog {
            if let Err(err) = self.pipeline.fit(catalog) {
                self.pipeline.truncate(previous);
                self.restore_fit();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Accesses one record using the `(index, shuffle)` convention.
    ///
    /// Returns `Ok(None)` when the resolved index is out of range.
    pub fn access(&self, index: Option<i64>, shuffle: bool) -> Result<Option<Sample>> {
        self.access_request(AccessRequest::from_call(index, shuffle))
    }

    /// Accesses one record.
    ///
    /// # Errors
    /// Returns [`VolsetError::NotInitialised`] before [`initialise`], and
    /// propagates image and stage errors unchanged. Errors affect only this
    /// access.
    ///
    /// [`initialise`]: Self::initialise
    pub fn access_request(&self, request: AccessRequest) -> Result<Option<Sample>> {
        let catalog = self
            .catalog
            .as_ref()
            .ok_or(VolsetError::NotInitialised("access"))?;
        let mut rng = self.access_rng();

        let index = match request {
            AccessRequest::Index(index) => index,
            AccessRequest::Random if catalog.is_empty() => -1,
            AccessRequest::Random => rng.random_range(0..catalog.len()) as i64,
            AccessRequest::Sequential => self.cursor.fetch_add(1, Ordering::SeqCst) + 1,
        };

        let Some((index, record)) = usize::try_from(index)
            .ok()
            .and_then(|i| catalog.get(i).map(|record| (i, record)))
        else {
            return Ok(None);
        };

        let mut data = FieldData::new();
        let mut interp_orders = InterpOrders::new();
        for (field, image) in record.iter() {
            data.insert(field.to_string(), image.get_data()?);
            interp_orders.insert(field.to_string(), image.interp_order().to_vec());
        }

        let mut mask = None;
        if !self.pipeline.is_empty() {
            (data, mask) = self.pipeline.apply(data, &interp_orders, &mut rng)?;
        }

        Ok(Some(Sample {
            index,
            subject_id: catalog.subject_id(index).unwrap_or_default().to_string(),
            data,
            interp_orders,
            mask,
        }))
    }

    /// Iterates over the remaining records in sequential mode.
    pub fn sequential(&self) -> SequentialSamples<'_> {
        SequentialSamples {
            reader: self,
            done: false,
        }
    }

    /// Moves the sequential cursor back before the first record.
    pub fn reset_cursor(&self) {
        self.cursor.store(-1, Ordering::SeqCst);
    }

    fn access_rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => {
                let n = self.accesses.fetch_add(1, Ordering::Relaxed);
                StdRng::seed_from_u64(seed ^ n.wrapping_mul(0x9E37_79B9_7F4A_7C15))
            }
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Per-field shape hint, read from the first record.
    pub fn shapes(&self) -> Result<&FieldMap<Vec<usize>>> {
        self.catalog
            .as_ref()
            .ok_or(VolsetError::NotInitialised("shapes"))?
            .shapes()
    }

    /// Per-field numeric kind, inferred from the first record.
    pub fn dtype_hint(&self) -> Result<&FieldMap<NumericKind>> {
        self.catalog
            .as_ref()
            .ok_or(VolsetError::NotInitialised("dtype_hint"))?
            .dtype_hint()
    }

    /// Modalities feeding each active field.
    pub fn input_sources(&self) -> Result<&FieldMap<Vec<String>>> {
        self.input_sources
            .as_ref()
            .ok_or(VolsetError::NotInitialised("input_sources"))
    }

    /// Active field names; empty before initialisation.
    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    /// Field names requested at construction.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn subject_id(&self, index: usize) -> Option<&str> {
        self.catalog.as_ref()?.subject_id(index)
    }

    pub fn len(&self) -> usize {
        self.catalog.as_ref().map_or(0, ImageCatalog::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn catalog(&self) -> Option<&ImageCatalog> {
        self.catalog.as_ref()
    }

    pub fn merge_report(&self) -> Option<&MergeReport> {
        self.merge_report.as_ref()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

/// Iterator returned by [`VolumeReader::sequential`].
pub struct SequentialSamples<'a> {
    reader: &'a VolumeReader,
    done: bool,
}

impl Iterator for SequentialSamples<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.access_request(AccessRequest::Sequential) {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => Some(Err(err)),
        }
    }
}
