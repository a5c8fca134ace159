//! Ordered preprocessing stages applied to every accessed record.
//!
//! A [`Stage`] is one of three variants:
//!
//! - [`Stage::Plain`]: a pure function of the field arrays and the shared
//!   mask.
//! - [`Stage::DataDependent`]: like `Plain`, but fitted once against the
//!   whole catalog (see [`Pipeline::fit`]) before serving.
//! - [`Stage::Randomised`]: draws fresh parameters for every access and
//!   transforms the arrays with knowledge of each field's interpolation
//!   order. Randomised stages neither see nor alter the mask.
//!
//! Stage configuration is shared and read-only while serving. The only
//! per-access state is the random generator handed to [`Pipeline::apply`]
//! and the [`RandomisedRun`] values drawn from it, so concurrent accesses
//! never observe each other's parameters.

pub mod stages;

use std::fmt;

use ndarray::ArrayD;
use rand::rngs::StdRng;

use crate::catalog::{FieldMap, ImageCatalog};
use crate::error::Result;

/// Field name to voxel array.
pub type FieldData = FieldMap<ArrayD<f32>>;

/// Field name to the interpolation orders of its modalities.
pub type InterpOrders = FieldMap<Vec<i32>>;

/// Field name to a boolean mask, threaded between non-random stages.
pub type Mask = FieldMap<ArrayD<bool>>;

/// A stage with no corpus-level state.
pub trait PlainStage: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, data: FieldData, mask: Option<Mask>) -> Result<(FieldData, Option<Mask>)>;
}

/// A stage whose parameters are fitted against the whole catalog.
pub trait DataDependentStage: Send + Sync {
    fn name(&self) -> &str;

    /// Fits the stage. Called again whenever the pipeline changes.
    fn fit(&mut self, catalog: &ImageCatalog) -> Result<()>;

    fn apply(&self, data: FieldData, mask: Option<Mask>) -> Result<(FieldData, Option<Mask>)>;
}

/// A stage that draws new parameters on every access.
pub trait RandomisedStage: Send + Sync {
    fn name(&self) -> &str;

    /// Draws the parameters for one access.
    fn randomise(&self, rng: &mut StdRng) -> Box<dyn RandomisedRun>;
}

/// One access's worth of drawn parameters.
pub trait RandomisedRun {
    fn apply(&self, data: FieldData, interp_orders: &InterpOrders) -> Result<FieldData>;
}

/// A processing stage.
pub enum Stage {
    Plain(Box<dyn PlainStage>),
    DataDependent(Box<dyn DataDependentStage>),
    Randomised(Box<dyn RandomisedStage>),
}

/// Discriminant of a [`Stage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Plain,
    DataDependent,
    Randomised,
}

impl Stage {
    pub fn plain(stage: impl PlainStage + 'static) -> Self {
        Stage::Plain(Box::new(stage))
    }

    pub fn data_dependent(stage: impl DataDependentStage + 'static) -> Self {
        Stage::DataDependent(Box::new(stage))
    }

    pub fn randomised(stage: impl RandomisedStage + 'static) -> Self {
        Stage::Randomised(Box::new(stage))
    }

    pub fn name(&self) -> &str {
        match self {
            Stage::Plain(s) => s.name(),
            Stage::DataDependent(s) => s.name(),
            Stage::Randomised(s) => s.name(),
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Plain(_) => StageKind::Plain,
            Stage::DataDependent(_) => StageKind::DataDependent,
            Stage::Randomised(_) => StageKind::Randomised,
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind(), self.name())
    }
}

/// An ordered list of stages. `None` entries are placeholders and skipped.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Option<Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends stages without fitting them.
    pub fn extend<I>(&mut self, stages: I)
    where
        I: IntoIterator<Item = Option<Stage>>,
    {
        self.stages.extend(stages);
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(Some(stage));
    }

    /// Drops every entry after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.stages.truncate(len);
    }

    /// Number of entries, placeholders included.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().flatten()
    }

    /// Fits every data-dependent stage against `catalog`.
    pub fn fit(&mut self, catalog: &ImageCatalog) -> Result<()> {
        for stage in self.stages.iter_mut().flatten() {
            if let Stage::DataDependent(stage) = stage {
                log::debug!("fitting [{}] on {} records", stage.name(), catalog.len());
                stage.fit(catalog)?;
            }
        }
        Ok(())
    }

    /// Runs every stage over one record's arrays, in order.
    ///
    /// Returns the transformed arrays and the last mask produced by a
    /// non-random stage. The first stage error aborts the run.
    pub fn apply(
        &self,
        mut data: FieldData,
        interp_orders: &InterpOrders,
        rng: &mut StdRng,
    ) -> Result<(FieldData, Option<Mask>)> {
        let mut mask = None;
        for stage in self.stages.iter().flatten() {
            match stage {
                Stage::Randomised(stage) => {
                    let run = stage.randomise(rng);
                    data = run.apply(data, interp_orders)?;
                }
                Stage::Plain(stage) => {
                    (data, mask) = stage.apply(data, mask)?;
                }
                Stage::DataDependent(stage) => {
                    (data, mask) = stage.apply(data, mask)?;
                }
            }
        }
        Ok((data, mask))
    }
}
