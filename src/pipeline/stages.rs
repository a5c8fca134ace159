//! Reference stages, one per [`Stage`](super::Stage) variant.

use ndarray::Axis;
use rand::rngs::StdRng;
use rand::RngExt;

use super::{
    DataDependentStage, FieldData, InterpOrders, Mask, PlainStage, RandomisedRun, RandomisedStage,
};
use crate::catalog::{FieldMap, ImageCatalog};
use crate::error::{Result, VolsetError};

/// Marks voxels above a threshold as foreground.
///
/// The produced mask replaces any incoming one.
#[derive(Clone, Debug)]
pub struct ForegroundMask {
    pub threshold: f32,
}

impl ForegroundMask {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl PlainStage for ForegroundMask {
    fn name(&self) -> &str {
        "foreground_mask"
    }

    fn apply(&self, data: FieldData, _mask: Option<Mask>) -> Result<(FieldData, Option<Mask>)> {
        let mask = data
            .iter()
            .map(|(field, array)| (field.clone(), array.mapv(|v| v > self.threshold)))
            .collect();
        Ok((data, Some(mask)))
    }
}

/// Whitens the listed fields with the corpus mean and standard deviation.
///
/// Statistics are accumulated over every record during [`fit`]. When a mask
/// is present for a field only masked voxels are normalised.
///
/// [`fit`]: DataDependentStage::fit
#[derive(Clone, Debug)]
pub struct MeanStdNormalise {
    fields: Vec<String>,
    stats: Option<FieldMap<(f32, f32)>>,
}

impl MeanStdNormalise {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            stats: None,
        }
    }

    /// Fitted `(mean, std)` of a field.
    pub fn stats(&self, field: &str) -> Option<(f32, f32)> {
        self.stats.as_ref()?.get(field).copied()
    }
}

impl DataDependentStage for MeanStdNormalise {
    fn name(&self) -> &str {
        "mean_std_normalise"
    }

    fn fit(&mut self, catalog: &ImageCatalog) -> Result<()> {
        let mut stats = FieldMap::new();
        for field in &self.fields {
            let (mut sum, mut sum_sq, mut count) = (0.0f64, 0.0f64, 0usize);
            for record in catalog {
                let Some(image) = record.get(field) else {
                    continue;
                };
                let data = image.get_data()?;
                for &v in data.iter() {
                    let v = f64::from(v);
                    sum += v;
                    sum_sq += v * v;
                }
                count += data.len();
            }
            if count == 0 {
                continue;
            }
            let mean = sum / count as f64;
            let var = (sum_sq / count as f64 - mean * mean).max(0.0);
            stats.insert(field.clone(), (mean as f32, var.sqrt() as f32));
        }
        self.stats = Some(stats);
        Ok(())
    }

    fn apply(&self, mut data: FieldData, mask: Option<Mask>) -> Result<(FieldData, Option<Mask>)> {
        let stats = self.stats.as_ref().ok_or_else(|| VolsetError::Stage {
            stage: self.name().to_string(),
            message: "apply called before fit".to_string(),
        })?;

        for (field, &(mean, std)) in stats {
            let Some(array) = data.get_mut(field) else {
                continue;
            };
            let std = if std > 0.0 { std } else { 1.0 };
            match mask.as_ref().and_then(|m| m.get(field)) {
                Some(field_mask) if field_mask.shape() == array.shape() => {
                    array.zip_mut_with(field_mask, |v, &keep| {
                        if keep {
                            *v = (*v - mean) / std;
                        }
                    });
                }
                _ => array.mapv_inplace(|v| (v - mean) / std),
            }
        }
        Ok((data, mask))
    }
}

/// Flips each listed axis with the given probability.
///
/// Axes beyond an array's dimensionality are ignored for that field.
#[derive(Clone, Debug)]
pub struct RandomFlip {
    pub axes: Vec<usize>,
    pub probability: f64,
}

impl RandomFlip {
    pub fn new(axes: Vec<usize>, probability: f64) -> Self {
        Self {
            axes,
            probability: probability.clamp(0.0, 1.0),
        }
    }
}

struct FlipRun {
    axes: Vec<usize>,
}

impl RandomisedStage for RandomFlip {
    fn name(&self) -> &str {
        "random_flip"
    }

    fn randomise(&self, rng: &mut StdRng) -> Box<dyn RandomisedRun> {
        let axes = self
            .axes
            .iter()
            .copied()
            .filter(|_| rng.random_bool(self.probability))
            .collect();
        Box::new(FlipRun { axes })
    }
}

impl RandomisedRun for FlipRun {
    fn apply(&self, mut data: FieldData, _interp_orders: &InterpOrders) -> Result<FieldData> {
        for array in data.values_mut() {
            for &axis in &self.axes {
                if axis < array.ndim() {
                    array.invert_axis(Axis(axis));
                }
            }
        }
        Ok(data)
    }
}
