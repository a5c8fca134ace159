//! Image handle and factory traits.
//!
//! volset never decodes voxels itself. A caller-supplied [`ImageFactory`]
//! turns the file paths of one record field into an [`ImageHandle`], and the
//! reader only relies on the handle's shape, element kind, interpolation
//! orders and [`ImageHandle::get_data`].

use std::fmt;
use std::path::PathBuf;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Everything the factory needs to build one field of one record.
///
/// All vectors are parallel: entry `i` describes modality `modalities[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageProperties {
    /// Logical field this image is built for (e.g. "image", "label").
    pub field: String,
    pub file_paths: Vec<PathBuf>,
    pub modalities: Vec<String>,
    pub interp_orders: Vec<i32>,
    /// Target pixel spacing per modality, if resampling is requested.
    pub pixdims: Vec<Option<Vec<f64>>>,
    /// Target axis orientation code per modality (e.g. "RAS").
    pub axcodes: Vec<Option<String>>,
}

/// A lazily-resolved image built from one or more modality files.
///
/// Handles are shared across concurrent accesses, so they must be
/// `Send + Sync` and must not mutate shared state in `get_data`.
pub trait ImageHandle: Send + Sync + fmt::Debug {
    /// Shape of the data returned by [`ImageHandle::get_data`].
    fn shape(&self) -> Vec<usize>;

    /// Element kind of the underlying source data.
    fn element_kind(&self) -> ElementKind;

    /// Interpolation order of each combined modality.
    fn interp_order(&self) -> &[i32];

    /// Reads the voxel data.
    fn get_data(&self) -> Result<ArrayD<f32>>;
}

/// Builds image handles from file paths.
pub trait ImageFactory {
    fn create(&self, properties: ImageProperties) -> Result<Box<dyn ImageHandle>>;
}

impl<F> ImageFactory for F
where
    F: Fn(ImageProperties) -> Result<Box<dyn ImageHandle>>,
{
    fn create(&self, properties: ImageProperties) -> Result<Box<dyn ImageHandle>> {
        self(properties)
    }
}

/// Element kind of a source volume, as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    Bool,
    Signed,
    Unsigned,
    Float,
    Complex,
    Other,
}

/// Numeric kind a consumer should allocate for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericKind {
    Int32,
    Float32,
}

impl NumericKind {
    /// Integer-like and boolean sources map to `Int32`, everything else to
    /// `Float32`.
    pub fn infer(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Bool | ElementKind::Signed | ElementKind::Unsigned => NumericKind::Int32,
            ElementKind::Float | ElementKind::Complex | ElementKind::Other => NumericKind::Float32,
        }
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericKind::Int32 => write!(f, "int32"),
            NumericKind::Float32 => write!(f, "float32"),
        }
    }
}
