//! Turns joint-table rows into catalog records.

use crate::config::DataConfig;
use crate::error::{Result, VolsetError};
use crate::image::{ImageFactory, ImageProperties};
use crate::manifest::JointTable;

use super::{ImageCatalog, Record};

/// Receives build progress. Purely observational.
pub trait ProgressSink {
    fn report(&mut self, current: usize, total: usize);
}

impl<F: FnMut(usize, usize)> ProgressSink for F {
    fn report(&mut self, current: usize, total: usize) {
        self(current, total)
    }
}

/// Discards progress updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _current: usize, _total: usize) {}
}

/// Logs progress at debug level in steps of ten percent.
#[derive(Clone, Debug, Default)]
pub struct LogProgress {
    last_decile: Option<usize>,
}

impl ProgressSink for LogProgress {
    fn report(&mut self, current: usize, total: usize) {
        if total == 0 {
            return;
        }
        let decile = current * 10 / total;
        if self.last_decile != Some(decile) {
            self.last_decile = Some(decile);
            log::debug!(
                "reading dataset headers: {:.1}% ({}/{})",
                current as f64 * 100.0 / total as f64,
                current,
                total
            );
        }
    }
}

/// Builds one record per joint-table row.
///
/// `fields` lists each active field with the modalities it combines, in the
/// order the fields should appear in every record.
///
/// # Errors
/// - [`VolsetError::MissingFieldSpec`] if a modality has no input section or
///   no column in the joint table
/// - any error returned by the image factory
pub fn build_catalog(
    table: &JointTable,
    fields: &[(String, Vec<String>)],
    specs: &DataConfig,
    factory: &dyn ImageFactory,
    progress: &mut dyn ProgressSink,
) -> Result<ImageCatalog> {
    let total = table.len();
    let mut records = Vec::with_capacity(total);
    let mut subject_ids = Vec::with_capacity(total);

    for (index, row) in table.rows().iter().enumerate() {
        progress.report(index, total);

        let mut record_fields = Vec::with_capacity(fields.len());
        for (field, modalities) in fields {
            let properties = image_properties(table, index, field, modalities, specs)?;
            record_fields.push((field.clone(), factory.create(properties)?));
        }
        records.push(Record::new(record_fields));
        subject_ids.push(row.subject_id.clone());
    }
    progress.report(total, total);

    let field_names = fields.iter().map(|(field, _)| field.clone()).collect();
    ImageCatalog::new(field_names, records, subject_ids)
}

fn image_properties(
    table: &JointTable,
    index: usize,
    field: &str,
    modalities: &[String],
    specs: &DataConfig,
) -> Result<ImageProperties> {
    let mut properties = ImageProperties {
        field: field.to_string(),
        file_paths: Vec::with_capacity(modalities.len()),
        modalities: modalities.to_vec(),
        interp_orders: Vec::with_capacity(modalities.len()),
        pixdims: Vec::with_capacity(modalities.len()),
        axcodes: Vec::with_capacity(modalities.len()),
    };

    for modality in modalities {
        let missing = || {
            log::error!(
                "Specified modality names {:?} not found in config: input sections {:?}",
                modalities,
                specs.keys().collect::<Vec<_>>()
            );
            VolsetError::MissingFieldSpec {
                field: field.to_string(),
                modality: modality.clone(),
                available: specs.keys().cloned().collect(),
            }
        };
        let spec = specs.get(modality).ok_or_else(missing)?;
        let path = table.path(index, modality).ok_or_else(missing)?;

        properties.file_paths.push(path.to_path_buf());
        properties.interp_orders.push(spec.interp_order);
        properties.pixdims.push(spec.pixdim.clone());
        properties.axcodes.push(spec.axcodes.clone());
    }

    Ok(properties)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::catalog::test_support::ConstImage;
    use crate::config::FieldSpec;
    use crate::image::{ElementKind, ImageHandle};
    use crate::manifest::{merge_manifests, Manifest};

    fn joint(dir: &TempDir) -> JointTable {
        let t1 = dir.path().join("t1.csv");
        let seg = dir.path().join("seg.csv");
        fs::write(&t1, "s1,t1_s1\ns2,t1_s2\n").unwrap();
        fs::write(&seg, "s2,seg_s2\ns1,seg_s1\n").unwrap();
        merge_manifests(&[Manifest::new("T1", t1), Manifest::new("seg", seg)])
            .expect("merge")
            .0
    }

    fn specs() -> DataConfig {
        let mut specs = DataConfig::new();
        specs.insert(
            "T1".to_string(),
            FieldSpec::new("t1.csv", 3).with_pixdim(vec![1.0, 1.0, 1.0]),
        );
        specs.insert(
            "seg".to_string(),
            FieldSpec::new("seg.csv", 0).with_axcodes("RAS"),
        );
        specs
    }

    fn fields() -> Vec<(String, Vec<String>)> {
        vec![
            ("image".to_string(), vec!["T1".to_string()]),
            ("label".to_string(), vec!["seg".to_string()]),
        ]
    }

    #[test]
    fn builds_records_in_table_order() {
        let dir = TempDir::new().unwrap();
        let table = joint(&dir);
        let seen = std::cell::RefCell::new(Vec::new());
        let factory = |props: ImageProperties| -> Result<Box<dyn ImageHandle>> {
            seen.borrow_mut().push(props);
            Ok(ConstImage::boxed(&[2, 2, 2], 0.0, ElementKind::Float))
        };

        let catalog =
            build_catalog(&table, &fields(), &specs(), &factory, &mut NoProgress).expect("build");

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.subject_id(0), Some("s1"));
        assert_eq!(catalog.field_names(), &["image".to_string(), "label".to_string()]);

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].field, "image");
        assert_eq!(seen[0].file_paths[0], Path::new("t1_s1"));
        assert_eq!(seen[0].interp_orders, vec![3]);
        assert_eq!(seen[0].pixdims, vec![Some(vec![1.0, 1.0, 1.0])]);
        assert_eq!(seen[1].axcodes, vec![Some("RAS".to_string())]);
        assert_eq!(seen[3].file_paths[0], Path::new("seg_s2"));
    }

    #[test]
    fn missing_spec_fails_the_whole_build() {
        let dir = TempDir::new().unwrap();
        let table = joint(&dir);
        let mut specs = specs();
        specs.remove("seg");
        let factory = |_: ImageProperties| -> Result<Box<dyn ImageHandle>> {
            Ok(ConstImage::boxed(&[1], 0.0, ElementKind::Float))
        };

        let err = build_catalog(&table, &fields(), &specs, &factory, &mut NoProgress).unwrap_err();
        match err {
            VolsetError::MissingFieldSpec { field, modality, .. } => {
                assert_eq!(field, "label");
                assert_eq!(modality, "seg");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn progress_reaches_total() {
        let dir = TempDir::new().unwrap();
        let table = joint(&dir);
        let factory = |_: ImageProperties| -> Result<Box<dyn ImageHandle>> {
            Ok(ConstImage::boxed(&[1], 0.0, ElementKind::Float))
        };
        let mut updates = Vec::new();
        let mut sink = |current: usize, total: usize| updates.push((current, total));

        build_catalog(&table, &fields(), &specs(), &factory, &mut sink).expect("build");
        assert_eq!(updates, vec![(0, 2), (1, 2), (2, 2)]);
    }
}
