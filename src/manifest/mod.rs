//! Per-modality manifests and the joint table built from them.
//!
//! A manifest is a headerless two-column CSV file:
//!
//! ```text
//! subject_001,/data/t1/subject_001.nii.gz
//! subject_002,/data/t1/subject_002.nii.gz
//! ```
//!
//! [`merge_manifests`] inner-joins any number of manifests on the subject
//! id. Subjects missing from any manifest are dropped with a warning; only an
//! empty result is fatal.

mod report;

pub use report::{ManifestCount, MergeIssue, MergeIssueCode, MergeReport, MergeSeverity};

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::VolsetError;

/// One modality's manifest source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    pub modality: String,
    pub csv_file: PathBuf,
}

impl Manifest {
    pub fn new(modality: impl Into<String>, csv_file: impl Into<PathBuf>) -> Self {
        Self {
            modality: modality.into(),
            csv_file: csv_file.into(),
        }
    }
}

/// A single manifest row.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ManifestRow {
    pub subject_id: String,
    pub path: PathBuf,
}

/// Reads a manifest file.
///
/// # Errors
/// Returns [`VolsetError::Io`] if the file cannot be opened and
/// [`VolsetError::ManifestParse`] if a row does not have exactly two columns.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRow>, VolsetError> {
    let file = File::open(path).map_err(VolsetError::Io)?;
    read_rows(BufReader::new(file), path)
}

/// Reads manifest rows from a string.
///
/// Useful for testing without file I/O.
pub fn from_manifest_str(csv_str: &str) -> Result<Vec<ManifestRow>, VolsetError> {
    from_manifest_slice(csv_str.as_bytes())
}

/// Reads manifest rows from raw bytes.
pub fn from_manifest_slice(bytes: &[u8]) -> Result<Vec<ManifestRow>, VolsetError> {
    read_rows(bytes, Path::new("<bytes>"))
}

fn read_rows<R: Read>(reader: R, path: &Path) -> Result<Vec<ManifestRow>, VolsetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in csv_reader.deserialize() {
        let row: ManifestRow = result.map_err(|source| VolsetError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// One row of the joint table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JointRow {
    pub subject_id: String,
    /// One path per modality, parallel to [`JointTable::modalities`].
    pub paths: Vec<PathBuf>,
}

/// Subjects present in every merged manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JointTable {
    modalities: Vec<String>,
    rows: Vec<JointRow>,
}

impl JointTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Modality column names, in merge order.
    pub fn modalities(&self) -> &[String] {
        &self.modalities
    }

    pub fn rows(&self) -> &[JointRow] {
        &self.rows
    }

    pub fn subject_id(&self, index: usize) -> Option<&str> {
        self.rows.get(index).map(|row| row.subject_id.as_str())
    }

    /// Path of `modality` in row `index`.
    pub fn path(&self, index: usize, modality: &str) -> Option<&Path> {
        let column = self.modalities.iter().position(|m| m == modality)?;
        self.rows
            .get(index)
            .map(|row| row.paths[column].as_path())
    }

    pub fn has_modality(&self, modality: &str) -> bool {
        self.modalities.iter().any(|m| m == modality)
    }

    /// Builds a single-column table from already de-duplicated rows.
    fn from_rows(modality: &str, rows: Vec<ManifestRow>) -> Self {
        JointTable {
            modalities: vec![modality.to_string()],
            rows: rows
                .into_iter()
                .map(|row| JointRow {
                    subject_id: row.subject_id,
                    paths: vec![row.path],
                })
                .collect(),
        }
    }

    /// Inner join on subject id, keeping this table's row order.
    fn inner_join(self, modality: &str, rows: &[ManifestRow]) -> Self {
        let lookup: HashMap<&str, &PathBuf> = rows
            .iter()
            .map(|row| (row.subject_id.as_str(), &row.path))
            .collect();

        let mut modalities = self.modalities;
        modalities.push(modality.to_string());

        let rows = self
            .rows
            .into_iter()
            .filter_map(|mut row| {
                let path = lookup.get(row.subject_id.as_str())?;
                row.paths.push((*path).clone());
                Some(row)
            })
            .collect();

        JointTable { modalities, rows }
    }
}

fn dedup_subjects(rows: Vec<ManifestRow>) -> (Vec<ManifestRow>, usize) {
    let total = rows.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(total);
    let kept: Vec<ManifestRow> = rows
        .into_iter()
        .filter(|row| seen.insert(row.subject_id.clone()))
        .collect();
    let duplicates = total - kept.len();
    (kept, duplicates)
}

/// Fuzz-only entrypoint: parses and joins in-memory manifests.
#[cfg(feature = "fuzzing")]
pub fn fuzz_join_manifests(inputs: &[&[u8]]) -> Result<usize, VolsetError> {
    let mut joint: Option<JointTable> = None;
    for (i, bytes) in inputs.iter().enumerate() {
        let (rows, _) = dedup_subjects(from_manifest_slice(bytes)?);
        let modality = format!("m{i}");
        joint = Some(match joint.take() {
            None => JointTable::from_rows(&modality, rows),
            Some(table) => {
                let before = table.len();
                let merged = table.inner_join(&modality, &rows);
                assert!(merged.len() <= before);
                merged
            }
        });
    }
    Ok(joint.map_or(0, |table| table.len()))
}

/// Merges manifests into a joint table by inner join on subject id.
///
/// Manifests are folded in the given order and the joint table keeps the
/// row order of the first manifest. Every join that loses rows adds a
/// [`MergeIssueCode::RowsNotMatched`] warning to the report.
///
/// # Errors
/// - [`VolsetError::ManifestNotFound`] if a manifest file does not exist
/// - [`VolsetError::ManifestParse`] if a manifest is malformed
/// - [`VolsetError::EmptyJointTable`] if no subject survives the merge
pub fn merge_manifests(manifests: &[Manifest]) -> Result<(JointTable, MergeReport), VolsetError> {
    let mut report = MergeReport::new();
    let mut joint: Option<JointTable> = None;

    for manifest in manifests {
        if !manifest.csv_file.is_file() {
            log::error!("csv file {} not found.", manifest.csv_file.display());
            return Err(VolsetError::ManifestNotFound {
                modality: manifest.modality.clone(),
                path: manifest.csv_file.clone(),
            });
        }

        let rows = read_manifest(&manifest.csv_file)?;
        report.inputs.push(ManifestCount {
            modality: manifest.modality.clone(),
            path: manifest.csv_file.clone(),
            rows: rows.len(),
        });

        let (rows, duplicates) = dedup_subjects(rows);
        if duplicates > 0 {
            let message = format!(
                "{} duplicate subject row(s) in {}; keeping the first occurrence",
                duplicates,
                manifest.csv_file.display()
            );
            log::warn!("{}", message);
            report.add(MergeIssue::warning(
                MergeIssueCode::DuplicateSubject,
                &manifest.modality,
                duplicates,
                message,
            ));
        }

        let table = match joint.take() {
            None => JointTable::from_rows(&manifest.modality, rows),
            Some(table) => {
                let before = table.len();
                let known: HashSet<&str> =
                    table.rows.iter().map(|r| r.subject_id.as_str()).collect();
                let unmatched = rows
                    .iter()
                    .filter(|r| !known.contains(r.subject_id.as_str()))
                    .count();

                let merged = table.inner_join(&manifest.modality, &rows);
                if merged.len() < before {
                    let dropped = before - merged.len();
                    let message = format!(
                        "rows not matched in {}: {} subject(s) dropped",
                        manifest.csv_file.display(),
                        dropped
                    );
                    log::warn!("{}", message);
                    report.add(MergeIssue::warning(
                        MergeIssueCode::RowsNotMatched,
                        &manifest.modality,
                        dropped,
                        message,
                    ));
                }
                if unmatched > 0 {
                    report.add(MergeIssue::info(
                        MergeIssueCode::UnmatchedSubjects,
                        &manifest.modality,
                        unmatched,
                        format!(
                            "{} subject(s) in {} are not in the merged table",
                            unmatched,
                            manifest.csv_file.display()
                        ),
                    ));
                }
                merged
            }
        };
        joint = Some(table);
    }

    let joint = joint.unwrap_or_default();
    if joint.is_empty() {
        let err = VolsetError::EmptyJointTable {
            modalities: manifests.iter().map(|m| m.modality.clone()).collect(),
        };
        log::error!("{}", err);
        return Err(err);
    }

    report.joined_rows = joint.len();
    Ok((joint, report))
}

/// Writes a joint table as CSV with a `subject_id,<modality>...` header.
pub fn write_joint_csv(path: &Path, table: &JointTable) -> Result<(), VolsetError> {
    let file = File::create(path).map_err(VolsetError::Io)?;
    let writer = BufWriter::new(file);

    let mut csv_writer = csv::Writer::from_writer(writer);
    write_joint_records(&mut csv_writer, table).map_err(|source| VolsetError::ManifestWrite {
        path: path.to_path_buf(),
        source,
    })?;

    csv_writer
        .into_inner()
        .map_err(|e| VolsetError::Io(e.into_error()))?
        .flush()
        .map_err(VolsetError::Io)?;

    Ok(())
}

/// Writes a joint table to a CSV string.
pub fn to_joint_csv_string(table: &JointTable) -> Result<String, VolsetError> {
    let dummy_path = Path::new("<string>");
    let mut csv_writer = csv::Writer::from_writer(Vec::new());
    write_joint_records(&mut csv_writer, table).map_err(|source| VolsetError::ManifestWrite {
        path: dummy_path.to_path_buf(),
        source,
    })?;

    let bytes = csv_writer
        .into_inner()
        .map_err(|e| VolsetError::Io(e.into_error()))?;

    String::from_utf8(bytes).map_err(|e| {
        VolsetError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

fn write_joint_records<W: Write>(
    csv_writer: &mut csv::Writer<W>,
    table: &JointTable,
) -> Result<(), csv::Error> {
    let mut header = vec!["subject_id".to_string()];
    header.extend(table.modalities.iter().cloned());
    csv_writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.subject_id.clone()];
        record.extend(row.paths.iter().map(|p| p.display().to_string()));
        csv_writer.write_record(&record)?;
    }
    Ok(())
}
