//! Merge report types.
//!
//! Row loss during a manifest merge is never fatal; it is recorded here so
//! callers (and the CLI) can decide how strict to be.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// The result of merging a set of manifests.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MergeReport {
    /// Row count of each manifest, in merge order.
    pub inputs: Vec<ManifestCount>,
    /// Number of rows in the joint table.
    pub joined_rows: usize,
    /// Issues discovered while merging.
    pub issues: Vec<MergeIssue>,
}

impl MergeReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: MergeIssue) {
        self.issues.push(issue);
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == MergeSeverity::Warning)
            .count()
    }

    pub fn info_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == MergeSeverity::Info)
            .count()
    }

    /// Returns true if any subject was dropped or ignored.
    pub fn is_lossy(&self) -> bool {
        self.warning_count() > 0
    }

    /// Total number of subjects dropped by the joins.
    pub fn dropped_rows(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.code == MergeIssueCode::RowsNotMatched)
            .map(|i| i.rows)
            .sum()
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Merged {} manifest(s):", self.inputs.len())?;
        for input in &self.inputs {
            writeln!(
                f,
                "  {:<12} {} row(s) from {}",
                input.modality,
                input.rows,
                input.path.display()
            )?;
        }
        writeln!(f, "Joint table: {} row(s)", self.joined_rows)?;

        if self.issues.is_empty() {
            return Ok(());
        }

        writeln!(f)?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

/// Row count of one input manifest.
#[derive(Clone, Debug, Serialize)]
pub struct ManifestCount {
    pub modality: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// A single merge issue.
#[derive(Clone, Debug, Serialize)]
pub struct MergeIssue {
    pub severity: MergeSeverity,
    pub code: MergeIssueCode,
    /// Modality whose manifest triggered the issue.
    pub modality: String,
    /// Number of rows affected.
    pub rows: usize,
    pub message: String,
}

impl MergeIssue {
    pub fn warning(
        code: MergeIssueCode,
        modality: impl Into<String>,
        rows: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: MergeSeverity::Warning,
            code,
            modality: modality.into(),
            rows,
            message: message.into(),
        }
    }

    pub fn info(
        code: MergeIssueCode,
        modality: impl Into<String>,
        rows: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: MergeSeverity::Info,
            code,
            modality: modality.into(),
            rows,
            message: message.into(),
        }
    }
}

impl fmt::Display for MergeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            MergeSeverity::Warning => "WARN",
            MergeSeverity::Info => "INFO",
        };
        write!(
            f,
            "[{}] {:?} in {}: {}",
            severity, self.code, self.modality, self.message
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeSeverity {
    Info,
    Warning,
}

/// A stable code identifying the type of merge issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MergeIssueCode {
    /// The join against this manifest dropped subjects.
    RowsNotMatched,
    /// The manifest lists the same subject more than once; later rows are ignored.
    DuplicateSubject,
    /// The manifest contributes subjects that the joint table does not keep.
    UnmatchedSubjects,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_dropped_rows() {
        let mut report = MergeReport::new();
        report.add(MergeIssue::warning(
            MergeIssueCode::RowsNotMatched,
            "T2",
            3,
            "rows not matched",
        ));
        report.add(MergeIssue::warning(
            MergeIssueCode::DuplicateSubject,
            "T2",
            1,
            "duplicate",
        ));
        report.add(MergeIssue::info(
            MergeIssueCode::UnmatchedSubjects,
            "T2",
            2,
            "extra subjects",
        ));

        assert_eq!(report.warning_count(), 2);
        assert_eq!(report.info_count(), 1);
        assert_eq!(report.dropped_rows(), 3);
        assert!(report.is_lossy());
    }

    #[test]
    fn display_lists_issues() {
        let mut report = MergeReport::new();
        report.joined_rows = 2;
        report.add(MergeIssue::warning(
            MergeIssueCode::RowsNotMatched,
            "label",
            1,
            "rows not matched in seg.csv",
        ));
        let text = report.to_string();
        assert!(text.contains("Joint table: 2 row(s)"));
        assert!(text.contains("[WARN] RowsNotMatched in label"));
    }
}
