//! Compact, serializable overview of a call set.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    build::Build,
    genotype::{Chromosome, GenotypeSet},
    sex::{Sex, SexPolicy},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source: String,
    pub assembly: String,
    pub build: Build,
    pub count: usize,
    pub no_calls: usize,
    /// Calls per chromosome, in canonical chromosome order.
    pub chromosomes: BTreeMap<Chromosome, usize>,
    pub chromosomes_summary: String,
    pub sex: Sex,
    pub phased: bool,
}

impl Summary {
    pub fn from_set(set: &GenotypeSet, policy: &dyn SexPolicy) -> Self {
        Self {
            name: None,
            source: set.source(),
            assembly: set.assembly().to_string(),
            build: set.build(),
            count: set.len(),
            no_calls: set.no_call_count(),
            chromosomes: set.counts_by_chromosome(),
            chromosomes_summary: set.chromosomes_summary(),
            sex: policy.infer(set),
            phased: set.phased(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes `<stem>_summary.json` next to `output_path`.
    pub fn write(&self, output_path: &Path) -> io::Result<PathBuf> {
        let stem = output_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let parent = output_path.parent().unwrap_or(Path::new("."));
        let summary_path = parent.join(format!("{stem}_summary.json"));

        let json = self.to_json().map_err(io::Error::other)?;
        fs::write(&summary_path, json)?;

        tracing::info!(path = %summary_path.display(), "wrote summary");
        Ok(summary_path)
    }
}
