use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{
    genotype::{GenotypeCall, GenotypeSet},
    merge::{MergeOptions, MergeReport, merge_sets},
    reader::{self, ReadError, ReadOptions},
    sex::{AnyHeterozygous, Sex, SexPolicy},
    summary::Summary,
};

/// Raw genotype data for one person.
#[derive(Debug, Clone)]
pub enum Source {
    Set(GenotypeSet),
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl Source {
    fn load(self, options: &ReadOptions) -> Result<GenotypeSet, ReadError> {
        match self {
            Self::Set(set) => Ok(set),
            Self::Bytes(bytes) => reader::read_bytes(bytes, options).map(|parsed| parsed.set),
            Self::Path(path) => reader::read_path(&path, options).map(|parsed| parsed.set),
        }
    }
}

impl From<GenotypeSet> for Source {
    fn from(set: GenotypeSet) -> Self {
        Self::Set(set)
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

/// Calls removed while cleaning up haploid chromosomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deduplication {
    pub discrepant_xy: Vec<GenotypeCall>,
    pub heterozygous_mt: Vec<GenotypeCall>,
}

/// A named person owning one merged [`GenotypeSet`].
#[derive(Debug, Clone)]
pub struct Individual {
    name: String,
    genotypes: GenotypeSet,
    load_report: MergeReport,
}

impl Individual {
    /// Loads and merges every source. Fails on the first source that cannot be
    /// read; nothing is merged in that case.
    pub fn new<I, S>(name: impl Into<String>, sources: I) -> Result<Self, ReadError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Source>,
    {
        Self::with_options(name, sources, &ReadOptions::default(), &MergeOptions::default())
    }

    pub fn with_options<I, S>(
        name: impl Into<String>,
        sources: I,
        read: &ReadOptions,
        merge: &MergeOptions,
    ) -> Result<Self, ReadError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Source>,
    {
        let name = name.into();
        let sets = sources
            .into_iter()
            .map(|source| source.into().load(read))
            .collect::<Result<Vec<_>, _>>()?;

        let mut genotypes = GenotypeSet::new();
        let load_report = merge_sets(&mut genotypes, sets, merge);
        tracing::info!(
            name = %name,
            calls = genotypes.len(),
            sources = load_report.sources.len(),
            "loaded individual"
        );

        Ok(Self {
            name,
            genotypes,
            load_report,
        })
    }

    /// Loads files in parallel, naming the file that failed.
    pub fn from_paths(name: impl Into<String>, paths: &[PathBuf], read: &ReadOptions) -> Result<Self> {
        let mut sets = Vec::with_capacity(paths.len());
        for (path, result) in reader::read_paths(paths, read) {
            let parsed = result.with_context(|| format!("failed to read {}", path.display()))?;
            sets.push(parsed.set);
        }
        Ok(Self::new(name, sets)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name reduced to `[A-Za-z0-9_]`, suitable for file names and VCF samples.
    pub fn var_name(&self) -> String {
        let cleaned: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        match cleaned.chars().next() {
            Some(c) if c.is_ascii_digit() => format!("_{cleaned}"),
            _ => cleaned,
        }
    }

    pub fn genotypes(&self) -> &GenotypeSet {
        &self.genotypes
    }

    pub fn into_genotypes(self) -> GenotypeSet {
        self.genotypes
    }

    /// Discrepancies and per-source results from construction.
    pub fn load_report(&self) -> &MergeReport {
        &self.load_report
    }

    /// Merges additional sets using default options.
    pub fn merge(&mut self, sets: Vec<GenotypeSet>) -> MergeReport {
        self.merge_with(sets, &MergeOptions::default())
    }

    pub fn merge_with(&mut self, sets: Vec<GenotypeSet>, options: &MergeOptions) -> MergeReport {
        merge_sets(&mut self.genotypes, sets, options)
    }

    pub fn sex(&self) -> Sex {
        self.sex_with(&AnyHeterozygous)
    }

    pub fn sex_with(&self, policy: &dyn SexPolicy) -> Sex {
        policy.infer(&self.genotypes)
    }

    /// Collapses haploid calls: non-PAR X/Y for males, MT for everyone.
    pub fn deduplicate(&mut self, policy: &dyn SexPolicy) -> Deduplication {
        let discrepant_xy = if policy.infer(&self.genotypes) == Sex::Male {
            self.genotypes.deduplicate_sex_chromosomes()
        } else {
            Vec::new()
        };
        Deduplication {
            discrepant_xy,
            heterozygous_mt: self.genotypes.deduplicate_mt(),
        }
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::from_set(&self.genotypes, &AnyHeterozygous);
        summary.name = Some(self.name.clone());
        summary
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Individual('{}')", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build::Build, genotype::Chromosome};

    const KIT_A: &str = "# 23andMe\n# build 37\nrs1\t1\t100\tAA\nrs2\tX\t200\tAG\n";
    const KIT_B: &str = "rsid,chromosome,position,genotype\nrs1,1,100,AA\nrs3,2,300,CT\n";

    #[test]
    fn builds_from_mixed_sources() {
        let individual = Individual::new(
            "Jane Doe",
            [
                Source::from(KIT_A.as_bytes().to_vec()),
                Source::from(KIT_B.as_bytes().to_vec()),
            ],
        )
        .unwrap();

        assert_eq!(individual.genotypes().len(), 3);
        assert_eq!(individual.genotypes().source(), "23andMe, generic");
        assert_eq!(individual.genotypes().build(), Build::Grch37);
        assert_eq!(individual.load_report().merged_sources(), 2);
        assert_eq!(individual.sex(), Sex::Female);
        assert_eq!(individual.var_name(), "Jane_Doe");
        assert_eq!(individual.to_string(), "Individual('Jane Doe')");
    }

    #[test]
    fn failing_source_aborts_construction() {
        let err = Individual::new(
            "x",
            [
                Source::from(KIT_A.as_bytes().to_vec()),
                Source::from(b"not a genotype file".to_vec()),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ReadError::UnsupportedFormat { .. }));
    }

    #[test]
    fn empty_individual_has_no_calls() {
        let individual = Individual::new("empty", Vec::<Source>::new()).unwrap();
        assert!(!individual.genotypes().is_valid());
        assert_eq!(individual.sex(), Sex::Unknown);
    }

    #[test]
    fn deduplicates_male_sample() {
        let mut set = GenotypeSet::with_source("test");
        set.insert(GenotypeCall::new("rs1", Chromosome::X, 5_000_000, "AA"));
        set.insert(GenotypeCall::new("rs2", Chromosome::Mt, 100, "CT"));
        set.set_build(Build::Grch37);

        let mut individual = Individual::new("m", [set]).unwrap();
        let removed = individual.deduplicate(&AnyHeterozygous);
        assert!(removed.discrepant_xy.is_empty());
        assert_eq!(removed.heterozygous_mt.len(), 1);
        assert_eq!(individual.genotypes().get("rs1").unwrap().genotype, "A");
        assert_eq!(individual.var_name(), "m");
    }
}
