//! In-memory genotype model shared by every reader, merger and exporter.
//!
//! A [`GenotypeSet`] owns its calls exclusively and keys them by rsid. Iteration
//! order is insertion order until [`GenotypeSet::sort`] reorders it canonically.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt,
    str::FromStr,
};

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::build::{Build, ParBoundaries};

/// A chromosome label normalized on input (`chr` prefix dropped, upper-cased, `M` folded into `MT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Chromosome {
    Autosome(u8),
    X,
    Y,
    Mt,
    /// Anything else a vendor emits (`PAR`, `0`, `XY`, ...). Sorts after `MT`.
    Other(String),
}

impl Chromosome {
    /// Parses a raw chromosome label. Returns `None` for an empty field.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_matches('"');
        let stripped = match trimmed.get(..3) {
            Some(prefix) if prefix.eq_ignore_ascii_case("chr") => &trimmed[3..],
            _ => trimmed,
        };
        if stripped.is_empty() {
            return None;
        }

        let upper = stripped.to_ascii_uppercase();
        let chromosome = match upper.as_str() {
            "X" => Self::X,
            "Y" => Self::Y,
            "M" | "MT" => Self::Mt,
            other => match other.parse::<u8>() {
                Ok(n) if (1..=22).contains(&n) => Self::Autosome(n),
                _ => Self::Other(upper),
            },
        };
        Some(chromosome)
    }

    pub fn is_autosome(&self) -> bool {
        matches!(self, Self::Autosome(_))
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Autosome(n) => *n,
            Self::X => 23,
            Self::Y => 24,
            Self::Mt => 25,
            Self::Other(_) => 26,
        }
    }
}

impl Ord for Chromosome {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| match (self, other) {
                (Self::Other(a), Self::Other(b)) => a.cmp(b),
                _ => Ordering::Equal,
            })
    }
}

impl PartialOrd for Chromosome {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Autosome(n) => write!(f, "{n}"),
            Self::X => f.write_str("X"),
            Self::Y => f.write_str("Y"),
            Self::Mt => f.write_str("MT"),
            Self::Other(label) => f.write_str(label),
        }
    }
}

impl FromStr for Chromosome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| String::from("empty chromosome label"))
    }
}

impl Serialize for Chromosome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Normalizes a raw genotype field to zero, one or two upper-case allele characters.
///
/// Separators (`/`, `|`, spaces, quotes) are dropped. Any missing-allele marker
/// (`-`, `0`, `?`, `.`), a non-alphabetic character or more than two alleles
/// turn the whole call into a no-call (`""`).
pub fn normalize_genotype(raw: &str) -> String {
    let alleles: String = raw
        .chars()
        .filter(|c| !matches!(c, '/' | '|' | ' ' | '\t' | '"'))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if alleles.len() > 2 || !alleles.chars().all(|c| c.is_ascii_alphabetic()) {
        return String::new();
    }
    alleles
}

/// One observed SNP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenotypeCall {
    pub rsid: String,
    pub chromosome: Chromosome,
    pub position: u64,
    pub genotype: String,
}

impl GenotypeCall {
    /// Builds a call, normalizing the raw genotype.
    pub fn new(rsid: impl Into<String>, chromosome: Chromosome, position: u64, genotype: &str) -> Self {
        Self {
            rsid: rsid.into(),
            chromosome,
            position,
            genotype: normalize_genotype(genotype),
        }
    }

    pub fn is_no_call(&self) -> bool {
        self.genotype.is_empty()
    }

    pub fn is_heterozygous(&self) -> bool {
        let bytes = self.genotype.as_bytes();
        bytes.len() == 2 && bytes[0] != bytes[1]
    }

    pub fn is_homozygous(&self) -> bool {
        let bytes = self.genotype.as_bytes();
        bytes.len() == 2 && bytes[0] == bytes[1]
    }

    /// True when both calls carry the same alleles, ignoring allele order.
    pub fn same_alleles(&self, other: &str) -> bool {
        if self.genotype == other {
            return true;
        }
        let (a, b) = (self.genotype.as_bytes(), other.as_bytes());
        a.len() == 2 && b.len() == 2 && a[0] == b[1] && a[1] == b[0]
    }

    pub fn same_locus(&self, other: &GenotypeCall) -> bool {
        self.chromosome == other.chromosome && self.position == other.position
    }

    /// Canonical order: chromosome rank, position, then rsid.
    pub fn canonical_cmp(&self, other: &GenotypeCall) -> Ordering {
        self.chromosome
            .cmp(&other.chromosome)
            .then(self.position.cmp(&other.position))
            .then_with(|| self.rsid.cmp(&other.rsid))
    }
}

impl fmt::Display for GenotypeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.rsid, self.chromosome, self.position, self.genotype
        )
    }
}

/// A sample's full call set plus sample-level metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenotypeSet {
    calls: IndexMap<String, GenotypeCall>,
    build: Build,
    sources: Vec<String>,
    phased: bool,
}

impl GenotypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty set labelled with the vendor/format it came from.
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            sources: vec![source.into()],
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// A set is valid once it holds at least one call.
    pub fn is_valid(&self) -> bool {
        !self.calls.is_empty()
    }

    pub fn get(&self, rsid: &str) -> Option<&GenotypeCall> {
        self.calls.get(rsid)
    }

    pub fn contains(&self, rsid: &str) -> bool {
        self.calls.contains_key(rsid)
    }

    /// Inserts or replaces the call for its rsid, returning the previous call.
    /// A replaced call keeps its position in the iteration order.
    pub fn insert(&mut self, call: GenotypeCall) -> Option<GenotypeCall> {
        self.calls.insert(call.rsid.clone(), call)
    }

    /// Inserts the call only when its rsid is absent. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, call: GenotypeCall) -> bool {
        match self.calls.entry(call.rsid.clone()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(call);
                true
            }
        }
    }

    /// Replaces the genotype of an existing call. Returns `false` if the rsid is absent.
    pub fn set_genotype(&mut self, rsid: &str, genotype: &str) -> bool {
        match self.calls.get_mut(rsid) {
            Some(call) => {
                call.genotype = normalize_genotype(genotype);
                true
            }
            None => false,
        }
    }

    /// Removes a call while preserving the relative order of the others.
    pub fn remove(&mut self, rsid: &str) -> Option<GenotypeCall> {
        self.calls.shift_remove(rsid)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &GenotypeCall> + ExactSizeIterator {
        self.calls.values()
    }

    pub fn rsids(&self) -> impl Iterator<Item = &str> {
        self.calls.keys().map(String::as_str)
    }

    pub fn build(&self) -> Build {
        self.build
    }

    pub fn set_build(&mut self, build: Build) {
        self.build = build;
    }

    /// Assembly name for the current build (`"unknown"` when the build is unknown).
    pub fn assembly(&self) -> &'static str {
        self.build.assembly()
    }

    /// Source label; merged sets join every contributing label with `", "`.
    pub fn source(&self) -> String {
        self.sources.join(", ")
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn add_source(&mut self, source: impl Into<String>) {
        self.sources.push(source.into());
    }

    pub(crate) fn extend_sources(&mut self, sources: &[String]) {
        self.sources.extend(sources.iter().cloned());
    }

    pub fn phased(&self) -> bool {
        self.phased
    }

    pub fn set_phased(&mut self, phased: bool) {
        self.phased = phased;
    }

    /// Reorders calls canonically: `1..22`, `X`, `Y`, `MT`, other labels lexically,
    /// then position, then rsid. The sort is stable and idempotent.
    pub fn sort(&mut self) {
        self.calls.sort_by(|_, a, _, b| a.canonical_cmp(b));
    }

    pub fn is_sorted(&self) -> bool {
        self.calls
            .values()
            .zip(self.calls.values().skip(1))
            .all(|(a, b)| a.canonical_cmp(b) != Ordering::Greater)
    }

    /// Calls in canonical order without reordering the set itself.
    pub fn sorted_calls(&self) -> Vec<&GenotypeCall> {
        let mut calls: Vec<&GenotypeCall> = self.calls.values().collect();
        calls.sort_by(|a, b| a.canonical_cmp(b));
        calls
    }

    /// Distinct chromosomes in canonical order.
    pub fn chromosomes(&self) -> Vec<Chromosome> {
        self.counts_by_chromosome().into_keys().collect()
    }

    pub fn counts_by_chromosome(&self) -> BTreeMap<Chromosome, usize> {
        let mut counts = BTreeMap::new();
        for call in self.calls.values() {
            *counts.entry(call.chromosome.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of calls on one chromosome, including no-calls.
    pub fn count_on(&self, chromosome: &Chromosome) -> usize {
        self.calls
            .values()
            .filter(|call| &call.chromosome == chromosome)
            .count()
    }

    pub fn no_call_count(&self) -> usize {
        self.calls.values().filter(|call| call.is_no_call()).count()
    }

    fn on<'a>(
        &'a self,
        chromosome: Option<&'a Chromosome>,
    ) -> impl Iterator<Item = &'a GenotypeCall> + 'a {
        self.calls
            .values()
            .filter(move |call| chromosome.is_none_or(|c| &call.chromosome == c))
    }

    /// Heterozygous two-allele calls, optionally restricted to one chromosome.
    pub fn heterozygous<'a>(
        &'a self,
        chromosome: Option<&'a Chromosome>,
    ) -> impl Iterator<Item = &'a GenotypeCall> + 'a {
        self.on(chromosome).filter(|call| call.is_heterozygous())
    }

    pub fn homozygous<'a>(
        &'a self,
        chromosome: Option<&'a Chromosome>,
    ) -> impl Iterator<Item = &'a GenotypeCall> + 'a {
        self.on(chromosome).filter(|call| call.is_homozygous())
    }

    pub fn not_null<'a>(
        &'a self,
        chromosome: Option<&'a Chromosome>,
    ) -> impl Iterator<Item = &'a GenotypeCall> + 'a {
        self.on(chromosome).filter(|call| !call.is_no_call())
    }

    /// Compact chromosome listing, e.g. `"1-3, 5, X, MT"`.
    pub fn chromosomes_summary(&self) -> String {
        let chromosomes = self.chromosomes();
        let mut parts = Vec::new();

        let mut run: Option<(u8, u8)> = None;
        for chromosome in &chromosomes {
            let Chromosome::Autosome(n) = chromosome else {
                continue;
            };
            run = match run {
                Some((start, end)) if end + 1 == *n => Some((start, *n)),
                Some(previous) => {
                    parts.push(format_run(previous));
                    Some((*n, *n))
                }
                None => Some((*n, *n)),
            };
        }
        if let Some(last) = run {
            parts.push(format_run(last));
        }

        parts.extend(
            chromosomes
                .iter()
                .filter(|c| !c.is_autosome())
                .map(ToString::to_string),
        );
        parts.join(", ")
    }

    /// Cleans up haploid sex chromosomes that a vendor reported as diploid.
    ///
    /// Only meaningful for male samples with a known build. Heterozygous calls
    /// outside the pseudo-autosomal regions are removed and returned; homozygous
    /// ones are collapsed to a single allele.
    pub fn deduplicate_sex_chromosomes(&mut self) -> Vec<GenotypeCall> {
        let Some(boundaries) = ParBoundaries::new(self.build) else {
            tracing::warn!("build unknown; skipping sex chromosome de-duplication");
            return Vec::new();
        };

        let mut removed = Vec::new();
        for chromosome in [Chromosome::X, Chromosome::Y] {
            let Some((start, stop)) = boundaries.non_par_bounds(&chromosome) else {
                continue;
            };
            let in_non_par =
                |call: &GenotypeCall| call.chromosome == chromosome && call.position > start && call.position < stop;
            removed.extend(self.collapse_where(in_non_par));
        }

        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), "dropped discrepant XY calls");
        }
        removed
    }

    /// Removes heterozygous MT calls and collapses homozygous ones to one allele.
    pub fn deduplicate_mt(&mut self) -> Vec<GenotypeCall> {
        let removed = self.collapse_where(|call| call.chromosome == Chromosome::Mt);
        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), "dropped heterozygous MT calls");
        }
        removed
    }

    fn collapse_where<F>(&mut self, selected: F) -> Vec<GenotypeCall>
    where
        F: Fn(&GenotypeCall) -> bool,
    {
        let heterozygous: Vec<String> = self
            .calls
            .values()
            .filter(|call| selected(call) && call.is_heterozygous())
            .map(|call| call.rsid.clone())
            .collect();

        let removed = heterozygous
            .iter()
            .filter_map(|rsid| self.calls.shift_remove(rsid))
            .collect();

        for call in self.calls.values_mut() {
            if selected(call) && call.is_homozygous() {
                call.genotype.truncate(1);
            }
        }
        removed
    }
}

fn format_run((start, end): (u8, u8)) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

impl FromIterator<GenotypeCall> for GenotypeSet {
    /// Collects calls keeping the first occurrence of each rsid.
    fn from_iter<I: IntoIterator<Item = GenotypeCall>>(iter: I) -> Self {
        let mut set = GenotypeSet::new();
        for call in iter {
            set.insert_if_absent(call);
        }
        set
    }
}
