//! Entry point for turning raw bytes or files into a [`GenotypeSet`].

use std::{
    io,
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use thiserror::Error;

use crate::{
    build::{Build, BuildError, detect_build},
    genotype::{GenotypeCall, GenotypeSet},
    smart_reader,
    sniff::{self, ParserKind},
};

/// Environment variable capping the number of calls read from a single input.
pub const MAX_RECORDS_ENV: &str = "DTC_GENOTYPES_MAX_RECORDS";

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("unsupported genotype format: {reason}")]
    UnsupportedFormat { reason: String },
    #[error("corrupt input: {reason}")]
    CorruptInput { reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl ReadError {
    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            reason: reason.into(),
        }
    }
}

/// Knobs for a single read.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Skip format sniffing and use this parser.
    pub format: Option<ParserKind>,
    /// Skip build detection and stamp this build.
    pub build: Option<Build>,
    /// Stop after this many calls. Defaults to [`MAX_RECORDS_ENV`] when set.
    pub max_records: Option<usize>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            format: None,
            build: None,
            max_records: max_records_from_env(),
        }
    }
}

fn max_records_from_env() -> Option<usize> {
    let raw = std::env::var(MAX_RECORDS_ENV).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(limit) => Some(limit),
        Err(_) => {
            tracing::warn!(value = %raw, "ignoring invalid {MAX_RECORDS_ENV}");
            None
        }
    }
}

/// Row accounting for a single read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub rows: usize,
    pub skipped_rows: usize,
    pub repeated_headers: usize,
    pub duplicate_rsids: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct ParsedGenotypes {
    pub set: GenotypeSet,
    pub kind: ParserKind,
    /// Build named in the file's own metadata, if any.
    pub build_hint: Option<Build>,
    pub stats: ReadStats,
}

/// Accumulates calls for a parser, enforcing first-rsid-wins and the record cap.
pub(crate) struct CallCollector {
    set: GenotypeSet,
    stats: ReadStats,
    limit: Option<usize>,
}

impl CallCollector {
    pub(crate) fn new(source: &str, limit: Option<usize>) -> Self {
        Self {
            set: GenotypeSet::with_source(source),
            stats: ReadStats::default(),
            limit,
        }
    }

    /// Adds a call. Returns `false` once the record cap is reached.
    pub(crate) fn push(&mut self, call: GenotypeCall) -> bool {
        if self.limit.is_some_and(|limit| self.set.len() >= limit) {
            if !self.stats.truncated {
                tracing::warn!(limit = ?self.limit, "record limit reached; ignoring remaining rows");
            }
            self.stats.truncated = true;
            return false;
        }
        self.stats.rows += 1;
        if !self.set.insert_if_absent(call) {
            self.stats.duplicate_rsids += 1;
        }
        true
    }

    pub(crate) fn skip(&mut self, line: usize, reason: &dyn std::fmt::Display) {
        tracing::debug!(line, "skipping row: {reason}");
        self.stats.skipped_rows += 1;
    }

    pub(crate) fn repeated_header(&mut self, line: usize) {
        tracing::debug!(line, "skipping repeated header row");
        self.stats.repeated_headers += 1;
    }

    pub(crate) fn set_phased(&mut self, phased: bool) {
        self.set.set_phased(phased);
    }

    pub(crate) fn finish(self) -> (GenotypeSet, ReadStats) {
        (self.set, self.stats)
    }
}

/// Parses raw bytes: decompresses, sniffs the format, parses, detects the
/// build and sorts.
pub fn read_bytes(bytes: Vec<u8>, options: &ReadOptions) -> Result<ParsedGenotypes, ReadError> {
    let raw = smart_reader::decompress(bytes)?;
    let text = smart_reader::to_text(&raw);

    let kind = match options.format {
        Some(kind) => kind,
        None => sniff::sniff(&text)?,
    };
    tracing::debug!(format = %kind, "parsing genotype input");

    let parsed = kind.parse(&text, options.max_records)?;
    let mut set = parsed.set;
    if set.is_empty() {
        tracing::warn!(format = %kind, "no genotype calls found");
    }

    let build = match options.build {
        Some(build) => build,
        None => detect_build(&set, parsed.build_hint)?,
    };
    set.set_build(build);
    set.sort();

    tracing::info!(
        format = %kind,
        calls = set.len(),
        build = %build,
        skipped = parsed.stats.skipped_rows,
        "read genotype input"
    );

    Ok(ParsedGenotypes {
        set,
        kind,
        build_hint: parsed.build_hint,
        stats: parsed.stats,
    })
}

pub fn read_path(path: impl AsRef<Path>, options: &ReadOptions) -> Result<ParsedGenotypes, ReadError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "opening genotype input");
    let bytes = std::fs::read(path)?;
    read_bytes(bytes, options)
}

/// Reads a genotype file into a [`GenotypeSet`] using default options.
pub fn parse(bytes: Vec<u8>, format: Option<ParserKind>) -> Result<GenotypeSet, ReadError> {
    let options = ReadOptions {
        format,
        ..ReadOptions::default()
    };
    read_bytes(bytes, &options).map(|parsed| parsed.set)
}

/// Reads several files in parallel, keeping each outcome next to its path.
pub fn read_paths(
    paths: &[PathBuf],
    options: &ReadOptions,
) -> Vec<(PathBuf, Result<ParsedGenotypes, ReadError>)> {
    paths
        .par_iter()
        .map(|path| (path.clone(), read_path(path, options)))
        .collect()
}

/// Output of a format-specific parser before build detection.
pub(crate) struct ParserOutput {
    pub set: GenotypeSet,
    pub build_hint: Option<Build>,
    pub stats: ReadStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::Chromosome;

    const TWENTY_THREE: &str = "\
# This data file generated by 23andMe at: Thu Jan 01 00:00:00 2020
# We are using reference human assembly build 37 (also known as Annotation Release 104).
# rsid\tchromosome\tposition\tgenotype
rs2\t2\t200\tCT
rs1\t1\t100\tAA
i3\tMT\t300\tA
";

    #[test]
    fn reads_and_sorts_23andme() {
        let parsed = read_bytes(TWENTY_THREE.as_bytes().to_vec(), &ReadOptions::default()).unwrap();
        assert_eq!(parsed.kind, ParserKind::TwentyThreeAndMe);
        assert_eq!(parsed.set.build(), Build::Grch37);
        assert_eq!(parsed.build_hint, Some(Build::Grch37));
        assert_eq!(parsed.set.source(), "23andMe");
        let rsids: Vec<&str> = parsed.set.rsids().collect();
        assert_eq!(rsids, ["rs1", "rs2", "i3"]);
        assert_eq!(parsed.set.get("i3").unwrap().chromosome, Chromosome::Mt);
    }

    #[test]
    fn explicit_build_overrides_detection() {
        let options = ReadOptions {
            build: Some(Build::Grch38),
            ..ReadOptions::default()
        };
        let parsed = read_bytes(TWENTY_THREE.as_bytes().to_vec(), &options).unwrap();
        assert_eq!(parsed.set.build(), Build::Grch38);
    }

    #[test]
    fn record_limit_truncates() {
        let options = ReadOptions {
            max_records: Some(2),
            ..ReadOptions::default()
        };
        let parsed = read_bytes(TWENTY_THREE.as_bytes().to_vec(), &options).unwrap();
        assert_eq!(parsed.set.len(), 2);
        assert!(parsed.stats.truncated);
    }

    #[test]
    fn empty_input_is_unsupported() {
        let err = parse(Vec::new(), None).unwrap_err();
        assert!(matches!(err, ReadError::UnsupportedFormat { .. }));
    }

    #[test]
    fn unrecognized_text_is_unsupported() {
        let err = parse(b"hello world\nthis is not genotype data\n".to_vec(), None).unwrap_err();
        assert!(matches!(err, ReadError::UnsupportedFormat { .. }));
    }
}
