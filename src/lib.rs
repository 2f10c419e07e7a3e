#![doc = include_str!("../README.md")]

pub mod build;
pub mod cli;
pub mod dtc;
pub mod export;
pub mod genotype;
pub mod individual;
pub mod merge;
pub mod reader;
pub mod reference;
pub mod sex;
pub mod smart_reader;
pub mod sniff;
pub mod summary;
pub mod vcf;

pub use build::{Build, BuildError, detect_build};
pub use export::{ExportError, VcfExportSummary, VcfOptions, export_csv, export_vcf};
pub use genotype::{Chromosome, GenotypeCall, GenotypeSet};
pub use individual::{Individual, Source};
pub use merge::{Discrepancy, MergeOptions, MergeReport, SourceMergeResult, merge_sets};
pub use reader::{ParsedGenotypes, ReadError, ReadOptions, parse, read_bytes, read_path, read_paths};
pub use reference::{InMemoryReference, ReferenceError, ReferenceGenome, ReferenceProvider};
pub use sex::{AnyHeterozygous, HeterozygosityRatio, Sex, SexPolicy, infer_sex};
pub use sniff::ParserKind;
pub use summary::Summary;
