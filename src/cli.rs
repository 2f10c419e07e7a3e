use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    build::Build,
    export::{self, VcfOptions},
    genotype::{Chromosome, GenotypeSet},
    individual::{Individual, Source},
    merge::{MergeOptions, MergeReport},
    reader::{self, ReadOptions},
    reference::ReferenceGenome,
    sex::{AnyHeterozygous, HeterozygosityRatio, SexPolicy},
    sniff::ParserKind,
    summary::Summary,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Load, merge and export direct-to-consumer genotype files", long_about = None)]
struct Cli {
    /// Logging verbosity (e.g. error, warn, info, debug)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Summarize each input file independently
    Summary {
        #[command(flatten)]
        input: InputArgs,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Merge every input into one person and write CSV
    Merge {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        merge: MergeArgs,

        /// Output CSV path
        #[arg(long, short)]
        output: PathBuf,

        /// Also write <output stem>_summary.json
        #[arg(long)]
        summary_json: bool,
    },
    /// Merge every input and export as CSV or VCF
    Export {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        merge: MergeArgs,

        /// Output path
        #[arg(long, short)]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        to: ExportFormat,

        /// Reference FASTA providing REF bases (required for VCF)
        #[arg(long, value_name = "FASTA")]
        reference: Option<PathBuf>,

        /// Optional explicit FASTA index (.fai) path
        #[arg(long, value_name = "FAI", requires = "reference")]
        reference_fai: Option<PathBuf>,

        /// Sample identifier for the VCF header (defaults to the person's name)
        #[arg(long)]
        sample: Option<String>,

        /// Prefix added to chromosome names in VCF output, e.g. "chr"
        #[arg(long, default_value = "")]
        chrom_prefix: String,
    },
}

#[derive(Debug, Args)]
struct InputArgs {
    /// Genotype files (plain, gzip or zip)
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Input format (sniffed from content if not specified)
    #[arg(long, value_enum)]
    format: Option<ParserKind>,

    /// Genome build (36, 37, 38); detected if not specified
    #[arg(long)]
    build: Option<Build>,

    /// Stop reading each input after this many calls
    #[arg(long)]
    max_records: Option<usize>,

    /// Name of the person the files belong to (defaults to the first file name)
    #[arg(long)]
    name: Option<String>,

    #[arg(long, value_enum, default_value_t = SexRule::AnyHeterozygous)]
    sex_rule: SexRule,
}

#[derive(Debug, Args)]
struct MergeArgs {
    /// Skip a source with more discrepant positions than this
    #[arg(long)]
    positions_threshold: Option<usize>,

    /// Skip a source with more discrepant genotypes than this
    #[arg(long)]
    genotypes_threshold: Option<usize>,

    /// Only merge calls on this chromosome
    #[arg(long)]
    chromosome: Option<Chromosome>,

    /// Replace no-calls with genotypes from later inputs at the same position
    #[arg(long)]
    fill_no_calls: bool,

    /// Treat genotypes such as AT and TA as equal
    #[arg(long)]
    ignore_allele_order: bool,

    /// Collapse haploid MT (and male non-PAR X/Y) calls after merging
    #[arg(long)]
    deduplicate: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, clap::ValueEnum)]
enum ExportFormat {
    Csv,
    Vcf,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, clap::ValueEnum)]
enum SexRule {
    /// Female on any heterozygous X call
    AnyHeterozygous,
    /// X heterozygosity and Y call-rate thresholds
    Ratio,
}

impl SexRule {
    fn policy(self) -> Box<dyn SexPolicy> {
        match self {
            Self::AnyHeterozygous => Box::new(AnyHeterozygous),
            Self::Ratio => Box::new(HeterozygosityRatio::default()),
        }
    }
}

impl InputArgs {
    fn read_options(&self) -> ReadOptions {
        let defaults = ReadOptions::default();
        ReadOptions {
            format: self.format,
            build: self.build,
            max_records: self.max_records.or(defaults.max_records),
        }
    }

    fn person_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.inputs.first().and_then(|p| derive_sample_name(p)))
            .unwrap_or_else(|| String::from("sample"))
    }
}

impl MergeArgs {
    fn options(&self) -> MergeOptions {
        MergeOptions {
            discrepant_positions_threshold: self.positions_threshold,
            discrepant_genotypes_threshold: self.genotypes_threshold,
            chromosome: self.chromosome.clone(),
            fill_no_calls: self.fill_no_calls,
            ignore_allele_order: self.ignore_allele_order,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Command::Summary { input, json } => summarize(&input, json),
        Command::Merge {
            input,
            merge,
            output,
            summary_json,
        } => {
            let individual = load_individual(&input, &merge)?;
            export::write_csv_file(individual.genotypes(), &output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "Wrote {count} calls for {individual} to {path}",
                count = individual.genotypes().len(),
                path = output.display()
            );
            if summary_json {
                summary_for(&individual, input.sex_rule).write(&output)?;
            }
            Ok(())
        }
        Command::Export {
            input,
            merge,
            output,
            to,
            reference,
            reference_fai,
            sample,
            chrom_prefix,
        } => {
            let individual = load_individual(&input, &merge)?;
            match to {
                ExportFormat::Csv => {
                    export::write_csv_file(individual.genotypes(), &output)
                        .with_context(|| format!("failed to write {}", output.display()))?;
                    println!(
                        "Wrote {count} calls to {path}",
                        count = individual.genotypes().len(),
                        path = output.display()
                    );
                }
                ExportFormat::Vcf => {
                    let reference_path = reference.context("--reference is required for VCF export")?;
                    let genome = ReferenceGenome::open(&reference_path, reference_fai).with_context(|| {
                        format!("failed to open reference {}", reference_path.display())
                    })?;
                    let options = VcfOptions {
                        sample_name: sample.unwrap_or_else(|| individual.var_name()),
                        chrom_prefix,
                    };
                    let summary = export::write_vcf_file(individual.genotypes(), &genome, &options, &output)
                        .with_context(|| format!("failed to write {}", output.display()))?;
                    println!(
                        "Wrote {written} records ({no_calls} no-calls) to {path}",
                        written = summary.written,
                        no_calls = summary.no_calls,
                        path = output.display()
                    );
                    if !summary.skipped_rsids.is_empty() {
                        println!(
                            "Skipped {count} calls without a reference base.",
                            count = summary.skipped_rsids.len()
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
    Ok(())
}

fn derive_sample_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let stem = name.split('.').next().unwrap_or_default();
    (!stem.is_empty()).then(|| stem.to_string())
}

fn summary_for(individual: &Individual, rule: SexRule) -> Summary {
    let mut summary = Summary::from_set(individual.genotypes(), rule.policy().as_ref());
    summary.name = Some(individual.name().to_string());
    summary
}

fn summarize(input: &InputArgs, json: bool) -> Result<()> {
    let options = input.read_options();
    let policy = input.sex_rule.policy();
    let mut failures = 0usize;

    for (path, result) in reader::read_paths(&input.inputs, &options) {
        match result {
            Ok(parsed) => {
                let mut summary = Summary::from_set(&parsed.set, policy.as_ref());
                summary.name = derive_sample_name(&path);
                if json {
                    println!("{}", summary.to_json()?);
                } else {
                    print_summary(&path, &summary);
                    if parsed.stats.skipped_rows > 0 {
                        println!("  Ignored {} malformed rows.", parsed.stats.skipped_rows);
                    }
                }
            }
            Err(err) => {
                failures += 1;
                eprintln!("{}: {err}", path.display());
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} inputs could not be read", input.inputs.len());
    }
    Ok(())
}

fn load_individual(input: &InputArgs, merge: &MergeArgs) -> Result<Individual> {
    let read_options = input.read_options();
    let mut sets: Vec<GenotypeSet> = Vec::with_capacity(input.inputs.len());
    for (path, result) in reader::read_paths(&input.inputs, &read_options) {
        let parsed = result.with_context(|| format!("failed to read {}", path.display()))?;
        sets.push(parsed.set);
    }

    let mut individual = Individual::with_options(
        input.person_name(),
        sets.into_iter().map(Source::from),
        &read_options,
        &merge.options(),
    )?;
    print_merge_report(individual.load_report());

    if merge.deduplicate {
        let policy = input.sex_rule.policy();
        let removed = individual.deduplicate(policy.as_ref());
        println!(
            "De-duplicated: removed {xy} discrepant X/Y and {mt} heterozygous MT calls.",
            xy = removed.discrepant_xy.len(),
            mt = removed.heterozygous_mt.len()
        );
    }
    Ok(individual)
}

fn print_summary(path: &Path, summary: &Summary) {
    println!("{}", path.display());
    println!("  Source:      {}", summary.source);
    println!("  Build:       {} ({})", summary.build.number(), summary.assembly);
    println!("  Calls:       {} ({} no-calls)", summary.count, summary.no_calls);
    println!("  Chromosomes: {}", summary.chromosomes_summary);
    println!("  Sex:         {}", summary.sex);
    println!("  Phased:      {}", summary.phased);
}

fn print_merge_report(report: &MergeReport) {
    for result in &report.sources {
        if result.merged {
            println!(
                "Merged {source}: {inserted} new, {filled} filled, {common} shared, {pos} position and {gt} genotype discrepancies.",
                source = result.source,
                inserted = result.inserted,
                filled = result.filled,
                common = result.common_rsids.len(),
                pos = result.discrepant_position_rsids.len(),
                gt = result.discrepant_genotype_rsids.len(),
            );
        } else {
            println!("Did not merge {source}.", source = result.source);
        }
    }
}
