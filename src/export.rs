//! CSV and VCF projections of a [`GenotypeSet`].
//!
//! Exports never reorder or otherwise mutate the set; rows are emitted in
//! canonical order from a sorted view.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use noodles::{
    core::Position,
    vcf::{
        self,
        header::{
            FileFormat,
            record::{
                key,
                value::{
                    Collection, Map,
                    map::{AlternativeAllele, Contig, Format},
                },
            },
        },
        variant::{
            io::Write as VariantRecordWrite,
            record::samples::keys::key as format_key,
            record_buf::{
                AlternateBases, Ids, RecordBuf, Samples,
                samples::{Keys, sample::Value},
            },
        },
    },
};
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};

use crate::{
    genotype::{Chromosome, GenotypeCall, GenotypeSet},
    reference::ReferenceProvider,
};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid VCF header: {0}")]
    Header(String),
    #[error("position {position} on {chromosome} cannot be represented in VCF")]
    InvalidPosition { chromosome: String, position: u64 },
}

pub const CSV_COLUMNS: [&str; 4] = ["rsid", "chromosome", "position", "genotype"];

/// Writes the set as CSV behind a short `#` comment preamble.
pub fn export_csv<W: Write>(set: &GenotypeSet, mut writer: W) -> Result<(), ExportError> {
    writeln!(writer, "# Generated by dtc_genotypes v{}", env!("CARGO_PKG_VERSION"))?;
    writeln!(writer, "# Source(s): {}", set.source())?;
    if set.build().is_known() {
        writeln!(writer, "# Build: {}", set.build().number())?;
    } else {
        writeln!(writer, "# Build: unknown")?;
    }
    writeln!(writer, "# Phased: {}", set.phased())?;

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_COLUMNS)?;
    for call in set.sorted_calls() {
        let position = call.position.to_string();
        let chromosome = call.chromosome.to_string();
        csv_writer.write_record([
            call.rsid.as_str(),
            chromosome.as_str(),
            position.as_str(),
            call.genotype.as_str(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn to_csv_string(set: &GenotypeSet) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    export_csv(set, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn write_csv_file(set: &GenotypeSet, path: impl AsRef<Path>) -> Result<(), ExportError> {
    let file = File::create(path.as_ref())?;
    export_csv(set, BufWriter::new(file))
}

#[derive(Debug, Clone)]
pub struct VcfOptions {
    pub sample_name: String,
    /// Prepended to every chromosome label, e.g. `chr`.
    pub chrom_prefix: String,
}

impl Default for VcfOptions {
    fn default() -> Self {
        Self {
            sample_name: String::from("SAMPLE"),
            chrom_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcfExportSummary {
    pub written: usize,
    pub no_calls: usize,
    /// Calls left out because their reference base could not be looked up.
    pub skipped_rsids: Vec<String>,
}

/// REF/ALT columns and GT string for one call.
#[derive(Debug, PartialEq, Eq)]
struct EncodedCall {
    reference: String,
    alternates: Vec<String>,
    genotype: String,
}

fn allele_symbol(allele: char) -> String {
    match allele {
        'D' => String::from("<DEL>"),
        'I' => String::from("<INS>"),
        base => base.to_string(),
    }
}

fn encode_call(call: &GenotypeCall, reference_base: char) -> EncodedCall {
    let reference = reference_base.to_string();
    if call.is_no_call() {
        return EncodedCall {
            reference,
            alternates: Vec::new(),
            genotype: String::from("./."),
        };
    }

    let mut alternates: Vec<String> = Vec::new();
    let codes: Vec<String> = call
        .genotype
        .chars()
        .map(|allele| {
            if allele == reference_base {
                return String::from("0");
            }
            let symbol = allele_symbol(allele);
            let index = match alternates.iter().position(|alt| *alt == symbol) {
                Some(index) => index,
                None => {
                    alternates.push(symbol);
                    alternates.len() - 1
                }
            };
            (index + 1).to_string()
        })
        .collect();

    EncodedCall {
        reference,
        alternates,
        genotype: codes.join("/"),
    }
}

fn contig_name(chromosome: &Chromosome, options: &VcfOptions) -> String {
    format!("{}{}", options.chrom_prefix, chromosome)
}

fn build_header<R>(set: &GenotypeSet, reference: &R, options: &VcfOptions) -> Result<vcf::Header, ExportError>
where
    R: ReferenceProvider + ?Sized,
{
    let mut builder = vcf::Header::builder().set_file_format(FileFormat::new(4, 2));

    let genotype_format = Map::<Format>::from(format_key::GENOTYPE);
    builder = builder
        .add_format(format_key::GENOTYPE, genotype_format)
        .add_alternative_allele("DEL", Map::<AlternativeAllele>::new("Deletion"))
        .add_alternative_allele("INS", Map::<AlternativeAllele>::new("Insertion"));

    for chromosome in set.chromosomes() {
        let mut contig = Map::<Contig>::new();
        if let Some(length) = reference
            .contig_length(&chromosome)
            .and_then(|length| usize::try_from(length).ok())
        {
            *contig.length_mut() = Some(length);
        }
        builder = builder.add_contig(contig_name(&chromosome, options), contig);
    }

    builder = builder.add_sample_name(options.sample_name.clone());
    let mut header = builder.build();

    insert_other_record(
        &mut header,
        "source",
        format!("dtc_genotypes {}", env!("CARGO_PKG_VERSION")),
    )?;
    insert_other_record(&mut header, "assembly", set.assembly().to_string())?;

    let date_format = format_description!("[year][month][day]");
    let today = OffsetDateTime::now_utc()
        .format(&date_format)
        .unwrap_or_else(|_| String::from("19700101"));
    insert_other_record(&mut header, "fileDate", today)?;

    Ok(header)
}

fn insert_other_record(header: &mut vcf::Header, key: &str, value: String) -> Result<(), ExportError> {
    let key: key::Other = key
        .parse()
        .map_err(|e| ExportError::Header(format!("invalid header key {key}: {e}")))?;
    header
        .other_records_mut()
        .insert(key, Collection::Unstructured(vec![value]));
    Ok(())
}

fn build_record(
    call: &GenotypeCall,
    encoded: EncodedCall,
    keys: &Keys,
    options: &VcfOptions,
) -> Result<RecordBuf, ExportError> {
    let start = usize::try_from(call.position)
        .ok()
        .and_then(Position::new)
        .ok_or_else(|| ExportError::InvalidPosition {
            chromosome: call.chromosome.to_string(),
            position: call.position,
        })?;

    let ids: Ids = [call.rsid.clone()].into_iter().collect();
    let samples = Samples::new(
        keys.clone(),
        vec![vec![Some(Value::String(encoded.genotype))]],
    );

    Ok(RecordBuf::builder()
        .set_reference_sequence_name(contig_name(&call.chromosome, options))
        .set_variant_start(start)
        .set_ids(ids)
        .set_reference_bases(encoded.reference)
        .set_alternate_bases(AlternateBases::from(encoded.alternates))
        .set_samples(samples)
        .build())
}

/// Writes the set as a single-sample VCF, looking up REF bases in `reference`.
///
/// Calls whose reference lookup fails are skipped and listed in the summary.
pub fn export_vcf<W, R>(
    set: &GenotypeSet,
    reference: &R,
    options: &VcfOptions,
    writer: W,
) -> Result<VcfExportSummary, ExportError>
where
    W: Write,
    R: ReferenceProvider + ?Sized,
{
    let header = build_header(set, reference, options)?;
    let mut writer = vcf::io::Writer::new(writer);
    writer.write_header(&header)?;

    let keys: Keys = vec![String::from("GT")].into_iter().collect();
    let mut summary = VcfExportSummary::default();

    for call in set.sorted_calls() {
        let reference_base = match reference.base(&call.chromosome, call.position) {
            Ok(base) => base,
            Err(e) => {
                tracing::debug!(
                    rsid = %call.rsid,
                    chromosome = %call.chromosome,
                    position = call.position,
                    "reference lookup failed: {e}"
                );
                summary.skipped_rsids.push(call.rsid.clone());
                continue;
            }
        };

        if call.is_no_call() {
            summary.no_calls += 1;
        }
        let record = build_record(call, encode_call(call, reference_base), &keys, options)?;
        writer.write_variant_record(&header, &record)?;
        summary.written += 1;
    }

    if !summary.skipped_rsids.is_empty() {
        tracing::warn!(
            skipped = summary.skipped_rsids.len(),
            "calls without a reference base were not exported"
        );
    }
    Ok(summary)
}

pub fn to_vcf_string<R>(
    set: &GenotypeSet,
    reference: &R,
    options: &VcfOptions,
) -> Result<(String, VcfExportSummary), ExportError>
where
    R: ReferenceProvider + ?Sized,
{
    let mut buf = Vec::new();
    let summary = export_vcf(set, reference, options, &mut buf)?;
    Ok((String::from_utf8_lossy(&buf).into_owned(), summary))
}

pub fn write_vcf_file<R>(
    set: &GenotypeSet,
    reference: &R,
    options: &VcfOptions,
    path: impl AsRef<Path>,
) -> Result<VcfExportSummary, ExportError>
where
    R: ReferenceProvider + ?Sized,
{
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    let summary = export_vcf(set, reference, options, &mut writer)?;
    writer.flush()?;
    Ok(summary)
}
