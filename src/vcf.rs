//! Single-sample VCF input.
//!
//! Only the first sample column is read. Genotype indices are resolved against
//! REF/ALT into plain allele letters. Multi-allelic records and anything that is
//! not a one or two allele SNV call become no-calls.

use crate::{
    genotype::{Chromosome, GenotypeCall},
    reader::{CallCollector, ParserOutput, ReadError},
    sniff::{self, ParserKind},
};

const FIXED_COLUMNS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SampleGenotype {
    alleles: String,
    phased: bool,
}

/// Resolves a GT field such as `0/1` or `1|1` against the record's alleles.
///
/// Returns `None` for records with more than one ALT allele.
fn resolve_gt(gt: &str, reference: &str, alternates: &[&str]) -> Option<SampleGenotype> {
    if alternates.len() > 1 {
        return None;
    }
    let phased = gt.contains('|');
    let mut alleles = String::with_capacity(2);
    let mut count = 0;

    for index in gt.split(['/', '|']) {
        count += 1;
        if count > 2 {
            return None;
        }
        let index: usize = index.parse().ok()?;
        let allele = match index {
            0 => reference,
            n => alternates.get(n - 1).copied()?,
        };
        if allele.len() != 1 || !allele.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        alleles.push_str(allele);
    }

    Some(SampleGenotype {
        alleles,
        phased: phased && count == 2,
    })
}

pub(crate) fn parse(text: &str, limit: Option<usize>) -> Result<ParserOutput, ReadError> {
    let mut meta = Vec::new();
    let mut lines = text.lines().enumerate().map(|(idx, line)| (idx + 1, line));

    let mut width = None;
    for (_, line) in lines.by_ref() {
        if let Some(rest) = line.strip_prefix("##") {
            meta.push(rest);
            continue;
        }
        if line.starts_with("#CHROM") {
            width = Some(line.split('\t').count());
            break;
        }
        if !line.trim().is_empty() {
            return Err(ReadError::unsupported("VCF data line before #CHROM header"));
        }
    }

    let width = width.ok_or_else(|| ReadError::unsupported("VCF has no #CHROM header line"))?;
    if width <= FIXED_COLUMNS {
        return Err(ReadError::unsupported("VCF has no sample column"));
    }

    let mut collector = CallCollector::new(ParserKind::Vcf.label(), limit);
    let mut called = 0usize;
    let mut phased = 0usize;

    for (line_no, line) in lines {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != width {
            collector.skip(
                line_no,
                &format_args!("expected {width} columns, found {}", fields.len()),
            );
            continue;
        }

        let rsid = fields[2].split(';').next().unwrap_or(".");
        if rsid.is_empty() || rsid == "." {
            collector.skip(line_no, &"record has no ID");
            continue;
        }
        let Some(chromosome) = Chromosome::parse(fields[0]) else {
            collector.skip(line_no, &"missing chromosome");
            continue;
        };
        let position = match fields[1].parse::<u64>() {
            Ok(position) => position,
            Err(err) => {
                collector.skip(line_no, &format_args!("invalid position: {err}"));
                continue;
            }
        };

        let alternates: Vec<&str> = match fields[4] {
            "." => Vec::new(),
            alt => alt.split(',').collect(),
        };
        let gt = fields[8]
            .split(':')
            .position(|key| key == "GT")
            .and_then(|idx| fields[FIXED_COLUMNS].split(':').nth(idx));

        let genotype = gt.and_then(|gt| resolve_gt(gt, fields[3], &alternates));
        let alleles = match genotype {
            Some(genotype) => {
                called += 1;
                if genotype.phased {
                    phased += 1;
                }
                genotype.alleles
            }
            None => String::new(),
        };

        if !collector.push(GenotypeCall::new(rsid, chromosome, position, &alleles)) {
            break;
        }
    }

    collector.set_phased(called > 0 && phased == called);
    let (set, stats) = collector.finish();

    Ok(ParserOutput {
        set,
        build_hint: sniff::build_hint(meta),
        stats,
    })
}
