//! Parsers for tabular direct-to-consumer exports.
//!
//! Every vendor format is a delimited table of rsid, chromosome, position and
//! either a joined genotype or two allele columns. Formats differ in their
//! comment conventions, delimiters, quoting and header names, which is what the
//! `parse_*` entry points configure.

use std::{borrow::Cow, num::ParseIntError};

use thiserror::Error;

use crate::{
    genotype::{Chromosome, GenotypeCall},
    reader::{CallCollector, ParserOutput, ReadError},
    sniff::{self, Delimiter, ParserKind},
};

/// Why a data row was skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("missing rsid")]
    MissingRsid,
    #[error("missing chromosome")]
    MissingChromosome,
    #[error("invalid position: {0}")]
    InvalidPosition(#[from] ParseIntError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenotypeColumns {
    Joined(usize),
    Split(usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    rsid: usize,
    rsid_fallback: Option<usize>,
    chromosome: usize,
    position: usize,
    genotype: GenotypeColumns,
    width: usize,
}

impl Columns {
    const JOINED: Self = Self {
        rsid: 0,
        rsid_fallback: None,
        chromosome: 1,
        position: 2,
        genotype: GenotypeColumns::Joined(3),
        width: 4,
    };

    const SPLIT: Self = Self {
        genotype: GenotypeColumns::Split(3, 4),
        width: 5,
        ..Self::JOINED
    };

    fn for_width(width: usize) -> Self {
        if width == Self::SPLIT.width {
            Self::SPLIT
        } else {
            Self::JOINED
        }
    }

    fn from_header(names: &[String]) -> Result<Self, ReadError> {
        let find = |candidates: &[&str]| {
            candidates
                .iter()
                .find_map(|candidate| names.iter().position(|name| name == candidate))
        };
        let require = |candidates: &[&str], what: &str| {
            find(candidates)
                .ok_or_else(|| ReadError::unsupported(format!("header has no {what} column")))
        };

        let rsid = require(&["rsid", "snp", "name", "id", "marker"], "rsid")?;
        let chromosome = require(&["chromosome", "chrom", "chr"], "chromosome")?;
        let position = require(&["position", "pos", "bp"], "position")?;
        let genotype = match find(&["genotype", "result", "genotypes", "call"]) {
            Some(idx) => GenotypeColumns::Joined(idx),
            None => GenotypeColumns::Split(
                require(&["allele1", "allele 1"], "genotype")?,
                require(&["allele2", "allele 2"], "genotype")?,
            ),
        };

        Ok(Self {
            rsid,
            rsid_fallback: None,
            chromosome,
            position,
            genotype,
            width: names.len(),
        })
    }
}

fn normalize_name(field: &str) -> String {
    field
        .trim_start_matches('#')
        .trim()
        .trim_matches('"')
        .to_ascii_lowercase()
}

/// Splits a row and strips surrounding whitespace and quotes from each field.
///
/// Comma rows are read with the `csv` crate so quoted fields may hold commas and
/// escaped quotes. With `collapse_empty`, empty fields produced by repeated
/// delimiters are dropped.
pub(crate) fn split_fields<'a>(line: &'a str, delimiter: Delimiter, collapse_empty: bool) -> Vec<Cow<'a, str>> {
    let clean = |field: &'a str| field.trim().trim_matches('"').trim();
    let mut fields: Vec<Cow<'a, str>> = match delimiter {
        Delimiter::Tab => line.split('\t').map(|f| Cow::Borrowed(clean(f))).collect(),
        Delimiter::Whitespace => line.split_whitespace().map(|f| Cow::Borrowed(clean(f))).collect(),
        Delimiter::Comma => csv_fields(line).into_iter().map(Cow::Owned).collect(),
    };
    if collapse_empty {
        fields.retain(|field| !field.is_empty());
    }
    fields
}

fn csv_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All);
    builder
}

fn csv_fields(line: &str) -> Vec<String> {
    csv_builder()
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map(|record| record.iter().map(str::to_string).collect())
        .unwrap_or_default()
}

fn record_line(position: Option<&csv::Position>) -> usize {
    position.map_or(0, |p| usize::try_from(p.line()).unwrap_or(usize::MAX))
}

/// A configured table reader for one export.
struct Table {
    columns: Columns,
    delimiter: Delimiter,
    collapse_empty: bool,
    chromosome: fn(&str) -> Option<Chromosome>,
    header_key: Option<String>,
    /// Header already consumed from comments, so every header row in the data is a repeat.
    header_in_comments: bool,
}

impl Table {
    fn new(columns: Columns, delimiter: Delimiter) -> Self {
        Self {
            columns,
            delimiter,
            collapse_empty: false,
            chromosome: Chromosome::parse,
            header_key: None,
            header_in_comments: false,
        }
    }

    fn is_header_row(&self, fields: &[&str]) -> bool {
        let Some(first) = fields.first() else {
            return false;
        };
        let key = normalize_name(first);
        key == "rsid" || self.header_key.as_deref() == Some(key.as_str())
    }

    fn parse_row(&self, fields: &[&str]) -> Result<GenotypeCall, RowError> {
        let columns = &self.columns;
        if fields.len() != columns.width {
            return Err(RowError::FieldCount {
                expected: columns.width,
                found: fields.len(),
            });
        }

        let mut rsid = fields[columns.rsid];
        if matches!(rsid, "" | ".")
            && let Some(fallback) = columns.rsid_fallback
        {
            rsid = fields[fallback];
        }
        if matches!(rsid, "" | ".") {
            return Err(RowError::MissingRsid);
        }

        let chromosome =
            (self.chromosome)(fields[columns.chromosome]).ok_or(RowError::MissingChromosome)?;
        let position = fields[columns.position].parse::<u64>()?;

        let genotype = match columns.genotype {
            GenotypeColumns::Joined(idx) => fields[idx].to_string(),
            GenotypeColumns::Split(a, b) => format!("{}{}", fields[a], fields[b]),
        };

        Ok(GenotypeCall::new(rsid, chromosome, position, &genotype))
    }

    /// Handles one row; returns `false` once the record limit is reached.
    fn accept(
        &self,
        line_no: usize,
        fields: &[&str],
        header_seen: &mut bool,
        collector: &mut CallCollector,
    ) -> bool {
        if self.is_header_row(fields) {
            if *header_seen {
                collector.repeated_header(line_no);
            }
            *header_seen = true;
            return true;
        }
        match self.parse_row(fields) {
            Ok(call) => collector.push(call),
            Err(err) => {
                collector.skip(line_no, &err);
                true
            }
        }
    }

    fn run<'a>(
        &self,
        rows: impl Iterator<Item = (usize, &'a str)>,
        collector: &mut CallCollector,
    ) {
        let mut header_seen = self.header_in_comments;
        for (line_no, line) in rows {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields = split_fields(line, self.delimiter, self.collapse_empty);
            let fields: Vec<&str> = fields.iter().map(|field| &**field).collect();
            if !self.accept(line_no, &fields, &mut header_seen, collector) {
                break;
            }
        }
    }

    fn run_csv(&self, text: &str, collector: &mut CallCollector) {
        let mut reader = csv_builder().comment(Some(b'#')).from_reader(text.as_bytes());
        let mut header_seen = self.header_in_comments;
        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    collector.skip(record_line(err.position()), &err);
                    continue;
                }
            };
            let fields: Vec<&str> = record.iter().collect();
            if !self.accept(record_line(record.position()), &fields, &mut header_seen, collector) {
                break;
            }
        }
    }

    fn run_text(&self, text: &str, collector: &mut CallCollector) {
        match self.delimiter {
            Delimiter::Comma => self.run_csv(text, collector),
            _ => self.run(numbered(text), collector),
        }
    }
}

fn numbered(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines().enumerate().map(|(idx, line)| (idx + 1, line))
}

fn comment_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|line| line.starts_with('#'))
}

fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
}

fn header_names(line: &str, delimiter: Delimiter) -> Vec<String> {
    split_fields(line.trim_start_matches('#'), delimiter, false)
        .iter()
        .map(|name| normalize_name(name))
        .collect()
}

fn finish(collector: CallCollector, text: &str) -> ParserOutput {
    let build_hint = sniff::build_hint(comment_lines(text));
    let (set, stats) = collector.finish();
    ParserOutput {
        set,
        build_hint,
        stats,
    }
}

/// 23andMe and LivingDNA: `#` comments, the last of which may name the columns.
pub(crate) fn parse_commented_tsv(
    text: &str,
    kind: ParserKind,
    limit: Option<usize>,
) -> Result<ParserOutput, ReadError> {
    let delimiter = Delimiter::sniff(data_lines(text).take(10));
    let header = comment_lines(text)
        .filter(|line| sniff::is_generic_header(line))
        .last();

    let columns = match header {
        Some(line) => Columns::from_header(&header_names(line, delimiter))?,
        None => Columns::for_width(
            data_lines(text)
                .next()
                .map_or(Columns::JOINED.width, |line| split_fields(line, delimiter, false).len()),
        ),
    };

    let mut table = Table::new(columns, delimiter);
    table.header_in_comments = header.is_some();
    let mut collector = CallCollector::new(kind.label(), limit);
    table.run_text(text, &mut collector);
    Ok(finish(collector, text))
}

/// AncestryDNA chromosome codes: 23 = X, 24 = Y, 25 = PAR, 26 = MT.
fn ancestry_chromosome(raw: &str) -> Option<Chromosome> {
    match raw.trim() {
        "23" => Some(Chromosome::X),
        "24" => Some(Chromosome::Y),
        "25" => Some(Chromosome::Other(String::from("PAR"))),
        "26" => Some(Chromosome::Mt),
        other => Chromosome::parse(other),
    }
}

/// AncestryDNA: tab separated allele1/allele2 columns, `0` alleles are missing
/// and runs of tabs are collapsed.
pub(crate) fn parse_ancestry(text: &str, limit: Option<usize>) -> Result<ParserOutput, ReadError> {
    let header = data_lines(text)
        .next()
        .filter(|line| sniff::is_generic_header(line));
    let columns = match header {
        Some(line) => {
            let names: Vec<String> = split_fields(line, Delimiter::Tab, true)
                .iter()
                .map(|name| normalize_name(name))
                .collect();
            Columns::from_header(&names)?
        }
        None => Columns::SPLIT,
    };

    let mut table = Table::new(columns, Delimiter::Tab);
    table.collapse_empty = true;
    table.chromosome = ancestry_chromosome;

    let mut collector = CallCollector::new(ParserKind::AncestryDna.label(), limit);
    table.run(numbered(text), &mut collector);
    Ok(finish(collector, text))
}

/// FamilyTreeDNA and MyHeritage: comma separated, quoted values under a
/// `RSID,CHROMOSOME,POSITION,RESULT` header.
pub(crate) fn parse_quoted_csv(
    text: &str,
    kind: ParserKind,
    limit: Option<usize>,
) -> Result<ParserOutput, ReadError> {
    let header = data_lines(text)
        .next()
        .filter(|line| sniff::is_generic_header(line));
    let columns = match header {
        Some(line) => Columns::from_header(&header_names(line, Delimiter::Comma))?,
        None => Columns::JOINED,
    };

    let table = Table::new(columns, Delimiter::Comma);
    let mut collector = CallCollector::new(kind.label(), limit);
    table.run_text(text, &mut collector);
    Ok(finish(collector, text))
}

/// Illumina Global Screening Array reports: a `[Header]` block, then a tab
/// separated table after `[Data]`.
pub(crate) fn parse_gsa(text: &str, limit: Option<usize>) -> Result<ParserOutput, ReadError> {
    let mut lines = numbered(text);
    let mut header_block = Vec::new();
    for (_, line) in lines.by_ref() {
        if line.trim() == "[Data]" {
            break;
        }
        header_block.push(line);
    }

    let (_, column_line) = lines
        .by_ref()
        .find(|(_, line)| !line.trim().is_empty())
        .ok_or_else(|| ReadError::unsupported("GSA report has no [Data] table"))?;
    let names = header_names(column_line, Delimiter::Tab);

    let find = |candidates: &[&str]| {
        candidates
            .iter()
            .find_map(|candidate| names.iter().position(|name| name == candidate))
    };
    let snp_name = find(&["snp name"]);
    let rsid = find(&["rsid"])
        .or(snp_name)
        .ok_or_else(|| ReadError::unsupported("GSA table has no RsID or SNP Name column"))?;
    let (Some(chromosome), Some(position)) = (find(&["chr", "chromosome"]), find(&["position"])) else {
        return Err(ReadError::unsupported(
            "GSA table without Chr/Position columns needs an external SNP map",
        ));
    };
    let (Some(allele1), Some(allele2)) = (
        find(&["allele1 - plus", "allele1 - forward"]),
        find(&["allele2 - plus", "allele2 - forward"]),
    ) else {
        return Err(ReadError::unsupported(
            "GSA table has no Plus or Forward strand allele columns",
        ));
    };

    let columns = Columns {
        rsid,
        rsid_fallback: snp_name.filter(|idx| *idx != rsid),
        chromosome,
        position,
        genotype: GenotypeColumns::Split(allele1, allele2),
        width: names.len(),
    };

    let mut table = Table::new(columns, Delimiter::Tab);
    table.header_key = names.first().cloned();
    table.header_in_comments = true;

    let block = header_block.join("\n");
    let label = if block.contains("SANO") {
        "Sano"
    } else if block.contains("CODIGO46") {
        "Codigo46"
    } else {
        ParserKind::Gsa.label()
    };

    let mut collector = CallCollector::new(label, limit);
    table.run(lines, &mut collector);

    let (set, stats) = collector.finish();
    Ok(ParserOutput {
        set,
        build_hint: sniff::build_hint(header_block),
        stats,
    })
}

/// Any other rsid/chromosome/position/genotype table, with or without a header.
pub(crate) fn parse_generic(text: &str, limit: Option<usize>) -> Result<ParserOutput, ReadError> {
    let delimiter = Delimiter::sniff(data_lines(text).take(10));
    let header = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .find(|line| !line.starts_with('#') || sniff::is_generic_header(line))
        .filter(|line| sniff::is_generic_header(line));

    let mut table = match header {
        Some(line) => {
            let names = header_names(line, delimiter);
            let mut table = Table::new(Columns::from_header(&names)?, delimiter);
            table.header_key = names.first().cloned();
            table.header_in_comments = line.starts_with('#');
            table
        }
        None => Table::new(Columns::JOINED, delimiter),
    };
    table.collapse_empty = delimiter == Delimiter::Whitespace;

    let mut collector = CallCollector::new(ParserKind::Generic.label(), limit);
    table.run_text(text, &mut collector);
    Ok(finish(collector, text))
}
