//! Content-based format detection and metadata scanning.

use std::fmt;

use crate::{
    build::Build,
    dtc,
    reader::{ParserOutput, ReadError},
    vcf,
};

/// Parser variants selected by content sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ParserKind {
    #[value(name = "23andme")]
    TwentyThreeAndMe,
    #[value(name = "ancestry")]
    AncestryDna,
    #[value(name = "ftdna")]
    FamilyTreeDna,
    #[value(name = "myheritage")]
    MyHeritage,
    #[value(name = "livingdna")]
    LivingDna,
    #[value(name = "gsa")]
    Gsa,
    Generic,
    Vcf,
}

impl ParserKind {
    /// Default source label for sets produced by this parser.
    pub fn label(self) -> &'static str {
        match self {
            Self::TwentyThreeAndMe => "23andMe",
            Self::AncestryDna => "AncestryDNA",
            Self::FamilyTreeDna => "FTDNA",
            Self::MyHeritage => "MyHeritage",
            Self::LivingDna => "LivingDNA",
            Self::Gsa => "GSA",
            Self::Generic => "generic",
            Self::Vcf => "vcf",
        }
    }

    pub(crate) fn parse(self, text: &str, limit: Option<usize>) -> Result<ParserOutput, ReadError> {
        match self {
            Self::TwentyThreeAndMe | Self::LivingDna => dtc::parse_commented_tsv(text, self, limit),
            Self::AncestryDna => dtc::parse_ancestry(text, limit),
            Self::FamilyTreeDna | Self::MyHeritage => dtc::parse_quoted_csv(text, self, limit),
            Self::Gsa => dtc::parse_gsa(text, limit),
            Self::Generic => dtc::parse_generic(text, limit),
            Self::Vcf => vcf::parse(text, limit),
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Chooses a parser from the first lines of a decompressed export.
pub fn sniff(text: &str) -> Result<ParserKind, ReadError> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let first = lines
        .next()
        .ok_or_else(|| ReadError::unsupported("input is empty"))?;

    if first.starts_with("##fileformat=VCF") {
        return Ok(ParserKind::Vcf);
    }
    if first.contains("23andMe") {
        return Ok(ParserKind::TwentyThreeAndMe);
    }
    if first.contains("AncestryDNA") {
        return Ok(ParserKind::AncestryDna);
    }
    if first.contains("MyHeritage") {
        return Ok(ParserKind::MyHeritage);
    }
    if first.contains("Living DNA") || first.contains("LivingDNA") {
        return Ok(ParserKind::LivingDna);
    }
    if first.starts_with("[Header]") {
        return Ok(ParserKind::Gsa);
    }
    if first
        .replace('"', "")
        .to_ascii_uppercase()
        .starts_with("RSID,CHROMOSOME,POSITION,RESULT")
    {
        return Ok(ParserKind::FamilyTreeDna);
    }

    for line in std::iter::once(first).chain(lines).take(64) {
        if is_generic_header(line) {
            return Ok(ParserKind::Generic);
        }
        if line.starts_with('#') {
            continue;
        }
        if is_generic_row(line) {
            return Ok(ParserKind::Generic);
        }
        break;
    }

    Err(ReadError::unsupported(
        "no known vendor marker, header or rsid/chromosome/position row found",
    ))
}

/// `rsid` then a chromosome column, optionally behind `#` comment markers.
pub(crate) fn is_generic_header(line: &str) -> bool {
    let lower = line
        .trim_start_matches(|c: char| c == '#' || c.is_whitespace())
        .to_ascii_lowercase()
        .replace('"', "");
    let Some(rest) = lower.strip_prefix("rsid") else {
        return false;
    };
    rest.trim_start_matches([',', '\t', ' '])
        .starts_with("chr")
}

fn is_generic_row(line: &str) -> bool {
    let fields = dtc::split_fields(line, Delimiter::sniff([line]), false);
    fields.len() >= 4 && !fields[0].is_empty() && fields[2].parse::<u64>().is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Comma,
    Whitespace,
}

impl Delimiter {
    /// Picks the more frequent of tab and comma over the sample, falling back
    /// to runs of whitespace.
    pub fn sniff<'a>(sample: impl IntoIterator<Item = &'a str>) -> Self {
        let (mut tabs, mut commas) = (0usize, 0usize);
        for line in sample {
            tabs += line.matches('\t').count();
            commas += line.matches(',').count();
        }
        match (tabs, commas) {
            (0, 0) => Self::Whitespace,
            (t, c) if c > t => Self::Comma,
            _ => Self::Tab,
        }
    }
}

/// Scans metadata lines for the build they declare.
///
/// Recognizes `build 37` style phrases, assembly names (`GRCh37`, `hg19`,
/// `NCBI36`, ...), VCF `##contig`/`##assembly`/`##reference` values and the
/// chromosome 1 length of each build.
pub fn build_hint<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<Build> {
    lines.into_iter().find_map(line_build_hint)
}

fn line_build_hint(line: &str) -> Option<Build> {
    let lower = line.to_ascii_lowercase();

    const NAMES: [(&str, Build); 9] = [
        ("grch38", Build::Grch38),
        ("grch37", Build::Grch37),
        ("hg38", Build::Grch38),
        ("hg19", Build::Grch37),
        ("hg18", Build::Ncbi36),
        ("ncbi36", Build::Ncbi36),
        ("ncbi 36", Build::Ncbi36),
        ("hs37d5", Build::Grch37),
        ("b37", Build::Grch37),
    ];
    const CHR1_LENGTHS: [(&str, Build); 3] = [
        ("247249719", Build::Ncbi36),
        ("249250621", Build::Grch37),
        ("248956422", Build::Grch38),
    ];

    let mut search = lower.as_str();
    while let Some(idx) = search.find("build") {
        let rest = search[idx + "build".len()..].trim_start_matches([' ', ':', '=', '_', '-', '\t']);
        if let Some(build) = leading_build_number(rest) {
            return Some(build);
        }
        search = &search[idx + "build".len()..];
    }

    NAMES
        .iter()
        .chain(CHR1_LENGTHS.iter())
        .find(|(needle, _)| contains_token(&lower, needle))
        .map(|(_, build)| *build)
}

fn leading_build_number(rest: &str) -> Option<Build> {
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    match digits.as_str() {
        "36" => Some(Build::Ncbi36),
        "37" => Some(Build::Grch37),
        "38" => Some(Build::Grch38),
        _ => None,
    }
}

/// Substring match that does not extend into neighbouring alphanumerics.
fn contains_token(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + needle.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_digit())
    })
}
