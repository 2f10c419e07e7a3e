//! Genome build identification and per-build constants.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::genotype::{Chromosome, GenotypeSet};

/// Assembly label reported when the build is not known.
pub const UNKNOWN_ASSEMBLY: &str = "unknown";

/// Reference genome build a set of positions is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Build {
    #[default]
    Unknown,
    Ncbi36,
    Grch37,
    Grch38,
}

impl Build {
    /// Maps `36`, `37` and `38` to their builds; anything else is unknown.
    pub fn from_number(number: u32) -> Self {
        match number {
            36 => Self::Ncbi36,
            37 => Self::Grch37,
            38 => Self::Grch38,
            _ => Self::Unknown,
        }
    }

    /// Numeric build, `0` when unknown.
    pub fn number(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Ncbi36 => 36,
            Self::Grch37 => 37,
            Self::Grch38 => 38,
        }
    }

    pub fn assembly(self) -> &'static str {
        match self {
            Self::Unknown => UNKNOWN_ASSEMBLY,
            Self::Ncbi36 => "NCBI36",
            Self::Grch37 => "GRCh37",
            Self::Grch38 => "GRCh38",
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.assembly())
    }
}

impl FromStr for Build {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "36" | "ncbi36" | "hg18" => Ok(Self::Ncbi36),
            "37" | "grch37" | "hg19" => Ok(Self::Grch37),
            "38" | "grch38" | "hg38" => Ok(Self::Grch38),
            other => Err(format!(
                "unrecognized build '{other}' (expected 36, 37, 38 or an assembly name)"
            )),
        }
    }
}

impl Serialize for Build {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("fingerprint SNPs match more than one build: {}", format_builds(.candidates))]
    Ambiguous { candidates: Vec<Build> },
}

fn format_builds(builds: &[Build]) -> String {
    builds
        .iter()
        .map(|build| build.assembly())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A SNP whose position differs between builds.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint {
    pub rsid: &'static str,
    pub ncbi36: u64,
    pub grch37: u64,
    pub grch38: u64,
}

impl Fingerprint {
    fn build_at(&self, position: u64) -> Option<Build> {
        if position == self.ncbi36 {
            Some(Build::Ncbi36)
        } else if position == self.grch37 {
            Some(Build::Grch37)
        } else if position == self.grch38 {
            Some(Build::Grch38)
        } else {
            None
        }
    }
}

pub const FINGERPRINTS: [Fingerprint; 7] = [
    Fingerprint { rsid: "rs3094315", ncbi36: 742_429, grch37: 752_566, grch38: 817_186 },
    Fingerprint { rsid: "rs11928389", ncbi36: 50_908_372, grch37: 50_927_009, grch38: 50_889_578 },
    Fingerprint { rsid: "rs2500347", ncbi36: 143_649_677, grch37: 144_938_320, grch38: 148_946_169 },
    Fingerprint { rsid: "rs964481", ncbi36: 27_566_744, grch37: 27_656_823, grch38: 27_638_706 },
    Fingerprint { rsid: "rs2341354", ncbi36: 908_436, grch37: 918_573, grch38: 983_193 },
    Fingerprint { rsid: "rs3850290", ncbi36: 22_315_141, grch37: 23_245_301, grch38: 22_776_092 },
    Fingerprint { rsid: "rs1329546", ncbi36: 135_302_086, grch37: 135_474_420, grch38: 136_392_261 },
];

/// Determines the build of a call set.
///
/// A known `hint` (typically parsed from file comments) wins outright. Otherwise
/// the fingerprint SNPs present in the set vote; conflicting votes are an error
/// and no matches yield [`Build::Unknown`].
pub fn detect_build(set: &GenotypeSet, hint: Option<Build>) -> Result<Build, BuildError> {
    if let Some(build) = hint.filter(|b| b.is_known()) {
        tracing::debug!(build = %build, "using build from file metadata");
        return Ok(build);
    }

    let matched: BTreeSet<Build> = FINGERPRINTS
        .iter()
        .filter_map(|fp| set.get(fp.rsid).and_then(|call| fp.build_at(call.position)))
        .collect();

    match matched.len() {
        0 => {
            tracing::debug!("no fingerprint SNP matched a known build");
            Ok(Build::Unknown)
        }
        1 => Ok(matched.into_iter().next().unwrap_or_default()),
        _ => Err(BuildError::Ambiguous {
            candidates: matched.into_iter().collect(),
        }),
    }
}

/// Pseudo-autosomal region coordinates for one build (1-based, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParBoundaries {
    x: [(u64, u64); 2],
    y: [(u64, u64); 2],
}

impl ParBoundaries {
    pub fn new(build: Build) -> Option<Self> {
        match build {
            Build::Ncbi36 => Some(Self {
                x: [(1, 2_709_520), (154_584_238, 154_913_754)],
                y: [(1, 2_709_520), (57_443_438, 57_772_954)],
            }),
            Build::Grch37 => Some(Self {
                x: [(60_001, 2_699_520), (154_931_044, 155_260_560)],
                y: [(10_001, 2_649_520), (59_034_050, 59_363_566)],
            }),
            Build::Grch38 => Some(Self {
                x: [(10_001, 2_781_479), (155_701_383, 156_030_895)],
                y: [(10_001, 2_781_479), (56_887_903, 57_217_415)],
            }),
            Build::Unknown => None,
        }
    }

    fn regions(&self, chromosome: &Chromosome) -> Option<&[(u64, u64); 2]> {
        match chromosome {
            Chromosome::X => Some(&self.x),
            Chromosome::Y => Some(&self.y),
            _ => None,
        }
    }

    /// Exclusive bounds of the non-PAR stretch: `(PAR1 end, PAR2 start)`.
    pub fn non_par_bounds(&self, chromosome: &Chromosome) -> Option<(u64, u64)> {
        self.regions(chromosome)
            .map(|[par1, par2]| (par1.1, par2.0))
    }

    pub fn is_par(&self, chromosome: &Chromosome, position: u64) -> bool {
        self.regions(chromosome).is_some_and(|regions| {
            regions
                .iter()
                .any(|(start, stop)| (*start..=*stop).contains(&position))
        })
    }
}
