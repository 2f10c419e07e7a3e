//! Sex inference from X and Y chromosome calls.

use std::fmt;

use serde::Serialize;

use crate::genotype::{Chromosome, GenotypeSet};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, clap::ValueEnum)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Unknown => "Unknown",
        })
    }
}

/// A rule that assigns a sex to a call set.
pub trait SexPolicy {
    fn infer(&self, set: &GenotypeSet) -> Sex;
}

/// Female on any heterozygous X call; otherwise male when any X call is
/// present, unknown when there are none.
///
/// Single-allele X calls count as male evidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyHeterozygous;

impl SexPolicy for AnyHeterozygous {
    fn infer(&self, set: &GenotypeSet) -> Sex {
        let mut seen_x = false;
        for call in set.not_null(Some(&Chromosome::X)) {
            if call.is_heterozygous() {
                return Sex::Female;
            }
            seen_x = true;
        }
        if seen_x { Sex::Male } else { Sex::Unknown }
    }
}

/// Ratio-based rule: X heterozygosity above `x_threshold` is female; without
/// X calls, a Y call rate above `y_threshold` is male.
#[derive(Debug, Clone, Copy)]
pub struct HeterozygosityRatio {
    pub x_threshold: f64,
    pub y_threshold: f64,
}

impl Default for HeterozygosityRatio {
    fn default() -> Self {
        Self {
            x_threshold: 0.03,
            y_threshold: 0.3,
        }
    }
}

impl SexPolicy for HeterozygosityRatio {
    fn infer(&self, set: &GenotypeSet) -> Sex {
        let x_calls = set.count_on(&Chromosome::X);
        if x_calls > 0 {
            let het = set.heterozygous(Some(&Chromosome::X)).count();
            return if het as f64 / x_calls as f64 > self.x_threshold {
                Sex::Female
            } else {
                Sex::Male
            };
        }

        let y_calls = set.count_on(&Chromosome::Y);
        if y_calls > 0 {
            let called = set.not_null(Some(&Chromosome::Y)).count();
            return if called as f64 / y_calls as f64 > self.y_threshold {
                Sex::Male
            } else {
                Sex::Female
            };
        }

        Sex::Unknown
    }
}

/// Infers sex with the default [`AnyHeterozygous`] rule.
pub fn infer_sex(set: &GenotypeSet) -> Sex {
    AnyHeterozygous.infer(set)
}
