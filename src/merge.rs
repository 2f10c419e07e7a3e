//! Folding several call sets for one person into a single set.
//!
//! The first source wins. Incoming calls only add rsids the target lacks; any
//! shared rsid whose genotype or locus differs keeps the target call and is
//! reported as a discrepancy. Filling target no-calls and ignoring allele order
//! are opt-in through [`MergeOptions`].

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{
    build::Build,
    genotype::{Chromosome, GenotypeCall, GenotypeSet},
};

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Reject a source with more position/chromosome conflicts than this.
    pub discrepant_positions_threshold: Option<usize>,
    /// Reject a source with more genotype conflicts than this.
    pub discrepant_genotypes_threshold: Option<usize>,
    /// Only merge calls on this chromosome.
    pub chromosome: Option<Chromosome>,
    /// Replace a target no-call with the source call at the same locus.
    pub fill_no_calls: bool,
    /// Treat `AT` and `TA` as the same genotype.
    pub ignore_allele_order: bool,
}

impl MergeOptions {
    /// Thresholds used when a caller wants the conventional safety limits.
    pub fn with_default_thresholds() -> Self {
        Self {
            discrepant_positions_threshold: Some(100),
            discrepant_genotypes_threshold: Some(500),
            ..Self::default()
        }
    }
}

/// A shared rsid the sources disagree on. The target keeps `existing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub rsid: String,
    pub source_index: usize,
    pub existing: GenotypeCall,
    pub incoming: GenotypeCall,
    pub position_mismatch: bool,
    pub genotype_mismatch: bool,
}

/// Outcome of merging one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceMergeResult {
    pub source_index: usize,
    pub source: String,
    /// `false` when the source was empty or rejected by a threshold.
    pub merged: bool,
    pub inserted: usize,
    pub filled: usize,
    pub common_rsids: Vec<String>,
    pub discrepant_position_rsids: Vec<String>,
    pub discrepant_genotype_rsids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub sources: Vec<SourceMergeResult>,
    pub discrepancies: Vec<Discrepancy>,
    /// Chromosomes that received new or filled calls.
    pub chromosomes: BTreeSet<Chromosome>,
}

impl MergeReport {
    pub fn discrepancy_count(&self) -> usize {
        self.discrepancies.len()
    }

    pub fn merged_sources(&self) -> usize {
        self.sources.iter().filter(|result| result.merged).count()
    }
}

/// Changes one source would make to the target, computed before anything is applied.
#[derive(Default)]
struct MergePlan {
    inserts: Vec<GenotypeCall>,
    fills: Vec<(String, String)>,
    common: Vec<String>,
    discrepancies: Vec<Discrepancy>,
}

impl MergePlan {
    fn compute(
        target: &GenotypeSet,
        source: &GenotypeSet,
        source_index: usize,
        options: &MergeOptions,
    ) -> Self {
        let mut plan = Self::default();

        for incoming in source.iter() {
            if options
                .chromosome
                .as_ref()
                .is_some_and(|c| &incoming.chromosome != c)
            {
                continue;
            }
            let Some(existing) = target.get(&incoming.rsid) else {
                plan.inserts.push(incoming.clone());
                continue;
            };

            plan.common.push(incoming.rsid.clone());
            let position_mismatch = !existing.same_locus(incoming);
            let genotype_mismatch = if options.fill_no_calls
                && (existing.is_no_call() || incoming.is_no_call())
            {
                false
            } else if options.ignore_allele_order {
                !existing.same_alleles(&incoming.genotype)
            } else {
                existing.genotype != incoming.genotype
            };

            if options.fill_no_calls
                && !position_mismatch
                && existing.is_no_call()
                && !incoming.is_no_call()
            {
                plan.fills
                    .push((incoming.rsid.clone(), incoming.genotype.clone()));
            }

            if position_mismatch || genotype_mismatch {
                plan.discrepancies.push(Discrepancy {
                    rsid: incoming.rsid.clone(),
                    source_index,
                    existing: existing.clone(),
                    incoming: incoming.clone(),
                    position_mismatch,
                    genotype_mismatch,
                });
            }
        }
        plan
    }

    fn rsids_where(&self, select: impl Fn(&Discrepancy) -> bool) -> Vec<String> {
        self.discrepancies
            .iter()
            .filter(|d| select(d))
            .map(|d| d.rsid.clone())
            .collect()
    }
}

/// Merges `sources` into `target` in order and sorts the result.
///
/// Sources whose discrepancy counts exceed a configured threshold are left out
/// entirely. The target's build is kept; an unknown target build adopts the
/// first known source build. Builds are compared as-is, without liftover.
pub fn merge_sets(
    target: &mut GenotypeSet,
    sources: Vec<GenotypeSet>,
    options: &MergeOptions,
) -> MergeReport {
    let mut report = MergeReport::default();

    for (source_index, source) in sources.into_iter().enumerate() {
        let mut result = SourceMergeResult {
            source_index,
            source: source.source(),
            ..SourceMergeResult::default()
        };

        if source.is_empty() {
            tracing::warn!(source = %result.source, "no calls to merge");
            report.sources.push(result);
            continue;
        }

        let initializing = target.is_empty() && target.sources().is_empty();
        if !initializing
            && target.build().is_known()
            && source.build().is_known()
            && target.build() != source.build()
        {
            tracing::warn!(
                target = %target.build(),
                source = %source.build(),
                "merging sets on different builds; positions are compared as-is"
            );
        }

        let plan = MergePlan::compute(target, &source, source_index, options);
        result.common_rsids = plan.common.clone();
        result.discrepant_position_rsids = plan.rsids_where(|d| d.position_mismatch);
        result.discrepant_genotype_rsids = plan.rsids_where(|d| d.genotype_mismatch);

        if let Some(limit) = options.discrepant_positions_threshold
            && result.discrepant_position_rsids.len() > limit
        {
            tracing::warn!(
                source = %result.source,
                discrepant = result.discrepant_position_rsids.len(),
                limit,
                "too many discrepant positions; source not merged"
            );
            report.sources.push(result);
            continue;
        }
        if let Some(limit) = options.discrepant_genotypes_threshold
            && result.discrepant_genotype_rsids.len() > limit
        {
            tracing::warn!(
                source = %result.source,
                discrepant = result.discrepant_genotype_rsids.len(),
                limit,
                "too many discrepant genotypes; source not merged"
            );
            report.sources.push(result);
            continue;
        }

        for call in plan.inserts {
            report.chromosomes.insert(call.chromosome.clone());
            if target.insert_if_absent(call) {
                result.inserted += 1;
            }
        }
        for (rsid, genotype) in &plan.fills {
            if let Some(call) = target.get(rsid) {
                report.chromosomes.insert(call.chromosome.clone());
            }
            if target.set_genotype(rsid, genotype) {
                result.filled += 1;
            }
        }

        if initializing {
            target.set_phased(source.phased());
        } else {
            target.set_phased(target.phased() && source.phased());
        }
        if target.build() == Build::Unknown {
            target.set_build(source.build());
        }
        target.extend_sources(source.sources());

        tracing::info!(
            source = %result.source,
            inserted = result.inserted,
            filled = result.filled,
            common = result.common_rsids.len(),
            discrepant = plan.discrepancies.len(),
            "merged genotype source"
        );

        result.merged = true;
        report.discrepancies.extend(plan.discrepancies);
        report.sources.push(result);
    }

    target.sort();
    report
}
