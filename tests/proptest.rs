use std::collections::BTreeSet;

use dtc_genotypes::{
    Chromosome, GenotypeCall, GenotypeSet, InMemoryReference, ReadOptions, VcfOptions, export,
    read_bytes, sniff::sniff,
};
use proptest::prelude::*;

fn chromosome() -> impl Strategy<Value = Chromosome> {
    prop_oneof![
        (1u8..=22).prop_map(Chromosome::Autosome),
        Just(Chromosome::X),
        Just(Chromosome::Y),
        Just(Chromosome::Mt),
    ]
}

fn genotype() -> impl Strategy<Value = String> {
    prop_oneof![
        proptest::collection::vec(prop::sample::select(vec!['A', 'C', 'G', 'T']), 1..=2)
            .prop_map(|alleles| alleles.into_iter().collect()),
        Just(String::from("--")),
    ]
}

fn call_set(max: usize) -> impl Strategy<Value = GenotypeSet> {
    proptest::collection::vec((chromosome(), 1u64..1_000_000, genotype()), 1..max).prop_map(
        |calls| {
            let mut set = GenotypeSet::with_source("proptest");
            for (i, (chromosome, position, genotype)) in calls.into_iter().enumerate() {
                set.insert(GenotypeCall::new(format!("rs{i}"), chromosome, position, &genotype));
            }
            set
        },
    )
}

proptest! {
    #[test]
    fn reader_handles_arbitrary_input(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let _ = read_bytes(data, &ReadOptions::default());
    }

    #[test]
    fn sniff_handles_arbitrary_text(text in ".{0,512}") {
        let _ = sniff(&text);
    }

    #[test]
    fn sorting_is_idempotent(mut set in call_set(64)) {
        let len = set.len();
        set.sort();
        prop_assert!(set.is_sorted());
        prop_assert_eq!(set.len(), len);

        let once: Vec<_> = set.iter().cloned().collect();
        set.sort();
        let twice: Vec<_> = set.iter().cloned().collect();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn sorted_calls_follow_chromosome_rank(set in call_set(64)) {
        let sorted = set.sorted_calls();
        for pair in sorted.windows(2) {
            prop_assert!(
                (&pair[0].chromosome, pair[0].position) <= (&pair[1].chromosome, pair[1].position)
            );
        }
    }

    #[test]
    fn csv_export_is_readable(mut set in call_set(48)) {
        set.sort();
        let csv = export::to_csv_string(&set).unwrap();
        let reread = read_bytes(csv.into_bytes(), &ReadOptions::default()).unwrap();

        let original: Vec<_> = set.iter().cloned().collect();
        let round_tripped: Vec<_> = reread.set.iter().cloned().collect();
        prop_assert_eq!(original, round_tripped);
    }

    #[test]
    fn vcf_export_preserves_calls(
        sequence in proptest::collection::vec(prop::sample::select(vec!['A', 'C', 'G', 'T']), 200),
        calls in proptest::collection::vec((1u64..=200, genotype()), 1..32),
    ) {
        let bases = sequence.clone();
        let sequence: String = sequence.into_iter().collect();
        let reference = InMemoryReference::new().with_sequence(Chromosome::Autosome(1), sequence);

        let mut set = GenotypeSet::with_source("proptest");
        for (i, (position, genotype)) in calls.into_iter().enumerate() {
            set.insert(GenotypeCall::new(format!("rs{i}"), Chromosome::Autosome(1), position, &genotype));
        }

        let (vcf, summary) = export::to_vcf_string(&set, &reference, &VcfOptions::default()).unwrap();
        prop_assert_eq!(summary.written, set.len());

        let reread = read_bytes(vcf.into_bytes(), &ReadOptions::default()).unwrap();
        for call in set.iter() {
            let back = reread.set.get(&call.rsid).unwrap();
            let reference_base = bases[(call.position - 1) as usize];
            let alternates: BTreeSet<char> =
                call.genotype.chars().filter(|c| *c != reference_base).collect();
            // Two different ALT alleles make a multi-allelic record, which reads back as a no-call.
            let expected = if alternates.len() > 1 { "" } else { call.genotype.as_str() };
            prop_assert_eq!(back.genotype.as_str(), expected);
            prop_assert_eq!(back.position, call.position);
        }
    }

    #[test]
    fn allele_order_does_not_matter(a in prop::sample::select(vec!['A', 'C', 'G', 'T']),
                                    b in prop::sample::select(vec!['A', 'C', 'G', 'T'])) {
        let call = GenotypeCall::new("rs1", Chromosome::Autosome(1), 1, &format!("{a}{b}"));
        let swapped = format!("{b}{a}");
        prop_assert!(call.same_alleles(&swapped));
        prop_assert_eq!(call.is_heterozygous(), a != b);
    }
}
