use std::{
    fs,
    io,
    path::PathBuf,
};

use dtc_genotypes::{
    Build, Chromosome, GenotypeSet, Individual, InMemoryReference, MergeOptions, ParserKind,
    ReadError, ReadOptions, ReferenceGenome, Sex, Source, VcfOptions, export, read_bytes,
    read_path,
};
use tempfile::tempdir;

fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> io::Result<PathBuf> {
    let path = dir.path().join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

const TWENTY_THREE: &str = "\
# This data file generated by 23andMe at: Mon Jan 01 00:00:00 2024
# We are using reference human assembly build 37 (also known as Annotation Release 104).
# rsid\tchromosome\tposition\tgenotype
rs3094315\t1\t752566\tAA
rs12562034\t1\t768448\tGG
rs4\tX\t5000000\tAG
rs5\tMT\t150\tT
";

const ANCESTRY: &str = "\
#AncestryDNA raw data download
#This file was generated by AncestryDNA at: 01/01/2024 00:00:00 UTC
#human reference build 37.1
rsid\tchromosome\tposition\tallele1\tallele2
rs3094315\t1\t752566\tA\tA
rs12562034\t1\t768448\tA\tG
rs10\t2\t1000\tC\tT
rs11\t23\t5000100\tG\tG
rs12\t26\t200\t0\t0
";

const FTDNA: &str = "\
RSID,CHROMOSOME,POSITION,RESULT
\"rs4\",\"X\",\"5000000\",\"GA\"
\"rs20\",\"3\",\"300\",\"--\"
";

#[test]
fn parses_single_rows() {
    let set = dtc_genotypes::parse(b"rs1\t1\t101\tAA\n".to_vec(), None).unwrap();
    let call = set.get("rs1").unwrap();
    assert_eq!((call.chromosome.clone(), call.position, call.genotype.as_str()), (Chromosome::Autosome(1), 101, "AA"));

    let ancestry = "#AncestryDNA\nrsid\tchromosome\tposition\tallele1\tallele2\nrs1\t1\t101\t\tA\tA\n";
    let set = dtc_genotypes::parse(ancestry.as_bytes().to_vec(), None).unwrap();
    assert_eq!(set.get("rs1").unwrap().genotype, "AA");
    assert_eq!(set.get("rs1").unwrap().position, 101);
}

#[test]
fn reads_each_vendor_from_disk() {
    let dir = tempdir().unwrap();
    let cases = [
        ("genome_23andme.txt", TWENTY_THREE, ParserKind::TwentyThreeAndMe, 4),
        ("ancestry.txt", ANCESTRY, ParserKind::AncestryDna, 5),
        ("ftdna.csv", FTDNA, ParserKind::FamilyTreeDna, 2),
    ];

    for (name, contents, kind, count) in cases {
        let path = write_file(&dir, name, contents).unwrap();
        let parsed = read_path(&path, &ReadOptions::default()).unwrap();
        assert_eq!(parsed.kind, kind, "{name}");
        assert_eq!(parsed.set.len(), count, "{name}");
        assert!(parsed.set.is_sorted(), "{name}");
    }
}

#[test]
fn read_paths_reports_each_file() {
    let dir = tempdir().unwrap();
    let good = write_file(&dir, "good.txt", TWENTY_THREE).unwrap();
    let bad = write_file(&dir, "bad.txt", "this is not\ngenotype data\n").unwrap();

    let results = dtc_genotypes::read_paths(&[good.clone(), bad.clone()], &ReadOptions::default());
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, good);
    assert!(results[0].1.is_ok());
    assert_eq!(results[1].0, bad);
    assert!(matches!(results[1].1, Err(ReadError::UnsupportedFormat { .. })));
}

#[test]
fn merges_three_vendors_into_one_individual() {
    let dir = tempdir().unwrap();
    let paths = vec![
        write_file(&dir, "a.txt", TWENTY_THREE).unwrap(),
        write_file(&dir, "b.txt", ANCESTRY).unwrap(),
        write_file(&dir, "c.csv", FTDNA).unwrap(),
    ];

    let individual = Individual::from_paths("Jane Doe", &paths, &ReadOptions::default()).unwrap();
    let genotypes = individual.genotypes();

    assert_eq!(genotypes.source(), "23andMe, AncestryDNA, FTDNA");
    assert_eq!(genotypes.build(), Build::Grch37);
    assert!(genotypes.is_sorted());
    // 4 from 23andMe, 3 new from AncestryDNA, 1 new from FTDNA.
    assert_eq!(genotypes.len(), 8);

    let report = individual.load_report();
    assert_eq!(report.sources.len(), 3);
    assert_eq!(report.discrepancy_count(), 2);
    let discrepancy = &report.discrepancies[0];
    assert_eq!(discrepancy.rsid, "rs12562034");
    assert_eq!(discrepancy.source_index, 1);
    assert_eq!(discrepancy.existing.genotype, "GG");
    assert_eq!(discrepancy.incoming.genotype, "AG");
    assert_eq!(genotypes.get("rs12562034").unwrap().genotype, "GG");

    // Allele order counts by default, so FTDNA's GA conflicts with 23andMe's AG.
    assert_eq!(report.sources[2].common_rsids, ["rs4"]);
    assert_eq!(report.sources[2].discrepant_genotype_rsids, ["rs4"]);
    assert_eq!(genotypes.get("rs4").unwrap().genotype, "AG");

    assert_eq!(individual.sex(), Sex::Female);
    let summary = individual.summary();
    assert_eq!(summary.name.as_deref(), Some("Jane Doe"));
    assert_eq!(summary.chromosomes_summary, "1-3, X, MT");
    assert_eq!(summary.no_calls, 2);
}

#[test]
fn lenient_merge_ignores_allele_order_and_fills_no_calls() {
    let kit_b = "rsid,chromosome,position,genotype\nrs4,X,5000000,--\nrs21,5,500,--\n";
    let kit_c = "rsid,chromosome,position,genotype\nrs21,5,500,CT\n";
    let options = MergeOptions {
        fill_no_calls: true,
        ignore_allele_order: true,
        ..MergeOptions::default()
    };

    let individual = Individual::with_options(
        "x",
        [
            Source::from(TWENTY_THREE.as_bytes().to_vec()),
            Source::from(FTDNA.as_bytes().to_vec()),
            Source::from(kit_b.as_bytes().to_vec()),
            Source::from(kit_c.as_bytes().to_vec()),
        ],
        &ReadOptions::default(),
        &options,
    )
    .unwrap();

    let report = individual.load_report();
    assert_eq!(report.discrepancy_count(), 0);
    assert_eq!(report.sources[3].filled, 1);
    assert_eq!(individual.genotypes().get("rs4").unwrap().genotype, "AG");
    assert_eq!(individual.genotypes().get("rs21").unwrap().genotype, "CT");
}

#[test]
fn later_merge_reports_per_source_results() {
    let mut individual = Individual::new("x", [Source::from(TWENTY_THREE.as_bytes().to_vec())]).unwrap();
    let extra = read_bytes(FTDNA.as_bytes().to_vec(), &ReadOptions::default()).unwrap().set;

    let report = individual.merge_with(vec![extra], &MergeOptions::with_default_thresholds());
    assert!(report.sources[0].merged);
    assert_eq!(report.sources[0].inserted, 1);
    assert!(individual.genotypes().contains("rs20"));
}

#[test]
fn missing_file_fails_individual_construction() {
    let dir = tempdir().unwrap();
    let good = write_file(&dir, "good.txt", TWENTY_THREE).unwrap();
    let missing = dir.path().join("missing.txt");

    let err = Individual::from_paths("x", &[good, missing], &ReadOptions::default()).unwrap_err();
    assert!(err.to_string().contains("missing.txt"));
}

#[test]
fn csv_export_round_trips() {
    let parsed = read_bytes(ANCESTRY.as_bytes().to_vec(), &ReadOptions::default()).unwrap();
    let csv = export::to_csv_string(&parsed.set).unwrap();

    let reread = read_bytes(csv.into_bytes(), &ReadOptions::default()).unwrap();
    assert_eq!(reread.kind, ParserKind::Generic);
    assert_eq!(reread.set.build(), Build::Grch37);

    let original: Vec<_> = parsed.set.iter().cloned().collect();
    let round_tripped: Vec<_> = reread.set.iter().cloned().collect();
    assert_eq!(original, round_tripped);
}

#[test]
fn csv_export_round_trips_quoted_fields() {
    let mut set = GenotypeSet::with_source("test");
    set.insert(dtc_genotypes::GenotypeCall::new("rs1,alt", Chromosome::Autosome(1), 101, "AA"));
    set.insert(dtc_genotypes::GenotypeCall::new("rs2", Chromosome::Autosome(1), 202, "CT"));

    let csv = export::to_csv_string(&set).unwrap();
    assert!(csv.contains("\"rs1,alt\",1,101,AA"));

    let reread = read_bytes(csv.into_bytes(), &ReadOptions::default()).unwrap();
    assert_eq!(reread.stats.skipped_rows, 0);
    assert_eq!(reread.set.rsids().collect::<Vec<_>>(), ["rs1,alt", "rs2"]);
    assert_eq!(reread.set.get("rs1,alt").unwrap().genotype, "AA");
}

#[test]
fn vcf_export_then_reimport() {
    let mut set = GenotypeSet::with_source("test");
    for (rsid, pos, gt) in [("rs1", 1, "AC"), ("rs2", 2, "CC"), ("rs3", 3, "--")] {
        set.insert(dtc_genotypes::GenotypeCall::new(rsid, Chromosome::Autosome(1), pos, gt));
    }
    set.set_build(Build::Grch38);

    let reference = InMemoryReference::new().with_sequence(Chromosome::Autosome(1), "ACGT");
    let (vcf, summary) = export::to_vcf_string(&set, &reference, &VcfOptions::default()).unwrap();
    assert_eq!(summary.written, 3);

    let parsed = read_bytes(vcf.into_bytes(), &ReadOptions::default()).unwrap();
    assert_eq!(parsed.kind, ParserKind::Vcf);
    assert_eq!(parsed.set.get("rs1").unwrap().genotype, "AC");
    assert_eq!(parsed.set.get("rs2").unwrap().genotype, "CC");
    assert!(parsed.set.get("rs3").unwrap().is_no_call());
}

#[test]
fn vcf_export_with_fasta_reference() {
    let dir = tempdir().unwrap();
    let fasta = write_file(&dir, "reference.fa", ">chr1\nACGTACGT\n>chr2\nTTTTGGGG\n").unwrap();
    let reference = ReferenceGenome::open(&fasta, None).unwrap();

    let mut set = GenotypeSet::with_source("test");
    set.insert(dtc_genotypes::GenotypeCall::new("rs1", Chromosome::Autosome(2), 5, "GT"));
    set.insert(dtc_genotypes::GenotypeCall::new("rs2", Chromosome::Autosome(3), 5, "GT"));

    let output = dir.path().join("out.vcf");
    let summary = export::write_vcf_file(&set, &reference, &VcfOptions::default(), &output).unwrap();
    assert_eq!(summary.written, 1);
    assert_eq!(summary.skipped_rsids, ["rs2"]);

    let text = fs::read_to_string(&output).unwrap();
    assert!(text.contains("##contig=<ID=2,length=8>"));
    assert!(text.contains("2\t5\trs1\tG\tT\t.\t.\t.\tGT\t0/1"));
}

#[test]
fn build_detection_conflict_is_an_error() {
    let text = "rs3094315\t1\t752566\tAA\nrs2341354\t1\t983193\tGG\n";
    let err = read_bytes(text.as_bytes().to_vec(), &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, ReadError::Build(_)));

    let options = ReadOptions {
        build: Some(Build::Grch37),
        ..ReadOptions::default()
    };
    assert_eq!(read_bytes(text.as_bytes().to_vec(), &options).unwrap().set.build(), Build::Grch37);
}

#[test]
fn build_comment_overrides_fingerprint_positions() {
    // rs3094315 sits at another build's coordinate in every case.
    let cases = [
        (36, 752_566, Build::Ncbi36),
        (37, 817_186, Build::Grch37),
        (38, 742_429, Build::Grch38),
    ];
    for (declared, position, expected) in cases {
        let text = format!(
            "# This data file generated by 23andMe\n# We are using reference human assembly build {declared}\nrs3094315\t1\t{position}\tAA\nrs1\t2\t100\tCT\n"
        );
        let parsed = read_bytes(text.into_bytes(), &ReadOptions::default()).unwrap();
        assert_eq!(parsed.build_hint, Some(expected), "build {declared}");
        assert_eq!(parsed.set.build(), expected, "build {declared}");
    }
}
