//! Stage-by-stage walk through the fetal vs. adult analysis.
//!
//! This example shows how to:
//! 1. Build a synthetic count matrix with fetal-specific genes
//! 2. Normalize and explore it (TMM, logCPM, PCA)
//! 3. Fit the linear model and run the moderated t-test
//! 4. Check DEG promoters against a peak set

use neurodev_dge::prelude::*;
use neurodev_dge::data::GeneRecord;

const N_GENES: usize = 120;
const N_PER_GROUP: usize = 4;

fn main() -> Result<()> {
    println!("=== Fetal vs. adult brain DE ===\n");

    let counts = create_example_counts()?;
    println!("Data dimensions:");
    println!("  Genes:   {}", counts.n_genes());
    println!("  Samples: {}", counts.n_samples());
    println!();

    let samples_path = std::env::temp_dir().join("neurodev_dge_demo_samples.tsv");
    let mut samples = String::from("sample_id\tage_group\n");
    for (j, id) in counts.sample_ids().iter().enumerate() {
        let group = if j < N_PER_GROUP { "adult" } else { "fetal" };
        samples.push_str(&format!("{}\t{}\n", id, group));
    }
    std::fs::write(&samples_path, samples)?;
    let samples = SampleTable::from_tsv(&samples_path)?;

    // Normalization and exploration
    println!("=== Normalization ===\n");
    let tmm = tmm_factors(&counts)?;
    for (id, f) in counts.sample_ids().iter().zip(&tmm.norm_factors) {
        println!("  {:<8} TMM factor {:.3}", id, f);
    }
    let explore = log2_counts(&counts, 1.0)?;
    let pcs = pca(&explore, 2, false)?;
    println!(
        "\nPCA: PC1 {:.1}%, PC2 {:.1}%",
        100.0 * pcs.variance_explained[0],
        100.0 * pcs.variance_explained[1]
    );
    println!();

    // Model, moderated t and BH
    println!("=== Moderated t-test ===\n");
    let expr = log_cpm(&counts, &tmm.norm_factors, 0.5)?;
    let design = DesignMatrix::from_spec(&samples, &DesignSpec::new("age_group").with_reference("adult"))?;
    let fit = model_lm(&expr, &design)?;
    let moderated = test_moderated(&fit, "age_groupfetal", 0.01)?;
    println!("Prior df d0 = {:.2}, s0^2 = {:.4}", moderated.df_prior, moderated.var_prior);

    let bh = correct_bh_moderated(&moderated);
    let results = create_results(&moderated, &bh, &[])?;
    println!("{}", results.summary(0.05));
    println!("\nTop 5 genes:");
    for r in results.iter().take(5) {
        println!(
            "  {:<10} logFC {:>6.2}  t {:>7.2}  adj.P {:.2e}  B {:>6.2}",
            r.gene_id, r.log_fc, r.t, r.adj_p_value, r.b
        );
    }
    println!();

    // Promoter overlap
    println!("=== Promoter overlap ===\n");
    let annotation = create_example_annotation()?;
    let degs: Vec<String> = results
        .significant_at(0.05)
        .iter()
        .map(|r| r.gene_id.clone())
        .collect();
    let background: Vec<String> = results.iter().map(|r| r.gene_id.clone()).collect();
    let peaks = IntervalSet::new(
        (0..15)
            .map(|i| GenomicInterval::new("chr1", tss(i) - 500, tss(i) + 500, Strand::Unknown))
            .collect::<Result<Vec<_>>>()?,
    );

    let deg_overlap = overlap_fraction(&promoters(&annotation, &degs, 2000, 200)?, &peaks);
    let bg_overlap = overlap_fraction(&promoters(&annotation, &background, 2000, 200)?, &peaks);
    println!(
        "DEG promoters with a peak:        {}/{} ({:.1}%)",
        deg_overlap.n_overlapping,
        deg_overlap.n_promoters,
        100.0 * deg_overlap.fraction
    );
    println!(
        "Background promoters with a peak: {}/{} ({:.1}%)",
        bg_overlap.n_overlapping,
        bg_overlap.n_promoters,
        100.0 * bg_overlap.fraction
    );

    let _ = std::fs::remove_file(&samples_path);
    Ok(())
}

fn tss(i: usize) -> u64 {
    50_000 * (i as u64 + 1)
}

/// Genes 0-14 are 8x higher in fetal samples.
fn create_example_counts() -> Result<CountMatrix> {
    let mut seed = 11u64;
    let mut rand = move || -> f64 {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        ((seed >> 16) & 0x7FFF) as f64 / 32768.0
    };

    let columns: Vec<Vec<u64>> = (0..2 * N_PER_GROUP)
        .map(|sample| {
            let fetal = sample >= N_PER_GROUP;
            (0..N_GENES)
                .map(|gene| {
                    let base = 80.0 + 5.0 * (gene % 40) as f64;
                    let effect = if fetal && gene < 15 { 8.0 } else { 1.0 };
                    (base * effect * (0.8 + 0.4 * rand())).round() as u64
                })
                .collect()
        })
        .collect();

    CountMatrix::from_columns(
        (0..N_GENES).map(|i| format!("G{:04}", i)).collect(),
        (0..2 * N_PER_GROUP).map(|j| format!("S{}", j)).collect(),
        &columns,
    )
}

fn create_example_annotation() -> Result<GeneAnnotation> {
    let records = (0..N_GENES)
        .map(|i| {
            Ok(GeneRecord {
                gene_id: format!("G{:04}", i),
                symbol: format!("GENE{}", i),
                location: Some(GenomicInterval::new("chr1", tss(i), tss(i) + 10_000, Strand::Forward)?),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(GeneAnnotation::new(records))
}
