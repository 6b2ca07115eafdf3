//! dge - fetal vs. adult brain differential expression CLI
//!
//! Runs the whole analysis from a YAML configuration, or single stages from
//! files on disk.

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, Level};
use neurodev_dge::assemble::{join_annotation, merge_sample_counts};
use neurodev_dge::count::{count_bam, CountConfig, Strandedness};
use neurodev_dge::data::DeResultSet;
use neurodev_dge::epigenome::{write_overlap_tsv, EpigenomeCategory, PromoterWindow};
use neurodev_dge::error::{DgeError, Result};
use neurodev_dge::explore::volcano_svg;
use neurodev_dge::pipeline::{
    load_annotation, load_features, promoter_overlap, write_assignment_summary, Analysis,
    AnalysisConfig, EpigenomeConfig, SampleInput, TestConfig,
};
use std::fs;
use std::path::{Path, PathBuf};

/// CLI-friendly strandedness enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStrandedness {
    /// featureCounts -s 0
    Unstranded,
    /// featureCounts -s 1
    Forward,
    /// featureCounts -s 2
    Reverse,
}

impl From<CliStrandedness> for Strandedness {
    fn from(s: CliStrandedness) -> Self {
        match s {
            CliStrandedness::Unstranded => Strandedness::Unstranded,
            CliStrandedness::Forward => Strandedness::Forward,
            CliStrandedness::Reverse => Strandedness::Reverse,
        }
    }
}

/// Fetal vs. adult brain RNA-seq differential expression
#[derive(Parser)]
#[command(name = "dge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    verbosity: Verbosity,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Verbosity {
    /// Log debug messages
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

impl Verbosity {
    fn level(&self) -> Level {
        if self.verbose {
            Level::Debug
        } else if self.quiet {
            Level::Warn
        } else {
            Level::Info
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Count reads per gene from BAM files
    Count {
        /// BAM files, as SAMPLE=PATH or PATH (sample id from the file name)
        #[arg(required = true)]
        bams: Vec<String>,

        /// GTF (optionally gzipped) or SAF feature file
        #[arg(short, long)]
        features: PathBuf,

        /// Directory for per-sample count files and the assignment summary
        #[arg(short, long, default_value = "counts")]
        output_dir: PathBuf,

        /// Library strandedness
        #[arg(short, long, value_enum, default_value = "unstranded")]
        strandedness: CliStrandedness,

        /// Minimum mapping quality
        #[arg(long, default_value = "0")]
        min_mapq: u8,

        /// Count fragments instead of reads
        #[arg(short, long)]
        paired_end: bool,

        /// Skip reads flagged as duplicates
        #[arg(long)]
        ignore_duplicates: bool,

        /// GTF feature type to count over
        #[arg(long, default_value = "exon")]
        feature_type: String,

        /// GTF attribute holding the gene identifier
        #[arg(long, default_value = "gene_id")]
        attribute: String,
    },

    /// Merge per-sample count files into one matrix
    Merge {
        /// Count files, as SAMPLE=PATH or PATH (sample id from the file name)
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Gene annotation; drops unannotated rows when given
        #[arg(short, long)]
        annotation: Option<PathBuf>,

        /// Match versioned gene ids against unversioned annotation keys
        #[arg(long)]
        strip_versions: bool,

        /// Output path for the merged matrix TSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run counting through differential expression from a configuration
    De {
        /// Path to analysis configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Overlap DEG promoters with H3K4me3 peaks
    Overlap {
        /// DE results TSV written by `dge de` or `dge run`
        #[arg(short, long)]
        results: PathBuf,

        /// Gene annotation (TSV or GTF) with TSS positions
        #[arg(short, long)]
        annotation: PathBuf,

        /// Roadmap categories: fetal_brain, adult_brain, adult_liver (default: all three)
        #[arg(short = 'g', long = "category")]
        categories: Vec<String>,

        /// Additional peak files, as NAME=PATH or NAME=URL
        #[arg(short, long = "peaks")]
        peaks: Vec<String>,

        /// Adjusted p-value threshold for DEGs
        #[arg(long, default_value = "0.05")]
        alpha: f64,

        /// Minimum absolute log2 fold change for DEGs
        #[arg(long, default_value = "0.0")]
        min_abs_log_fc: f64,

        /// Bases upstream of the TSS
        #[arg(long, default_value = "2000")]
        upstream: u64,

        /// Bases downstream of the TSS
        #[arg(long, default_value = "200")]
        downstream: u64,

        /// Peak download cache
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Output path for the overlap TSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run the complete analysis from a configuration
    Run {
        /// Path to analysis configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Write an example configuration
    Example {
        /// Output path for the YAML template
        #[arg(short, long, default_value = "analysis.yaml")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = simple_logger::init_with_level(cli.verbosity.level()) {
        eprintln!("Warning: could not initialize logging: {}", e);
    }

    let result = match cli.command {
        Commands::Count {
            bams,
            features,
            output_dir,
            strandedness,
            min_mapq,
            paired_end,
            ignore_duplicates,
            feature_type,
            attribute,
        } => {
            let config = CountConfig {
                strandedness: strandedness.into(),
                min_mapq,
                paired_end,
                ignore_duplicates,
                feature_type,
                attribute,
            };
            cmd_count(&bams, &features, &output_dir, &config)
        }

        Commands::Merge {
            inputs,
            annotation,
            strip_versions,
            output,
        } => cmd_merge(&inputs, annotation.as_deref(), strip_versions, &output),

        Commands::De { config, output_dir } => cmd_de(&config, output_dir),

        Commands::Overlap {
            results,
            annotation,
            categories,
            peaks,
            alpha,
            min_abs_log_fc,
            upstream,
            downstream,
            cache_dir,
            output,
        } => {
            let test = TestConfig {
                alpha,
                min_abs_log_fc,
                ..TestConfig::default()
            };
            parse_categories(&categories, &peaks).and_then(|categories| {
                let epigenome = EpigenomeConfig {
                    enabled: true,
                    categories,
                    promoter: PromoterWindow {
                        upstream,
                        downstream,
                    },
                    cache_dir,
                };
                cmd_overlap(&results, &annotation, &test, &epigenome, &output)
            })
        }

        Commands::Run { config, output_dir } => cmd_run(&config, output_dir),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Parse `SAMPLE=PATH`, or take the sample id from the file name.
fn parse_sample_input(arg: &str) -> Result<SampleInput> {
    if let Some((sample_id, path)) = arg.split_once('=') {
        if sample_id.is_empty() || path.is_empty() {
            return Err(DgeError::InvalidParameter(format!(
                "expected SAMPLE=PATH, got '{}'",
                arg
            )));
        }
        return Ok(SampleInput {
            sample_id: sample_id.to_string(),
            path: PathBuf::from(path),
        });
    }
    let path = PathBuf::from(arg);
    let sample_id = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| DgeError::InvalidParameter(format!("cannot derive a sample id from '{}'", arg)))?
        .to_string();
    Ok(SampleInput { sample_id, path })
}

fn parse_categories(names: &[String], peaks: &[String]) -> Result<Vec<EpigenomeCategory>> {
    let mut categories = names
        .iter()
        .map(|name| {
            EpigenomeCategory::parse(name).ok_or_else(|| {
                DgeError::InvalidParameter(format!(
                    "unknown category '{}' (expected fetal_brain, adult_brain or adult_liver)",
                    name
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    for spec in peaks {
        let (name, source) = spec.split_once('=').ok_or_else(|| {
            DgeError::InvalidParameter(format!("expected NAME=SOURCE for --peaks, got '{}'", spec))
        })?;
        categories.push(EpigenomeCategory::Custom {
            name: name.to_string(),
            source: source.to_string(),
        });
    }

    if categories.is_empty() {
        categories = EpigenomeCategory::roadmap();
    }
    Ok(categories)
}

/// Count every BAM and write one count file per sample.
fn cmd_count(bams: &[String], features: &Path, output_dir: &Path, config: &CountConfig) -> Result<()> {
    let inputs = bams
        .iter()
        .map(|b| parse_sample_input(b))
        .collect::<Result<Vec<_>>>()?;

    info!("Loading features from {}", features.display());
    let index = load_features(features, config)?;
    info!("{} genes, {} features", index.n_genes(), index.n_features());

    fs::create_dir_all(output_dir)?;
    let mut summaries = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let counts = count_bam(&input.path, &input.sample_id, &index, config)?;
        let path = output_dir.join(format!("{}.counts.txt", input.sample_id));
        counts.write_tsv(&path)?;
        info!("Wrote {}", path.display());
        summaries.push((input.sample_id.clone(), counts.summary));
    }

    let summary_path = output_dir.join("counting_summary.tsv");
    write_assignment_summary(&summaries, &summary_path)?;
    info!("Wrote {}", summary_path.display());
    Ok(())
}

fn cmd_merge(inputs: &[String], annotation: Option<&Path>, strip_versions: bool, output: &Path) -> Result<()> {
    let files: Vec<(String, PathBuf)> = inputs
        .iter()
        .map(|i| parse_sample_input(i).map(|s| (s.sample_id, s.path)))
        .collect::<Result<_>>()?;

    let mut counts = merge_sample_counts(&files)?;
    if let Some(path) = annotation {
        let annotation = load_annotation(path)?;
        let joined = join_annotation(&counts, &annotation, strip_versions)?;
        info!("Dropped {} unannotated rows", joined.n_unannotated);
        counts = joined.counts;
    }

    counts.to_tsv(output)?;
    info!(
        "Wrote {} genes x {} samples to {}",
        counts.n_genes(),
        counts.n_samples(),
        output.display()
    );
    Ok(())
}

fn load_config(path: &Path, output_dir: Option<PathBuf>) -> Result<AnalysisConfig> {
    info!("Loading configuration from {}", path.display());
    let mut config = AnalysisConfig::from_file(path)?;
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    Ok(config)
}

fn cmd_de(config_path: &Path, output_dir: Option<PathBuf>) -> Result<()> {
    let analysis = Analysis::new(load_config(config_path, output_dir)?)?;
    let config = analysis.config();

    let counted = analysis.count()?;
    let assembled = analysis.assemble(&counted.counts)?;
    let de = analysis.differential_expression(&assembled.set)?;

    fs::create_dir_all(&config.output_dir)?;
    let results_path = config.output_dir.join("de_results.tsv");
    de.results.to_tsv(&results_path)?;
    fs::write(
        config.output_dir.join("volcano.svg"),
        volcano_svg(&de.results, config.test.alpha, config.test.volcano_labels),
    )?;

    let summary = de.results.summary(config.test.alpha);
    println!("Coefficient: {}", de.results.coefficient);
    println!(
        "Genes tested: {}  significant: {} ({} up, {} down) at adj.P < {}",
        summary.total, summary.significant, summary.up, summary.down, config.test.alpha
    );
    println!("\nTop 10 genes:");
    println!("{:<20} {:<12} {:>8} {:>10} {:>10}", "gene_id", "symbol", "logFC", "P.Value", "adj.P.Val");
    for r in de.results.iter().take(10) {
        println!(
            "{:<20} {:<12} {:>8.3} {:>10.2e} {:>10.2e}",
            r.gene_id, r.symbol, r.log_fc, r.p_value, r.adj_p_value
        );
    }
    info!("Wrote {}", results_path.display());
    Ok(())
}

fn cmd_overlap(
    results_path: &Path,
    annotation_path: &Path,
    test: &TestConfig,
    epigenome: &EpigenomeConfig,
    output: &Path,
) -> Result<()> {
    let results = DeResultSet::from_tsv(results_path, "unknown")?;
    let annotation = load_annotation(annotation_path)?;
    let rows = promoter_overlap(&results, &annotation, test, epigenome)?;
    write_overlap_tsv(&rows, output)?;

    println!(
        "{:<14} {:<6} {:>10} {:>10} {:>10}",
        "category", "eid", "DEG", "background", "enrichment"
    );
    for row in &rows {
        println!(
            "{:<14} {:<6} {:>9.1}% {:>9.1}% {:>10.2}",
            row.category,
            row.epigenome_id.as_deref().unwrap_or("-"),
            100.0 * row.deg.fraction,
            100.0 * row.background.fraction,
            row.enrichment()
        );
    }
    info!("Wrote {}", output.display());
    Ok(())
}

fn cmd_run(config_path: &Path, output_dir: Option<PathBuf>) -> Result<()> {
    let analysis = Analysis::new(load_config(config_path, output_dir)?)?;
    info!("Running analysis '{}'", analysis.config().name);
    let report = analysis.run()?;

    println!("Analysis: {}", report.name);
    println!("  Samples:        {}", report.n_samples);
    println!("  Genes counted:  {}", report.n_genes_counted);
    println!("  Unannotated:    {}", report.n_unannotated);
    println!("  Filtered:       {}", report.n_filtered);
    println!("  Genes tested:   {}", report.n_genes_tested);
    println!("  Coefficient:    {}", report.coefficient);
    println!("  Prior df:       {:.2}", report.df_prior);
    println!("  DEGs:           {}", report.n_degs);
    for row in &report.overlaps {
        println!(
            "  {:<14} DEG {:.1}% vs background {:.1}%",
            row.category,
            100.0 * row.deg.fraction,
            100.0 * row.background.fraction
        );
    }
    println!("Outputs in {}", analysis.config().output_dir.display());
    Ok(())
}

fn cmd_example(output_path: &Path) -> Result<()> {
    let yaml = AnalysisConfig::example().to_yaml()?;
    fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);
    Ok(())
}
