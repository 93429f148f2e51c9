use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gseawrap::checkpoint;
use gseawrap::compute::{self, GseaJob, PrerankJob};
use gseawrap::config::Workspace;
use gseawrap::plot::{self, ImageFormat, PlotContext, PlotRequest, PlottersRenderer};
use gseawrap::validate;
use gseawrap::{GseaError, Metric, PermutationEngine};

#[derive(Parser, Debug)]
#[command(name = "gseawrap", version, about = "Gene Set Enrichment Analysis with checkpointed plotting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Phenotype permutation GSEA on an expression matrix
    Gsea(GseaArgs),
    /// Gene permutation GSEA on a ranked list
    Prerank(PrerankArgs),
    /// Draw a chart from the saved analysis
    Plot(PlotArgs),
}

#[derive(Args, Debug)]
struct GseaArgs {
    /// Gene set collection (.gmt, .gmx)
    gene_sets: PathBuf,
    #[arg(allow_negative_numbers = true)]
    permutations: i64,
    #[arg(allow_negative_numbers = true)]
    min_size: i64,
    #[arg(allow_negative_numbers = true)]
    max_size: i64,
    /// Expression matrix (.gct, .res, .pcl, .txt)
    expression: PathBuf,
    /// Phenotype labels (.cls)
    phenotypes: PathBuf,
    /// "none" keeps identifiers, anything else remaps them through the chip
    remap: String,
    /// Chip file (.chip), or "null"
    chip: String,

    #[arg(long, default_value = "signal_to_noise")]
    method: Metric,
    #[arg(long, default_value_t = 1.0)]
    weight: f64,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

#[derive(Args, Debug)]
struct PrerankArgs {
    /// Gene set collection (.gmt, .gmx)
    gene_sets: PathBuf,
    #[arg(allow_negative_numbers = true)]
    permutations: i64,
    /// Ranked list (.rnk)
    ranked: PathBuf,
    /// "none" keeps identifiers, anything else remaps them through the chip
    remap: String,
    /// Chip file (.chip), or "null"
    chip: String,

    #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
    min_size: i64,
    #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
    max_size: i64,
    #[arg(long, default_value_t = 1.0)]
    weight: f64,
    #[arg(long, default_value_t = 6)]
    seed: u64,
    #[arg(long, default_value_t = 8)]
    threads: usize,
}

#[derive(Args, Debug)]
struct PlotArgs {
    /// enrichment-plot, dotplot, heatmap, intersection-over-union or wordcloud
    kind: String,
    /// Kind-specific arguments followed by <width> <height> [unit]
    #[arg(num_args = 0.., allow_negative_numbers = true)]
    args: Vec<String>,
    /// Comma-separated export formats
    #[arg(long, value_delimiter = ',', default_value = "png")]
    formats: Vec<ImageFormat>,
    /// Output path without extension
    #[arg(long)]
    output: Option<PathBuf>,
    /// Gene set file used to resolve term names for intersection-over-union
    #[arg(long)]
    gene_sets: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<(), GseaError> {
    let ws = Workspace::from_env()?;
    match cli.command {
        Commands::Gsea(a) => {
            let job = GseaJob {
                gene_sets: a.gene_sets,
                permutations: a.permutations,
                min_size: a.min_size,
                max_size: a.max_size,
                expression: a.expression,
                phenotypes: a.phenotypes,
                remap: a.remap,
                chip: a.chip,
                method: a.method,
                weight: a.weight,
                seed: a.seed,
                threads: a.threads,
            };
            let state = compute::run_gsea(&job, &PermutationEngine, &ws.checkpoint_path())?;
            compute::write_records(std::io::stdout().lock(), &state.result)
        }
        Commands::Prerank(a) => {
            let job = PrerankJob {
                gene_sets: a.gene_sets,
                permutations: a.permutations,
                ranked: a.ranked,
                remap: a.remap,
                chip: a.chip,
                min_size: a.min_size,
                max_size: a.max_size,
                weight: a.weight,
                seed: a.seed,
                threads: a.threads,
            };
            let state = compute::run_prerank(&job, &PermutationEngine, &ws.checkpoint_path())?;
            compute::write_records(std::io::stdout().lock(), &state.result)
        }
        Commands::Plot(a) => {
            let request = PlotRequest::parse(&a.kind, &a.args)?;
            let gene_sets = a
                .gene_sets
                .as_deref()
                .map(validate::load_gene_sets)
                .transpose()?;
            let state = if request.needs_analysis(gene_sets.is_some()) {
                Some(checkpoint::load(&ws.checkpoint_path())?)
            } else {
                None
            };
            let ctx = PlotContext {
                state: state.as_ref(),
                gene_sets: gene_sets.as_ref(),
            };
            let base = a.output.unwrap_or_else(|| ws.plot_base());
            let written = plot::dispatch(&request, ctx, &PlottersRenderer, &base, &a.formats)?;
            for path in &written {
                println!("{}", path.display());
            }
            info!(files = written.len(), kind = ?request.kind(), "plot finished");
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version print to stdout and succeed
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
