use std::path::PathBuf;
use std::time::Instant;

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::*;
use log::{debug, info};

use crate::abundance_matrix::{level_taxonomy, CollapsedTable};
use crate::colormap::{check_group_capacity, define_joint_cmap, define_single_cmap, ColorAssignment};
use crate::error::{Result, TaxaplotError};
use crate::generate_test_data::{generate_table, GeneratorParams};
use crate::plot::{figure_format, plot_area, PlotOptions};
use crate::profile::{profile_joint_levels, profile_one_level, JointParams, ProfileParams, StackedProfile};
use crate::table_parser::{read_sample_list, read_table};
use crate::taxonomy::{extract_label_array, resolve_level, DEFAULT_DELIMITER};

#[derive(Parser, Debug)]
#[command(
    name = "taxaplot",
    version,
    about = "Stacked-area plots of the most abundant taxa in an abundance table"
)]
pub struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Area plot of the top groups at one taxonomic level
    Area(AreaArgs),
    /// Area plot grouping fine levels inside rough levels
    Joint(JointArgs),
    /// Write a synthetic multilevel abundance table
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
pub struct TableArgs {
    /// The count table as a TSV classic biom (features as rows, samples as columns)
    #[arg(long)]
    pub table: PathBuf,

    /// File listing the samples to plot, one per line. Defaults to every
    /// column except the taxonomy column
    #[arg(long)]
    pub samples: Option<PathBuf>,

    /// The column containing taxonomy information
    #[arg(long, default_value = "taxon_name")]
    pub tax_col: String,

    /// The delimiter between taxonomic levels
    #[arg(long, default_value = DEFAULT_DELIMITER)]
    pub tax_delim: String,

    /// Whether the table holds every taxonomic level (shotgun/Kraken style,
    /// columns do not sum to 1) rather than a single level
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub multilevel_table: bool,
}

#[derive(Args, Debug)]
pub struct FigureArgs {
    /// The figure to save; .png (rendered at --dpi) or .svg
    #[arg(long)]
    pub figure: PathBuf,

    /// Interval between sample ticks
    #[arg(long, default_value_t = 5)]
    pub sample_interval: usize,

    #[arg(long, default_value_t = 300)]
    pub dpi: u32,

    /// Also write the displayed groups and their bounds as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Also write the collapsed table as TSV
    #[arg(long)]
    pub collapsed: Option<PathBuf>,

    /// Do not print the group summary
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct AreaArgs {
    #[command(flatten)]
    pub table: TableArgs,

    /// The taxonomic level to display, as an index or a rank name (e.g. phylum)
    #[arg(long, value_parser = parse_level)]
    pub level: usize,

    #[command(flatten)]
    pub figure: FigureArgs,

    /// The qualitative colormap. Falls back to Set3 when it has fewer colors
    /// than --group-thresh
    #[arg(long, default_value = "Set3")]
    pub colormap: String,

    /// The minimum mean relative abundance for a group to be plotted
    #[arg(long, default_value_t = 0.01)]
    pub abund_thresh: f64,

    /// The maximum number of groups (colors) to show
    #[arg(long, default_value_t = 8)]
    pub group_thresh: usize,
}

#[derive(Args, Debug)]
pub struct JointArgs {
    #[command(flatten)]
    pub table: TableArgs,

    /// The rough (coarser) level used to pick color families
    #[arg(long, value_parser = parse_level)]
    pub rough_level: usize,

    /// The fine level shown inside each rough group
    #[arg(long, value_parser = parse_level)]
    pub fine_level: usize,

    #[command(flatten)]
    pub figure: FigureArgs,

    #[arg(long, default_value_t = 0.01)]
    pub abund_thresh_rough: f64,

    #[arg(long, default_value_t = 0.01)]
    pub abund_thresh_fine: f64,

    /// The maximum number of rough groups (at most 6, one per color family)
    #[arg(long, default_value_t = 4)]
    pub group_thresh_rough: usize,

    /// The maximum number of fine groups shown per rough group; the rest are
    /// pooled into "other <rough group>"
    #[arg(long, default_value_t = 5)]
    pub group_thresh_fine: usize,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[arg(short, long)]
    pub output: PathBuf,

    /// Number of samples (columns)
    #[arg(long, default_value_t = 24)]
    pub samples: usize,

    /// Number of leaf taxa
    #[arg(long, default_value_t = 60)]
    pub taxa: usize,

    /// Reads distributed over each sample
    #[arg(long, default_value_t = 100_000)]
    pub reads: u64,

    /// Data shape: balanced, wide, deep or sparse
    #[arg(long, default_value = "balanced")]
    pub preset: String,

    #[arg(long)]
    pub seed: Option<u64>,
}

fn parse_level(arg: &str) -> std::result::Result<usize, String> {
    resolve_level(arg).map_err(|e| e.to_string())
}

fn init_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_target(false)
        .try_init();
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Commands::Area(args) => run_area(&args),
        Commands::Joint(args) => run_joint(&args),
        Commands::Generate(args) => run_generate(&args),
    }
}

// Reads the table and collapses it to `level`
fn load_collapsed(args: &TableArgs, level: usize) -> Result<CollapsedTable> {
    let start = Instant::now();
    let table = read_table(&args.table, &args.tax_col)?;
    let taxa = extract_label_array(&table.taxonomy, &args.tax_delim);
    if level >= taxa.depth() {
        return Err(TaxaplotError::InvalidArgument(format!(
            "level {} is deeper than the table's taxonomy ({} levels)",
            level,
            taxa.depth()
        )));
    }

    let requested = match &args.samples {
        Some(path) => Some(read_sample_list(path)?),
        None => None,
    };
    let samples = table.select_samples(requested.as_deref())?;
    if samples.is_empty() {
        return Err(TaxaplotError::InvalidArgument("no samples to plot".to_string()));
    }

    let collapsed = level_taxonomy(&table, &taxa, &samples, level, args.multilevel_table)?;
    info!(
        "Collapsed {} rows to {} taxa at level {} across {} samples",
        table.num_rows(),
        collapsed.rows.len(),
        level,
        samples.len()
    );
    debug!("Read and collapse time: {:.6} seconds", start.elapsed().as_secs_f64());
    Ok(collapsed)
}

fn plot_options(args: &FigureArgs) -> PlotOptions {
    PlotOptions {
        dpi: args.dpi,
        sample_interval: args.sample_interval,
        ..PlotOptions::default()
    }
}

fn write_outputs(
    profile: &StackedProfile,
    colors: &ColorAssignment,
    collapsed: &CollapsedTable,
    args: &FigureArgs,
) -> Result<()> {
    if !args.quiet {
        crate::report::print_profile_summary(profile, colors);
    }

    if let Some(path) = &args.collapsed {
        collapsed.write_matrix(path)?;
        println!("Collapsed table written to {}", path.display());
    }

    let start = Instant::now();
    plot_area(profile, colors, &args.figure, &plot_options(args))?;
    debug!("Render time: {:.6} seconds", start.elapsed().as_secs_f64());
    println!("{} {}", "Figure written to".green(), args.figure.display());

    if let Some(path) = &args.json {
        crate::report::write_json_report(profile, colors, path)?;
        println!("JSON report written to {}", path.display());
    }
    Ok(())
}

// Catches bad figure settings before any input is read
fn check_figure_args(args: &FigureArgs) -> Result<()> {
    figure_format(&args.figure)?;
    if args.dpi == 0 {
        return Err(TaxaplotError::InvalidArgument(
            "--dpi must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn run_area(args: &AreaArgs) -> Result<()> {
    check_figure_args(&args.figure)?;
    let colormap = check_group_capacity(args.group_thresh, &args.colormap)?;

    let collapsed = load_collapsed(&args.table, args.level)?;
    let params = ProfileParams {
        threshold: args.abund_thresh,
        count: args.group_thresh,
    };
    let profile = profile_one_level(&collapsed, args.level, &params)?;
    let colors = define_single_cmap(&colormap, &profile.labels());

    write_outputs(&profile, &colors, &collapsed, &args.figure)
}

fn run_joint(args: &JointArgs) -> Result<()> {
    check_figure_args(&args.figure)?;
    if args.rough_level >= args.fine_level {
        return Err(TaxaplotError::InvalidArgument(format!(
            "--rough-level {} must be coarser than --fine-level {}",
            args.rough_level, args.fine_level
        )));
    }

    let collapsed = load_collapsed(&args.table, args.fine_level)?;
    let params = JointParams {
        lo_thresh: args.abund_thresh_rough,
        hi_thresh: args.abund_thresh_fine,
        lo_count: args.group_thresh_rough,
        hi_count: args.group_thresh_fine,
    };
    let profile = profile_joint_levels(&collapsed, args.rough_level, args.fine_level, &params)?;
    let colors = define_joint_cmap(&profile.rough_pairs())?;

    write_outputs(&profile, &colors, &collapsed, &args.figure)
}

fn run_generate(args: &GenerateArgs) -> Result<()> {
    let params = GeneratorParams {
        output_file: args.output.clone(),
        num_samples: args.samples,
        num_taxa: args.taxa,
        reads_per_sample: args.reads,
        seed: args.seed,
        ..GeneratorParams::default()
    }
    .with_preset(&args.preset)?;

    let rows = generate_table(&params)?;
    println!("Generated {} rows in {}", rows, args.output.display());
    Ok(())
}
