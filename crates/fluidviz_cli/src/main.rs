//! fluidviz CLI - converts CFD datasets into frame sequences for rendering
//!
//! Provides subcommands for:
//! - `info`: Describe a dataset
//! - `isosurface`, `colorize`, `lambda2`: Per-timestep PLY meshes
//! - `fog`: Per-timestep `.bvox` fog volumes
//! - `streamlines`: Per-timestep streamline tube meshes
//! - `percentiles`: Dataset-wide percentile tables
//! - `place`: Move grid-space meshes into render space
//! - `body`: Mesh one ijk layer of a curvilinear grid

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use fluidviz::codec::write_mesh;
use fluidviz::config::{CutPlane, Seeding};
use fluidviz::percentile::{
    estimate_over_timesteps, magnitude_population, InterfaceMask, PercentileCache,
    PercentileTable,
};
use fluidviz::pipeline::{self, Outcome};
use fluidviz::streamline::SeedFace;
use fluidviz::{body_surface, Axis, FieldAccessor, PipelineConfig};

mod info;

#[derive(Parser, Debug)]
#[command(name = "fluidviz")]
#[command(about = "Convert CFD field data into renderable geometry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Describe a dataset's grid, timesteps and channels
    Info(info::InfoArgs),
    /// Extract isosurface meshes for every timestep
    Isosurface(IsosurfaceArgs),
    /// Colour previously extracted isosurfaces by a second channel
    Colorize(ColorizeArgs),
    /// Convert vapour fraction into log-scaled fog volumes
    Fog(FogArgs),
    /// Extract lambda2 vortex-core surfaces
    Lambda2(Lambda2Args),
    /// Trace streamlines and export them as tube meshes
    Streamlines(StreamlineArgs),
    /// Compute and store a percentile table
    Percentiles(PercentileArgs),
    /// Centre meshes in render space and optionally cut them in half
    Place(PlaceArgs),
    /// Export one ijk layer of the grid as a surface mesh
    Body(BodyArgs),
}

/// Options shared by every command that reads a dataset.
#[derive(Parser, Debug)]
pub struct DatasetArgs {
    /// Dataset directory (contains dataset.json)
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// JSON pipeline config; command-line options override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Worker threads (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,
}

impl DatasetArgs {
    fn open(&self) -> Result<(FieldAccessor, PipelineConfig)> {
        let mut config = match &self.config {
            Some(path) => {
                log::info!("Loading pipeline config from {}", path.display());
                PipelineConfig::load(path)?
            }
            None => {
                log::debug!("No config given, using defaults");
                PipelineConfig::default()
            }
        };
        if let Some(threads) = self.threads {
            config.num_threads = threads;
        }
        let accessor = FieldAccessor::open(&self.dataset)
            .with_context(|| format!("Failed to open dataset {}", self.dataset.display()))?;
        let info = accessor.info()?;
        log::info!(
            "Opened dataset {}: {:?} nodes, {} timesteps",
            self.dataset.display(),
            info.resolution,
            info.timestep_count
        );
        Ok((accessor, config))
    }
}

#[derive(Parser, Debug)]
pub struct IsosurfaceArgs {
    #[command(flatten)]
    data: DatasetArgs,

    /// Output directory for frame_<t>.ply
    #[arg(short, long)]
    output: PathBuf,

    /// Scalar channel to contour (default: VOF)
    #[arg(long)]
    channel: Option<String>,

    /// Contour level (default: 0.8)
    #[arg(long)]
    level: Option<f64>,

    /// Laplacian smoothing passes (default: 2)
    #[arg(long)]
    smooth: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct ColorizeArgs {
    #[command(flatten)]
    data: DatasetArgs,

    /// Directory of uncoloured frame_<t>.ply meshes
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for coloured meshes
    #[arg(short, long)]
    output: PathBuf,

    /// Channel that drives the colour (default: T)
    #[arg(long)]
    channel: Option<String>,

    /// Lower and upper percentile bounds (default: 1 99)
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
    percentiles: Option<Vec<f64>>,

    /// Directory for cached percentile tables (default: output directory)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct FogArgs {
    #[command(flatten)]
    data: DatasetArgs,

    /// Output directory for frame_<t>.bvox
    #[arg(short, long)]
    output: PathBuf,

    /// Smallest vapour fraction that still shows as fog
    #[arg(long)]
    vapor_min: Option<f64>,

    /// Zero the upper half of the x range
    #[arg(long)]
    halved: bool,
}

#[derive(Parser, Debug)]
pub struct Lambda2Args {
    #[command(flatten)]
    data: DatasetArgs,

    #[arg(short, long)]
    output: PathBuf,

    /// Velocity vector group (default: velocity)
    #[arg(long)]
    velocity: Option<String>,

    /// Contour level, negative inside vortex cores (default: -0.5)
    #[arg(long, allow_hyphen_values = true)]
    level: Option<f64>,
}

#[derive(Parser, Debug)]
pub struct StreamlineArgs {
    #[command(flatten)]
    data: DatasetArgs,

    #[arg(short, long)]
    output: PathBuf,

    /// Seed face: YZ-, YZ+, XZ-, XZ+, XY- or XY+
    #[arg(long)]
    face: Option<SeedFace>,

    /// Seed spacing on the face, in grid cells
    #[arg(long)]
    spacing: Option<f64>,

    /// Only trace this timestep
    #[arg(long)]
    timestep: Option<usize>,

    /// Integration step length
    #[arg(long)]
    step: Option<f64>,

    /// Maximum points per streamline
    #[arg(long)]
    max_steps: Option<usize>,

    /// Tube radius
    #[arg(long)]
    radius: Option<f64>,

    /// Vertices per tube ring
    #[arg(long)]
    sides: Option<usize>,

    /// Directory for cached percentile tables (default: output directory)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct PercentileArgs {
    #[command(flatten)]
    data: DatasetArgs,

    /// Scalar channel, or vector group with --magnitude
    #[arg(long)]
    channel: String,

    /// Output text file
    #[arg(short, long)]
    output: PathBuf,

    /// Treat the channel as a vector group and use its magnitude
    #[arg(long)]
    magnitude: bool,

    /// Sample every n-th node (magnitude only)
    #[arg(long, default_value = "1")]
    stride: usize,

    /// Only count nodes where this channel is positive
    #[arg(long)]
    mask_channel: Option<String>,

    /// With --mask-channel, only count values above this threshold
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    mask_threshold: f64,
}

#[derive(Parser, Debug)]
pub struct PlaceArgs {
    #[command(flatten)]
    data: DatasetArgs,

    #[arg(short, long)]
    input: PathBuf,

    #[arg(short, long)]
    output: PathBuf,

    /// Rendered y extent of the domain (default: 10)
    #[arg(long)]
    scale: Option<f32>,

    /// Remove geometry with x > 0 after centring
    #[arg(long)]
    cut_half: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AxisArg {
    I,
    J,
    K,
}

impl From<AxisArg> for Axis {
    fn from(a: AxisArg) -> Self {
        match a {
            AxisArg::I => Axis::X,
            AxisArg::J => Axis::Y,
            AxisArg::K => Axis::Z,
        }
    }
}

#[derive(Parser, Debug)]
pub struct BodyArgs {
    #[command(flatten)]
    data: DatasetArgs,

    /// Output PLY file
    #[arg(short, long)]
    output: PathBuf,

    /// Axis the layer is perpendicular to
    #[arg(long, value_enum, default_value = "k")]
    axis: AxisArg,

    /// Layer index along the axis
    #[arg(long, default_value = "1")]
    level: usize,

    /// Keep every n-th node in the layer
    #[arg(long, default_value = "1")]
    stride: usize,
}

fn report(stage: &str, outcomes: &[Outcome]) {
    let written = outcomes.iter().filter(|&&o| o == Outcome::Written).count();
    for (t, outcome) in outcomes.iter().enumerate() {
        log::debug!("{stage} timestep {t}: {outcome:?}");
    }
    println!(
        "{stage}: {written} frames written, {} already present",
        outcomes.len() - written
    );
}

fn run_isosurface(args: IsosurfaceArgs) -> Result<()> {
    let (accessor, mut config) = args.data.open()?;
    if let Some(channel) = args.channel {
        config.isosurface.channel = channel;
    }
    if let Some(level) = args.level {
        config.isosurface.level = level;
    }
    if let Some(smooth) = args.smooth {
        config.isosurface.smooth_iterations = smooth;
    }
    let outcomes = pipeline::convert_isosurfaces(&accessor, &config, &args.output)?;
    report("isosurface", &outcomes);
    Ok(())
}

fn run_colorize(args: ColorizeArgs) -> Result<()> {
    let (accessor, mut config) = args.data.open()?;
    if let Some(channel) = args.channel {
        config.color.channel = channel;
    }
    if let Some(p) = args.percentiles {
        config.color.percentile_low = p[0];
        config.color.percentile_high = p[1];
    }
    let cache = PercentileCache::new(args.cache_dir.unwrap_or_else(|| args.output.clone()));
    pipeline::ensure_dir(&args.output)?;
    let outcomes =
        pipeline::convert_colored_isosurfaces(&accessor, &config, &args.input, &args.output, &cache)?;
    report("colorize", &outcomes);
    Ok(())
}

fn run_fog(args: FogArgs) -> Result<()> {
    let (accessor, mut config) = args.data.open()?;
    if let Some(vapor_min) = args.vapor_min {
        config.fog.vapor_min = vapor_min;
    }
    config.fog.halved |= args.halved;
    let outcomes = pipeline::convert_fog(&accessor, &config, &args.output)?;
    report("fog", &outcomes);
    Ok(())
}

fn run_lambda2(args: Lambda2Args) -> Result<()> {
    let (accessor, mut config) = args.data.open()?;
    if let Some(velocity) = args.velocity {
        config.lambda2.velocity = velocity;
    }
    if let Some(level) = args.level {
        config.lambda2.level = level;
    }
    let outcomes = pipeline::convert_lambda2(&accessor, &config, &args.output)?;
    report("lambda2", &outcomes);
    Ok(())
}

fn run_streamlines(args: StreamlineArgs) -> Result<()> {
    let (accessor, mut config) = args.data.open()?;
    let sl = &mut config.streamline;
    if args.face.is_some() || args.spacing.is_some() {
        let (default_face, default_spacing) = match sl.seeding {
            Seeding::Face { face, spacing } => (face, spacing),
            _ => (SeedFace::YzMin, 4.0),
        };
        sl.seeding = Seeding::Face {
            face: args.face.unwrap_or(default_face),
            spacing: args.spacing.unwrap_or(default_spacing),
        };
    }
    if args.timestep.is_some() {
        sl.timestep = args.timestep;
    }
    if let Some(step) = args.step {
        sl.step = step;
    }
    if let Some(max_steps) = args.max_steps {
        sl.max_steps = max_steps;
    }
    if let Some(radius) = args.radius {
        config.tube.radius = radius;
    }
    if let Some(sides) = args.sides {
        config.tube.sides = sides;
    }
    let cache = PercentileCache::new(args.cache_dir.unwrap_or_else(|| args.output.clone()));
    pipeline::ensure_dir(&args.output)?;
    let outcomes = pipeline::convert_streamlines(&accessor, &config, &args.output, &cache)?;
    report("streamlines", &outcomes);
    Ok(())
}

fn run_percentiles(args: PercentileArgs) -> Result<()> {
    let (accessor, _) = args.data.open()?;
    let table = if args.magnitude {
        let population = magnitude_population(&accessor, &args.channel, args.stride)?;
        PercentileTable::estimate(&population, |_| false)?
    } else {
        let mask = args
            .mask_channel
            .map(|channel| InterfaceMask::new(channel, args.mask_threshold));
        estimate_over_timesteps(&accessor, &args.channel, mask.as_ref())?
    };
    table.save(&args.output)?;
    let (p1, p99) = table.bounds(1.0, 99.0);
    println!(
        "{}: 1st percentile {p1}, 99th percentile {p99}, written to {}",
        args.channel,
        args.output.display()
    );
    Ok(())
}

fn run_place(args: PlaceArgs) -> Result<()> {
    let (accessor, mut config) = args.data.open()?;
    if let Some(scale) = args.scale {
        config.placement.scale = scale;
    }
    if args.cut_half {
        config.placement.cut = Some(CutPlane {
            normal: [1.0, 0.0, 0.0],
            offset: 0.0,
        });
    }
    let outcomes = pipeline::convert_placed_meshes(&accessor, &config, &args.input, &args.output)?;
    report("place", &outcomes);
    Ok(())
}

fn run_body(args: BodyArgs) -> Result<()> {
    let (accessor, _) = args.data.open()?;
    let coordinates = accessor.point_coordinates()?;
    let mesh = body_surface::surface_mesh(
        &coordinates,
        accessor.resolution()?,
        args.axis.into(),
        args.level,
        args.stride,
    )?;
    println!(
        "Exporting {} triangles to {}",
        mesh.triangle_count(),
        args.output.display()
    );
    write_mesh(&args.output, &mesh)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info(args) => info::run_info(args),
        Commands::Isosurface(args) => run_isosurface(args),
        Commands::Colorize(args) => run_colorize(args),
        Commands::Fog(args) => run_fog(args),
        Commands::Lambda2(args) => run_lambda2(args),
        Commands::Streamlines(args) => run_streamlines(args),
        Commands::Percentiles(args) => run_percentiles(args),
        Commands::Place(args) => run_place(args),
        Commands::Body(args) => run_body(args),
    }
}
