//! Per-timestep conversion stages: dataset in, frame files out.
//!
//! Every stage writes `frame_<t>.<ext>` into its output directory and skips
//! timesteps whose output already passes [`is_valid_output`], so an
//! interrupted run can simply be started again. Timesteps run in parallel
//! on a pool bounded by [`PipelineConfig::num_threads`].

pub mod layout;


use std::path::Path;

use anyhow::{bail, Context, Result};
use glam::DVec3;

pub use layout::{
    ensure_dir, first_missing_frame, is_valid_output, OutputLayout, Outcome, RunCounter,
};

use crate::codec::{read_mesh, write_mesh, write_voxels};
use crate::colorize::colorize_mesh;
use crate::config::{PipelineConfig, PlacementConfig, Seeding};
use crate::field::{FieldAccessor, GridKind};
use crate::fog::{fog_intensity, halve};
use crate::lambda2::lambda2_field_with_spacing;
use crate::marching_cubes;
use crate::mesh::Mesh;
use crate::parallel_iter;
use crate::percentile::{
    estimate_over_timesteps, magnitude_population, max_over_timesteps, MaxValueCache,
    PercentileCache, PercentileTable,
};
use crate::streamline::{
    generate_starting_points, generate_surface_seeds, trace_all, Bounds, FieldSampler,
    Interpolation,
};
use crate::tube::build_tube_with;

/// File holding the cached global vapour maximum, inside the fog output directory.
pub const VAPOR_MAX_FILE: &str = "vapor_max.txt";

// =========================================================================
// Shared driver
// =========================================================================

/// Run `convert` for each timestep in `timesteps` unless its output is
/// already valid. Results come back in timestep order; the first failure
/// is returned with its timestep attached.
fn run_timesteps<F>(
    stage: &str,
    layout: &OutputLayout,
    timesteps: std::ops::Range<usize>,
    num_threads: usize,
    convert: F,
) -> Result<Vec<Outcome>>
where
    F: Fn(usize, &Path) -> Result<()> + Sync + Send,
{
    ensure_dir(layout.dir())?;
    log::info!(
        "{stage}: timesteps {}..{} into {}",
        timesteps.start,
        timesteps.end,
        layout.dir().display()
    );
    let start = timesteps.start;
    let results = parallel_iter::with_thread_limit(num_threads, || {
        parallel_iter::map_range(timesteps, |t| -> Result<Outcome> {
            let path = layout.path(t);
            if is_valid_output(&path) {
                log::debug!("{stage}: skipping timestep {t}, {} exists", path.display());
                return Ok(Outcome::AlreadyValid);
            }
            convert(t, &path)?;
            log::debug!("{stage}: wrote {}", path.display());
            Ok(Outcome::Written)
        })
    })?;

    let outcomes = results
        .into_iter()
        .enumerate()
        .map(|(n, r)| r.with_context(|| format!("{stage} failed at timestep {}", start + n)))
        .collect::<Result<Vec<_>>>()?;
    let written = outcomes.iter().filter(|&&o| o == Outcome::Written).count();
    log::info!(
        "{stage}: {written} written, {} already present",
        outcomes.len() - written
    );
    Ok(outcomes)
}

// =========================================================================
// Isosurfaces
// =========================================================================

/// Marching-cubes isosurface of the configured channel, in grid-index
/// coordinates, welded and smoothed as configured.
pub fn extract_isosurface(
    accessor: &FieldAccessor,
    config: &PipelineConfig,
    timestep: usize,
) -> Result<Mesh> {
    let iso = &config.isosurface;
    let field = accessor.field_at(timestep, &iso.channel)?;
    let mut mesh = marching_cubes::extract(&field, iso.level);
    if let Some(tolerance) = iso.weld_tolerance {
        mesh.weld(tolerance);
    }
    mesh.smooth(iso.smooth_iterations, iso.smooth_factor);
    Ok(mesh)
}

pub fn convert_isosurfaces(
    accessor: &FieldAccessor,
    config: &PipelineConfig,
    out_dir: &Path,
) -> Result<Vec<Outcome>> {
    let layout = OutputLayout::new(out_dir, "ply");
    run_timesteps(
        "isosurface",
        &layout,
        0..accessor.timestep_count()?,
        config.num_threads,
        |t, path| {
            let mesh = extract_isosurface(accessor, config, t)?;
            if mesh.is_empty() {
                log::warn!("isosurface: timestep {t} has no surface at level {}", config.isosurface.level);
            }
            write_mesh(path, &mesh)
        },
    )
}

/// Colour bounds for the configured colour channel, from a cached
/// dataset-wide percentile table.
pub fn color_bounds(
    accessor: &FieldAccessor,
    config: &PipelineConfig,
    cache: &PercentileCache,
) -> Result<(f64, f64)> {
    let color = &config.color;
    let table = cache.load_or_compute(&color.channel, || {
        estimate_over_timesteps(accessor, &color.channel, color.mask.as_ref())
    })?;
    Ok(table.bounds(color.percentile_low, color.percentile_high))
}

/// Colour the uncoloured isosurfaces in `uncolored_dir` by the colour channel.
pub fn convert_colored_isosurfaces(
    accessor: &FieldAccessor,
    config: &PipelineConfig,
    uncolored_dir: &Path,
    out_dir: &Path,
    cache: &PercentileCache,
) -> Result<Vec<Outcome>> {
    let (lower, upper) = color_bounds(accessor, config, cache)?;
    log::info!(
        "colorize: {} bounds {lower} .. {upper} (percentiles {} .. {})",
        config.color.channel,
        config.color.percentile_low,
        config.color.percentile_high
    );
    let source = OutputLayout::new(uncolored_dir, "ply");
    let layout = OutputLayout::new(out_dir, "ply");
    run_timesteps(
        "colorize",
        &layout,
        0..accessor.timestep_count()?,
        config.num_threads,
        |t, path| {
            let input = source.path(t);
            if !is_valid_output(&input) {
                bail!("uncoloured mesh {} is missing", input.display());
            }
            let mut mesh = read_mesh(&input)?;
            let field = accessor.field_at(t, &config.color.channel)?;
            colorize_mesh(&mut mesh, config.color.ramp, &field, lower, upper)?;
            write_mesh(path, &mesh)
        },
    )
}

// =========================================================================
// Fog
// =========================================================================

pub fn convert_fog(
    accessor: &FieldAccessor,
    config: &PipelineConfig,
    out_dir: &Path,
) -> Result<Vec<Outcome>> {
    let fog = &config.fog;
    ensure_dir(out_dir)?;
    let vapor_max = MaxValueCache::new(out_dir.join(VAPOR_MAX_FILE))
        .load_or_compute(|| max_over_timesteps(accessor, &fog.channel))?;
    log::info!("fog: {} range {} .. {vapor_max}", fog.channel, fog.vapor_min);

    let layout = OutputLayout::new(out_dir, "bvox");
    run_timesteps(
        "fog",
        &layout,
        0..accessor.timestep_count()?,
        config.num_threads,
        |t, path| {
            let field = accessor.field_at(t, &fog.channel)?;
            let mut density = fog_intensity(&field, fog.vapor_min, vapor_max)?;
            if fog.halved {
                halve(&mut density);
            }
            write_voxels(path, &density)
        },
    )
}

// =========================================================================
// Vortex cores
// =========================================================================

pub fn convert_lambda2(
    accessor: &FieldAccessor,
    config: &PipelineConfig,
    out_dir: &Path,
) -> Result<Vec<Outcome>> {
    let l2 = &config.lambda2;
    let spacing = accessor.info()?.spacing();
    let layout = OutputLayout::new(out_dir, "ply");
    run_timesteps(
        "lambda2",
        &layout,
        0..accessor.timestep_count()?,
        config.num_threads,
        |t, path| {
            let velocity = accessor.vector_at(t, &l2.velocity)?;
            let criterion = lambda2_field_with_spacing(&velocity, spacing);
            write_mesh(path, &marching_cubes::extract(&criterion, l2.level))
        },
    )
}

// =========================================================================
// Streamlines
// =========================================================================

/// Seeds in the units the configured interpolation traces in.
pub fn streamline_seeds(accessor: &FieldAccessor, config: &PipelineConfig) -> Result<Vec<DVec3>> {
    let info = accessor.info()?;
    let spacing = DVec3::from_array(info.spacing());
    let trilinear = config.streamline.interpolation == Interpolation::Trilinear;
    if trilinear && info.grid == GridKind::Curvilinear {
        bail!("trilinear streamlines need a cartesian grid; use nearest interpolation");
    }
    Ok(match config.streamline.seeding {
        Seeding::Face { face, spacing: gap } => {
            let seeds = generate_starting_points(gap, info.resolution, face);
            if trilinear {
                seeds
            } else {
                seeds.into_iter().map(|s| s * spacing).collect()
            }
        }
        Seeding::Surface { count, seed, layers } => {
            let population = accessor.near_surface_points(layers)?;
            let seeds = generate_surface_seeds(&population, count, seed);
            if trilinear {
                seeds.into_iter().map(|s| s / spacing).collect()
            } else {
                seeds
            }
        }
    })
}

/// Integration domain matching the configured interpolation.
fn streamline_bounds(
    accessor: &FieldAccessor,
    interpolation: Interpolation,
    coordinates: &[[f64; 3]],
) -> Result<Bounds> {
    Ok(match interpolation {
        Interpolation::Trilinear => Bounds::of_grid(accessor.resolution()?),
        Interpolation::Nearest => {
            let (min, max) = coordinates.iter().fold(
                (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
                |(lo, hi), &p| {
                    let p = DVec3::from_array(p);
                    (lo.min(p), hi.max(p))
                },
            );
            Bounds::closed(min, max)
        }
    })
}

/// Trace and tube every seed of one timestep into a single coloured mesh.
pub fn streamline_mesh(
    accessor: &FieldAccessor,
    config: &PipelineConfig,
    timestep: usize,
    seeds: &[DVec3],
    magnitude_bounds: (f64, f64),
) -> Result<Mesh> {
    let sl = &config.streamline;
    let velocity = accessor.vector_at(timestep, &sl.velocity)?;
    let coordinates = match sl.interpolation {
        Interpolation::Nearest => accessor.point_coordinates()?,
        Interpolation::Trilinear => Vec::new(),
    };
    let sampler = FieldSampler::new(sl.interpolation, &velocity, &coordinates);
    let bounds = streamline_bounds(accessor, sl.interpolation, &coordinates)?;

    let traces = trace_all(&sampler, seeds, sl.step, sl.max_steps, &bounds);
    let mut merged = Mesh::default();
    for trace in &traces {
        log::trace!("streamline of {} points ended: {:?}", trace.polyline.len(), trace.stop);
        merged.append(&build_tube_with(&trace.polyline, &config.tube, magnitude_bounds)?);
    }
    Ok(merged)
}

/// Tube meshes of streamlines, one merged mesh per timestep.
pub fn convert_streamlines(
    accessor: &FieldAccessor,
    config: &PipelineConfig,
    out_dir: &Path,
    cache: &PercentileCache,
) -> Result<Vec<Outcome>> {
    let sl = &config.streamline;
    let key = format!("{}_magnitude", sl.velocity);
    let table = cache.load_or_compute(&key, || {
        let population = magnitude_population(accessor, &sl.velocity, sl.magnitude_stride)?;
        Ok(PercentileTable::estimate(&population, |_| false)?)
    })?;
    let magnitude_bounds = table.bounds(sl.percentile_low, sl.percentile_high);
    let seeds = streamline_seeds(accessor, config)?;
    log::info!(
        "streamlines: {} seeds, magnitude bounds {} .. {}",
        seeds.len(),
        magnitude_bounds.0,
        magnitude_bounds.1
    );

    let count = accessor.timestep_count()?;
    let timesteps = match sl.timestep {
        Some(t) if t >= count => bail!("timestep {t} out of range (dataset has {count})"),
        Some(t) => t..t + 1,
        None => 0..count,
    };
    let layout = OutputLayout::new(out_dir, "ply");
    run_timesteps("streamlines", &layout, timesteps, config.num_threads, |t, path| {
        let mesh = streamline_mesh(accessor, config, t, &seeds, magnitude_bounds)?;
        write_mesh(path, &mesh)
    })
}

// =========================================================================
// Render placement
// =========================================================================

/// Centre a grid-index mesh in render space and apply the optional cut.
pub fn place_mesh(mesh: &mut Mesh, resolution: [usize; 3], placement: &PlacementConfig) {
    mesh.center_in_domain(resolution, placement.scale);
    if let Some(cut) = placement.cut {
        mesh.cut_half(cut.normal, cut.offset);
    }
}

/// Copy every frame of `in_dir` to `out_dir`, placed for rendering.
pub fn convert_placed_meshes(
    accessor: &FieldAccessor,
    config: &PipelineConfig,
    in_dir: &Path,
    out_dir: &Path,
) -> Result<Vec<Outcome>> {
    let resolution = accessor.resolution()?;
    let source = OutputLayout::new(in_dir, "ply");
    let frames = source.first_missing();
    if frames == 0 {
        log::warn!("place: no frames found in {}", in_dir.display());
    }
    let layout = OutputLayout::new(out_dir, "ply");
    run_timesteps("place", &layout, 0..frames, config.num_threads, |t, path| {
        let mut mesh = read_mesh(&source.path(t))?;
        place_mesh(&mut mesh, resolution, &config.placement);
        write_mesh(path, &mesh)
    })
}
