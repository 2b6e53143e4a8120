//! `info` subcommand: print what a dataset holds.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use fluidviz::field::{DatasetInfo, GridKind};
use fluidviz::FieldAccessor;

#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Dataset directory (contains dataset.json)
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// Output as JSON for machine parsing
    #[arg(long)]
    pub json: bool,
}

fn print_info_human(info: &DatasetInfo) {
    let [nx, ny, nz] = info.resolution;
    println!("=== Dataset ===");
    println!("Resolution:  {nx} x {ny} x {nz} ({} nodes)", info.node_count());
    println!("Timesteps:   {} (dt = {})", info.timestep_count, info.dt);
    println!(
        "Extents:     {} x {} x {}",
        info.extents[0], info.extents[1], info.extents[2]
    );
    println!(
        "Grid:        {}",
        match info.grid {
            GridKind::Cartesian => "cartesian",
            GridKind::Curvilinear => "curvilinear",
        }
    );
    println!("Axis order:  {:?}", info.axis_order);
    println!("Scalars:     {}", info.scalars.join(", "));
    for (group, [x, y, z]) in &info.vectors {
        println!("Vector:      {group} = ({x}, {y}, {z})");
    }
    for (name, value) in &info.attributes {
        println!("Attribute:   {name} = {value}");
    }
}

pub fn run_info(args: InfoArgs) -> Result<()> {
    let accessor = FieldAccessor::open(&args.dataset)
        .with_context(|| format!("Failed to open dataset {}", args.dataset.display()))?;
    let info = accessor.info()?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(info).context("Failed to serialize to JSON")?
        );
    } else {
        print_info_human(info);
    }
    Ok(())
}
