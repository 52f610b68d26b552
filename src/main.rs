mod data;
mod errors;
mod etl;
mod graph_import;
mod osm_reader;
mod region;

use std::io;
use std::path::PathBuf;

use clap::Parser;
use log::{error, info};
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::data::road::TransportMode;
use crate::errors::Result;
use crate::etl::split_regions::SplitRegionsEtl;
use crate::etl::Etl;
use crate::region::loader::RegionLoader;
use crate::region::StoreLayout;

/// Splits an OSM extract into a region-sharded routable graph store.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// OSM XML input file (plain or .xz)
    input: PathBuf,

    /// Keep only ways tagged as roads
    #[arg(long)]
    roads_only: bool,

    /// Root directory of the region store
    #[arg(long, default_value = ".")]
    store: PathBuf,

    /// Cell edge length in degrees
    #[arg(long, default_value_t = 0.01)]
    cell_size: f64,

    /// Discard an existing store for this cell size before splitting
    #[arg(long)]
    rebuild: bool,

    /// After splitting, load the region at the coordinates and report the
    /// closest node
    #[arg(long, value_name = "LAT,LON")]
    locate: Option<String>,

    /// Log at debug level
    #[arg(long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn parse_coordinates(text: &str) -> Result<(f64, f64)> {
    let Some((lat, lon)) = text.split_once(',') else {
        return Err(format!("Expected LAT,LON but got: {text}").into());
    };
    Ok((lat.trim().parse()?, lon.trim().parse()?))
}

fn locate_closest_node(args: &Args, coordinates: &str) -> Result<()> {
    let (lat, lon) = parse_coordinates(coordinates)?;
    let loader = RegionLoader::new(&args.store, args.cell_size, TransportMode::Car, false)?;
    let region = loader.region_for(lat, lon);
    let Some(graph) = loader.load_region(region)? else {
        info!(lat = lat, lon = lon, region = region.to_string(); "No region stored at these coordinates");
        return Ok(());
    };
    match graph.closest_node(lat, lon) {
        Some(node_id) => {
            if let Some(node) = graph.node(node_id) {
                info!(
                    lat = lat,
                    lon = lon,
                    region = region.to_string(),
                    node = node_id,
                    node_lat = node.lat,
                    node_lon = node.lon,
                    edges = node.edges.len() as u64;
                    "Closest node located"
                );
            }
        }
        None => {
            info!(lat = lat, lon = lon, region = region.to_string(); "Region contains no nodes")
        }
    }
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let layout = StoreLayout::new(&args.store, args.cell_size);
    let mut etl = SplitRegionsEtl::new(&args.input, layout, args.roads_only);
    if args.rebuild {
        etl.clean(&args.store)?;
    }
    etl.process(&args.store)?;
    etl.clean_backups()?;

    if let Some(coordinates) = &args.locate {
        locate_closest_node(args, coordinates)?;
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbose);

    if let Err(err) = run(&args) {
        error!(err = err.message; "Run failed");
        std::process::exit(1);
    }
}
