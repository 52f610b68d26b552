use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::osm::OsmId;
use crate::errors::{Error, Result};

pub mod loader;

/// Identifier of one latitude/longitude cell for a fixed cell size.
///
/// The two bucket numbers `floor(lat / cell_size)` and
/// `floor(lon / cell_size)` are packed as 32-bit two's-complement values into
/// the high and low half of a `u64`, so negative buckets stay distinct from
/// positive ones and every coordinate pair maps to exactly one id. The
/// decimal value doubles as the shard file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u64);

impl RegionId {
    pub fn for_coordinates(lat: f64, lon: f64, cell_size: f64) -> RegionId {
        let lat_bucket = (lat / cell_size).floor() as i32;
        let lon_bucket = (lon / cell_size).floor() as i32;
        RegionId::from_buckets(lat_bucket, lon_bucket)
    }

    pub fn from_buckets(lat_bucket: i32, lon_bucket: i32) -> RegionId {
        RegionId(((lat_bucket as u32 as u64) << 32) | (lon_bucket as u32 as u64))
    }

    pub fn lat_bucket(&self) -> i32 {
        (self.0 >> 32) as u32 as i32
    }

    pub fn lon_bucket(&self) -> i32 {
        self.0 as u32 as i32
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RegionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<RegionId, Self::Err> {
        Ok(RegionId(s.parse()?))
    }
}

/// Run metadata persisted at the store root. A loader refuses a store whose
/// cell size does not match its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    pub cell_size: f64,
    pub roads_only: bool,
    pub node_count: u64,
    pub way_count: u64,
    pub region_count: u64,
}

impl StoreManifest {
    pub fn read(path: &Path) -> Result<StoreManifest> {
        if !path.exists() {
            return Err(Error::store_missing(format!(
                "Store manifest not found: {}",
                path.display()
            )));
        }
        Ok(serde_json::from_reader(File::open(path)?)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Directory scheme of a region store for one cell size:
/// `<root>/<cell_size>/{nodes,ways}/<region id>` shard files plus the two
/// global index files and the manifest.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
    cell_size: f64,
}

impl StoreLayout {
    pub fn new(root: &Path, cell_size: f64) -> StoreLayout {
        StoreLayout {
            root: root.to_path_buf(),
            cell_size,
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn region_for(&self, lat: f64, lon: f64) -> RegionId {
        RegionId::for_coordinates(lat, lon, self.cell_size)
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join(format!("{}", self.cell_size))
    }

    pub fn nodes_dir(&self) -> PathBuf {
        self.store_dir().join("nodes")
    }

    pub fn ways_dir(&self) -> PathBuf {
        self.store_dir().join("ways")
    }

    pub fn node_shard(&self, region: RegionId) -> PathBuf {
        self.nodes_dir().join(region.to_string())
    }

    pub fn way_shard(&self, region: RegionId) -> PathBuf {
        self.ways_dir().join(region.to_string())
    }

    pub fn node_index_file(&self) -> PathBuf {
        self.store_dir().join("node_index")
    }

    pub fn way_index_file(&self) -> PathBuf {
        self.store_dir().join("way_index")
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.store_dir().join("store.json")
    }
}

/// Reads a `nodeId-regionId` index file. Malformed lines are skipped.
pub fn read_node_index(path: &Path) -> Result<HashMap<OsmId, RegionId>> {
    if !path.exists() {
        return Err(Error::store_missing(format!(
            "Node index not found: {}",
            path.display()
        )));
    }
    let mut index = HashMap::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        let Some((node_id, region)) = line.split_once('-') else {
            continue;
        };
        let (Ok(node_id), Ok(region)) = (node_id.parse::<OsmId>(), region.parse::<RegionId>())
        else {
            continue;
        };
        index.insert(node_id, region);
    }
    Ok(index)
}

/// Reads a `wayId-{regionId,...}` index file. Malformed lines are skipped;
/// an empty region list is preserved.
pub fn read_way_index(path: &Path) -> Result<HashMap<OsmId, Vec<RegionId>>> {
    if !path.exists() {
        return Err(Error::store_missing(format!(
            "Way index not found: {}",
            path.display()
        )));
    }
    let mut index = HashMap::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        let Some((way_id, regions_part)) = line.split_once('-') else {
            continue;
        };
        let Ok(way_id) = way_id.parse::<OsmId>() else {
            continue;
        };
        let regions = regions_part
            .split(',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<RegionId>().ok())
            .collect();
        index.insert(way_id, regions);
    }
    Ok(index)
}
