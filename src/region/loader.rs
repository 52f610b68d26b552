use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;

use crate::data::graph::Graph;
use crate::data::osm::{Node, OsmId, Way};
use crate::data::road::TransportMode;
use crate::errors::{Error, Result};
use crate::graph_import::GraphBuilder;
use crate::region::{read_node_index, read_way_index, RegionId, StoreLayout, StoreManifest};

/// Reads region shards back into routable graphs. Both id-to-region indexes
/// are loaded up front; a store without them is unusable and refused here.
/// Graphs are rebuilt from records on every load and never written back.
#[derive(Debug)]
pub struct RegionLoader {
    layout: StoreLayout,
    mode: TransportMode,
    collapse_junctions: bool,
    node_index: HashMap<OsmId, RegionId>,
    way_index: HashMap<OsmId, Vec<RegionId>>,
}

impl RegionLoader {
    pub fn new(
        root: &Path,
        cell_size: f64,
        mode: TransportMode,
        collapse_junctions: bool,
    ) -> Result<RegionLoader> {
        let layout = StoreLayout::new(root, cell_size);
        let manifest = StoreManifest::read(&layout.manifest_file())?;
        if manifest.cell_size != cell_size {
            return Err(Error::from(format!(
                "Store was built with cell size {}, requested {}",
                manifest.cell_size, cell_size
            )));
        }
        let node_index = read_node_index(&layout.node_index_file())?;
        let way_index = read_way_index(&layout.way_index_file())?;
        info!(
            nodes = node_index.len() as u64,
            ways = way_index.len() as u64,
            store = layout.store_dir().display().to_string();
            "Region store opened"
        );
        Ok(RegionLoader {
            layout,
            mode,
            collapse_junctions,
            node_index,
            way_index,
        })
    }

    pub fn region_for(&self, lat: f64, lon: f64) -> RegionId {
        self.layout.region_for(lat, lon)
    }

    /// Single node lookup straight from its region shard.
    pub fn get_node(&self, node_id: OsmId) -> Result<Option<Node>> {
        let Some(region) = self.node_index.get(&node_id) else {
            return Ok(None);
        };
        for line in read_shard_lines(&self.layout.node_shard(*region))? {
            let line = line?;
            if let Some(node) = Node::from_record(&line) {
                if node.id == node_id {
                    return Ok(Some(node));
                }
            }
        }
        Ok(None)
    }

    /// Single way lookup from the first region it touches.
    pub fn get_way(&self, way_id: OsmId) -> Result<Option<Way>> {
        let Some(region) = self.way_index.get(&way_id).and_then(|r| r.first()) else {
            return Ok(None);
        };
        for line in read_shard_lines(&self.layout.way_shard(*region))? {
            let line = line?;
            if let Some(way) = Way::from_record(&line) {
                if way.id == way_id {
                    return Ok(Some(way));
                }
            }
        }
        Ok(None)
    }

    /// Graph of a single cell. Adjacency toward nodes in neighboring cells
    /// stays unresolved until those cells are loaded together.
    pub fn load_region(&self, region: RegionId) -> Result<Option<Graph>> {
        self.load_regions(&[region])
    }

    /// Graph of all cells a way touches, so its cross-boundary adjacency is
    /// fully resolved.
    pub fn load_regions_for_way(&self, way_id: OsmId) -> Result<Option<Graph>> {
        match self.way_index.get(&way_id) {
            Some(regions) => self.load_regions(regions),
            None => Ok(None),
        }
    }

    pub fn load_region_for_node(&self, node_id: OsmId) -> Result<Option<Graph>> {
        match self.node_index.get(&node_id) {
            Some(region) => self.load_region(*region),
            None => Ok(None),
        }
    }

    /// The concatenate operation: node maps of all requested cells are
    /// unioned first, replicated way records are deduplicated by id, then
    /// edges are rebuilt against the combined node set. Consecutive node
    /// pairs split across the requested cells connect exactly here.
    pub fn load_regions(&self, regions: &[RegionId]) -> Result<Option<Graph>> {
        let mut graph = Graph::new();
        let mut ways: HashMap<OsmId, Way> = HashMap::new();
        let mut seen: HashSet<RegionId> = HashSet::new();
        let mut found = false;

        for &region in regions {
            if !seen.insert(region) {
                continue;
            }
            let node_shard = self.layout.node_shard(region);
            if node_shard.exists() {
                found = true;
                for line in read_shard_lines(&node_shard)? {
                    let line = line?;
                    if let Some(node) = Node::from_record(&line) {
                        graph.add_node(node.id, node.lat, node.lon);
                    }
                }
            }
            let way_shard = self.layout.way_shard(region);
            if way_shard.exists() {
                found = true;
                for line in read_shard_lines(&way_shard)? {
                    let line = line?;
                    if let Some(way) = Way::from_record(&line) {
                        ways.insert(way.id, way);
                    }
                }
            }
        }
        if !found {
            return Ok(None);
        }

        let mut occurrences: HashMap<OsmId, u32> = HashMap::new();
        for way in ways.values() {
            if !way.road.is_road() {
                continue;
            }
            for node_id in &way.node_ids {
                *occurrences.entry(*node_id).or_insert(0) += 1;
            }
        }

        let builder = GraphBuilder::new(&occurrences, self.mode, self.collapse_junctions);
        let mut way_list: Vec<&Way> = ways.values().collect();
        way_list.sort_by_key(|way| way.id);
        for way in way_list {
            builder.add_way(&mut graph, way);
        }
        Ok(Some(graph))
    }
}

fn read_shard_lines(path: &Path) -> Result<std::io::Lines<BufReader<File>>> {
    if !path.exists() {
        return Err(Error::from(format!("Shard file missing: {}", path.display())));
    }
    Ok(BufReader::new(File::open(path)?).lines())
}
