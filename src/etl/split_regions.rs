use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::data::osm::{Node, OsmId, Way};
use crate::errors::{Error, Result};
use crate::etl::Etl;
use crate::osm_reader::{OsmElement, OsmReader};
use crate::region::{read_node_index, RegionId, StoreLayout, StoreManifest};

const ETL_NAME: &str = "split_regions";
const PROGRESS_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_POOL_CAPACITY: usize = 512;

/// Capacity-bounded cache of open shard appenders keyed by region. The least
/// recently used writer is flushed and closed on overflow; a shard touched
/// again later is reopened in append mode.
struct WriterPool {
    dir: PathBuf,
    capacity: usize,
    writers: HashMap<RegionId, BufWriter<File>>,
    recency: Vec<RegionId>,
    opened: HashSet<RegionId>,
}

impl WriterPool {
    fn new(dir: PathBuf, capacity: usize) -> WriterPool {
        WriterPool {
            dir,
            capacity: capacity.max(1),
            writers: HashMap::new(),
            recency: Vec::new(),
            opened: HashSet::new(),
        }
    }

    fn write_line(&mut self, region: RegionId, line: &str) -> Result<()> {
        if let Some(writer) = self.writers.get_mut(&region) {
            writeln!(writer, "{line}")?;
            self.touch(region);
            return Ok(());
        }

        if self.writers.len() >= self.capacity {
            self.evict_oldest()?;
        }
        let path = self.dir.join(region.to_string());
        let file = if self.opened.insert(region) {
            File::create(&path)?
        } else {
            OpenOptions::new().append(true).open(&path)?
        };
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{line}")?;
        self.writers.insert(region, writer);
        self.recency.push(region);
        Ok(())
    }

    fn touch(&mut self, region: RegionId) {
        if let Some(pos) = self.recency.iter().position(|r| *r == region) {
            self.recency.remove(pos);
            self.recency.push(region);
        }
    }

    fn evict_oldest(&mut self) -> Result<()> {
        if self.recency.is_empty() {
            return Ok(());
        }
        let oldest = self.recency.remove(0);
        if let Some(mut writer) = self.writers.remove(&oldest) {
            writer.flush()?;
        }
        Ok(())
    }

    /// Number of distinct regions this pool has written to.
    fn region_count(&self) -> u64 {
        self.opened.len() as u64
    }

    fn finish(&mut self) -> Result<()> {
        for (_, mut writer) in self.writers.drain() {
            writer.flush()?;
        }
        self.recency.clear();
        Ok(())
    }
}

#[derive(Debug)]
pub struct SplitSummary {
    pub node_count: u64,
    pub way_count: u64,
    pub region_count: u64,
}

/// Splits the source file into per-region node and way shards plus the two
/// global id-to-region index files, then drops nodes no kept way references.
pub struct SplitRegionsEtl {
    input: PathBuf,
    layout: StoreLayout,
    roads_only: bool,
    pool_capacity: usize,
}

impl SplitRegionsEtl {
    pub fn new(input: &Path, layout: StoreLayout, roads_only: bool) -> SplitRegionsEtl {
        SplitRegionsEtl {
            input: input.to_path_buf(),
            layout,
            roads_only,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }

    #[cfg(test)]
    fn with_pool_capacity(mut self, capacity: usize) -> SplitRegionsEtl {
        self.pool_capacity = capacity;
        self
    }

    /// Phase 1: every node goes to exactly one region shard, and its region
    /// assignment to the node index.
    fn split_nodes(&self) -> Result<u64> {
        info!(input = self.input.display().to_string(); "Splitting nodes");
        fs::create_dir_all(self.layout.nodes_dir())?;
        let mut pool = WriterPool::new(self.layout.nodes_dir(), self.pool_capacity);
        let mut index = BufWriter::new(File::create(self.layout.node_index_file())?);

        let mut reader = OsmReader::from_path(&self.input)?;
        let mut node_count: u64 = 0;
        let mut last_log = Instant::now();
        while let Some(element) = reader.next_element()? {
            let OsmElement::Node(node) = element else {
                continue;
            };
            let region = self.layout.region_for(node.lat, node.lon);
            pool.write_line(region, &node.to_record())?;
            writeln!(index, "{}-{}", node.id, region)?;
            node_count += 1;
            if last_log.elapsed() > PROGRESS_INTERVAL {
                debug!(nodes = node_count, regions = pool.region_count(); "Splitting nodes");
                last_log = Instant::now();
            }
        }
        pool.finish()?;
        index.flush()?;
        debug!(nodes = node_count, regions = pool.region_count(); "Node phase finished");
        Ok(node_count)
    }

    /// Phase 2: each way record is replicated into every region one of its
    /// nodes resolved to; the distinct region list goes to the way index.
    fn split_ways(&self) -> Result<(u64, u64)> {
        info!(input = self.input.display().to_string(); "Splitting ways");
        let node_index = read_node_index(&self.layout.node_index_file())?;
        fs::create_dir_all(self.layout.ways_dir())?;
        let mut pool = WriterPool::new(self.layout.ways_dir(), self.pool_capacity);
        let mut index = BufWriter::new(File::create(self.layout.way_index_file())?);

        let mut reader = OsmReader::from_path(&self.input)?;
        let mut way_count: u64 = 0;
        let mut last_log = Instant::now();
        while let Some(element) = reader.next_element()? {
            let OsmElement::Way(way) = element else {
                continue;
            };
            if self.roads_only && !way.has_tag("highway") {
                continue;
            }

            let mut regions: Vec<RegionId> = Vec::new();
            for node_id in &way.node_ids {
                match node_index.get(node_id) {
                    Some(region) => {
                        if !regions.contains(region) {
                            regions.push(*region);
                        }
                    }
                    None => {
                        debug!(way = way.id, node = *node_id; "Dropping reference to unknown node")
                    }
                }
            }

            let record = way.to_record();
            for region in &regions {
                pool.write_line(*region, &record)?;
            }
            let region_list = regions
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(",");
            writeln!(index, "{}-{}", way.id, region_list)?;
            way_count += 1;
            if last_log.elapsed() > PROGRESS_INTERVAL {
                debug!(ways = way_count, regions = pool.region_count(); "Splitting ways");
                last_log = Instant::now();
            }
        }
        pool.finish()?;
        index.flush()?;
        debug!(ways = way_count, regions = pool.region_count(); "Way phase finished");
        Ok((way_count, pool.region_count()))
    }

    /// Phase 3: rewrite every node shard down to the nodes referenced by the
    /// kept ways of that region, and rebuild the node index to the
    /// survivors. Rewrites go through `.bak`/`.new` files so an interrupted
    /// run never corrupts the previous state.
    fn clean_unused_nodes(&self) -> Result<()> {
        info!("Removing unreferenced nodes from regions");
        let referenced = self.referenced_node_ids()?;

        let mut survivors: HashSet<OsmId> = HashSet::new();
        for region in self.shard_regions(&self.layout.nodes_dir())? {
            let shard = self.layout.node_shard(region);
            let keep = referenced.get(&region);
            fs::copy(&shard, shard.with_extension("bak"))?;

            let mut kept: u64 = 0;
            let new_path = shard.with_extension("new");
            {
                let mut out = BufWriter::new(File::create(&new_path)?);
                for line in BufReader::new(File::open(&shard)?).lines() {
                    let line = line?;
                    let Some(node) = Node::from_record(&line) else {
                        continue;
                    };
                    if keep.is_some_and(|ids| ids.contains(&node.id)) {
                        writeln!(out, "{line}")?;
                        survivors.insert(node.id);
                        kept += 1;
                    }
                }
                out.flush()?;
            }
            if kept == 0 {
                fs::remove_file(&new_path)?;
                fs::remove_file(&shard)?;
                debug!(region = region.to_string(); "Region kept no nodes, shard removed");
            } else {
                fs::rename(&new_path, &shard)?;
            }
        }

        self.rewrite_node_index(&survivors)?;
        Ok(())
    }

    /// Node ids referenced by the ways stored in each region's way shard.
    fn referenced_node_ids(&self) -> Result<HashMap<RegionId, HashSet<OsmId>>> {
        let mut referenced: HashMap<RegionId, HashSet<OsmId>> = HashMap::new();
        for region in self.shard_regions(&self.layout.ways_dir())? {
            let ids = referenced.entry(region).or_default();
            for line in BufReader::new(File::open(self.layout.way_shard(region))?).lines() {
                let line = line?;
                let Some(way) = Way::from_record(&line) else {
                    continue;
                };
                ids.extend(way.node_ids);
            }
        }
        Ok(referenced)
    }

    fn rewrite_node_index(&self, survivors: &HashSet<OsmId>) -> Result<()> {
        let index_path = self.layout.node_index_file();
        fs::copy(&index_path, index_path.with_extension("bak"))?;
        let new_path = index_path.with_extension("new");
        {
            let mut out = BufWriter::new(File::create(&new_path)?);
            for line in BufReader::new(File::open(&index_path)?).lines() {
                let line = line?;
                let keep = line
                    .split_once('-')
                    .and_then(|(id, _)| id.parse::<OsmId>().ok())
                    .is_some_and(|id| survivors.contains(&id));
                if keep {
                    writeln!(out, "{line}")?;
                }
            }
            out.flush()?;
        }
        fs::rename(&new_path, &index_path)?;
        Ok(())
    }

    /// Region shard files in a directory, identified by their numeric names;
    /// backup and temp files are ignored.
    fn shard_regions(&self, dir: &Path) -> Result<Vec<RegionId>> {
        let mut regions = Vec::new();
        if !dir.exists() {
            return Ok(regions);
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Ok(region) = entry.file_name().to_string_lossy().parse::<RegionId>() {
                regions.push(region);
            }
        }
        regions.sort();
        Ok(regions)
    }

    /// Deletes the `.bak` safety copies once a whole run has succeeded.
    pub fn clean_backups(&self) -> Result<()> {
        info!("Deleting backup files");
        for dir in [self.layout.nodes_dir(), self.layout.ways_dir()] {
            if !dir.exists() {
                continue;
            }
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension() == Some("bak".as_ref()) {
                    debug!(file = path.display().to_string(); "Deleting");
                    fs::remove_file(path)?;
                }
            }
        }
        let index_backup = self.layout.node_index_file().with_extension("bak");
        if index_backup.exists() {
            fs::remove_file(index_backup)?;
        }
        Ok(())
    }
}

impl Etl for SplitRegionsEtl {
    type Input = ();
    type Output = SplitSummary;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, _dir: &Path) -> Result<bool> {
        Ok(self.layout.manifest_file().exists())
    }

    fn clean(&self, _dir: &Path) -> Result<()> {
        let store_dir = self.layout.store_dir();
        if store_dir.exists() {
            fs::remove_dir_all(store_dir)?;
        }
        Ok(())
    }

    fn extract(&mut self, _dir: &Path) -> Result<()> {
        if !self.input.exists() {
            return Err(Error::from(format!(
                "Input file not found: {}",
                self.input.display()
            )));
        }
        fs::create_dir_all(self.layout.store_dir())?;
        Ok(())
    }

    fn transform(&mut self, _input: ()) -> Result<SplitSummary> {
        let node_count = self.split_nodes()?;
        let (way_count, region_count) = self.split_ways()?;
        if let Err(err) = self.clean_unused_nodes() {
            warn!(err = err.message; "Node cleanup failed, previous shards are kept as .bak files");
            return Err(err);
        }
        Ok(SplitSummary {
            node_count,
            way_count,
            region_count,
        })
    }

    fn load(&mut self, _dir: &Path, output: SplitSummary) -> Result<()> {
        let manifest = StoreManifest {
            cell_size: self.layout.cell_size(),
            roads_only: self.roads_only,
            node_count: output.node_count,
            way_count: output.way_count,
            region_count: output.region_count,
        };
        manifest.write(&self.layout.manifest_file())?;
        info!(
            nodes = output.node_count,
            ways = output.way_count,
            regions = output.region_count;
            "Region store written"
        );
        Ok(())
    }
}
