use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use log::{debug, info};

use crate::data::graph::{distance_between, Edge, Graph};
use crate::data::osm::{OsmId, Way};
use crate::data::road::{Direction, TransportMode};
use crate::errors::Result;
use crate::osm_reader::{OsmElement, OsmReader};

/// First pass: how often each node id is referenced by road ways. A count of
/// two or more marks a junction.
pub fn count_occurrences<R: BufRead>(reader: &mut OsmReader<R>) -> Result<HashMap<OsmId, u32>> {
    let mut occurrences = HashMap::new();
    while let Some(element) = reader.next_element()? {
        let OsmElement::Way(way) = element else {
            continue;
        };
        if !way.road.is_road() {
            continue;
        }
        for node_id in &way.node_ids {
            *occurrences.entry(*node_id).or_insert(0u32) += 1;
        }
    }
    Ok(occurrences)
}

/// Turns a way's ordered node list into weighted edges. With
/// `collapse_junctions`, chains of nodes referenced by only one road way are
/// folded into a single edge carrying the accumulated distance, and the
/// folded nodes are removed from the graph.
pub struct GraphBuilder<'a> {
    occurrences: &'a HashMap<OsmId, u32>,
    mode: TransportMode,
    collapse_junctions: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        occurrences: &'a HashMap<OsmId, u32>,
        mode: TransportMode,
        collapse_junctions: bool,
    ) -> GraphBuilder<'a> {
        GraphBuilder {
            occurrences,
            mode,
            collapse_junctions,
        }
    }

    pub fn add_way(&self, graph: &mut Graph, way: &Way) {
        if !way.road.is_road() {
            return;
        }
        let speed = way.road.effective_speed(self.mode);
        if self.collapse_junctions {
            self.add_collapsed(graph, way, speed);
        } else {
            self.add_pairwise(graph, way, speed);
        }
    }

    fn add_pairwise(&self, graph: &mut Graph, way: &Way, speed: u32) {
        for pair in way.node_ids.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let (Some(n1), Some(n2)) = (graph.node(from), graph.node(to)) else {
                continue;
            };
            let distance = distance_between(n1.lat, n1.lon, n2.lat, n2.lon);
            self.emit_edge(graph, way, from, to, distance, speed);
        }
    }

    // Walks the node list, accumulating distance over nodes that are neither
    // junctions nor the way's last node. A node id missing from the graph
    // (a neighboring cell not loaded) abandons the current chain; the next
    // present node starts a new one.
    fn add_collapsed(&self, graph: &mut Graph, way: &Way, speed: u32) {
        let Some(last_index) = way.node_ids.len().checked_sub(1) else {
            return;
        };
        let mut junction: Option<OsmId> = None;
        let mut prev: Option<(f64, f64)> = None;
        let mut distance = 0.0;
        let mut skipped: Vec<OsmId> = Vec::new();

        for (i, &node_id) in way.node_ids.iter().enumerate() {
            let Some(node) = graph.node(node_id) else {
                junction = None;
                prev = None;
                distance = 0.0;
                skipped.clear();
                continue;
            };
            let (lat, lon) = (node.lat, node.lon);
            if let Some((prev_lat, prev_lon)) = prev {
                distance += distance_between(prev_lat, prev_lon, lat, lon);
            }

            match junction {
                None => {
                    junction = Some(node_id);
                    distance = 0.0;
                }
                Some(from) => {
                    let is_junction =
                        self.occurrences.get(&node_id).copied().unwrap_or(0) >= 2;
                    if is_junction || i == last_index {
                        self.emit_edge(graph, way, from, node_id, distance, speed);
                        for id in skipped.drain(..) {
                            graph.remove_node(id);
                        }
                        junction = Some(node_id);
                        distance = 0.0;
                    } else {
                        skipped.push(node_id);
                    }
                }
            }
            prev = Some((lat, lon));
        }
    }

    // Effective speed 0 means the way is unusable in this mode; no edge is
    // emitted rather than one with an infinite time.
    fn emit_edge(
        &self,
        graph: &mut Graph,
        way: &Way,
        from: OsmId,
        to: OsmId,
        distance: f64,
        speed: u32,
    ) {
        if speed == 0 {
            return;
        }
        let time = distance / speed as f64;
        match way.road.direction {
            Direction::Both => {
                graph.add_edge(
                    from,
                    Edge {
                        target: to,
                        distance,
                        time,
                        way: way.id,
                    },
                );
                graph.add_edge(
                    to,
                    Edge {
                        target: from,
                        distance,
                        time,
                        way: way.id,
                    },
                );
            }
            Direction::Forward => graph.add_edge(
                from,
                Edge {
                    target: to,
                    distance,
                    time,
                    way: way.id,
                },
            ),
            Direction::Backward => graph.add_edge(
                to,
                Edge {
                    target: from,
                    distance,
                    time,
                    way: way.id,
                },
            ),
        }
    }
}

/// Single-pass in-memory import: occurrence count, restart, then nodes and
/// ways into a routable graph.
pub fn import_graph(path: &Path, collapse_junctions: bool, mode: TransportMode) -> Result<Graph> {
    info!(file = path.display().to_string(); "Counting node occurrences");
    let mut reader = OsmReader::from_path(path)?;
    let occurrences = count_occurrences(&mut reader)?;
    debug!(way_nodes = occurrences.len() as u64; "Occurrence pass finished");

    info!(file = path.display().to_string(); "Importing graph");
    let mut reader = OsmReader::from_path(path)?;
    let builder = GraphBuilder::new(&occurrences, mode, collapse_junctions);
    let mut graph = Graph::new();
    while let Some(element) = reader.next_element()? {
        match element {
            OsmElement::Node(node) => {
                if occurrences.contains_key(&node.id) {
                    graph.add_node(node.id, node.lat, node.lon);
                }
            }
            OsmElement::Way(way) => builder.add_way(&mut graph, &way),
        }
    }
    debug!(nodes = graph.node_count() as u64; "Graph import finished");
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(xml: &str, collapse_junctions: bool, mode: TransportMode) -> Graph {
        let mut reader = OsmReader::from_reader(xml.as_bytes());
        let occurrences = count_occurrences(&mut reader).unwrap();

        let mut reader = OsmReader::from_reader(xml.as_bytes());
        let builder = GraphBuilder::new(&occurrences, mode, collapse_junctions);
        let mut graph = Graph::new();
        while let Some(element) = reader.next_element().unwrap() {
            match element {
                OsmElement::Node(node) => {
                    if occurrences.contains_key(&node.id) {
                        graph.add_node(node.id, node.lat, node.lon);
                    }
                }
                OsmElement::Way(way) => builder.add_way(&mut graph, &way),
            }
        }
        graph
    }

    const CHAIN: &str = r#"<osm>
        <node id="1" lat="48.000" lon="9.000"/>
        <node id="2" lat="48.000" lon="9.001"/>
        <node id="3" lat="48.000" lon="9.002"/>
        <way id="10">
          <nd ref="1"/><nd ref="2"/><nd ref="3"/>
          <tag k="highway" v="residential"/>
        </way>
    </osm>"#;

    #[test]
    fn occurrences_only_count_road_ways() {
        let xml = r#"<osm>
            <way id="1">
              <nd ref="7"/><nd ref="8"/>
              <tag k="highway" v="residential"/>
            </way>
            <way id="2">
              <nd ref="8"/><nd ref="9"/>
              <tag k="waterway" v="river"/>
            </way>
        </osm>"#;
        let mut reader = OsmReader::from_reader(xml.as_bytes());
        let occurrences = count_occurrences(&mut reader).unwrap();
        assert_eq!(occurrences.get(&7), Some(&1));
        assert_eq!(occurrences.get(&8), Some(&1));
        assert_eq!(occurrences.get(&9), None);
    }

    #[test]
    fn chain_collapses_to_single_edge() {
        let graph = build(CHAIN, true, TransportMode::Car);
        assert_eq!(graph.node_count(), 2);
        assert!(!graph.contains(2));

        let edges = &graph.node(1).unwrap().edges;
        assert_eq!(edges.len(), 1);
        let edge = &edges[0];
        assert_eq!(edge.target, 3);
        let expected = distance_between(48.0, 9.0, 48.0, 9.001)
            + distance_between(48.0, 9.001, 48.0, 9.002);
        assert!((edge.distance - expected).abs() < 1e-6);
        assert!((edge.time - expected / 10.0).abs() < 1e-9);

        let back = &graph.node(3).unwrap().edges;
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].target, 1);
    }

    #[test]
    fn without_collapsing_every_pair_gets_an_edge() {
        let graph = build(CHAIN, false, TransportMode::Car);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.node(2).unwrap().edges.len(), 2);
    }

    #[test]
    fn shared_node_is_kept_as_junction() {
        let xml = r#"<osm>
            <node id="1" lat="48.000" lon="9.000"/>
            <node id="2" lat="48.000" lon="9.001"/>
            <node id="3" lat="48.000" lon="9.002"/>
            <node id="4" lat="48.001" lon="9.001"/>
            <way id="10">
              <nd ref="1"/><nd ref="2"/><nd ref="3"/>
              <tag k="highway" v="residential"/>
            </way>
            <way id="11">
              <nd ref="2"/><nd ref="4"/>
              <tag k="highway" v="residential"/>
            </way>
        </osm>"#;
        let graph = build(xml, true, TransportMode::Car);
        assert!(graph.contains(2));
        let targets: Vec<OsmId> = graph
            .node(2)
            .unwrap()
            .edges
            .iter()
            .map(|e| e.target)
            .collect();
        assert!(targets.contains(&1));
        assert!(targets.contains(&3));
        assert!(targets.contains(&4));
        // No skip-through edge between the endpoints.
        assert!(graph.node(1).unwrap().edges.iter().all(|e| e.target == 2));
    }

    #[test]
    fn oneway_emits_forward_edges_only() {
        let xml = r#"<osm>
            <node id="1" lat="48.000" lon="9.000"/>
            <node id="2" lat="48.000" lon="9.001"/>
            <way id="10">
              <nd ref="1"/><nd ref="2"/>
              <tag k="highway" v="primary"/>
              <tag k="oneway" v="yes"/>
            </way>
        </osm>"#;
        let graph = build(xml, false, TransportMode::Car);
        assert_eq!(graph.node(1).unwrap().edges.len(), 1);
        assert!(graph.node(2).unwrap().edges.is_empty());
    }

    #[test]
    fn reversed_oneway_emits_backward_edges_only() {
        let xml = r#"<osm>
            <node id="1" lat="48.000" lon="9.000"/>
            <node id="2" lat="48.000" lon="9.001"/>
            <way id="10">
              <nd ref="1"/><nd ref="2"/>
              <tag k="highway" v="primary"/>
              <tag k="oneway" v="-1"/>
            </way>
        </osm>"#;
        let graph = build(xml, false, TransportMode::Car);
        assert!(graph.node(1).unwrap().edges.is_empty());
        assert_eq!(graph.node(2).unwrap().edges.len(), 1);
        assert_eq!(graph.node(2).unwrap().edges[0].target, 1);
    }

    #[test]
    fn explicit_maxspeed_drives_edge_time() {
        let xml = r#"<osm>
            <node id="1" lat="48.000" lon="9.000"/>
            <node id="2" lat="48.000" lon="9.001"/>
            <way id="10">
              <nd ref="1"/><nd ref="2"/>
              <tag k="highway" v="residential"/>
              <tag k="maxspeed" v="50"/>
            </way>
        </osm>"#;
        let graph = build(xml, false, TransportMode::Car);
        let edge = &graph.node(1).unwrap().edges[0];
        assert!((edge.time - edge.distance / 50.0).abs() < 1e-12);
    }

    #[test]
    fn zero_speed_mode_gets_no_edges() {
        let xml = r#"<osm>
            <node id="1" lat="48.000" lon="9.000"/>
            <node id="2" lat="48.000" lon="9.001"/>
            <way id="10">
              <nd ref="1"/><nd ref="2"/>
              <tag k="highway" v="service"/>
            </way>
        </osm>"#;
        let car = build(xml, false, TransportMode::Car);
        assert_eq!(car.edge_count(), 0);

        let pedestrian = build(xml, false, TransportMode::Pedestrian);
        assert_eq!(pedestrian.edge_count(), 2);
        let edge = &pedestrian.node(1).unwrap().edges[0];
        assert!((edge.time - edge.distance / 2.0).abs() < 1e-12);
    }

    #[test]
    fn non_road_way_contributes_nothing() {
        let xml = r#"<osm>
            <node id="1" lat="48.000" lon="9.000"/>
            <node id="2" lat="48.000" lon="9.001"/>
            <way id="10">
              <nd ref="1"/><nd ref="2"/>
              <tag k="building" v="yes"/>
            </way>
        </osm>"#;
        let graph = build(xml, true, TransportMode::Car);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }
}
