use std::collections::HashMap;

use crate::data::osm::OsmId;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinate pairs, in meters.
pub fn distance_between(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// A weighted, directed connection to another node. One edge is stored per
/// allowed traversal direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub target: OsmId,
    pub distance: f64,
    pub time: f64,
    pub way: OsmId,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub lat: f64,
    pub lon: f64,
    pub edges: Vec<Edge>,
}

/// The routable graph reconstructed from records. Never persisted itself.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    nodes: HashMap<OsmId, GraphNode>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    pub fn add_node(&mut self, id: OsmId, lat: f64, lon: f64) {
        self.nodes.entry(id).or_insert(GraphNode {
            lat,
            lon,
            edges: Vec::new(),
        });
    }

    pub fn node(&self, id: OsmId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: OsmId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn remove_node(&mut self, id: OsmId) {
        self.nodes.remove(&id);
    }

    /// Appends an outgoing edge; a dangling source id is ignored.
    pub fn add_edge(&mut self, from: OsmId, edge: Edge) {
        if let Some(node) = self.nodes.get_mut(&from) {
            node.edges.push(edge);
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.edges.len()).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&OsmId, &GraphNode)> {
        self.nodes.iter()
    }

    /// Union of node maps and edge lists. Idempotent for nodes present in
    /// both graphs: an edge already known for a node (same target and way)
    /// is not duplicated.
    pub fn merge(&mut self, other: Graph) {
        for (id, incoming) in other.nodes {
            match self.nodes.get_mut(&id) {
                None => {
                    self.nodes.insert(id, incoming);
                }
                Some(existing) => {
                    for edge in incoming.edges {
                        let known = existing
                            .edges
                            .iter()
                            .any(|e| e.target == edge.target && e.way == edge.way);
                        if !known {
                            existing.edges.push(edge);
                        }
                    }
                }
            }
        }
    }

    pub fn closest_node(&self, lat: f64, lon: f64) -> Option<OsmId> {
        self.nodes
            .iter()
            .map(|(id, node)| (*id, distance_between(lat, lon, node.lat, node.lon)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_longitude_degree_at_equator() {
        let d = distance_between(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let d1 = distance_between(48.79, 9.83, 48.80, 9.84);
        let d2 = distance_between(48.80, 9.84, 48.79, 9.83);
        assert!((d1 - d2).abs() < 1e-9);
        assert_eq!(distance_between(48.79, 9.83, 48.79, 9.83), 0.0);
    }

    #[test]
    fn closest_node_picks_nearest() {
        let mut g = Graph::new();
        g.add_node(1, 48.0, 9.0);
        g.add_node(2, 48.1, 9.0);
        g.add_node(3, 50.0, 9.0);
        assert_eq!(g.closest_node(48.11, 9.0), Some(2));
    }

    #[test]
    fn merge_is_idempotent_for_shared_nodes() {
        let mut a = Graph::new();
        a.add_node(1, 48.0, 9.0);
        a.add_node(2, 48.0, 9.1);
        a.add_edge(
            1,
            Edge {
                target: 2,
                distance: 10.0,
                time: 1.0,
                way: 7,
            },
        );

        let b = a.clone();
        a.merge(b);
        assert_eq!(a.node_count(), 2);
        assert_eq!(a.node(1).unwrap().edges.len(), 1);
    }

    #[test]
    fn merge_unions_disjoint_nodes() {
        let mut a = Graph::new();
        a.add_node(1, 48.0, 9.0);
        let mut b = Graph::new();
        b.add_node(2, 48.1, 9.0);
        a.merge(b);
        assert_eq!(a.node_count(), 2);
    }
}
