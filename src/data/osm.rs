use crate::data::road::RoadInfo;

pub type OsmId = u64;

/// A single geographic point from the source data.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: OsmId,
    pub lat: f64,
    pub lon: f64,
}

/// An ordered path of nodes with its raw tags. Routing attributes are
/// resolved once on construction.
#[derive(Debug, Clone)]
pub struct Way {
    pub id: OsmId,
    pub node_ids: Vec<OsmId>,
    pub tags: Vec<(String, String)>,
    pub road: RoadInfo,
}

impl Way {
    pub fn new(id: OsmId, node_ids: Vec<OsmId>, tags: Vec<(String, String)>) -> Way {
        let road = RoadInfo::from_tags(&tags);
        Way {
            id,
            node_ids,
            tags,
            road,
        }
    }

    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.iter().any(|(k, _)| k == key)
    }
}

// Shard records are single lines with `-` between fields, `,` between list
// entries and `@` between tag key and value. Tag text gets the separator
// characters percent-escaped so records survive a round trip.

fn escape_tag_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => out.push_str("%25"),
            '-' => out.push_str("%2d"),
            ',' => out.push_str("%2c"),
            '@' => out.push_str("%40"),
            '\n' => out.push_str("%0a"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_tag_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        match code.as_str() {
            "25" => out.push('%'),
            "2d" => out.push('-'),
            "2c" => out.push(','),
            "40" => out.push('@'),
            "0a" => out.push('\n'),
            _ => {
                out.push('%');
                out.push_str(&code);
            }
        }
    }
    out
}

/// Splits off the leading field of a node record, tolerating a minus sign at
/// the start of the remainder (southern/western coordinates).
fn split_coord_field(record: &str) -> Option<(&str, &str)> {
    let split_at = if let Some(rest) = record.strip_prefix('-') {
        rest.find('-')? + 1
    } else {
        record.find('-')?
    };
    Some((&record[..split_at], &record[split_at + 1..]))
}

impl Node {
    /// `id-lat-lon`
    pub fn to_record(&self) -> String {
        format!("{}-{}-{}", self.id, self.lat, self.lon)
    }

    pub fn from_record(record: &str) -> Option<Node> {
        let (id, rest) = split_coord_field(record)?;
        let (lat, lon) = split_coord_field(rest)?;
        Some(Node {
            id: id.parse().ok()?,
            lat: lat.parse().ok()?,
            lon: lon.parse().ok()?,
        })
    }
}

impl Way {
    /// `id-{nodeId,nodeId,...}-{key@value,key@value,...}`
    pub fn to_record(&self) -> String {
        let ids = self
            .node_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let tags = self
            .tags
            .iter()
            .map(|(k, v)| format!("{}@{}", escape_tag_text(k), escape_tag_text(v)))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}-{}-{}", self.id, ids, tags)
    }

    pub fn from_record(record: &str) -> Option<Way> {
        let mut parts = record.split('-');
        let id = parts.next()?.parse().ok()?;
        let ids_part = parts.next()?;
        let tags_part = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let mut node_ids = Vec::new();
        if !ids_part.is_empty() {
            for id_str in ids_part.split(',') {
                node_ids.push(id_str.parse().ok()?);
            }
        }
        let mut tags = Vec::new();
        if !tags_part.is_empty() {
            for tag_str in tags_part.split(',') {
                let (key, value) = tag_str.split_once('@')?;
                tags.push((unescape_tag_text(key), unescape_tag_text(value)));
            }
        }
        Some(Way::new(id, node_ids, tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::road::{Direction, RoadType};

    #[test]
    fn node_record_round_trip() {
        let node = Node {
            id: 42,
            lat: 48.793347,
            lon: 9.832301,
        };
        assert_eq!(Node::from_record(&node.to_record()), Some(node));
    }

    #[test]
    fn node_record_round_trip_negative_coordinates() {
        let node = Node {
            id: 7,
            lat: -33.8688,
            lon: -151.2093,
        };
        let record = node.to_record();
        assert_eq!(Node::from_record(&record), Some(node));
    }

    #[test]
    fn malformed_node_record_is_rejected() {
        assert_eq!(Node::from_record("only-two"), None);
        assert_eq!(Node::from_record("a-1.0-2.0"), None);
        assert_eq!(Node::from_record(""), None);
    }

    #[test]
    fn way_record_round_trip() {
        let way = Way::new(
            9,
            vec![1, 2, 3],
            vec![
                ("highway".to_string(), "residential".to_string()),
                ("oneway".to_string(), "-1".to_string()),
                ("name".to_string(), "Foo-Street, up@hill".to_string()),
            ],
        );
        let restored = Way::from_record(&way.to_record()).unwrap();
        assert_eq!(restored.id, 9);
        assert_eq!(restored.node_ids, vec![1, 2, 3]);
        assert_eq!(restored.tags, way.tags);
        assert_eq!(restored.road.road_type, RoadType::Residential);
        assert_eq!(restored.road.direction, Direction::Backward);
    }

    #[test]
    fn way_record_round_trip_empty_lists() {
        let way = Way::new(4, Vec::new(), Vec::new());
        let restored = Way::from_record(&way.to_record()).unwrap();
        assert!(restored.node_ids.is_empty());
        assert!(restored.tags.is_empty());
    }

    #[test]
    fn escaping_is_reversible() {
        let nasty = "a-b,c@d%e\nf";
        assert_eq!(unescape_tag_text(&escape_tag_text(nasty)), nasty);
    }
}
