use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str;

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::data::osm::{Node, OsmId, Way};
use crate::errors::Result;

#[derive(Debug)]
pub enum OsmElement {
    Node(Node),
    Way(Way),
}

/// Forward-only cursor over an OSM file that assembles whole `node` and
/// `way` elements, consuming each element's subtree with explicit depth
/// tracking. Restarting a pass means constructing a new reader.
pub struct OsmReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

enum Parsed {
    Ignored,
    Node(Option<Node>, bool),
    WayStart(Option<OsmId>),
    WayEmpty(Option<OsmId>),
}

impl OsmReader<Box<dyn BufRead>> {
    /// Opens a plain or xz-compressed OSM file.
    pub fn from_path(path: &Path) -> Result<OsmReader<Box<dyn BufRead>>> {
        let file_reader = BufReader::new(File::open(path)?);
        let source: Box<dyn BufRead> = if path.extension() == Some(OsStr::new("xz")) {
            Box::new(BufReader::new(XzDecoder::new(file_reader)))
        } else {
            Box::new(file_reader)
        };
        Ok(OsmReader::from_reader(source))
    }
}

impl<R: BufRead> OsmReader<R> {
    pub fn from_reader(source: R) -> OsmReader<R> {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        OsmReader {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next `node` or `way` element, or `None` at end of input. Elements
    /// with missing or unparsable required attributes are skipped here;
    /// a bad `nd` reference only drops that single reference.
    pub fn next_element(&mut self) -> Result<Option<OsmElement>> {
        loop {
            self.buf.clear();
            let parsed = match self.reader.read_event_into(&mut self.buf)? {
                Event::Eof => return Ok(None),
                Event::Empty(e) => match e.name().as_ref() {
                    b"node" => Parsed::Node(parse_node_attrs(&e), false),
                    b"way" => Parsed::WayEmpty(parse_way_id(&e)),
                    _ => Parsed::Ignored,
                },
                Event::Start(e) => match e.name().as_ref() {
                    b"node" => Parsed::Node(parse_node_attrs(&e), true),
                    b"way" => Parsed::WayStart(parse_way_id(&e)),
                    _ => Parsed::Ignored,
                },
                _ => Parsed::Ignored,
            };

            match parsed {
                Parsed::Ignored => (),
                Parsed::Node(node, has_children) => {
                    if has_children {
                        self.skip_subtree()?;
                    }
                    match node {
                        Some(node) => return Ok(Some(OsmElement::Node(node))),
                        None => warn!("Skipping node with missing or unparsable attributes"),
                    }
                }
                Parsed::WayEmpty(Some(id)) => {
                    return Ok(Some(OsmElement::Way(Way::new(id, Vec::new(), Vec::new()))))
                }
                Parsed::WayStart(Some(id)) => {
                    let way = self.read_way_children(id)?;
                    return Ok(Some(OsmElement::Way(way)));
                }
                Parsed::WayEmpty(None) => warn!("Skipping way without id"),
                Parsed::WayStart(None) => {
                    warn!("Skipping way without id");
                    self.skip_subtree()?;
                }
            }
        }
    }

    fn read_way_children(&mut self, id: OsmId) -> Result<Way> {
        let mut node_ids = Vec::new();
        let mut tags = Vec::new();
        let mut depth = 1u32;
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Empty(e) => {
                    if depth == 1 {
                        collect_way_child(&e, &mut node_ids, &mut tags);
                    }
                }
                Event::Start(e) => {
                    if depth == 1 {
                        collect_way_child(&e, &mut node_ids, &mut tags);
                    }
                    depth += 1;
                }
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                Event::Eof => return Err("Unexpected end of input inside way element".into()),
                _ => (),
            }
        }
        Ok(Way::new(id, node_ids, tags))
    }

    fn skip_subtree(&mut self) -> Result<()> {
        let mut depth = 1u32;
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Event::Eof => return Err("Unexpected end of input inside element".into()),
                _ => (),
            }
        }
    }
}

fn parse_node_attrs(el: &BytesStart) -> Option<Node> {
    let mut id: Option<OsmId> = None;
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attribute_res in el.attributes() {
        let attribute = attribute_res.ok()?;
        match attribute.key.as_ref() {
            b"id" => {
                let value_str = str::from_utf8(&attribute.value).ok()?;
                id = Some(value_str.parse().ok()?);
            }
            b"lat" => {
                let value_str = str::from_utf8(&attribute.value).ok()?;
                lat = Some(value_str.parse().ok()?);
            }
            b"lon" => {
                let value_str = str::from_utf8(&attribute.value).ok()?;
                lon = Some(value_str.parse().ok()?);
            }
            _ => (),
        }
    }

    Some(Node {
        id: id?,
        lat: lat?,
        lon: lon?,
    })
}

fn parse_way_id(el: &BytesStart) -> Option<OsmId> {
    for attribute_res in el.attributes() {
        let attribute = attribute_res.ok()?;
        if attribute.key.as_ref() == b"id" {
            let value_str = str::from_utf8(&attribute.value).ok()?;
            return value_str.parse().ok();
        }
    }
    None
}

fn collect_way_child(el: &BytesStart, node_ids: &mut Vec<OsmId>, tags: &mut Vec<(String, String)>) {
    match el.name().as_ref() {
        b"nd" => {
            let reference = el.attributes().flatten().find_map(|a| {
                if a.key.as_ref() == b"ref" {
                    str::from_utf8(&a.value).ok().map(str::to_string)
                } else {
                    None
                }
            });
            match reference.as_deref().map(|r| r.parse::<OsmId>()) {
                Some(Ok(node_id)) => node_ids.push(node_id),
                _ => warn!(reference = reference.as_deref().unwrap_or("<missing>");
                    "Dropping unparsable node reference"),
            }
        }
        b"tag" => {
            let mut key = None;
            let mut value = None;
            for attribute in el.attributes().flatten() {
                match attribute.key.as_ref() {
                    b"k" => key = attribute.unescape_value().ok().map(|v| v.into_owned()),
                    b"v" => value = attribute.unescape_value().ok().map(|v| v.into_owned()),
                    _ => (),
                }
            }
            if let (Some(key), Some(value)) = (key, value) {
                tags.push((key, value));
            }
        }
        _ => (),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::road::RoadType;

    fn read_all(xml: &str) -> Vec<OsmElement> {
        let mut reader = OsmReader::from_reader(xml.as_bytes());
        let mut elements = Vec::new();
        while let Some(element) = reader.next_element().unwrap() {
            elements.push(element);
        }
        elements
    }

    #[test]
    fn reads_nodes_and_ways() {
        let xml = r#"<?xml version="1.0"?>
            <osm>
              <node id="1" lat="48.0" lon="9.0"/>
              <node id="2" lat="48.1" lon="9.1">
                <tag k="amenity" v="bench"/>
              </node>
              <way id="10">
                <nd ref="1"/>
                <nd ref="2"/>
                <tag k="highway" v="residential"/>
              </way>
            </osm>"#;
        let elements = read_all(xml);
        assert_eq!(elements.len(), 3);
        match &elements[2] {
            OsmElement::Way(way) => {
                assert_eq!(way.id, 10);
                assert_eq!(way.node_ids, vec![1, 2]);
                assert_eq!(way.road.road_type, RoadType::Residential);
            }
            other => panic!("expected way, got {other:?}"),
        }
    }

    #[test]
    fn node_with_missing_coordinate_is_skipped() {
        let xml = r#"<osm>
            <node id="1" lat="48.0"/>
            <node id="2" lat="48.0" lon="9.0"/>
        </osm>"#;
        let elements = read_all(xml);
        assert_eq!(elements.len(), 1);
        match &elements[0] {
            OsmElement::Node(node) => assert_eq!(node.id, 2),
            other => panic!("expected node, got {other:?}"),
        }
    }

    #[test]
    fn bad_node_reference_drops_only_that_reference() {
        let xml = r#"<osm>
            <way id="5">
              <nd ref="1"/>
              <nd ref="oops"/>
              <nd ref="3"/>
            </way>
        </osm>"#;
        let elements = read_all(xml);
        assert_eq!(elements.len(), 1);
        match &elements[0] {
            OsmElement::Way(way) => assert_eq!(way.node_ids, vec![1, 3]),
            other => panic!("expected way, got {other:?}"),
        }
    }

    #[test]
    fn way_without_children_keeps_empty_node_list() {
        let elements = read_all(r#"<osm><way id="8"/></osm>"#);
        assert_eq!(elements.len(), 1);
        match &elements[0] {
            OsmElement::Way(way) => {
                assert_eq!(way.id, 8);
                assert!(way.node_ids.is_empty());
            }
            other => panic!("expected way, got {other:?}"),
        }
    }

    #[test]
    fn tag_values_are_unescaped() {
        let xml = r#"<osm>
            <way id="5">
              <nd ref="1"/>
              <tag k="name" v="Duke &amp; Duchess"/>
            </way>
        </osm>"#;
        let elements = read_all(xml);
        match &elements[0] {
            OsmElement::Way(way) => {
                assert_eq!(way.tags[0], ("name".to_string(), "Duke & Duchess".to_string()));
            }
            other => panic!("expected way, got {other:?}"),
        }
    }
}
