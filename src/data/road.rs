/// Road categories recognized from the `highway` tag. Anything else maps to
/// `None`, which never produces edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoadType {
    None,
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Unclassified,
    Residential,
    MotorwayLink,
    TrunkLink,
    PrimaryLink,
    SecondaryLink,
    TertiaryLink,
    LivingStreet,
    Service,
    Pedestrian,
    Track,
    BusGuideway,
    Escape,
    Raceway,
    Road,
    Busway,
    Footway,
    Bridleway,
    Steps,
    Corridor,
    Path,
    Cycleway,
    Construction,
}

impl RoadType {
    /// Tag values are matched case-insensitively, unknown values are `None`.
    pub fn from_tag(value: &str) -> RoadType {
        match value.to_ascii_lowercase().as_str() {
            "motorway" => RoadType::Motorway,
            "trunk" => RoadType::Trunk,
            "primary" => RoadType::Primary,
            "secondary" => RoadType::Secondary,
            "tertiary" => RoadType::Tertiary,
            "unclassified" => RoadType::Unclassified,
            "residential" => RoadType::Residential,
            "motorway_link" => RoadType::MotorwayLink,
            "trunk_link" => RoadType::TrunkLink,
            "primary_link" => RoadType::PrimaryLink,
            "secondary_link" => RoadType::SecondaryLink,
            "tertiary_link" => RoadType::TertiaryLink,
            "living_street" => RoadType::LivingStreet,
            "service" => RoadType::Service,
            "pedestrian" => RoadType::Pedestrian,
            "track" => RoadType::Track,
            "bus_guideway" => RoadType::BusGuideway,
            "escape" => RoadType::Escape,
            "raceway" => RoadType::Raceway,
            "road" => RoadType::Road,
            "busway" => RoadType::Busway,
            "footway" => RoadType::Footway,
            "bridleway" => RoadType::Bridleway,
            "steps" => RoadType::Steps,
            "corridor" => RoadType::Corridor,
            "path" => RoadType::Path,
            "cycleway" => RoadType::Cycleway,
            "construction" => RoadType::Construction,
            _ => RoadType::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Car,
    Pedestrian,
}

/// Traversal order allowed by the way's `oneway` tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Both,
    Forward,
    Backward,
}

/// Default speed for motor traffic by road category. The numbers are policy
/// configuration, not derived values.
pub fn car_speed(road_type: RoadType) -> u32 {
    match road_type {
        RoadType::None => 0,
        RoadType::Motorway => 110,
        RoadType::Trunk => 100,
        RoadType::Primary => 80,
        RoadType::Secondary => 80,
        RoadType::Tertiary => 70,
        RoadType::Unclassified => 20,
        RoadType::Residential => 10,
        RoadType::MotorwayLink => 50,
        RoadType::TrunkLink => 50,
        RoadType::PrimaryLink => 30,
        RoadType::SecondaryLink => 25,
        RoadType::TertiaryLink => 25,
        RoadType::LivingStreet => 10,
        RoadType::Service => 0,
        RoadType::Pedestrian => 0,
        RoadType::Track => 0,
        RoadType::BusGuideway => 0,
        RoadType::Escape => 0,
        RoadType::Raceway => 0,
        RoadType::Road => 25,
        RoadType::Busway => 0,
        RoadType::Footway => 0,
        RoadType::Bridleway => 0,
        RoadType::Steps => 0,
        RoadType::Corridor => 0,
        RoadType::Path => 0,
        RoadType::Cycleway => 0,
        RoadType::Construction => 0,
    }
}

/// Default speed for pedestrians by road category.
pub fn pedestrian_speed(road_type: RoadType) -> u32 {
    match road_type {
        RoadType::None => 0,
        RoadType::Motorway => 0,
        RoadType::Trunk => 0,
        RoadType::Primary => 0,
        RoadType::Secondary => 0,
        RoadType::Tertiary => 0,
        RoadType::Unclassified => 1,
        RoadType::Residential => 3,
        RoadType::MotorwayLink => 0,
        RoadType::TrunkLink => 0,
        RoadType::PrimaryLink => 0,
        RoadType::SecondaryLink => 0,
        RoadType::TertiaryLink => 0,
        RoadType::LivingStreet => 5,
        RoadType::Service => 2,
        RoadType::Pedestrian => 5,
        RoadType::Track => 0,
        RoadType::BusGuideway => 0,
        RoadType::Escape => 0,
        RoadType::Raceway => 0,
        RoadType::Road => 3,
        RoadType::Busway => 0,
        RoadType::Footway => 4,
        RoadType::Bridleway => 1,
        RoadType::Steps => 2,
        RoadType::Corridor => 3,
        RoadType::Path => 4,
        RoadType::Cycleway => 2,
        RoadType::Construction => 0,
    }
}

/// Routing-relevant way attributes, resolved from the raw tag list once at
/// parse time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadInfo {
    pub road_type: RoadType,
    pub max_speed: Option<u32>,
    pub direction: Direction,
}

impl RoadInfo {
    pub fn from_tags<K, V>(tags: &[(K, V)]) -> RoadInfo
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut info = RoadInfo {
            road_type: RoadType::None,
            max_speed: None,
            direction: Direction::Both,
        };
        for (key, value) in tags {
            match key.as_ref() {
                "highway" => info.road_type = RoadType::from_tag(value.as_ref()),
                "maxspeed" => info.max_speed = value.as_ref().trim().parse().ok(),
                "oneway" => match value.as_ref() {
                    "yes" => info.direction = Direction::Forward,
                    "-1" => info.direction = Direction::Backward,
                    "no" => info.direction = Direction::Both,
                    _ => (),
                },
                _ => (),
            }
        }
        info
    }

    pub fn is_road(&self) -> bool {
        self.road_type != RoadType::None
    }

    /// Speed used for edge weights. The explicit `maxspeed` limit only
    /// overrides the car table; a posted limit does not change walking speed.
    /// 0 means the way is unusable in this mode.
    pub fn effective_speed(&self, mode: TransportMode) -> u32 {
        match mode {
            TransportMode::Car => self
                .max_speed
                .unwrap_or_else(|| car_speed(self.road_type)),
            TransportMode::Pedestrian => pedestrian_speed(self.road_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_parsing_is_case_insensitive() {
        assert_eq!(RoadType::from_tag("Motorway"), RoadType::Motorway);
        assert_eq!(RoadType::from_tag("LIVING_STREET"), RoadType::LivingStreet);
        assert_eq!(RoadType::from_tag("residential"), RoadType::Residential);
    }

    #[test]
    fn unknown_tag_is_not_a_road() {
        assert_eq!(RoadType::from_tag("proposed"), RoadType::None);
        assert_eq!(RoadType::from_tag(""), RoadType::None);
    }

    #[test]
    fn speed_tables_disagree_by_mode() {
        assert_eq!(car_speed(RoadType::Motorway), 110);
        assert_eq!(pedestrian_speed(RoadType::Motorway), 0);
        assert_eq!(car_speed(RoadType::Service), 0);
        assert_eq!(pedestrian_speed(RoadType::Service), 2);
        assert_eq!(car_speed(RoadType::Residential), 10);
        assert_eq!(pedestrian_speed(RoadType::Residential), 3);
    }

    #[test]
    fn road_info_resolves_tags() {
        let tags = vec![
            ("highway".to_string(), "residential".to_string()),
            ("maxspeed".to_string(), "30".to_string()),
            ("oneway".to_string(), "yes".to_string()),
            ("name".to_string(), "Hauptstrasse".to_string()),
        ];
        let info = RoadInfo::from_tags(&tags);
        assert_eq!(info.road_type, RoadType::Residential);
        assert_eq!(info.max_speed, Some(30));
        assert_eq!(info.direction, Direction::Forward);
        assert_eq!(info.effective_speed(TransportMode::Car), 30);
        assert_eq!(info.effective_speed(TransportMode::Pedestrian), 3);
    }

    #[test]
    fn reversed_oneway_encoding() {
        let tags = vec![
            ("highway".to_string(), "primary".to_string()),
            ("oneway".to_string(), "-1".to_string()),
        ];
        assert_eq!(RoadInfo::from_tags(&tags).direction, Direction::Backward);
    }

    #[test]
    fn unparsable_maxspeed_falls_back_to_table() {
        let tags = vec![
            ("highway".to_string(), "tertiary".to_string()),
            ("maxspeed".to_string(), "walk".to_string()),
        ];
        let info = RoadInfo::from_tags(&tags);
        assert_eq!(info.max_speed, None);
        assert_eq!(info.effective_speed(TransportMode::Car), 70);
    }
}
