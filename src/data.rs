// Map data as read from the source file, the road classification policy,
// and the routable graph built from both.

pub mod graph;
pub mod osm;
pub mod road;
