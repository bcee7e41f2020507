//! The spatial grid graph and the distance queries that run over it.

pub mod cell;
pub mod graph;
pub mod path;
pub mod stats;

pub use cell::{Cell, CellId, Edge, Point, CELL_SIZE, SNAP_DISTANCE_SQ};
pub use graph::SpatialGraph;
pub use path::{shortest_distance, total_distance, Search};
pub use stats::{CellExtent, GridStats, StatsSnapshot};
