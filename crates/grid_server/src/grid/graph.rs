//! Spatial graph: cell-indexed point store with averaged edge weights.
//!
//! Points are snapped onto cells of [`CELL_SIZE`] units. A new point joins
//! an existing neighboring cell when that cell's representative point lies
//! within the snapping radius; otherwise it lands in its own quantized cell.
//! Snapping is order dependent: the first point in a neighborhood becomes
//! the representative every later point is compared against.
//!
//! The graph itself is not synchronized. [`GridService`] wraps it in a
//! reader/writer lock.
//!
//! [`CELL_SIZE`]: super::CELL_SIZE
//! [`GridService`]: crate::messaging::GridService

use super::cell::{Cell, CellId, Edge, Point, SNAP_DISTANCE_SQ};
use super::stats::GridStats;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Neighbor cells probed when snapping, in probe order.
const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Mapping from cell id to cell. Every cell referenced by an edge is a key.
#[derive(Debug)]
pub struct SpatialGraph {
    cells: HashMap<CellId, Cell>,
    stats: Arc<GridStats>,
}

impl Default for SpatialGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialGraph {
    pub fn new() -> Self {
        Self::with_stats(Arc::new(GridStats::new()))
    }

    /// Creates a graph that reports growth into `stats`.
    pub fn with_stats(stats: Arc<GridStats>) -> Self {
        Self {
            cells: HashMap::with_capacity(2_000),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<GridStats> {
        &self.stats
    }

    /// Resolves the cell a point belongs to without inserting anything.
    ///
    /// The eight neighbors are probed in a fixed order and the first one
    /// whose representative is within the snapping radius wins. Without a
    /// match the point's own quantized cell is returned; a previous insert
    /// at the same location used that same id, so the exact cell needs no
    /// separate probe.
    pub fn cell_for_point(&self, point: Point) -> CellId {
        let (coord_x, coord_y) = point.cell_coords();

        for (dx, dy) in NEIGHBOR_OFFSETS {
            let (Some(x), Some(y)) = (
                coord_x.checked_add_signed(dx),
                coord_y.checked_add_signed(dy),
            ) else {
                continue;
            };

            let neighbor = CellId::from_coords(x, y);
            if let Some(cell) = self.cells.get(&neighbor) {
                if cell.representative().distance_sq(&point) <= SNAP_DISTANCE_SQ {
                    return neighbor;
                }
            }
        }

        CellId::from_coords(coord_x, coord_y)
    }

    /// Inserts a cell represented by `point` unless `id` already exists.
    ///
    /// Returns `true` when a cell was created.
    pub fn ensure_cell(&mut self, id: CellId, point: Point) -> bool {
        match self.cells.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Cell::new(id, point));
                self.stats.record_cell(id.coords());
                trace!(cell = %id, x = point.x, y = point.y, "cell created");
                true
            }
        }
    }

    /// Resolves `point` and makes sure its cell exists.
    pub fn resolve(&mut self, point: Point) -> CellId {
        let id = self.cell_for_point(point);
        self.ensure_cell(id, point);
        id
    }

    /// Accumulates one measured segment into the edge `origin -> destination`.
    ///
    /// Both cells must already exist; an unknown origin is ignored.
    pub fn add_edge(&mut self, origin: CellId, destination: CellId, length: u64) {
        debug_assert!(self.cells.contains_key(&destination));

        let Some(cell) = self.cells.get_mut(&origin) else {
            return;
        };

        match cell.edges_mut().entry(destination) {
            Entry::Occupied(mut edge) => edge.get_mut().record(length),
            Entry::Vacant(slot) => {
                slot.insert(Edge::first(length));
                self.stats.record_edge();
            }
        }
    }

    /// Applies a walk: each consecutive pair of locations becomes one edge
    /// sample. The destination of one segment is reused as the origin of
    /// the next. Walks with fewer than two locations or no lengths are
    /// ignored, and surplus locations or lengths are dropped.
    ///
    /// Returns the number of segments recorded.
    pub fn apply_walk(&mut self, locations: &[Point], lengths: &[u64]) -> usize {
        let [first, rest @ ..] = locations else {
            return 0;
        };
        if rest.is_empty() || lengths.is_empty() {
            return 0;
        }

        let mut origin = self.resolve(*first);
        let mut segments = 0;
        for (point, &length) in rest.iter().zip(lengths) {
            let destination = self.resolve(*point);
            self.add_edge(origin, destination, length);
            origin = destination;
            segments += 1;
        }

        self.stats.record_walk(segments + 1);
        segments
    }

    /// Drops every cell and edge and zeroes the statistics.
    pub fn reset(&mut self) {
        self.cells.clear();
        self.stats.reset();
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains_key(&id)
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.cells.values().map(|cell| cell.edges().len()).sum()
    }
}
