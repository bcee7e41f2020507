//! Points, cells and edges of the spatial grid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Side length of a grid cell, in point units.
pub const CELL_SIZE: u32 = 500;

/// Squared snapping radius. A point joins a neighboring cell when the
/// cell's representative point lies within this squared distance.
pub const SNAP_DISTANCE_SQ: u64 = 250_000;

/// A raw walk location. Points are never stored directly; they are always
/// mapped onto a [`Cell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Squared euclidean distance to `other`.
    pub fn distance_sq(&self, other: &Point) -> u64 {
        let dx = u64::from(self.x.abs_diff(other.x));
        let dy = u64::from(self.y.abs_diff(other.y));
        dx * dx + dy * dy
    }

    /// Quantized cell coordinates of this point.
    pub const fn cell_coords(&self) -> (u32, u32) {
        (self.x / CELL_SIZE, self.y / CELL_SIZE)
    }
}

/// Identifier of a cell, packed from its cell coordinates as
/// `coord_x << 32 | coord_y`.
///
/// Ordering follows the packed value, which keeps priority queue ties in
/// the path engine deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(u64);

impl CellId {
    pub const fn from_coords(coord_x: u32, coord_y: u32) -> Self {
        Self(((coord_x as u64) << 32) | coord_y as u64)
    }

    /// The cell a point falls into when no snapping applies.
    pub const fn containing(point: Point) -> Self {
        let (coord_x, coord_y) = point.cell_coords();
        Self::from_coords(coord_x, coord_y)
    }

    pub const fn coords(self) -> (u32, u32) {
        ((self.0 >> 32) as u32, self.0 as u32)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.coords();
        write!(f, "cell({x},{y})")
    }
}

/// Directed, accumulating edge between two cells.
///
/// `sum` and `samples` always change together; the effective weight is the
/// truncated integer mean of all recorded segment lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub sum: u64,
    pub samples: u64,
}

impl Edge {
    pub(crate) fn first(length: u64) -> Self {
        Self {
            sum: length,
            samples: 1,
        }
    }

    pub(crate) fn record(&mut self, length: u64) {
        self.sum = self.sum.saturating_add(length);
        self.samples += 1;
    }

    /// Averaged edge weight, `sum / samples` with integer truncation.
    pub fn weight(&self) -> u64 {
        self.sum.checked_div(self.samples).unwrap_or(0)
    }
}

/// A node of the spatial graph.
#[derive(Debug, Clone)]
pub struct Cell {
    id: CellId,
    representative: Point,
    edges: HashMap<CellId, Edge>,
}

impl Cell {
    pub(crate) fn new(id: CellId, representative: Point) -> Self {
        Self {
            id,
            representative,
            edges: HashMap::with_capacity(4),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn coords(&self) -> (u32, u32) {
        self.id.coords()
    }

    /// The first point that created this cell.
    pub fn representative(&self) -> Point {
        self.representative
    }

    /// Outgoing edges keyed by destination cell.
    pub fn edges(&self) -> &HashMap<CellId, Edge> {
        &self.edges
    }

    pub fn edge(&self, destination: CellId) -> Option<&Edge> {
        self.edges.get(&destination)
    }

    pub(crate) fn edges_mut(&mut self) -> &mut HashMap<CellId, Edge> {
        &mut self.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_id_packs_coordinates() {
        let id = CellId::from_coords(7, 3);
        assert_eq!(id.raw(), (7u64 << 32) | 3);
        assert_eq!(id.coords(), (7, 3));
        assert_eq!(CellId::containing(Point::new(3_999, 1_500)), id);
    }

    #[test]
    fn test_edge_weight_truncates() {
        let mut edge = Edge::first(10);
        edge.record(11);
        assert_eq!(edge.samples, 2);
        assert_eq!(edge.weight(), 10);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Point::new(100, 900);
        let b = Point::new(400, 500);
        assert_eq!(a.distance_sq(&b), 300 * 300 + 400 * 400);
        assert_eq!(a.distance_sq(&b), b.distance_sq(&a));
    }
}
