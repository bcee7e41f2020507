//! Request routing onto the shared spatial graph.
//!
//! [`GridService`] owns the one [`SpatialGraph`] of the process behind a
//! reader/writer lock. Walks and resets take the lock exclusively; queries
//! share it. A query that names a location with no cell yet inserts that
//! cell under the write lock first and then downgrades to a read guard for
//! the search itself, so concurrent queries keep overlapping.

use crate::grid::{self, GridStats, Point, SpatialGraph, StatsSnapshot};
use crate::messaging::{Request, Response, Walk};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use tracing::{debug, trace};

/// Thread-safe entry point for every graph operation.
#[derive(Debug)]
pub struct GridService {
    graph: RwLock<SpatialGraph>,
    stats: Arc<GridStats>,
}

impl Default for GridService {
    fn default() -> Self {
        Self::new()
    }
}

impl GridService {
    pub fn new() -> Self {
        let stats = Arc::new(GridStats::new());
        Self {
            graph: RwLock::new(SpatialGraph::with_stats(stats.clone())),
            stats,
        }
    }

    /// Executes a decoded request and builds its response.
    ///
    /// Never fails: graph operations have no error path, so every request
    /// produces an `OK` response.
    pub fn handle(&self, request: &Request) -> Response {
        match request {
            Request::Walk(walk) => {
                self.apply_walk(walk);
                Response::ok()
            }
            Request::OneToOne(query) => Response::shortest_path(
                self.shortest_distance(query.origin.into(), query.destination.into()),
            ),
            Request::OneToAll(query) => Response::total(self.total_distance(query.origin.into())),
            Request::Reset => {
                self.reset();
                Response::ok()
            }
        }
    }

    /// Records a walk. Returns the number of segments applied.
    pub fn apply_walk(&self, walk: &Walk) -> usize {
        let points = walk.points();
        let segments = self.graph.write().apply_walk(&points, &walk.lengths);
        trace!(locations = points.len(), segments, "walk applied");
        segments
    }

    pub fn reset(&self) {
        self.graph.write().reset();
        debug!("🧹 Graph reset");
    }

    pub fn shortest_distance(&self, origin: Point, destination: Point) -> u64 {
        self.stats.record_one_to_one();
        let (graph, [from, to]) = self.resolve_shared([origin, destination]);
        grid::shortest_distance(&graph, from, to)
    }

    pub fn total_distance(&self, origin: Point) -> u64 {
        self.stats.record_one_to_all();
        let (graph, [from]) = self.resolve_shared([origin]);
        grid::total_distance(&graph, from)
    }

    /// Resolves query points to cells and returns a shared guard under
    /// which all of them exist.
    ///
    /// The common case needs only the read lock. When a point has no cell
    /// yet the write lock is taken to insert it, then downgraded without
    /// releasing so no writer can slip in between insert and search.
    fn resolve_shared<const N: usize>(
        &self,
        points: [Point; N],
    ) -> (RwLockReadGuard<'_, SpatialGraph>, [grid::CellId; N]) {
        {
            let graph = self.graph.read();
            let cells = points.map(|point| graph.cell_for_point(point));
            if cells.iter().all(|cell| graph.contains(*cell)) {
                return (graph, cells);
            }
        }

        let mut graph = self.graph.write();
        let cells = points.map(|point| graph.resolve(point));
        (RwLockWriteGuard::downgrade(graph), cells)
    }

    /// Runs `f` with shared access to the graph.
    pub fn with_graph<R>(&self, f: impl FnOnce(&SpatialGraph) -> R) -> R {
        f(&self.graph.read())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
