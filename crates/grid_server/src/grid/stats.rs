//! Counters describing graph growth and request traffic.
//!
//! Counters are atomics so query paths can bump them while holding only a
//! shared graph lock. They are reset together with the graph.

use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Live statistics shared between the graph and the request router.
#[derive(Debug)]
pub struct GridStats {
    walks: AtomicU64,
    one_to_one: AtomicU64,
    one_to_all: AtomicU64,
    resets: AtomicU64,
    locations: AtomicU64,
    cells: AtomicU64,
    edges: AtomicU64,
    lowest_x: AtomicU32,
    highest_x: AtomicU32,
    lowest_y: AtomicU32,
    highest_y: AtomicU32,
}

/// Bounding box of all created cells, in cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellExtent {
    pub lowest_x: u32,
    pub highest_x: u32,
    pub lowest_y: u32,
    pub highest_y: u32,
}

/// Point-in-time copy of [`GridStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub walks: u64,
    pub one_to_one: u64,
    pub one_to_all: u64,
    pub resets: u64,
    pub locations: u64,
    pub cells: u64,
    pub edges: u64,
    pub extent: Option<CellExtent>,
}

impl Default for GridStats {
    fn default() -> Self {
        Self {
            walks: AtomicU64::new(0),
            one_to_one: AtomicU64::new(0),
            one_to_all: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            locations: AtomicU64::new(0),
            cells: AtomicU64::new(0),
            edges: AtomicU64::new(0),
            lowest_x: AtomicU32::new(u32::MAX),
            highest_x: AtomicU32::new(0),
            lowest_y: AtomicU32::new(u32::MAX),
            highest_y: AtomicU32::new(0),
        }
    }
}

impl GridStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_walk(&self, locations: usize) {
        self.walks.fetch_add(1, Ordering::Relaxed);
        self.locations.fetch_add(locations as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_one_to_one(&self) {
        self.one_to_one.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_one_to_all(&self) {
        self.one_to_all.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_edge(&self) {
        self.edges.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cell(&self, (coord_x, coord_y): (u32, u32)) {
        self.cells.fetch_add(1, Ordering::Relaxed);
        self.lowest_x.fetch_min(coord_x, Ordering::Relaxed);
        self.highest_x.fetch_max(coord_x, Ordering::Relaxed);
        self.lowest_y.fetch_min(coord_y, Ordering::Relaxed);
        self.highest_y.fetch_max(coord_y, Ordering::Relaxed);
    }

    /// Zeroes every counter except the reset counter, which is bumped.
    pub(crate) fn reset(&self) {
        for counter in [
            &self.walks,
            &self.one_to_one,
            &self.one_to_all,
            &self.locations,
            &self.cells,
            &self.edges,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.lowest_x.store(u32::MAX, Ordering::Relaxed);
        self.highest_x.store(0, Ordering::Relaxed);
        self.lowest_y.store(u32::MAX, Ordering::Relaxed);
        self.highest_y.store(0, Ordering::Relaxed);
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let cells = self.cells.load(Ordering::Relaxed);
        let extent = (cells > 0).then(|| CellExtent {
            lowest_x: self.lowest_x.load(Ordering::Relaxed),
            highest_x: self.highest_x.load(Ordering::Relaxed),
            lowest_y: self.lowest_y.load(Ordering::Relaxed),
            highest_y: self.highest_y.load(Ordering::Relaxed),
        });

        StatsSnapshot {
            walks: self.walks.load(Ordering::Relaxed),
            one_to_one: self.one_to_one.load(Ordering::Relaxed),
            one_to_all: self.one_to_all.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            locations: self.locations.load(Ordering::Relaxed),
            cells,
            edges: self.edges.load(Ordering::Relaxed),
            extent,
        }
    }
}
