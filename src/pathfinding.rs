//! Stateless route planning over the 4-connected grid.
//!
//! Routes are ranked by `(hazard cells entered, steps)`: a hazard-free
//! shortest path always wins, and when every route crosses a hazard the
//! least-hazardous one (shortest among equals) is returned. The frontier is
//! keyed by cost then row-major cell order, so equal-cost routes resolve the
//! same way on every run.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, VecDeque};

use crate::error::{SimError, SimResult};
use crate::types::Cell;
use crate::world::WorldGrid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Cost {
    hazards: u32,
    steps: u32,
}

/// Ordered cells from `from` (exclusive) to `to` (inclusive).
pub fn find_path(from: Cell, to: Cell, grid: &WorldGrid) -> SimResult<Vec<Cell>> {
    if !grid.is_passable(from) || !grid.is_passable(to) {
        return Err(SimError::NoPathExists { from, to });
    }
    if from == to {
        return Ok(Vec::new());
    }

    let mut best: HashMap<Cell, Cost> = HashMap::new();
    let mut previous: HashMap<Cell, Cell> = HashMap::new();
    let mut frontier = BinaryHeap::new();
    let start = Cost {
        hazards: 0,
        steps: 0,
    };
    best.insert(from, start);
    frontier.push(Reverse((start, from)));

    while let Some(Reverse((cost, cell))) = frontier.pop() {
        if cell == to {
            break;
        }
        if best.get(&cell).is_some_and(|known| *known < cost) {
            continue;
        }
        for next in cell.neighbors() {
            if !grid.is_passable(next) {
                continue;
            }
            let next_cost = Cost {
                hazards: cost.hazards + u32::from(grid.is_hazardous(next)),
                steps: cost.steps + 1,
            };
            let improves = best.get(&next).map_or(true, |known| next_cost < *known);
            if improves {
                best.insert(next, next_cost);
                previous.insert(next, cell);
                frontier.push(Reverse((next_cost, next)));
            }
        }
    }

    if !previous.contains_key(&to) {
        return Err(SimError::NoPathExists { from, to });
    }

    let mut path = Vec::new();
    let mut cursor = to;
    while cursor != from {
        path.push(cursor);
        match previous.get(&cursor) {
            Some(prev) => cursor = *prev,
            None => return Err(SimError::NoPathExists { from, to }),
        }
    }
    path.reverse();
    Ok(path)
}

/// Path length in steps, if `to` is reachable.
pub fn path_distance(from: Cell, to: Cell, grid: &WorldGrid) -> Option<usize> {
    find_path(from, to, grid).ok().map(|path| path.len())
}

/// A route being followed by an agent. Hazards already on the route when it
/// was planned are accepted; a hazard appearing later compromises it.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedPath {
    cells: VecDeque<Cell>,
    accepted_hazards: BTreeSet<Cell>,
    destination: Cell,
}

impl PlannedPath {
    pub fn plan(from: Cell, to: Cell, grid: &WorldGrid) -> SimResult<Self> {
        let cells = find_path(from, to, grid)?;
        let accepted_hazards = cells
            .iter()
            .copied()
            .filter(|cell| grid.is_hazardous(*cell))
            .collect();
        Ok(Self {
            cells: cells.into(),
            accepted_hazards,
            destination: to,
        })
    }

    pub fn destination(&self) -> Cell {
        self.destination
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn next_step(&mut self) -> Option<Cell> {
        self.cells.pop_front()
    }

    pub fn is_compromised(&self, grid: &WorldGrid) -> bool {
        self.cells
            .iter()
            .any(|cell| grid.is_hazardous(*cell) && !self.accepted_hazards.contains(cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid_path(from: Cell, path: &[Cell], grid: &WorldGrid) {
        let mut cursor = from;
        for cell in path {
            assert_eq!(cursor.manhattan(*cell), 1, "non-adjacent step {cursor} -> {cell}");
            assert!(grid.is_passable(*cell));
            cursor = *cell;
        }
    }

    #[test]
    fn straight_corridor() {
        let grid = WorldGrid::from_rows(&["E...."]).expect("valid layout");
        let path = find_path(Cell::new(0, 0), Cell::new(4, 0), &grid).expect("reachable");
        assert_eq!(
            path,
            vec![Cell::new(1, 0), Cell::new(2, 0), Cell::new(3, 0), Cell::new(4, 0)]
        );
    }

    #[test]
    fn same_cell_yields_empty_path() {
        let grid = WorldGrid::from_rows(&["E."]).expect("valid layout");
        assert!(find_path(Cell::new(1, 0), Cell::new(1, 0), &grid)
            .expect("trivially reachable")
            .is_empty());
    }

    #[test]
    fn walls_force_a_detour() {
        let grid = WorldGrid::from_rows(&[
            "E.#..", //
            "..#..",
            ".....",
        ])
        .expect("valid layout");
        let from = Cell::new(0, 0);
        let to = Cell::new(4, 0);
        let path = find_path(from, to, &grid).expect("reachable");
        assert_eq!(path.len(), 8);
        assert_valid_path(from, &path, &grid);
    }

    #[test]
    fn unreachable_target_signals_no_path() {
        let grid = WorldGrid::from_rows(&["E.#."]).expect("valid layout");
        let err = find_path(Cell::new(0, 0), Cell::new(3, 0), &grid).expect_err("island");
        assert!(matches!(err, SimError::NoPathExists { .. }));
        assert!(find_path(Cell::new(0, 0), Cell::new(2, 0), &grid).is_err());
        assert!(find_path(Cell::new(0, 0), Cell::new(9, 9), &grid).is_err());
    }

    #[test]
    fn hazard_free_detour_beats_shorter_hazardous_route() {
        let grid = WorldGrid::from_rows(&[
            "E~.", //
            "...",
        ])
        .expect("valid layout");
        let path = find_path(Cell::new(0, 0), Cell::new(2, 0), &grid).expect("reachable");
        assert_eq!(path.len(), 4);
        assert!(path.iter().all(|cell| !grid.is_hazardous(*cell)));
    }

    #[test]
    fn least_hazardous_route_when_hazards_are_unavoidable() {
        let grid = WorldGrid::from_rows(&[
            "E~~.", //
            ".#~#",
            "..~.",
        ])
        .expect("valid layout");
        let from = Cell::new(0, 0);
        let to = Cell::new(3, 2);
        let path = find_path(from, to, &grid).expect("reachable");
        let crossed = path.iter().filter(|cell| grid.is_hazardous(**cell)).count();
        assert_eq!(crossed, 1);
        assert_eq!(path.len(), 5);
        assert_valid_path(from, &path, &grid);
    }

    #[test]
    fn equal_routes_resolve_identically() {
        let grid = WorldGrid::from_rows(&["E...", "....", "...."]).expect("valid layout");
        let first = find_path(Cell::new(0, 0), Cell::new(3, 2), &grid).expect("reachable");
        for _ in 0..20 {
            let again = find_path(Cell::new(0, 0), Cell::new(3, 2), &grid).expect("reachable");
            assert_eq!(first, again);
        }
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn planned_path_flags_only_new_hazards() {
        let mut grid = WorldGrid::from_rows(&["E~~.", "####"]).expect("valid layout");
        let mut plan = PlannedPath::plan(Cell::new(0, 0), Cell::new(3, 0), &grid).expect("route");
        assert_eq!(plan.len(), 3);
        assert!(!plan.is_compromised(&grid));

        grid.set_hazard(Cell::new(3, 0), true);
        assert!(plan.is_compromised(&grid));

        assert_eq!(plan.next_step(), Some(Cell::new(1, 0)));
        assert_eq!(plan.destination(), Cell::new(3, 0));
    }
}
