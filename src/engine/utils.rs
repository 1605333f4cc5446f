use crate::pathfinding::path_distance;
use crate::rng::{DrawKind, RandomStream};
use crate::types::Cell;
use crate::world::WorldGrid;

const REPORT_DRAW_ATTEMPTS: usize = 8;

/// Last-known location handed to rescuers: a passable cell within `noise`
/// Manhattan distance of the truth and connected to it. Falls back to the
/// true cell when no draw qualifies.
pub(super) fn reported_cell_near(
    cell: Cell,
    noise: i32,
    grid: &WorldGrid,
    rng: &mut RandomStream,
    kind: DrawKind,
) -> Cell {
    if noise <= 0 {
        return cell;
    }
    for _ in 0..REPORT_DRAW_ATTEMPTS {
        let dx = rng.int(kind, -(noise as i64), noise as i64) as i32;
        let spread = noise - dx.abs();
        let dy = rng.int(kind, -(spread as i64), spread as i64) as i32;
        let candidate = Cell::new(cell.x + dx, cell.y + dy);
        if !grid.is_passable(candidate) {
            continue;
        }
        if path_distance(cell, candidate, grid).is_some() {
            return candidate;
        }
    }
    cell
}
