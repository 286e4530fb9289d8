//! Octile 8-connected A* pathfinder with obstacle/unit blocking and
//! string-pulling (§4.G).
//!
//! Grounded on the teacher's origin-centered, clamped `world_to_grid` /
//! `grid_to_world` grid conventions (`sim/src/terrain.rs`), adapted
//! from a continuous height/terrain-type grid to a binary
//! blocked/unblocked occupancy grid sized by `PATHFINDER_CELL_SIZE`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::components::{Obstacle, ObstacleShape, Position};
use crate::config::PATHFINDER_CELL_SIZE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A circular blocker: a non-passable obstacle (already inflated by
/// unit radius + clearance) or a live unit occupying space.
#[derive(Debug, Clone, Copy)]
pub struct Blocker {
    pub center: Point,
    pub radius: f32,
}

/// Build the blocker list for a pathfinding query: every non-passable
/// obstacle (inflated by `unit_radius + clearance`) plus every live
/// unit other than `self_id`/`target_id`.
pub fn collect_blockers(
    obstacles: &[(Position, Obstacle)],
    other_units: &[Position],
    unit_radius: f32,
    clearance: f32,
) -> Vec<Blocker> {
    let mut blockers = Vec::new();
    for (pos, obstacle) in obstacles {
        if obstacle.is_passable {
            continue;
        }
        match obstacle.shape {
            ObstacleShape::Circle { radius } => {
                blockers.push(Blocker { center: Point::new(pos.x, pos.y), radius: radius + unit_radius + clearance });
            }
            ObstacleShape::Rect { half_length, half_width, rotation } => {
                // Rectangles are only ever bounded by their circumscribing
                // circle; there is no separate oriented-box segment test.
                let diag = (half_length * half_length + half_width * half_width).sqrt();
                let _ = rotation;
                blockers.push(Blocker { center: Point::new(pos.x, pos.y), radius: diag + unit_radius + clearance });
            }
        }
    }
    for pos in other_units {
        blockers.push(Blocker { center: Point::new(pos.x, pos.y), radius: unit_radius + clearance });
    }
    blockers
}

fn segment_intersects_circle(a: Point, b: Point, blocker: &Blocker) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-9 {
        return a.distance_to(&blocker.center) <= blocker.radius;
    }
    let t = (((blocker.center.x - a.x) * dx + (blocker.center.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    let closest = Point::new(a.x + t * dx, a.y + t * dy);
    closest.distance_to(&blocker.center) <= blocker.radius
}

/// Segment clear of all blockers, using the circle test for every
/// blocker (rectangles are pre-inflated to a bounding circle in
/// `collect_blockers`, which is intentionally conservative).
pub fn segment_clear(a: Point, b: Point, blockers: &[Blocker]) -> bool {
    !blockers.iter().any(|blocker| segment_intersects_circle(a, b, blocker))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Cell {
    cx: i32,
    cy: i32,
}

struct Grid {
    cell_size: f32,
    half_width: f32,
    half_height: f32,
}

impl Grid {
    fn world_to_cell(&self, p: Point) -> Cell {
        Cell {
            cx: (p.x / self.cell_size).floor() as i32,
            cy: (p.y / self.cell_size).floor() as i32,
        }
    }

    fn cell_to_world(&self, c: Cell) -> Point {
        Point::new((c.cx as f32 + 0.5) * self.cell_size, (c.cy as f32 + 0.5) * self.cell_size)
    }

    fn is_blocked(&self, c: Cell, blockers: &[Blocker]) -> bool {
        let p = self.cell_to_world(c);
        blockers.iter().any(|b| p.distance_to(&b.center) <= b.radius)
    }

    fn in_bounds(&self, c: Cell) -> bool {
        let p = self.cell_to_world(c);
        p.x >= -self.half_width && p.x <= self.half_width && p.y >= -self.half_height && p.y <= self.half_height
    }

    /// Nearest unblocked cell to `c`, expanding in rings.
    fn nearest_unblocked(&self, c: Cell, blockers: &[Blocker]) -> Cell {
        if !self.is_blocked(c, blockers) {
            return c;
        }
        for radius in 1..64i32 {
            for dx in -radius..=radius {
                for dy in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    let candidate = Cell { cx: c.cx + dx, cy: c.cy + dy };
                    if self.in_bounds(candidate) && !self.is_blocked(candidate, blockers) {
                        return candidate;
                    }
                }
            }
        }
        c
    }
}

#[derive(Copy, Clone, PartialEq)]
struct HeapEntry {
    f_score: f32,
    cell: Cell,
}

impl Eq for HeapEntry {}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap via reversed partial_cmp (BinaryHeap is a max-heap).
        other.f_score.partial_cmp(&self.f_score).unwrap_or(Ordering::Equal)
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn octile_heuristic(a: Cell, b: Cell) -> f32 {
    let dx = (a.cx - b.cx).abs() as f32;
    let dy = (a.cy - b.cy).abs() as f32;
    dx.max(dy) + (2f32.sqrt() - 1.0) * dx.min(dy)
}

const NEIGHBOR_OFFSETS: [(i32, i32, f32); 8] = [
    (1, 0, 1.0),
    (-1, 0, 1.0),
    (0, 1, 1.0),
    (0, -1, 1.0),
    (1, 1, std::f32::consts::SQRT_2),
    (1, -1, std::f32::consts::SQRT_2),
    (-1, 1, std::f32::consts::SQRT_2),
    (-1, -1, std::f32::consts::SQRT_2),
];

fn astar(grid: &Grid, start: Cell, goal: Cell, blockers: &[Blocker]) -> Option<Vec<Cell>> {
    let mut open = BinaryHeap::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut g_score: HashMap<Cell, f32> = HashMap::new();

    g_score.insert(start, 0.0);
    open.push(HeapEntry { f_score: octile_heuristic(start, goal), cell: start });

    let mut visited = std::collections::HashSet::new();

    while let Some(HeapEntry { cell: current, .. }) = open.pop() {
        if current == goal {
            let mut path = vec![current];
            let mut cursor = current;
            while let Some(prev) = came_from.get(&cursor) {
                path.push(*prev);
                cursor = *prev;
            }
            path.reverse();
            return Some(path);
        }
        if !visited.insert(current) {
            continue;
        }

        for (dx, dy, cost) in NEIGHBOR_OFFSETS {
            let neighbor = Cell { cx: current.cx + dx, cy: current.cy + dy };
            if !grid.in_bounds(neighbor) || grid.is_blocked(neighbor, blockers) {
                continue;
            }
            // No corner cutting: a diagonal step requires both adjacent
            // cardinal cells to be unblocked.
            if dx != 0 && dy != 0 {
                let horiz = Cell { cx: current.cx + dx, cy: current.cy };
                let vert = Cell { cx: current.cx, cy: current.cy + dy };
                if grid.is_blocked(horiz, blockers) || grid.is_blocked(vert, blockers) {
                    continue;
                }
            }

            let tentative = g_score.get(&current).copied().unwrap_or(f32::INFINITY) + cost;
            if tentative < g_score.get(&neighbor).copied().unwrap_or(f32::INFINITY) {
                came_from.insert(neighbor, current);
                g_score.insert(neighbor, tentative);
                open.push(HeapEntry { f_score: tentative + octile_heuristic(neighbor, goal), cell: neighbor });
            }
        }
    }
    None
}

/// Compute a path from `a` to `b` avoiding `blockers`, inside a map of
/// `map_width x map_height` centered at the origin. Falls back to the
/// straight segment when it's already clear.
pub fn find_path(a: Point, b: Point, blockers: &[Blocker], map_width: f32, map_height: f32) -> Vec<Point> {
    if segment_clear(a, b, blockers) {
        return vec![a, b];
    }

    let grid = Grid { cell_size: PATHFINDER_CELL_SIZE, half_width: map_width / 2.0, half_height: map_height / 2.0 };
    let start_cell = grid.nearest_unblocked(grid.world_to_cell(a), blockers);
    let goal_cell = grid.nearest_unblocked(grid.world_to_cell(b), blockers);

    let Some(cell_path) = astar(&grid, start_cell, goal_cell, blockers) else {
        // No path exists; degrade to a direct segment rather than
        // panicking or stranding the caller with nothing (§7 class 3:
        // invariant-adjacent degradation, never a hard failure here).
        return vec![a, b];
    };

    let mut world_path: Vec<Point> = cell_path.iter().map(|c| grid.cell_to_world(*c)).collect();
    if let Some(first) = world_path.first_mut() {
        *first = a;
    }
    if let Some(last) = world_path.last_mut() {
        *last = b;
    }

    string_pull(&world_path, blockers)
}

/// Greedily skip waypoints whose segment to a later waypoint is clear.
pub fn string_pull(path: &[Point], blockers: &[Blocker]) -> Vec<Point> {
    if path.len() <= 2 {
        return path.to_vec();
    }
    let mut pulled = vec![path[0]];
    let mut anchor = 0;
    let mut cursor = 1;
    while cursor < path.len() {
        let mut furthest = cursor;
        for candidate in (cursor + 1)..path.len() {
            if segment_clear(path[anchor], path[candidate], blockers) {
                furthest = candidate;
            } else {
                break;
            }
        }
        pulled.push(path[furthest]);
        anchor = furthest;
        cursor = furthest + 1;
    }
    pulled
}

pub fn path_length(path: &[Point]) -> f32 {
    path.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}

/// Walk the path, returning the point reached after spending exactly
/// `budget` world units of travel (or the final point if the path is
/// shorter than the budget).
pub fn position_along_path(path: &[Point], budget: f32) -> Point {
    if path.is_empty() {
        return Point::new(0.0, 0.0);
    }
    let mut remaining = budget;
    for window in path.windows(2) {
        let seg_len = window[0].distance_to(&window[1]);
        if seg_len < 1e-9 {
            continue;
        }
        if remaining < seg_len {
            let t = remaining / seg_len;
            return Point::new(
                window[0].x + (window[1].x - window[0].x) * t,
                window[0].y + (window[1].y - window[0].y) * t,
            );
        }
        remaining -= seg_len;
    }
    *path.last().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_when_clear() {
        let path = find_path(Point::new(0.0, 0.0), Point::new(10.0, 0.0), &[], 40.0, 40.0);
        assert_eq!(path, vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
    }

    #[test]
    fn astar_avoids_rock() {
        let rock = Blocker { center: Point::new(5.0, 5.0), radius: 1.5 };
        let path = find_path(Point::new(0.0, 5.0), Point::new(10.0, 5.0), &[rock], 40.0, 40.0);

        assert!(path_length(&path) > 10.0);
        for p in &path {
            assert!(p.distance_to(&rock.center) >= 1.0, "waypoint {:?} too close to rock", p);
        }
    }

    #[test]
    fn no_corner_cutting_through_diagonal_gap() {
        // Two blockers placed so the only diagonal route between them
        // would clip a corner; the path must route around, not through.
        let blockers = vec![
            Blocker { center: Point::new(1.0, 0.0), radius: 0.6 },
            Blocker { center: Point::new(0.0, 1.0), radius: 0.6 },
        ];
        let path = find_path(Point::new(-2.0, -2.0), Point::new(2.0, 2.0), &blockers, 20.0, 20.0);
        assert!(path.len() >= 2);
        // No waypoint should land inside either blocker's radius.
        for p in &path {
            for b in &blockers {
                assert!(p.distance_to(&b.center) >= b.radius - 1e-3);
            }
        }
    }

    #[test]
    fn position_along_path_truncates_at_budget() {
        let path = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let mid = position_along_path(&path, 4.0);
        assert!((mid.x - 4.0).abs() < 1e-4);
        let past_end = position_along_path(&path, 50.0);
        assert_eq!(past_end, Point::new(10.0, 0.0));
    }

    #[test]
    fn path_length_sums_segments() {
        let path = vec![Point::new(0.0, 0.0), Point::new(3.0, 0.0), Point::new(3.0, 4.0)];
        assert!((path_length(&path) - 7.0).abs() < 1e-4);
    }
}
