//! Grid dimensions, grid positions, and the window → grid transform.

use bytemuck::{Pod, Zeroable};
use glam::{DVec2, UVec2};
use serde::{Deserialize, Serialize};

/// Size of the simulation surface in cells.
///
/// Fixed for the lifetime of a simulation run. Cells are stored row-major
/// with `y = 0` as the bottom row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct GridDims {
    /// Number of columns
    pub width: u32,
    /// Number of rows
    pub height: u32,
}

impl GridDims {
    /// Creates new grid dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of cells in one generation.
    #[must_use]
    pub const fn cell_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns true if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true if the position lies on the grid.
    #[must_use]
    pub const fn contains(self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    /// Flat buffer index of an on-grid position.
    #[must_use]
    pub const fn index(self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Number of workgroups needed to cover the grid with `tile`-sized groups.
    #[must_use]
    pub fn workgroups(self, tile: UVec2) -> UVec2 {
        UVec2::new(
            self.width.div_ceil(tile.x.max(1)),
            self.height.div_ceil(tile.y.max(1)),
        )
    }
}

impl From<GridDims> for UVec2 {
    fn from(dims: GridDims) -> Self {
        UVec2::new(dims.width, dims.height)
    }
}

/// Integer cell position. May lie off-grid (e.g. a brush centre near an edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct GridPos {
    /// Column
    pub x: i32,
    /// Row, counted from the bottom
    pub y: i32,
}

impl GridPos {
    /// Creates a new grid position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Maps a pointer position in window pixels (origin top-left, y down) to a
/// grid cell (origin bottom-left, y up).
///
/// Returns `None` when the pointer lies outside the window or either size is
/// degenerate.
#[must_use]
pub fn window_to_grid(pointer: DVec2, window: UVec2, dims: GridDims) -> Option<GridPos> {
    if window.x == 0 || window.y == 0 || dims.is_empty() {
        return None;
    }
    if !pointer.is_finite() || pointer.x < 0.0 || pointer.y < 0.0 {
        return None;
    }

    let px = pointer.x.floor() as u64;
    let py = pointer.y.floor() as u64;
    let (win_w, win_h) = (u64::from(window.x), u64::from(window.y));
    if px >= win_w || py >= win_h {
        return None;
    }

    let flipped = win_h - 1 - py;
    let gx = px * u64::from(dims.width) / win_w;
    let gy = flipped * u64::from(dims.height) / win_h;
    Some(GridPos::new(gx as i32, gy as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_count_and_index() {
        let dims = GridDims::new(10, 4);
        assert_eq!(dims.cell_count(), 40);
        assert_eq!(dims.index(3, 2), 23);
        assert!(!dims.is_empty());
        assert!(GridDims::new(0, 4).is_empty());
    }

    #[test]
    fn test_contains() {
        let dims = GridDims::new(10, 10);
        assert!(dims.contains(GridPos::new(0, 0)));
        assert!(dims.contains(GridPos::new(9, 9)));
        assert!(!dims.contains(GridPos::new(10, 0)));
        assert!(!dims.contains(GridPos::new(-1, 5)));
    }

    #[test]
    fn test_workgroups_round_up() {
        let dims = GridDims::new(1600, 900);
        let groups = dims.workgroups(UVec2::new(16, 16));
        assert_eq!(groups, UVec2::new(100, 57));
    }

    #[test]
    fn test_window_to_grid_flips_y() {
        let dims = GridDims::new(160, 90);
        let window = UVec2::new(1600, 900);

        // Top-left of the window is the top row of the grid
        let top_left = window_to_grid(DVec2::new(0.0, 0.0), window, dims);
        assert_eq!(top_left, Some(GridPos::new(0, 89)));

        // Bottom-right of the window is the bottom row of the grid
        let bottom_right = window_to_grid(DVec2::new(1599.0, 899.0), window, dims);
        assert_eq!(bottom_right, Some(GridPos::new(159, 0)));
    }

    #[test]
    fn test_window_to_grid_scales() {
        let dims = GridDims::new(100, 100);
        let window = UVec2::new(200, 400);
        let pos = window_to_grid(DVec2::new(100.0, 199.0), window, dims);
        assert_eq!(pos, Some(GridPos::new(50, 50)));
    }

    #[test]
    fn test_window_to_grid_rejects_outside() {
        let dims = GridDims::new(100, 100);
        let window = UVec2::new(200, 200);
        assert_eq!(window_to_grid(DVec2::new(-1.0, 10.0), window, dims), None);
        assert_eq!(window_to_grid(DVec2::new(10.0, 200.0), window, dims), None);
        assert_eq!(window_to_grid(DVec2::new(f64::NAN, 1.0), window, dims), None);
        assert_eq!(
            window_to_grid(DVec2::new(1.0, 1.0), UVec2::ZERO, dims),
            None
        );
    }
}
