use std::{
    collections::{hash_set, HashSet},
    ops::RangeInclusive,
};

use log::info;

// ============================================================================
// Configuration
// ============================================================================

/// Half-width of the square window scanned for marked tiles.
pub const DEFAULT_SCAN_RADIUS: i32 = 20;

// ============================================================================
// Types
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, derive_more::Display)]
#[display("({x}, {y})")]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum BoundsError {
    #[display("no marked tiles within {scan_radius} cells of the origin")]
    NoMarkedTiles { scan_radius: i32 },
}

/// Source of the initial tile layout the board is carved out of.
pub trait TileLayout {
    fn is_marked(&self, cell: Cell) -> bool;
}

impl<F> TileLayout for F
where
    F: Fn(Cell) -> bool,
{
    fn is_marked(&self, cell: Cell) -> bool {
        self(cell)
    }
}

/// A solid rectangle of marked tiles.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RectLayout {
    min: Cell,
    max: Cell,
}

impl RectLayout {
    pub fn new(min: Cell, max: Cell) -> Self {
        Self { min, max }
    }

    /// A `width` x `height` rectangle with the origin at its center
    /// (rounded towards the upper right for even sizes).
    pub fn centered(width: u16, height: u16) -> Self {
        let min_x = -(i32::from(width) / 2);
        let min_y = -(i32::from(height) / 2);
        Self {
            min: Cell::new(min_x, min_y),
            max: Cell::new(min_x + i32::from(width) - 1, min_y + i32::from(height) - 1),
        }
    }
}

impl TileLayout for RectLayout {
    fn is_marked(&self, cell: Cell) -> bool {
        (self.min.x..=self.max.x).contains(&cell.x) && (self.min.y..=self.max.y).contains(&cell.y)
    }
}

// ============================================================================
// Board Bounds
// ============================================================================

/// Inclusive playable rectangle. `y` grows upwards: `min_y` is the floor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BoardBounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl BoardBounds {
    /// Sentinel value before any marked tile has been seen.
    pub const UNINITIALIZED: Self = Self {
        min_x: i32::MAX,
        max_x: i32::MIN,
        min_y: i32::MAX,
        max_y: i32::MIN,
    };

    pub fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        assert!(
            min_x <= max_x && min_y <= max_y,
            "empty board bounds x={min_x}..={max_x} y={min_y}..={max_y}"
        );
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Scans the `2 * scan_radius` square around the origin and returns the
    /// smallest rectangle covering every marked tile.
    pub fn detect<L>(layout: &L, scan_radius: i32) -> Result<Self, BoundsError>
    where
        L: TileLayout + ?Sized,
    {
        let mut bounds = Self::UNINITIALIZED;
        let start = scan_radius.saturating_neg();
        for y in start..scan_radius {
            for x in start..scan_radius {
                let cell = Cell::new(x, y);
                if layout.is_marked(cell) {
                    bounds.include(cell);
                }
            }
        }

        if !bounds.is_initialized() {
            return Err(BoundsError::NoMarkedTiles { scan_radius });
        }
        info!("board size = {} x {}", bounds.width(), bounds.height());
        Ok(bounds)
    }

    fn include(&mut self, cell: Cell) {
        self.min_x = self.min_x.min(cell.x);
        self.max_x = self.max_x.max(cell.x);
        self.min_y = self.min_y.min(cell.y);
        self.max_y = self.max_y.max(cell.y);
    }

    pub fn is_initialized(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    fn assert_initialized(&self) {
        assert!(
            self.is_initialized(),
            "board bounds used before a marked tile was detected"
        );
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.assert_initialized();
        self.columns().contains(&cell.x) && self.rows().contains(&cell.y)
    }

    pub fn columns(&self) -> RangeInclusive<i32> {
        self.assert_initialized();
        self.min_x..=self.max_x
    }

    /// Rows from the floor upwards.
    pub fn rows(&self) -> RangeInclusive<i32> {
        self.assert_initialized();
        self.min_y..=self.max_y
    }

    pub fn width(&self) -> usize {
        self.columns().count()
    }

    pub fn height(&self) -> usize {
        self.rows().count()
    }

    /// Every cell of the board, row by row from the floor.
    pub fn cells(&self) -> impl Iterator<Item = Cell> {
        let columns = self.columns();
        self.rows()
            .flat_map(move |y| columns.clone().map(move |x| Cell::new(x, y)))
    }
}

// ============================================================================
// Chunk Field
// ============================================================================

/// Settled blocks and injected obstacles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkField {
    cells: HashSet<Cell>,
}

impl ChunkField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    /// Returns false if the cell was already occupied.
    pub fn add(&mut self, cell: Cell) -> bool {
        self.cells.insert(cell)
    }

    /// Adds every cell, skipping ones already present. Returns how many were new.
    pub fn merge<I>(&mut self, cells: I) -> usize
    where
        I: IntoIterator<Item = Cell>,
    {
        cells.into_iter().filter(|&cell| self.add(cell)).count()
    }

    /// Lowest row in which every column of `bounds` is occupied.
    pub fn find_full_row(&self, bounds: &BoardBounds) -> Option<i32> {
        bounds
            .rows()
            .find(|&y| bounds.columns().all(|x| self.contains(Cell::new(x, y))))
    }

    /// Removes `row` and moves everything above it down by one.
    pub fn clear_row(&mut self, row: i32) {
        self.cells = std::mem::take(&mut self.cells)
            .into_iter()
            .filter(|cell| cell.y != row)
            .map(|cell| if cell.y > row { cell.offset(0, -1) } else { cell })
            .collect();
    }

    pub fn count_in_row(&self, row: i32) -> usize {
        self.cells.iter().filter(|cell| cell.y == row).count()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn iter(&self) -> hash_set::Iter<'_, Cell> {
        self.cells.iter()
    }
}

impl<'a> IntoIterator for &'a ChunkField {
    type Item = &'a Cell;
    type IntoIter = hash_set::Iter<'a, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Cell> for ChunkField {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}
