use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::board::Cell;

// ============================================================================
// Piece Catalog
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ShapeKind {
    T,
    L,
    Z,
    J,
    S,
    I,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 6] = [
        ShapeKind::T,
        ShapeKind::L,
        ShapeKind::Z,
        ShapeKind::J,
        ShapeKind::S,
        ShapeKind::I,
    ];

    /// Offsets from the spawn anchor. Index 0 is the rotation pivot.
    pub const fn offsets(self) -> [Cell; 4] {
        match self {
            ShapeKind::T => [Cell::new(0, -1), Cell::new(1, -1), Cell::new(0, 0), Cell::new(-1, -1)],
            ShapeKind::L => [Cell::new(0, -1), Cell::new(1, -1), Cell::new(1, 0), Cell::new(-1, -1)],
            ShapeKind::J => [Cell::new(0, -1), Cell::new(1, -1), Cell::new(-1, 0), Cell::new(-1, -1)],
            ShapeKind::S => [Cell::new(0, -1), Cell::new(-1, -1), Cell::new(0, 0), Cell::new(1, 0)],
            ShapeKind::Z => [Cell::new(0, -1), Cell::new(1, -1), Cell::new(0, 0), Cell::new(-1, 0)],
            ShapeKind::I => [Cell::new(0, 0), Cell::new(-1, 0), Cell::new(-2, 0), Cell::new(1, 0)],
        }
    }
}

// ============================================================================
// Active Piece
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ActivePiece {
    pub kind: ShapeKind,
    cells: [Cell; 4],
}

impl ActivePiece {
    pub fn new(kind: ShapeKind, anchor: Cell) -> Self {
        Self {
            kind,
            cells: kind.offsets().map(|offset| anchor.offset(offset.x, offset.y)),
        }
    }

    pub fn cells(&self) -> [Cell; 4] {
        self.cells
    }

    pub fn pivot(&self) -> Cell {
        self.cells[0]
    }

    pub fn occupies(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    pub fn shifted(&self, dx: i32, dy: i32) -> Self {
        Self {
            kind: self.kind,
            cells: self.cells.map(|cell| cell.offset(dx, dy)),
        }
    }

    /// Quarter turn about the pivot cell's position. The pivot itself stays put.
    pub fn rotated(&self) -> Self {
        let origin = self.pivot();
        let mut cells = self.cells;
        for cell in &mut cells[1..] {
            *cell = Cell::new(
                cell.y + origin.x - origin.y,
                origin.x + origin.y - cell.x,
            );
        }
        Self {
            kind: self.kind,
            cells,
        }
    }
}

// ============================================================================
// Piece Provider Trait
// ============================================================================

pub trait PieceProvider {
    fn next_piece(&mut self) -> ShapeKind;
}

/// Uniform choice over the catalog.
#[derive(Debug, Clone)]
pub struct RandomPieceProvider {
    rng: StdRng,
}

impl RandomPieceProvider {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl PieceProvider for RandomPieceProvider {
    fn next_piece(&mut self) -> ShapeKind {
        ShapeKind::ALL[self.rng.gen_range(0..ShapeKind::ALL.len())]
    }
}

pub struct SequencePieceProvider {
    pieces: Vec<ShapeKind>,
    index: usize,
}

impl SequencePieceProvider {
    pub fn new(pieces: Vec<ShapeKind>) -> Self {
        assert!(!pieces.is_empty(), "piece sequence must not be empty");
        Self { pieces, index: 0 }
    }
}

impl PieceProvider for SequencePieceProvider {
    fn next_piece(&mut self) -> ShapeKind {
        let piece = self.pieces[self.index % self.pieces.len()];
        self.index += 1;
        piece
    }
}
