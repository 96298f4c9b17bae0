use log::{debug, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    board::{BoardBounds, BoundsError, Cell, ChunkField, TileLayout},
    piece::{ActivePiece, PieceProvider, RandomPieceProvider, ShapeKind},
};

// ============================================================================
// Configuration
// ============================================================================

/// External ticks between gravity steps at the start of a session.
pub const INITIAL_TICK_INTERVAL: u32 = 10;
pub const MIN_TICK_INTERVAL: u32 = 1;

/// Column new pieces are anchored on. Boards are laid out around the origin.
pub const SPAWN_X: i32 = 0;

// ============================================================================
// Types
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TileKind {
    Empty,
    Chunk,
    Piece,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GameState {
    Playing,
    Paused,
    BoardFull,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InputCommand {
    MoveLeft,
    MoveRight,
    RotateCw,
    SoftDropStep,
    HardDrop,
    Pause,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum GameEvent {
    PieceSpawned(ShapeKind),
    PieceMoved,
    PieceRotated,
    PieceSettled,
    RowCleared(i32),
    ObstacleAdded(Cell),
    DifficultyUp(u32),
    Paused,
    Unpaused,
    GameRestarted,
    BoardFull,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, derive_more::Display)]
#[display("PTS:{score}  MAX:{max_streak}")]
pub struct Scoreboard {
    pub score: u32,
    pub max_streak: u32,
}

// ============================================================================
// Difficulty Scheduler
// ============================================================================

/// Turns runs of consecutive clearing ticks into a shorter gravity interval.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DifficultyScheduler {
    streak: u32,
    max_streak: u32,
    tick_interval: u32,
}

impl DifficultyScheduler {
    pub fn new() -> Self {
        Self {
            streak: 0,
            max_streak: 0,
            tick_interval: INITIAL_TICK_INTERVAL,
        }
    }

    /// Records the outcome of one gravity step. Returns true when the streak
    /// set a new record.
    pub fn record_tick(&mut self, cleared: bool) -> bool {
        self.streak = if cleared { self.streak + 1 } else { 0 };
        if self.streak <= self.max_streak {
            return false;
        }

        self.max_streak = self.streak;
        if self.tick_interval > MIN_TICK_INTERVAL {
            self.tick_interval -= 1;
        }
        debug!(
            "streak record {}, tick interval now {}",
            self.max_streak, self.tick_interval
        );
        true
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn max_streak(&self) -> u32 {
        self.max_streak
    }

    pub fn tick_interval(&self) -> u32 {
        self.tick_interval
    }
}

impl Default for DifficultyScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Game
// ============================================================================

pub struct Game {
    bounds: BoardBounds,
    field: ChunkField,
    piece: Option<ActivePiece>,
    scheduler: DifficultyScheduler,
    score: u32,
    state: GameState,
    dirty: bool,
    frame_count: u32,
    piece_provider: Box<dyn PieceProvider>,
    rng: StdRng,
    events: Vec<GameEvent>,
}

impl Game {
    /// Detects the board from `layout` and seeds every random choice from `seed`.
    pub fn from_layout<L>(layout: &L, scan_radius: i32, seed: u64) -> Result<Self, BoundsError>
    where
        L: TileLayout + ?Sized,
    {
        let bounds = BoardBounds::detect(layout, scan_radius)?;
        Ok(Self::seeded(bounds, seed))
    }

    pub fn seeded(bounds: BoardBounds, seed: u64) -> Self {
        Self::with_provider(bounds, Box::new(RandomPieceProvider::seeded(seed)), seed)
    }

    pub fn with_provider(bounds: BoardBounds, provider: Box<dyn PieceProvider>, seed: u64) -> Self {
        assert!(
            bounds.is_initialized(),
            "game created before board bounds were detected"
        );
        Self {
            bounds,
            field: ChunkField::new(),
            piece: None,
            scheduler: DifficultyScheduler::new(),
            score: 0,
            state: GameState::Playing,
            dirty: true,
            frame_count: 0,
            piece_provider: provider,
            rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
            events: Vec::new(),
        }
    }

    /// Replaces the settled blocks.
    pub fn with_field(mut self, field: ChunkField) -> Self {
        self.field = field;
        self.dirty = true;
        self
    }

    /// Places `piece` as the falling piece, replacing any current one.
    pub fn with_piece(mut self, piece: ActivePiece) -> Self {
        self.piece = Some(piece);
        self.dirty = true;
        self
    }

    // ------------------------------------------------------------------------
    // Piece control
    // ------------------------------------------------------------------------

    /// Returns false without side effects if a piece is already falling.
    /// Otherwise the new piece is kept even when it does not fit, and the
    /// result says whether it fits.
    pub fn spawn_piece(&mut self, anchor_x: i32, anchor_top_y: i32) -> bool {
        if self.piece.is_some() {
            debug!("spawn rejected: a piece is already falling");
            return false;
        }

        let kind = self.piece_provider.next_piece();
        self.piece = Some(ActivePiece::new(kind, Cell::new(anchor_x, anchor_top_y)));
        self.dirty = true;
        self.events.push(GameEvent::PieceSpawned(kind));
        self.is_valid_piece()
    }

    pub fn is_valid_cell(&self, cell: Cell) -> bool {
        self.bounds.contains(cell) && !self.field.contains(cell)
    }

    pub fn is_valid_piece(&self) -> bool {
        self.piece
            .is_some_and(|piece| piece.cells().into_iter().all(|cell| self.is_valid_cell(cell)))
    }

    pub fn shift_piece(&mut self, dx: i32, dy: i32) -> bool {
        let moved = self.try_shift(dx, dy);
        if moved {
            self.events.push(GameEvent::PieceMoved);
        }
        moved
    }

    fn try_shift(&mut self, dx: i32, dy: i32) -> bool {
        let Some(piece) = self.piece else {
            return false;
        };

        let shifted = piece.shifted(dx, dy);
        if let Some(cell) = shifted.cells().into_iter().find(|&cell| !self.is_valid_cell(cell)) {
            debug!("invalid move to {cell}");
            return false;
        }

        self.piece = Some(shifted);
        self.dirty = true;
        true
    }

    /// Turns the piece a quarter about its pivot. Nothing moves unless every
    /// rotated cell is free.
    pub fn rotate_piece(&mut self) -> bool {
        let Some(piece) = self.piece else {
            return false;
        };

        let rotated = piece.rotated();
        if let Some(&cell) = rotated.cells()[1..].iter().find(|&&cell| !self.is_valid_cell(cell)) {
            debug!("invalid rotation into {cell}");
            return false;
        }

        self.piece = Some(rotated);
        self.dirty = true;
        self.events.push(GameEvent::PieceRotated);
        true
    }

    /// Drops the piece as far as it goes and settles it into the field.
    pub fn hand_off(&mut self) {
        while self.try_shift(0, -1) {}

        let Some(piece) = self.piece.take() else {
            return;
        };
        let added = self.field.merge(piece.cells());
        if added != piece.cells().len() {
            warn!(
                "settled {:?} piece overlapped {} chunk cells",
                piece.kind,
                piece.cells().len() - added
            );
        }
        self.dirty = true;
        self.events.push(GameEvent::PieceSettled);
    }

    /// Makes sure a piece is falling, spawning one at the top if needed.
    /// Returns false when the game is not running or a fresh piece has no room.
    pub fn ensure_piece(&mut self) -> bool {
        if self.state != GameState::Playing {
            return false;
        }
        if self.piece.is_some() || self.spawn_piece(SPAWN_X, self.bounds.max_y) {
            return true;
        }

        warn!("no valid spawn position, board full at score {}", self.score);
        self.state = GameState::BoardFull;
        self.events.push(GameEvent::BoardFull);
        false
    }

    // ------------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------------

    /// Clears the lowest full row, if any. At most one row per call.
    pub fn check_and_clear(&mut self) -> bool {
        let Some(row) = self.field.find_full_row(&self.bounds) else {
            return false;
        };

        self.score += 1;
        self.field.clear_row(row);
        self.dirty = true;
        debug!("cleared row {row}, score {}", self.score);
        self.events.push(GameEvent::RowCleared(row));
        true
    }

    /// Adds a chunk cell chosen by the player.
    pub fn place_obstacle(&mut self, cell: Cell) -> bool {
        if self.state != GameState::Playing || !self.bounds.contains(cell) {
            return false;
        }
        self.add_obstacle(cell)
    }

    fn add_obstacle(&mut self, cell: Cell) -> bool {
        if self.piece.is_some_and(|piece| piece.occupies(cell)) || !self.field.add(cell) {
            debug!("obstacle at {cell} skipped, cell occupied");
            return false;
        }
        self.dirty = true;
        self.events.push(GameEvent::ObstacleAdded(cell));
        true
    }

    /// A board cell below row 0, if the board has one.
    fn random_obstacle_cell(&mut self) -> Option<Cell> {
        let floor = self.bounds.min_y;
        let top = 0.min(self.bounds.max_y + 1);
        if floor >= top {
            return None;
        }
        let x = self.rng.gen_range(self.bounds.columns());
        let y = self.rng.gen_range(floor..top);
        Some(Cell::new(x, y))
    }

    // ------------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------------

    /// One gravity step of the falling piece, followed by row clearing and pacing.
    pub fn step(&mut self) {
        if !self.ensure_piece() {
            return;
        }

        if !self.shift_piece(0, -1) {
            self.hand_off();
        }

        let cleared = self.check_and_clear();
        if self.scheduler.record_tick(cleared) {
            self.events
                .push(GameEvent::DifficultyUp(self.scheduler.max_streak()));
        }
        if cleared {
            if let Some(cell) = self.random_obstacle_cell() {
                self.add_obstacle(cell);
            }
        }
    }

    /// Called on every tick of the external clock. Runs a gravity step once
    /// every `tick_interval` calls and returns the updated scoreboard when it did.
    pub fn tick(&mut self) -> Option<Scoreboard> {
        if self.state != GameState::Playing {
            return None;
        }

        let due = self.frame_count % self.scheduler.tick_interval() == 0;
        self.frame_count += 1;
        if !due {
            return None;
        }

        self.frame_count = 1;
        self.step();
        Some(self.scoreboard())
    }

    /// Applies one player command. Returns whether it changed anything.
    pub fn apply(&mut self, command: InputCommand) -> bool {
        match command {
            InputCommand::Pause => self.toggle_pause(),
            _ if self.state != GameState::Playing => false,
            InputCommand::MoveLeft => self.shift_piece(-1, 0),
            InputCommand::MoveRight => self.shift_piece(1, 0),
            InputCommand::RotateCw => self.rotate_piece(),
            InputCommand::SoftDropStep => {
                if self.piece.is_none() {
                    return false;
                }
                if !self.shift_piece(0, -1) {
                    self.hand_off();
                }
                true
            }
            InputCommand::HardDrop => {
                if self.piece.is_none() {
                    return false;
                }
                self.hand_off();
                true
            }
        }
    }

    pub fn toggle_pause(&mut self) -> bool {
        match self.state {
            GameState::Playing => {
                self.state = GameState::Paused;
                self.events.push(GameEvent::Paused);
                true
            }
            GameState::Paused => {
                self.state = GameState::Playing;
                self.events.push(GameEvent::Unpaused);
                true
            }
            GameState::BoardFull => false,
        }
    }

    /// Starts a new session on the same board.
    pub fn restart(&mut self) {
        self.field.clear();
        self.piece = None;
        self.scheduler = DifficultyScheduler::new();
        self.score = 0;
        self.frame_count = 0;
        self.state = GameState::Playing;
        self.dirty = true;
        self.events.clear();
        self.events.push(GameEvent::GameRestarted);
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    pub fn tile_at(&self, cell: Cell) -> TileKind {
        if self.piece.is_some_and(|piece| piece.occupies(cell)) {
            TileKind::Piece
        } else if self.field.contains(cell) {
            TileKind::Chunk
        } else {
            TileKind::Empty
        }
    }

    /// Every board cell with what should be drawn there.
    pub fn render_cells(&self) -> impl Iterator<Item = (Cell, TileKind)> + '_ {
        self.bounds.cells().map(|cell| (cell, self.tile_at(cell)))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether a redraw is needed and clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Takes and clears all pending events
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn scoreboard(&self) -> Scoreboard {
        Scoreboard {
            score: self.score,
            max_streak: self.scheduler.max_streak(),
        }
    }

    pub fn bounds(&self) -> &BoardBounds {
        &self.bounds
    }

    pub fn field(&self) -> &ChunkField {
        &self.field
    }

    pub fn current_piece(&self) -> Option<&ActivePiece> {
        self.piece.as_ref()
    }

    pub fn scheduler(&self) -> &DifficultyScheduler {
        &self.scheduler
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn is_board_full(&self) -> bool {
        self.state == GameState::BoardFull
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

pub mod test_helpers {
    use super::*;
    use crate::piece::SequencePieceProvider;

    /// The 5x5 board with its floor at y = 0.
    pub fn small_bounds() -> BoardBounds {
        BoardBounds::new(0, 4, 0, 4)
    }

    /// A 10x20 board centered on the origin, so `SPAWN_X` lands mid-board.
    pub fn centered_bounds() -> BoardBounds {
        BoardBounds::new(-5, 4, -10, 9)
    }

    /// A game that spawns `pieces` in order, cycling.
    pub fn game_with(bounds: BoardBounds, pieces: Vec<ShapeKind>) -> Game {
        Game::with_provider(bounds, Box::new(SequencePieceProvider::new(pieces)), 0)
    }

    pub fn fill_row(field: &mut ChunkField, bounds: &BoardBounds, y: i32) {
        field.merge(bounds.columns().map(|x| Cell::new(x, y)));
    }

    pub fn fill_row_with_gap(field: &mut ChunkField, bounds: &BoardBounds, y: i32, gap_x: i32) {
        field.merge(bounds.columns().filter(|&x| x != gap_x).map(|x| Cell::new(x, y)));
    }
}
