use std::{
    fs::File,
    io::{stdout, Stdout},
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
        MouseEventKind,
    },
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use log::{debug, info};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};

use chunkfall::{
    board::{BoardBounds, Cell, RectLayout, DEFAULT_SCAN_RADIUS},
    game::{Game, GameState, InputCommand, Scoreboard, TileKind},
    piece::ShapeKind,
};

// ============================================================================
// Command Line
// ============================================================================

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Falling blocks with angry chunks", long_about = None)]
struct Args {
    /// Board width in cells
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..=MAX_BOARD_SIDE))]
    width: u16,
    /// Board height in cells
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u16).range(1..=MAX_BOARD_SIDE))]
    height: u16,
    /// Seed for piece and obstacle randomness (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
    /// Milliseconds between external clock ticks
    #[arg(long, default_value_t = 20)]
    frame_ms: u64,
    /// Half-width of the window scanned for the board layout
    #[arg(long, default_value_t = DEFAULT_SCAN_RADIUS, value_parser = clap::value_parser!(i32).range(1..=1000))]
    scan_radius: i32,
    /// Write logs to this file (filtered by RUST_LOG)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

// ============================================================================
// Visual Constants
// ============================================================================

const MAX_BOARD_SIDE: i64 = 200;
const CELL_WIDTH: u16 = 2;
const BLOCK_CHAR: &str = "██";
const EMPTY_CHAR: &str = " ·";
const CHUNK_COLOR: Color = Color::Gray;

fn piece_color(kind: ShapeKind) -> Color {
    match kind {
        ShapeKind::T => Color::Magenta,
        ShapeKind::L => Color::Rgb(255, 165, 0),
        ShapeKind::Z => Color::Red,
        ShapeKind::J => Color::Blue,
        ShapeKind::S => Color::Green,
        ShapeKind::I => Color::Cyan,
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Terminal size of the bordered board widget.
#[derive(Clone, Copy, Debug)]
struct BoardSize {
    width: u16,
    height: u16,
}

impl BoardSize {
    fn for_bounds(bounds: &BoardBounds) -> anyhow::Result<Self> {
        let width = u16::try_from(bounds.width())
            .ok()
            .and_then(|width| width.checked_mul(CELL_WIDTH))
            .and_then(|width| width.checked_add(2))
            .with_context(|| format!("board is too wide to draw ({} cells)", bounds.width()))?;
        let height = u16::try_from(bounds.height())
            .ok()
            .and_then(|height| height.checked_add(2))
            .with_context(|| format!("board is too tall to draw ({} cells)", bounds.height()))?;
        Ok(Self { width, height })
    }
}

/// Draws the frame and returns the area the board cells were drawn in.
fn render(frame: &mut Frame, game: &Game, size: BoardSize, scoreboard: Scoreboard) -> Rect {
    let area = frame.size();
    let board_area = render_game(frame, game, size, scoreboard, area);

    match game.state() {
        GameState::Playing => {}
        GameState::Paused => render_popup(
            frame,
            area,
            " Paused ",
            vec![
                Line::from(""),
                Line::from(Span::styled("PAUSED", Style::default().fg(Color::Yellow))),
                Line::from(""),
                Line::from(Span::styled(
                    "Press P to continue",
                    Style::default().fg(Color::DarkGray),
                )),
            ],
        ),
        GameState::BoardFull => render_popup(
            frame,
            area,
            " Board Full ",
            vec![
                Line::from(""),
                Line::from(Span::styled("NO VALID MOVE", Style::default().fg(Color::Red))),
                Line::from(""),
                Line::from(format!("{scoreboard}")),
                Line::from(""),
                Line::from(Span::styled(
                    "R: restart | ESC: quit",
                    Style::default().fg(Color::DarkGray),
                )),
            ],
        ),
    }

    board_area
}

fn render_game(
    frame: &mut Frame,
    game: &Game,
    size: BoardSize,
    scoreboard: Scoreboard,
    area: Rect,
) -> Rect {
    let grid_display_width = size.width;
    let grid_display_height = size.height;
    let info_width = 16;
    let total_width = grid_display_width.saturating_add(info_width + 2);
    let total_height = grid_display_height.saturating_add(3);

    let main_area = centered_rect(total_width, total_height, area);

    let vertical = Layout::vertical([
        Constraint::Length(grid_display_height),
        Constraint::Fill(1),
    ])
    .split(main_area);
    let game_row = vertical[0];

    let horizontal = Layout::horizontal([
        Constraint::Length(grid_display_width),
        Constraint::Length(info_width),
    ])
    .split(game_row);

    let board_area = render_board(frame, game, horizontal[0]);
    render_info(frame, game, scoreboard, horizontal[1]);

    let controls_area = Rect {
        x: area.x,
        y: game_row.y + game_row.height,
        width: area.width,
        height: 2,
    };
    if controls_area.y + 1 < area.height {
        let controls = Paragraph::new(vec![Line::from(
            "←→/AD: Move | ↑/W: Rotate | ↓/S: Step | Space: Drop | Click: Chunk | P: Pause | Q: Quit",
        )])
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(controls, controls_area);
    }

    board_area
}

fn render_board(frame: &mut Frame, game: &Game, area: Rect) -> Rect {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Chunkfall ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let bounds = game.bounds();
    let piece_style = game
        .current_piece()
        .map_or(Style::default(), |piece| Style::default().fg(piece_color(piece.kind)));

    // Row max_y is drawn at the top.
    let lines: Vec<Line> = bounds
        .rows()
        .rev()
        .map(|y| {
            let spans: Vec<Span> = bounds
                .columns()
                .map(|x| match game.tile_at(Cell::new(x, y)) {
                    TileKind::Empty => Span::styled(EMPTY_CHAR, Style::default().fg(Color::DarkGray)),
                    TileKind::Chunk => Span::styled(BLOCK_CHAR, Style::default().fg(CHUNK_COLOR)),
                    TileKind::Piece => Span::styled(BLOCK_CHAR, piece_style),
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
    inner
}

fn render_info(frame: &mut Frame, game: &Game, scoreboard: Scoreboard, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Info ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled("PTS", Style::default().fg(Color::Yellow))),
        Line::from(format!("{}", scoreboard.score)),
        Line::from(""),
        Line::from(Span::styled("MAX", Style::default().fg(Color::Cyan))),
        Line::from(format!("{}", scoreboard.max_streak)),
        Line::from(""),
        Line::from(Span::styled("Interval", Style::default().fg(Color::Green))),
        Line::from(format!("{}", game.scheduler().tick_interval())),
    ];

    let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(paragraph, inner);
}

fn render_popup(frame: &mut Frame, area: Rect, title: &str, text: Vec<Line>) {
    let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .title_alignment(Alignment::Center)
            .style(Style::default().bg(Color::Black)),
    );

    let popup_area = centered_rect(26, 10, area);
    frame.render_widget(paragraph, popup_area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let horizontal = Layout::horizontal([
        Constraint::Fill(1),
        Constraint::Length(width.min(area.width)),
        Constraint::Fill(1),
    ])
    .split(area);

    let vertical = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(height.min(area.height)),
        Constraint::Fill(1),
    ])
    .split(horizontal[1]);

    vertical[1]
}

/// Board cell under a terminal position inside the drawn board area.
fn cell_at(game: &Game, board_area: Rect, column: u16, row: u16) -> Option<Cell> {
    if !board_area.intersects(Rect::new(column, row, 1, 1)) {
        return None;
    }
    let bounds = game.bounds();
    let x = bounds.min_x + i32::from((column - board_area.x) / CELL_WIDTH);
    let y = bounds.max_y - i32::from(row - board_area.y);
    Some(Cell::new(x, y))
}

// ============================================================================
// Input
// ============================================================================

fn command_for(code: KeyCode) -> Option<InputCommand> {
    match code {
        KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => Some(InputCommand::MoveLeft),
        KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => Some(InputCommand::MoveRight),
        KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => Some(InputCommand::RotateCw),
        KeyCode::Down | KeyCode::Char('s') | KeyCode::Char('S') => {
            Some(InputCommand::SoftDropStep)
        }
        KeyCode::Char(' ') => Some(InputCommand::HardDrop),
        KeyCode::Char('p') | KeyCode::Char('P') => Some(InputCommand::Pause),
        _ => None,
    }
}

// ============================================================================
// Main Loop
// ============================================================================

fn init_logging(log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = File::create(path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    game: &mut Game,
    size: BoardSize,
    frame_ms: u64,
) -> anyhow::Result<()> {
    let frame_duration = Duration::from_millis(frame_ms.max(1));
    let mut scoreboard = game.scoreboard();
    let mut board_area = Rect::default();
    let mut last_frame = Instant::now();
    let mut redraw = true;

    loop {
        game.ensure_piece();
        for event in game.take_events() {
            debug!("{event:?}");
        }

        if redraw || game.take_dirty() {
            terminal.draw(|frame| board_area = render(frame, game, size, scoreboard))?;
            redraw = false;
        }

        let timeout = frame_duration
            .checked_sub(last_frame.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => break,
                    KeyCode::Char('r') | KeyCode::Char('R') if game.is_board_full() => {
                        game.restart();
                        scoreboard = game.scoreboard();
                    }
                    code => {
                        if let Some(command) = command_for(code) {
                            game.apply(command);
                        }
                    }
                },
                Event::Mouse(mouse) if mouse.kind == MouseEventKind::Down(MouseButton::Left) => {
                    if let Some(cell) = cell_at(game, board_area, mouse.column, mouse.row) {
                        game.place_obstacle(cell);
                    }
                }
                _ => {}
            }
            redraw = true;
        }

        if last_frame.elapsed() >= frame_duration {
            if let Some(update) = game.tick() {
                scoreboard = update;
                redraw = true;
            }
            last_frame = Instant::now();
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_ref())?;

    let seed = args.seed.unwrap_or_else(rand::random);
    let layout = RectLayout::centered(args.width, args.height);
    let mut game = Game::from_layout(&layout, args.scan_radius, seed)
        .context("board layout has no marked tiles")?;
    let size = BoardSize::for_bounds(game.bounds())?;
    info!("starting session with seed {seed}");

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut game, size, args.frame_ms);

    // Restore terminal
    stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}
